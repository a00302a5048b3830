//! Serialize a [`CalendarArtifact`] to iCalendar text.
//!
//! Output is a pure function of the artifact: `DTSTAMP` repeats
//! `LAST-MODIFIED` instead of the wall clock, so regenerating an unchanged
//! artifact yields identical bytes.

use chrono::{DateTime, Utc};

use super::{UTC_FORMAT, escape_text, fold_line};
use crate::model::{CalendarArtifact, DATA_VERSION_KEY, MetadataLine, PublishedEvent};

const PRODID: &str = concat!("-//pcr-ics//pcr-ics ", env!("CARGO_PKG_VERSION"), "//ZH");

/// Render `artifact` with CRLF line endings and folded lines.
#[must_use]
pub fn write_calendar(artifact: &CalendarArtifact) -> String {
    let mut out = String::new();
    let mut emit = |line: String| {
        out.push_str(&fold_line(&line));
        out.push_str("\r\n");
    };

    emit("BEGIN:VCALENDAR".to_string());
    emit("VERSION:2.0".to_string());
    emit(format!("PRODID:{PRODID}"));

    let marker = artifact
        .data_version_marker
        .as_deref()
        .map(|version| MetadataLine::new(DATA_VERSION_KEY, version));
    let mut metadata: Vec<&MetadataLine> = artifact.metadata();
    metadata.extend(marker.as_ref());
    metadata.sort_by(|a, b| a.name.cmp(&b.name));
    for line in metadata {
        emit(format!("{}:{}", line.name, escape_text(&line.value)));
    }

    for event in artifact.events() {
        write_event(event, &mut emit);
    }

    emit("END:VCALENDAR".to_string());
    out
}

fn write_event(event: &PublishedEvent, emit: &mut impl FnMut(String)) {
    emit("BEGIN:VEVENT".to_string());
    emit(format!("UID:{}", event.identity));
    emit(format!("SUMMARY:{}", escape_text(event.name())));
    emit(format!("DTSTART:{}", utc(event.start())));
    emit(format!("DTEND:{}", utc(event.end())));
    emit(format!("DTSTAMP:{}", utc(event.last_modified_at)));
    emit(format!("CREATED:{}", utc(event.created_at)));
    emit(format!("LAST-MODIFIED:{}", utc(event.last_modified_at)));
    emit(format!("SEQUENCE:{}", event.revision));
    emit("END:VEVENT".to_string());
}

fn utc(instant: DateTime<Utc>) -> String {
    instant.format(UTC_FORMAT).to_string()
}
