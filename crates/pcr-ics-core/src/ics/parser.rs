//! Parse a published calendar back into a [`CalendarArtifact`].
//!
//! Accepts both this crate's own output and calendars written by earlier
//! generators, which used RFC 3339 for `CREATED` and sometimes `TZID=`
//! parameters on `DTSTART`/`DTEND`.

use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeZone, Timelike, Utc};
use chrono_tz::Tz;
use tracing::{debug, warn};

use super::{ContentLine, LOCAL_FORMAT, unescape_text, unfold};
use crate::error::ErrorCode;
use crate::identity::Identity;
use crate::model::{CalendarArtifact, DATA_VERSION_KEY, EventContent, MetadataLine, PublishedEvent};

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CalendarParseError {
    #[error("line {line}: malformed content line '{content}'")]
    MalformedLine { line: usize, content: String },

    #[error("no BEGIN:VCALENDAR found")]
    MissingCalendar,

    #[error("line {line}: unexpected END:{name}")]
    UnbalancedComponent { line: usize, name: String },

    #[error("unterminated {0} component")]
    Unterminated(&'static str),

    #[error("event ending line {line}: missing {property}")]
    MissingProperty { line: usize, property: &'static str },

    #[error("line {line}: invalid UID '{value}'")]
    InvalidUid { line: usize, value: String },

    #[error("line {line}: invalid {property} '{value}'")]
    InvalidTime {
        line: usize,
        property: String,
        value: String,
    },

    #[error("line {line}: invalid SEQUENCE '{value}'")]
    InvalidSequence { line: usize, value: String },

    #[error("event {uid}: ends before it starts")]
    InvertedInterval { uid: Identity },
}

impl CalendarParseError {
    #[must_use]
    pub const fn code(&self) -> ErrorCode {
        ErrorCode::CalendarParseFailed
    }
}

// ---------------------------------------------------------------------------
// Public API
// ---------------------------------------------------------------------------

/// Parse a calendar document.
///
/// Floating date-times (no `Z`, no `TZID`) are read in `default_tz`.
///
/// # Errors
///
/// Returns a [`CalendarParseError`] for structurally broken documents and
/// events with missing or unparsable required properties.
pub fn parse_calendar(text: &str, default_tz: Tz) -> Result<CalendarArtifact, CalendarParseError> {
    let text = text.strip_prefix('\u{feff}').unwrap_or(text);
    let mut artifact = CalendarArtifact::empty();
    let mut versions: Vec<String> = Vec::new();
    let mut state = State::Outside;
    let mut event = EventBuilder::default();
    let mut skip_depth = 0_usize;

    for (line_no, raw) in unfold(text) {
        let line = ContentLine::parse(&raw).ok_or_else(|| CalendarParseError::MalformedLine {
            line: line_no,
            content: raw.clone(),
        })?;

        if skip_depth > 0 {
            match line.name.as_str() {
                "BEGIN" => skip_depth += 1,
                "END" => skip_depth -= 1,
                _ => {}
            }
            continue;
        }

        let component = line.value.trim().to_ascii_uppercase();
        let property = line.name.clone();
        match (state, property.as_str()) {
            (State::Outside, "BEGIN") if component == "VCALENDAR" => state = State::Calendar,
            (State::Outside, _) => {}
            (State::Done, _) => break,

            (State::Calendar, "BEGIN") if component == "VEVENT" => {
                event = EventBuilder::default();
                state = State::Event;
            }
            (State::Calendar | State::Event, "BEGIN") => {
                debug!(line = line_no, component = %component, "skipping component");
                skip_depth = 1;
            }
            (State::Calendar, "END") if component == "VCALENDAR" => state = State::Done,
            (State::Event, "END") if component == "VEVENT" => {
                let published = event.build(line_no, default_tz)?;
                if let Some(previous) = artifact.insert(published) {
                    warn!(uid = %previous.identity, line = line_no, "duplicate UID, keeping the last one");
                }
                state = State::Calendar;
            }
            (State::Calendar | State::Event, "END") => {
                return Err(CalendarParseError::UnbalancedComponent {
                    line: line_no,
                    name: component,
                });
            }

            (State::Calendar, "VERSION" | "PRODID") => {}
            (State::Calendar, DATA_VERSION_KEY) => versions.push(unescape_text(&line.value)),
            (State::Calendar, _) => {
                artifact.push_metadata(MetadataLine::new(line.name, unescape_text(&line.value)));
            }

            (State::Event, _) => event.set(line_no, line),
        }
    }

    match state {
        State::Outside => return Err(CalendarParseError::MissingCalendar),
        State::Calendar => return Err(CalendarParseError::Unterminated("VCALENDAR")),
        State::Event => return Err(CalendarParseError::Unterminated("VEVENT")),
        State::Done => {}
    }

    artifact.data_version_marker = match versions.as_slice() {
        [] => None,
        [single] if single.trim().is_empty() => None,
        [single] => Some(single.trim().to_string()),
        many => {
            warn!(count = many.len(), "multiple {DATA_VERSION_KEY} lines, ignoring them");
            None
        }
    };

    Ok(artifact)
}

// ---------------------------------------------------------------------------
// Internals
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Outside,
    Calendar,
    Event,
    Done,
}

/// A property line kept with its position for error reporting.
#[derive(Debug, Clone)]
struct Located {
    line: usize,
    content: ContentLine,
}

#[derive(Debug, Default)]
struct EventBuilder {
    uid: Option<Located>,
    summary: Option<Located>,
    start: Option<Located>,
    end: Option<Located>,
    stamp: Option<Located>,
    created: Option<Located>,
    last_modified: Option<Located>,
    sequence: Option<Located>,
}

impl EventBuilder {
    fn set(&mut self, line: usize, content: ContentLine) {
        let slot = match content.name.as_str() {
            "UID" => &mut self.uid,
            "SUMMARY" => &mut self.summary,
            "DTSTART" => &mut self.start,
            "DTEND" => &mut self.end,
            "DTSTAMP" => &mut self.stamp,
            "CREATED" => &mut self.created,
            "LAST-MODIFIED" => &mut self.last_modified,
            "SEQUENCE" => &mut self.sequence,
            _ => return,
        };
        *slot = Some(Located { line, content });
    }

    fn build(&self, end_line: usize, tz: Tz) -> Result<PublishedEvent, CalendarParseError> {
        let missing = |property| CalendarParseError::MissingProperty {
            line: end_line,
            property,
        };

        let uid = self.uid.as_ref().ok_or_else(|| missing("UID"))?;
        let identity: Identity =
            uid.content
                .value
                .trim()
                .parse()
                .map_err(|_| CalendarParseError::InvalidUid {
                    line: uid.line,
                    value: uid.content.value.clone(),
                })?;

        let name = self
            .summary
            .as_ref()
            .map(|summary| unescape_text(&summary.content.value))
            .unwrap_or_default();
        let start = required_time(self.start.as_ref(), tz).ok_or_else(|| missing("DTSTART"))??;
        let end = required_time(self.end.as_ref(), tz).ok_or_else(|| missing("DTEND"))??;
        if start > end {
            return Err(CalendarParseError::InvertedInterval { uid: identity });
        }

        let stamp = required_time(self.stamp.as_ref(), tz).transpose()?;
        let created = required_time(self.created.as_ref(), tz).transpose()?;
        let last_modified = required_time(self.last_modified.as_ref(), tz).transpose()?;

        let created_at = created
            .or(last_modified)
            .or(stamp)
            .ok_or_else(|| missing("CREATED"))?;
        let last_modified_at = last_modified.or(created).or(stamp).unwrap_or(created_at);

        let revision = match &self.sequence {
            None => 0,
            Some(seq) => seq.content.value.trim().parse::<u32>().map_err(|_| {
                CalendarParseError::InvalidSequence {
                    line: seq.line,
                    value: seq.content.value.clone(),
                }
            })?,
        };

        Ok(PublishedEvent {
            identity,
            content: EventContent { name, start, end },
            created_at,
            last_modified_at,
            revision,
        })
    }
}

/// Parse an optional date-time property. `None` when absent.
fn required_time(
    located: Option<&Located>,
    tz: Tz,
) -> Option<Result<DateTime<Utc>, CalendarParseError>> {
    located.map(|located| {
        parse_date_time(&located.content, tz).ok_or_else(|| CalendarParseError::InvalidTime {
            line: located.line,
            property: located.content.name.clone(),
            value: located.content.value.clone(),
        })
    })
}

/// Accepts UTC (`...Z`), `TZID=` local, floating, `VALUE=DATE` and RFC 3339
/// forms. Sub-second precision is dropped.
fn parse_date_time(line: &ContentLine, default_tz: Tz) -> Option<DateTime<Utc>> {
    let value = line.value.trim();

    let instant = if let Some(naive) = value
        .strip_suffix('Z')
        .and_then(|local| NaiveDateTime::parse_from_str(local, LOCAL_FORMAT).ok())
    {
        Utc.from_utc_datetime(&naive)
    } else if value.contains('-') {
        DateTime::parse_from_rfc3339(value).ok()?.with_timezone(&Utc)
    } else {
        let tz = match line.param("TZID") {
            Some(tzid) => tzid.trim_start_matches('/').parse::<Tz>().ok()?,
            None => default_tz,
        };
        let naive = if value.len() == 8 {
            NaiveDate::parse_from_str(value, "%Y%m%d").ok()?.and_hms_opt(0, 0, 0)?
        } else {
            NaiveDateTime::parse_from_str(value, LOCAL_FORMAT).ok()?
        };
        tz.from_local_datetime(&naive).earliest()?.with_timezone(&Utc)
    };

    instant.with_nanosecond(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::resolve;
    use chrono_tz::Asia::Shanghai;

    const UID: &str = "c3c222ab-3ad2-340c-ba2e-bf59d02cf72f";

    fn doc(event_body: &str) -> String {
        format!(
            "BEGIN:VCALENDAR\r\nVERSION:2.0\r\nPRODID:test\r\nX-WR-CALNAME:cal\r\n\
             BEGIN:VEVENT\r\nUID:{UID}\r\n{event_body}END:VEVENT\r\nEND:VCALENDAR\r\n"
        )
    }

    #[test]
    fn parses_minimal_event() {
        let text = doc(
            "SUMMARY:第1期白羊座团队战\r\nDTSTART:20200524T210000Z\r\nDTEND:20200530T155959Z\r\n\
             CREATED:20200520T000000Z\r\nLAST-MODIFIED:20200521T000000Z\r\nSEQUENCE:2\r\n",
        );
        let artifact = parse_calendar(&text, Shanghai).expect("parse");

        let event = artifact
            .get(&resolve("pcr_cn/clan_battle_period/1001"))
            .expect("event present");
        assert_eq!(event.name(), "第1期白羊座团队战");
        assert_eq!(event.start().to_rfc3339(), "2020-05-24T21:00:00+00:00");
        assert_eq!(event.revision, 2);
        assert_eq!(event.created_at.to_rfc3339(), "2020-05-20T00:00:00+00:00");
        assert_eq!(event.last_modified_at.to_rfc3339(), "2020-05-21T00:00:00+00:00");
        assert_eq!(artifact.metadata_value("X-WR-CALNAME"), Some("cal"));
        assert_eq!(artifact.metadata_value("VERSION"), None);
    }

    #[test]
    fn accepts_rfc3339_tzid_and_floating_times() {
        let text = doc(
            "SUMMARY:x\r\nDTSTART;TZID=/Asia/Shanghai:20200525T050000\r\nDTEND:20200531T000000\r\n\
             CREATED:2021-01-21T15:00:00.123456+08:00\r\n",
        );
        let artifact = parse_calendar(&text, Shanghai).expect("parse");
        let event = artifact.events()[0];

        assert_eq!(event.start().to_rfc3339(), "2020-05-24T21:00:00+00:00");
        assert_eq!(event.end().to_rfc3339(), "2020-05-30T16:00:00+00:00");
        assert_eq!(event.created_at.to_rfc3339(), "2021-01-21T07:00:00+00:00");
        assert_eq!(event.last_modified_at, event.created_at);
        assert_eq!(event.revision, 0);
    }

    #[test]
    fn missing_created_falls_back_to_dtstamp() {
        let text = doc(
            "SUMMARY:x\r\nDTSTART:20200524T210000Z\r\nDTEND:20200530T155959Z\r\nDTSTAMP:20200601T000000Z\r\n",
        );
        let artifact = parse_calendar(&text, Shanghai).expect("parse");
        let event = artifact.events()[0];
        assert_eq!(event.created_at.to_rfc3339(), "2020-06-01T00:00:00+00:00");
        assert_eq!(event.last_modified_at, event.created_at);
    }

    #[test]
    fn event_without_any_timestamp_is_rejected() {
        let text = doc("SUMMARY:x\r\nDTSTART:20200524T210000Z\r\nDTEND:20200530T155959Z\r\n");
        let err = parse_calendar(&text, Shanghai).expect_err("no created");
        assert!(matches!(
            err,
            CalendarParseError::MissingProperty { property: "CREATED", .. }
        ));
    }

    #[test]
    fn bad_values_are_reported_with_line_numbers() {
        let text = doc("SUMMARY:x\r\nDTSTART:yesterday\r\nDTEND:20200530T155959Z\r\n");
        let err = parse_calendar(&text, Shanghai).expect_err("bad time");
        assert_eq!(
            err,
            CalendarParseError::InvalidTime {
                line: 8,
                property: "DTSTART".to_string(),
                value: "yesterday".to_string(),
            }
        );

        let text = doc(
            "SUMMARY:x\r\nDTSTART:20200524T210000Z\r\nDTEND:20200530T155959Z\r\nCREATED:20200520T000000Z\r\nSEQUENCE:-1\r\n",
        );
        assert!(matches!(
            parse_calendar(&text, Shanghai).expect_err("bad sequence"),
            CalendarParseError::InvalidSequence { .. }
        ));
    }

    #[test]
    fn nested_and_unknown_components_are_skipped() {
        let text = doc(
            "SUMMARY:x\r\nDTSTART:20200524T210000Z\r\nDTEND:20200530T155959Z\r\nCREATED:20200520T000000Z\r\n\
             BEGIN:VALARM\r\nTRIGGER:-PT15M\r\nEND:VALARM\r\nX-UNKNOWN:1\r\n",
        )
        .replace(
            "BEGIN:VEVENT",
            "BEGIN:VTIMEZONE\r\nTZID:Asia/Shanghai\r\nBEGIN:STANDARD\r\nEND:STANDARD\r\nEND:VTIMEZONE\r\nBEGIN:VEVENT",
        );
        let artifact = parse_calendar(&text, Shanghai).expect("parse");
        assert_eq!(artifact.len(), 1);
        assert_eq!(artifact.metadata_value("TZID"), None);
    }

    #[test]
    fn version_marker_is_extracted() {
        let text = "BEGIN:VCALENDAR\nX-PCR-ICS-DB-VERSION:202101211454\nEND:VCALENDAR\n";
        let artifact = parse_calendar(text, Shanghai).expect("parse");
        assert_eq!(artifact.data_version_marker.as_deref(), Some("202101211454"));
        assert!(artifact.metadata_value(DATA_VERSION_KEY).is_none());

        let empty = "BEGIN:VCALENDAR\nX-PCR-ICS-DB-VERSION:\nEND:VCALENDAR\n";
        assert!(parse_calendar(empty, Shanghai)
            .expect("parse")
            .data_version_marker
            .is_none());

        let doubled =
            "BEGIN:VCALENDAR\nX-PCR-ICS-DB-VERSION:1\nX-PCR-ICS-DB-VERSION:2\nEND:VCALENDAR\n";
        assert!(parse_calendar(doubled, Shanghai)
            .expect("parse")
            .data_version_marker
            .is_none());
    }

    #[test]
    fn structural_errors() {
        assert_eq!(
            parse_calendar("", Shanghai).expect_err("empty"),
            CalendarParseError::MissingCalendar
        );
        assert_eq!(
            parse_calendar("BEGIN:VCALENDAR\nBEGIN:VEVENT\n", Shanghai).expect_err("open event"),
            CalendarParseError::Unterminated("VEVENT")
        );
        assert!(matches!(
            parse_calendar("BEGIN:VCALENDAR\nEND:VEVENT\n", Shanghai).expect_err("stray end"),
            CalendarParseError::UnbalancedComponent { .. }
        ));
        assert!(matches!(
            parse_calendar("BEGIN:VCALENDAR\nnot a content line\n", Shanghai)
                .expect_err("malformed"),
            CalendarParseError::MalformedLine { line: 2, .. }
        ));
    }

    #[test]
    fn duplicate_uid_keeps_last() {
        let event = |summary: &str| {
            format!(
                "BEGIN:VEVENT\nUID:{UID}\nSUMMARY:{summary}\nDTSTART:20200524T210000Z\n\
                 DTEND:20200530T155959Z\nCREATED:20200520T000000Z\nEND:VEVENT\n"
            )
        };
        let text = format!(
            "BEGIN:VCALENDAR\n{}{}END:VCALENDAR\n",
            event("first"),
            event("second")
        );
        let artifact = parse_calendar(&text, Shanghai).expect("parse");
        assert_eq!(artifact.len(), 1);
        assert_eq!(artifact.events()[0].name(), "second");
    }
}
