//! Loading the previously published calendar a run merges against.

use std::fs;
use std::io;
use std::path::PathBuf;

use anyhow::{Context, Result};
use chrono_tz::Tz;
use pcr_ics_core::config::CalendarConfig;
use pcr_ics_core::ics::parse_calendar;
use pcr_ics_core::model::CalendarArtifact;
use pcr_ics_core::pipeline::FetchError;
use tracing::{info, warn};

/// Where the previous artifact comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reference {
    /// Start from an empty calendar.
    None,
    Url(String),
    Path(PathBuf),
}

impl Reference {
    /// `none`, an `http://`/`https://` URL, or anything else as a path.
    pub fn parse(raw: &str) -> Self {
        let raw = raw.trim();
        if raw.eq_ignore_ascii_case("none") {
            Self::None
        } else if raw.starts_with("http://") || raw.starts_with("https://") {
            Self::Url(raw.to_string())
        } else {
            Self::Path(PathBuf::from(raw))
        }
    }
}

/// Load the reference calendar.
///
/// `Reference::None` and a path that does not exist both yield a fresh
/// calendar carrying the configured name, description and timezone.
pub fn load_reference(
    reference: &Reference,
    calendar: &CalendarConfig,
) -> Result<CalendarArtifact> {
    let fresh =
        || CalendarArtifact::fresh(&calendar.name, &calendar.description, &calendar.timezone);
    let tz = calendar.timezone()?;

    match reference {
        Reference::None => {
            info!("no reference calendar, starting fresh");
            Ok(fresh())
        }
        Reference::Url(url) => {
            info!(url = %url, "fetching reference calendar");
            let text = fetch_text(url)?;
            parse_reference(&text, tz, url)
        }
        Reference::Path(path) => match fs::read_to_string(path) {
            Ok(text) => {
                info!(path = %path.display(), "loading reference calendar");
                parse_reference(&text, tz, &path.display().to_string())
            }
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                warn!(path = %path.display(), "reference calendar not found, starting fresh");
                Ok(fresh())
            }
            Err(err) => Err(err)
                .with_context(|| format!("failed to read reference calendar {}", path.display())),
        },
    }
}

fn fetch_text(url: &str) -> Result<String, FetchError> {
    let reference_error =
        |source: Box<dyn std::error::Error + Send + Sync>| FetchError::Reference {
            url: url.to_string(),
            source,
        };

    ureq::get(url)
        .call()
        .map_err(|err| reference_error(err.to_string().into()))?
        .into_string()
        .map_err(|err| reference_error(Box::new(err)))
}

fn parse_reference(text: &str, tz: Tz, origin: &str) -> Result<CalendarArtifact> {
    let artifact = parse_calendar(text, tz)
        .with_context(|| format!("failed to parse reference calendar {origin}"))?;
    info!(
        events = artifact.len(),
        version = artifact.data_version_marker.as_deref().unwrap_or("none"),
        "reference calendar loaded"
    );
    Ok(artifact)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pcr_ics_core::ics::CalendarParseError;

    #[test]
    fn parses_reference_kinds() {
        assert_eq!(Reference::parse("none"), Reference::None);
        assert_eq!(Reference::parse("NONE"), Reference::None);
        assert_eq!(
            Reference::parse("https://wlkz.github.io/pcr_ics/dist/pcr_cn.ics"),
            Reference::Url("https://wlkz.github.io/pcr_ics/dist/pcr_cn.ics".to_string())
        );
        assert_eq!(
            Reference::parse("deploy/dist/pcr_cn.ics"),
            Reference::Path(PathBuf::from("deploy/dist/pcr_cn.ics"))
        );
    }

    #[test]
    fn none_and_missing_path_start_fresh() {
        let calendar = CalendarConfig::default();
        let fresh = load_reference(&Reference::None, &calendar).expect("fresh");
        assert!(fresh.is_empty());
        assert_eq!(fresh.metadata_value("METHOD"), Some("PUBLISH"));
        assert_eq!(fresh.metadata_value("X-WR-TIMEZONE"), Some("Asia/Shanghai"));
        assert!(fresh.data_version_marker.is_none());

        let dir = tempfile::tempdir().expect("create temp dir");
        let missing = Reference::Path(dir.path().join("missing.ics"));
        assert_eq!(load_reference(&missing, &calendar).expect("fresh"), fresh);
    }

    #[test]
    fn existing_path_is_parsed_with_its_own_metadata() {
        let dir = tempfile::tempdir().expect("create temp dir");
        let path = dir.path().join("pcr_cn.ics");
        fs::write(
            &path,
            "BEGIN:VCALENDAR\r\nX-WR-CALNAME:old name\r\nX-PCR-ICS-DB-VERSION:42\r\nEND:VCALENDAR\r\n",
        )
        .expect("write reference");

        let artifact =
            load_reference(&Reference::Path(path), &CalendarConfig::default()).expect("load");
        assert_eq!(artifact.metadata_value("X-WR-CALNAME"), Some("old name"));
        assert_eq!(artifact.data_version_marker.as_deref(), Some("42"));
    }

    #[test]
    fn malformed_reference_keeps_parse_error_in_chain() {
        let dir = tempfile::tempdir().expect("create temp dir");
        let path = dir.path().join("broken.ics");
        fs::write(&path, "this is not a calendar\n").expect("write reference");

        let err = load_reference(&Reference::Path(path), &CalendarConfig::default())
            .expect_err("malformed");
        assert!(err.downcast_ref::<CalendarParseError>().is_some());
    }
}
