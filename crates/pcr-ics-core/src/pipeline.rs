//! Run orchestration.
//!
//! One run: ask the upstream for its current data version, stop if the
//! previous artifact already carries it, otherwise fetch the snapshot, run
//! every adapter, clamp to the release window and merge.
//!
//! Publishing the resulting artifact is left to the caller.

use std::path::Path;

use chrono::{DateTime, Timelike, Utc};
use rusqlite::Connection;
use serde::Serialize;
use tracing::{debug, info};

use crate::clamp::clamp;
use crate::config::{CalendarConfig, ConfigError};
use crate::error::ErrorCode;
use crate::merge::{MergeReport, merge};
use crate::model::CalendarArtifact;
use crate::snapshot::{SnapshotOpenError, open_snapshot};
use crate::source::{SourceContext, SourceError, collect_candidates, registry};

/// File name the snapshot is stored under inside the run's work directory.
pub const SNAPSHOT_FILE: &str = "snapshot.db";

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

type BoxError = Box<dyn std::error::Error + Send + Sync>;

#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error("version check at {url} failed: {source}")]
    Version {
        url: String,
        #[source]
        source: BoxError,
    },

    #[error("snapshot download from {url} failed: {source}")]
    Snapshot {
        url: String,
        #[source]
        source: BoxError,
    },

    #[error("snapshot decompression failed: {source}")]
    Decompress {
        #[source]
        source: BoxError,
    },

    #[error("reference calendar download from {url} failed: {source}")]
    Reference {
        url: String,
        #[source]
        source: BoxError,
    },
}

impl FetchError {
    #[must_use]
    pub const fn code(&self) -> ErrorCode {
        match self {
            Self::Version { .. } => ErrorCode::VersionFetchFailed,
            Self::Snapshot { .. } => ErrorCode::SnapshotFetchFailed,
            Self::Decompress { .. } => ErrorCode::SnapshotDecompressFailed,
            Self::Reference { .. } => ErrorCode::ReferenceFetchFailed,
        }
    }
}

/// Any failure that aborts a run before publication.
#[derive(Debug, thiserror::Error)]
pub enum RunError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Fetch(#[from] FetchError),
    #[error(transparent)]
    Snapshot(#[from] SnapshotOpenError),
    #[error(transparent)]
    Source(#[from] SourceError),
}

impl RunError {
    #[must_use]
    pub const fn code(&self) -> ErrorCode {
        match self {
            Self::Config(err) => err.code(),
            Self::Fetch(err) => err.code(),
            Self::Snapshot(_) => ErrorCode::SnapshotOpenFailed,
            Self::Source(err) => err.code(),
        }
    }
}

// ---------------------------------------------------------------------------
// Upstream
// ---------------------------------------------------------------------------

/// Where snapshots come from.
pub trait Upstream {
    /// The data version currently served.
    ///
    /// # Errors
    ///
    /// Returns [`FetchError::Version`] when the version cannot be determined.
    fn latest_version(&self) -> Result<String, FetchError>;

    /// Store the snapshot for `version` as a SQLite file at `dest`.
    ///
    /// # Errors
    ///
    /// Returns a [`FetchError`] on transfer or decompression failure.
    fn download_snapshot(&self, version: &str, dest: &Path) -> Result<(), FetchError>;
}

// ---------------------------------------------------------------------------
// Settings and reports
// ---------------------------------------------------------------------------

/// Calendar-derived settings shared by every step of a run.
#[derive(Debug, Clone)]
pub struct RunSettings {
    pub source: SourceContext,
    pub release_instant: DateTime<Utc>,
}

impl RunSettings {
    /// # Errors
    ///
    /// Returns an error for an unknown timezone or invalid release time.
    pub fn from_config(calendar: &CalendarConfig) -> Result<Self, ConfigError> {
        Ok(Self {
            source: SourceContext::new(calendar.timezone()?, calendar.identity_prefix.clone()),
            release_instant: calendar.release_instant()?,
        })
    }
}

/// What one generation pass did, end to end.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RunReport {
    /// Rows mapped by the adapters.
    pub candidates: usize,
    /// Candidates that ended before the release instant.
    pub before_release: usize,
    /// Candidates whose start was moved up to the release instant.
    pub clamped: usize,
    pub merge: MergeReport,
}

#[derive(Debug, Clone)]
pub struct Generated {
    pub artifact: CalendarArtifact,
    pub report: RunReport,
}

#[derive(Debug, Clone)]
pub enum RunOutcome {
    /// The previous artifact already reflects `version`.
    UpToDate { version: String },
    /// A new artifact was generated for `version`.
    Updated {
        version: String,
        artifact: CalendarArtifact,
        report: RunReport,
    },
}

// ---------------------------------------------------------------------------
// Public API
// ---------------------------------------------------------------------------

/// Drop sub-second precision; artifacts store whole seconds.
#[must_use]
pub fn truncate_to_seconds(instant: DateTime<Utc>) -> DateTime<Utc> {
    instant.with_nanosecond(0).unwrap_or(instant)
}

/// Derive, clamp and merge the events of one open snapshot.
///
/// The returned artifact keeps `previous`'s metadata and marker.
///
/// # Errors
///
/// Returns the first adapter failure; nothing is merged in that case.
pub fn generate_calendar(
    conn: &Connection,
    previous: &CalendarArtifact,
    settings: &RunSettings,
    run_timestamp: DateTime<Utc>,
) -> Result<Generated, SourceError> {
    let candidates = collect_candidates(conn, &registry(), &settings.source)?;
    let mut report = RunReport {
        candidates: candidates.len(),
        ..RunReport::default()
    };

    let mut released = Vec::with_capacity(candidates.len());
    for candidate in candidates {
        let original_start = candidate.start();
        match clamp(candidate, settings.release_instant) {
            None => report.before_release += 1,
            Some(kept) => {
                if kept.start() != original_start {
                    report.clamped += 1;
                }
                released.push(kept);
            }
        }
    }
    debug!(
        before_release = report.before_release,
        clamped = report.clamped,
        "release window applied"
    );

    let outcome = merge(previous, released, run_timestamp);
    report.merge = outcome.report;
    Ok(Generated {
        artifact: outcome.artifact,
        report,
    })
}

/// Execute one run against `upstream`.
///
/// The snapshot is stored in `workdir`, which the caller owns and removes.
///
/// # Errors
///
/// Returns a [`RunError`] for upstream, snapshot or adapter failures. No
/// artifact is produced in that case.
pub fn run(
    upstream: &dyn Upstream,
    previous: &CalendarArtifact,
    settings: &RunSettings,
    run_timestamp: DateTime<Utc>,
    workdir: &Path,
) -> Result<RunOutcome, RunError> {
    let version = upstream.latest_version()?;
    if previous.data_version_marker.as_deref() == Some(version.as_str()) {
        info!(version = %version, "calendar already up to date");
        return Ok(RunOutcome::UpToDate { version });
    }

    info!(
        version = %version,
        previous = previous.data_version_marker.as_deref().unwrap_or("none"),
        "new data version"
    );
    let snapshot_path = workdir.join(SNAPSHOT_FILE);
    upstream.download_snapshot(&version, &snapshot_path)?;
    let conn = open_snapshot(&snapshot_path)?;

    let Generated {
        mut artifact,
        report,
    } = generate_calendar(&conn, previous, settings, truncate_to_seconds(run_timestamp))?;
    artifact.data_version_marker = Some(version.clone());

    info!(
        events = artifact.len(),
        created = report.merge.created,
        updated = report.merge.updated,
        dropped = report.merge.dropped_stale,
        "calendar generated"
    );
    Ok(RunOutcome::Updated {
        version,
        artifact,
        report,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::resolve;
    use crate::source::fixtures;
    use chrono::TimeZone;
    use std::cell::Cell;

    fn settings() -> RunSettings {
        RunSettings::from_config(&CalendarConfig::default()).expect("default settings")
    }

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2021, 1, 21, 7, 0, 0)
            .single()
            .expect("valid timestamp")
    }

    struct FakeUpstream {
        version: &'static str,
        rows: &'static str,
        downloads: Cell<usize>,
    }

    impl FakeUpstream {
        fn new(version: &'static str, rows: &'static str) -> Self {
            Self {
                version,
                rows,
                downloads: Cell::new(0),
            }
        }
    }

    impl Upstream for FakeUpstream {
        fn latest_version(&self) -> Result<String, FetchError> {
            Ok(self.version.to_string())
        }

        fn download_snapshot(&self, _version: &str, dest: &Path) -> Result<(), FetchError> {
            self.downloads.set(self.downloads.get() + 1);
            let conn = Connection::open(dest).map_err(|err| FetchError::Snapshot {
                url: "fake".to_string(),
                source: Box::new(err),
            })?;
            conn.execute_batch(fixtures::SCHEMA)
                .and_then(|()| conn.execute_batch(self.rows))
                .map_err(|err| FetchError::Snapshot {
                    url: "fake".to_string(),
                    source: Box::new(err),
                })
        }
    }

    struct OfflineUpstream;

    impl Upstream for OfflineUpstream {
        fn latest_version(&self) -> Result<String, FetchError> {
            Err(FetchError::Version {
                url: "https://example.invalid/version.json".to_string(),
                source: "connection refused".into(),
            })
        }

        fn download_snapshot(&self, _version: &str, _dest: &Path) -> Result<(), FetchError> {
            unreachable!("version check fails first")
        }
    }

    const ROWS: &str = "
        INSERT INTO clan_battle_period VALUES (1001, '2020/05/25 05:00:00', '2020/05/30 23:59:59');
        INSERT INTO tower_schedule VALUES (1, '2020/04/10 05:00:00', '2020/05/01 04:59:59', 10);
        INSERT INTO tower_area_data VALUES (10, 150);
        INSERT INTO hatsune_schedule VALUES (7, '2020/03/01 05:00:00', '2020/03/10 04:59:59');
        INSERT INTO event_story_data VALUES (1, 7, 'old event');
    ";

    #[test]
    fn settings_from_default_config() {
        let settings = settings();
        assert_eq!(settings.release_instant.to_rfc3339(), "2020-04-17T03:00:00+00:00");
        assert_eq!(settings.source.identity_prefix, "pcr_cn");
    }

    #[test]
    fn truncates_sub_second_precision() {
        let precise = now() + chrono::Duration::milliseconds(1500);
        assert_eq!(truncate_to_seconds(precise), now() + chrono::Duration::seconds(1));
    }

    #[test]
    fn generate_applies_release_window_and_merges() {
        let conn = fixtures::snapshot();
        conn.execute_batch(ROWS).expect("seed rows");

        let generated = generate_calendar(&conn, &CalendarArtifact::empty(), &settings(), now())
            .expect("generate");

        assert_eq!(generated.report.candidates, 3);
        assert_eq!(generated.report.before_release, 1);
        assert_eq!(generated.report.clamped, 1);
        assert_eq!(generated.report.merge.created, 2);

        let tower = generated
            .artifact
            .get(&resolve("pcr_cn/tower_schedule/1"))
            .expect("tower kept");
        assert_eq!(tower.start(), settings().release_instant);
        assert!(
            generated
                .artifact
                .get(&resolve("pcr_cn/hatsune_schedule/7"))
                .is_none()
        );
    }

    #[test]
    fn run_skips_download_when_marker_matches() {
        let dir = tempfile::tempdir().expect("create temp dir");
        let upstream = FakeUpstream::new("202101211454", ROWS);
        let mut previous = CalendarArtifact::fresh("cal", "desc", "Asia/Shanghai");
        previous.data_version_marker = Some("202101211454".to_string());

        let outcome = run(&upstream, &previous, &settings(), now(), dir.path()).expect("run");
        assert!(matches!(outcome, RunOutcome::UpToDate { ref version } if version == "202101211454"));
        assert_eq!(upstream.downloads.get(), 0);
    }

    #[test]
    fn run_generates_and_stamps_new_version() {
        let dir = tempfile::tempdir().expect("create temp dir");
        let upstream = FakeUpstream::new("202101211454", ROWS);
        let mut previous = CalendarArtifact::fresh("cal", "desc", "Asia/Shanghai");
        previous.data_version_marker = Some("202101010000".to_string());

        let outcome = run(&upstream, &previous, &settings(), now(), dir.path()).expect("run");
        let RunOutcome::Updated {
            version, artifact, ..
        } = outcome
        else {
            panic!("expected an update");
        };
        assert_eq!(version, "202101211454");
        assert_eq!(artifact.data_version_marker.as_deref(), Some("202101211454"));
        assert_eq!(artifact.metadata_value("X-WR-CALNAME"), Some("cal"));
        assert_eq!(artifact.len(), 2);
        assert_eq!(upstream.downloads.get(), 1);
    }

    #[test]
    fn upstream_failure_aborts_with_network_code() {
        let dir = tempfile::tempdir().expect("create temp dir");
        let err = run(
            &OfflineUpstream,
            &CalendarArtifact::empty(),
            &settings(),
            now(),
            dir.path(),
        )
        .expect_err("offline");
        assert_eq!(err.code(), ErrorCode::VersionFetchFailed);
        assert_eq!(err.code().class(), crate::error::ErrorClass::Network);
    }

    #[test]
    fn schema_drift_aborts_run() {
        let dir = tempfile::tempdir().expect("create temp dir");
        let upstream = FakeUpstream::new(
            "2",
            "DROP TABLE tower_area_data; INSERT INTO tower_schedule VALUES (1, '2021/01/01 05:00:00', '2021/01/02 05:00:00', 10);",
        );
        let err = run(&upstream, &CalendarArtifact::empty(), &settings(), now(), dir.path())
            .expect_err("missing table");
        assert_eq!(err.code(), ErrorCode::SnapshotSchemaMismatch);
    }
}
