//! Atomic replacement of the target calendar and the CI commit line.

use std::ffi::OsString;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use pcr_ics_core::error::ErrorCode;
use pcr_ics_core::ics::write_calendar;
use pcr_ics_core::lock::{ArtifactLock, DEFAULT_LOCK_TIMEOUT, LockError};
use pcr_ics_core::model::CalendarArtifact;
use tracing::{debug, info};

/// Name of the GitHub Actions step output carrying the commit message.
pub const CI_OUTPUT_NAME: &str = "PCR_ICS_COMMIT";

#[derive(Debug, thiserror::Error)]
pub enum PublishError {
    #[error(transparent)]
    Lock(#[from] LockError),

    #[error("failed to write {}: {source}", path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

impl PublishError {
    pub const fn code(&self) -> ErrorCode {
        match self {
            Self::Lock(err) => err.code(),
            Self::Write { .. } => ErrorCode::ArtifactWriteFailed,
        }
    }
}

/// Write `artifact` to `target` under the target's lock.
///
/// The document goes to `<target>.tmp` first and is renamed over `target`,
/// so readers see either the old or the new calendar. Returns the number of
/// bytes written.
pub fn publish(target: &Path, artifact: &CalendarArtifact) -> Result<usize, PublishError> {
    let _lock = ArtifactLock::acquire(target, DEFAULT_LOCK_TIMEOUT)?;
    let text = write_calendar(artifact);
    let tmp = sibling_with_suffix(target, ".tmp");

    let write_error = |path: &Path| {
        let path = path.to_path_buf();
        move |source: io::Error| PublishError::Write { path, source }
    };

    if let Err(err) = fs::write(&tmp, text.as_bytes()) {
        let _ = fs::remove_file(&tmp);
        return Err(write_error(&tmp)(err));
    }
    if let Err(err) = fs::rename(&tmp, target) {
        let _ = fs::remove_file(&tmp);
        return Err(write_error(target)(err));
    }

    debug!(tmp = %tmp.display(), "renamed over target");
    info!(target = %target.display(), events = artifact.len(), "calendar published");
    Ok(text.len())
}

fn sibling_with_suffix(path: &Path, suffix: &str) -> PathBuf {
    let mut raw: OsString = path.as_os_str().to_os_string();
    raw.push(suffix);
    PathBuf::from(raw)
}

/// What the run did, as far as CI is concerned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CiEvent<'a> {
    UpToDate { github_sha: Option<&'a str> },
    Bumped { version: &'a str },
}

/// Commit message for the deploy step.
pub fn commit_message(event: CiEvent<'_>) -> String {
    match event {
        CiEvent::UpToDate { github_sha } => {
            let from = github_sha
                .filter(|sha| !sha.is_empty())
                .map(|sha| format!("from {sha} "))
                .unwrap_or_default();
            format!("deploy: triggered update {from}(github_actions)")
        }
        CiEvent::Bumped { version } => {
            format!("deploy: bump ics file to version {version} (github_actions)")
        }
    }
}

/// GitHub Actions workflow command setting the step output.
pub fn ci_output_line(event: CiEvent<'_>) -> String {
    format!("::set-output name={CI_OUTPUT_NAME}::{}", commit_message(event))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pcr_ics_core::ics::parse_calendar;

    #[test]
    fn publish_creates_parents_and_leaves_no_temp_file() {
        let dir = tempfile::tempdir().expect("create temp dir");
        let target = dir.path().join("deploy/dist/pcr_cn.ics");
        let mut artifact = CalendarArtifact::fresh("cal", "desc", "Asia/Shanghai");
        artifact.data_version_marker = Some("9".to_string());

        let written = publish(&target, &artifact).expect("publish");
        let text = fs::read_to_string(&target).expect("read target");
        assert_eq!(written, text.len());
        assert!(!sibling_with_suffix(&target, ".tmp").exists());

        let parsed = parse_calendar(&text, chrono_tz::Asia::Shanghai).expect("parse");
        assert_eq!(parsed.data_version_marker.as_deref(), Some("9"));
    }

    #[test]
    fn publish_replaces_existing_target() {
        let dir = tempfile::tempdir().expect("create temp dir");
        let target = dir.path().join("pcr_cn.ics");
        fs::write(&target, "old").expect("seed target");

        publish(&target, &CalendarArtifact::empty()).expect("publish");
        let text = fs::read_to_string(&target).expect("read target");
        assert!(text.starts_with("BEGIN:VCALENDAR\r\n"));
    }

    #[test]
    fn failed_write_leaves_target_untouched() {
        let dir = tempfile::tempdir().expect("create temp dir");
        let target = dir.path().join("pcr_cn.ics");
        fs::write(&target, "old").expect("seed target");
        fs::create_dir(sibling_with_suffix(&target, ".tmp")).expect("block temp path");

        let err = publish(&target, &CalendarArtifact::empty()).expect_err("temp path is a dir");
        assert_eq!(err.code(), ErrorCode::ArtifactWriteFailed);
        assert_eq!(fs::read_to_string(&target).expect("read target"), "old");
    }

    #[cfg(unix)]
    #[test]
    fn failed_temp_write_leaves_no_temp_entry() {
        let dir = tempfile::tempdir().expect("create temp dir");
        let target = dir.path().join("pcr_cn.ics");
        let tmp = sibling_with_suffix(&target, ".tmp");
        std::os::unix::fs::symlink(dir.path().join("missing/pcr_cn.ics"), &tmp)
            .expect("dangling temp link");

        let err = publish(&target, &CalendarArtifact::empty()).expect_err("temp not writable");
        assert_eq!(err.code(), ErrorCode::ArtifactWriteFailed);
        assert!(fs::symlink_metadata(&tmp).is_err());
        assert!(!target.exists());
    }

    #[test]
    fn commit_messages() {
        assert_eq!(
            commit_message(CiEvent::UpToDate {
                github_sha: Some("abc123")
            }),
            "deploy: triggered update from abc123 (github_actions)"
        );
        assert_eq!(
            commit_message(CiEvent::UpToDate { github_sha: None }),
            "deploy: triggered update (github_actions)"
        );
        assert_eq!(
            ci_output_line(CiEvent::Bumped {
                version: "202101211454"
            }),
            "::set-output name=PCR_ICS_COMMIT::deploy: bump ics file to version 202101211454 (github_actions)"
        );
    }
}
