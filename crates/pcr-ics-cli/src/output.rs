//! Human/JSON output for the run summary and for errors.
//!
//! Results go to stdout, errors to stderr. Logs never touch stdout, so a CI
//! step can capture the `::set-output` line and the summary unmixed.

use std::io::{self, Write};

use pcr_ics_core::config::ConfigError;
use pcr_ics_core::error::ErrorCode;
use pcr_ics_core::ics::CalendarParseError;
use pcr_ics_core::lock::LockError;
use pcr_ics_core::pipeline::{FetchError, RunError};
use pcr_ics_core::snapshot::SnapshotOpenError;
use pcr_ics_core::source::SourceError;
use serde::Serialize;

use crate::publish::PublishError;

/// Width of the key column in human output.
const KEY_WIDTH: usize = 12;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputMode {
    Human,
    Json,
}

impl OutputMode {
    pub const fn from_json_flag(json: bool) -> Self {
        if json { Self::Json } else { Self::Human }
    }

    pub const fn is_json(self) -> bool {
        matches!(self, Self::Json)
    }
}

/// Render a left-aligned key/value line in human output.
pub fn pretty_kv(w: &mut dyn Write, key: &str, value: impl AsRef<str>) -> io::Result<()> {
    writeln!(w, "{:<KEY_WIDTH$} {}", format!("{key}:"), value.as_ref())
}

/// Render a serializable value to stdout in the requested format.
///
/// In human mode the `human_fn` closure produces the text.
pub fn render<T: Serialize>(
    mode: OutputMode,
    value: &T,
    human_fn: impl FnOnce(&T, &mut dyn Write) -> io::Result<()>,
) -> anyhow::Result<()> {
    let stdout = io::stdout();
    let mut out = stdout.lock();
    match mode {
        OutputMode::Json => {
            serde_json::to_writer_pretty(&mut out, value)?;
            writeln!(out)?;
        }
        OutputMode::Human => human_fn(value, &mut out)?,
    }
    Ok(())
}

/// A failed run as shown to operators.
#[derive(Debug, Serialize)]
pub struct CliError {
    pub message: String,
    /// Machine-readable code, e.g. `E2001`.
    pub error_code: &'static str,
    /// `network`, `parse`, `schema`, `io` or `config`.
    pub class: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub suggestion: Option<&'static str>,
}

impl From<&anyhow::Error> for CliError {
    fn from(err: &anyhow::Error) -> Self {
        let code = error_code(err);
        Self {
            message: format!("{err:#}"),
            error_code: code.code(),
            class: code.class().as_str(),
            suggestion: code.hint(),
        }
    }
}

/// Find the first coded error in the chain.
pub fn error_code(err: &anyhow::Error) -> ErrorCode {
    for cause in err.chain() {
        if let Some(err) = cause.downcast_ref::<RunError>() {
            return err.code();
        }
        if let Some(err) = cause.downcast_ref::<FetchError>() {
            return err.code();
        }
        if let Some(err) = cause.downcast_ref::<ConfigError>() {
            return err.code();
        }
        if let Some(err) = cause.downcast_ref::<CalendarParseError>() {
            return err.code();
        }
        if let Some(err) = cause.downcast_ref::<SourceError>() {
            return err.code();
        }
        if cause.downcast_ref::<SnapshotOpenError>().is_some() {
            return ErrorCode::SnapshotOpenFailed;
        }
        if let Some(err) = cause.downcast_ref::<PublishError>() {
            return err.code();
        }
        if let Some(err) = cause.downcast_ref::<LockError>() {
            return err.code();
        }
    }
    ErrorCode::InternalUnexpected
}

/// Render an error to stderr.
///
/// Human form: `error[E####]: message` followed by an optional hint line.
pub fn render_error(mode: OutputMode, error: &CliError) -> anyhow::Result<()> {
    let stderr = io::stderr();
    let mut out = stderr.lock();
    match mode {
        OutputMode::Json => {
            let wrapper = serde_json::json!({ "error": error });
            serde_json::to_writer_pretty(&mut out, &wrapper)?;
            writeln!(out)?;
        }
        OutputMode::Human => {
            writeln!(out, "error[{}]: {}", error.error_code, error.message)?;
            if let Some(suggestion) = error.suggestion {
                writeln!(out, "  hint: {suggestion}")?;
            }
        }
    }
    Ok(())
}
