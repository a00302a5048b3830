use std::fmt;

/// Coarse failure class, so operators can tell infra hiccups from upstream
/// schema drift without parsing messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorClass {
    Network,
    Parse,
    Schema,
    Io,
    Config,
}

impl ErrorClass {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Network => "network",
            Self::Parse => "parse",
            Self::Schema => "schema",
            Self::Io => "io",
            Self::Config => "config",
        }
    }
}

impl fmt::Display for ErrorClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Machine-readable error codes for CI logs and operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    ConfigParseError,
    InvalidTimezone,
    InvalidReleaseTime,
    VersionFetchFailed,
    SnapshotFetchFailed,
    SnapshotDecompressFailed,
    ReferenceFetchFailed,
    SnapshotSchemaMismatch,
    SnapshotOpenFailed,
    TimestampParseFailed,
    InvalidSourceRow,
    CalendarParseFailed,
    ArtifactWriteFailed,
    LockContention,
    InternalUnexpected,
}

impl ErrorCode {
    /// Stable code identifier (`E####`) for machine parsing.
    #[must_use]
    pub const fn code(self) -> &'static str {
        match self {
            Self::ConfigParseError => "E1001",
            Self::InvalidTimezone => "E1002",
            Self::InvalidReleaseTime => "E1003",
            Self::VersionFetchFailed => "E2001",
            Self::SnapshotFetchFailed => "E2002",
            Self::SnapshotDecompressFailed => "E2003",
            Self::ReferenceFetchFailed => "E2004",
            Self::SnapshotSchemaMismatch => "E3001",
            Self::SnapshotOpenFailed => "E3002",
            Self::TimestampParseFailed => "E4001",
            Self::InvalidSourceRow => "E4002",
            Self::CalendarParseFailed => "E4003",
            Self::ArtifactWriteFailed => "E5001",
            Self::LockContention => "E5002",
            Self::InternalUnexpected => "E9001",
        }
    }

    #[must_use]
    pub const fn class(self) -> ErrorClass {
        match self {
            Self::ConfigParseError | Self::InvalidTimezone | Self::InvalidReleaseTime => {
                ErrorClass::Config
            }
            Self::VersionFetchFailed
            | Self::SnapshotFetchFailed
            | Self::SnapshotDecompressFailed
            | Self::ReferenceFetchFailed => ErrorClass::Network,
            Self::SnapshotSchemaMismatch => ErrorClass::Schema,
            Self::TimestampParseFailed | Self::InvalidSourceRow | Self::CalendarParseFailed => {
                ErrorClass::Parse
            }
            Self::SnapshotOpenFailed
            | Self::ArtifactWriteFailed
            | Self::LockContention
            | Self::InternalUnexpected => ErrorClass::Io,
        }
    }

    /// Short human-facing summary for logs and terminal output.
    #[must_use]
    pub const fn message(self) -> &'static str {
        match self {
            Self::ConfigParseError => "Config file parse error",
            Self::InvalidTimezone => "Unknown calendar timezone",
            Self::InvalidReleaseTime => "Invalid release time",
            Self::VersionFetchFailed => "Version check failed",
            Self::SnapshotFetchFailed => "Snapshot download failed",
            Self::SnapshotDecompressFailed => "Snapshot decompression failed",
            Self::ReferenceFetchFailed => "Reference calendar download failed",
            Self::SnapshotSchemaMismatch => "Snapshot schema mismatch",
            Self::SnapshotOpenFailed => "Snapshot database could not be opened",
            Self::TimestampParseFailed => "Malformed source timestamp",
            Self::InvalidSourceRow => "Unexpected source row",
            Self::CalendarParseFailed => "Reference calendar parse error",
            Self::ArtifactWriteFailed => "Calendar write failed",
            Self::LockContention => "Lock contention",
            Self::InternalUnexpected => "Internal unexpected error",
        }
    }

    /// Optional remediation hint that can be surfaced to operators.
    #[must_use]
    pub const fn hint(self) -> Option<&'static str> {
        match self {
            Self::ConfigParseError => Some("Fix syntax in pcr-ics.toml and retry."),
            Self::InvalidTimezone => Some("Use an IANA zone name such as Asia/Shanghai."),
            Self::InvalidReleaseTime => Some("Use the form YYYY-MM-DDTHH:MM:SS."),
            Self::VersionFetchFailed
            | Self::SnapshotFetchFailed
            | Self::SnapshotDecompressFailed
            | Self::ReferenceFetchFailed => Some("Transient upstream failure; re-run later."),
            Self::SnapshotSchemaMismatch => {
                Some("The upstream database layout changed; update the affected adapter.")
            }
            Self::SnapshotOpenFailed => Some("Check that the snapshot is a readable SQLite file."),
            Self::TimestampParseFailed | Self::InvalidSourceRow => {
                Some("The upstream data format changed; inspect the reported row.")
            }
            Self::CalendarParseFailed => {
                Some("Pass --ref-calendar-path none to rebuild the calendar from scratch.")
            }
            Self::ArtifactWriteFailed => Some("Check disk space and write permissions."),
            Self::LockContention => Some("Retry after the other pcr-ics process finishes."),
            Self::InternalUnexpected => Some("Retry once. If persistent, report a bug with logs."),
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}
