use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::ErrorCode;

/// File name looked up in the working directory.
pub const LOCAL_CONFIG_FILE: &str = "pcr-ics.toml";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub upstream: UpstreamConfig,
    #[serde(default)]
    pub calendar: CalendarConfig,
    #[serde(default)]
    pub publish: PublishConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpstreamConfig {
    #[serde(default = "default_version_url")]
    pub version_url: String,
    #[serde(default = "default_database_url")]
    pub database_url: String,
    /// Field of the version JSON holding the data-version marker.
    #[serde(default = "default_version_field")]
    pub version_field: String,
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            version_url: default_version_url(),
            database_url: default_database_url(),
            version_field: default_version_field(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CalendarConfig {
    #[serde(default = "default_calendar_name")]
    pub name: String,
    #[serde(default = "default_calendar_description")]
    pub description: String,
    /// IANA zone the source tables are written in.
    #[serde(default = "default_timezone")]
    pub timezone: String,
    /// Server launch, as wall time in `timezone`.
    #[serde(default = "default_release_time")]
    pub release_time: String,
    #[serde(default = "default_identity_prefix")]
    pub identity_prefix: String,
}

impl Default for CalendarConfig {
    fn default() -> Self {
        Self {
            name: default_calendar_name(),
            description: default_calendar_description(),
            timezone: default_timezone(),
            release_time: default_release_time(),
            identity_prefix: default_identity_prefix(),
        }
    }
}

impl CalendarConfig {
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidTimezone`] for an unknown zone name.
    pub fn timezone(&self) -> Result<Tz, ConfigError> {
        self.timezone
            .parse::<Tz>()
            .map_err(|_| ConfigError::InvalidTimezone(self.timezone.clone()))
    }

    /// The release instant: `release_time` localized in `timezone`.
    ///
    /// # Errors
    ///
    /// Returns an error if the zone is unknown or the time does not parse or
    /// does not exist in that zone.
    pub fn release_instant(&self) -> Result<DateTime<Utc>, ConfigError> {
        let tz = self.timezone()?;
        let naive = NaiveDateTime::parse_from_str(self.release_time.trim(), "%Y-%m-%dT%H:%M:%S")
            .map_err(|source| ConfigError::InvalidReleaseTime {
                raw: self.release_time.clone(),
                reason: source.to_string(),
            })?;
        tz.from_local_datetime(&naive)
            .earliest()
            .map(|local| local.with_timezone(&Utc))
            .ok_or_else(|| ConfigError::InvalidReleaseTime {
                raw: self.release_time.clone(),
                reason: format!("does not exist in {tz}"),
            })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PublishConfig {
    /// `none`, an `http(s)` URL or a local path.
    #[serde(default = "default_reference")]
    pub reference: String,
    #[serde(default = "default_target")]
    pub target: PathBuf,
}

impl Default for PublishConfig {
    fn default() -> Self {
        Self {
            reference: default_reference(),
            target: default_target(),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read {}: {source}", path.display())]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to parse {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
    #[error("unknown timezone '{0}'")]
    InvalidTimezone(String),
    #[error("invalid release time '{raw}': {reason}")]
    InvalidReleaseTime { raw: String, reason: String },
}

impl ConfigError {
    #[must_use]
    pub const fn code(&self) -> ErrorCode {
        match self {
            Self::Read { .. } | Self::Parse { .. } => ErrorCode::ConfigParseError,
            Self::InvalidTimezone(_) => ErrorCode::InvalidTimezone,
            Self::InvalidReleaseTime { .. } => ErrorCode::InvalidReleaseTime,
        }
    }
}

/// Resolve the configuration file to use, if any.
///
/// Precedence: `explicit`, then `<cwd>/pcr-ics.toml`, then
/// `<config_dir>/pcr-ics/config.toml`.
#[must_use]
pub fn config_path(explicit: Option<&Path>, cwd: &Path) -> Option<PathBuf> {
    if let Some(path) = explicit {
        return Some(path.to_path_buf());
    }

    let local = cwd.join(LOCAL_CONFIG_FILE);
    if local.exists() {
        return Some(local);
    }

    let user = dirs::config_dir()?.join("pcr-ics/config.toml");
    user.exists().then_some(user)
}

/// Load configuration, falling back to defaults when no file is found.
///
/// An explicit path that does not exist is an error.
///
/// # Errors
///
/// Returns an error if the chosen file cannot be read or parsed.
pub fn load_config(explicit: Option<&Path>, cwd: &Path) -> Result<Config, ConfigError> {
    let Some(path) = config_path(explicit, cwd) else {
        return Ok(Config::default());
    };

    let content = std::fs::read_to_string(&path).map_err(|source| ConfigError::Read {
        path: path.clone(),
        source,
    })?;

    toml::from_str::<Config>(&content).map_err(|source| ConfigError::Parse { path, source })
}

fn default_version_url() -> String {
    "https://redive.estertion.win/last_version_cn.json".to_string()
}

fn default_database_url() -> String {
    "https://redive.estertion.win/db/redive_cn.db.br".to_string()
}

fn default_version_field() -> String {
    "TruthVersion".to_string()
}

fn default_calendar_name() -> String {
    "公主连接国服活动日历".to_string()
}

fn default_calendar_description() -> String {
    "公主连接国服活动日历，由pcr_ics（https://git.io/JLhLb）生成，数据来自干炸里脊资料站".to_string()
}

fn default_timezone() -> String {
    "Asia/Shanghai".to_string()
}

fn default_release_time() -> String {
    "2020-04-17T11:00:00".to_string()
}

fn default_identity_prefix() -> String {
    "pcr_cn".to_string()
}

fn default_reference() -> String {
    "https://wlkz.github.io/pcr_ics/dist/pcr_cn.ics".to_string()
}

fn default_target() -> PathBuf {
    PathBuf::from("./deploy/dist/pcr_cn.ics")
}
