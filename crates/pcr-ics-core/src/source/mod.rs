//! Event source adapters.
//!
//! One adapter per game-data category. Each reads a single logical table of
//! the snapshot (sometimes joined to a lookup table) and maps every row to a
//! [`CandidateEvent`] with a human-readable name and a stable identity key
//! `"<prefix>/<table>/<row id>"`.
//!
//! Adapters are listed explicitly in [`registry`]; that order is also the
//! order candidates reach the merge engine.
//!
//! Source timestamps are wall times in the calendar timezone, formatted as
//! [`SOURCE_TIME_FORMAT`]. Single-digit month, day and hour fields occur in
//! older snapshots and are accepted.

pub mod campaign;
pub mod chara_fortune;
pub mod clan_battle;
pub mod free_gacha;
pub mod hatsune;
pub mod tower;

use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
use chrono_tz::Tz;
use rusqlite::{Connection, Row};
use tracing::debug;

use crate::error::ErrorCode;
use crate::identity::identity_key;
use crate::model::CandidateEvent;

pub use campaign::CampaignSource;
pub use chara_fortune::CharaFortuneSource;
pub use clan_battle::ClanBattleSource;
pub use free_gacha::FreeGachaSource;
pub use hatsune::HatsuneSource;
pub use tower::TowerSource;

/// `strftime` layout of every schedule timestamp in the snapshot.
pub const SOURCE_TIME_FORMAT: &str = "%Y/%m/%d %H:%M:%S";

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum SourceError {
    /// The query itself failed: missing table or column, or a column of an
    /// unexpected type.
    #[error("query on {table} failed: {source}")]
    Query {
        table: &'static str,
        #[source]
        source: rusqlite::Error,
    },

    #[error("{table} row {row_id}: malformed timestamp '{raw}': {reason}")]
    Timestamp {
        table: &'static str,
        row_id: i64,
        raw: String,
        reason: String,
    },

    #[error("{table} row {row_id}: {reason}")]
    InvalidRow {
        table: &'static str,
        row_id: i64,
        reason: String,
    },
}

impl SourceError {
    #[must_use]
    pub const fn code(&self) -> ErrorCode {
        match self {
            Self::Query { .. } => ErrorCode::SnapshotSchemaMismatch,
            Self::Timestamp { .. } => ErrorCode::TimestampParseFailed,
            Self::InvalidRow { .. } => ErrorCode::InvalidSourceRow,
        }
    }
}

// ---------------------------------------------------------------------------
// Adapter contract
// ---------------------------------------------------------------------------

/// Per-run settings shared by all adapters.
#[derive(Debug, Clone)]
pub struct SourceContext {
    /// Zone the snapshot's wall times are written in.
    pub timezone: Tz,
    /// First segment of every identity key (e.g. `pcr_cn`).
    pub identity_prefix: String,
}

impl SourceContext {
    #[must_use]
    pub fn new(timezone: Tz, identity_prefix: impl Into<String>) -> Self {
        Self {
            timezone,
            identity_prefix: identity_prefix.into(),
        }
    }

    /// Parse one snapshot wall time into an instant.
    ///
    /// # Errors
    ///
    /// Returns [`SourceError::Timestamp`] when `raw` does not match
    /// [`SOURCE_TIME_FORMAT`] or names a time that does not exist locally.
    pub fn parse_time(
        &self,
        table: &'static str,
        row_id: i64,
        raw: &str,
    ) -> Result<DateTime<Utc>, SourceError> {
        let timestamp_error = |reason: String| SourceError::Timestamp {
            table,
            row_id,
            raw: raw.to_string(),
            reason,
        };

        let naive = NaiveDateTime::parse_from_str(raw.trim(), SOURCE_TIME_FORMAT)
            .map_err(|err| timestamp_error(err.to_string()))?;
        self.timezone
            .from_local_datetime(&naive)
            .earliest()
            .map(|local| local.with_timezone(&Utc))
            .ok_or_else(|| timestamp_error(format!("not a valid time in {}", self.timezone)))
    }

    /// Build the candidate for one row.
    ///
    /// # Errors
    ///
    /// Returns an error if either bound fails to parse or the interval is
    /// inverted.
    pub fn candidate(
        &self,
        table: &'static str,
        row_id: i64,
        name: String,
        start_raw: &str,
        end_raw: &str,
    ) -> Result<CandidateEvent, SourceError> {
        let start = self.parse_time(table, row_id, start_raw)?;
        let end = self.parse_time(table, row_id, end_raw)?;
        let key = identity_key(&self.identity_prefix, table, row_id);

        CandidateEvent::new(name, start, end, key).map_err(|err| SourceError::InvalidRow {
            table,
            row_id,
            reason: err.to_string(),
        })
    }
}

/// Reads candidates for one game-data category.
pub trait EventSource {
    /// Source table, also the middle segment of the identity key.
    fn table(&self) -> &'static str;

    /// Run the adapter's query and map every row.
    ///
    /// # Errors
    ///
    /// Fails on the first query error or unparsable row; no partial result
    /// is returned.
    fn fetch_candidates(
        &self,
        conn: &Connection,
        ctx: &SourceContext,
    ) -> Result<Vec<CandidateEvent>, SourceError>;
}

/// All adapters, in publication order.
#[must_use]
pub fn registry() -> Vec<Box<dyn EventSource>> {
    vec![
        Box::new(ClanBattleSource),
        Box::new(FreeGachaSource),
        Box::new(CampaignSource),
        Box::new(TowerSource),
        Box::new(HatsuneSource),
        Box::new(CharaFortuneSource),
    ]
}

/// Run `sources` in order and concatenate their candidates.
///
/// # Errors
///
/// Returns the first adapter failure.
pub fn collect_candidates(
    conn: &Connection,
    sources: &[Box<dyn EventSource>],
    ctx: &SourceContext,
) -> Result<Vec<CandidateEvent>, SourceError> {
    let mut candidates = Vec::new();
    for source in sources {
        let batch = source.fetch_candidates(conn, ctx)?;
        debug!(table = source.table(), rows = batch.len(), "adapter finished");
        candidates.extend(batch);
    }
    Ok(candidates)
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// The `(id, start_time, end_time)` prefix every adapter query selects.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct ScheduleRow {
    pub id: i64,
    pub start: String,
    pub end: String,
}

impl ScheduleRow {
    pub(crate) fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            start: row.get(1)?,
            end: row.get(2)?,
        })
    }
}

/// Run `sql` and map every row with `map`.
pub(crate) fn query_rows<T>(
    conn: &Connection,
    table: &'static str,
    sql: &str,
    map: impl FnMut(&Row<'_>) -> rusqlite::Result<T>,
) -> Result<Vec<T>, SourceError> {
    let query_error = |source| SourceError::Query { table, source };

    let mut stmt = conn.prepare(sql).map_err(query_error)?;
    let rows = stmt.query_map([], map).map_err(query_error)?;
    rows.collect::<rusqlite::Result<Vec<T>>>().map_err(query_error)
}
