//! Character fortune events (`chara_fortune_schedule`).
//!
//! Snapshots older than 2021-01 store these bounds without seconds
//! (`2020/7/11 5:00`). Those rows are repaired before parsing: the start
//! gains `:00`, the end gains `:59`.

use rusqlite::Connection;

use super::{EventSource, ScheduleRow, SourceContext, SourceError, query_rows};
use crate::model::CandidateEvent;

const TABLE: &str = "chara_fortune_schedule";
const QUERY: &str = "SELECT fortune_id, start_time, end_time, name FROM chara_fortune_schedule";

/// Longest time-of-day part of a truncated timestamp (`05:00`).
const TRUNCATED_TIME_LEN: usize = "05:00".len();

/// Append the missing seconds to both bounds when the start lacks them.
#[must_use]
pub fn repair_truncated_times(start: &str, end: &str) -> (String, String) {
    let truncated = start
        .split_whitespace()
        .nth(1)
        .is_some_and(|time| time.len() <= TRUNCATED_TIME_LEN);

    if truncated {
        (format!("{start}:00"), format!("{end}:59"))
    } else {
        (start.to_string(), end.to_string())
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct CharaFortuneSource;

impl EventSource for CharaFortuneSource {
    fn table(&self) -> &'static str {
        TABLE
    }

    fn fetch_candidates(
        &self,
        conn: &Connection,
        ctx: &SourceContext,
    ) -> Result<Vec<CandidateEvent>, SourceError> {
        let rows = query_rows(conn, TABLE, QUERY, |row| {
            Ok((ScheduleRow::from_row(row)?, row.get::<_, String>(3)?))
        })?;

        rows.into_iter()
            .map(|(row, name)| {
                let (start, end) = repair_truncated_times(&row.start, &row.end);
                ctx.candidate(TABLE, row.id, name, &start, &end)
            })
            .collect()
    }
}
