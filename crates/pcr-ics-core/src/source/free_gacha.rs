//! Daily free gacha campaigns (`campaign_freegacha`).

use rusqlite::Connection;

use super::{EventSource, ScheduleRow, SourceContext, SourceError, query_rows};
use crate::model::CandidateEvent;

const TABLE: &str = "campaign_freegacha";
const QUERY: &str = "
    SELECT id, start_time, end_time, freegacha_1, freegacha_10
    FROM campaign_freegacha
    WHERE freegacha_10 == 1 OR freegacha_1 == 1";

pub const SINGLE_PULL_NAME: &str = "每日一次 免费单抽活动";
pub const TEN_PULL_NAME: &str = "每日一次 免费十连活动";

#[derive(Debug, Clone, Copy, Default)]
pub struct FreeGachaSource;

impl EventSource for FreeGachaSource {
    fn table(&self) -> &'static str {
        TABLE
    }

    fn fetch_candidates(
        &self,
        conn: &Connection,
        ctx: &SourceContext,
    ) -> Result<Vec<CandidateEvent>, SourceError> {
        let rows = query_rows(conn, TABLE, QUERY, |row| {
            Ok((
                ScheduleRow::from_row(row)?,
                row.get::<_, i64>(3)?,
                row.get::<_, i64>(4)?,
            ))
        })?;

        rows.into_iter()
            .map(|(row, single, ten)| {
                let name = match (single == 1, ten == 1) {
                    (true, false) => SINGLE_PULL_NAME,
                    (false, true) => TEN_PULL_NAME,
                    _ => {
                        return Err(SourceError::InvalidRow {
                            table: TABLE,
                            row_id: row.id,
                            reason: format!(
                                "expected exactly one of freegacha_1/freegacha_10, got {single}/{ten}"
                            ),
                        });
                    }
                };
                ctx.candidate(TABLE, row.id, name.to_string(), &row.start, &row.end)
            })
            .collect()
    }
}
