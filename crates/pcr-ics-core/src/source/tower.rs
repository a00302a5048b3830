//! Tower/ladder events (`tower_schedule` joined to `tower_area_data`).

use rusqlite::Connection;

use super::{EventSource, ScheduleRow, SourceContext, SourceError, query_rows};
use crate::model::CandidateEvent;

const TABLE: &str = "tower_schedule";
const QUERY: &str = "
    SELECT tower_schedule.tower_schedule_id, tower_schedule.start_time,
           tower_schedule.end_time, tower_area_data.max_floor_num
    FROM tower_schedule
    INNER JOIN tower_area_data
    ON tower_area_data.tower_area_id == tower_schedule.max_tower_area_id";

const TOWER_NAME: &str = "露娜之塔";

#[derive(Debug, Clone, Copy, Default)]
pub struct TowerSource;

impl EventSource for TowerSource {
    fn table(&self) -> &'static str {
        TABLE
    }

    fn fetch_candidates(
        &self,
        conn: &Connection,
        ctx: &SourceContext,
    ) -> Result<Vec<CandidateEvent>, SourceError> {
        let rows = query_rows(conn, TABLE, QUERY, |row| {
            Ok((ScheduleRow::from_row(row)?, row.get::<_, i64>(3)?))
        })?;

        rows.into_iter()
            .map(|(row, max_floor)| {
                let name = format!("{TOWER_NAME} {max_floor}层");
                ctx.candidate(TABLE, row.id, name, &row.start, &row.end)
            })
            .collect()
    }
}
