//! Story events (`hatsune_schedule` joined to `event_story_data`).

use rusqlite::Connection;

use super::{EventSource, ScheduleRow, SourceContext, SourceError, query_rows};
use crate::model::CandidateEvent;

const TABLE: &str = "hatsune_schedule";
const QUERY: &str = "
    SELECT a.event_id, a.start_time, a.end_time, b.title
    FROM hatsune_schedule AS a
    JOIN event_story_data AS b ON a.event_id = b.value";

#[derive(Debug, Clone, Copy, Default)]
pub struct HatsuneSource;

impl EventSource for HatsuneSource {
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
            .map(|(row, title)| {
                ctx.candidate(TABLE, row.id, format!("剧情活动：{title}"), &row.start, &row.end)
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::fixtures;

    #[test]
    fn title_comes_from_story_table() {
        let conn = fixtures::snapshot();
        conn.execute_batch(
            "
            INSERT INTO hatsune_schedule VALUES (10001, '2020/05/11 16:00:00', '2020/05/21 11:59:59');
            INSERT INTO event_story_data VALUES (5001, 10001, '公主的休假');
            ",
        )
        .expect("insert rows");

        let candidates = HatsuneSource
            .fetch_candidates(&conn, &fixtures::context())
            .expect("fetch");
        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].name(), "剧情活动：公主的休假");
        assert_eq!(candidates[0].identity_key(), "pcr_cn/hatsune_schedule/10001");
    }
}
