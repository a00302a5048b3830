//! Team-boss battles (`clan_battle_period`).

use rusqlite::Connection;

use super::{EventSource, ScheduleRow, SourceContext, SourceError, query_rows};
use crate::model::CandidateEvent;

const TABLE: &str = "clan_battle_period";
const QUERY: &str = "SELECT clan_battle_id, start_time, end_time FROM clan_battle_period";

/// Battle ids are numbered from 1001 for the first season.
const CLAN_BATTLE_ID_BASE: i64 = 1000;

/// Constellation cycle used in season names.
pub const CONSTELLATIONS: [&str; 12] = [
    "水瓶", "双鱼", "白羊", "金牛", "双子", "巨蟹", "狮子", "处女", "天秤", "天蝎", "射手", "摩羯",
];

const CONSTELLATION_OFFSET: i64 = 1;

/// Season name for a battle id, e.g. 1001 → `第1期白羊座团队战`.
#[must_use]
pub fn clan_battle_name(clan_battle_id: i64) -> String {
    let season = clan_battle_id - CLAN_BATTLE_ID_BASE;
    let index = usize::try_from((season + CONSTELLATION_OFFSET).rem_euclid(12)).unwrap_or_default();
    format!("第{season}期{}座团队战", CONSTELLATIONS[index])
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ClanBattleSource;

impl EventSource for ClanBattleSource {
    fn table(&self) -> &'static str {
        TABLE
    }

    fn fetch_candidates(
        &self,
        conn: &Connection,
        ctx: &SourceContext,
    ) -> Result<Vec<CandidateEvent>, SourceError> {
        query_rows(conn, TABLE, QUERY, ScheduleRow::from_row)?
            .into_iter()
            .map(|row| {
                ctx.candidate(TABLE, row.id, clan_battle_name(row.id), &row.start, &row.end)
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::resolve;
    use crate::source::fixtures;

    #[test]
    fn season_names_cycle_constellations() {
        assert_eq!(clan_battle_name(1001), "第1期白羊座团队战");
        assert_eq!(clan_battle_name(1011), "第11期水瓶座团队战");
        assert_eq!(clan_battle_name(1012), "第12期双鱼座团队战");
        assert_eq!(clan_battle_name(1013), "第13期白羊座团队战");
    }

    #[test]
    fn rows_become_candidates() {
        let conn = fixtures::snapshot();
        conn.execute(
            "INSERT INTO clan_battle_period VALUES (1001, '2020/05/25 05:00:00', '2020/05/30 23:59:59')",
            [],
        )
        .expect("insert row");

        let candidates = ClanBattleSource
            .fetch_candidates(&conn, &fixtures::context())
            .expect("fetch");
        assert_eq!(candidates.len(), 1);
        let event = &candidates[0];
        assert_eq!(event.name(), "第1期白羊座团队战");
        assert_eq!(event.identity_key(), "pcr_cn/clan_battle_period/1001");
        assert_eq!(event.identity(), resolve("pcr_cn/clan_battle_period/1001"));
        assert_eq!(event.start().to_rfc3339(), "2020-05-24T21:00:00+00:00");
        assert_eq!(event.end().to_rfc3339(), "2020-05-30T15:59:59+00:00");
    }
}
