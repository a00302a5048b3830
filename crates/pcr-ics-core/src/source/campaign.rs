//! Drop-rate and bonus campaigns (`campaign_schedule`).
//!
//! Only categories in [`campaign_template`] are published; anything else
//! maps to the skip sentinel and is discarded by the merge engine.

use rusqlite::Connection;

use super::{EventSource, ScheduleRow, SourceContext, SourceError, query_rows};
use crate::model::{CandidateEvent, SKIP_SENTINEL};

const TABLE: &str = "campaign_schedule";
const QUERY: &str = "
    SELECT id, start_time, end_time, campaign_category, value
    FROM campaign_schedule";

/// Name template for a campaign category; `{}` is replaced by the ratio.
#[must_use]
pub const fn campaign_template(category: i64) -> Option<&'static str> {
    match category {
        31 => Some("「普通关卡」掉落量{}倍庆典"),
        32 => Some("「困难关卡」掉落量{}倍庆典"),
        37 => Some("「圣迹调查」掉落量{}倍庆典"),
        38 => Some("「神殿调查」掉落量{}倍庆典"),
        39 => Some("VH图{}倍"),
        44 => Some("「探索」掉落量{}倍庆典"),
        45 => Some("「地下城」玛那{}倍庆典"),
        91 => Some("大师币{}倍"),
        131 => Some("「活动关卡（普通）」掉落量{}倍庆典"),
        132 => Some("「活动关卡（困难）」掉落量{}倍庆典"),
        151 => Some("「活动关卡」玩家经验值获得量{}倍"),
        _ => None,
    }
}

/// Format a raw multiplier stored in thousandths: `2000` → `2`,
/// `1500` → `1.5`.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn format_ratio(value: i64) -> String {
    if value % 1000 == 0 {
        (value / 1000).to_string()
    } else {
        format!("{:.1}", value as f64 / 1000.0)
    }
}

/// Display name for a campaign row, or the skip sentinel.
#[must_use]
pub fn campaign_name(category: i64, value: i64) -> String {
    campaign_template(category).map_or_else(
        || SKIP_SENTINEL.to_string(),
        |template| template.replacen("{}", &format_ratio(value), 1),
    )
}

#[derive(Debug, Clone, Copy, Default)]
pub struct CampaignSource;

impl EventSource for CampaignSource {
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
            .map(|(row, category, value)| {
                ctx.candidate(
                    TABLE,
                    row.id,
                    campaign_name(category, value),
                    &row.start,
                    &row.end,
                )
            })
            .collect()
    }
}
