use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct EngagementStats {
    pub streak_days: u32,
    pub weekly_progress_pct: u8,
    /// Sunday that opens the current week, in the configured timezone.
    pub week_start: NaiveDate,
    pub entries_this_week: u32,
}
