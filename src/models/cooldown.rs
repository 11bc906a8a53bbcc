use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct CooldownStatus {
    pub can_assess_now: bool,
    /// Exact remaining lock time in milliseconds; zero when open.
    pub remaining_ms: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_assessment_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_available_at: Option<DateTime<Utc>>,
}

impl CooldownStatus {
    pub fn open(last_assessment_at: Option<DateTime<Utc>>) -> Self {
        Self {
            can_assess_now: true,
            remaining_ms: 0,
            last_assessment_at,
            next_available_at: None,
        }
    }

    pub fn remaining(&self) -> Duration {
        Duration::milliseconds(self.remaining_ms)
    }

    pub fn remaining_seconds(&self) -> i64 {
        self.remaining_ms / 1000
    }

    /// Countdown split for display: partial minutes round up, and a full
    /// 60 minutes carries into the hour.
    pub fn remaining_hours_minutes(&self) -> (i64, i64) {
        if self.remaining_ms <= 0 {
            return (0, 0);
        }
        let total_minutes = (self.remaining_ms + 59_999) / 60_000;
        (total_minutes / 60, total_minutes % 60)
    }
}
