use chrono::{DateTime, Duration, Utc};

use crate::models::cooldown::CooldownStatus;

pub const ASSESSMENT_COOLDOWN_HOURS: i64 = 24;

/// Open/Locked gate derived from the last persisted assessment time.
///
/// Nothing is cached: `evaluate` recomputes from `now` on every call, so a
/// caller polling once a minute sees `remaining` count down.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CooldownGate {
    last_assessment_at: Option<DateTime<Utc>>,
    window: Duration,
}

impl CooldownGate {
    pub fn new(last_assessment_at: Option<DateTime<Utc>>) -> Self {
        Self {
            last_assessment_at,
            window: Duration::hours(ASSESSMENT_COOLDOWN_HOURS),
        }
    }

    pub fn last_assessment_at(&self) -> Option<DateTime<Utc>> {
        self.last_assessment_at
    }

    /// A completed write moves the gate to Locked from `at`.
    pub fn record_assessment(&mut self, at: DateTime<Utc>) {
        self.last_assessment_at = Some(at);
    }

    pub fn evaluate(&self, now: DateTime<Utc>) -> CooldownStatus {
        let Some(last) = self.last_assessment_at else {
            return CooldownStatus::open(None);
        };

        let elapsed = now.signed_duration_since(last);
        if elapsed >= self.window {
            return CooldownStatus::open(Some(last));
        }

        // A last timestamp ahead of `now` (clock skew) never locks longer than one window.
        let remaining = (self.window - elapsed).min(self.window);

        CooldownStatus {
            can_assess_now: false,
            remaining_ms: remaining.num_milliseconds(),
            last_assessment_at: Some(last),
            next_available_at: Some(last + self.window),
        }
    }
}
