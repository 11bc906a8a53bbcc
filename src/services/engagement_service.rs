use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use chrono::{DateTime, Datelike, Duration, NaiveDate, TimeZone, Utc};
use tracing::{debug, warn};

use crate::db::repositories::assessment_history_repository::AssessmentHistoryRepository;
use crate::db::repositories::reflection_repository::ReflectionRepository;
use crate::db::DbPool;
use crate::error::{AppError, AppResult};
use crate::models::engagement::EngagementStats;
use crate::models::reflection::{ReflectionKind, ReflectionRecord};
use crate::services::persistence_service::{bounded, session_for_user};
use crate::services::remote_store::RemoteBinding;
use crate::services::session_service::SessionProvider;
use crate::services::settings_service::SettingsService;

/// Longest streak the backward scan will count.
pub const MAX_STREAK_DAYS: u32 = 365;
pub const WEEKLY_GOAL: u32 = 7;

/// Streak and weekly-goal figures for `now`'s local calendar.
pub fn compute_stats<Tz: TimeZone>(
    reflections: &[ReflectionRecord],
    now: &DateTime<Tz>,
) -> EngagementStats {
    let zone = now.timezone();
    let today = now.date_naive();
    let days: HashSet<NaiveDate> = reflections
        .iter()
        .map(|record| record.created_at.with_timezone(&zone).date_naive())
        .collect();

    let mut streak_days = 0;
    let mut day = today;
    while streak_days < MAX_STREAK_DAYS && days.contains(&day) {
        streak_days += 1;
        day = day - Duration::days(1);
    }

    let week_start = week_start(today);
    // Local date >= weekStart is the same as createdAt >= local midnight of weekStart.
    let entries_this_week = reflections
        .iter()
        .filter(|record| record.created_at.with_timezone(&zone).date_naive() >= week_start)
        .count() as u32;

    EngagementStats {
        streak_days,
        weekly_progress_pct: weekly_progress_pct(entries_this_week),
        week_start,
        entries_this_week,
    }
}

/// Most recent Sunday on or before `today`.
pub fn week_start(today: NaiveDate) -> NaiveDate {
    today - Duration::days(today.weekday().num_days_from_sunday() as i64)
}

pub fn weekly_progress_pct(entries: u32) -> u8 {
    let pct = (entries as f64 / WEEKLY_GOAL as f64 * 100.0).round();
    pct.min(100.0) as u8
}

/// Merges local and remote reflection sources and derives engagement stats.
pub struct EngagementService {
    db: DbPool,
    settings: Arc<SettingsService>,
    sessions: Arc<dyn SessionProvider>,
    remote: RemoteBinding,
}

impl EngagementService {
    pub fn new(
        db: DbPool,
        settings: Arc<SettingsService>,
        sessions: Arc<dyn SessionProvider>,
        remote: RemoteBinding,
    ) -> Self {
        Self {
            db,
            settings,
            sessions,
            remote,
        }
    }

    /// Stores a collaborator-produced reflection. Returns `false` if the id was already logged.
    pub fn record_reflection(&self, record: &ReflectionRecord) -> AppResult<bool> {
        if record.id.trim().is_empty() {
            return Err(AppError::validation("reflection id cannot be empty"));
        }
        if record.user_id.trim().is_empty() {
            return Err(AppError::validation("reflection userId cannot be empty"));
        }
        let inserted = self
            .db
            .with_connection(|conn| ReflectionRepository::insert_if_absent(conn, record))?;
        debug!(
            target: "app::engagement",
            id = %record.id,
            kind = %record.kind,
            inserted,
            "reflection recorded"
        );
        Ok(inserted)
    }

    pub async fn stats(&self, user_id: &str) -> AppResult<EngagementStats> {
        self.stats_at(user_id, Utc::now()).await
    }

    pub async fn stats_at(&self, user_id: &str, now: DateTime<Utc>) -> AppResult<EngagementStats> {
        if user_id.trim().is_empty() {
            return Err(AppError::validation("userId cannot be empty"));
        }

        let tz = self.settings.timezone()?;
        let local_now = now.with_timezone(&tz);
        let since = scan_start(&local_now);

        let mut merged: HashMap<String, ReflectionRecord> = HashMap::new();
        for record in self.local_reflections(user_id, since)? {
            merged.entry(record.id.clone()).or_insert(record);
        }
        for record in self.remote_reflections(user_id, since).await {
            merged.entry(record.id.clone()).or_insert(record);
        }

        let records: Vec<ReflectionRecord> = merged.into_values().collect();
        let stats = compute_stats(&records, &local_now);
        debug!(
            target: "app::engagement",
            user_id,
            sources = records.len(),
            streak = stats.streak_days,
            weekly_pct = stats.weekly_progress_pct,
            "engagement stats computed"
        );
        Ok(stats)
    }

    fn local_reflections(
        &self,
        user_id: &str,
        since: DateTime<Utc>,
    ) -> AppResult<Vec<ReflectionRecord>> {
        self.db.with_connection(|conn| {
            let mut records = ReflectionRepository::list_since(conn, user_id, since)?;
            let history = AssessmentHistoryRepository::list_recent(
                conn,
                user_id,
                MAX_STREAK_DAYS as usize + 1,
            )?;
            records.extend(
                history
                    .into_iter()
                    .filter(|entry| entry.completed_at >= since)
                    .map(|entry| {
                        ReflectionRecord::new(
                            entry.assessment_id,
                            user_id,
                            ReflectionKind::BurnoutAssessment,
                            entry.completed_at,
                        )
                    }),
            );
            Ok(records)
        })
    }

    async fn remote_reflections(
        &self,
        user_id: &str,
        since: DateTime<Utc>,
    ) -> Vec<ReflectionRecord> {
        let store = match self.remote.resolve() {
            Ok(Some(store)) => store,
            Ok(None) => return Vec::new(),
            Err(err) => {
                warn!(target: "app::engagement", error = %err, "remote store unavailable");
                return Vec::new();
            }
        };

        let result = async {
            let limits = self.settings.persistence_limits()?;
            let session =
                session_for_user(self.sessions.as_ref(), user_id, limits.session_timeout).await?;
            bounded(
                "list_reflections",
                limits.remote_timeout,
                store.list_reflections(&session, user_id, since),
            )
            .await
        }
        .await;

        result.unwrap_or_else(|err| {
            warn!(
                target: "app::engagement",
                user_id,
                error = %err,
                "remote reflections skipped; using local sources only"
            );
            Vec::new()
        })
    }
}

/// Local midnight `MAX_STREAK_DAYS` before today, as UTC. Covers both the streak scan and the week.
fn scan_start<Tz: TimeZone>(now: &DateTime<Tz>) -> DateTime<Utc> {
    let first_day = now.date_naive() - Duration::days(MAX_STREAK_DAYS as i64);
    let midnight = first_day.and_hms_opt(0, 0, 0).unwrap_or_default();
    now.timezone()
        .from_local_datetime(&midnight)
        .earliest()
        .map(|at| at.with_timezone(&Utc))
        .unwrap_or_else(|| midnight.and_utc() - Duration::days(1))
}
