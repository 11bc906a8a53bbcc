use std::sync::Arc;

use chrono::{DateTime, Duration, NaiveDate, TimeZone, Utc};
use interpreter_wellness::db::DbPool;
use interpreter_wellness::models::assessment::DimensionAnswersInput;
use interpreter_wellness::models::reflection::{ReflectionKind, ReflectionRecord};
use interpreter_wellness::models::session::Session;
use interpreter_wellness::models::settings::SettingsUpdateInput;
use interpreter_wellness::services::assessment_service::AssessmentService;
use interpreter_wellness::services::engagement_service::EngagementService;
use interpreter_wellness::services::remote_store::testing::{FakeBehavior, InMemoryRemoteStore};
use interpreter_wellness::services::remote_store::RemoteBinding;
use interpreter_wellness::services::session_service::{SessionProvider, StaticSessionProvider};
use interpreter_wellness::services::settings_service::{EnvOverrides, SettingsService};
use interpreter_wellness::utils::crypto::CryptoVault;
use tempfile::{tempdir, TempDir};

struct Harness {
    _dir: TempDir,
    settings: Arc<SettingsService>,
    remote: Arc<InMemoryRemoteStore>,
    assessments: AssessmentService,
    engagement: EngagementService,
}

fn harness_with(binding: impl Fn(Arc<InMemoryRemoteStore>) -> RemoteBinding) -> Harness {
    let dir = tempdir().expect("temp dir");
    let db = DbPool::new(dir.path().join("wellness.sqlite")).expect("db pool");
    let vault = CryptoVault::with_master_secret(&[7u8; 32]).expect("vault");
    let settings = Arc::new(SettingsService::with_vault(
        db.clone(),
        vault,
        EnvOverrides::default(),
    ));
    let sessions: Arc<dyn SessionProvider> =
        Arc::new(StaticSessionProvider::new(Session::new("user-1", "token-1")));
    let remote = Arc::new(InMemoryRemoteStore::new());
    let binding = binding(remote.clone());

    Harness {
        _dir: dir,
        assessments: AssessmentService::new(
            db.clone(),
            settings.clone(),
            sessions.clone(),
            binding.clone(),
        ),
        engagement: EngagementService::new(db, settings.clone(), sessions, binding),
        settings,
        remote,
    }
}

fn harness() -> Harness {
    harness_with(|store| RemoteBinding::fixed(store))
}

// Wednesday
fn now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 5, 15, 18, 0, 0).unwrap()
}

fn reflection(id: &str, created_at: DateTime<Utc>) -> ReflectionRecord {
    ReflectionRecord::new(id, "user-1", ReflectionKind::PostAssignment, created_at)
}

fn answers() -> DimensionAnswersInput {
    DimensionAnswersInput {
        energy_tank: Some(4),
        recovery_speed: Some(3),
        emotional_leakage: Some(3),
        performance_signal: Some(3),
        tomorrow_readiness: Some(4),
    }
}

#[tokio::test]
async fn recording_is_idempotent_by_id() {
    let h = harness();
    let record = reflection("r-1", now());

    assert!(h.engagement.record_reflection(&record).expect("first"));
    assert!(!h.engagement.record_reflection(&record).expect("second"));

    let stats = h.engagement.stats_at("user-1", now()).await.expect("stats");
    assert_eq!(stats.entries_this_week, 1);
    assert_eq!(stats.streak_days, 1);
}

#[tokio::test]
async fn recording_rejects_blank_identifiers() {
    let h = harness();
    assert!(h
        .engagement
        .record_reflection(&reflection(" ", now()))
        .is_err());
    assert!(h
        .engagement
        .record_reflection(&ReflectionRecord::new(
            "r-1",
            "",
            ReflectionKind::FreeJournal,
            now()
        ))
        .is_err());
}

#[tokio::test]
async fn empty_history_gives_zero_stats() {
    let h = harness();
    let stats = h.engagement.stats_at("user-1", now()).await.expect("stats");
    assert_eq!(stats.streak_days, 0);
    assert_eq!(stats.weekly_progress_pct, 0);
    assert_eq!(stats.entries_this_week, 0);
    assert_eq!(stats.week_start, NaiveDate::from_ymd_opt(2024, 5, 12).unwrap());
}

#[tokio::test]
async fn sources_are_merged_and_deduplicated() {
    let h = harness();
    h.engagement
        .record_reflection(&reflection("r-today", now() - Duration::hours(1)))
        .expect("today");
    h.engagement
        .record_reflection(&reflection("r-yesterday", now() - Duration::days(1)))
        .expect("yesterday");
    h.assessments
        .submit_assessment_at("user-1", answers(), None, now() - Duration::days(2))
        .await
        .expect("assessment");

    h.remote.add_reflection(reflection("r-today", now() - Duration::hours(1)));
    h.remote
        .add_reflection(reflection("remote-3d", now() - Duration::days(3)));
    h.remote.add_reflection(ReflectionRecord::new(
        "other-user",
        "user-2",
        ReflectionKind::TeamDebrief,
        now(),
    ));

    let stats = h.engagement.stats_at("user-1", now()).await.expect("stats");
    assert_eq!(stats.streak_days, 4);
    assert_eq!(stats.entries_this_week, 4);
    assert_eq!(stats.weekly_progress_pct, 57);
}

#[tokio::test]
async fn remote_failure_falls_back_to_local_sources() {
    let h = harness();
    h.engagement
        .record_reflection(&reflection("r-today", now() - Duration::hours(1)))
        .expect("today");
    h.engagement
        .record_reflection(&reflection("r-yesterday", now() - Duration::days(1)))
        .expect("yesterday");
    h.remote
        .add_reflection(reflection("remote-2d", now() - Duration::days(2)));
    h.remote.set_behavior(FakeBehavior::ServerError);

    let stats = h.engagement.stats_at("user-1", now()).await.expect("stats");
    assert_eq!(stats.streak_days, 2);
    assert_eq!(stats.entries_this_week, 2);
    assert_eq!(stats.weekly_progress_pct, 29);
}

#[tokio::test]
async fn disabled_remote_uses_local_sources() {
    let h = harness_with(|_| RemoteBinding::Disabled);
    h.assessments
        .submit_assessment_at("user-1", answers(), None, now())
        .await
        .expect("assessment");

    let stats = h.engagement.stats_at("user-1", now()).await.expect("stats");
    assert_eq!(stats.streak_days, 1);
    assert_eq!(stats.entries_this_week, 1);
    assert!(h.remote.calls().is_empty());
}

#[tokio::test]
async fn missing_today_breaks_the_streak() {
    let h = harness();
    for day in 1..=3 {
        h.engagement
            .record_reflection(&reflection(&format!("r-{day}"), now() - Duration::days(day)))
            .expect("record");
    }

    let stats = h.engagement.stats_at("user-1", now()).await.expect("stats");
    assert_eq!(stats.streak_days, 0);
    assert_eq!(stats.entries_this_week, 3);
}

#[tokio::test]
async fn local_days_follow_configured_timezone() {
    let h = harness();
    let late_evening = Utc.with_ymd_and_hms(2024, 5, 15, 2, 0, 0).unwrap();
    let midday = Utc.with_ymd_and_hms(2024, 5, 15, 13, 0, 0).unwrap();
    let now = Utc.with_ymd_and_hms(2024, 5, 15, 15, 0, 0).unwrap();
    h.engagement
        .record_reflection(&reflection("late", late_evening))
        .expect("late");
    h.engagement
        .record_reflection(&reflection("midday", midday))
        .expect("midday");

    let utc_stats = h.engagement.stats_at("user-1", now).await.expect("utc stats");
    assert_eq!(utc_stats.streak_days, 1);

    h.settings
        .update(SettingsUpdateInput {
            timezone: Some("America/New_York".into()),
            ..Default::default()
        })
        .expect("timezone");

    let local_stats = h.engagement.stats_at("user-1", now).await.expect("local stats");
    assert_eq!(local_stats.streak_days, 2);
}
