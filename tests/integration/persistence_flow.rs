use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Duration, TimeZone, Utc};
use interpreter_wellness::db::repositories::assessment_cache_repository::AssessmentCacheRepository;
use interpreter_wellness::db::DbPool;
use interpreter_wellness::error::AppResult;
use interpreter_wellness::models::assessment::{
    ContextFactors, Dimension, DimensionAnswersInput, RiskLevel,
};
use interpreter_wellness::models::session::Session;
use interpreter_wellness::models::settings::SettingsUpdateInput;
use interpreter_wellness::services::assessment_service::AssessmentService;
use interpreter_wellness::services::persistence_service::RemoteOutcome;
use interpreter_wellness::services::remote_store::testing::{FakeBehavior, InMemoryRemoteStore};
use interpreter_wellness::services::remote_store::{RemoteAssessmentRow, RemoteBinding};
use interpreter_wellness::services::session_service::{SessionProvider, StaticSessionProvider};
use interpreter_wellness::services::settings_service::{EnvOverrides, SettingsService};
use interpreter_wellness::utils::crypto::CryptoVault;
use serde_json::json;
use tempfile::{tempdir, TempDir};

struct Harness {
    _dir: TempDir,
    db: DbPool,
    settings: Arc<SettingsService>,
    remote: Arc<InMemoryRemoteStore>,
    service: AssessmentService,
}

fn harness_with(sessions: Arc<dyn SessionProvider>, with_remote: bool) -> Harness {
    let dir = tempdir().expect("temp dir");
    let db = DbPool::new(dir.path().join("wellness.sqlite")).expect("db pool");
    let vault = CryptoVault::with_master_secret(&[9u8; 32]).expect("vault");
    let settings = Arc::new(SettingsService::with_vault(
        db.clone(),
        vault,
        EnvOverrides::default(),
    ));
    let remote = Arc::new(InMemoryRemoteStore::new());
    let binding = if with_remote {
        RemoteBinding::fixed(remote.clone())
    } else {
        RemoteBinding::Disabled
    };
    let service = AssessmentService::new(db.clone(), settings.clone(), sessions, binding);
    Harness {
        _dir: dir,
        db,
        settings,
        remote,
        service,
    }
}

fn harness() -> Harness {
    harness_with(
        Arc::new(StaticSessionProvider::new(Session::new("user-1", "token-1"))),
        true,
    )
}

fn answers(values: [i64; 5]) -> DimensionAnswersInput {
    DimensionAnswersInput {
        energy_tank: Some(values[0]),
        recovery_speed: Some(values[1]),
        emotional_leakage: Some(values[2]),
        performance_signal: Some(values[3]),
        tomorrow_readiness: Some(values[4]),
    }
}

fn morning() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 6, 3, 9, 0, 0).unwrap()
}

#[tokio::test]
async fn same_day_resubmission_updates_the_single_remote_row() {
    let h = harness();

    let first = h
        .service
        .submit_assessment_at("user-1", answers([3, 3, 3, 3, 3]), None, morning())
        .await
        .expect("first submit");
    assert_eq!(first.persist_outcome.remote, RemoteOutcome::Inserted);
    assert!(first.persist_outcome.local_cached);

    let second = h
        .service
        .submit_assessment_at(
            "user-1",
            answers([1, 4, 4, 4, 4]),
            None,
            morning() + Duration::hours(3),
        )
        .await
        .expect("second submit");
    assert_eq!(second.persist_outcome.remote, RemoteOutcome::Updated);
    assert!(second.persist_outcome.is_durable());

    let rows = h.remote.rows();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].energy_tank, 1);
    assert_eq!(rows[0].raw_score, 17);
    assert_eq!(rows[0].created_at, morning() + Duration::hours(3));
    assert_eq!(h.remote.calls(), vec!["insert", "insert", "update"]);
}

#[tokio::test]
async fn local_cache_holds_the_latest_save() {
    let h = harness();

    h.service
        .submit_assessment_at("user-1", answers([3, 3, 3, 3, 3]), None, morning())
        .await
        .expect("first submit");
    let second = h
        .service
        .submit_assessment_at(
            "user-1",
            answers([5, 5, 5, 5, 5]),
            None,
            morning() + Duration::hours(1),
        )
        .await
        .expect("second submit");

    let cached = h
        .db
        .with_connection(|conn| AssessmentCacheRepository::find_by_user(conn, "user-1"))
        .expect("cache read")
        .expect("cached row");
    assert_eq!(cached.assessment_id, second.assessment.id);
    assert_eq!(cached.raw_score, 25);
    assert_eq!(cached.risk_level, RiskLevel::Severe);
    assert_eq!(cached.completed_at, Some(morning() + Duration::hours(1)));
}

#[tokio::test]
async fn context_factors_travel_with_the_remote_row() {
    let h = harness();
    let mut context = ContextFactors::new();
    context.insert("assignmentType".into(), json!("medical"));
    context.insert("hoursWorked".into(), json!(7));

    let result = h
        .service
        .submit_assessment_at(
            "user-1",
            answers([2, 2, 3, 3, 3]),
            Some(context.clone()),
            morning(),
        )
        .await
        .expect("submit");

    assert_eq!(result.assessment.context_factors, Some(context.clone()));
    assert_eq!(result.recommendations.len(), 4);
    assert_eq!(h.remote.rows()[0].context_factors, Some(context));
}

#[tokio::test]
async fn invalid_answers_persist_nothing() {
    let h = harness();
    let mut input = answers([3, 3, 3, 3, 3]);
    input.recovery_speed = None;
    input.tomorrow_readiness = Some(9);

    let err = h
        .service
        .submit_assessment_at("user-1", input, None, morning())
        .await
        .expect_err("validation");
    let details = match err {
        interpreter_wellness::error::AppError::Validation { details, .. } => details,
        other => panic!("unexpected error: {other:?}"),
    }
    .expect("details");
    assert_eq!(details["missing"], json!([Dimension::RecoverySpeed.as_str()]));
    assert_eq!(details["outOfRange"][0]["dimension"], json!("tomorrowReadiness"));

    let cached = h
        .db
        .with_connection(|conn| AssessmentCacheRepository::find_by_user(conn, "user-1"))
        .expect("cache read");
    assert!(cached.is_none());
    assert!(h.remote.calls().is_empty());
}

#[tokio::test]
async fn signed_out_user_keeps_score_and_local_cache() {
    let h = harness_with(Arc::new(StaticSessionProvider::signed_out()), true);

    let result = h
        .service
        .submit_assessment_at("user-1", answers([2, 2, 2, 2, 2]), None, morning())
        .await
        .expect("submit");

    assert_eq!(result.assessment.raw_score, 10);
    assert!(result.persist_outcome.local_cached);
    assert!(result.persist_outcome.requires_authentication());
    assert!(!result.persist_outcome.is_durable());
    assert!(h.remote.calls().is_empty());
}

#[tokio::test]
async fn session_for_another_user_is_rejected() {
    let h = harness_with(
        Arc::new(StaticSessionProvider::new(Session::new("user-2", "token-2"))),
        true,
    );

    let result = h
        .service
        .submit_assessment_at("user-1", answers([3, 3, 3, 3, 3]), None, morning())
        .await
        .expect("submit");

    assert!(result.persist_outcome.requires_authentication());
    assert!(h.remote.rows().is_empty());
}

#[tokio::test]
async fn expired_session_requires_authentication() {
    let expired = Session::new("user-1", "token-1").with_expiry(Utc::now() - Duration::minutes(5));
    let h = harness_with(Arc::new(StaticSessionProvider::new(expired)), true);

    let result = h
        .service
        .submit_assessment_at("user-1", answers([3, 3, 3, 3, 3]), None, morning())
        .await
        .expect("submit");
    assert!(result.persist_outcome.requires_authentication());
}

#[tokio::test]
async fn remote_auth_rejection_is_reported() {
    let h = harness();
    h.remote.set_behavior(FakeBehavior::Unauthorized);

    let result = h
        .service
        .submit_assessment_at("user-1", answers([3, 3, 3, 3, 3]), None, morning())
        .await
        .expect("submit");
    assert!(result.persist_outcome.requires_authentication());
    assert!(result.persist_outcome.local_cached);
}

#[tokio::test]
async fn hung_remote_times_out_without_losing_the_score() {
    let h = harness();
    h.settings
        .update(SettingsUpdateInput {
            remote_timeout_secs: Some(1),
            ..Default::default()
        })
        .expect("settings");
    h.remote.set_behavior(FakeBehavior::Hang);

    let result = h
        .service
        .submit_assessment_at("user-1", answers([4, 4, 4, 4, 4]), None, morning())
        .await
        .expect("submit");

    assert_eq!(result.assessment.raw_score, 20);
    assert!(result.persist_outcome.local_cached);
    assert_eq!(
        result.persist_outcome.remote,
        RemoteOutcome::Timeout {
            operation: "insert_assessment".into(),
            timeout_ms: 1_000,
        }
    );
}

struct HangingSessions;

#[async_trait]
impl SessionProvider for HangingSessions {
    async fn current_session(&self) -> AppResult<Session> {
        futures::future::pending().await
    }
}

#[tokio::test]
async fn hung_session_lookup_times_out() {
    let h = harness_with(Arc::new(HangingSessions), true);
    h.settings
        .update(SettingsUpdateInput {
            session_timeout_secs: Some(1),
            ..Default::default()
        })
        .expect("settings");

    let result = h
        .service
        .submit_assessment_at("user-1", answers([3, 3, 3, 3, 3]), None, morning())
        .await
        .expect("submit");

    match result.persist_outcome.remote {
        RemoteOutcome::Timeout { operation, .. } => assert_eq!(operation, "session_lookup"),
        other => panic!("unexpected outcome: {other:?}"),
    }
    assert!(h.remote.calls().is_empty());
}

#[tokio::test]
async fn server_errors_surface_as_failed_outcome() {
    let h = harness();
    h.remote.set_behavior(FakeBehavior::ServerError);

    let result = h
        .service
        .submit_assessment_at("user-1", answers([3, 3, 3, 3, 3]), None, morning())
        .await
        .expect("submit");
    match result.persist_outcome.remote {
        RemoteOutcome::Failed { status, .. } => assert_eq!(status, Some(503)),
        other => panic!("unexpected outcome: {other:?}"),
    }
}

#[tokio::test]
async fn conflict_then_missing_update_is_a_failure() {
    let h = harness();
    let existing = h
        .service
        .submit_assessment_at("user-1", answers([3, 3, 3, 3, 3]), None, morning())
        .await
        .expect("seed");
    assert_eq!(existing.persist_outcome.remote, RemoteOutcome::Inserted);

    h.remote.set_behavior(FakeBehavior::LoseUpdates);
    let result = h
        .service
        .submit_assessment_at(
            "user-1",
            answers([2, 3, 3, 3, 3]),
            None,
            morning() + Duration::hours(2),
        )
        .await
        .expect("submit");

    assert!(matches!(
        result.persist_outcome.remote,
        RemoteOutcome::Failed { .. }
    ));
    assert_eq!(h.remote.rows()[0].raw_score, 15);
}

#[tokio::test]
async fn next_day_inserts_a_new_row() {
    let h = harness();
    h.service
        .submit_assessment_at("user-1", answers([3, 3, 3, 3, 3]), None, morning())
        .await
        .expect("day one");
    let result = h
        .service
        .submit_assessment_at(
            "user-1",
            answers([3, 3, 3, 3, 3]),
            None,
            morning() + Duration::days(1),
        )
        .await
        .expect("day two");

    assert_eq!(result.persist_outcome.remote, RemoteOutcome::Inserted);
    let dates: Vec<_> = h
        .remote
        .rows()
        .iter()
        .map(|row: &RemoteAssessmentRow| row.assessment_date.to_string())
        .collect();
    assert_eq!(dates, vec!["2024-06-03", "2024-06-04"]);
}

#[tokio::test]
async fn assessment_date_follows_configured_timezone() {
    let h = harness();
    h.settings
        .update(SettingsUpdateInput {
            timezone: Some("America/Los_Angeles".into()),
            ..Default::default()
        })
        .expect("settings");

    // 03:00 UTC on June 3rd is still June 2nd in Los Angeles.
    let at = Utc.with_ymd_and_hms(2024, 6, 3, 3, 0, 0).unwrap();
    let result = h
        .service
        .submit_assessment_at("user-1", answers([3, 3, 3, 3, 3]), None, at)
        .await
        .expect("submit");
    assert_eq!(result.assessment.date.to_string(), "2024-06-02");
}

#[tokio::test]
async fn disabled_remote_still_caches_locally() {
    let h = harness_with(
        Arc::new(StaticSessionProvider::new(Session::new("user-1", "token-1"))),
        false,
    );

    let result = h
        .service
        .submit_assessment_at("user-1", answers([3, 3, 3, 3, 3]), None, morning())
        .await
        .expect("submit");
    assert_eq!(result.persist_outcome.remote, RemoteOutcome::Disabled);
    assert!(result.persist_outcome.local_cached);
    assert!(h.remote.calls().is_empty());
}

#[tokio::test]
async fn history_is_trimmed_to_retention_window() {
    let h = harness();
    h.settings
        .update(SettingsUpdateInput {
            history_retention_days: Some(3),
            ..Default::default()
        })
        .expect("settings");

    for day in 0..5 {
        h.service
            .submit_assessment_at(
                "user-1",
                answers([3, 3, 3, 3, 3]),
                None,
                morning() + Duration::days(day),
            )
            .await
            .expect("submit");
    }

    let history = h.service.history("user-1", None).expect("history");
    let dates: Vec<String> = history.iter().map(|entry| entry.date.to_string()).collect();
    assert_eq!(dates, vec!["2024-06-07", "2024-06-06", "2024-06-05"]);

    let limited = h.service.history("user-1", Some(1)).expect("history");
    assert_eq!(limited.len(), 1);
}

#[tokio::test]
async fn unreadable_local_cache_still_returns_the_score() {
    let h = harness();
    let db_path = h.db.path().to_path_buf();
    for suffix in ["", "-wal", "-shm"] {
        let path = std::path::PathBuf::from(format!("{}{suffix}", db_path.display()));
        if path.exists() {
            std::fs::remove_file(&path).expect("remove cache file");
        }
    }
    std::fs::create_dir(&db_path).expect("block cache path");

    let result = h
        .service
        .submit_assessment_at("user-1", answers([2, 3, 3, 3, 3]), None, morning())
        .await
        .expect("score survives a broken cache");

    assert_eq!(result.assessment.raw_score, 14);
    assert_eq!(result.assessment.date.to_string(), "2024-06-03");
    assert_eq!(result.recommendations.len(), 2);
    assert!(!result.persist_outcome.local_cached);
    assert_eq!(result.persist_outcome.remote, RemoteOutcome::Inserted);
    assert_eq!(h.remote.rows().len(), 1);
}
