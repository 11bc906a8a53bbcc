use std::sync::Arc;

use chrono::{Duration, Utc};
use httpmock::prelude::*;
use interpreter_wellness::commands::assessment::{
    assessment_cooldown_get, assessment_history_get, assessment_submit,
};
use interpreter_wellness::commands::engagement::{engagement_stats_get, reflection_record};
use interpreter_wellness::commands::session::{session_clear, session_store};
use interpreter_wellness::commands::settings::{
    settings_clear_credentials, settings_get, settings_update, SettingsUpdatePayload,
};
use interpreter_wellness::commands::{AppCollaborators, AppState, CommandError};
use interpreter_wellness::db::DbPool;
use interpreter_wellness::error::AppError;
use interpreter_wellness::models::assessment::DimensionAnswersInput;
use interpreter_wellness::models::reflection::{ReflectionKind, ReflectionRecord};
use interpreter_wellness::models::session::Session;
use interpreter_wellness::services::persistence_service::RemoteOutcome;
use interpreter_wellness::services::remote_store::testing::InMemoryRemoteStore;
use interpreter_wellness::services::remote_store::RemoteBinding;
use interpreter_wellness::services::settings_service::EnvOverrides;
use interpreter_wellness::utils::crypto::CryptoVault;
use serde_json::json;
use tempfile::{tempdir, TempDir};

fn state_with(remote: Option<RemoteBinding>) -> (TempDir, AppState) {
    let dir = tempdir().expect("temp dir");
    let db = DbPool::new(dir.path().join("wellness.sqlite")).expect("db pool");
    let state = AppState::with_collaborators(
        db,
        AppCollaborators {
            vault: CryptoVault::with_master_secret(&[1u8; 32]).expect("vault"),
            env: EnvOverrides::default(),
            remote,
            sessions: None,
        },
    )
    .expect("app state");
    (dir, state)
}

fn answers() -> DimensionAnswersInput {
    DimensionAnswersInput {
        energy_tank: Some(2),
        recovery_speed: Some(3),
        emotional_leakage: Some(3),
        performance_signal: Some(3),
        tomorrow_readiness: Some(3),
    }
}

fn payload(value: serde_json::Value) -> SettingsUpdatePayload {
    serde_json::from_value(value).expect("payload")
}

#[tokio::test]
async fn submit_requires_sign_in_for_remote_durability() {
    let store = Arc::new(InMemoryRemoteStore::new());
    let (_dir, state) = state_with(Some(RemoteBinding::fixed(store.clone())));

    let signed_out = assessment_submit(&state, "user-1".into(), answers(), None)
        .await
        .expect("submit");
    assert!(signed_out.persist_outcome.requires_authentication());
    assert!(store.rows().is_empty());

    session_store(&state, Session::new("user-1", "token-1"))
        .await
        .expect("store session");

    let signed_in = assessment_submit(&state, "user-1".into(), answers(), None)
        .await
        .expect("submit");
    assert_eq!(signed_in.persist_outcome.remote, RemoteOutcome::Inserted);
    assert_eq!(store.rows().len(), 1);

    session_clear(&state).await.expect("clear session");
    let cleared = assessment_submit(&state, "user-1".into(), answers(), None)
        .await
        .expect("submit");
    assert!(cleared.persist_outcome.requires_authentication());
}

#[tokio::test]
async fn submit_result_serializes_for_the_ui() {
    let (_dir, state) = state_with(Some(RemoteBinding::Disabled));

    let result = assessment_submit(&state, "user-1".into(), answers(), None)
        .await
        .expect("submit");
    let value = serde_json::to_value(&result).expect("serialize");

    assert_eq!(value["riskLevel"], json!("moderate"));
    assert_eq!(value["assessment"]["rawScore"], json!(14));
    assert_eq!(value["assessment"]["normalizedScore"], json!(4.5));
    assert_eq!(value["assessment"]["dimensions"]["energyTank"], json!(2));
    assert_eq!(value["recommendations"].as_array().map(Vec::len), Some(2));
    assert_eq!(
        value["persistOutcome"],
        json!({ "localCached": true, "remote": { "outcome": "disabled" } })
    );
}

#[tokio::test]
async fn invalid_submission_reports_validation_details() {
    let (_dir, state) = state_with(Some(RemoteBinding::Disabled));
    let mut input = answers();
    input.energy_tank = None;
    input.performance_signal = Some(0);

    let err = assessment_submit(&state, "user-1".into(), input, None)
        .await
        .expect_err("validation");
    assert_eq!(err.code, "VALIDATION_ERROR");
    let details = err.details.expect("details");
    assert_eq!(details["missing"], json!(["energyTank"]));
    assert_eq!(
        details["outOfRange"],
        json!([{ "dimension": "performanceSignal", "value": 0 }])
    );

    let blank_user = assessment_submit(&state, "".into(), answers(), None)
        .await
        .expect_err("blank user");
    assert_eq!(blank_user.code, "VALIDATION_ERROR");
}

#[tokio::test]
async fn cooldown_and_history_follow_submission() {
    let (_dir, state) = state_with(Some(RemoteBinding::Disabled));

    let before = assessment_cooldown_get(&state, "user-1".into())
        .await
        .expect("cooldown");
    assert!(before.can_assess_now);

    assessment_submit(&state, "user-1".into(), answers(), None)
        .await
        .expect("submit");

    let after = assessment_cooldown_get(&state, "user-1".into())
        .await
        .expect("cooldown");
    assert!(!after.can_assess_now);
    assert!(after.remaining() > Duration::hours(23));
    assert!(after.remaining() <= Duration::hours(24));

    let history = assessment_history_get(&state, "user-1".into(), None)
        .await
        .expect("history");
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].raw_score, 14);
    assert_eq!(history[0].date, Utc::now().date_naive());
}

#[tokio::test]
async fn engagement_commands_count_reflections_and_assessments() {
    let (_dir, state) = state_with(Some(RemoteBinding::Disabled));
    let record = ReflectionRecord::new(
        "reflection-1",
        "user-1",
        ReflectionKind::PreAssignment,
        Utc::now(),
    );

    assert!(reflection_record(&state, record.clone()).await.expect("record"));
    assert!(!reflection_record(&state, record).await.expect("duplicate"));

    assessment_submit(&state, "user-1".into(), answers(), None)
        .await
        .expect("submit");

    let stats = engagement_stats_get(&state, "user-1".into())
        .await
        .expect("stats");
    assert_eq!(stats.streak_days, 1);
    assert_eq!(stats.entries_this_week, 2);
    assert_eq!(stats.weekly_progress_pct, 29);
}

#[tokio::test]
async fn settings_round_trip_masks_the_api_key() {
    let (_dir, state) = state_with(None);

    let defaults = settings_get(&state).await.expect("defaults");
    assert_eq!(defaults.timezone, "UTC");
    assert_eq!(defaults.remote_timeout_secs, 10);
    assert!(defaults.remote_api_key.is_none());

    let updated = settings_update(
        &state,
        payload(json!({
            "remoteBaseUrl": "https://wellness.example.com/",
            "remoteApiKey": "anon-key-123456",
            "timezone": "Europe/Berlin",
            "historyRetentionDays": 14
        })),
    )
    .await
    .expect("update");
    assert_eq!(
        updated.remote_base_url.as_deref(),
        Some("https://wellness.example.com")
    );
    assert_eq!(updated.remote_api_key.as_deref(), Some("***********3456"));
    assert_eq!(updated.timezone, "Europe/Berlin");
    assert_eq!(updated.history_retention_days, 14);

    let cleared = settings_clear_credentials(&state).await.expect("clear");
    assert!(cleared.remote_api_key.is_none());
    assert_eq!(
        cleared.remote_base_url.as_deref(),
        Some("https://wellness.example.com")
    );
}

#[tokio::test]
async fn settings_update_rejects_bad_values() {
    let (_dir, state) = state_with(None);

    for bad in [
        json!({ "timezone": "Mars/Olympus_Mons" }),
        json!({ "remoteBaseUrl": "ftp://wellness.example.com" }),
        json!({ "remoteTimeoutSecs": 0 }),
        json!({ "sessionTimeoutSecs": 120 }),
        json!({ "historyRetentionDays": 0 }),
        json!({ "remoteApiKey": "   " }),
    ] {
        let err = settings_update(&state, payload(bad.clone()))
            .await
            .expect_err("invalid settings");
        assert_eq!(err.code, "VALIDATION_ERROR", "payload {bad}");
    }

    let unchanged = settings_get(&state).await.expect("settings");
    assert_eq!(unchanged.timezone, "UTC");
}

#[tokio::test]
async fn session_store_rejects_blank_credentials() {
    let (_dir, state) = state_with(Some(RemoteBinding::Disabled));
    let err = session_store(&state, Session::new("user-1", " "))
        .await
        .expect_err("blank token");
    assert_eq!(err.code, "VALIDATION_ERROR");
}

#[tokio::test]
async fn configured_remote_receives_the_assessment() {
    let server = MockServer::start_async().await;
    let insert = server
        .mock_async(|when, then| {
            when.method(POST)
                .path("/rest/v1/burnout_assessments")
                .header("apikey", "anon-key-123456")
                .header("authorization", "Bearer token-1")
                .json_body_partial(r#"{"user_id":"user-1","raw_score":14}"#);
            then.status(201).json_body(json!([]));
        })
        .await;

    let (_dir, state) = state_with(None);
    settings_update(
        &state,
        payload(json!({
            "remoteBaseUrl": server.base_url(),
            "remoteApiKey": "anon-key-123456"
        })),
    )
    .await
    .expect("configure remote");
    session_store(&state, Session::new("user-1", "token-1"))
        .await
        .expect("session");

    let result = assessment_submit(&state, "user-1".into(), answers(), None)
        .await
        .expect("submit");

    insert.assert_async().await;
    assert_eq!(result.persist_outcome.remote, RemoteOutcome::Inserted);
}

#[tokio::test]
async fn remote_without_api_key_stays_disabled() {
    let (_dir, state) = state_with(None);
    settings_update(
        &state,
        payload(json!({ "remoteBaseUrl": "https://wellness.example.com" })),
    )
    .await
    .expect("configure url only");
    session_store(&state, Session::new("user-1", "token-1"))
        .await
        .expect("session");

    let result = assessment_submit(&state, "user-1".into(), answers(), None)
        .await
        .expect("submit");
    assert_eq!(result.persist_outcome.remote, RemoteOutcome::Disabled);
}

#[test]
fn app_errors_map_to_command_codes() {
    let cases = [
        (AppError::authentication_required("expired"), "AUTHENTICATION_REQUIRED"),
        (
            AppError::remote_timeout("insert_assessment", std::time::Duration::from_secs(10)),
            "REMOTE_TIMEOUT",
        ),
        (AppError::duplicate_conflict("exists"), "DUPLICATE_CONFLICT"),
        (AppError::persistence_failure(Some(502), "bad gateway"), "PERSISTENCE_FAILURE"),
        (AppError::not_found(), "NOT_FOUND"),
        (AppError::other("boom"), "UNKNOWN"),
    ];

    for (error, code) in cases {
        let command: CommandError = error.into();
        assert_eq!(command.code, code);
    }

    let timeout: CommandError =
        AppError::remote_timeout("update_assessment", std::time::Duration::from_secs(10)).into();
    assert_eq!(
        timeout.details,
        Some(json!({ "operation": "update_assessment", "timeoutMs": 10_000 }))
    );

    let failure: CommandError = AppError::persistence_failure(Some(502), "bad gateway").into();
    assert_eq!(failure.details, Some(json!({ "status": 502 })));
}
