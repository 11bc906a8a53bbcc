use std::future::Future;
use std::sync::Arc;
use std::time::Duration as StdDuration;

use chrono::Duration;
use serde::Serialize;
use tracing::{debug, error, info, warn};

use crate::db::repositories::assessment_cache_repository::AssessmentCacheRepository;
use crate::db::repositories::assessment_history_repository::AssessmentHistoryRepository;
use crate::db::DbPool;
use crate::error::{AppError, AppResult};
use crate::models::assessment::Assessment;
use crate::models::session::Session;
use crate::services::remote_store::{RemoteAssessmentRow, RemoteStore};
use crate::services::session_service::SessionProvider;
use crate::services::settings_service::{
    PersistenceLimits, DEFAULT_HISTORY_RETENTION_DAYS, DEFAULT_REMOTE_TIMEOUT_SECS,
    DEFAULT_SESSION_TIMEOUT_SECS,
};
use crate::utils::redact::redact_for_log;

/// How the remote row for the day ended up being written.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SaveMode {
    Inserted,
    /// A row for `(user, date)` already existed and was replaced.
    Updated,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(
    tag = "outcome",
    rename_all = "camelCase",
    rename_all_fields = "camelCase"
)]
pub enum RemoteOutcome {
    Inserted,
    Updated,
    AuthenticationRequired {
        message: String,
    },
    Timeout {
        operation: String,
        timeout_ms: u64,
    },
    Failed {
        #[serde(skip_serializing_if = "Option::is_none")]
        status: Option<u16>,
        message: String,
    },
    /// No remote store is configured.
    Disabled,
}

impl RemoteOutcome {
    fn from_result(result: AppResult<SaveMode>) -> Self {
        match result {
            Ok(SaveMode::Inserted) => RemoteOutcome::Inserted,
            Ok(SaveMode::Updated) => RemoteOutcome::Updated,
            Err(AppError::AuthenticationRequired { message }) => {
                RemoteOutcome::AuthenticationRequired { message }
            }
            Err(AppError::RemoteTimeout {
                operation,
                timeout_ms,
            }) => RemoteOutcome::Timeout {
                operation,
                timeout_ms,
            },
            Err(AppError::PersistenceFailure { status, message }) => {
                RemoteOutcome::Failed { status, message }
            }
            Err(other) => RemoteOutcome::Failed {
                status: None,
                message: other.to_string(),
            },
        }
    }
}

/// Result of `save`: the score is never lost, only durability varies.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct PersistOutcome {
    pub local_cached: bool,
    pub remote: RemoteOutcome,
}

impl PersistOutcome {
    /// True only once the remote store holds the day's row.
    pub fn is_durable(&self) -> bool {
        matches!(self.remote, RemoteOutcome::Inserted | RemoteOutcome::Updated)
    }

    pub fn requires_authentication(&self) -> bool {
        matches!(self.remote, RemoteOutcome::AuthenticationRequired { .. })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PersistenceConfig {
    pub remote_timeout: StdDuration,
    pub session_timeout: StdDuration,
    pub history_retention_days: i64,
}

impl Default for PersistenceConfig {
    fn default() -> Self {
        Self {
            remote_timeout: StdDuration::from_secs(DEFAULT_REMOTE_TIMEOUT_SECS),
            session_timeout: StdDuration::from_secs(DEFAULT_SESSION_TIMEOUT_SECS),
            history_retention_days: DEFAULT_HISTORY_RETENTION_DAYS,
        }
    }
}

impl From<PersistenceLimits> for PersistenceConfig {
    fn from(limits: PersistenceLimits) -> Self {
        Self {
            remote_timeout: limits.remote_timeout,
            session_timeout: limits.session_timeout,
            history_retention_days: limits.history_retention_days,
        }
    }
}

/// Runs `future` under `limit`, turning an elapsed deadline into `RemoteTimeout`.
pub(crate) async fn bounded<T, F>(operation: &str, limit: StdDuration, future: F) -> AppResult<T>
where
    F: Future<Output = AppResult<T>>,
{
    match tokio::time::timeout(limit, future).await {
        Ok(result) => result,
        Err(_) => Err(AppError::remote_timeout(operation, limit)),
    }
}

/// Looks up the session within `limit` and checks it belongs to `user_id`.
pub(crate) async fn session_for_user(
    sessions: &dyn SessionProvider,
    user_id: &str,
    limit: StdDuration,
) -> AppResult<Session> {
    let session = bounded("session_lookup", limit, sessions.current_session()).await?;
    if session.user_id != user_id {
        return Err(AppError::authentication_required(
            "session belongs to a different user",
        ));
    }
    Ok(session)
}

/// Local-first write of one assessment, then a bounded remote insert with an update fallback.
pub struct PersistenceCoordinator {
    db: DbPool,
    remote: Option<Arc<dyn RemoteStore>>,
    sessions: Arc<dyn SessionProvider>,
    config: PersistenceConfig,
}

impl PersistenceCoordinator {
    pub fn new(
        db: DbPool,
        remote: Option<Arc<dyn RemoteStore>>,
        sessions: Arc<dyn SessionProvider>,
        config: PersistenceConfig,
    ) -> Self {
        Self {
            db,
            remote,
            sessions,
            config,
        }
    }

    pub async fn save(&self, assessment: &Assessment) -> PersistOutcome {
        let local_cached = match self.write_local(assessment) {
            Ok(trimmed) => {
                debug!(
                    target: "app::persistence",
                    user_id = %assessment.user_id,
                    date = %assessment.date_key(),
                    trimmed,
                    "assessment cached locally"
                );
                true
            }
            Err(err) => {
                error!(
                    target: "app::persistence",
                    user_id = %assessment.user_id,
                    error = %err,
                    "local cache write failed"
                );
                false
            }
        };

        let remote = match &self.remote {
            None => RemoteOutcome::Disabled,
            Some(store) => {
                RemoteOutcome::from_result(self.write_remote(store.as_ref(), assessment).await)
            }
        };

        info!(
            target: "app::persistence",
            user_id = %assessment.user_id,
            date = %assessment.date_key(),
            local_cached,
            remote = ?remote,
            "assessment persisted"
        );

        PersistOutcome {
            local_cached,
            remote,
        }
    }

    /// Cache row, history upsert and retention trim in one transaction. Returns rows trimmed.
    fn write_local(&self, assessment: &Assessment) -> AppResult<usize> {
        let retention = self.config.history_retention_days.max(1);
        let keep_from = assessment.date - Duration::days(retention - 1);

        self.db.with_transaction(|tx| {
            AssessmentCacheRepository::upsert(tx, assessment)?;
            AssessmentHistoryRepository::upsert(tx, assessment)?;
            AssessmentHistoryRepository::trim_before(tx, &assessment.user_id, keep_from)
        })
    }

    async fn write_remote(
        &self,
        store: &dyn RemoteStore,
        assessment: &Assessment,
    ) -> AppResult<SaveMode> {
        let session = session_for_user(
            self.sessions.as_ref(),
            &assessment.user_id,
            self.config.session_timeout,
        )
        .await?;

        let row = RemoteAssessmentRow::from(assessment);
        if let Some(context) = &assessment.context_factors {
            debug!(
                target: "app::persistence",
                context = %redact_for_log(&serde_json::Value::Object(context.clone())),
                "sending assessment with context factors"
            );
        }

        let limit = self.config.remote_timeout;
        match bounded("insert_assessment", limit, store.insert_assessment(&session, &row)).await {
            Ok(()) => Ok(SaveMode::Inserted),
            Err(err) if err.is_duplicate_conflict() => {
                info!(
                    target: "app::persistence",
                    user_id = %assessment.user_id,
                    date = %assessment.date_key(),
                    "row for this day exists; replacing it"
                );
                bounded("update_assessment", limit, store.update_assessment(&session, &row))
                    .await?;
                Ok(SaveMode::Updated)
            }
            Err(err) => {
                warn!(
                    target: "app::persistence",
                    user_id = %assessment.user_id,
                    error = %err,
                    "remote insert failed"
                );
                Err(err)
            }
        }
    }
}
