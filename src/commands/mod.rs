pub mod assessment;
pub mod engagement;
pub mod session;
pub mod settings;

use std::sync::Arc;

use serde::Serialize;
use serde_json::Value as JsonValue;
use tracing::{error, warn};

use crate::db::DbPool;
use crate::error::{AppError, AppResult};
use crate::services::assessment_service::AssessmentService;
use crate::services::engagement_service::EngagementService;
use crate::services::remote_store::RemoteBinding;
use crate::services::session_service::{SessionProvider, StoredSessionProvider};
use crate::services::settings_service::{EnvOverrides, SettingsService};
use crate::utils::crypto::CryptoVault;

/// Overrides for the pieces `AppState::new` would otherwise build itself.
pub struct AppCollaborators {
    pub vault: CryptoVault,
    pub env: EnvOverrides,
    /// `None` resolves the remote store from settings.
    pub remote: Option<RemoteBinding>,
    /// `None` uses the session stored in the local cache.
    pub sessions: Option<Arc<dyn SessionProvider>>,
}

#[derive(Clone)]
pub struct AppState {
    db_pool: DbPool,
    settings_service: Arc<SettingsService>,
    stored_sessions: Arc<StoredSessionProvider>,
    assessment_service: Arc<AssessmentService>,
    engagement_service: Arc<EngagementService>,
}

impl AppState {
    pub fn new(db_pool: DbPool) -> AppResult<Self> {
        let vault = CryptoVault::from_database_path(db_pool.path())?;
        Self::with_collaborators(
            db_pool,
            AppCollaborators {
                vault,
                env: EnvOverrides::from_env(),
                remote: None,
                sessions: None,
            },
        )
    }

    pub fn with_collaborators(db_pool: DbPool, collaborators: AppCollaborators) -> AppResult<Self> {
        let AppCollaborators {
            vault,
            env,
            remote,
            sessions,
        } = collaborators;

        let settings_service = Arc::new(SettingsService::with_vault(
            db_pool.clone(),
            vault.clone(),
            env,
        ));
        let stored_sessions = Arc::new(StoredSessionProvider::new(db_pool.clone(), vault));
        let sessions: Arc<dyn SessionProvider> = match sessions {
            Some(provider) => provider,
            None => Arc::clone(&stored_sessions) as Arc<dyn SessionProvider>,
        };
        let remote =
            remote.unwrap_or_else(|| RemoteBinding::from_settings(Arc::clone(&settings_service)));

        let assessment_service = Arc::new(AssessmentService::new(
            db_pool.clone(),
            Arc::clone(&settings_service),
            Arc::clone(&sessions),
            remote.clone(),
        ));
        let engagement_service = Arc::new(EngagementService::new(
            db_pool.clone(),
            Arc::clone(&settings_service),
            sessions,
            remote,
        ));

        Ok(Self {
            db_pool,
            settings_service,
            stored_sessions,
            assessment_service,
            engagement_service,
        })
    }

    pub fn settings(&self) -> Arc<SettingsService> {
        Arc::clone(&self.settings_service)
    }

    pub fn sessions(&self) -> Arc<StoredSessionProvider> {
        Arc::clone(&self.stored_sessions)
    }

    pub fn assessments(&self) -> Arc<AssessmentService> {
        Arc::clone(&self.assessment_service)
    }

    pub fn engagement(&self) -> Arc<EngagementService> {
        Arc::clone(&self.engagement_service)
    }

    pub fn db(&self) -> DbPool {
        self.db_pool.clone()
    }
}

pub type CommandResult<T> = Result<T, CommandError>;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CommandError {
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<JsonValue>,
}

impl CommandError {
    pub fn new(
        code: impl Into<String>,
        message: impl Into<String>,
        details: Option<JsonValue>,
    ) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
            details,
        }
    }
}

impl From<AppError> for CommandError {
    fn from(error: AppError) -> Self {
        match error {
            AppError::Validation {
                message, details, ..
            } => CommandError::new("VALIDATION_ERROR", message, details),
            AppError::AuthenticationRequired { message } => {
                CommandError::new("AUTHENTICATION_REQUIRED", message, None)
            }
            AppError::RemoteTimeout {
                operation,
                timeout_ms,
            } => CommandError::new(
                "REMOTE_TIMEOUT",
                format!("remote {operation} timed out"),
                Some(serde_json::json!({ "operation": operation, "timeoutMs": timeout_ms })),
            ),
            AppError::DuplicateConflict { message } => {
                warn!(
                    target: "app::command",
                    %message,
                    "duplicate conflict reached command boundary"
                );
                CommandError::new("DUPLICATE_CONFLICT", message, None)
            }
            AppError::PersistenceFailure { status, message } => CommandError::new(
                "PERSISTENCE_FAILURE",
                message,
                status.map(|status| serde_json::json!({ "status": status })),
            ),
            AppError::NotFound => {
                CommandError::new("NOT_FOUND", "requested record not found", None)
            }
            AppError::Database { message } => {
                error!(target: "app::command", %message, "database error in command");
                CommandError::new("UNKNOWN", message, None)
            }
            AppError::Serialization(error) => {
                error!(target: "app::command", error = %error, "serialization error in command");
                CommandError::new("UNKNOWN", "serialization failed", None)
            }
            AppError::Io(error) => {
                error!(target: "app::command", error = %error, "io error in command");
                CommandError::new("UNKNOWN", "file system access failed", None)
            }
            AppError::Other(message) => {
                error!(target: "app::command", %message, "unexpected error in command");
                CommandError::new("UNKNOWN", message, None)
            }
        }
    }
}
