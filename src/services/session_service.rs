use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tracing::{debug, info};

use crate::db::repositories::settings_repository::SettingsRepository;
use crate::db::DbPool;
use crate::error::{AppError, AppResult};
use crate::models::session::Session;
use crate::utils::crypto::CryptoVault;

const SESSION_PREFIX: &str = "session.";
const KEY_SESSION_USER: &str = "session.user_id";
const KEY_SESSION_TOKEN: &str = "session.access_token";
const KEY_SESSION_EXPIRES: &str = "session.expires_at";

/// Supplies the credential used for remote persistence.
#[async_trait]
pub trait SessionProvider: Send + Sync {
    /// Fails with `AuthenticationRequired` when no usable session exists.
    async fn current_session(&self) -> AppResult<Session>;
}

fn ensure_usable(session: Session) -> AppResult<Session> {
    if session.access_token.trim().is_empty() {
        return Err(AppError::authentication_required("session has no access token"));
    }
    if session.is_expired_at(Utc::now()) {
        return Err(AppError::authentication_required("session expired"));
    }
    Ok(session)
}

/// Fixed session handed in by an embedder.
#[derive(Debug, Clone, Default)]
pub struct StaticSessionProvider {
    session: Option<Session>,
}

impl StaticSessionProvider {
    pub fn new(session: Session) -> Self {
        Self {
            session: Some(session),
        }
    }

    pub fn signed_out() -> Self {
        Self { session: None }
    }
}

#[async_trait]
impl SessionProvider for StaticSessionProvider {
    async fn current_session(&self) -> AppResult<Session> {
        match &self.session {
            Some(session) => ensure_usable(session.clone()),
            None => Err(AppError::authentication_required("no session available")),
        }
    }
}

/// Session persisted in the local settings table, with the token sealed by the vault.
#[derive(Clone)]
pub struct StoredSessionProvider {
    db: DbPool,
    vault: CryptoVault,
}

impl StoredSessionProvider {
    pub fn new(db: DbPool, vault: CryptoVault) -> Self {
        Self { db, vault }
    }

    pub fn store(&self, session: &Session) -> AppResult<()> {
        if session.user_id.trim().is_empty() {
            return Err(AppError::validation("session userId cannot be empty"));
        }
        if session.access_token.trim().is_empty() {
            return Err(AppError::validation("session accessToken cannot be empty"));
        }

        let sealed = self.vault.encrypt_str(&session.access_token)?;
        let expires_at = session.expires_at.map(|at| at.to_rfc3339());

        self.db.with_transaction(|tx| {
            SettingsRepository::upsert(tx, KEY_SESSION_USER, &session.user_id)?;
            SettingsRepository::upsert(tx, KEY_SESSION_TOKEN, &sealed)?;
            match &expires_at {
                Some(value) => SettingsRepository::upsert(tx, KEY_SESSION_EXPIRES, value),
                None => SettingsRepository::delete(tx, KEY_SESSION_EXPIRES),
            }
        })?;

        info!(target: "app::auth", user_id = %session.user_id, "session stored");
        Ok(())
    }

    pub fn clear(&self) -> AppResult<()> {
        let removed = self
            .db
            .with_connection(|conn| SettingsRepository::delete_prefixed(conn, SESSION_PREFIX))?;
        info!(target: "app::auth", removed, "session cleared");
        Ok(())
    }

    pub fn load(&self) -> AppResult<Option<Session>> {
        let (user_id, sealed, expires_at) = self.db.with_connection(|conn| {
            Ok((
                SettingsRepository::get_value(conn, KEY_SESSION_USER)?,
                SettingsRepository::get_value(conn, KEY_SESSION_TOKEN)?,
                SettingsRepository::get_value(conn, KEY_SESSION_EXPIRES)?,
            ))
        })?;

        let (Some(user_id), Some(sealed)) = (user_id, sealed) else {
            return Ok(None);
        };

        let access_token = self.vault.decrypt_string(&sealed).map_err(|err| {
            debug!(target: "app::auth", error = %err, "stored session token unreadable");
            AppError::authentication_required("stored session could not be decrypted")
        })?;

        let expires_at = expires_at
            .map(|raw| {
                DateTime::parse_from_rfc3339(&raw)
                    .map(|at| at.with_timezone(&Utc))
                    .map_err(|err| AppError::database(format!("invalid session expiry: {err}")))
            })
            .transpose()?;

        Ok(Some(Session {
            user_id,
            access_token,
            expires_at,
        }))
    }
}

#[async_trait]
impl SessionProvider for StoredSessionProvider {
    async fn current_session(&self) -> AppResult<Session> {
        match self.load()? {
            Some(session) => ensure_usable(session),
            None => Err(AppError::authentication_required("no stored session")),
        }
    }
}
