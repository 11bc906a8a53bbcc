use std::collections::HashMap;
use std::sync::RwLock;
use std::time::Duration as StdDuration;

use chrono::Utc;
use chrono_tz::Tz;
use tracing::{info, warn};

use crate::db::repositories::settings_repository::{AppSettingRow, SettingsRepository};
use crate::db::DbPool;
use crate::error::{AppError, AppResult};
use crate::models::settings::{AppSettings, SettingsUpdateInput};
use crate::services::remote_store::RemoteStoreConfig;
use crate::utils::crypto::CryptoVault;
use crate::utils::redact::mask_secret;

const KEY_REMOTE_BASE_URL: &str = "remote.base_url";
const KEY_REMOTE_API_KEY: &str = "remote.api_key";
const KEY_REMOTE_TIMEOUT: &str = "remote.timeout_secs";
const KEY_SESSION_TIMEOUT: &str = "remote.session_timeout_secs";
const KEY_TIMEZONE: &str = "locale.timezone";
const KEY_HISTORY_RETENTION: &str = "history.retention_days";
const SESSION_KEY_PREFIX: &str = "session.";

pub const ENV_REMOTE_URL: &str = "WELLNESS_REMOTE_URL";
pub const ENV_REMOTE_API_KEY: &str = "WELLNESS_REMOTE_API_KEY";
pub const ENV_TIMEZONE: &str = "WELLNESS_TIMEZONE";

pub const DEFAULT_TIMEZONE: &str = "UTC";
pub const DEFAULT_REMOTE_TIMEOUT_SECS: u64 = 10;
pub const DEFAULT_SESSION_TIMEOUT_SECS: u64 = 5;
pub const DEFAULT_HISTORY_RETENTION_DAYS: i64 = 30;

const TIMEOUT_RANGE_SECS: std::ops::RangeInclusive<u64> = 1..=60;
const RETENTION_RANGE_DAYS: std::ops::RangeInclusive<i64> = 1..=365;

/// Values read from the process environment that override stored settings.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct EnvOverrides {
    pub remote_base_url: Option<String>,
    pub remote_api_key: Option<String>,
    pub timezone: Option<String>,
}

impl EnvOverrides {
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let read = |name: &str| {
            lookup(name)
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
        };
        Self {
            remote_base_url: read(ENV_REMOTE_URL),
            remote_api_key: read(ENV_REMOTE_API_KEY),
            timezone: read(ENV_TIMEZONE),
        }
    }
}

/// Bounds the persistence coordinator works within.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PersistenceLimits {
    pub remote_timeout: StdDuration,
    pub session_timeout: StdDuration,
    pub history_retention_days: i64,
}

pub struct SettingsService {
    db: DbPool,
    vault: CryptoVault,
    env: EnvOverrides,
    cache: RwLock<Option<AppSettings>>,
}

impl SettingsService {
    pub fn new(db: DbPool) -> AppResult<Self> {
        let vault = CryptoVault::from_database_path(db.path())?;
        Ok(Self::with_vault(db, vault, EnvOverrides::from_env()))
    }

    pub fn with_vault(db: DbPool, vault: CryptoVault, env: EnvOverrides) -> Self {
        Self {
            db,
            vault,
            env,
            cache: RwLock::new(None),
        }
    }

    pub fn get(&self) -> AppResult<AppSettings> {
        if let Ok(guard) = self.cache.read() {
            if let Some(settings) = guard.as_ref() {
                return Ok(settings.clone());
            }
        }

        let settings = self.load_settings_from_db()?;
        if let Ok(mut guard) = self.cache.write() {
            *guard = Some(settings.clone());
        }
        Ok(settings)
    }

    pub fn update(&self, input: SettingsUpdateInput) -> AppResult<AppSettings> {
        let remote_base_url = match &input.remote_base_url {
            Some(Some(url)) => Some(Some(normalize_base_url(url)?)),
            other => other.clone(),
        };

        let timezone = input
            .timezone
            .as_deref()
            .map(|name| parse_timezone(name).map(|tz| tz.name().to_string()))
            .transpose()?;

        for (field, value) in [
            ("remoteTimeoutSecs", input.remote_timeout_secs),
            ("sessionTimeoutSecs", input.session_timeout_secs),
        ] {
            if let Some(secs) = value {
                ensure_timeout(field, secs)?;
            }
        }

        if let Some(days) = input.history_retention_days {
            if !RETENTION_RANGE_DAYS.contains(&days) {
                return Err(AppError::validation(format!(
                    "historyRetentionDays must be between {} and {}",
                    RETENTION_RANGE_DAYS.start(),
                    RETENTION_RANGE_DAYS.end()
                )));
            }
        }

        let api_key_cipher = match &input.remote_api_key {
            Some(Some(key)) => {
                let trimmed = key.trim();
                if trimmed.is_empty() {
                    return Err(AppError::validation("remote API key cannot be empty"));
                }
                Some(Some(self.vault.encrypt_str(trimmed)?))
            }
            Some(None) => Some(None),
            None => None,
        };

        self.db.with_connection(|conn| {
            write_optional(conn, KEY_REMOTE_BASE_URL, remote_base_url.as_ref())?;
            write_optional(conn, KEY_REMOTE_API_KEY, api_key_cipher.as_ref())?;
            if let Some(name) = &timezone {
                SettingsRepository::upsert(conn, KEY_TIMEZONE, name)?;
            }
            if let Some(secs) = input.remote_timeout_secs {
                SettingsRepository::upsert(conn, KEY_REMOTE_TIMEOUT, &secs.to_string())?;
            }
            if let Some(secs) = input.session_timeout_secs {
                SettingsRepository::upsert(conn, KEY_SESSION_TIMEOUT, &secs.to_string())?;
            }
            if let Some(days) = input.history_retention_days {
                SettingsRepository::upsert(conn, KEY_HISTORY_RETENTION, &days.to_string())?;
            }
            Ok(())
        })?;

        self.invalidate();
        let settings = self.get()?;
        info!(
            target: "app::settings",
            timezone = %settings.timezone,
            remote_configured = settings.remote_base_url.is_some(),
            "settings updated"
        );
        Ok(settings)
    }

    /// Forgets every stored credential: the remote API key, the sealed session and the
    /// vault's master secret.
    pub fn clear_sensitive(&self) -> AppResult<()> {
        self.db.with_connection(|conn| {
            SettingsRepository::delete(conn, KEY_REMOTE_API_KEY)?;
            SettingsRepository::delete_prefixed(conn, SESSION_KEY_PREFIX)?;
            Ok(())
        })?;

        if let Err(err) = self.vault.clear_master_secret() {
            warn!(
                target: "app::settings",
                error = %err,
                "failed to clear master secret from system keyring"
            );
        }

        self.invalidate();
        Ok(())
    }

    pub fn timezone(&self) -> AppResult<Tz> {
        let settings = self.get()?;
        parse_timezone(&settings.timezone)
    }

    pub fn persistence_limits(&self) -> AppResult<PersistenceLimits> {
        let settings = self.get()?;
        Ok(PersistenceLimits {
            remote_timeout: StdDuration::from_secs(settings.remote_timeout_secs),
            session_timeout: StdDuration::from_secs(settings.session_timeout_secs),
            history_retention_days: settings.history_retention_days,
        })
    }

    /// Connection details with the plain API key, or `None` while the remote store is unconfigured.
    pub fn remote_store_config(&self) -> AppResult<Option<RemoteStoreConfig>> {
        let settings = self.get()?;
        let Some(base_url) = settings.remote_base_url else {
            return Ok(None);
        };

        let api_key = match &self.env.remote_api_key {
            Some(key) => Some(key.clone()),
            None => self.stored_api_key()?,
        };

        let Some(api_key) = api_key else {
            warn!(
                target: "app::settings",
                "remote base URL configured without an API key; remote persistence disabled"
            );
            return Ok(None);
        };

        Ok(Some(RemoteStoreConfig {
            base_url,
            api_key,
            timeout: StdDuration::from_secs(settings.remote_timeout_secs),
        }))
    }

    fn invalidate(&self) {
        if let Ok(mut guard) = self.cache.write() {
            *guard = None;
        }
    }

    fn stored_api_key(&self) -> AppResult<Option<String>> {
        let Some(cipher) = self
            .db
            .with_connection(|conn| SettingsRepository::get_value(conn, KEY_REMOTE_API_KEY))?
        else {
            return Ok(None);
        };

        match self.vault.decrypt_string(&cipher) {
            Ok(plain) => Ok(Some(plain)),
            Err(err) => {
                warn!(target: "app::settings", error = %err, "failed to decrypt stored API key");
                Ok(None)
            }
        }
    }

    fn load_settings_from_db(&self) -> AppResult<AppSettings> {
        let rows = self.db.with_connection(|conn| {
            let mut rows = SettingsRepository::list_prefixed(conn, "remote.")?;
            rows.extend(SettingsRepository::list_prefixed(conn, "locale.")?);
            rows.extend(SettingsRepository::list_prefixed(conn, "history.")?);
            Ok(rows)
        })?;

        let latest_updated_at = rows.iter().map(|row| row.updated_at.clone()).max();
        let map: HashMap<String, AppSettingRow> =
            rows.into_iter().map(|row| (row.key.clone(), row)).collect();
        let value = |key: &str| map.get(key).map(|row| row.value.clone());

        let remote_base_url = self
            .env
            .remote_base_url
            .clone()
            .or_else(|| value(KEY_REMOTE_BASE_URL));

        let remote_api_key = match &self.env.remote_api_key {
            Some(key) => Some(mask_secret(key)),
            None => self.stored_api_key()?.map(|plain| mask_secret(&plain)),
        };

        let timezone = self
            .env
            .timezone
            .clone()
            .or_else(|| value(KEY_TIMEZONE))
            .filter(|name| match parse_timezone(name) {
                Ok(_) => true,
                Err(_) => {
                    warn!(target: "app::settings", timezone = %name, "ignoring unknown timezone");
                    false
                }
            })
            .unwrap_or_else(|| DEFAULT_TIMEZONE.to_string());

        let parsed_timeout = |key: &str, default: u64| {
            value(key)
                .and_then(|raw| raw.parse::<u64>().ok())
                .filter(|secs| TIMEOUT_RANGE_SECS.contains(secs))
                .unwrap_or(default)
        };

        let history_retention_days = value(KEY_HISTORY_RETENTION)
            .and_then(|raw| raw.parse::<i64>().ok())
            .filter(|days| RETENTION_RANGE_DAYS.contains(days))
            .unwrap_or(DEFAULT_HISTORY_RETENTION_DAYS);

        Ok(AppSettings {
            remote_base_url,
            remote_api_key,
            timezone,
            remote_timeout_secs: parsed_timeout(KEY_REMOTE_TIMEOUT, DEFAULT_REMOTE_TIMEOUT_SECS),
            session_timeout_secs: parsed_timeout(KEY_SESSION_TIMEOUT, DEFAULT_SESSION_TIMEOUT_SECS),
            history_retention_days,
            updated_at: latest_updated_at.unwrap_or_else(|| Utc::now().to_rfc3339()),
        })
    }
}

pub fn parse_timezone(name: &str) -> AppResult<Tz> {
    name.trim()
        .parse::<Tz>()
        .map_err(|err| AppError::validation(format!("unknown timezone `{name}`: {err}")))
}

fn normalize_base_url(url: &str) -> AppResult<String> {
    let trimmed = url.trim().trim_end_matches('/');
    let host = trimmed
        .strip_prefix("https://")
        .or_else(|| trimmed.strip_prefix("http://"));
    match host {
        Some(rest) if !rest.is_empty() => Ok(trimmed.to_string()),
        _ => Err(AppError::validation(
            "remoteBaseUrl must be an http(s) URL with a host",
        )),
    }
}

fn ensure_timeout(field: &str, secs: u64) -> AppResult<()> {
    if !TIMEOUT_RANGE_SECS.contains(&secs) {
        return Err(AppError::validation(format!(
            "{field} must be between {} and {} seconds",
            TIMEOUT_RANGE_SECS.start(),
            TIMEOUT_RANGE_SECS.end()
        )));
    }
    Ok(())
}

fn write_optional(
    conn: &rusqlite::Connection,
    key: &str,
    change: Option<&Option<String>>,
) -> AppResult<()> {
    match change {
        Some(Some(value)) => SettingsRepository::upsert(conn, key, value),
        Some(None) => SettingsRepository::delete(conn, key),
        None => Ok(()),
    }
}
