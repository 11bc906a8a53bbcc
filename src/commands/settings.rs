use serde::Deserialize;

use crate::models::settings::{AppSettings, SettingsUpdateInput};

use super::{AppState, CommandResult};

pub async fn settings_get(state: &AppState) -> CommandResult<AppSettings> {
    Ok(state.settings().get()?)
}

pub async fn settings_update(
    state: &AppState,
    payload: SettingsUpdatePayload,
) -> CommandResult<AppSettings> {
    Ok(state.settings().update(payload.into_input())?)
}

/// Forgets the remote API key and the stored session.
pub async fn settings_clear_credentials(state: &AppState) -> CommandResult<AppSettings> {
    let service = state.settings();
    service.clear_sensitive()?;
    Ok(service.get()?)
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SettingsUpdatePayload {
    #[serde(default)]
    remote_base_url: Option<String>,
    #[serde(default)]
    remove_remote_base_url: Option<bool>,
    #[serde(default)]
    remote_api_key: Option<String>,
    #[serde(default)]
    remove_remote_api_key: Option<bool>,
    #[serde(default)]
    timezone: Option<String>,
    #[serde(default)]
    remote_timeout_secs: Option<u64>,
    #[serde(default)]
    session_timeout_secs: Option<u64>,
    #[serde(default)]
    history_retention_days: Option<i64>,
}

impl SettingsUpdatePayload {
    fn into_input(self) -> SettingsUpdateInput {
        let clearable = |value: Option<String>, remove: Option<bool>| {
            if remove == Some(true) {
                Some(None)
            } else {
                value.map(Some)
            }
        };

        SettingsUpdateInput {
            remote_base_url: clearable(self.remote_base_url, self.remove_remote_base_url),
            remote_api_key: clearable(self.remote_api_key, self.remove_remote_api_key),
            timezone: self.timezone,
            remote_timeout_secs: self.remote_timeout_secs,
            session_timeout_secs: self.session_timeout_secs,
            history_retention_days: self.history_retention_days,
        }
    }
}
