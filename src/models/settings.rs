use serde::Serialize;

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AppSettings {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub remote_base_url: Option<String>,
    /// Masked on read; the plain key never leaves the settings service.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub remote_api_key: Option<String>,
    pub timezone: String,
    pub remote_timeout_secs: u64,
    pub session_timeout_secs: u64,
    pub history_retention_days: i64,
    pub updated_at: String,
}

/// Partial update; `Some(None)` clears an optional field.
#[derive(Debug, Default, Clone)]
pub struct SettingsUpdateInput {
    pub remote_base_url: Option<Option<String>>,
    pub remote_api_key: Option<Option<String>>,
    pub timezone: Option<String>,
    pub remote_timeout_secs: Option<u64>,
    pub session_timeout_secs: Option<u64>,
    pub history_retention_days: Option<i64>,
}
