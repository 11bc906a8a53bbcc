use std::sync::{Arc, RwLock};
use std::time::{Duration as StdDuration, Instant};

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, SecondsFormat, Utc};
use reqwest::{RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use tracing::{debug, warn};

use crate::error::{AppError, AppResult};
use crate::models::assessment::{Assessment, ContextFactors, Dimension, RiskLevel};
use crate::models::reflection::{ReflectionKind, ReflectionRecord};
use crate::models::session::Session;
use crate::services::settings_service::SettingsService;

pub const ASSESSMENTS_TABLE: &str = "burnout_assessments";
pub const REFLECTIONS_TABLE: &str = "reflection_entries";

const UNIQUE_VIOLATION_CODE: &str = "23505";

/// Flattened assessment row as stored remotely, unique on `(user_id, assessment_date)`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RemoteAssessmentRow {
    #[serde(default, skip_serializing)]
    pub id: Option<JsonValue>,
    pub user_id: String,
    pub assessment_date: NaiveDate,
    pub energy_tank: u8,
    pub recovery_speed: u8,
    pub emotional_leakage: u8,
    pub performance_signal: u8,
    pub tomorrow_readiness: u8,
    pub raw_score: u8,
    pub normalized_score: f64,
    pub risk_level: RiskLevel,
    #[serde(default)]
    pub recommendations: Vec<String>,
    #[serde(default)]
    pub context_factors: Option<ContextFactors>,
    pub created_at: DateTime<Utc>,
}

impl From<&Assessment> for RemoteAssessmentRow {
    fn from(assessment: &Assessment) -> Self {
        let answers = &assessment.dimensions;
        Self {
            id: None,
            user_id: assessment.user_id.clone(),
            assessment_date: assessment.date,
            energy_tank: answers.get(Dimension::EnergyTank),
            recovery_speed: answers.get(Dimension::RecoverySpeed),
            emotional_leakage: answers.get(Dimension::EmotionalLeakage),
            performance_signal: answers.get(Dimension::PerformanceSignal),
            tomorrow_readiness: answers.get(Dimension::TomorrowReadiness),
            raw_score: assessment.raw_score,
            normalized_score: assessment.normalized_score,
            risk_level: assessment.risk_level,
            recommendations: assessment.recommendations.clone(),
            context_factors: assessment.context_factors.clone(),
            created_at: assessment.created_at,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
struct RemoteReflectionRow {
    id: JsonValue,
    user_id: String,
    kind: String,
    created_at: DateTime<Utc>,
}

impl RemoteReflectionRow {
    fn into_record(self) -> Option<ReflectionRecord> {
        let id = match self.id {
            JsonValue::String(value) => value,
            other => other.to_string(),
        };
        match ReflectionKind::try_from(self.kind.as_str()) {
            Ok(kind) => Some(ReflectionRecord::new(id, self.user_id, kind, self.created_at)),
            Err(reason) => {
                warn!(target: "app::remote", %id, %reason, "skipping remote reflection");
                None
            }
        }
    }
}

/// Row-oriented remote store keyed logically by `(user_id, date)`.
#[async_trait]
pub trait RemoteStore: Send + Sync {
    /// Fails with `DuplicateConflict` when a row for that day already exists.
    async fn insert_assessment(&self, session: &Session, row: &RemoteAssessmentRow)
        -> AppResult<()>;

    /// Replaces the whole row matching `(user_id, assessment_date)`.
    async fn update_assessment(&self, session: &Session, row: &RemoteAssessmentRow)
        -> AppResult<()>;

    async fn latest_assessment(
        &self,
        session: &Session,
        user_id: &str,
    ) -> AppResult<Option<RemoteAssessmentRow>>;

    async fn list_reflections(
        &self,
        session: &Session,
        user_id: &str,
        since: DateTime<Utc>,
    ) -> AppResult<Vec<ReflectionRecord>>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteStoreConfig {
    pub base_url: String,
    pub api_key: String,
    pub timeout: StdDuration,
}

/// PostgREST-style HTTP implementation of [`RemoteStore`].
#[derive(Debug, Clone)]
pub struct RestRemoteStore {
    client: reqwest::Client,
    rest_url: String,
    api_key: String,
    timeout: StdDuration,
}

impl RestRemoteStore {
    pub fn try_new(config: &RemoteStoreConfig) -> AppResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .pool_max_idle_per_host(2)
            .pool_idle_timeout(Some(StdDuration::from_secs(90)))
            .build()
            .map_err(|err| AppError::other(format!("failed to build remote HTTP client: {err}")))?;

        let base_url = config.base_url.trim_end_matches('/');

        Ok(Self {
            client,
            rest_url: format!("{base_url}/rest/v1"),
            api_key: config.api_key.clone(),
            timeout: config.timeout,
        })
    }

    fn table_url(&self, table: &str) -> String {
        format!("{}/{}", self.rest_url, table)
    }

    fn authorize(&self, builder: RequestBuilder, session: &Session) -> RequestBuilder {
        builder
            .header("apikey", &self.api_key)
            .bearer_auth(&session.access_token)
            .header("Prefer", "return=representation")
    }

    async fn send(&self, operation: &'static str, builder: RequestBuilder) -> AppResult<Response> {
        let start = Instant::now();
        let response = builder
            .send()
            .await
            .map_err(|err| Self::error_from_reqwest(err, operation, self.timeout))?;

        let status = response.status();
        debug!(
            target: "app::remote",
            operation,
            status = status.as_u16(),
            latency_ms = start.elapsed().as_millis() as u64,
            "remote store responded"
        );

        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        Err(Self::map_remote_error(status, &body))
    }

    async fn read_rows<T: DeserializeOwned>(
        operation: &'static str,
        response: Response,
    ) -> AppResult<Vec<T>> {
        let status = response.status().as_u16();
        let body = response.text().await.map_err(|err| {
            AppError::persistence_failure(
                Some(status),
                format!("{operation}: unreadable body: {err}"),
            )
        })?;
        if body.trim().is_empty() {
            return Ok(Vec::new());
        }
        serde_json::from_str(&body).map_err(|err| {
            AppError::persistence_failure(Some(status), format!("{operation}: invalid rows: {err}"))
        })
    }

    fn map_remote_error(status: StatusCode, body: &str) -> AppError {
        let parsed: Option<JsonValue> = serde_json::from_str(body).ok();
        let field = |name: &str| {
            parsed
                .as_ref()
                .and_then(|value| value.get(name))
                .and_then(|value| value.as_str())
                .map(str::to_string)
        };
        let code = field("code").unwrap_or_default();
        let message = field("message").unwrap_or_else(|| {
            status
                .canonical_reason()
                .unwrap_or("unexpected response")
                .to_string()
        });

        let jwt_error = code.starts_with("PGRST30") || message.contains("JWT");
        if matches!(status, StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN) || jwt_error {
            return AppError::authentication_required(message);
        }

        if status == StatusCode::CONFLICT || code == UNIQUE_VIOLATION_CODE {
            return AppError::duplicate_conflict(message);
        }

        AppError::persistence_failure(Some(status.as_u16()), message)
    }

    fn error_from_reqwest(err: reqwest::Error, operation: &str, timeout: StdDuration) -> AppError {
        if err.is_timeout() {
            AppError::remote_timeout(operation, timeout)
        } else if let Some(status) = err.status() {
            Self::map_remote_error(status, "")
        } else if err.is_connect() {
            AppError::persistence_failure(None, format!("{operation}: remote store unreachable"))
        } else {
            AppError::persistence_failure(None, format!("{operation}: {err}"))
        }
    }
}

#[async_trait]
impl RemoteStore for RestRemoteStore {
    async fn insert_assessment(
        &self,
        session: &Session,
        row: &RemoteAssessmentRow,
    ) -> AppResult<()> {
        let request = self
            .authorize(self.client.post(self.table_url(ASSESSMENTS_TABLE)), session)
            .json(row);
        self.send("insert_assessment", request).await?;
        Ok(())
    }

    async fn update_assessment(
        &self,
        session: &Session,
        row: &RemoteAssessmentRow,
    ) -> AppResult<()> {
        let date = row.assessment_date.format("%Y-%m-%d").to_string();
        let request = self
            .authorize(self.client.patch(self.table_url(ASSESSMENTS_TABLE)), session)
            .query(&[
                ("user_id", format!("eq.{}", row.user_id)),
                ("assessment_date", format!("eq.{date}")),
            ])
            .json(row);

        let response = self.send("update_assessment", request).await?;
        let status = response.status().as_u16();
        let updated: Vec<JsonValue> = Self::read_rows("update_assessment", response).await?;
        if updated.is_empty() {
            return Err(AppError::persistence_failure(
                Some(status),
                format!("update matched no row for {date}"),
            ));
        }
        Ok(())
    }

    async fn latest_assessment(
        &self,
        session: &Session,
        user_id: &str,
    ) -> AppResult<Option<RemoteAssessmentRow>> {
        let request = self
            .authorize(self.client.get(self.table_url(ASSESSMENTS_TABLE)), session)
            .query(&[
                ("select", "*".to_string()),
                ("user_id", format!("eq.{user_id}")),
                ("order", "created_at.desc".to_string()),
                ("limit", "1".to_string()),
            ]);

        let response = self.send("latest_assessment", request).await?;
        let rows: Vec<RemoteAssessmentRow> = Self::read_rows("latest_assessment", response).await?;
        Ok(rows.into_iter().next())
    }

    async fn list_reflections(
        &self,
        session: &Session,
        user_id: &str,
        since: DateTime<Utc>,
    ) -> AppResult<Vec<ReflectionRecord>> {
        let request = self
            .authorize(self.client.get(self.table_url(REFLECTIONS_TABLE)), session)
            .query(&[
                ("select", "id,user_id,kind,created_at".to_string()),
                ("user_id", format!("eq.{user_id}")),
                (
                    "created_at",
                    format!("gte.{}", since.to_rfc3339_opts(SecondsFormat::Secs, true)),
                ),
                ("order", "created_at.desc".to_string()),
            ]);

        let response = self.send("list_reflections", request).await?;
        let rows: Vec<RemoteReflectionRow> = Self::read_rows("list_reflections", response).await?;
        Ok(rows
            .into_iter()
            .filter_map(RemoteReflectionRow::into_record)
            .collect())
    }
}

/// Where services obtain the remote store from.
#[derive(Clone)]
pub enum RemoteBinding {
    Disabled,
    Fixed(Arc<dyn RemoteStore>),
    /// Built from the current settings and rebuilt when they change.
    Configured(Arc<ConfiguredRemote>),
}

impl RemoteBinding {
    pub fn from_settings(settings: Arc<SettingsService>) -> Self {
        RemoteBinding::Configured(Arc::new(ConfiguredRemote {
            settings,
            cached: RwLock::new(None),
        }))
    }

    pub fn fixed(store: Arc<dyn RemoteStore>) -> Self {
        RemoteBinding::Fixed(store)
    }

    pub fn resolve(&self) -> AppResult<Option<Arc<dyn RemoteStore>>> {
        match self {
            RemoteBinding::Disabled => Ok(None),
            RemoteBinding::Fixed(store) => Ok(Some(Arc::clone(store))),
            RemoteBinding::Configured(configured) => configured.resolve(),
        }
    }
}

pub struct ConfiguredRemote {
    settings: Arc<SettingsService>,
    cached: RwLock<Option<(RemoteStoreConfig, Arc<RestRemoteStore>)>>,
}

impl ConfiguredRemote {
    fn resolve(&self) -> AppResult<Option<Arc<dyn RemoteStore>>> {
        let Some(config) = self.settings.remote_store_config()? else {
            if let Ok(mut guard) = self.cached.write() {
                *guard = None;
            }
            return Ok(None);
        };

        if let Ok(guard) = self.cached.read() {
            if let Some((cached_config, store)) = guard.as_ref() {
                if *cached_config == config {
                    return Ok(Some(Arc::clone(store) as Arc<dyn RemoteStore>));
                }
            }
        }

        let store = Arc::new(RestRemoteStore::try_new(&config)?);
        debug!(target: "app::remote", base_url = %config.base_url, "remote store client built");
        if let Ok(mut guard) = self.cached.write() {
            *guard = Some((config, Arc::clone(&store)));
        }
        Ok(Some(store))
    }
}

pub mod testing {
    use std::collections::BTreeMap;
    use std::sync::Mutex;

    use super::*;

    /// How [`InMemoryRemoteStore`] answers the next calls.
    #[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
    pub enum FakeBehavior {
        #[default]
        Normal,
        Unauthorized,
        /// Every call waits until the caller's deadline fires.
        Hang,
        ServerError,
        /// Updates report that no row matched.
        LoseUpdates,
    }

    /// Remote double enforcing the `(user_id, assessment_date)` uniqueness of the real table.
    #[derive(Default)]
    pub struct InMemoryRemoteStore {
        rows: Mutex<BTreeMap<(String, NaiveDate), RemoteAssessmentRow>>,
        reflections: Mutex<Vec<ReflectionRecord>>,
        behavior: Mutex<FakeBehavior>,
        calls: Mutex<Vec<&'static str>>,
    }

    fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
        mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    impl InMemoryRemoteStore {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn set_behavior(&self, behavior: FakeBehavior) {
            *lock(&self.behavior) = behavior;
        }

        pub fn put_row(&self, row: RemoteAssessmentRow) {
            lock(&self.rows).insert((row.user_id.clone(), row.assessment_date), row);
        }

        pub fn add_reflection(&self, record: ReflectionRecord) {
            lock(&self.reflections).push(record);
        }

        pub fn rows(&self) -> Vec<RemoteAssessmentRow> {
            lock(&self.rows).values().cloned().collect()
        }

        pub fn calls(&self) -> Vec<&'static str> {
            lock(&self.calls).clone()
        }

        async fn begin(&self, operation: &'static str) -> AppResult<FakeBehavior> {
            lock(&self.calls).push(operation);
            let behavior = *lock(&self.behavior);
            match behavior {
                FakeBehavior::Unauthorized => {
                    Err(AppError::authentication_required("JWT expired"))
                }
                FakeBehavior::ServerError => Err(AppError::persistence_failure(
                    Some(503),
                    "service unavailable",
                )),
                FakeBehavior::Hang => {
                    tokio::time::sleep(StdDuration::from_secs(3600)).await;
                    Err(AppError::other("hung call resumed"))
                }
                other => Ok(other),
            }
        }
    }

    #[async_trait]
    impl RemoteStore for InMemoryRemoteStore {
        async fn insert_assessment(
            &self,
            _session: &Session,
            row: &RemoteAssessmentRow,
        ) -> AppResult<()> {
            self.begin("insert").await?;
            let mut rows = lock(&self.rows);
            let key = (row.user_id.clone(), row.assessment_date);
            if rows.contains_key(&key) {
                return Err(AppError::duplicate_conflict(
                    "duplicate key value violates unique constraint",
                ));
            }
            rows.insert(key, row.clone());
            Ok(())
        }

        async fn update_assessment(
            &self,
            _session: &Session,
            row: &RemoteAssessmentRow,
        ) -> AppResult<()> {
            let behavior = self.begin("update").await?;
            let mut rows = lock(&self.rows);
            let key = (row.user_id.clone(), row.assessment_date);
            if behavior == FakeBehavior::LoseUpdates || !rows.contains_key(&key) {
                return Err(AppError::persistence_failure(
                    Some(200),
                    format!("update matched no row for {}", row.assessment_date),
                ));
            }
            rows.insert(key, row.clone());
            Ok(())
        }

        async fn latest_assessment(
            &self,
            _session: &Session,
            user_id: &str,
        ) -> AppResult<Option<RemoteAssessmentRow>> {
            self.begin("latest").await?;
            Ok(lock(&self.rows)
                .values()
                .filter(|row| row.user_id == user_id)
                .max_by_key(|row| row.created_at)
                .cloned())
        }

        async fn list_reflections(
            &self,
            _session: &Session,
            user_id: &str,
            since: DateTime<Utc>,
        ) -> AppResult<Vec<ReflectionRecord>> {
            self.begin("list_reflections").await?;
            Ok(lock(&self.reflections)
                .iter()
                .filter(|record| record.user_id == user_id && record.created_at >= since)
                .cloned()
                .collect())
        }
    }

    /// Status/body classification used by the HTTP store, exposed for integration tests.
    pub fn map_remote_error(status: u16, body: &str) -> AppError {
        let status = StatusCode::from_u16(status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        RestRemoteStore::map_remote_error(status, body)
    }

    pub fn store_for(
        base_url: &str,
        api_key: &str,
        timeout: StdDuration,
    ) -> AppResult<RestRemoteStore> {
        RestRemoteStore::try_new(&RemoteStoreConfig {
            base_url: base_url.to_string(),
            api_key: api_key.to_string(),
            timeout,
        })
    }
}
