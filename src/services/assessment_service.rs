use std::sync::Arc;

use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use serde::Serialize;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::db::repositories::assessment_cache_repository::AssessmentCacheRepository;
use crate::db::repositories::assessment_history_repository::AssessmentHistoryRepository;
use crate::db::DbPool;
use crate::error::{AppError, AppResult};
use crate::models::assessment::{
    Assessment, AssessmentHistoryEntry, ContextFactors, DimensionAnswers, DimensionAnswersInput,
    RiskLevel,
};
use crate::models::cooldown::CooldownStatus;
use crate::services::cooldown_gate::CooldownGate;
use crate::services::persistence_service::{
    bounded, session_for_user, PersistOutcome, PersistenceConfig, PersistenceCoordinator,
};
use crate::services::recommendation::recommend;
use crate::services::remote_store::RemoteBinding;
use crate::services::scoring::score;
use crate::services::session_service::SessionProvider;
use crate::services::settings_service::{SettingsService, DEFAULT_TIMEZONE};

pub const DEFAULT_HISTORY_LIMIT: usize = 30;
pub const MAX_HISTORY_LIMIT: usize = 365;

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SubmitAssessmentResult {
    pub assessment: Assessment,
    pub risk_level: RiskLevel,
    pub recommendations: Vec<String>,
    pub persist_outcome: PersistOutcome,
}

/// Scores, assembles and persists assessments; answers cooldown and history queries.
pub struct AssessmentService {
    db: DbPool,
    settings: Arc<SettingsService>,
    sessions: Arc<dyn SessionProvider>,
    remote: RemoteBinding,
}

impl AssessmentService {
    pub fn new(
        db: DbPool,
        settings: Arc<SettingsService>,
        sessions: Arc<dyn SessionProvider>,
        remote: RemoteBinding,
    ) -> Self {
        Self {
            db,
            settings,
            sessions,
            remote,
        }
    }

    pub async fn submit_assessment(
        &self,
        user_id: &str,
        answers: DimensionAnswersInput,
        context_factors: Option<ContextFactors>,
    ) -> AppResult<SubmitAssessmentResult> {
        self.submit_assessment_at(user_id, answers, context_factors, Utc::now())
            .await
    }

    /// Fails only on invalid input; persistence problems land in `persist_outcome`.
    pub async fn submit_assessment_at(
        &self,
        user_id: &str,
        answers: DimensionAnswersInput,
        context_factors: Option<ContextFactors>,
        now: DateTime<Utc>,
    ) -> AppResult<SubmitAssessmentResult> {
        ensure_user_id(user_id)?;
        let dimensions = DimensionAnswers::try_from(answers)?;
        let breakdown = score(&dimensions);
        let recommendations = recommend(&dimensions, breakdown.risk_level);

        let tz = self.settings.timezone().unwrap_or_else(|err| {
            warn!(
                target: "app::assessment",
                error = %err,
                timezone = DEFAULT_TIMEZONE,
                "settings unreadable; dating assessment in default timezone"
            );
            Tz::UTC
        });
        let assessment = Assessment {
            id: Uuid::new_v4().to_string(),
            user_id: user_id.to_string(),
            date: now.with_timezone(&tz).date_naive(),
            dimensions,
            raw_score: breakdown.raw_score,
            normalized_score: breakdown.normalized_score,
            risk_level: breakdown.risk_level,
            recommendations: recommendations.clone(),
            context_factors,
            created_at: now,
        };

        debug!(
            target: "app::assessment",
            user_id,
            raw_score = assessment.raw_score,
            normalized_score = assessment.normalized_score,
            risk_level = %assessment.risk_level,
            recommendations = recommendations.len(),
            "assessment scored"
        );

        let persist_outcome = self.coordinator().save(&assessment).await;
        if !persist_outcome.is_durable() {
            warn!(
                target: "app::assessment",
                user_id,
                local_cached = persist_outcome.local_cached,
                remote = ?persist_outcome.remote,
                "assessment not durably stored remotely"
            );
        }

        Ok(SubmitAssessmentResult {
            risk_level: assessment.risk_level,
            recommendations,
            assessment,
            persist_outcome,
        })
    }

    pub async fn get_cooldown(&self, user_id: &str) -> AppResult<CooldownStatus> {
        self.get_cooldown_at(user_id, Utc::now()).await
    }

    pub async fn get_cooldown_at(
        &self,
        user_id: &str,
        now: DateTime<Utc>,
    ) -> AppResult<CooldownStatus> {
        ensure_user_id(user_id)?;

        let cached = self
            .db
            .with_connection(|conn| AssessmentCacheRepository::find_by_user(conn, user_id))?;

        let last_assessment_at = match cached {
            // Rows cached before completion times were tracked leave the gate open.
            Some(row) => row.completed_at,
            None => self.remote_last_assessment_at(user_id).await,
        };

        Ok(CooldownGate::new(last_assessment_at).evaluate(now))
    }

    /// Cached rolling history, newest first.
    pub fn history(
        &self,
        user_id: &str,
        limit: Option<usize>,
    ) -> AppResult<Vec<AssessmentHistoryEntry>> {
        ensure_user_id(user_id)?;
        let limit = limit
            .unwrap_or(DEFAULT_HISTORY_LIMIT)
            .clamp(1, MAX_HISTORY_LIMIT);
        self.db
            .with_connection(|conn| AssessmentHistoryRepository::list_recent(conn, user_id, limit))
    }

    fn coordinator(&self) -> PersistenceCoordinator {
        let config = match self.settings.persistence_limits() {
            Ok(limits) => PersistenceConfig::from(limits),
            Err(err) => {
                warn!(
                    target: "app::assessment",
                    error = %err,
                    "settings unreadable; using default persistence limits"
                );
                PersistenceConfig::default()
            }
        };
        let remote = self.remote.resolve().unwrap_or_else(|err| {
            warn!(target: "app::assessment", error = %err, "remote store unavailable");
            None
        });
        PersistenceCoordinator::new(self.db.clone(), remote, Arc::clone(&self.sessions), config)
    }

    async fn remote_last_assessment_at(&self, user_id: &str) -> Option<DateTime<Utc>> {
        let store = self.remote.resolve().ok().flatten()?;

        let result = async {
            let limits = self.settings.persistence_limits()?;
            let session =
                session_for_user(self.sessions.as_ref(), user_id, limits.session_timeout).await?;
            bounded(
                "latest_assessment",
                limits.remote_timeout,
                store.latest_assessment(&session, user_id),
            )
            .await
        }
        .await;

        match result {
            Ok(row) => {
                let at = row.map(|row| row.created_at);
                info!(
                    target: "app::assessment",
                    user_id,
                    found = at.is_some(),
                    "cooldown read from remote"
                );
                at
            }
            Err(err) => {
                warn!(
                    target: "app::assessment",
                    user_id,
                    error = %err,
                    "remote cooldown lookup failed; treating as no prior assessment"
                );
                None
            }
        }
    }
}

fn ensure_user_id(user_id: &str) -> AppResult<()> {
    if user_id.trim().is_empty() {
        return Err(AppError::validation("userId cannot be empty"));
    }
    Ok(())
}
