use std::convert::TryFrom;

use chrono::{DateTime, NaiveDate, Utc};
use rusqlite::{named_params, Connection, OptionalExtension, Row};

use crate::error::{AppError, AppResult};
use crate::models::assessment::{
    Assessment, CachedAssessment, ContextFactors, Dimension, DimensionAnswers, RiskLevel,
};

#[derive(Debug, Clone)]
pub struct AssessmentCacheRow {
    pub user_id: String,
    pub assessment_id: String,
    pub assessment_date: String,
    pub energy_tank: i64,
    pub recovery_speed: i64,
    pub emotional_leakage: i64,
    pub performance_signal: i64,
    pub tomorrow_readiness: i64,
    pub raw_score: i64,
    pub normalized_score: f64,
    pub risk_level: String,
    pub recommendations_json: String,
    pub context_json: Option<String>,
    pub payload_json: String,
    pub completed_at: Option<String>,
}

impl AssessmentCacheRow {
    pub fn from_assessment(assessment: &Assessment) -> AppResult<Self> {
        let answers = &assessment.dimensions;
        let context_json = match &assessment.context_factors {
            Some(context) => Some(serde_json::to_string(context)?),
            None => None,
        };

        Ok(Self {
            user_id: assessment.user_id.clone(),
            assessment_id: assessment.id.clone(),
            assessment_date: assessment.date_key(),
            energy_tank: answers.get(Dimension::EnergyTank) as i64,
            recovery_speed: answers.get(Dimension::RecoverySpeed) as i64,
            emotional_leakage: answers.get(Dimension::EmotionalLeakage) as i64,
            performance_signal: answers.get(Dimension::PerformanceSignal) as i64,
            tomorrow_readiness: answers.get(Dimension::TomorrowReadiness) as i64,
            raw_score: assessment.raw_score as i64,
            normalized_score: assessment.normalized_score,
            risk_level: assessment.risk_level.as_str().to_string(),
            recommendations_json: serde_json::to_string(&assessment.recommendations)?,
            context_json,
            payload_json: serde_json::to_string(assessment)?,
            completed_at: Some(assessment.created_at.to_rfc3339()),
        })
    }

    pub fn into_record(self) -> AppResult<CachedAssessment> {
        let date = NaiveDate::parse_from_str(&self.assessment_date, "%Y-%m-%d")
            .map_err(|err| AppError::database(format!("invalid cached assessment date: {err}")))?;
        let dimensions = DimensionAnswers::new(
            self.energy_tank,
            self.recovery_speed,
            self.emotional_leakage,
            self.performance_signal,
            self.tomorrow_readiness,
        )?;
        let risk_level =
            RiskLevel::try_from(self.risk_level.as_str()).map_err(AppError::validation)?;
        let recommendations: Vec<String> = serde_json::from_str(&self.recommendations_json)?;
        let context_factors: Option<ContextFactors> = match self.context_json {
            Some(raw) => Some(serde_json::from_str(&raw)?),
            None => None,
        };
        let completed_at = match self.completed_at {
            Some(raw) => Some(
                DateTime::parse_from_rfc3339(&raw)
                    .map_err(|err| {
                        AppError::database(format!("invalid cached completion time: {err}"))
                    })?
                    .with_timezone(&Utc),
            ),
            None => None,
        };

        Ok(CachedAssessment {
            assessment_id: self.assessment_id,
            user_id: self.user_id,
            date,
            dimensions,
            raw_score: self.raw_score as u8,
            normalized_score: self.normalized_score,
            risk_level,
            recommendations,
            context_factors,
            completed_at,
        })
    }
}

impl TryFrom<&Row<'_>> for AssessmentCacheRow {
    type Error = rusqlite::Error;

    fn try_from(row: &Row<'_>) -> Result<Self, Self::Error> {
        Ok(Self {
            user_id: row.get("user_id")?,
            assessment_id: row.get("assessment_id")?,
            assessment_date: row.get("assessment_date")?,
            energy_tank: row.get("energy_tank")?,
            recovery_speed: row.get("recovery_speed")?,
            emotional_leakage: row.get("emotional_leakage")?,
            performance_signal: row.get("performance_signal")?,
            tomorrow_readiness: row.get("tomorrow_readiness")?,
            raw_score: row.get("raw_score")?,
            normalized_score: row.get("normalized_score")?,
            risk_level: row.get("risk_level")?,
            recommendations_json: row.get("recommendations_json")?,
            context_json: row.get("context_json")?,
            payload_json: row.get("payload_json")?,
            completed_at: row.get("completed_at")?,
        })
    }
}

/// Single "latest assessment" slot per user; every save overwrites it in place.
pub struct AssessmentCacheRepository;

impl AssessmentCacheRepository {
    pub fn upsert(conn: &Connection, assessment: &Assessment) -> AppResult<()> {
        let row = AssessmentCacheRow::from_assessment(assessment)?;

        conn.execute(
            r#"
                INSERT INTO assessment_cache (
                    user_id,
                    assessment_id,
                    assessment_date,
                    energy_tank,
                    recovery_speed,
                    emotional_leakage,
                    performance_signal,
                    tomorrow_readiness,
                    raw_score,
                    normalized_score,
                    risk_level,
                    recommendations_json,
                    context_json,
                    payload_json,
                    completed_at,
                    updated_at
                ) VALUES (
                    :user_id,
                    :assessment_id,
                    :assessment_date,
                    :energy_tank,
                    :recovery_speed,
                    :emotional_leakage,
                    :performance_signal,
                    :tomorrow_readiness,
                    :raw_score,
                    :normalized_score,
                    :risk_level,
                    :recommendations_json,
                    :context_json,
                    :payload_json,
                    :completed_at,
                    CURRENT_TIMESTAMP
                )
                ON CONFLICT(user_id) DO UPDATE SET
                    assessment_id = excluded.assessment_id,
                    assessment_date = excluded.assessment_date,
                    energy_tank = excluded.energy_tank,
                    recovery_speed = excluded.recovery_speed,
                    emotional_leakage = excluded.emotional_leakage,
                    performance_signal = excluded.performance_signal,
                    tomorrow_readiness = excluded.tomorrow_readiness,
                    raw_score = excluded.raw_score,
                    normalized_score = excluded.normalized_score,
                    risk_level = excluded.risk_level,
                    recommendations_json = excluded.recommendations_json,
                    context_json = excluded.context_json,
                    payload_json = excluded.payload_json,
                    completed_at = excluded.completed_at,
                    updated_at = CURRENT_TIMESTAMP
            "#,
            named_params! {
                ":user_id": &row.user_id,
                ":assessment_id": &row.assessment_id,
                ":assessment_date": &row.assessment_date,
                ":energy_tank": row.energy_tank,
                ":recovery_speed": row.recovery_speed,
                ":emotional_leakage": row.emotional_leakage,
                ":performance_signal": row.performance_signal,
                ":tomorrow_readiness": row.tomorrow_readiness,
                ":raw_score": row.raw_score,
                ":normalized_score": row.normalized_score,
                ":risk_level": &row.risk_level,
                ":recommendations_json": &row.recommendations_json,
                ":context_json": &row.context_json,
                ":payload_json": &row.payload_json,
                ":completed_at": &row.completed_at,
            },
        )?;

        Ok(())
    }

    pub fn find_by_user(conn: &Connection, user_id: &str) -> AppResult<Option<CachedAssessment>> {
        let mut stmt = conn.prepare(
            r#"
                SELECT
                    user_id,
                    assessment_id,
                    assessment_date,
                    energy_tank,
                    recovery_speed,
                    emotional_leakage,
                    performance_signal,
                    tomorrow_readiness,
                    raw_score,
                    normalized_score,
                    risk_level,
                    recommendations_json,
                    context_json,
                    payload_json,
                    completed_at
                FROM assessment_cache
                WHERE user_id = :user_id
            "#,
        )?;

        let row = stmt
            .query_row(named_params! {":user_id": user_id}, |row| {
                AssessmentCacheRow::try_from(row)
            })
            .optional()?;

        row.map(AssessmentCacheRow::into_record).transpose()
    }

    /// Raw JSON of the full cached record, as written by the last save.
    pub fn find_payload(conn: &Connection, user_id: &str) -> AppResult<Option<String>> {
        let payload = conn
            .query_row(
                "SELECT payload_json FROM assessment_cache WHERE user_id = ?1",
                [user_id],
                |row| row.get::<_, String>(0),
            )
            .optional()?;
        Ok(payload)
    }
}
