use std::convert::TryFrom;

use chrono::{DateTime, NaiveDate, Utc};
use rusqlite::{named_params, Connection, Row};

use crate::error::{AppError, AppResult};
use crate::models::assessment::{Assessment, AssessmentHistoryEntry, RiskLevel};

#[derive(Debug, Clone)]
pub struct AssessmentHistoryRow {
    pub user_id: String,
    pub assessment_date: String,
    pub assessment_id: String,
    pub raw_score: i64,
    pub normalized_score: f64,
    pub risk_level: String,
    pub completed_at: String,
}

impl AssessmentHistoryRow {
    pub fn into_record(self) -> AppResult<AssessmentHistoryEntry> {
        let date = NaiveDate::parse_from_str(&self.assessment_date, "%Y-%m-%d")
            .map_err(|err| AppError::database(format!("invalid history date: {err}")))?;
        let risk_level =
            RiskLevel::try_from(self.risk_level.as_str()).map_err(AppError::validation)?;
        let completed_at = DateTime::parse_from_rfc3339(&self.completed_at)
            .map_err(|err| AppError::database(format!("invalid history timestamp: {err}")))?
            .with_timezone(&Utc);

        Ok(AssessmentHistoryEntry {
            assessment_id: self.assessment_id,
            date,
            raw_score: self.raw_score as u8,
            normalized_score: self.normalized_score,
            risk_level,
            completed_at,
        })
    }
}

impl TryFrom<&Row<'_>> for AssessmentHistoryRow {
    type Error = rusqlite::Error;

    fn try_from(row: &Row<'_>) -> Result<Self, Self::Error> {
        Ok(Self {
            user_id: row.get("user_id")?,
            assessment_date: row.get("assessment_date")?,
            assessment_id: row.get("assessment_id")?,
            raw_score: row.get("raw_score")?,
            normalized_score: row.get("normalized_score")?,
            risk_level: row.get("risk_level")?,
            completed_at: row.get("completed_at")?,
        })
    }
}

/// Rolling per-user history, one entry per calendar day.
pub struct AssessmentHistoryRepository;

impl AssessmentHistoryRepository {
    pub fn upsert(conn: &Connection, assessment: &Assessment) -> AppResult<()> {
        let payload_json = serde_json::to_string(assessment)?;

        conn.execute(
            r#"
                INSERT INTO assessment_history (
                    user_id,
                    assessment_date,
                    assessment_id,
                    raw_score,
                    normalized_score,
                    risk_level,
                    payload_json,
                    completed_at
                ) VALUES (
                    :user_id,
                    :assessment_date,
                    :assessment_id,
                    :raw_score,
                    :normalized_score,
                    :risk_level,
                    :payload_json,
                    :completed_at
                )
                ON CONFLICT(user_id, assessment_date) DO UPDATE SET
                    assessment_id = excluded.assessment_id,
                    raw_score = excluded.raw_score,
                    normalized_score = excluded.normalized_score,
                    risk_level = excluded.risk_level,
                    payload_json = excluded.payload_json,
                    completed_at = excluded.completed_at
            "#,
            named_params! {
                ":user_id": &assessment.user_id,
                ":assessment_date": assessment.date_key(),
                ":assessment_id": &assessment.id,
                ":raw_score": assessment.raw_score as i64,
                ":normalized_score": assessment.normalized_score,
                ":risk_level": assessment.risk_level.as_str(),
                ":payload_json": &payload_json,
                ":completed_at": assessment.created_at.to_rfc3339(),
            },
        )?;

        Ok(())
    }

    /// Drops entries dated before `keep_from`. Returns the number removed.
    pub fn trim_before(conn: &Connection, user_id: &str, keep_from: NaiveDate) -> AppResult<usize> {
        let removed = conn.execute(
            "DELETE FROM assessment_history WHERE user_id = :user_id AND assessment_date < :keep_from",
            named_params! {
                ":user_id": user_id,
                ":keep_from": keep_from.format("%Y-%m-%d").to_string(),
            },
        )?;
        Ok(removed)
    }

    pub fn list_recent(
        conn: &Connection,
        user_id: &str,
        limit: usize,
    ) -> AppResult<Vec<AssessmentHistoryEntry>> {
        let mut stmt = conn.prepare(
            r#"
                SELECT
                    user_id,
                    assessment_date,
                    assessment_id,
                    raw_score,
                    normalized_score,
                    risk_level,
                    completed_at
                FROM assessment_history
                WHERE user_id = :user_id
                ORDER BY assessment_date DESC
                LIMIT :limit
            "#,
        )?;

        let records = stmt
            .query_map(
                named_params! {":user_id": user_id, ":limit": limit as i64},
                |row| AssessmentHistoryRow::try_from(row),
            )?
            .map(|row| {
                row.map_err(AppError::from)
                    .and_then(|row| row.into_record())
            })
            .collect::<AppResult<Vec<_>>>()?;

        Ok(records)
    }

    pub fn count_for_user(conn: &Connection, user_id: &str) -> AppResult<i64> {
        let count = conn.query_row(
            "SELECT COUNT(*) FROM assessment_history WHERE user_id = ?1",
            [user_id],
            |row| row.get(0),
        )?;
        Ok(count)
    }
}
