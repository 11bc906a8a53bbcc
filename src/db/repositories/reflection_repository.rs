use std::convert::TryFrom;

use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{named_params, Connection, Row};

use crate::error::{AppError, AppResult};
use crate::models::reflection::{ReflectionKind, ReflectionRecord};

#[derive(Debug, Clone)]
pub struct ReflectionRow {
    pub id: String,
    pub user_id: String,
    pub kind: String,
    pub created_at: String,
}

impl ReflectionRow {
    pub fn into_record(self) -> AppResult<ReflectionRecord> {
        let kind = ReflectionKind::try_from(self.kind.as_str()).map_err(AppError::validation)?;
        let created_at = DateTime::parse_from_rfc3339(&self.created_at)
            .map_err(|err| AppError::database(format!("invalid reflection timestamp: {err}")))?
            .with_timezone(&Utc);

        Ok(ReflectionRecord {
            id: self.id,
            user_id: self.user_id,
            kind,
            created_at,
        })
    }
}

impl TryFrom<&Row<'_>> for ReflectionRow {
    type Error = rusqlite::Error;

    fn try_from(row: &Row<'_>) -> Result<Self, Self::Error> {
        Ok(Self {
            id: row.get("id")?,
            user_id: row.get("user_id")?,
            kind: row.get("kind")?,
            created_at: row.get("created_at")?,
        })
    }
}

/// Read-side copy of reflections produced elsewhere; entries are never edited.
/// Timestamps are stored as fixed-width UTC strings so text comparison orders them.
pub struct ReflectionRepository;

impl ReflectionRepository {
    /// Returns `false` when a record with the same id was already logged.
    pub fn insert_if_absent(conn: &Connection, record: &ReflectionRecord) -> AppResult<bool> {
        let inserted = conn.execute(
            r#"
                INSERT INTO reflection_log (id, user_id, kind, created_at)
                VALUES (:id, :user_id, :kind, :created_at)
                ON CONFLICT(id) DO NOTHING
            "#,
            named_params! {
                ":id": &record.id,
                ":user_id": &record.user_id,
                ":kind": record.kind.as_str(),
                ":created_at": record.created_at.to_rfc3339_opts(SecondsFormat::Millis, true),
            },
        )?;

        Ok(inserted > 0)
    }

    pub fn list_since(
        conn: &Connection,
        user_id: &str,
        since: DateTime<Utc>,
    ) -> AppResult<Vec<ReflectionRecord>> {
        let mut stmt = conn.prepare(
            r#"
                SELECT id, user_id, kind, created_at
                FROM reflection_log
                WHERE user_id = :user_id AND created_at >= :since
                ORDER BY created_at DESC
            "#,
        )?;

        let records = stmt
            .query_map(
                named_params! {
                    ":user_id": user_id,
                    ":since": since.to_rfc3339_opts(SecondsFormat::Millis, true),
                },
                |row| ReflectionRow::try_from(row),
            )?
            .map(|row| {
                row.map_err(AppError::from)
                    .and_then(|row| row.into_record())
            })
            .collect::<AppResult<Vec<_>>>()?;

        Ok(records)
    }
}
