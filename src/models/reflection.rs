use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "camelCase")]
pub enum ReflectionKind {
    PreAssignment,
    PostAssignment,
    TeamDebrief,
    MidShiftReset,
    BurnoutAssessment,
    FreeJournal,
}

impl ReflectionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReflectionKind::PreAssignment => "preAssignment",
            ReflectionKind::PostAssignment => "postAssignment",
            ReflectionKind::TeamDebrief => "teamDebrief",
            ReflectionKind::MidShiftReset => "midShiftReset",
            ReflectionKind::BurnoutAssessment => "burnoutAssessment",
            ReflectionKind::FreeJournal => "freeJournal",
        }
    }
}

impl fmt::Display for ReflectionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl TryFrom<&str> for ReflectionKind {
    type Error = String;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        match value {
            "preAssignment" => Ok(ReflectionKind::PreAssignment),
            "postAssignment" => Ok(ReflectionKind::PostAssignment),
            "teamDebrief" => Ok(ReflectionKind::TeamDebrief),
            "midShiftReset" => Ok(ReflectionKind::MidShiftReset),
            "burnoutAssessment" => Ok(ReflectionKind::BurnoutAssessment),
            "freeJournal" => Ok(ReflectionKind::FreeJournal),
            other => Err(format!("unsupported reflection kind: {other}")),
        }
    }
}

/// Timestamped entry owned by the reflection-saving collaborator.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ReflectionRecord {
    pub id: String,
    pub user_id: String,
    pub kind: ReflectionKind,
    pub created_at: DateTime<Utc>,
}

impl ReflectionRecord {
    pub fn new(
        id: impl Into<String>,
        user_id: impl Into<String>,
        kind: ReflectionKind,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: id.into(),
            user_id: user_id.into(),
            kind,
            created_at,
        }
    }
}
