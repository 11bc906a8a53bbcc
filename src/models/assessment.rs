use std::fmt;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map as JsonMap, Value as JsonValue};

use crate::error::{AppError, AppResult};

pub const MIN_DIMENSION_VALUE: i64 = 1;
pub const MAX_DIMENSION_VALUE: i64 = 5;

/// Free-form context tags (workload intensity, breaks taken, ...). Never scored.
pub type ContextFactors = JsonMap<String, JsonValue>;

/// The five self-reported burnout indicators, in declaration order.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "camelCase")]
pub enum Dimension {
    EnergyTank,
    RecoverySpeed,
    EmotionalLeakage,
    PerformanceSignal,
    TomorrowReadiness,
}

impl Dimension {
    pub const ALL: [Dimension; 5] = [
        Dimension::EnergyTank,
        Dimension::RecoverySpeed,
        Dimension::EmotionalLeakage,
        Dimension::PerformanceSignal,
        Dimension::TomorrowReadiness,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Dimension::EnergyTank => "energyTank",
            Dimension::RecoverySpeed => "recoverySpeed",
            Dimension::EmotionalLeakage => "emotionalLeakage",
            Dimension::PerformanceSignal => "performanceSignal",
            Dimension::TomorrowReadiness => "tomorrowReadiness",
        }
    }

    /// Column name used for the flattened local and remote rows.
    pub fn column(&self) -> &'static str {
        match self {
            Dimension::EnergyTank => "energy_tank",
            Dimension::RecoverySpeed => "recovery_speed",
            Dimension::EmotionalLeakage => "emotional_leakage",
            Dimension::PerformanceSignal => "performance_signal",
            Dimension::TomorrowReadiness => "tomorrow_readiness",
        }
    }
}

impl fmt::Display for Dimension {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl TryFrom<&str> for Dimension {
    type Error = String;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        match value {
            "energyTank" | "energy_tank" => Ok(Dimension::EnergyTank),
            "recoverySpeed" | "recovery_speed" => Ok(Dimension::RecoverySpeed),
            "emotionalLeakage" | "emotional_leakage" => Ok(Dimension::EmotionalLeakage),
            "performanceSignal" | "performance_signal" => Ok(Dimension::PerformanceSignal),
            "tomorrowReadiness" | "tomorrow_readiness" => Ok(Dimension::TomorrowReadiness),
            other => Err(format!("unsupported assessment dimension: {other}")),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "lowercase")]
pub enum RiskLevel {
    Low,
    Moderate,
    High,
    Severe,
}

impl RiskLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            RiskLevel::Low => "low",
            RiskLevel::Moderate => "moderate",
            RiskLevel::High => "high",
            RiskLevel::Severe => "severe",
        }
    }
}

impl fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl TryFrom<&str> for RiskLevel {
    type Error = String;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        match value {
            "low" => Ok(RiskLevel::Low),
            "moderate" => Ok(RiskLevel::Moderate),
            "high" => Ok(RiskLevel::High),
            "severe" => Ok(RiskLevel::Severe),
            other => Err(format!("unsupported risk level: {other}")),
        }
    }
}

/// Raw answers as collected by the form; any field may still be missing.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct DimensionAnswersInput {
    #[serde(default)]
    pub energy_tank: Option<i64>,
    #[serde(default)]
    pub recovery_speed: Option<i64>,
    #[serde(default)]
    pub emotional_leakage: Option<i64>,
    #[serde(default)]
    pub performance_signal: Option<i64>,
    #[serde(default)]
    pub tomorrow_readiness: Option<i64>,
}

impl DimensionAnswersInput {
    pub fn get(&self, dimension: Dimension) -> Option<i64> {
        match dimension {
            Dimension::EnergyTank => self.energy_tank,
            Dimension::RecoverySpeed => self.recovery_speed,
            Dimension::EmotionalLeakage => self.emotional_leakage,
            Dimension::PerformanceSignal => self.performance_signal,
            Dimension::TomorrowReadiness => self.tomorrow_readiness,
        }
    }
}

/// Five validated answers, each in `1..=5`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase", try_from = "DimensionAnswersInput")]
pub struct DimensionAnswers {
    energy_tank: u8,
    recovery_speed: u8,
    emotional_leakage: u8,
    performance_signal: u8,
    tomorrow_readiness: u8,
}

impl DimensionAnswers {
    pub fn new(
        energy_tank: i64,
        recovery_speed: i64,
        emotional_leakage: i64,
        performance_signal: i64,
        tomorrow_readiness: i64,
    ) -> AppResult<Self> {
        Self::try_from(DimensionAnswersInput {
            energy_tank: Some(energy_tank),
            recovery_speed: Some(recovery_speed),
            emotional_leakage: Some(emotional_leakage),
            performance_signal: Some(performance_signal),
            tomorrow_readiness: Some(tomorrow_readiness),
        })
    }

    pub fn get(&self, dimension: Dimension) -> u8 {
        match dimension {
            Dimension::EnergyTank => self.energy_tank,
            Dimension::RecoverySpeed => self.recovery_speed,
            Dimension::EmotionalLeakage => self.emotional_leakage,
            Dimension::PerformanceSignal => self.performance_signal,
            Dimension::TomorrowReadiness => self.tomorrow_readiness,
        }
    }

    /// Answers paired with their dimension, in declaration order.
    pub fn iter(&self) -> impl Iterator<Item = (Dimension, u8)> + '_ {
        Dimension::ALL
            .into_iter()
            .map(move |dimension| (dimension, self.get(dimension)))
    }

    pub fn total(&self) -> u8 {
        self.iter().map(|(_, value)| value).sum()
    }
}

impl TryFrom<DimensionAnswersInput> for DimensionAnswers {
    type Error = AppError;

    fn try_from(input: DimensionAnswersInput) -> Result<Self, Self::Error> {
        let mut missing = Vec::new();
        let mut out_of_range = Vec::new();

        for dimension in Dimension::ALL {
            match input.get(dimension) {
                None => missing.push(dimension.as_str()),
                Some(value) if !(MIN_DIMENSION_VALUE..=MAX_DIMENSION_VALUE).contains(&value) => {
                    out_of_range.push(serde_json::json!({
                        "dimension": dimension.as_str(),
                        "value": value,
                    }));
                }
                Some(_) => {}
            }
        }

        if !missing.is_empty() || !out_of_range.is_empty() {
            return Err(AppError::validation_with_details(
                "all five dimensions must be answered with a value between 1 and 5",
                serde_json::json!({
                    "missing": missing,
                    "outOfRange": out_of_range,
                }),
            ));
        }

        let value = |dimension: Dimension| input.get(dimension).unwrap_or_default() as u8;

        Ok(Self {
            energy_tank: value(Dimension::EnergyTank),
            recovery_speed: value(Dimension::RecoverySpeed),
            emotional_leakage: value(Dimension::EmotionalLeakage),
            performance_signal: value(Dimension::PerformanceSignal),
            tomorrow_readiness: value(Dimension::TomorrowReadiness),
        })
    }
}

impl From<DimensionAnswers> for DimensionAnswersInput {
    fn from(answers: DimensionAnswers) -> Self {
        Self {
            energy_tank: Some(answers.energy_tank as i64),
            recovery_speed: Some(answers.recovery_speed as i64),
            emotional_leakage: Some(answers.emotional_leakage as i64),
            performance_signal: Some(answers.performance_signal as i64),
            tomorrow_readiness: Some(answers.tomorrow_readiness as i64),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ScoreBreakdown {
    pub raw_score: u8,
    pub normalized_score: f64,
    pub risk_level: RiskLevel,
}

/// A scored assessment. At most one logical record exists per (user, date).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Assessment {
    pub id: String,
    pub user_id: String,
    pub date: NaiveDate,
    pub dimensions: DimensionAnswers,
    pub raw_score: u8,
    pub normalized_score: f64,
    pub risk_level: RiskLevel,
    pub recommendations: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context_factors: Option<ContextFactors>,
    pub created_at: DateTime<Utc>,
}

impl Assessment {
    pub fn date_key(&self) -> String {
        self.date.format("%Y-%m-%d").to_string()
    }
}

/// Latest assessment held in the local cache for one user.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CachedAssessment {
    pub assessment_id: String,
    pub user_id: String,
    pub date: NaiveDate,
    pub dimensions: DimensionAnswers,
    pub raw_score: u8,
    pub normalized_score: f64,
    pub risk_level: RiskLevel,
    pub recommendations: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context_factors: Option<ContextFactors>,
    /// `None` for rows cached before completion times were tracked.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AssessmentHistoryEntry {
    pub assessment_id: String,
    pub date: NaiveDate,
    pub raw_score: u8,
    pub normalized_score: f64,
    pub risk_level: RiskLevel,
    pub completed_at: DateTime<Utc>,
}
