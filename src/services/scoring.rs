use crate::models::assessment::{DimensionAnswers, RiskLevel, ScoreBreakdown};

pub const MIN_RAW_SCORE: u8 = 5;
pub const MAX_RAW_SCORE: u8 = 25;

// Upper bounds (inclusive) of each bucket on the 0-10 scale.
const LOW_UPPER: f64 = 2.5;
const MODERATE_UPPER: f64 = 5.0;
const HIGH_UPPER: f64 = 7.5;

/// Scores five validated answers. Higher scores mean more burnout risk.
pub fn score(answers: &DimensionAnswers) -> ScoreBreakdown {
    let raw_score = answers.total();
    let normalized_score = normalize(raw_score);
    ScoreBreakdown {
        raw_score,
        normalized_score,
        risk_level: risk_level_for(normalized_score),
    }
}

/// Linear rescale of `[5, 25]` onto `[0, 10]`, rounded to one decimal.
pub fn normalize(raw_score: u8) -> f64 {
    let clamped = raw_score.clamp(MIN_RAW_SCORE, MAX_RAW_SCORE);
    let span = (MAX_RAW_SCORE - MIN_RAW_SCORE) as f64;
    let scaled = (clamped - MIN_RAW_SCORE) as f64 * 10.0 / span;
    round_to_tenth(scaled)
}

pub fn risk_level_for(normalized_score: f64) -> RiskLevel {
    if normalized_score <= LOW_UPPER {
        RiskLevel::Low
    } else if normalized_score <= MODERATE_UPPER {
        RiskLevel::Moderate
    } else if normalized_score <= HIGH_UPPER {
        RiskLevel::High
    } else {
        RiskLevel::Severe
    }
}

fn round_to_tenth(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}
