use crate::models::assessment::{Dimension, DimensionAnswers, RiskLevel};

/// Answers at or below this value trigger the dimension's recommendations.
pub const WEAK_ANSWER_THRESHOLD: u8 = 2;

fn recommendations_for(dimension: Dimension) -> [&'static str; 2] {
    match dimension {
        Dimension::EnergyTank => [
            "Schedule a full recovery block before your next assignment",
            "Cut back on back-to-back sessions until your energy rebuilds",
        ],
        Dimension::RecoverySpeed => [
            "Add a decompression ritual after each assignment",
            "Protect your sleep window on heavy interpreting days",
        ],
        Dimension::EmotionalLeakage => [
            "Debrief difficult content with a trusted colleague or supervisor",
            "Use a grounding exercise to close out emotionally charged sessions",
        ],
        Dimension::PerformanceSignal => [
            "Request a team interpreter or shorter turns on demanding jobs",
            "Review your preparation routine for upcoming assignments",
        ],
        Dimension::TomorrowReadiness => [
            "Prepare tomorrow's glossary and logistics tonight, then switch off",
            "Plan one restorative activity for tomorrow outside of work",
        ],
    }
}

/// Builds the ordered recommendation list for a set of answers.
///
/// Selection depends only on per-dimension answers; `risk_level` is part of
/// the signature but does not change which entries are returned.
pub fn recommend(answers: &DimensionAnswers, _risk_level: RiskLevel) -> Vec<String> {
    answers
        .iter()
        .filter(|(_, value)| *value <= WEAK_ANSWER_THRESHOLD)
        .flat_map(|(dimension, _)| recommendations_for(dimension))
        .map(str::to_string)
        .collect()
}
