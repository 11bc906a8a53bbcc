use crate::commands::{AppState, CommandResult};
use crate::models::assessment::{AssessmentHistoryEntry, ContextFactors, DimensionAnswersInput};
use crate::models::cooldown::CooldownStatus;
use crate::services::assessment_service::SubmitAssessmentResult;

pub async fn assessment_submit(
    state: &AppState,
    user_id: String,
    dimensions: DimensionAnswersInput,
    context_factors: Option<ContextFactors>,
) -> CommandResult<SubmitAssessmentResult> {
    let result = state
        .assessments()
        .submit_assessment(&user_id, dimensions, context_factors)
        .await?;
    Ok(result)
}

pub async fn assessment_cooldown_get(
    state: &AppState,
    user_id: String,
) -> CommandResult<CooldownStatus> {
    let status = state.assessments().get_cooldown(&user_id).await?;
    Ok(status)
}

pub async fn assessment_history_get(
    state: &AppState,
    user_id: String,
    limit: Option<usize>,
) -> CommandResult<Vec<AssessmentHistoryEntry>> {
    let entries = state.assessments().history(&user_id, limit)?;
    Ok(entries)
}
