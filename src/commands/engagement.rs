use crate::commands::{AppState, CommandResult};
use crate::models::engagement::EngagementStats;
use crate::models::reflection::ReflectionRecord;

pub async fn engagement_stats_get(
    state: &AppState,
    user_id: String,
) -> CommandResult<EngagementStats> {
    let stats = state.engagement().stats(&user_id).await?;
    Ok(stats)
}

/// Returns `true` when the record was new.
pub async fn reflection_record(state: &AppState, record: ReflectionRecord) -> CommandResult<bool> {
    let inserted = state.engagement().record_reflection(&record)?;
    Ok(inserted)
}
