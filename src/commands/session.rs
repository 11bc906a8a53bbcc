use tracing::info;

use crate::commands::{AppState, CommandResult};
use crate::models::session::Session;

pub async fn session_store(state: &AppState, session: Session) -> CommandResult<()> {
    state.sessions().store(&session)?;
    Ok(())
}

pub async fn session_clear(state: &AppState) -> CommandResult<()> {
    state.sessions().clear()?;
    info!(target: "app::command", "signed out of remote persistence");
    Ok(())
}
