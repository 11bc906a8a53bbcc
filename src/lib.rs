pub mod commands;
pub mod db;
pub mod error;
pub mod models;
pub mod services;
pub mod utils;

use std::path::Path;

use crate::commands::AppState;
use crate::error::AppResult;

/// Sets up logging and the local cache under `data_dir` and builds the command state.
pub fn launch(data_dir: &Path) -> AppResult<AppState> {
    crate::utils::logger::init_logging(&data_dir.join("logs"))?;

    std::fs::create_dir_all(data_dir)?;
    let pool = crate::db::DbPool::in_dir(data_dir)?;

    AppState::new(pool)
}
