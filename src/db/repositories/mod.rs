pub mod assessment_cache_repository;
pub mod assessment_history_repository;
pub mod reflection_repository;
pub mod settings_repository;
