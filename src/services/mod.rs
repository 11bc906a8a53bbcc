pub mod assessment_service;
pub mod cooldown_gate;
pub mod engagement_service;
pub mod persistence_service;
pub mod recommendation;
pub mod remote_store;
pub mod scoring;
pub mod session_service;
pub mod settings_service;
