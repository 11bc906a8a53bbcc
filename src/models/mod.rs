pub mod assessment;
pub mod cooldown;
pub mod engagement;
pub mod reflection;
pub mod session;
pub mod settings;
