mod auth;
mod health;
mod screenshots;
mod settings;

pub use auth::{login, select_realm};
pub use health::health_check;
pub use screenshots::{delete_screenshot, list_screenshots, upload_screenshot};
pub use settings::{get_settings, put_settings};
