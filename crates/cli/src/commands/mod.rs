pub mod answer;
pub mod chat;
pub mod config_cmd;
pub mod inspect;
pub mod render;
pub mod resume;
pub mod serve;

use std::path::Path;
use waypoint_config::{AppConfig, ConfigError};

/// Load the config from `path` or the default location, with env overrides.
pub fn load_config(path: Option<&Path>) -> Result<AppConfig, ConfigError> {
    match path {
        Some(path) => AppConfig::load_with_env(path),
        None => AppConfig::load(),
    }
}
