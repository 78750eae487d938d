//! `waypoint config`: Print the effective configuration.

use std::path::Path;
use waypoint_config::AppConfig;

pub fn run(config_path: Option<&Path>, path_only: bool) -> Result<(), Box<dyn std::error::Error>> {
    let file = config_path
        .map(Path::to_path_buf)
        .unwrap_or_else(|| AppConfig::config_dir().join("config.toml"));
    if path_only {
        println!("{}", file.display());
        return Ok(());
    }

    let mut config = super::load_config(config_path).map_err(|e| format!("Failed to load config: {e}"))?;
    if config.api_key.is_some() {
        config.api_key = Some("[REDACTED]".into());
    }
    for provider in config.providers.values_mut() {
        if provider.api_key.is_some() {
            provider.api_key = Some("[REDACTED]".into());
        }
    }

    println!("# {}", file.display());
    println!("{}", toml::to_string_pretty(&config)?);
    Ok(())
}
