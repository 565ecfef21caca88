//! Effective configuration view — `sitecraft config`.

use anyhow::Result;

use sitecraft::config::AppConfig;

/// Print the merged configuration. API keys are never part of it; providers
/// only name the environment variable that holds their key.
pub fn cmd_config(config: &AppConfig) -> Result<()> {
    println!("{}", config.to_toml_string()?);
    Ok(())
}
