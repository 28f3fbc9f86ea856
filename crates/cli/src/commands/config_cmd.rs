//! `roomcast config`: show the effective configuration.

use roomcast_config::AppConfig;

pub fn run(default: bool) -> Result<(), Box<dyn std::error::Error>> {
    if default {
        print!("{}", AppConfig::default_toml());
        return Ok(());
    }

    let config = AppConfig::load().map_err(|e| format!("Failed to load config: {e}"))?;
    println!("# {}", AppConfig::config_dir().join("config.toml").display());
    println!("{}", toml::to_string_pretty(&redacted(config))?);
    Ok(())
}

/// Replace credentials so the output is safe to paste.
fn redacted(mut config: AppConfig) -> AppConfig {
    const MASK: &str = "[REDACTED]";
    if config.llm.api_key.is_some() {
        config.llm.api_key = Some(MASK.into());
    }
    if config.search.api_key.is_some() {
        config.search.api_key = Some(MASK.into());
    }
    config
}
