use anyhow::{Context, Result};
use std::path::Path;
use std::process::ExitCode;

pub async fn run(config_path: &Path) -> Result<ExitCode> {
    let config = super::load_config(config_path)?;
    let yaml = serde_yaml::to_string(&config).context("Failed to serialize configuration")?;
    print!("{yaml}");
    Ok(ExitCode::SUCCESS)
}
