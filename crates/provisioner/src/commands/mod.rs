pub mod run;
pub mod show_config;
pub mod validate;

use anyhow::{Context, Result};
use provisioning_orchestration::{OperationRequest, OrchestratorConfig};
use std::io::Read;
use std::path::Path;
use tracing::{debug, info};

/// Load the orchestrator configuration, falling back to defaults when the
/// file does not exist
pub fn load_config(path: &Path) -> Result<OrchestratorConfig> {
    if !path.exists() {
        info!(path = %path.display(), "no configuration file, using defaults");
        return Ok(OrchestratorConfig::default());
    }

    let config = OrchestratorConfig::load(path)
        .with_context(|| format!("Failed to load configuration from {}", path.display()))?;
    debug!(path = %path.display(), "configuration loaded");
    Ok(config)
}

/// Read a request from a file, or stdin when `path` is `-`
pub fn load_request(path: &Path) -> Result<OperationRequest> {
    let (text, is_json) = if path == Path::new("-") {
        let mut text = String::new();
        std::io::stdin()
            .read_to_string(&mut text)
            .context("Failed to read request from stdin")?;
        let is_json = text.trim_start().starts_with('{');
        (text, is_json)
    } else {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read request {}", path.display()))?;
        let is_json = path.extension().is_some_and(|ext| ext == "json");
        (text, is_json)
    };

    parse_request(&text, is_json)
}

fn parse_request(text: &str, is_json: bool) -> Result<OperationRequest> {
    let request = if is_json {
        OperationRequest::from_json_str(text)
    } else {
        OperationRequest::from_yaml_str(text)
    };
    request.context("Failed to parse operation request")
}
