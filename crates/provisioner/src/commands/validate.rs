use anyhow::{Context, Result};
use std::path::Path;
use std::process::ExitCode;

pub async fn run(config_path: &Path, request_path: &Path) -> Result<ExitCode> {
    let config = super::load_config(config_path)?;
    let request = super::load_request(request_path)?;

    println!("Validating {}...", request_path.display());

    request
        .validate(&config)
        .context("Request failed validation")?;

    println!("✓ Request valid");
    println!("  Operation: {}", request.kind());
    println!(
        "  Time limit: {}s",
        config.timeout_for(request.kind()).as_secs()
    );

    let locks: Vec<_> = request
        .device_ids(&config)
        .into_iter()
        .map(|id| id.to_string())
        .collect();
    println!("  Locks: {}", locks.join(", "));

    match request.command(&config) {
        Some(command) => println!("  Command: {command}"),
        None => println!("  Writes: {}", config.boot_config_dir.display()),
    }

    Ok(ExitCode::SUCCESS)
}
