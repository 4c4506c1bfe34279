use anyhow::{Context, Result};
use command_executor::LocalLauncher;
use provisioning_orchestration::{CancellationToken, Orchestrator};
use std::path::Path;
use std::process::ExitCode;
use tracing::info_span;

pub async fn run(config_path: &Path, request_path: &Path) -> Result<ExitCode> {
    let config = super::load_config(config_path)?;
    let request = super::load_request(request_path)?;

    let orchestrator = Orchestrator::builder(config, LocalLauncher)
        .span(info_span!("provisioner", config = %config_path.display()))
        .build()
        .context("Failed to start orchestrator")?;

    let cancel = CancellationToken::new();
    #[cfg(unix)]
    cancel_on_signal(cancel.clone())?;

    let result = orchestrator.execute_with_cancel(request, &cancel).await;
    println!(
        "{}",
        serde_json::to_string_pretty(&result).context("Failed to serialize result")?
    );

    Ok(if result.succeeded() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

/// Cancel the in-flight operation on SIGINT or SIGTERM
///
/// The operation still reports a result and releases its locks.
#[cfg(unix)]
fn cancel_on_signal(cancel: CancellationToken) -> Result<()> {
    use signal_hook::{
        consts::{SIGINT, SIGTERM},
        iterator::Signals,
    };

    let mut signals =
        Signals::new([SIGINT, SIGTERM]).context("Failed to register signal handler")?;

    std::thread::spawn(move || {
        if let Some(signal) = signals.forever().next() {
            tracing::warn!(signal, "received signal, cancelling operation");
            cancel.cancel();
        }
    });
    Ok(())
}
