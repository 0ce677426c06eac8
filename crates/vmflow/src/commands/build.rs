use crate::ssh::SshExecutor;
use colored::Colorize;
use std::path::Path;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use vmflow_builder::{BuildContext, BuildError, LifecycleRunner};

pub async fn handle(config: Option<&Path>, artifact: Option<&Path>) -> anyhow::Result<()> {
    let config = super::load_config(config)?;
    for warning in &config.warnings {
        eprintln!("{} {}", "⚠".yellow(), warning.yellow());
    }

    let gateway = super::gateway(&config)?;
    let cancel = CancellationToken::new();

    let mut ctx = BuildContext::new(Arc::new(gateway), config.vm.clone())
        .with_settings(config.settings.clone())
        .with_provision_commands(config.provision.clone())
        .with_shutdown_command(config.shutdown_command.clone())
        .with_cancel(cancel.clone());
    if config.uses_ssh() {
        ctx = ctx.with_executor(Arc::new(SshExecutor::from_config(&config.communicator)));
    }

    // Ctrl-C stops the current wait; rollback still runs
    let interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            eprintln!();
            eprintln!("{}", "Interrupted, cancelling build...".yellow());
            interrupt.cancel();
        }
    });

    let runner = LifecycleRunner::standard(&ctx);
    eprintln!(
        "{} {} ({})",
        "Building".blue().bold(),
        config.vm.name.cyan(),
        runner.step_names().join(" → ")
    );

    let outcome = match runner.run(&ctx).await {
        Ok(outcome) => outcome,
        Err(failure) => {
            eprintln!();
            eprintln!("{}", "✗ Build failed".red().bold());
            eprintln!("  step: {}", failure.step);
            eprintln!("  error: {}", failure.error);
            if let Some(hint) = retry_hint(&failure.error) {
                eprintln!("  {}", hint.dimmed());
            }
            for warning in &failure.warnings {
                eprintln!("  {} {}", "⚠".yellow(), warning.yellow());
            }
            std::process::exit(1);
        }
    };

    for warning in &outcome.warnings {
        eprintln!("{} {}", "⚠".yellow(), warning.yellow());
    }
    if let Some(report) = &outcome.shutdown {
        let how = if report.was_forced() { "forced" } else { "graceful" };
        eprintln!("shutdown: {} ({:?})", how, report.state());
    }

    let json = outcome.artifact.to_json_pretty()?;
    match artifact {
        Some(path) => {
            std::fs::write(path, format!("{}\n", json))?;
            eprintln!(
                "{} artifact written to {}",
                "✓".green().bold(),
                path.display().to_string().cyan()
            );
        }
        None => println!("{}", json),
    }

    eprintln!(
        "{} {} (vm {})",
        "✓ Build complete:".green().bold(),
        outcome.artifact.name.cyan(),
        outcome.artifact.vm_key
    );
    Ok(())
}

/// Next step suggested for a failed build
fn retry_hint(error: &BuildError) -> Option<&'static str> {
    if error.is_timeout() {
        Some("hint: a wait ran out; a longer timeout or a rerun may succeed")
    } else if error.is_retryable() {
        Some("hint: the failure looks transient; rerunning the build may succeed")
    } else {
        None
    }
}
