//! kiln deploys proxies and upgradeable contracts from declarative modules, and resumes
//! interrupted deployments from their journal.

mod cli;
mod config;
mod output;

use std::{io::Write, path::Path};

use anyhow::{Context, Result};
use clap::Parser;
use kiln_deploy::{
    ExecutionOptions, Executor, FsArtifactSource, JournalStore, Parameters, load_module, resolve,
};
use tokio::sync::watch;

use cli::{Cli, Command, OutputFormat};
use config::{KilnConfig, load_parameters};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize the logger.
    tracing_subscriber::fmt()
        .with_max_level(cli.verbosity)
        .init();

    let config = KilnConfig::load(&cli.config, &cli.overrides())?;

    match cli.command {
        Command::Plan { manifest } => plan(&manifest, cli.format),
        Command::Deploy {
            manifest,
            parameters,
            retry_pending,
        } => {
            let parameters = match parameters {
                Some(path) => load_parameters(&path)?,
                None => Parameters::new(),
            };
            deploy(&config, &manifest, &parameters, retry_pending, cli.format).await
        }
        Command::Status => status(&config, cli.format).await,
        Command::Reset { yes } => reset(&config, yes).await,
    }
}

fn plan(manifest: &Path, format: OutputFormat) -> Result<()> {
    let module = load_module(manifest)?;
    let plan = resolve(&module)?;

    tracing::info!(module = %module.name(), actions = plan.len(), "Module resolved");
    output::print_plan(&plan, format)
}

async fn deploy(
    config: &KilnConfig,
    manifest: &Path,
    parameters: &Parameters,
    retry_pending: bool,
    format: OutputFormat,
) -> Result<()> {
    let module = load_module(manifest)?;
    let client = config.client()?;
    let deployment = config.deployment(&client).await?;
    let artifacts = FsArtifactSource::new(&config.artifacts_dir);
    let mut journal = deployment.open_journal()?;

    tracing::info!(
        module = %module.name(),
        deployment = %deployment.id(),
        rpc_url = %client.url(),
        journal = %deployment.journal_path().display(),
        "Starting deployment..."
    );

    let (cancel_tx, cancel_rx) = watch::channel(false);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Interrupt received, stopping the deployment...");
            let _ = cancel_tx.send(true);
        }
    });

    let result = Executor::new(&client, &artifacts, &mut journal)
        .with_options(ExecutionOptions { retry_pending })
        .with_cancellation(cancel_rx)
        .run(&module, parameters)
        .await?;

    let addresses_path = deployment.save_addresses(&result)?;

    tracing::info!(
        module = %result.module,
        executed = result.executed.len(),
        skipped = result.skipped.len(),
        addresses = %addresses_path.display(),
        "Deployment complete"
    );
    output::print_result(&result, format)
}

async fn status(config: &KilnConfig, format: OutputFormat) -> Result<()> {
    let client = config.client()?;
    let deployment = config.deployment(&client).await?;
    if !deployment.exists() {
        anyhow::bail!(
            "Deployment `{}` not found in {}",
            deployment.id(),
            config.deployments_dir.display()
        );
    }

    let journal = deployment.open_journal()?;
    output::print_journal(&journal.entries(), format)
}

async fn reset(config: &KilnConfig, yes: bool) -> Result<()> {
    let client = config.client()?;
    let deployment = config.deployment(&client).await?;
    if !deployment.exists() {
        tracing::info!(deployment = %deployment.id(), "Nothing to reset");
        return Ok(());
    }

    if !yes && !confirm(&format!(
        "Delete deployment `{}` and its journal at {}?",
        deployment.id(),
        deployment.path().display()
    ))? {
        tracing::info!("Reset aborted");
        return Ok(());
    }

    // Fails while another process holds the journal.
    drop(deployment.open_journal()?);
    deployment.reset()?;
    Ok(())
}

fn confirm(question: &str) -> Result<bool> {
    print!("{question} [y/N] ");
    std::io::stdout().flush().context("Failed to flush stdout")?;

    let mut answer = String::new();
    std::io::stdin()
        .read_line(&mut answer)
        .context("Failed to read confirmation")?;
    Ok(matches!(answer.trim(), "y" | "Y" | "yes"))
}
