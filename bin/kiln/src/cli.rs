use std::path::PathBuf;

use alloy_core::primitives::Address;
use clap::{Parser, Subcommand};
use tracing::level_filters::LevelFilter;
use url::Url;

use crate::config::ConfigOverrides;

/// How command results are printed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, strum::Display, strum::EnumString)]
#[strum(serialize_all = "kebab-case")]
pub enum OutputFormat {
    #[default]
    Table,
    Json,
}

#[derive(Parser)]
#[command(name = "kiln")]
#[command(
    author,
    version,
    about = "Declarative, resumable deployments of proxies and upgradeable contracts"
)]
pub struct Cli {
    /// The verbosity level.
    #[arg(short, long, global = true, env = "KILN_VERBOSITY", default_value_t = LevelFilter::INFO)]
    pub verbosity: LevelFilter,

    /// Path to the kiln configuration file.
    ///
    /// A missing file is not an error: defaults and `KILN_*` environment variables apply.
    #[arg(short, long, global = true, default_value = "Kiln.toml")]
    pub config: PathBuf,

    /// The URL of a JSON-RPC endpoint exposing unlocked accounts.
    #[arg(long, global = true, alias = "rpc")]
    pub rpc_url: Option<Url>,

    /// Directory holding the compiled contract artifacts.
    #[arg(long, global = true)]
    pub artifacts_dir: Option<PathBuf>,

    /// Directory holding one sub-directory per deployment.
    #[arg(long, global = true)]
    pub deployments_dir: Option<PathBuf>,

    /// The deployment to operate on.
    ///
    /// If not provided, the deployment is named after the chain: chain-<chain-id>.
    #[arg(long, global = true, alias = "id")]
    pub deployment_id: Option<String>,

    /// Send transactions from this account instead of the node's first account.
    #[arg(long, global = true)]
    pub sender: Option<Address>,

    /// How results are printed.
    #[arg(long, global = true, default_value_t = OutputFormat::Table)]
    pub format: OutputFormat,

    #[command(subcommand)]
    pub command: Command,
}

impl Cli {
    /// Command-line values that take precedence over the configuration file.
    pub fn overrides(&self) -> ConfigOverrides {
        ConfigOverrides {
            rpc_url: self.rpc_url.clone(),
            artifacts_dir: self.artifacts_dir.clone(),
            deployments_dir: self.deployments_dir.clone(),
            deployment_id: self.deployment_id.clone(),
            sender: self.sender,
        }
    }
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Print the execution order of a module without touching the chain.
    Plan {
        /// Path to the module manifest.
        manifest: PathBuf,
    },

    /// Deploy a module, resuming from the deployment journal.
    Deploy {
        /// Path to the module manifest.
        manifest: PathBuf,

        /// Parameter values, as a TOML or JSON table of modules.
        #[arg(short, long)]
        parameters: Option<PathBuf>,

        /// Re-send actions left pending by an interrupted run.
        ///
        /// Only use this once you checked that the interrupted transaction was not mined.
        #[arg(long, default_value_t = false)]
        retry_pending: bool,
    },

    /// Print the journal of a deployment.
    Status,

    /// Delete a deployment with its journal.
    Reset {
        /// Do not ask for confirmation.
        #[arg(short, long, default_value_t = false)]
        yes: bool,
    },
}
