use std::{path::PathBuf, sync::Arc};

use anyhow::Result;
use clap::{Args, Parser, Subcommand};
use config_store::{ObjectConfigStore, StoreConfig};

use crate::{
    config::AppConfig,
    tracing::{setup_tracing, shutdown_tracing},
};

mod create;
mod delete;
mod get;

/// Global arguments for the CLI. These are arguments that are shared across all
/// subcommands.
#[derive(Debug, Args)]
pub struct GlobalArgs {
    /// Path to the config file
    #[arg(global = true, short = 'c', long = "config", value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Namespace of the megaconfigmap
    #[arg(global = true, short = 'n', long)]
    pub namespace: Option<String>,

    /// Config store location, e.g. `file:///var/lib/megaconfigmap` or
    /// `s3://bucket/prefix`
    #[arg(global = true, long)]
    pub store: Option<String>,
}

impl GlobalArgs {
    /// Loads the config and applies the flags on top of it.
    pub fn load_config(&self) -> Result<AppConfig> {
        let mut config = AppConfig::load(self.config.as_deref())?;
        if let Some(namespace) = &self.namespace {
            config.namespace = namespace.clone();
        }
        if let Some(store) = &self.store {
            config.store = StoreConfig {
                path: store.clone(),
                ..config.store
            };
        }
        Ok(config)
    }
}

/// The list of commands that can be run on megaconfigmaps.
#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Create a megaconfigmap from a file
    Create(create::Args),
    /// Show a megaconfigmap and its partials
    Get(get::Args),
    /// Delete a megaconfigmap together with its partials
    Delete(delete::Args),
}

/// The main CLI struct. This is the root of the CLI tree.
#[derive(Debug, Parser)]
#[command(name = "kubectl-megaconfigmap", version)]
#[command(about = "Control megaconfigmaps", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
    #[command(flatten)]
    pub global_args: GlobalArgs,
}

impl Cli {
    /// Run the CLI
    pub async fn run(self) -> Result<()> {
        let mut config = self.global_args.load_config()?;
        if let Commands::Create(args) = &self.command {
            args.apply(&mut config);
        }
        config.validate()?;

        let tracing_provider = setup_tracing(&config)?;
        let result = match self.command {
            Commands::Create(args) => args.run(config).await,
            Commands::Get(args) => args.run(config).await,
            Commands::Delete(args) => args.run(config).await,
        };
        shutdown_tracing(tracing_provider);
        result
    }
}

pub(crate) fn open_store(config: &AppConfig) -> Result<Arc<ObjectConfigStore>> {
    Ok(Arc::new(ObjectConfigStore::new(config.store.clone())?))
}
