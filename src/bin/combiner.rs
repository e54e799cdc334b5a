use std::{path::PathBuf, sync::Arc};

use ::tracing::{info, info_span, Instrument};
use anyhow::Result;
use clap::Parser;
use config_store::{ObjectConfigStore, StoreConfig};
use megaconfigmap::{
    combiner::{Combiner, MasterSource},
    config::AppConfig,
    tracing::{setup_tracing, shutdown_tracing},
};

#[derive(Debug, Parser)]
#[command(name = "megaconfigmap-combiner", version)]
#[command(about = "Reassemble a megaconfigmap into the sharing directory", long_about = None)]
struct Cli {
    /// Path of the mounted megaconfigmap
    #[arg(long = "megaconfigmap", value_name = "FILE", conflicts_with = "name")]
    megaconfigmap: Option<PathBuf>,

    /// Name of the megaconfigmap to fetch from the store instead
    #[arg(long, required_unless_present = "megaconfigmap")]
    name: Option<String>,

    /// Path of the sharing directory among the pod
    #[arg(long = "share-dir", value_name = "DIR")]
    share_dir: Option<PathBuf>,

    /// Path to the config file
    #[arg(short = 'c', long = "config", value_name = "FILE")]
    config: Option<PathBuf>,

    /// Namespace of the megaconfigmap
    #[arg(short = 'n', long)]
    namespace: Option<String>,

    /// Config store location
    #[arg(long)]
    store: Option<String>,
}

impl Cli {
    fn load_config(&self) -> Result<AppConfig> {
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
        if let Some(share_dir) = &self.share_dir {
            config.share_dir = share_dir.clone();
        }
        config.validate()?;
        Ok(config)
    }

    fn master(self) -> Result<MasterSource> {
        match (self.megaconfigmap, self.name) {
            (Some(path), _) => Ok(MasterSource::File(path)),
            (None, Some(name)) => Ok(MasterSource::Name(name)),
            (None, None) => Err(anyhow::anyhow!("either --megaconfigmap or --name is required")),
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = cli.load_config()?;
    let tracing_provider = setup_tracing(&config)?;

    let root_span = info_span!("megaconfigmap-combiner", namespace = %config.namespace);
    let result = async {
        let store = Arc::new(ObjectConfigStore::new(config.store.clone())?);
        let combiner = Combiner::new(store, config.combiner_config(cli.master()?));
        Ok::<_, anyhow::Error>(combiner.run().await?)
    }
    .instrument(root_span)
    .await;

    shutdown_tracing(tracing_provider);
    let report = result?;
    info!(
        "published {} ({} bytes from {} partials)",
        report.path.display(),
        report.size,
        report.partials
    );
    Ok(())
}
