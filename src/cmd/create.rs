use std::{path::PathBuf, sync::Arc};

use anyhow::Result;
use clap::Args as ClapArgs;
use tracing::info;

use super::open_store;
use crate::{config::AppConfig, source::FileSource, splitter::Splitter};

#[derive(Debug, ClapArgs)]
pub struct Args {
    /// Name of the megaconfigmap
    name: String,

    /// File to be stored in the megaconfigmap
    #[arg(long = "from-file", value_name = "FILE")]
    from_file: PathBuf,

    /// Payload bytes per partial
    #[arg(long)]
    block_bytes: Option<usize>,

    /// Partials created at the same time
    #[arg(long)]
    concurrency: Option<usize>,
}

impl Args {
    pub fn apply(&self, config: &mut AppConfig) {
        if let Some(block_bytes) = self.block_bytes {
            config.block_bytes = block_bytes;
        }
        if let Some(concurrency) = self.concurrency {
            config.concurrency = concurrency;
        }
    }

    pub async fn run(self, config: AppConfig) -> Result<()> {
        let Self {
            name, from_file, ..
        } = self;

        let source = FileSource::open(&from_file).await?;
        info!(
            "creating megaconfigmap {}/{} from {}",
            config.namespace,
            name,
            from_file.display()
        );
        let splitter = Splitter::new(open_store(&config)?, config.splitter_config());
        let report = splitter.split(&name, Arc::new(source)).await?;

        println!(
            "megaconfigmap/{} created ({} bytes in {} partials)",
            report.master.name, report.size, report.partials
        );
        Ok(())
    }
}
