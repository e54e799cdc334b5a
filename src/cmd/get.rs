use anyhow::{anyhow, Result};
use clap::Args as ClapArgs;
use config_store::ConfigStore;
use data_model::Descriptor;

use super::open_store;
use crate::{
    combiner::{chunk_len, partial_selector},
    config::AppConfig,
};

#[derive(Debug, ClapArgs)]
pub struct Args {
    /// Name of the megaconfigmap
    name: String,
}

impl Args {
    pub async fn run(self, config: AppConfig) -> Result<()> {
        let store = open_store(&config)?;
        let master = store.get(&config.namespace, &self.name).await?;
        let descriptor = Descriptor::from_object(&master)?;
        if !descriptor.is_master() {
            return Err(anyhow!("{} is not a megaconfigmap", master.key()));
        }

        let partials = store
            .list(&config.namespace, &partial_selector(&descriptor.fingerprint))
            .await?;
        let size: usize = partials.iter().filter_map(chunk_len).sum();

        println!(
            "{:<32} {:<24} {:>8} {:>12}  FINGERPRINT",
            "NAME", "FILENAME", "PARTIALS", "BYTES"
        );
        println!(
            "{:<32} {:<24} {:>8} {:>12}  {}",
            master.name(),
            descriptor.file_name,
            partials.len(),
            size,
            descriptor.fingerprint
        );
        Ok(())
    }
}
