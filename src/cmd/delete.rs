use anyhow::{anyhow, Result};
use clap::Args as ClapArgs;
use config_store::ConfigStore;
use data_model::Descriptor;

use super::open_store;
use crate::{config::AppConfig, splitter::Splitter};

#[derive(Debug, ClapArgs)]
pub struct Args {
    /// Name of the megaconfigmap
    name: String,
}

impl Args {
    pub async fn run(self, config: AppConfig) -> Result<()> {
        let store = open_store(&config)?;

        // Refuse to cascade from objects that are not megaconfigmaps.
        let object = store.get(&config.namespace, &self.name).await?;
        if !Descriptor::from_object(&object)?.is_master() {
            return Err(anyhow!("{} is not a megaconfigmap", object.key()));
        }

        Splitter::new(store, config.splitter_config())
            .cleanup(&self.name)
            .await?;
        println!("megaconfigmap/{} deleted", self.name);
        Ok(())
    }
}
