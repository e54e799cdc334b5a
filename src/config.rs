use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use config_store::{is_valid_object_name, StoreConfig};
use figment::{
    providers::{Env, Format, Serialized, Yaml},
    Figment,
};
use serde::{Deserialize, Serialize};

use crate::{
    combiner::{CombinerConfig, MasterSource},
    splitter::{SplitterConfig, DEFAULT_BLOCK_BYTES, DEFAULT_CONCURRENCY},
};

/// Prefix of environment variables overriding config file values, e.g.
/// `MEGACONFIGMAP_BLOCK_BYTES` or `MEGACONFIGMAP_STORE__PATH`.
pub const ENV_PREFIX: &str = "MEGACONFIGMAP_";

/// Room left in every partial for metadata next to the encoded chunk.
pub const OBJECT_METADATA_ALLOWANCE: usize = 16 * 1024;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TelemetryConfig {
    // Enable tracing.
    #[serde(default)]
    pub enable_tracing: bool,
    // OpenTelemetry collector grpc endpoint. Defaults to using OTEL_EXPORTER_OTLP_ENDPOINT env
    // var or to localhost:4317 if empty.
    #[serde(default)]
    pub endpoint: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub namespace: String,
    pub store: StoreConfig,
    /// Payload bytes per partial.
    pub block_bytes: usize,
    /// Partials created at the same time.
    pub concurrency: usize,
    /// Directory the combiner publishes into.
    pub share_dir: PathBuf,
    pub structured_logging: bool,
    #[serde(default)]
    pub telemetry: TelemetryConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        AppConfig {
            namespace: "default".to_string(),
            store: StoreConfig::default(),
            block_bytes: DEFAULT_BLOCK_BYTES,
            concurrency: DEFAULT_CONCURRENCY,
            share_dir: PathBuf::from("/var/run/megaconfigmap"),
            structured_logging: false,
            telemetry: TelemetryConfig::default(),
        }
    }
}

impl AppConfig {
    /// Defaults, overlaid with the YAML file at `path` if given, overlaid
    /// with `MEGACONFIGMAP_*` environment variables.
    ///
    /// The result is not validated, callers apply their command line
    /// overrides first.
    pub fn load(path: Option<&Path>) -> Result<AppConfig> {
        let mut figment = Figment::from(Serialized::defaults(AppConfig::default()));
        if let Some(path) = path {
            let config_str = std::fs::read_to_string(path)
                .with_context(|| format!("failed to read config file {}", path.display()))?;
            figment = figment.merge(Yaml::string(&config_str));
        }
        let config: AppConfig = figment
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
            .extract()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if !is_valid_object_name(&self.namespace) {
            return Err(anyhow!("invalid namespace: {}", self.namespace));
        }
        if self.block_bytes == 0 {
            return Err(anyhow!("block_bytes must be greater than zero"));
        }
        if self.concurrency == 0 {
            return Err(anyhow!("concurrency must be greater than zero"));
        }
        let partial_bytes = encoded_len(self.block_bytes) + OBJECT_METADATA_ALLOWANCE;
        if partial_bytes > self.store.max_object_bytes {
            return Err(anyhow!(
                "block_bytes {} encodes to partials of up to {} bytes, over the {} byte object limit",
                self.block_bytes,
                partial_bytes,
                self.store.max_object_bytes
            ));
        }
        Ok(())
    }

    pub fn splitter_config(&self) -> SplitterConfig {
        SplitterConfig {
            namespace: self.namespace.clone(),
            block_bytes: self.block_bytes,
            concurrency: self.concurrency,
        }
    }

    pub fn combiner_config(&self, master: MasterSource) -> CombinerConfig {
        CombinerConfig {
            namespace: self.namespace.clone(),
            master,
            share_dir: self.share_dir.clone(),
        }
    }
}

/// Size of `len` bytes once base64 encoded.
pub fn encoded_len(len: usize) -> usize {
    len.div_ceil(3) * 4
}
