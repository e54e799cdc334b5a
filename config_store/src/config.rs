//! Config store configuration.

use std::env;

use serde::{Deserialize, Serialize};

/// Per-object ceiling of the control plane, in serialized bytes.
pub const DEFAULT_MAX_OBJECT_BYTES: usize = 1024 * 1024;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Storage location (e.g., `memory:///`, `file:///path`, `s3://bucket/prefix`).
    #[serde(default = "default_store_path")]
    pub path: String,

    #[serde(default = "default_max_object_bytes")]
    pub max_object_bytes: usize,
}

impl StoreConfig {
    pub fn new(path: &str) -> Self {
        Self {
            path: path.to_string(),
            max_object_bytes: DEFAULT_MAX_OBJECT_BYTES,
        }
    }

    pub fn in_memory() -> Self {
        Self::new("memory:///")
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            path: default_store_path(),
            max_object_bytes: DEFAULT_MAX_OBJECT_BYTES,
        }
    }
}

fn default_max_object_bytes() -> usize {
    DEFAULT_MAX_OBJECT_BYTES
}

/// Default store path (local filesystem).
pub fn default_store_path() -> String {
    format!(
        "file://{}",
        env::current_dir()
            .unwrap_or_else(|_| std::path::PathBuf::from("."))
            .join("megaconfigmap_storage/objects")
            .to_str()
            .unwrap_or("./megaconfigmap_storage/objects")
    )
}
