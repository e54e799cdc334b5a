use std::{
    path::PathBuf,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    },
};

use anyhow::Result;
use async_trait::async_trait;
use config_store::{ConfigStore, ObjectConfigStore, StoreConfig, StoreError, StoreResult};
use data_model::{LabelSelector, StoredObject};
use tempfile::TempDir;
use tracing::subscriber;
use tracing_subscriber::{layer::SubscriberExt, Layer};

use crate::{
    combiner::{Combiner, CombinerConfig, MasterSource},
    splitter::{Splitter, SplitterConfig},
};

pub struct TestHarness {
    pub store: Arc<dyn ConfigStore>,
    pub namespace: String,
    pub share_dir: TempDir,
}

impl TestHarness {
    pub fn new() -> Result<Self> {
        let store = ObjectConfigStore::new(StoreConfig::in_memory())?;
        Self::with_store(Arc::new(store))
    }

    pub fn with_store(store: Arc<dyn ConfigStore>) -> Result<Self> {
        let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("debug"));
        let _ = subscriber::set_global_default(
            tracing_subscriber::registry()
                .with(tracing_subscriber::fmt::layer().with_filter(env_filter)),
        );

        Ok(Self {
            store,
            namespace: "test-ns".to_string(),
            share_dir: tempfile::tempdir()?,
        })
    }

    pub fn splitter(&self, block_bytes: usize) -> Splitter {
        Splitter::new(
            self.store.clone(),
            SplitterConfig {
                namespace: self.namespace.clone(),
                block_bytes,
                concurrency: 3,
            },
        )
    }

    pub fn combiner(&self, master: MasterSource) -> Combiner {
        Combiner::new(
            self.store.clone(),
            CombinerConfig {
                namespace: self.namespace.clone(),
                master,
                share_dir: self.share_dir.path().to_path_buf(),
            },
        )
    }

    pub fn shared_file(&self, file_name: &str) -> PathBuf {
        self.share_dir.path().join(file_name)
    }

    /// Every object in the harness namespace.
    pub async fn objects(&self) -> StoreResult<Vec<StoredObject>> {
        self.store
            .list(&self.namespace, &LabelSelector::default())
            .await
    }
}

type CreateFault = Box<dyn Fn(&StoredObject) -> bool + Send + Sync>;

/// Store whose `create` fails for the objects `fail_on` picks, and whose
/// `get` fails once `fail_gets` is set. Everything else passes through.
pub struct FaultyStore {
    inner: Arc<dyn ConfigStore>,
    fail_on: CreateFault,
    fail_gets: bool,
    pub creates: AtomicUsize,
    pub deletes: AtomicUsize,
}

impl FaultyStore {
    pub fn new(
        inner: Arc<dyn ConfigStore>,
        fail_on: impl Fn(&StoredObject) -> bool + Send + Sync + 'static,
    ) -> Self {
        Self {
            inner,
            fail_on: Box::new(fail_on),
            fail_gets: false,
            creates: AtomicUsize::new(0),
            deletes: AtomicUsize::new(0),
        }
    }

    pub fn with_failing_gets(mut self) -> Self {
        self.fail_gets = true;
        self
    }
}

fn injected(what: String) -> StoreError {
    StoreError::Backend(object_store::Error::Generic {
        store: "faulty",
        source: format!("injected failure for {what}").into(),
    })
}

#[async_trait]
impl ConfigStore for FaultyStore {
    async fn create(&self, object: StoredObject) -> StoreResult<StoredObject> {
        self.creates.fetch_add(1, Ordering::SeqCst);
        if (self.fail_on)(&object) {
            return Err(injected(format!("create {}", object.key())));
        }
        self.inner.create(object).await
    }

    async fn get(&self, namespace: &str, name: &str) -> StoreResult<StoredObject> {
        if self.fail_gets {
            return Err(injected(format!("get {namespace}/{name}")));
        }
        self.inner.get(namespace, name).await
    }

    async fn list(
        &self,
        namespace: &str,
        selector: &LabelSelector,
    ) -> StoreResult<Vec<StoredObject>> {
        self.inner.list(namespace, selector).await
    }

    async fn delete(&self, namespace: &str, name: &str) -> StoreResult<()> {
        self.deletes.fetch_add(1, Ordering::SeqCst);
        self.inner.delete(namespace, name).await
    }
}
