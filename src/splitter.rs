use std::{io, ops::Range, path::PathBuf, sync::Arc};

use config_store::{ConfigStore, StoreError};
use data_model::{
    labels::{is_valid_label_value, PARTIAL_ITEM_KEY},
    Descriptor,
    Fingerprint,
    FingerprintBuilder,
    ObjectKey,
    ObjectMeta,
    OwnerReference,
    StoredObject,
};
use tokio::task::{JoinError, JoinSet};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::source::PayloadSource;

pub const DEFAULT_BLOCK_BYTES: usize = 400 * 1024;
pub const DEFAULT_CONCURRENCY: usize = 8;

#[derive(Debug, thiserror::Error)]
pub enum SplitError {
    #[error("failed to open {path}: {source}")]
    OpenSource {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("{0} is a directory, only regular files can be stored")]
    SourceIsDirectory(PathBuf),

    #[error("failed to read bytes {range:?} of {file_name}: {source}")]
    ReadSource {
        file_name: String,
        range: Range<u64>,
        #[source]
        source: io::Error,
    },

    #[error("file name {0:?} can't be used as a label value")]
    InvalidFileName(String),

    #[error("block size must be greater than zero")]
    ZeroBlockSize,

    #[error("concurrency must be greater than zero")]
    ZeroConcurrency,

    #[error("megaconfigmap {0} already exists")]
    AlreadyExists(ObjectKey),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("partial worker failed: {0}")]
    Worker(#[from] JoinError),
}

#[derive(Debug, Clone)]
pub struct SplitterConfig {
    pub namespace: String,
    pub block_bytes: usize,
    pub concurrency: usize,
}

impl Default for SplitterConfig {
    fn default() -> Self {
        Self {
            namespace: "default".to_string(),
            block_bytes: DEFAULT_BLOCK_BYTES,
            concurrency: DEFAULT_CONCURRENCY,
        }
    }
}

#[derive(Debug, Clone)]
pub struct SplitReport {
    pub master: ObjectKey,
    pub fingerprint: Fingerprint,
    pub file_name: String,
    pub size: u64,
    pub partials: usize,
}

/// Number of `block_bytes` chunks a payload of `size` bytes is cut into.
pub fn partial_count(size: u64, block_bytes: usize) -> usize {
    size.div_ceil(block_bytes as u64) as usize
}

fn chunk_range(order: usize, size: u64, block_bytes: usize) -> Range<u64> {
    let start = order as u64 * block_bytes as u64;
    start..size.min(start + block_bytes as u64)
}

/// Writes payloads as one master object plus the partials holding its
/// chunks.
pub struct Splitter {
    store: Arc<dyn ConfigStore>,
    config: SplitterConfig,
}

impl Splitter {
    pub fn new(store: Arc<dyn ConfigStore>, config: SplitterConfig) -> Self {
        Self { store, config }
    }

    /// Stores `source` as the megaconfigmap `name`.
    ///
    /// If anything fails after the master was created, the master is deleted
    /// once every in-flight partial has settled, so no object of the group is
    /// left behind.
    #[tracing::instrument(skip_all, fields(namespace = %self.config.namespace, name = %name))]
    pub async fn split(
        &self,
        name: &str,
        source: Arc<dyn PayloadSource>,
    ) -> Result<SplitReport, SplitError> {
        if self.config.block_bytes == 0 {
            return Err(SplitError::ZeroBlockSize);
        }
        if self.config.concurrency == 0 {
            return Err(SplitError::ZeroConcurrency);
        }
        let file_name = source.file_name().to_string();
        if file_name.is_empty() || !is_valid_label_value(&file_name) {
            return Err(SplitError::InvalidFileName(file_name));
        }

        let size = source.size();
        let partials = partial_count(size, self.config.block_bytes);
        let fingerprint = self.fingerprint(name, source.as_ref()).await?;
        info!(%fingerprint, file_name = %file_name, size, partials, "splitting payload");

        self.create_master(name, &fingerprint, &file_name).await?;
        let master = match self
            .populate(name, &fingerprint, source, partials)
            .await
        {
            Ok(master) => master,
            Err(err) => {
                error!("failed to populate megaconfigmap, rolling back: {}", err);
                if let Err(cleanup_err) = self.cleanup(name).await {
                    error!("failed to delete megaconfigmap {}: {}", name, cleanup_err);
                }
                return Err(err);
            }
        };

        info!(%fingerprint, partials, "megaconfigmap created");
        Ok(SplitReport {
            master: master.key(),
            fingerprint,
            file_name,
            size,
            partials,
        })
    }

    /// Deletes the megaconfigmap `name` together with its partials. Deleting
    /// one that is already gone succeeds.
    pub async fn cleanup(&self, name: &str) -> Result<(), StoreError> {
        match self.store.delete(&self.config.namespace, name).await {
            Ok(()) => Ok(()),
            Err(err) if err.is_not_found() => {
                debug!(name, "megaconfigmap already deleted");
                Ok(())
            }
            Err(err) => Err(err),
        }
    }

    async fn fingerprint(
        &self,
        name: &str,
        source: &dyn PayloadSource,
    ) -> Result<Fingerprint, SplitError> {
        let size = source.size();
        let mut builder = FingerprintBuilder::new();
        for order in 0..partial_count(size, self.config.block_bytes) {
            let range = chunk_range(order, size, self.config.block_bytes);
            builder.update(&read_chunk(source, range).await?);
        }
        Ok(builder.finish(&self.config.namespace, name))
    }

    async fn create_master(
        &self,
        name: &str,
        fingerprint: &Fingerprint,
        file_name: &str,
    ) -> Result<StoredObject, SplitError> {
        let descriptor = Descriptor::master(fingerprint.clone(), file_name);
        let meta = ObjectMeta {
            namespace: self.config.namespace.clone(),
            name: name.to_string(),
            labels: descriptor.to_labels(),
            ..Default::default()
        };

        let created = match self.store.create(StoredObject::new(meta)).await {
            Ok(created) => created,
            Err(StoreError::AlreadyExists { object }) => {
                return Err(SplitError::AlreadyExists(object))
            }
            Err(err) => return Err(err.into()),
        };
        debug!(uid = created.uid(), "created master");
        Ok(created)
    }

    /// Everything after the master exists. Any error here is rolled back.
    async fn populate(
        &self,
        name: &str,
        fingerprint: &Fingerprint,
        source: Arc<dyn PayloadSource>,
        partials: usize,
    ) -> Result<StoredObject, SplitError> {
        // Partials reference the master by uid, so read back what the store
        // holds before creating any of them.
        let master = self.store.get(&self.config.namespace, name).await?;
        self.create_partials(&master, fingerprint, source, partials)
            .await?;
        Ok(master)
    }

    async fn create_partials(
        &self,
        master: &StoredObject,
        fingerprint: &Fingerprint,
        source: Arc<dyn PayloadSource>,
        partials: usize,
    ) -> Result<(), SplitError> {
        let owner = OwnerReference::to(master);
        let cancel = CancellationToken::new();
        let mut workers = JoinSet::new();
        let mut next = 0;
        let mut first_err: Option<SplitError> = None;

        loop {
            while first_err.is_none() && next < partials && workers.len() < self.config.concurrency
            {
                let order = next;
                next += 1;
                let worker = PartialWorker {
                    store: self.store.clone(),
                    source: source.clone(),
                    cancel: cancel.clone(),
                    namespace: self.config.namespace.clone(),
                    name: format!("{}-{}", master.name(), order),
                    owner: owner.clone(),
                    descriptor: Descriptor::partial(
                        fingerprint.clone(),
                        source.file_name(),
                        order,
                    ),
                    range: chunk_range(order, source.size(), self.config.block_bytes),
                };
                workers.spawn(worker.run());
            }

            let Some(joined) = workers.join_next().await else {
                break;
            };
            let err = match joined {
                Ok(Ok(())) => continue,
                Ok(Err(err)) => err,
                Err(join_err) => SplitError::Worker(join_err),
            };
            if first_err.is_none() {
                warn!("cancelling remaining partials: {}", err);
                cancel.cancel();
                first_err = Some(err);
            }
        }

        match first_err {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

/// Reads one chunk and stores it as a partial.
struct PartialWorker {
    store: Arc<dyn ConfigStore>,
    source: Arc<dyn PayloadSource>,
    cancel: CancellationToken,
    namespace: String,
    name: String,
    owner: OwnerReference,
    descriptor: Descriptor,
    range: Range<u64>,
}

impl PartialWorker {
    // A create that has started is never abandoned: the rollback must see
    // every partial that may have reached the store.
    async fn run(self) -> Result<(), SplitError> {
        if self.cancel.is_cancelled() {
            return Ok(());
        }
        let chunk = read_chunk(self.source.as_ref(), self.range.clone()).await?;
        if self.cancel.is_cancelled() {
            return Ok(());
        }

        let meta = ObjectMeta {
            namespace: self.namespace,
            name: self.name.clone(),
            labels: self.descriptor.to_labels(),
            owner_references: vec![self.owner],
            ..Default::default()
        };
        let mut partial = StoredObject::new(meta);
        partial
            .binary_data
            .insert(PARTIAL_ITEM_KEY.to_string(), chunk.to_vec());

        self.store.create(partial).await?;
        debug!(name = %self.name, bytes = chunk.len(), "created partial");
        Ok(())
    }
}

async fn read_chunk(
    source: &dyn PayloadSource,
    range: Range<u64>,
) -> Result<bytes::Bytes, SplitError> {
    source
        .read_range(range.clone())
        .await
        .map_err(|e| SplitError::ReadSource {
            file_name: source.file_name().to_string(),
            range,
            source: e,
        })
}
