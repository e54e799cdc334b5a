use std::{
    io,
    path::{Path, PathBuf},
    sync::Arc,
};

use config_store::{ConfigStore, StoreError};
use data_model::{
    labels::{ID_LABEL, MASTER_LABEL, PARTIAL_ITEM_KEY},
    Descriptor,
    DescriptorError,
    Expression,
    Fingerprint,
    LabelSelector,
    ObjectKey,
    StoredObject,
};
use strum::Display;
use tracing::{debug, error, info};

use crate::publish::{is_plain_file_name, publish_atomically};

/// Progress of a single combine run. Each value names the last step that
/// completed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum CombineStage {
    Start,
    DescriptorRead,
    PartialsListed,
    Reconstructed,
    Verified,
    Published,
}

#[derive(Debug, thiserror::Error)]
pub enum CombineError {
    #[error("failed to read megaconfigmap descriptor {path}: {source}")]
    ReadDescriptor {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to decode megaconfigmap descriptor {path}: {source}")]
    DecodeDescriptor {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error(transparent)]
    Descriptor(#[from] DescriptorError),

    #[error("{0} is not a megaconfigmap master")]
    NotAMaster(ObjectKey),

    #[error("{0} is a master, not a partial")]
    UnexpectedMaster(ObjectKey),

    #[error("file name {0:?} is not a plain file name")]
    UnsafeFileName(String),

    #[error("{object} has no partial-item data")]
    MissingData { object: ObjectKey },

    #[error("{object} belongs to {found:?}, expected {expected:?}")]
    FileNameMismatch {
        object: ObjectKey,
        found: String,
        expected: String,
    },

    #[error("order {order} of {object} is out of range for {count} partials")]
    OrderOutOfRange {
        object: ObjectKey,
        order: usize,
        count: usize,
    },

    #[error("order {order} is claimed by both {first} and {second}")]
    DuplicateOrder {
        order: usize,
        first: ObjectKey,
        second: ObjectKey,
    },

    #[error("no partial holds order {order}")]
    MissingPartial { order: usize },

    #[error("{object} holds {size} bytes, expected {expected} like every non-final chunk")]
    UnevenChunk {
        object: ObjectKey,
        size: usize,
        expected: usize,
    },

    #[error("checksum is not matched: expected {expected}, reassembled {actual}")]
    FingerprintMismatch {
        expected: Fingerprint,
        actual: Fingerprint,
    },

    #[error("failed to publish {path}: {source}")]
    Publish {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Where the combiner finds the master object.
#[derive(Debug, Clone)]
pub enum MasterSource {
    /// A JSON document of the master, as mounted into the pod.
    File(PathBuf),
    /// The master's name in the configured namespace of the store.
    Name(String),
}

#[derive(Debug, Clone)]
pub struct CombinerConfig {
    pub namespace: String,
    pub master: MasterSource,
    pub share_dir: PathBuf,
}

#[derive(Debug, Clone)]
pub struct CombineReport {
    pub fingerprint: Fingerprint,
    pub path: PathBuf,
    pub size: usize,
    pub partials: usize,
}

/// Selector for the partials of the megaconfigmap identified by
/// `fingerprint`: `megaconfigmap.io/id=<fingerprint>,!megaconfigmap.io/master`.
pub fn partial_selector(fingerprint: &Fingerprint) -> LabelSelector {
    LabelSelector::new()
        .with(Expression::eq(ID_LABEL, fingerprint.as_str()))
        .with(Expression::not_exists(MASTER_LABEL))
}

/// Bytes of chunk data `partial` carries, binary or text.
pub fn chunk_len(partial: &StoredObject) -> Option<usize> {
    partial
        .binary_data
        .get(PARTIAL_ITEM_KEY)
        .map(Vec::len)
        .or_else(|| partial.data.get(PARTIAL_ITEM_KEY).map(String::len))
}

/// Concatenates the chunks of `partials` in order.
///
/// The set must hold exactly one partial for every index in `0..len`, each
/// carrying chunk data, and every chunk but the last must be the same size.
pub fn reconstruct(
    master: &Descriptor,
    partials: Vec<StoredObject>,
) -> Result<Vec<u8>, CombineError> {
    let count = partials.len();
    let mut slots: Vec<Option<(ObjectKey, Vec<u8>)>> = vec![None; count];

    for mut partial in partials {
        let object = partial.key();
        let descriptor = Descriptor::from_object(&partial)?;
        let Some(order) = descriptor.order() else {
            return Err(CombineError::UnexpectedMaster(object));
        };
        if descriptor.file_name != master.file_name {
            return Err(CombineError::FileNameMismatch {
                object,
                found: descriptor.file_name,
                expected: master.file_name.clone(),
            });
        }
        if order >= count {
            return Err(CombineError::OrderOutOfRange {
                object,
                order,
                count,
            });
        }
        // Text data is accepted for groups written by older clients.
        let chunk = partial
            .binary_data
            .remove(PARTIAL_ITEM_KEY)
            .or_else(|| partial.data.remove(PARTIAL_ITEM_KEY).map(String::into_bytes))
            .ok_or_else(|| CombineError::MissingData {
                object: object.clone(),
            })?;
        if let Some((first, _)) = &slots[order] {
            return Err(CombineError::DuplicateOrder {
                order,
                first: first.clone(),
                second: object,
            });
        }
        slots[order] = Some((object, chunk));
    }

    let chunks = slots
        .into_iter()
        .enumerate()
        .map(|(order, slot)| slot.ok_or(CombineError::MissingPartial { order }))
        .collect::<Result<Vec<_>, _>>()?;

    if let Some((_, first)) = chunks.first() {
        let expected = first.len();
        for (object, chunk) in &chunks[..chunks.len() - 1] {
            if chunk.len() != expected {
                return Err(CombineError::UnevenChunk {
                    object: object.clone(),
                    size: chunk.len(),
                    expected,
                });
            }
        }
    }

    let total = chunks.iter().map(|(_, chunk)| chunk.len()).sum();
    let mut payload = Vec::with_capacity(total);
    for (_, chunk) in chunks {
        payload.extend_from_slice(&chunk);
    }
    Ok(payload)
}

/// Checks `payload` against the fingerprint the splitter recorded for the
/// megaconfigmap `namespace/name`.
pub fn verify(
    expected: &Fingerprint,
    payload: &[u8],
    namespace: &str,
    name: &str,
) -> Result<(), CombineError> {
    let actual = Fingerprint::compute(payload, namespace, name);
    if &actual != expected {
        return Err(CombineError::FingerprintMismatch {
            expected: expected.clone(),
            actual,
        });
    }
    Ok(())
}

/// Reassembles one megaconfigmap into the share directory.
pub struct Combiner {
    store: Arc<dyn ConfigStore>,
    config: CombinerConfig,
}

impl Combiner {
    pub fn new(store: Arc<dyn ConfigStore>, config: CombinerConfig) -> Self {
        Self { store, config }
    }

    pub async fn run(&self) -> Result<CombineReport, CombineError> {
        let mut stage = CombineStage::Start;
        let result = self.combine(&mut stage).await;
        match &result {
            Ok(report) => info!(
                fingerprint = %report.fingerprint,
                path = %report.path.display(),
                size = report.size,
                partials = report.partials,
                "megaconfigmap combined"
            ),
            Err(err) => error!(stage = %stage, "failed to combine megaconfigmap: {}", err),
        }
        result
    }

    async fn combine(&self, stage: &mut CombineStage) -> Result<CombineReport, CombineError> {
        let master = self.read_master().await?;
        let descriptor = Descriptor::from_object(&master)?;
        if !descriptor.is_master() {
            return Err(CombineError::NotAMaster(master.key()));
        }
        if !is_plain_file_name(&descriptor.file_name) {
            return Err(CombineError::UnsafeFileName(descriptor.file_name));
        }
        advance(stage, CombineStage::DescriptorRead);

        let partials = self
            .store
            .list(master.namespace(), &partial_selector(&descriptor.fingerprint))
            .await?;
        let count = partials.len();
        debug!(partials = count, "listed partials");
        advance(stage, CombineStage::PartialsListed);

        let payload = reconstruct(&descriptor, partials)?;
        advance(stage, CombineStage::Reconstructed);

        verify(
            &descriptor.fingerprint,
            &payload,
            master.namespace(),
            master.name(),
        )?;
        advance(stage, CombineStage::Verified);

        let size = payload.len();
        let path = publish_atomically(&self.config.share_dir, &descriptor.file_name, payload)
            .await
            .map_err(|source| CombineError::Publish {
                path: self.config.share_dir.join(&descriptor.file_name),
                source,
            })?;
        advance(stage, CombineStage::Published);

        Ok(CombineReport {
            fingerprint: descriptor.fingerprint,
            path,
            size,
            partials: count,
        })
    }

    async fn read_master(&self) -> Result<StoredObject, CombineError> {
        match &self.config.master {
            MasterSource::File(path) => read_master_file(path).await,
            MasterSource::Name(name) => Ok(self.store.get(&self.config.namespace, name).await?),
        }
    }
}

async fn read_master_file(path: &Path) -> Result<StoredObject, CombineError> {
    let raw = tokio::fs::read(path)
        .await
        .map_err(|source| CombineError::ReadDescriptor {
            path: path.to_path_buf(),
            source,
        })?;
    serde_json::from_slice(&raw).map_err(|source| CombineError::DecodeDescriptor {
        path: path.to_path_buf(),
        source,
    })
}

fn advance(stage: &mut CombineStage, next: CombineStage) {
    info!(from = %stage, to = %next, "combine stage");
    *stage = next;
}
