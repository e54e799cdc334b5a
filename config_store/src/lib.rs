pub mod config;
pub mod error;

use std::{collections::HashSet, env, sync::Arc};

use async_trait::async_trait;
use bytes::Bytes;
pub use config::StoreConfig;
use data_model::{labels::is_valid_label_value, LabelSelector, ObjectKey, StoredObject};
pub use error::{StoreError, StoreResult};
use futures::{future::try_join_all, TryStreamExt};
use object_store::{
    parse_url,
    parse_url_opts,
    path::Path,
    ObjectStore,
    ObjectStoreScheme,
    PutMode,
    PutPayload,
};
use tracing::{debug, info};
use url::Url;

const MAX_OBJECT_NAME_LEN: usize = 253;

/// The control plane operations the split/combine protocol relies on.
#[async_trait]
pub trait ConfigStore: Send + Sync {
    /// Create a new object and return it with its assigned uid.
    ///
    /// Returns `StoreError::AlreadyExists` if the name is taken.
    async fn create(&self, object: StoredObject) -> StoreResult<StoredObject>;

    /// Returns `StoreError::NotFound` if the object doesn't exist.
    async fn get(&self, namespace: &str, name: &str) -> StoreResult<StoredObject>;

    /// All objects of a namespace whose labels match `selector`.
    async fn list(&self, namespace: &str, selector: &LabelSelector)
        -> StoreResult<Vec<StoredObject>>;

    /// Delete an object and, transitively, every object that names it as
    /// owner.
    async fn delete(&self, namespace: &str, name: &str) -> StoreResult<()>;
}

/// [`ConfigStore`] persisted as one JSON document per object in an
/// [`ObjectStore`], at `<prefix>/<namespace>/<name>`.
#[derive(Debug, Clone)]
pub struct ObjectConfigStore {
    object_store: Arc<dyn ObjectStore>,
    path: Path,
    max_object_bytes: usize,
}

impl ObjectConfigStore {
    pub fn new(config: StoreConfig) -> StoreResult<Self> {
        let (object_store, path) = Self::build_object_store(&config.path)?;
        info!("using config store path: {}", config.path);
        Ok(Self {
            object_store: Arc::new(object_store),
            path,
            max_object_bytes: config.max_object_bytes,
        })
    }

    pub fn build_object_store(url_str: &str) -> StoreResult<(Box<dyn ObjectStore>, Path)> {
        let url = url_str.parse::<Url>().map_err(|e| StoreError::InvalidUrl {
            url: url_str.to_string(),
            reason: e.to_string(),
        })?;
        let (scheme, _) = ObjectStoreScheme::parse(&url).map_err(object_store::Error::from)?;
        match scheme {
            ObjectStoreScheme::AmazonS3 => {
                // inject AWS environment variables to prioritize keys over instance metadata
                // credentials.
                let opts: Vec<(String, String)> = env::vars()
                    .filter(|(key, _)| key.starts_with("AWS_"))
                    .map(|(key, value)| (key.to_ascii_lowercase(), value))
                    .collect();
                Ok(parse_url_opts(&url, opts)?)
            }
            _ => Ok(parse_url(&url)?),
        }
    }

    fn object_path(&self, namespace: &str, name: &str) -> Path {
        self.path.child(namespace).child(name)
    }

    fn validate(&self, object: &StoredObject) -> StoreResult<()> {
        let key = object.key();
        if !is_valid_object_name(object.namespace()) || !is_valid_object_name(object.name()) {
            return Err(StoreError::InvalidName { object: key });
        }
        if let Some((label, value)) = object
            .labels()
            .iter()
            .find(|(_, value)| !is_valid_label_value(value))
        {
            return Err(StoreError::InvalidLabel {
                object: key,
                key: label.clone(),
                value: value.clone(),
            });
        }
        Ok(())
    }

    async fn read(&self, key: &ObjectKey, path: &Path) -> StoreResult<StoredObject> {
        let bytes = self
            .object_store
            .get(path)
            .await
            .map_err(|e| StoreError::from_backend(key, e))?
            .bytes()
            .await
            .map_err(|e| StoreError::from_backend(key, e))?;
        serde_json::from_slice(&bytes).map_err(|source| StoreError::Decode {
            object: key.clone(),
            source,
        })
    }

    /// Every object in `namespace`. Objects removed between listing and
    /// reading are skipped.
    async fn list_all(&self, namespace: &str) -> StoreResult<Vec<StoredObject>> {
        let prefix = self.path.child(namespace);
        let metas: Vec<_> = self
            .object_store
            .list(Some(&prefix))
            .try_collect()
            .await?;

        let reads = metas.into_iter().map(|meta| async move {
            let name = meta.location.filename().unwrap_or_default().to_string();
            let key = ObjectKey::new(namespace, &name);
            match self.read(&key, &meta.location).await {
                Ok(object) => Ok(Some(object)),
                Err(err) if err.is_not_found() => Ok(None),
                Err(err) => Err(err),
            }
        });
        Ok(try_join_all(reads).await?.into_iter().flatten().collect())
    }

    async fn remove(&self, object: &StoredObject) -> StoreResult<()> {
        let key = object.key();
        self.object_store
            .delete(&self.object_path(object.namespace(), object.name()))
            .await
            .map_err(|e| StoreError::from_backend(&key, e))?;
        debug!(object = %key, "deleted object");
        Ok(())
    }
}

#[async_trait]
impl ConfigStore for ObjectConfigStore {
    async fn create(&self, mut object: StoredObject) -> StoreResult<StoredObject> {
        self.validate(&object)?;
        let key = object.key();
        if object.metadata.uid.is_empty() {
            object.metadata.uid = uuid::Uuid::new_v4().to_string();
        }

        let encoded = serde_json::to_vec(&object)?;
        if encoded.len() > self.max_object_bytes {
            return Err(StoreError::TooLarge {
                object: key,
                size: encoded.len(),
                limit: self.max_object_bytes,
            });
        }

        let size = encoded.len();
        let payload = PutPayload::from(Bytes::from(encoded));
        self.object_store
            .put_opts(
                &self.object_path(object.namespace(), object.name()),
                payload,
                PutMode::Create.into(),
            )
            .await
            .map_err(|e| StoreError::from_backend(&key, e))?;
        debug!(object = %key, size, "created object");
        Ok(object)
    }

    async fn get(&self, namespace: &str, name: &str) -> StoreResult<StoredObject> {
        let key = ObjectKey::new(namespace, name);
        self.read(&key, &self.object_path(namespace, name)).await
    }

    async fn list(
        &self,
        namespace: &str,
        selector: &LabelSelector,
    ) -> StoreResult<Vec<StoredObject>> {
        let mut objects: Vec<StoredObject> = self
            .list_all(namespace)
            .await?
            .into_iter()
            .filter(|object| selector.matches(object.labels()))
            .collect();
        objects.sort_by(|a, b| a.metadata.name.cmp(&b.metadata.name));
        debug!(namespace, %selector, count = objects.len(), "listed objects");
        Ok(objects)
    }

    async fn delete(&self, namespace: &str, name: &str) -> StoreResult<()> {
        let owner = self.get(namespace, name).await?;
        self.remove(&owner).await?;

        // Owner references never cross namespaces.
        let mut owners = vec![owner.metadata.uid.clone()];
        let mut removed = HashSet::from([owner.metadata.uid.clone()]);
        while let Some(uid) = owners.pop() {
            for dependent in self.list_all(namespace).await? {
                if !dependent.is_owned_by(&uid) || removed.contains(dependent.uid()) {
                    continue;
                }
                match self.remove(&dependent).await {
                    Ok(()) => {}
                    Err(err) if err.is_not_found() => {}
                    Err(err) => return Err(err),
                }
                removed.insert(dependent.metadata.uid.clone());
                owners.push(dependent.metadata.uid.clone());
            }
        }
        info!(object = %owner.key(), removed = removed.len(), "deleted object and dependents");
        Ok(())
    }
}

/// Lowercase alphanumerics, `-` and `.`, starting and ending alphanumeric.
pub fn is_valid_object_name(name: &str) -> bool {
    let bytes = name.as_bytes();
    let edge = |b: &u8| b.is_ascii_lowercase() || b.is_ascii_digit();
    !name.is_empty()
        && name.len() <= MAX_OBJECT_NAME_LEN
        && edge(&bytes[0])
        && edge(&bytes[bytes.len() - 1])
        && bytes
            .iter()
            .all(|b| edge(b) || matches!(b, b'-' | b'.'))
}
