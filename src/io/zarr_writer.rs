//! Zarr output store using zarrs over object_store.
//!
//! Layout, relative to the store prefix:
//!
//! ```text
//! zarr.json            root group; attributes hold plate metadata and the run record
//! <slot>/zarr.json     one float32 array per position slot, (T, C, Z, Y, X)
//! <slot>/c/...         chunks
//! ```

use super::output_store::{ArraySpec, OutputStore};
use super::raw_store::Volume;
use anyhow::{Context, Result};
use async_trait::async_trait;
use futures::StreamExt;
use ndarray::Axis;
use object_store::ObjectStore;
use serde_json::{Map, Value};
use std::sync::Arc;
use zarrs::array::codec::bytes_to_bytes::zstd::ZstdCodec;
use zarrs::array::{Array, ArrayBuilder};
use zarrs::group::{Group, GroupBuilder};
use zarrs_object_store::AsyncObjectStore;

type ZarrStore = AsyncObjectStore<Arc<dyn ObjectStore>>;

/// Node and key paths below a store prefix.
#[derive(Debug, Clone)]
pub(crate) struct ZarrPaths {
    prefix: String,
}

impl ZarrPaths {
    pub(crate) fn new(prefix: &str) -> Self {
        Self {
            prefix: prefix.trim_matches('/').to_string(),
        }
    }

    /// Zarr node path of the root group.
    pub(crate) fn group(&self) -> String {
        if self.prefix.is_empty() {
            "/".to_string()
        } else {
            format!("/{}", self.prefix)
        }
    }

    /// Zarr node path of a slot's array.
    pub(crate) fn array(&self, slot: usize) -> String {
        if self.prefix.is_empty() {
            format!("/{}", slot)
        } else {
            format!("/{}/{}", self.prefix, slot)
        }
    }

    /// Object key of a slot's array metadata.
    pub(crate) fn array_metadata_key(&self, slot: usize) -> object_store::path::Path {
        if self.prefix.is_empty() {
            object_store::path::Path::from(format!("{}/zarr.json", slot))
        } else {
            object_store::path::Path::from(format!("{}/{}/zarr.json", self.prefix, slot))
        }
    }

    /// Object key prefix everything lives under.
    pub(crate) fn root(&self) -> Option<object_store::path::Path> {
        if self.prefix.is_empty() {
            None
        } else {
            Some(object_store::path::Path::from(self.prefix.as_str()))
        }
    }
}

/// Zarr-backed output store.
pub struct ZarrOutputStore {
    /// Underlying object store (used for existence checks and deletes)
    store: Arc<dyn ObjectStore>,

    /// The same store seen through zarrs
    zarr_store: Arc<ZarrStore>,

    paths: ZarrPaths,

    /// Zstd compression level for new arrays
    compression_level: i32,
}

impl ZarrOutputStore {
    /// Open the output hierarchy under `prefix`, creating the root group if needed.
    ///
    /// With `overwrite`, every object under the prefix is deleted first.
    pub async fn create(
        store: Arc<dyn ObjectStore>,
        prefix: &str,
        compression_level: i32,
        overwrite: bool,
    ) -> Result<Self> {
        let paths = ZarrPaths::new(prefix);

        if overwrite {
            delete_all(&store, paths.root().as_ref()).await?;
        }

        let zarr_store = Arc::new(AsyncObjectStore::new(store.clone()));

        let root_key = match paths.root() {
            Some(root) => root.child("zarr.json"),
            None => object_store::path::Path::from("zarr.json"),
        };
        if exists(&store, &root_key).await? {
            tracing::info!("Appending to existing output store at {}", paths.group());
        } else {
            let group = GroupBuilder::new().build(zarr_store.clone(), &paths.group())?;
            group.async_store_metadata().await?;
            tracing::info!("Created output store at {}", paths.group());
        }

        Ok(Self {
            store,
            zarr_store,
            paths,
            compression_level,
        })
    }

    /// Current store-level attributes.
    pub async fn metadata(&self) -> Result<Map<String, Value>> {
        let group = Group::async_open(self.zarr_store.clone(), &self.paths.group()).await?;
        Ok(group.attributes().clone())
    }

    /// Open a slot's array.
    pub async fn open_array(&self, slot: usize) -> Result<Array<ZarrStore>> {
        Array::async_open(self.zarr_store.clone(), &self.paths.array(slot))
            .await
            .with_context(|| format!("Failed to open output array for slot {}", slot))
    }
}

#[async_trait]
impl OutputStore for ZarrOutputStore {
    async fn array_exists(&self, slot: usize) -> Result<bool> {
        exists(&self.store, &self.paths.array_metadata_key(slot)).await
    }

    async fn create_array(&self, slot: usize, spec: &ArraySpec) -> Result<()> {
        if spec.shape.len() != 5 || spec.chunks.len() != 5 {
            anyhow::bail!(
                "Output arrays are (T, C, Z, Y, X); got shape {:?}, chunks {:?}",
                spec.shape,
                spec.chunks
            );
        }
        if self.array_exists(slot).await? {
            anyhow::bail!("Output array for slot {} already exists", slot);
        }

        let mut builder = ArrayBuilder::new(
            spec.shape.clone(),
            spec.chunks.clone(),
            "float32",
            0f32,
        );

        builder.dimension_names(Some(vec![
            Some("t".to_string()),
            Some("c".to_string()),
            Some("z".to_string()),
            Some("y".to_string()),
            Some("x".to_string()),
        ]));

        builder.bytes_to_bytes_codecs(vec![Arc::new(ZstdCodec::new(
            self.compression_level,
            false,
        ))]);

        let mut attributes = Map::new();
        attributes.insert("channel_names".to_string(), serde_json::json!(spec.channel_names));
        if let Some(name) = &spec.position_name {
            attributes.insert("position_name".to_string(), serde_json::json!(name));
        }
        builder.attributes(attributes);

        let path = self.paths.array(slot);
        let array = builder.build(self.zarr_store.clone(), &path)?;
        array.async_store_metadata().await?;

        tracing::debug!("Created Zarr array at {} with shape {:?}", path, spec.shape);
        Ok(())
    }

    async fn write_volume(&self, slot: usize, time: usize, volume: Volume) -> Result<()> {
        let array = self.open_array(slot).await?;

        let shape = array.shape();
        let expected: Vec<u64> = shape[1..].to_vec();
        let got: Vec<u64> = volume.shape().iter().map(|&d| d as u64).collect();
        if expected != got {
            anyhow::bail!(
                "Volume shape {:?} does not match slot {} array shape {:?}",
                got,
                slot,
                shape
            );
        }
        if time as u64 >= shape[0] {
            anyhow::bail!("Timepoint {} beyond slot {} array length {}", time, slot, shape[0]);
        }

        array
            .async_store_array_subset_ndarray(&[time as u64, 0, 0, 0, 0], volume.insert_axis(Axis(0)))
            .await
            .map_err(|e| {
                tracing::error!("Write of slot {} t={} failed: {:?}", slot, time, e);
                anyhow::anyhow!("Failed to write slot {} t={}: {}", slot, time, e)
            })?;

        tracing::debug!("Wrote slot {} t={}", slot, time);
        Ok(())
    }

    async fn merge_metadata(&self, entries: Map<String, Value>) -> Result<()> {
        let mut group = Group::async_open(self.zarr_store.clone(), &self.paths.group()).await?;
        group.attributes_mut().extend(entries);
        group.async_store_metadata().await?;
        Ok(())
    }
}

/// Whether an object exists.
async fn exists(store: &Arc<dyn ObjectStore>, key: &object_store::path::Path) -> Result<bool> {
    match store.head(key).await {
        Ok(_) => Ok(true),
        Err(object_store::Error::NotFound { .. }) => Ok(false),
        Err(e) => Err(e).with_context(|| format!("Failed to stat {}", key)),
    }
}

/// Delete every object under `prefix` (the whole store when `None`).
async fn delete_all(store: &Arc<dyn ObjectStore>, prefix: Option<&object_store::path::Path>) -> Result<()> {
    let existing = store
        .list(prefix)
        .collect::<Vec<_>>()
        .await
        .into_iter()
        .collect::<std::result::Result<Vec<_>, _>>()
        .context("Failed to list existing objects for overwrite")?;
    if existing.is_empty() {
        return Ok(());
    }

    tracing::info!("Overwrite: deleting {} existing objects", existing.len());

    let results: Vec<_> = futures::stream::iter(existing)
        .map(|meta| async move {
            store
                .delete(&meta.location)
                .await
                .with_context(|| format!("Failed to delete {}", meta.location))
        })
        .buffer_unordered(64)
        .collect()
        .await;

    results.into_iter().collect::<Result<Vec<_>>>()?;
    Ok(())
}
