//! Raw acquisition reader over the same Zarr layout the output store writes.
//!
//! Each position is a `(T, C, Z, Y, X)` array named by its index under the
//! store prefix. Plate metadata, when present, sits in the root group
//! attributes under `plate` and `well`.

use super::raw_store::{RawStore, Volume};
use super::zarr_writer::ZarrPaths;
use crate::index::PlateMetadata;
use anyhow::{Context, Result};
use async_trait::async_trait;
use ndarray::{Axis, Ix5};
use object_store::ObjectStore;
use std::sync::Arc;
use zarrs::array::Array;
use zarrs::array_subset::ArraySubset;
use zarrs::group::Group;
use zarrs_object_store::AsyncObjectStore;

type ZarrStore = AsyncObjectStore<Arc<dyn ObjectStore>>;

/// Reads raw volumes from a Zarr hierarchy.
pub struct ZarrRawStore {
    zarr_store: Arc<ZarrStore>,
    paths: ZarrPaths,
    num_positions: usize,
    num_frames: usize,
    plate: Option<PlateMetadata>,
}

impl ZarrRawStore {
    /// Open the acquisition under `prefix` and read its dimensions.
    pub async fn open(store: Arc<dyn ObjectStore>, prefix: &str) -> Result<Self> {
        let paths = ZarrPaths::new(prefix);
        let zarr_store = Arc::new(AsyncObjectStore::new(store.clone()));

        let listing = store
            .list_with_delimiter(paths.root().as_ref())
            .await
            .context("Failed to list raw store")?;

        let mut positions: Vec<usize> = listing
            .common_prefixes
            .iter()
            .filter_map(|p| p.filename().and_then(|name| name.parse().ok()))
            .collect();
        positions.sort_unstable();

        // Positions are 0..n with no gaps
        for (expected, found) in positions.iter().enumerate() {
            if expected != *found {
                anyhow::bail!("Raw store is missing position {}", expected);
            }
        }
        let num_positions = positions.len();
        if num_positions == 0 {
            anyhow::bail!("Raw store {} has no positions", paths.group());
        }

        let first = Array::async_open(zarr_store.clone(), &paths.array(0))
            .await
            .context("Failed to open raw position 0")?;
        if first.shape().len() != 5 {
            anyhow::bail!(
                "Raw arrays are (T, C, Z, Y, X); position 0 has shape {:?}",
                first.shape()
            );
        }
        let num_frames = first.shape()[0] as usize;

        let plate = match Group::async_open(zarr_store.clone(), &paths.group()).await {
            Ok(group) => {
                let attrs = group.attributes();
                if attrs.contains_key("plate") {
                    let value = serde_json::Value::Object(attrs.clone());
                    Some(
                        serde_json::from_value::<PlateMetadata>(value)
                            .context("Failed to parse plate metadata")?,
                    )
                } else {
                    None
                }
            }
            Err(e) => {
                tracing::debug!("No root group metadata: {}", e);
                None
            }
        };

        tracing::info!(
            "Opened raw store: {} positions, {} timepoints, plate metadata: {}",
            num_positions,
            num_frames,
            plate.is_some()
        );

        Ok(Self {
            zarr_store,
            paths,
            num_positions,
            num_frames,
            plate,
        })
    }
}

#[async_trait]
impl RawStore for ZarrRawStore {
    fn num_positions(&self) -> usize {
        self.num_positions
    }

    fn num_frames(&self) -> usize {
        self.num_frames
    }

    fn plate_metadata(&self) -> Option<&PlateMetadata> {
        self.plate.as_ref()
    }

    async fn read_volume(&self, position: usize, time: usize) -> Result<Volume> {
        let array = Array::async_open(self.zarr_store.clone(), &self.paths.array(position))
            .await
            .with_context(|| format!("Failed to open raw position {}", position))?;

        let shape = array.shape().to_vec();
        if shape.len() != 5 {
            anyhow::bail!(
                "Raw position {} must be (T, C, Z, Y, X), found shape {:?}",
                position,
                shape
            );
        }
        if time as u64 >= shape[0] {
            anyhow::bail!("Timepoint {} beyond position {} length {}", time, position, shape[0]);
        }

        let subset = ArraySubset::new_with_ranges(&[
            time as u64..time as u64 + 1,
            0..shape[1],
            0..shape[2],
            0..shape[3],
            0..shape[4],
        ]);

        let data = array
            .async_retrieve_array_subset_ndarray::<f32>(&subset)
            .await
            .with_context(|| format!("Failed to read P = {}, T = {}", position, time))?;

        let data = data.into_dimensionality::<Ix5>()?;
        Ok(data.index_axis_move(Axis(0), 0))
    }
}
