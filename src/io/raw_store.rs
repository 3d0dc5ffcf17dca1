//! Read side: the raw acquisition a run reconstructs from.

use crate::index::PlateMetadata;
use anyhow::Result;
use async_trait::async_trait;
use ndarray::Array4;

/// One timepoint of one position, `(channel, z, y, x)`.
pub type Volume = Array4<f32>;

/// A raw multi-position, multi-timepoint acquisition.
#[async_trait]
pub trait RawStore: Send + Sync {
    /// Number of positions in the acquisition.
    fn num_positions(&self) -> usize;

    /// Number of timepoints per position.
    fn num_frames(&self) -> usize;

    /// Plate layout, when the acquisition is plate-structured.
    fn plate_metadata(&self) -> Option<&PlateMetadata>;

    /// Read the `(C, Z, Y, X)` volume of one position at one timepoint.
    async fn read_volume(&self, position: usize, time: usize) -> Result<Volume>;
}
