//! Write side: the store reconstruction results are committed to.

use super::raw_store::Volume;
use anyhow::Result;
use async_trait::async_trait;
use serde_json::{Map, Value};

/// Layout of one per-position output array.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArraySpec {
    /// `(T, C, Z, Y, X)`
    pub shape: Vec<u64>,

    /// Chunk shape, same rank as `shape`
    pub chunks: Vec<u64>,

    /// One name per output channel
    pub channel_names: Vec<String>,

    /// Raw position the slot was filled from, when no plate metadata records it
    pub position_name: Option<String>,
}

/// Destination of a reconstruction run.
///
/// Arrays are addressed by position slot. Each slot holds every reconstructed
/// timepoint of one position.
#[async_trait]
pub trait OutputStore: Send + Sync {
    /// Whether the slot's array has been created.
    async fn array_exists(&self, slot: usize) -> Result<bool>;

    /// Create the slot's array. Fails if it already exists.
    async fn create_array(&self, slot: usize, spec: &ArraySpec) -> Result<()>;

    /// Write one `(C, Z, Y, X)` volume at `time` of the slot's array.
    async fn write_volume(&self, slot: usize, time: usize, volume: Volume) -> Result<()>;

    /// Merge entries into the store-level metadata record.
    ///
    /// Read-modify-write, not atomic. Two writers merging into the same store
    /// concurrently can lose each other's updates.
    async fn merge_metadata(&self, entries: Map<String, Value>) -> Result<()>;
}
