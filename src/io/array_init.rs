//! Create per-position output arrays on first use.

use super::output_store::{ArraySpec, OutputStore};
use anyhow::{Context, Result};
use std::collections::HashSet;

/// What `ensure_array` did for a slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Provisioned {
    /// The array was created by this call
    Created,

    /// The array was already there (earlier unit, earlier run)
    Existing,
}

/// Provisions each position slot's array at most once.
///
/// Timepoints of a position are appended to one array, so the first unit of a
/// slot creates it and every later unit finds it. The store is asked whether
/// the array exists before creating; only a missing array is created, and any
/// other store failure is returned as is.
#[derive(Debug, Default)]
pub struct ArrayInitializer {
    /// Slots known to exist in this run
    ensured: HashSet<usize>,
}

impl ArrayInitializer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make sure the slot's array exists.
    pub async fn ensure_array(
        &mut self,
        store: &dyn OutputStore,
        slot: usize,
        spec: &ArraySpec,
    ) -> Result<Provisioned> {
        if self.ensured.contains(&slot) {
            return Ok(Provisioned::Existing);
        }

        let provisioned = if store
            .array_exists(slot)
            .await
            .with_context(|| format!("Failed to check output array for slot {}", slot))?
        {
            tracing::debug!("Output array for slot {} already exists", slot);
            Provisioned::Existing
        } else {
            store
                .create_array(slot, spec)
                .await
                .with_context(|| format!("Failed to create output array for slot {}", slot))?;
            tracing::debug!("Created output array for slot {} with shape {:?}", slot, spec.shape);
            Provisioned::Created
        };

        self.ensured.insert(slot);
        Ok(provisioned)
    }
}

/// Display name for a raw position, e.g. `Pos_007`.
pub fn position_name(raw_position: usize) -> String {
    format!("Pos_{:03}", raw_position)
}
