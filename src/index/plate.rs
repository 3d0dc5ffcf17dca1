//! Plate (HCS) metadata and its reduction to a selected subset of positions.
//!
//! Raw plate-structured acquisitions describe every position as a well
//! (`<row>/<column>` path) plus a well-level record. When only some positions
//! are reconstructed the output store must carry a plate description that
//! matches exactly what was written, in slot order.

use super::coordinate_set::IndexMap;
use crate::error::ReconError;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A row or column of the plate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NamedEntry {
    pub name: String,
}

impl NamedEntry {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

/// Plate-level reference to a well.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WellRef {
    /// `<row>/<column>`
    pub path: String,

    /// Any other keys (row/column indices etc.), carried through untouched.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl WellRef {
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            extra: Map::new(),
        }
    }

    /// Split the path into `(row, column)`.
    pub fn row_column(&self) -> Result<(&str, &str), ReconError> {
        let mut parts = self.path.split('/');
        match (parts.next(), parts.next()) {
            (Some(row), Some(column)) if !row.is_empty() && !column.is_empty() => Ok((row, column)),
            _ => Err(ReconError::MalformedWellPath(self.path.clone())),
        }
    }
}

/// Plate description.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Plate {
    #[serde(default)]
    pub rows: Vec<NamedEntry>,

    #[serde(default)]
    pub columns: Vec<NamedEntry>,

    /// One entry per raw position; `null` where a position has no well.
    #[serde(default)]
    pub wells: Vec<Option<WellRef>>,

    /// Name, acquisitions, version and whatever else the plate carries.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Plate plus per-position well records, indexed by raw position.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct PlateMetadata {
    pub plate: Plate,

    #[serde(default)]
    pub well: Vec<Option<Value>>,
}

impl PlateMetadata {
    /// Number of positions that have both a well reference and a well record.
    pub fn num_complete_positions(&self) -> usize {
        self.plate
            .wells
            .iter()
            .zip(self.well.iter())
            .filter(|(w, m)| w.is_some() && m.is_some())
            .count()
    }

    /// Reduce the metadata to the positions of `index_map`, in slot order.
    ///
    /// Positions missing a well reference or a well record are dropped.
    /// Rows and columns are rebuilt from the retained well paths, first-seen
    /// order, without duplicates.
    pub fn reconcile(&self, index_map: &IndexMap) -> Result<PlateMetadata, ReconError> {
        let mut wells = Vec::with_capacity(index_map.len());
        let mut well_meta = Vec::with_capacity(index_map.len());

        for (raw, _slot) in index_map.iter() {
            let well_ref = self.plate.wells.get(raw).and_then(Option::as_ref);
            let record = self.well.get(raw).and_then(Option::as_ref);

            match (well_ref, record) {
                (Some(well_ref), Some(record)) => {
                    wells.push(well_ref.clone());
                    well_meta.push(record.clone());
                }
                _ => tracing::debug!("Position {} has no plate metadata, dropping it", raw),
            }
        }

        let mut rows: Vec<NamedEntry> = Vec::new();
        let mut columns: Vec<NamedEntry> = Vec::new();
        for well in &wells {
            let (row, column) = well.row_column()?;
            if !rows.iter().any(|r| r.name == row) {
                rows.push(NamedEntry::new(row));
            }
            if !columns.iter().any(|c| c.name == column) {
                columns.push(NamedEntry::new(column));
            }
        }

        Ok(PlateMetadata {
            plate: Plate {
                rows,
                columns,
                wells: wells.into_iter().map(Some).collect(),
                extra: self.plate.extra.clone(),
            },
            well: well_meta.into_iter().map(Some).collect(),
        })
    }
}
