//! Resolve position/timepoint specifications into concrete index sets.
//!
//! A configuration axis is a list of entries, each one of:
//!
//! - `"all"`: every index the raw data has on that axis
//! - `7`: a single index
//! - `[1, 4, 9]`: an explicit list
//! - `{start: 2, stop: 5}` or `"2..5"`: a half-open range
//!
//! Entries are visited in order and their indices unioned. The first time an
//! index is seen fixes its output slot; later duplicates change nothing.
//! `"all"` ends the scan and replaces whatever came before it.

use super::coordinate_set::IndexMap;
use crate::error::{Axis, ReconError};
use serde_json::Value;
use std::collections::BTreeSet;

/// One parsed coordinate entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CoordinateSpec {
    All,
    Single(usize),
    List(Vec<usize>),
    /// Half-open `[start, end)`.
    Range(usize, usize),
}

impl CoordinateSpec {
    /// Parse a raw configuration entry.
    pub fn parse(axis: Axis, entry: &Value) -> Result<Self, ReconError> {
        let bad = || ReconError::SpecFormat {
            axis,
            entry: entry.to_string(),
        };

        match entry {
            Value::String(s) if s.eq_ignore_ascii_case("all") => Ok(CoordinateSpec::All),
            Value::String(s) => {
                let (start, end) = s.split_once("..").ok_or_else(bad)?;
                let start = start.trim().parse::<usize>().map_err(|_| bad())?;
                let end = end.trim().parse::<usize>().map_err(|_| bad())?;
                Ok(CoordinateSpec::Range(start, end))
            }
            Value::Number(n) => {
                let index = n.as_u64().ok_or_else(bad)?;
                Ok(CoordinateSpec::Single(index as usize))
            }
            Value::Array(items) => items
                .iter()
                .map(|v| v.as_u64().map(|i| i as usize).ok_or_else(bad))
                .collect::<Result<Vec<_>, _>>()
                .map(CoordinateSpec::List),
            Value::Object(map) if map.len() == 2 => {
                let start = map.get("start").and_then(Value::as_u64).ok_or_else(bad)?;
                let stop = map.get("stop").and_then(Value::as_u64).ok_or_else(bad)?;
                Ok(CoordinateSpec::Range(start as usize, stop as usize))
            }
            _ => Err(bad()),
        }
    }

    /// Indices this entry names, in visiting order. `All` expands to `0..axis_size`.
    fn indices(&self, axis_size: usize) -> Vec<usize> {
        match self {
            CoordinateSpec::All => (0..axis_size).collect(),
            CoordinateSpec::Single(i) => vec![*i],
            CoordinateSpec::List(items) => items.clone(),
            CoordinateSpec::Range(start, end) => (*start..*end).collect(),
        }
    }

    /// Largest index this entry names, without expanding it. `None` for
    /// `All` and for empty lists and ranges.
    fn max_index(&self) -> Option<usize> {
        match self {
            CoordinateSpec::All => None,
            CoordinateSpec::Single(i) => Some(*i),
            CoordinateSpec::List(items) => items.iter().copied().max(),
            CoordinateSpec::Range(start, end) if end > start => Some(end - 1),
            CoordinateSpec::Range(..) => None,
        }
    }
}

/// The resolved working set of one axis.
#[derive(Debug, Clone)]
pub struct ResolvedAxis {
    /// Deduplicated indices, ascending.
    pub indices: BTreeSet<usize>,

    /// Raw index -> dense output slot, in first-encounter order.
    pub index_map: IndexMap,
}

impl ResolvedAxis {
    pub fn len(&self) -> usize {
        self.indices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.indices.is_empty()
    }
}

/// Resolve already-parsed specs.
pub fn resolve_specs(specs: &[CoordinateSpec], axis_size: usize) -> ResolvedAxis {
    let mut order = Vec::new();
    for spec in specs {
        if *spec == CoordinateSpec::All {
            return ResolvedAxis {
                indices: (0..axis_size).collect(),
                index_map: IndexMap::identity(axis_size),
            };
        }
        order.extend(spec.indices(axis_size));
    }

    let index_map = IndexMap::from_encounter_order(order);
    ResolvedAxis {
        indices: index_map.raw_indices().iter().copied().collect(),
        index_map,
    }
}

/// Parse and resolve raw configuration entries for one axis.
///
/// Entries after the first `"all"` are neither parsed nor validated.
pub fn resolve_axis(axis: Axis, entries: &[Value], axis_size: usize) -> Result<ResolvedAxis, ReconError> {
    let mut specs = Vec::with_capacity(entries.len());
    for entry in entries {
        let spec = CoordinateSpec::parse(axis, entry)?;
        let is_all = spec == CoordinateSpec::All;
        specs.push(spec);
        if is_all {
            break;
        }
    }

    // Bounds are checked before expansion so an oversized range fails fast.
    if let Some(index) = specs.iter().filter_map(CoordinateSpec::max_index).max() {
        if index >= axis_size {
            return Err(ReconError::IndexOutOfRange {
                axis,
                index,
                size: axis_size,
            });
        }
    }

    let resolved = resolve_specs(&specs, axis_size);

    tracing::debug!("Resolved {} {} from {} entries", resolved.len(), axis, specs.len());
    Ok(resolved)
}
