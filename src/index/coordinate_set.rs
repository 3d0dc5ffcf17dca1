//! Position-slot mapping and the (position, time) work set.

use std::collections::{BTreeSet, HashMap};

/// Raw position index -> dense output slot.
///
/// Slots are assigned `0, 1, 2, ...` in the order positions were first seen
/// while resolving the configuration. The map cannot be modified after it is
/// built, so a position keeps the same slot for the whole run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IndexMap {
    /// Raw index for each slot.
    raw: Vec<usize>,

    /// Slot for each raw index.
    slots: HashMap<usize, usize>,
}

impl IndexMap {
    /// Map where every raw index is its own slot.
    pub fn identity(size: usize) -> Self {
        Self::from_encounter_order(0..size)
    }

    /// Build from raw indices in visiting order; repeats keep their first slot.
    pub fn from_encounter_order(order: impl IntoIterator<Item = usize>) -> Self {
        let mut map = Self::default();
        for raw in order {
            if !map.slots.contains_key(&raw) {
                map.slots.insert(raw, map.raw.len());
                map.raw.push(raw);
            }
        }
        map
    }

    /// Output slot of a raw position.
    pub fn slot(&self, raw: usize) -> Option<usize> {
        self.slots.get(&raw).copied()
    }

    /// Raw position stored in an output slot.
    #[cfg(test)]
    pub(crate) fn raw_index(&self, slot: usize) -> Option<usize> {
        self.raw.get(slot).copied()
    }

    /// Raw indices in slot order.
    pub fn raw_indices(&self) -> &[usize] {
        &self.raw
    }

    /// `(raw, slot)` pairs in slot order.
    pub fn iter(&self) -> impl Iterator<Item = (usize, usize)> + '_ {
        self.raw.iter().enumerate().map(|(slot, &raw)| (raw, slot))
    }

    pub fn len(&self) -> usize {
        self.raw.len()
    }

    pub fn is_empty(&self) -> bool {
        self.raw.is_empty()
    }
}

/// One (position, time) pair processed end to end.
///
/// Field order gives the derived `Ord` its (position, time) lexicographic order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Unit {
    /// Raw position index
    pub position: usize,

    /// Raw timepoint index
    pub time: usize,
}

impl std::fmt::Display for Unit {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "P = {}, T = {}", self.position, self.time)
    }
}

/// Cartesian product of resolved positions and timepoints.
///
/// Iteration is always ascending by (position, time), whatever order the
/// axes were resolved in.
#[derive(Debug, Clone, Default)]
pub struct CoordinateSet {
    units: BTreeSet<Unit>,
}

impl CoordinateSet {
    pub fn new(positions: &BTreeSet<usize>, times: &BTreeSet<usize>) -> Self {
        let units = positions
            .iter()
            .flat_map(|&position| times.iter().map(move |&time| Unit { position, time }))
            .collect();
        Self { units }
    }

    pub fn iter(&self) -> impl Iterator<Item = Unit> + '_ {
        self.units.iter().copied()
    }

    #[cfg(test)]
    pub(crate) fn contains(&self, unit: &Unit) -> bool {
        self.units.contains(unit)
    }

    pub fn len(&self) -> usize {
        self.units.len()
    }

    pub fn is_empty(&self) -> bool {
        self.units.is_empty()
    }
}
