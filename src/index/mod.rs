//! Coordinate resolution and plate metadata for a reconstruction run.

mod coordinate_set;
mod coordinate_spec;
mod plate;

pub use coordinate_set::{CoordinateSet, IndexMap, Unit};
pub use coordinate_spec::{resolve_axis, resolve_specs, CoordinateSpec, ResolvedAxis};
pub use plate::{NamedEntry, Plate, PlateMetadata, WellRef};
