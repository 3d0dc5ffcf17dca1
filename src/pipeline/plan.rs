//! Setup for a run: which units to process and the plate metadata to write.

use crate::config::RunConfig;
use crate::error::Axis;
use crate::index::{resolve_axis, CoordinateSet, IndexMap, PlateMetadata, ResolvedAxis};
use crate::io::RawStore;
use anyhow::{Context, Result};

/// Resolved coordinates of a run.
#[derive(Debug, Clone)]
pub struct RunPlan {
    pub positions: ResolvedAxis,
    pub times: ResolvedAxis,
    pub coordinates: CoordinateSet,

    /// Plate metadata reduced to the selected positions, in slot order
    pub plate: Option<PlateMetadata>,
}

impl RunPlan {
    /// Resolve the configured positions and timepoints against the raw store.
    pub fn build(config: &RunConfig, raw: &dyn RawStore) -> Result<Self> {
        let positions = resolve_axis(Axis::Position, &config.dataset.positions, raw.num_positions())
            .context("Failed to resolve positions")?;
        let times = resolve_axis(Axis::Time, &config.dataset.timepoints, raw.num_frames())
            .context("Failed to resolve timepoints")?;

        let coordinates = CoordinateSet::new(&positions.indices, &times.indices);

        let plate = match raw.plate_metadata() {
            Some(full) => Some(
                full.reconcile(&positions.index_map)
                    .context("Failed to reconcile plate metadata")?,
            ),
            None => None,
        };

        let plan = Self {
            positions,
            times,
            coordinates,
            plate,
        };
        tracing::info!("{}", plan.summary());
        Ok(plan)
    }

    /// Position index to output slot.
    pub fn index_map(&self) -> &IndexMap {
        &self.positions.index_map
    }

    pub fn summary(&self) -> PlanSummary {
        PlanSummary {
            positions: self.positions.len(),
            timepoints: self.times.len(),
            units: self.coordinates.len(),
            wells: self.plate.as_ref().map(|p| p.plate.wells.len()),
        }
    }
}

/// Counts reported before a run starts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlanSummary {
    pub positions: usize,
    pub timepoints: usize,
    pub units: usize,
    pub wells: Option<usize>,
}

impl std::fmt::Display for PlanSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} positions x {} timepoints = {} units",
            self.positions, self.timepoints, self.units
        )?;
        if let Some(wells) = self.wells {
            write!(f, ", {} wells", wells)?;
        }
        Ok(())
    }
}
