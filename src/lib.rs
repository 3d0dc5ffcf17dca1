//! Reconstruction run orchestration
//!
//! Drives a multi-position, multi-timepoint microscopy acquisition through a
//! pluggable reconstruction pipeline and writes the results into a Zarr store,
//! keeping plate metadata consistent with the positions actually written.
//!
//! # Architecture
//!
//! - **Index**: coordinate specifications, position slots, plate metadata
//! - **I/O**: raw and output stores over zarrs and object_store
//! - **Transform**: routing of denoise/registration parameters to produced buffers
//! - **Pipeline**: run planning, parameter resolution and the unit run loop
//!
//! # Usage
//!
//! ```no_run
//! use recon_runner::{run_reconstruction, CancellationFlag, RunConfig};
//! # use recon_runner::{ImageTransforms, ReconstructionPipeline};
//! # use std::sync::Arc;
//! # async fn example(
//! #     pipeline: Arc<dyn ReconstructionPipeline>,
//! #     transforms: Arc<dyn ImageTransforms>,
//! # ) -> anyhow::Result<()> {
//! let config = RunConfig::from_file(&"config.yaml".into())?;
//! let stats = run_reconstruction(config, pipeline, transforms, CancellationFlag::new()).await?;
//! println!("{}", stats);
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod error;
pub mod index;
pub mod io;
pub mod pipeline;
pub mod transform;

#[cfg(test)]
pub(crate) mod testing;

pub use config::{Method, RunConfig};
pub use error::ReconError;
pub use io::{OutputStore, RawStore, ZarrOutputStore, ZarrRawStore};
pub use pipeline::{
    CancellationFlag, ReconstructionPipeline, RunPlan, RunStats, UnitOrchestrator,
};
pub use transform::ImageTransforms;

use anyhow::{Context, Result};
use std::sync::Arc;

/// Open the raw acquisition named by `dataset.data_dir`.
pub async fn open_raw_store(config: &RunConfig) -> Result<ZarrRawStore> {
    let location = io::open_location(&config.dataset.data_dir, false)
        .with_context(|| format!("Failed to open raw data at {}", config.dataset.data_dir))?;
    ZarrRawStore::open(location.store, &location.prefix).await
}

/// Open (or create) the output store at `save_dir/data_save_name.zarr`.
pub async fn open_output_store(config: &RunConfig) -> Result<ZarrOutputStore> {
    let destination = config.dataset.output_location();
    tracing::info!("Writing Zarr output to: {}", destination);

    let location = io::open_location(&destination, true)
        .with_context(|| format!("Failed to open output store at {}", destination))?;
    ZarrOutputStore::create(
        location.store,
        &location.prefix,
        config.output.compression_level,
        config.output.overwrite,
    )
    .await
}

/// Run a full reconstruction with the given pipeline and transforms.
pub async fn run_reconstruction(
    config: RunConfig,
    pipeline: Arc<dyn ReconstructionPipeline>,
    transforms: Arc<dyn ImageTransforms>,
    cancel: CancellationFlag,
) -> Result<RunStats> {
    config.validate()?;

    let raw = Arc::new(open_raw_store(&config).await?);
    let plan = RunPlan::build(&config, raw.as_ref())?;

    if plan.coordinates.is_empty() {
        anyhow::bail!("No units selected for reconstruction");
    }

    // Opening the output may delete a previous run, so every configuration
    // error has to surface first.
    pipeline::ProcessingParams::resolve(&config).context("Invalid processing configuration")?;

    let output = Arc::new(open_output_store(&config).await?);

    let orchestrator = UnitOrchestrator::new(raw, pipeline, output, transforms, config, plan)
        .with_cancellation(cancel);
    orchestrator.run().await
}

/// Build a Tokio runtime with the specified configuration.
pub fn build_runtime(worker_threads: Option<usize>) -> Result<tokio::runtime::Runtime> {
    let mut builder = tokio::runtime::Builder::new_multi_thread();

    if let Some(threads) = worker_threads {
        builder.worker_threads(threads);
    }

    builder.enable_all();

    Ok(builder.build()?)
}
