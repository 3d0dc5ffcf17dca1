//! The run loop: drive every unit through the pipeline and into the output store.

use super::metrics::{Metrics, MetricsReporter};
use super::params::ProcessingParams;
use super::plan::RunPlan;
use super::reconstruction::{ReconstructionPipeline, UnitResult};
use crate::config::RunConfig;
use crate::index::Unit;
use crate::io::{position_name, ArrayInitializer, ArraySpec, OutputStore, RawStore};
use crate::transform::{denoise_outputs, register_channels, ImageTransforms};
use anyhow::{Context, Result};
use serde_json::{Map, Value};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::mpsc;

/// Interval between progress reports while a run is going.
const REPORT_INTERVAL_SECS: u64 = 30;

/// Request to stop a run between units.
#[derive(Debug, Clone, Default)]
pub struct CancellationFlag(Arc<AtomicBool>);

impl CancellationFlag {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stop before the next unit. The unit in progress completes.
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Stages a unit goes through, in order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnitStage {
    FetchRaw,
    Stokes,
    PreProcess,
    Birefringence,
    Deconvolve,
    PostProcess,
    Write,
    Done,
}

impl std::fmt::Display for UnitStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            UnitStage::FetchRaw => "fetch",
            UnitStage::Stokes => "stokes",
            UnitStage::PreProcess => "pre-processing",
            UnitStage::Birefringence => "birefringence",
            UnitStage::Deconvolve => "deconvolution",
            UnitStage::PostProcess => "post-processing",
            UnitStage::Write => "write",
            UnitStage::Done => "done",
        };
        write!(f, "{}", name)
    }
}

/// Outcome of a run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunStats {
    pub total_units: usize,
    pub units_processed: usize,
    pub cancelled: bool,
}

impl std::fmt::Display for RunStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{} units processed", self.units_processed, self.total_units)?;
        if self.cancelled {
            write!(f, " (cancelled)")?;
        }
        Ok(())
    }
}

/// Drives the units of a [`RunPlan`] one at a time.
pub struct UnitOrchestrator {
    raw: Arc<dyn RawStore>,
    pipeline: Arc<dyn ReconstructionPipeline>,
    output: Arc<dyn OutputStore>,
    transforms: Arc<dyn ImageTransforms>,
    config: RunConfig,
    plan: RunPlan,
    metrics: Arc<Metrics>,
    cancel: CancellationFlag,
}

impl UnitOrchestrator {
    pub fn new(
        raw: Arc<dyn RawStore>,
        pipeline: Arc<dyn ReconstructionPipeline>,
        output: Arc<dyn OutputStore>,
        transforms: Arc<dyn ImageTransforms>,
        config: RunConfig,
        plan: RunPlan,
    ) -> Self {
        Self {
            raw,
            pipeline,
            output,
            transforms,
            config,
            plan,
            metrics: Metrics::new(),
            cancel: CancellationFlag::new(),
        }
    }

    /// Use an externally owned cancellation flag.
    pub fn with_cancellation(mut self, cancel: CancellationFlag) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn cancellation_flag(&self) -> CancellationFlag {
        self.cancel.clone()
    }

    pub fn metrics(&self) -> Arc<Metrics> {
        self.metrics.clone()
    }

    /// Process every unit in ascending (position, time) order.
    ///
    /// Processing parameters are resolved before anything is written, so a
    /// bad processing block aborts with the output store untouched. A failing
    /// unit stops the run; units written before it stay written.
    pub async fn run(&self) -> Result<RunStats> {
        let params = ProcessingParams::resolve(&self.config)
            .context("Invalid processing configuration")?;
        let record = self.config.to_record()?;

        tracing::info!(
            "Starting {} reconstruction: {}",
            self.pipeline.name(),
            self.plan.summary()
        );

        if let Some(plate) = &self.plan.plate {
            let entries = match serde_json::to_value(plate)? {
                Value::Object(map) => map,
                _ => anyhow::bail!("Plate metadata did not serialize to an object"),
            };
            self.output
                .merge_metadata(entries)
                .await
                .context("Failed to write plate metadata")?;
        }

        let reporter = if self.config.output.enable_metrics {
            let (tx, rx) = mpsc::channel(1);
            let reporter = MetricsReporter::new(
                self.metrics.clone(),
                REPORT_INTERVAL_SECS,
                self.plan.coordinates.len() as u64,
            );
            Some((tx, tokio::spawn(reporter.run(rx))))
        } else {
            None
        };

        let result = self.run_units(&params, &record).await;

        if let Some((tx, handle)) = reporter {
            let _ = tx.send(()).await;
            let _ = handle.await;
        }

        if let Some(path) = &self.config.output.metrics_output_path {
            if let Err(e) = self.metrics.snapshot().save_to_file(path) {
                tracing::warn!("Failed to save metrics to {}: {}", path, e);
            }
        }

        let stats = result?;
        tracing::info!("Reconstruction finished: {}", stats);
        Ok(stats)
    }

    async fn run_units(&self, params: &ProcessingParams, record: &Value) -> Result<RunStats> {
        let total_units = self.plan.coordinates.len();
        let mut initializer = ArrayInitializer::new();
        let mut units_processed = 0;
        let mut cancelled = false;

        for unit in self.plan.coordinates.iter() {
            if self.cancel.is_cancelled() {
                tracing::warn!("Run cancelled before {}", unit);
                cancelled = true;
                break;
            }

            let start = Instant::now();
            if let Err(e) = self.process_unit(unit, params, record, &mut initializer).await {
                self.metrics.add_failure();
                return Err(e.context(format!("Failed to reconstruct {}", unit)));
            }
            units_processed += 1;
            self.metrics.add_unit_processed();

            tracing::info!(
                "Finished reconstructing {} ({:.2} min)",
                unit,
                start.elapsed().as_secs_f64() / 60.0
            );
        }

        Ok(RunStats {
            total_units,
            units_processed,
            cancelled,
        })
    }

    async fn process_unit(
        &self,
        unit: Unit,
        params: &ProcessingParams,
        record: &Value,
        initializer: &mut ArrayInitializer,
    ) -> Result<()> {
        let slot = self
            .plan
            .index_map()
            .slot(unit.position)
            .with_context(|| format!("Position {} has no output slot", unit.position))?;

        // FetchRaw
        let stage_start = Instant::now();
        let raw = self
            .raw
            .read_volume(unit.position, unit.time)
            .await
            .with_context(|| stage_failed(UnitStage::FetchRaw))?;
        self.metrics.add_bytes_read(volume_bytes(raw.len()));
        self.metrics.add_fetch_time(stage_start.elapsed());

        let stage_start = Instant::now();
        let mut result = self.reconstruct(raw, params)?;
        self.metrics.add_reconstruct_time(stage_start.elapsed());

        // PostProcess
        let stage_start = Instant::now();
        self.post_process(&mut result, params)
            .with_context(|| stage_failed(UnitStage::PostProcess))?;
        self.metrics.add_post_process_time(stage_start.elapsed());

        // Write
        let stage_start = Instant::now();
        self.write(unit, slot, &result, record, initializer)
            .await
            .with_context(|| stage_failed(UnitStage::Write))?;
        self.metrics.add_write_time(stage_start.elapsed());

        tracing::debug!("{} reached stage {}", unit, UnitStage::Done);
        Ok(())
    }

    /// Stokes, pre-processing, birefringence and deconvolution.
    fn reconstruct(&self, raw: crate::io::Volume, params: &ProcessingParams) -> Result<UnitResult> {
        let mut result = UnitResult::new(raw);

        let stokes = self
            .pipeline
            .reconstruct_stokes_volume(&result.raw)
            .with_context(|| stage_failed(UnitStage::Stokes))?;

        result.stokes = match &params.pre_denoise {
            Some(denoise) => self
                .transforms
                .denoise_stokes(stokes, denoise)
                .with_context(|| stage_failed(UnitStage::PreProcess))?,
            None => stokes,
        };

        result.birefringence = self
            .pipeline
            .reconstruct_birefringence_volume(&result.stokes)
            .with_context(|| stage_failed(UnitStage::Birefringence))?;

        let deconvolved = self
            .pipeline
            .deconvolve_volume(&result.stokes)
            .with_context(|| stage_failed(UnitStage::Deconvolve))?;
        result.deconvolved_2d = deconvolved.two_d;
        result.deconvolved_3d = deconvolved.three_d;

        Ok(result)
    }

    fn post_process(&self, result: &mut UnitResult, params: &ProcessingParams) -> Result<()> {
        if let Some(denoise) = &params.post_denoise {
            denoise_outputs(result, denoise, self.transforms.as_ref())?;
        }

        if let Some(registration) = &params.registration {
            let stacks = register_channels(
                result,
                registration,
                self.pipeline.deconvolution_channels(),
                self.transforms.as_ref(),
            )?;
            result.registered = Some(stacks);
        }
        Ok(())
    }

    async fn write(
        &self,
        unit: Unit,
        slot: usize,
        result: &UnitResult,
        record: &Value,
        initializer: &mut ArrayInitializer,
    ) -> Result<()> {
        let spec = ArraySpec {
            shape: self.pipeline.data_shape(),
            chunks: self.pipeline.chunk_size(),
            channel_names: self.pipeline.output_channels(),
            position_name: if self.plan.plate.is_none() {
                Some(position_name(unit.position))
            } else {
                None
            },
        };
        initializer
            .ensure_array(self.output.as_ref(), slot, &spec)
            .await?;

        let volume = self.pipeline.assemble_output(result)?;
        let bytes = volume_bytes(volume.len());
        self.output.write_volume(slot, unit.time, volume).await?;
        self.metrics.add_bytes_written(bytes);

        let mut entries = Map::new();
        entries.insert("Config".to_string(), record.clone());
        self.output.merge_metadata(entries).await?;
        Ok(())
    }
}

fn stage_failed(stage: UnitStage) -> String {
    format!("{} stage failed", stage)
}

fn volume_bytes(elements: usize) -> u64 {
    (elements * std::mem::size_of::<f32>()) as u64
}
