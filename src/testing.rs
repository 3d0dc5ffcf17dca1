//! In-memory stores, a scripted pipeline and recording transforms for tests.

use crate::index::PlateMetadata;
use crate::io::{ArraySpec, OutputStore, RawStore, Volume};
use crate::pipeline::{
    DeconvolutionChannels, Deconvolved, DenoiseParams, ReconstructionPipeline, UnitResult,
};
use crate::transform::ImageTransforms;
use anyhow::Result;
use async_trait::async_trait;
use ndarray::{Array3, Array4, ArrayView3};
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

/// Raw store whose volume at (p, t) is filled with `p * 100 + t`.
pub struct MemoryRawStore {
    positions: usize,
    frames: usize,
    channels: usize,
    plate: Option<PlateMetadata>,
    reads: Mutex<Vec<(usize, usize)>>,
}

impl MemoryRawStore {
    pub fn new(positions: usize, frames: usize, channels: usize) -> Self {
        Self {
            positions,
            frames,
            channels,
            plate: None,
            reads: Mutex::new(Vec::new()),
        }
    }

    pub fn with_plate(mut self, plate: PlateMetadata) -> Self {
        self.plate = Some(plate);
        self
    }

    /// Every (position, time) read, in call order.
    pub fn reads(&self) -> Vec<(usize, usize)> {
        self.reads.lock().unwrap().clone()
    }
}

#[async_trait]
impl RawStore for MemoryRawStore {
    fn num_positions(&self) -> usize {
        self.positions
    }

    fn num_frames(&self) -> usize {
        self.frames
    }

    fn plate_metadata(&self) -> Option<&PlateMetadata> {
        self.plate.as_ref()
    }

    async fn read_volume(&self, position: usize, time: usize) -> Result<Volume> {
        if position >= self.positions || time >= self.frames {
            anyhow::bail!("no data at P = {}, T = {}", position, time);
        }
        self.reads.lock().unwrap().push((position, time));
        Ok(Array4::from_elem(
            (self.channels, 1, 2, 2),
            (position * 100 + time) as f32,
        ))
    }
}

/// Output store held in memory.
#[derive(Default)]
pub struct MemoryOutputStore {
    arrays: Mutex<HashMap<usize, ArraySpec>>,
    writes: Mutex<Vec<(usize, usize, Volume)>>,
    metadata: Mutex<Map<String, Value>>,
    create_calls: AtomicUsize,
    create_failure: Mutex<Option<String>>,
}

impl MemoryOutputStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every later `create_array` fail with `message`.
    pub fn fail_creates(&self, message: &str) {
        *self.create_failure.lock().unwrap() = Some(message.to_string());
    }

    pub fn create_calls(&self) -> usize {
        self.create_calls.load(Ordering::SeqCst)
    }

    pub fn array_count(&self) -> usize {
        self.arrays.lock().unwrap().len()
    }

    pub fn array_spec(&self, slot: usize) -> Option<ArraySpec> {
        self.arrays.lock().unwrap().get(&slot).cloned()
    }

    /// (slot, time) of every write, in call order.
    pub fn writes(&self) -> Vec<(usize, usize)> {
        self.writes.lock().unwrap().iter().map(|(s, t, _)| (*s, *t)).collect()
    }

    pub fn written_volume(&self, slot: usize, time: usize) -> Option<Volume> {
        self.writes
            .lock()
            .unwrap()
            .iter()
            .rev()
            .find(|(s, t, _)| *s == slot && *t == time)
            .map(|(_, _, v)| v.clone())
    }

    pub fn metadata(&self) -> Map<String, Value> {
        self.metadata.lock().unwrap().clone()
    }
}

#[async_trait]
impl OutputStore for MemoryOutputStore {
    async fn array_exists(&self, slot: usize) -> Result<bool> {
        Ok(self.arrays.lock().unwrap().contains_key(&slot))
    }

    async fn create_array(&self, slot: usize, spec: &ArraySpec) -> Result<()> {
        self.create_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(message) = self.create_failure.lock().unwrap().clone() {
            anyhow::bail!(message);
        }
        let mut arrays = self.arrays.lock().unwrap();
        if arrays.contains_key(&slot) {
            anyhow::bail!("array {} already exists", slot);
        }
        arrays.insert(slot, spec.clone());
        Ok(())
    }

    async fn write_volume(&self, slot: usize, time: usize, volume: Volume) -> Result<()> {
        if !self.arrays.lock().unwrap().contains_key(&slot) {
            anyhow::bail!("array {} does not exist", slot);
        }
        self.writes.lock().unwrap().push((slot, time, volume));
        Ok(())
    }

    async fn merge_metadata(&self, entries: Map<String, Value>) -> Result<()> {
        self.metadata.lock().unwrap().extend(entries);
        Ok(())
    }
}

/// Pipeline with switchable capabilities that records what it was handed.
pub struct ScriptedPipeline {
    channels: usize,
    birefringence: bool,
    deconvolution: bool,
    channel_map: Option<DeconvolutionChannels>,
    fail_on_deconvolve: Option<usize>,
    deconvolve_calls: AtomicUsize,
    assembled: Mutex<Vec<UnitResult>>,
}

impl ScriptedPipeline {
    /// A stokes-only pipeline over `channels` raw channels.
    pub fn new(channels: usize) -> Self {
        Self {
            channels,
            birefringence: false,
            deconvolution: false,
            channel_map: None,
            fail_on_deconvolve: None,
            deconvolve_calls: AtomicUsize::new(0),
            assembled: Mutex::new(Vec::new()),
        }
    }

    /// Produce a birefringence triple from the stokes volume.
    pub fn with_birefringence(mut self) -> Self {
        self.birefringence = true;
        self
    }

    /// Produce 2D and 3D deconvolved volumes (stokes times 2 and 3).
    pub fn with_deconvolution(mut self, channel_map: Option<DeconvolutionChannels>) -> Self {
        self.deconvolution = true;
        self.channel_map = channel_map;
        self
    }

    /// Fail the n-th (0-based) deconvolution.
    pub fn failing_on_deconvolve(mut self, call: usize) -> Self {
        self.fail_on_deconvolve = Some(call);
        self
    }

    /// Every bundle handed to `assemble_output`, in call order.
    pub fn assembled(&self) -> Vec<UnitResult> {
        self.assembled.lock().unwrap().clone()
    }
}

impl ReconstructionPipeline for ScriptedPipeline {
    fn name(&self) -> &str {
        "scripted"
    }

    fn data_shape(&self) -> Vec<u64> {
        vec![3, self.channels as u64, 1, 2, 2]
    }

    fn chunk_size(&self) -> Vec<u64> {
        vec![1, 1, 1, 2, 2]
    }

    fn output_channels(&self) -> Vec<String> {
        (0..self.channels).map(|c| format!("Out{}", c)).collect()
    }

    fn reconstruct_stokes_volume(&self, raw: &Volume) -> Result<Volume> {
        Ok(raw + 1.0f32)
    }

    fn reconstruct_birefringence_volume(&self, stokes: &Volume) -> Result<Option<[Array3<f32>; 3]>> {
        if !self.birefringence {
            return Ok(None);
        }
        let stack = stokes.index_axis(ndarray::Axis(0), 0).to_owned();
        Ok(Some([stack.clone(), stack.clone(), stack]))
    }

    fn deconvolve_volume(&self, stokes: &Volume) -> Result<Deconvolved> {
        let call = self.deconvolve_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_on_deconvolve == Some(call) {
            anyhow::bail!("deconvolution diverged");
        }
        if !self.deconvolution {
            return Ok(Deconvolved::default());
        }
        Ok(Deconvolved {
            two_d: Some(stokes * 2.0f32),
            three_d: Some(stokes * 3.0f32),
        })
    }

    fn deconvolution_channels(&self) -> Option<&DeconvolutionChannels> {
        self.channel_map.as_ref()
    }

    fn assemble_output(&self, result: &UnitResult) -> Result<Volume> {
        self.assembled.lock().unwrap().push(result.clone());
        Ok(result.stokes.clone())
    }
}

/// Transforms that record their calls. `denoise` negates, `denoise_stokes`
/// adds 1000, `translate` copies.
#[derive(Default)]
pub struct RecordingTransforms {
    denoised: Mutex<Vec<String>>,
    translated: Mutex<Vec<Vec<f64>>>,
    stokes_calls: AtomicUsize,
}

impl RecordingTransforms {
    pub fn new() -> Self {
        Self::default()
    }

    /// Channel name of every `denoise` call.
    pub fn denoised(&self) -> Vec<String> {
        self.denoised.lock().unwrap().clone()
    }

    /// Shift of every `translate` call.
    pub fn translated(&self) -> Vec<Vec<f64>> {
        self.translated.lock().unwrap().clone()
    }

    pub fn stokes_calls(&self) -> usize {
        self.stokes_calls.load(Ordering::SeqCst)
    }
}

impl ImageTransforms for RecordingTransforms {
    fn denoise_stokes(&self, stokes: Volume, _params: &[DenoiseParams]) -> Result<Volume> {
        self.stokes_calls.fetch_add(1, Ordering::SeqCst);
        Ok(stokes + 1000.0f32)
    }

    fn denoise(&self, stack: ArrayView3<f32>, params: &DenoiseParams) -> Array3<f32> {
        self.denoised.lock().unwrap().push(params.channel.clone());
        stack.mapv(|v| -v)
    }

    fn translate(&self, stack: ArrayView3<f32>, shift: &[f64]) -> Array3<f32> {
        self.translated.lock().unwrap().push(shift.to_vec());
        stack.to_owned()
    }
}
