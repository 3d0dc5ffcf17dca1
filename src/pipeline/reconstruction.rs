//! The reconstruction pipeline a run drives, and the per-unit result bundle.

use crate::io::Volume;
use anyhow::Result;
use ndarray::Array3;
use std::collections::HashMap;

/// Which deconvolved volume registration addresses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeconvolutionMode {
    TwoD,
    ThreeD,
}

/// Named channels of a deconvolved volume.
#[derive(Debug, Clone, PartialEq)]
pub struct DeconvolutionChannels {
    /// Channel name to index within the deconvolved volume
    pub map: HashMap<String, usize>,
    pub mode: DeconvolutionMode,
}

/// Output of the deconvolution stage.
#[derive(Debug, Clone, Default)]
pub struct Deconvolved {
    pub two_d: Option<Volume>,
    pub three_d: Option<Volume>,
}

/// Everything computed for one unit, handed to the pipeline for output assembly.
#[derive(Debug, Clone)]
pub struct UnitResult {
    /// `(C, Z, Y, X)` as read from the raw store
    pub raw: Volume,

    /// Stokes volume, after pre-processing
    pub stokes: Volume,

    /// Retardance, orientation, brightfield; each `(C, Y, X)` or `(Z, Y, X)`
    pub birefringence: Option<[Array3<f32>; 3]>,

    pub deconvolved_2d: Option<Volume>,
    pub deconvolved_3d: Option<Volume>,

    /// Registered stacks, one per registration channel
    pub registered: Option<Vec<Array3<f32>>>,
}

impl UnitResult {
    /// Start a bundle from the raw volume.
    pub fn new(raw: Volume) -> Self {
        Self {
            stokes: raw.clone(),
            raw,
            birefringence: None,
            deconvolved_2d: None,
            deconvolved_3d: None,
            registered: None,
        }
    }
}

/// One reconstruction method.
///
/// Capabilities a method lacks keep the default: stokes passes the raw data
/// through, birefringence and deconvolution produce nothing, and there is no
/// deconvolution channel map.
pub trait ReconstructionPipeline: Send + Sync {
    fn name(&self) -> &str;

    /// Output array shape `(T, C, Z, Y, X)`.
    fn data_shape(&self) -> Vec<u64>;

    /// Output array chunking, same rank as `data_shape`.
    fn chunk_size(&self) -> Vec<u64>;

    /// Names of the output channels, in array order.
    fn output_channels(&self) -> Vec<String>;

    fn reconstruct_stokes_volume(&self, raw: &Volume) -> Result<Volume> {
        Ok(raw.clone())
    }

    fn reconstruct_birefringence_volume(&self, _stokes: &Volume) -> Result<Option<[Array3<f32>; 3]>> {
        Ok(None)
    }

    fn deconvolve_volume(&self, _stokes: &Volume) -> Result<Deconvolved> {
        Ok(Deconvolved::default())
    }

    fn deconvolution_channels(&self) -> Option<&DeconvolutionChannels> {
        None
    }

    /// Build the `(C, Z, Y, X)` output volume for the unit.
    fn assemble_output(&self, result: &UnitResult) -> Result<Volume>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Array4;

    struct Passthrough;

    impl ReconstructionPipeline for Passthrough {
        fn name(&self) -> &str {
            "passthrough"
        }

        fn data_shape(&self) -> Vec<u64> {
            vec![1, 1, 1, 2, 2]
        }

        fn chunk_size(&self) -> Vec<u64> {
            vec![1, 1, 1, 2, 2]
        }

        fn output_channels(&self) -> Vec<String> {
            vec!["Raw".to_string()]
        }

        fn assemble_output(&self, result: &UnitResult) -> Result<Volume> {
            Ok(result.stokes.clone())
        }
    }

    #[test]
    fn test_default_capabilities() {
        let pipeline = Passthrough;
        let raw = Array4::from_elem((1, 1, 2, 2), 4.0f32);

        assert_eq!(pipeline.reconstruct_stokes_volume(&raw).unwrap(), raw);
        assert!(pipeline.reconstruct_birefringence_volume(&raw).unwrap().is_none());

        let deconvolved = pipeline.deconvolve_volume(&raw).unwrap();
        assert!(deconvolved.two_d.is_none() && deconvolved.three_d.is_none());
        assert!(pipeline.deconvolution_channels().is_none());
    }

    #[test]
    fn test_unit_result_starts_from_raw() {
        let raw = Array4::from_elem((2, 1, 2, 2), 1.0f32);
        let result = UnitResult::new(raw.clone());
        assert_eq!(result.stokes, raw);
        assert!(result.birefringence.is_none());
        assert!(result.registered.is_none());
    }
}
