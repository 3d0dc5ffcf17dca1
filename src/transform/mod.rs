//! Image transforms applied around reconstruction: denoising and registration.
//!
//! The algorithms themselves live behind [`ImageTransforms`]; this module only
//! decides which buffer each configured channel addresses.

mod post_process;

pub use post_process::{denoise_outputs, register_channels};

use crate::io::Volume;
use crate::pipeline::DenoiseParams;
use anyhow::Result;
use ndarray::{Array3, ArrayView3};

/// Denoising and translation primitives.
pub trait ImageTransforms: Send + Sync {
    /// Denoise a stokes volume, one parameter set per stokes channel entry.
    fn denoise_stokes(&self, stokes: Volume, params: &[DenoiseParams]) -> Result<Volume>;

    /// Denoise one stack.
    fn denoise(&self, stack: ArrayView3<f32>, params: &DenoiseParams) -> Array3<f32>;

    /// Translate one stack by a `(z, y, x)` shift.
    fn translate(&self, stack: ArrayView3<f32>, shift: &[f64]) -> Array3<f32>;
}

/// Produced quantity a post-processing channel name refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelKind {
    Retardance,
    Orientation,
    Brightfield,
    Phase2D,
    Phase3D,
}

impl ChannelKind {
    /// Keywords in match precedence.
    const KEYWORDS: [(&'static str, ChannelKind); 5] = [
        ("Retardance", ChannelKind::Retardance),
        ("Orientation", ChannelKind::Orientation),
        ("Brightfield", ChannelKind::Brightfield),
        ("Phase2D", ChannelKind::Phase2D),
        ("Phase3D", ChannelKind::Phase3D),
    ];

    /// Classify a channel name by the first keyword it contains.
    pub fn from_channel_name(name: &str) -> Option<Self> {
        Self::KEYWORDS
            .iter()
            .find(|(keyword, _)| name.contains(keyword))
            .map(|&(_, kind)| kind)
    }

    /// Index into the birefringence triple, for the birefringence kinds.
    pub fn birefringence_component(self) -> Option<usize> {
        match self {
            ChannelKind::Retardance => Some(0),
            ChannelKind::Orientation => Some(1),
            ChannelKind::Brightfield => Some(2),
            ChannelKind::Phase2D | ChannelKind::Phase3D => None,
        }
    }

    /// Name of the buffer this kind lives in.
    pub fn buffer(self) -> &'static str {
        match self {
            ChannelKind::Retardance | ChannelKind::Orientation | ChannelKind::Brightfield => {
                "birefringence"
            }
            ChannelKind::Phase2D => "2D deconvolution",
            ChannelKind::Phase3D => "3D deconvolution",
        }
    }
}
