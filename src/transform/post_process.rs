//! Route post-processing parameters to the buffers they address.

use super::{ChannelKind, ImageTransforms};
use crate::config::ChannelRef;
use crate::error::ReconError;
use crate::io::Volume;
use crate::pipeline::{
    DeconvolutionChannels, DeconvolutionMode, DenoiseParams, RegistrationParams, UnitResult,
};
use anyhow::Result;
use ndarray::{Array3, Axis};

/// Denoise the produced buffers named by `params`, in place.
///
/// Each entry is applied to the unit's original buffer, so two entries that
/// route to the same buffer leave only the last one's result.
pub fn denoise_outputs(
    result: &mut UnitResult,
    params: &[DenoiseParams],
    transforms: &dyn ImageTransforms,
) -> Result<()> {
    let birefringence = result.birefringence.clone();
    let deconvolved_2d = result.deconvolved_2d.clone();
    let deconvolved_3d = result.deconvolved_3d.clone();

    for param in params {
        let kind = ChannelKind::from_channel_name(&param.channel)
            .ok_or_else(|| ReconError::UnknownChannel(param.channel.clone()))?;
        let missing = || ReconError::MissingBuffer {
            channel: param.channel.clone(),
            buffer: kind.buffer(),
        };

        match kind.birefringence_component() {
            Some(component) => {
                let source = birefringence.as_ref().ok_or_else(missing)?;
                let target = result.birefringence.as_mut().ok_or_else(missing)?;
                target[component] = transforms.denoise(source[component].view(), param);
            }
            None => {
                let (source, target) = if kind == ChannelKind::Phase2D {
                    (deconvolved_2d.as_ref(), &mut result.deconvolved_2d)
                } else {
                    (deconvolved_3d.as_ref(), &mut result.deconvolved_3d)
                };
                let source = source.ok_or_else(missing)?;
                *target = Some(denoise_volume(source, param, transforms));
            }
        }
        tracing::debug!("Denoised {} ({:?})", param.channel, kind);
    }
    Ok(())
}

/// Translate every registration channel, returning stacks in parameter order.
///
/// With a deconvolution channel map, a name in the map selects that channel of
/// the deconvolved volume for the map's mode. Otherwise the identifier must be
/// a raw channel index.
pub fn register_channels(
    result: &UnitResult,
    params: &[RegistrationParams],
    channels: Option<&DeconvolutionChannels>,
    transforms: &dyn ImageTransforms,
) -> Result<Vec<Array3<f32>>> {
    let mut stacks = Vec::with_capacity(params.len());

    for param in params {
        let deconvolved_index = match (&param.channel, channels) {
            (ChannelRef::Name(name), Some(channels)) => channels.map.get(name).map(|&i| (i, channels.mode)),
            _ => None,
        };

        let stack = match (deconvolved_index, &param.channel) {
            (Some((index, mode)), _) => {
                let (volume, buffer) = match mode {
                    DeconvolutionMode::ThreeD => (result.deconvolved_3d.as_ref(), "3D deconvolution"),
                    DeconvolutionMode::TwoD => (result.deconvolved_2d.as_ref(), "2D deconvolution"),
                };
                let volume = volume.ok_or_else(|| ReconError::MissingBuffer {
                    channel: param.channel.to_string(),
                    buffer,
                })?;
                channel_of(volume, index)?
            }
            (None, ChannelRef::Index(index)) => channel_of(&result.raw, *index)?,
            (None, ChannelRef::Name(name)) => {
                return Err(ReconError::UnknownChannel(name.clone()).into());
            }
        };

        stacks.push(transforms.translate(stack, &param.shift));
        tracing::debug!("Registered channel {} by {:?}", param.channel, param.shift);
    }

    Ok(stacks)
}

fn channel_of(volume: &Volume, index: usize) -> Result<ndarray::ArrayView3<'_, f32>, ReconError> {
    let count = volume.len_of(Axis(0));
    if index >= count {
        return Err(ReconError::ChannelOutOfRange { index, count });
    }
    Ok(volume.index_axis(Axis(0), index))
}

fn denoise_volume(volume: &Volume, param: &DenoiseParams, transforms: &dyn ImageTransforms) -> Volume {
    let mut out = volume.clone();
    for (mut target, source) in out.axis_iter_mut(Axis(0)).zip(volume.axis_iter(Axis(0))) {
        target.assign(&transforms.denoise(source, param));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::RecordingTransforms;
    use ndarray::{Array3, Array4};
    use std::collections::HashMap;

    fn denoise_param(channel: &str) -> DenoiseParams {
        DenoiseParams {
            channel: channel.to_string(),
            threshold: 0.1,
            level: 1,
        }
    }

    fn unit() -> UnitResult {
        let mut result = UnitResult::new(Array4::from_elem((2, 1, 2, 2), 1.0));
        result.birefringence = Some([
            Array3::from_elem((1, 2, 2), 10.0),
            Array3::from_elem((1, 2, 2), 20.0),
            Array3::from_elem((1, 2, 2), 30.0),
        ]);
        result.deconvolved_3d = Some(Array4::from_elem((2, 1, 2, 2), 5.0));
        result
    }

    #[test]
    fn test_denoise_routes_by_kind() {
        let transforms = RecordingTransforms::new();
        let mut result = unit();

        denoise_outputs(
            &mut result,
            &[denoise_param("Orientation"), denoise_param("Phase3D")],
            &transforms,
        )
        .unwrap();

        // RecordingTransforms::denoise negates
        let biref = result.birefringence.as_ref().unwrap();
        assert!(biref[0].iter().all(|&v| v == 10.0));
        assert!(biref[1].iter().all(|&v| v == -20.0));
        assert!(result.deconvolved_3d.as_ref().unwrap().iter().all(|&v| v == -5.0));
        assert_eq!(transforms.denoised(), vec!["Orientation", "Phase3D", "Phase3D"]);
    }

    #[test]
    fn test_denoise_unknown_channel() {
        let transforms = RecordingTransforms::new();
        let mut result = unit();
        let err = denoise_outputs(&mut result, &[denoise_param("Foo")], &transforms).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<ReconError>(),
            Some(ReconError::UnknownChannel(name)) if name == "Foo"
        ));
    }

    #[test]
    fn test_denoise_missing_buffer() {
        let transforms = RecordingTransforms::new();
        let mut result = unit();
        let err = denoise_outputs(&mut result, &[denoise_param("Phase2D")], &transforms).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<ReconError>(),
            Some(ReconError::MissingBuffer { buffer: "2D deconvolution", .. })
        ));
    }

    #[test]
    fn test_register_raw_index() {
        let transforms = RecordingTransforms::new();
        let mut result = unit();
        result.raw.index_axis_mut(Axis(0), 1).fill(7.0);

        let params = vec![RegistrationParams {
            channel: ChannelRef::Index(1),
            shift: vec![0.0, 1.0, 0.0],
        }];
        let stacks = register_channels(&result, &params, None, &transforms).unwrap();
        assert_eq!(stacks.len(), 1);
        assert!(stacks[0].iter().all(|&v| v == 7.0));
        assert_eq!(transforms.translated(), vec![vec![0.0, 1.0, 0.0]]);
    }

    #[test]
    fn test_register_deconvolved_by_name() {
        let transforms = RecordingTransforms::new();
        let mut result = unit();
        result
            .deconvolved_3d
            .as_mut()
            .unwrap()
            .index_axis_mut(Axis(0), 1)
            .fill(9.0);

        let channels = DeconvolutionChannels {
            map: HashMap::from([("GFP".to_string(), 0), ("mCherry".to_string(), 1)]),
            mode: DeconvolutionMode::ThreeD,
        };
        let params = vec![
            RegistrationParams { channel: ChannelRef::Name("mCherry".to_string()), shift: vec![0.0; 3] },
            RegistrationParams { channel: ChannelRef::Index(0), shift: vec![0.0; 3] },
        ];
        let stacks = register_channels(&result, &params, Some(&channels), &transforms).unwrap();
        assert!(stacks[0].iter().all(|&v| v == 9.0));
        assert!(stacks[1].iter().all(|&v| v == 1.0), "index falls back to raw data");
    }

    #[test]
    fn test_register_errors() {
        let transforms = RecordingTransforms::new();
        let result = unit();

        let unknown = vec![RegistrationParams { channel: ChannelRef::Name("GFP".to_string()), shift: vec![0.0; 3] }];
        let err = register_channels(&result, &unknown, None, &transforms).unwrap_err();
        assert!(matches!(err.downcast_ref::<ReconError>(), Some(ReconError::UnknownChannel(_))));

        let out_of_range = vec![RegistrationParams { channel: ChannelRef::Index(4), shift: vec![0.0; 3] }];
        let err = register_channels(&result, &out_of_range, None, &transforms).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<ReconError>(),
            Some(ReconError::ChannelOutOfRange { index: 4, count: 2 })
        ));

        let channels = DeconvolutionChannels {
            map: HashMap::from([("GFP".to_string(), 0)]),
            mode: DeconvolutionMode::TwoD,
        };
        let err = register_channels(&result, &unknown, Some(&channels), &transforms).unwrap_err();
        assert!(matches!(err.downcast_ref::<ReconError>(), Some(ReconError::MissingBuffer { .. })));
    }
}
