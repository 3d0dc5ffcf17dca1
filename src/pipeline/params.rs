//! Per-channel pre/post-processing parameters, resolved once per run.

use crate::config::{ChannelRef, DenoiseConfig, RegistrationConfig, RunConfig};
use crate::error::ReconError;

/// Threshold used when a channel's threshold is not configured.
pub const DEFAULT_THRESHOLD: f64 = 0.1;

/// Level used when a channel's level is not configured.
pub const DEFAULT_LEVEL: u32 = 1;

/// Denoise settings for one channel.
#[derive(Debug, Clone, PartialEq)]
pub struct DenoiseParams {
    pub channel: String,
    pub threshold: f64,
    pub level: u32,
}

/// Registration settings for one channel.
#[derive(Debug, Clone, PartialEq)]
pub struct RegistrationParams {
    pub channel: ChannelRef,

    /// `(z, y, x)` translation
    pub shift: Vec<f64>,
}

/// Resolved parameters for every processing phase.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProcessingParams {
    pub pre_denoise: Option<Vec<DenoiseParams>>,
    pub post_denoise: Option<Vec<DenoiseParams>>,
    pub registration: Option<Vec<RegistrationParams>>,
}

impl ProcessingParams {
    /// Resolve all phases of `config`.
    pub fn resolve(config: &RunConfig) -> Result<Self, ReconError> {
        let pre_denoise = resolve_pre(&config.pre_processing.denoise)?;
        let (post_denoise, registration) = resolve_post(
            &config.post_processing.denoise,
            &config.post_processing.registration,
        )?;

        Ok(Self {
            pre_denoise,
            post_denoise,
            registration,
        })
    }

    pub fn has_post_processing(&self) -> bool {
        self.post_denoise.is_some() || self.registration.is_some()
    }
}

/// Pre-processing denoise parameters, `None` when the phase is off.
pub fn resolve_pre(denoise: &DenoiseConfig) -> Result<Option<Vec<DenoiseParams>>, ReconError> {
    resolve_denoise("pre_processing.denoise", denoise)
}

/// Post-processing denoise and registration parameters.
#[allow(clippy::type_complexity)]
pub fn resolve_post(
    denoise: &DenoiseConfig,
    registration: &RegistrationConfig,
) -> Result<(Option<Vec<DenoiseParams>>, Option<Vec<RegistrationParams>>), ReconError> {
    let denoise = resolve_denoise("post_processing.denoise", denoise)?;
    let registration = resolve_registration(registration)?;
    Ok((denoise, registration))
}

fn resolve_denoise(phase: &str, cfg: &DenoiseConfig) -> Result<Option<Vec<DenoiseParams>>, ReconError> {
    if !cfg.enabled {
        return Ok(None);
    }

    let channels = cfg.channels.as_ref().ok_or_else(|| ReconError::MissingRequiredField {
        phase: phase.to_string(),
        field: "channels".to_string(),
    })?;

    let params = channels
        .iter()
        .enumerate()
        .map(|(i, channel)| DenoiseParams {
            channel: channel.clone(),
            threshold: element(&cfg.threshold, i).unwrap_or(DEFAULT_THRESHOLD),
            level: element(&cfg.level, i).unwrap_or(DEFAULT_LEVEL),
        })
        .collect();

    Ok(Some(params))
}

fn resolve_registration(cfg: &RegistrationConfig) -> Result<Option<Vec<RegistrationParams>>, ReconError> {
    if !cfg.enabled {
        return Ok(None);
    }

    let missing = |field: &str| ReconError::MissingRequiredField {
        phase: "registration".to_string(),
        field: field.to_string(),
    };
    let channels = cfg.channel_idx.as_ref().ok_or_else(|| missing("channel_idx"))?;
    let shifts = cfg.shift.as_ref().ok_or_else(|| missing("shift"))?;

    if shifts.len() < channels.len() {
        return Err(ReconError::LengthMismatch {
            field: "registration.shift".to_string(),
            expected: channels.len(),
            found: shifts.len(),
        });
    }

    Ok(Some(
        channels
            .iter()
            .zip(shifts)
            .map(|(channel, shift)| RegistrationParams {
                channel: channel.clone(),
                shift: shift.clone(),
            })
            .collect(),
    ))
}

/// Entry `i` of an optional per-channel list, if configured and not null.
fn element<T: Copy>(values: &Option<Vec<Option<T>>>, i: usize) -> Option<T> {
    values.as_ref().and_then(|v| v.get(i).copied().flatten())
}
