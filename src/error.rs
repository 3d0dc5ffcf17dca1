//! Error types for configuration and orchestration failures.
//!
//! Everything here is fatal for the run: the offending field or value is named
//! and nothing is retried. Store and pipeline faults travel as `anyhow::Error`
//! and can carry a `ReconError` underneath, reachable with `downcast_ref`.

use thiserror::Error;

/// Coordinate axis a specification belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Axis {
    Position,
    Time,
}

impl std::fmt::Display for Axis {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Axis::Position => write!(f, "positions"),
            Axis::Time => write!(f, "timepoints"),
        }
    }
}

#[derive(Debug, Error)]
pub enum ReconError {
    /// A coordinate entry that is neither "all", an integer, a list nor a range.
    #[error("did not understand entry {entry} in config specified {axis}")]
    SpecFormat { axis: Axis, entry: String },

    /// A resolved index that does not exist in the raw data.
    #[error("{axis} index {index} is out of range (raw data has {size})")]
    IndexOutOfRange { axis: Axis, index: usize, size: usize },

    /// A processing block is enabled but a field it needs is absent.
    #[error("{phase} is enabled but {phase}.{field} is not set")]
    MissingRequiredField { phase: String, field: String },

    /// Two per-channel lists that must line up do not.
    #[error("{field} has {found} entries, expected {expected}")]
    LengthMismatch {
        field: String,
        expected: usize,
        found: usize,
    },

    /// A post-processing channel name that routes to no known buffer.
    #[error("unknown post-processing channel '{0}'")]
    UnknownChannel(String),

    /// A post-processing target the pipeline did not produce for this unit.
    #[error("channel '{channel}' targets {buffer}, which the pipeline did not produce")]
    MissingBuffer { channel: String, buffer: &'static str },

    /// A raw channel index beyond the acquired channel count.
    #[error("raw channel {index} requested, data has {count} channels")]
    ChannelOutOfRange { index: usize, count: usize },

    /// A plate well path that does not split into row and column.
    #[error("well path '{0}' is not of the form <row>/<column>")]
    MalformedWellPath(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_field_names_phase_and_field() {
        let err = ReconError::MissingRequiredField {
            phase: "registration".to_string(),
            field: "channel_idx".to_string(),
        };
        assert!(err.to_string().contains("registration.channel_idx"));
    }

    #[test]
    fn test_unknown_channel_display() {
        let err = ReconError::UnknownChannel("Foo".to_string());
        assert_eq!(err.to_string(), "unknown post-processing channel 'Foo'");
    }

    #[test]
    fn test_downcast_through_context() {
        use anyhow::Context;

        let result: anyhow::Result<()> =
            Err(ReconError::UnknownChannel("Foo".to_string())).context("unit (p=0, t=1)");
        let err = result.unwrap_err();
        assert!(matches!(
            err.downcast_ref::<ReconError>(),
            Some(ReconError::UnknownChannel(name)) if name == "Foo"
        ));
    }
}
