//! Configuration for a reconstruction run.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::PathBuf;

/// Main configuration for a reconstruction run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunConfig {
    /// Which data to read, where to write it, and how to reconstruct it
    pub dataset: DatasetConfig,

    /// Physical/optical and regularization parameters.
    /// Consumed by the reconstruction pipeline, recorded with the output.
    #[serde(default)]
    pub processing: BTreeMap<String, Value>,

    /// Transforms applied to the stokes volume before reconstruction
    #[serde(default)]
    pub pre_processing: PreProcessingConfig,

    /// Transforms applied to reconstructed volumes before writing
    #[serde(default)]
    pub post_processing: PostProcessingConfig,

    /// Output store options
    #[serde(default)]
    pub output: OutputConfig,
}

/// Reconstruction method.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Method {
    #[serde(rename = "QLIPP")]
    Qlipp,
    #[serde(rename = "PhaseFromBF")]
    PhaseFromBf,
    #[serde(rename = "FluorDeconv")]
    FluorDeconv,
}

impl std::fmt::Display for Method {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Method::Qlipp => write!(f, "QLIPP"),
            Method::PhaseFromBf => write!(f, "PhaseFromBF"),
            Method::FluorDeconv => write!(f, "FluorDeconv"),
        }
    }
}

/// Dataset section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatasetConfig {
    /// Raw data store (local path or s3:// URI)
    pub data_dir: String,

    /// Directory (local path or s3:// URI) the output store is created in
    pub save_dir: String,

    /// Name of the output store inside `save_dir`
    pub data_save_name: String,

    /// Reconstruction method
    pub method: Method,

    /// Reconstruction mode ("2D", "3D", "stokes")
    #[serde(default)]
    pub mode: Option<String>,

    /// Positions to reconstruct. Entries are "all", an index, a list of
    /// indices, or a half-open range (`{start, stop}` or `"a..b"`).
    #[serde(default = "default_all", deserialize_with = "one_or_many")]
    pub positions: Vec<Value>,

    /// Timepoints to reconstruct, same syntax as `positions`
    #[serde(default = "default_all", deserialize_with = "one_or_many")]
    pub timepoints: Vec<Value>,
}

impl DatasetConfig {
    /// Location of the output store: `save_dir/data_save_name.zarr`.
    pub fn output_location(&self) -> String {
        let name = if self.data_save_name.ends_with(".zarr") {
            self.data_save_name.clone()
        } else {
            format!("{}.zarr", self.data_save_name)
        };
        format!("{}/{}", self.save_dir.trim_end_matches('/'), name)
    }
}

/// Pre-processing section. Only denoising is supported.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PreProcessingConfig {
    #[serde(default)]
    pub denoise: DenoiseConfig,
}

/// Post-processing section.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PostProcessingConfig {
    #[serde(default)]
    pub denoise: DenoiseConfig,

    #[serde(default)]
    pub registration: RegistrationConfig,
}

/// Denoise block.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DenoiseConfig {
    #[serde(rename = "use", default)]
    pub enabled: bool,

    /// Channels to denoise
    #[serde(default)]
    pub channels: Option<Vec<String>>,

    /// Per-channel threshold; `null` entries fall back to 0.1
    #[serde(default)]
    pub threshold: Option<Vec<Option<f64>>>,

    /// Per-channel level; `null` entries fall back to 1
    #[serde(default)]
    pub level: Option<Vec<Option<u32>>>,
}

/// Channel a registration entry applies to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ChannelRef {
    /// Raw-data channel index
    Index(usize),

    /// Name of a channel produced by deconvolution
    Name(String),
}

impl std::fmt::Display for ChannelRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ChannelRef::Index(i) => write!(f, "{}", i),
            ChannelRef::Name(n) => write!(f, "{}", n),
        }
    }
}

/// Registration block.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RegistrationConfig {
    #[serde(rename = "use", default)]
    pub enabled: bool,

    /// Channels to register; a single entry may be given without a list
    #[serde(default, deserialize_with = "optional_one_or_many")]
    pub channel_idx: Option<Vec<ChannelRef>>,

    /// Shift vector for each channel, (z, y, x)
    #[serde(default)]
    pub shift: Option<Vec<Vec<f64>>>,
}

/// Output store options.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputConfig {
    /// Delete any existing output store before the run
    #[serde(default)]
    pub overwrite: bool,

    /// Compression level (0-22 for zstd)
    #[serde(default = "default_compression_level")]
    pub compression_level: i32,

    /// Log a metrics summary after the run
    #[serde(default = "default_true")]
    pub enable_metrics: bool,

    /// Optional path to save metrics JSON after run completes
    #[serde(default)]
    pub metrics_output_path: Option<String>,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            overwrite: false,
            compression_level: 3,
            enable_metrics: true,
            metrics_output_path: None,
        }
    }
}

impl RunConfig {
    /// Load configuration from a YAML or JSON file.
    /// Format is auto-detected from file extension (.yaml, .yml, or .json).
    pub fn from_file(path: &PathBuf) -> anyhow::Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("");

        let config: RunConfig = match ext {
            "json" => serde_json::from_str(&contents)?,
            // YAML is a superset of JSON
            _ => serde_yaml::from_str(&contents)?,
        };
        Ok(config)
    }

    /// Load configuration from a YAML string.
    pub fn from_yaml(yaml: &str) -> anyhow::Result<Self> {
        let config: RunConfig = serde_yaml::from_str(yaml)?;
        Ok(config)
    }

    /// Load configuration from a JSON string.
    pub fn from_json(json: &str) -> anyhow::Result<Self> {
        let config: RunConfig = serde_json::from_str(json)?;
        Ok(config)
    }

    /// Serialize configuration to YAML.
    pub fn to_yaml(&self) -> anyhow::Result<String> {
        Ok(serde_yaml::to_string(self)?)
    }

    /// The configuration as the JSON record stored with the output.
    pub fn to_record(&self) -> anyhow::Result<Value> {
        Ok(serde_json::to_value(self)?)
    }

    /// Validate the configuration.
    ///
    /// Coordinate entries and processing blocks are checked later, against
    /// the raw data and when parameters are resolved.
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.dataset.data_dir.is_empty() {
            anyhow::bail!("dataset.data_dir must be set");
        }
        if self.dataset.save_dir.is_empty() {
            anyhow::bail!("dataset.save_dir must be set");
        }
        if self.dataset.data_save_name.is_empty() {
            anyhow::bail!("dataset.data_save_name must be set");
        }
        if self.dataset.positions.is_empty() || self.dataset.timepoints.is_empty() {
            anyhow::bail!("dataset.positions and dataset.timepoints must not be empty");
        }

        let mode = self.dataset.mode.as_deref();
        match (self.dataset.method, mode) {
            (Method::FluorDeconv, Some("2D" | "3D")) => {}
            (Method::FluorDeconv, other) => {
                anyhow::bail!("FluorDeconv requires mode \"2D\" or \"3D\", got {:?}", other);
            }
            (_, None | Some("2D" | "3D" | "stokes")) => {}
            (_, Some(other)) => anyhow::bail!("Unknown mode \"{}\"", other),
        }

        if self.output.compression_level < 0 || self.output.compression_level > 22 {
            anyhow::bail!("Compression level must be 0-22 for zstd");
        }
        Ok(())
    }
}

/// Accept either a single entry or a list of entries.
fn one_or_many<'de, D>(deserializer: D) -> Result<Vec<Value>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Value::deserialize(deserializer)? {
        Value::Array(items) => items,
        other => vec![other],
    })
}

fn optional_one_or_many<'de, D>(deserializer: D) -> Result<Option<Vec<ChannelRef>>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum OneOrMany {
        One(ChannelRef),
        Many(Vec<ChannelRef>),
    }

    Ok(Option::<OneOrMany>::deserialize(deserializer)?.map(|v| match v {
        OneOrMany::One(c) => vec![c],
        OneOrMany::Many(cs) => cs,
    }))
}

// Default value functions for serde
fn default_all() -> Vec<Value> { vec![Value::String("all".to_string())] }
fn default_compression_level() -> i32 { 3 }
fn default_true() -> bool { true }

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const SAMPLE: &str = r#"
dataset:
  data_dir: /data/raw.zarr
  save_dir: /data/out
  data_save_name: recon
  method: QLIPP
  mode: 3D
  positions: [0, {start: 2, stop: 5}]
  timepoints: all

processing:
  wavelength: 532
  output_channels: [Retardance, Orientation, Phase3D]

post_processing:
  denoise:
    use: true
    channels: [Retardance, Phase3D]
    threshold: [0.2, null]
  registration:
    use: true
    channel_idx: 1
    shift: [[0, 2, -3]]
"#;

    #[test]
    fn test_parse_sample_config() {
        let config = RunConfig::from_yaml(SAMPLE).unwrap();

        assert_eq!(config.dataset.method, Method::Qlipp);
        assert_eq!(config.dataset.mode.as_deref(), Some("3D"));
        assert_eq!(config.dataset.positions, vec![json!(0), json!({"start": 2, "stop": 5})]);
        assert_eq!(config.dataset.timepoints, vec![json!("all")]);
        assert_eq!(config.processing["wavelength"], json!(532));

        let denoise = &config.post_processing.denoise;
        assert!(denoise.enabled);
        assert_eq!(denoise.threshold, Some(vec![Some(0.2), None]));
        assert!(denoise.level.is_none());

        let registration = &config.post_processing.registration;
        assert_eq!(registration.channel_idx, Some(vec![ChannelRef::Index(1)]));
        assert_eq!(registration.shift, Some(vec![vec![0.0, 2.0, -3.0]]));

        assert!(!config.pre_processing.denoise.enabled);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_defaults() {
        let config = RunConfig::from_json(
            r#"{"dataset": {"data_dir": "a", "save_dir": "b", "data_save_name": "c", "method": "PhaseFromBF"}}"#,
        )
        .unwrap();

        assert_eq!(config.dataset.positions, vec![json!("all")]);
        assert_eq!(config.dataset.timepoints, vec![json!("all")]);
        assert_eq!(config.output.compression_level, 3);
        assert!(config.output.enable_metrics);
        assert!(!config.output.overwrite);
        assert!(!config.post_processing.registration.enabled);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_scalar_and_list_entries() {
        let config = RunConfig::from_yaml(
            "dataset: {data_dir: a, save_dir: b, data_save_name: c, method: QLIPP, positions: 4, timepoints: [1, [3, 5]]}",
        )
        .unwrap();
        assert_eq!(config.dataset.positions, vec![json!(4)]);
        assert_eq!(config.dataset.timepoints, vec![json!(1), json!([3, 5])]);
    }

    #[test]
    fn test_mixed_channel_refs() {
        let config = RunConfig::from_yaml(
            r#"
dataset: {data_dir: a, save_dir: b, data_save_name: c, method: FluorDeconv, mode: 2D}
post_processing:
  registration: {use: true, channel_idx: [GFP, 2], shift: [[0, 1, 1], [0, -1, 0]]}
"#,
        )
        .unwrap();
        assert_eq!(
            config.post_processing.registration.channel_idx,
            Some(vec![ChannelRef::Name("GFP".to_string()), ChannelRef::Index(2)])
        );
    }

    #[test]
    fn test_validation_mode() {
        let mut config = RunConfig::from_yaml(SAMPLE).unwrap();
        config.dataset.method = Method::FluorDeconv;
        config.dataset.mode = Some("stokes".to_string());
        assert!(config.validate().is_err());

        config.dataset.method = Method::Qlipp;
        config.dataset.mode = Some("4D".to_string());
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validation_compression_level() {
        let mut config = RunConfig::from_yaml(SAMPLE).unwrap();
        config.output.compression_level = 23;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_output_location() {
        let mut config = RunConfig::from_yaml(SAMPLE).unwrap();
        assert_eq!(config.dataset.output_location(), "/data/out/recon.zarr");

        config.dataset.save_dir = "s3://bucket/runs/".to_string();
        config.dataset.data_save_name = "recon.zarr".to_string();
        assert_eq!(config.dataset.output_location(), "s3://bucket/runs/recon.zarr");
    }

    #[test]
    fn test_yaml_round_trip() {
        let config = RunConfig::from_yaml(SAMPLE).unwrap();
        let yaml = config.to_yaml().unwrap();
        let again = RunConfig::from_yaml(&yaml).unwrap();
        assert_eq!(again.dataset.positions, config.dataset.positions);
        assert_eq!(again.post_processing.registration.shift, config.post_processing.registration.shift);
    }
}
