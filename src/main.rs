//! recon-runner CLI
//!
//! Validates run configurations and shows which units a run would reconstruct.

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use recon_runner::{build_runtime, open_raw_store, RawStore, RunConfig, RunPlan};

#[derive(Parser)]
#[command(name = "recon-runner")]
#[command(about = "Plan and validate microscopy reconstruction runs", long_about = None)]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = "config.yaml", global = true)]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Validate configuration, including processing parameters
    Validate,

    /// Resolve positions and timepoints against the raw data
    Plan {
        /// List every unit, not just the summary
        #[arg(long)]
        units: bool,
    },

    /// Generate a sample configuration file
    GenerateConfig {
        /// Output path for configuration file
        #[arg(short, long, default_value = "config.yaml")]
        output: PathBuf,
    },
}

fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::from_default_env().add_directive(tracing::Level::INFO.into()))
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Validate => validate_command(cli.config)?,
        Commands::Plan { units } => plan_command(cli.config, units)?,
        Commands::GenerateConfig { output } => generate_config_command(output)?,
    }

    Ok(())
}

fn validate_command(config_path: PathBuf) -> Result<()> {
    let config = RunConfig::from_file(&config_path)?;
    config.validate()?;
    recon_runner::pipeline::ProcessingParams::resolve(&config)?;
    println!("Configuration is valid");
    Ok(())
}

fn plan_command(config_path: PathBuf, list_units: bool) -> Result<()> {
    let config = RunConfig::from_file(&config_path)?;
    config.validate()?;

    let runtime = build_runtime(None)?;
    runtime.block_on(async {
        let raw = open_raw_store(&config).await?;
        let plan = RunPlan::build(&config, &raw)?;

        println!("\n=== Run Plan ===");
        println!("Raw data: {} positions, {} timepoints", raw.num_positions(), raw.num_frames());
        println!("Method: {}", config.dataset.method);
        println!("Output: {}", config.dataset.output_location());
        println!("Selected: {}", plan.summary());

        println!("\n--- Position slots ---");
        for (raw_position, slot) in plan.index_map().iter() {
            println!("P = {:>4} -> slot {}", raw_position, slot);
        }

        if let Some(plate) = &plan.plate {
            println!("\n--- Plate ---");
            let rows: Vec<&str> = plate.plate.rows.iter().map(|r| r.name.as_str()).collect();
            let columns: Vec<&str> = plate.plate.columns.iter().map(|c| c.name.as_str()).collect();
            println!("Rows: {}", rows.join(", "));
            println!("Columns: {}", columns.join(", "));
            println!("Wells: {}", plate.plate.wells.len());
        }

        if list_units {
            println!("\n--- Units ---");
            for unit in plan.coordinates.iter() {
                println!("{}", unit);
            }
        }
        println!("================\n");

        Ok(())
    })
}

fn generate_config_command(output: PathBuf) -> Result<()> {
    let yaml = r#"# Reconstruction run configuration

# === DATASET: What to reconstruct and where to put it ===
dataset:
  # Raw Zarr store (local path or s3://bucket/prefix)
  data_dir: "/data/raw.zarr"

  # Output goes to <save_dir>/<data_save_name>.zarr
  save_dir: "/data/reconstructed"
  data_save_name: "recon"

  # QLIPP, PhaseFromBF or FluorDeconv
  method: "QLIPP"

  # 2D, 3D or stokes (FluorDeconv requires 2D or 3D)
  mode: "3D"

  # Each entry: "all", an index, a list of indices, {start, stop} or "a..b"
  # Slots in the output follow first appearance here
  positions: ["all"]
  timepoints: [0, {start: 2, stop: 5}]

# === PROCESSING: Physical parameters, passed to the pipeline and recorded ===
processing:
  wavelength: 532
  output_channels: ["Retardance", "Orientation", "Phase3D"]

# === PRE-PROCESSING: Applied to the stokes volume ===
pre_processing:
  denoise:
    use: false
    channels: ["S0", "S1", "S2", "S3"]
    # Per channel; null or missing entries default to 0.1 and 1
    threshold: [0.1, 0.1, 0.1, 0.1]
    level: [1, 1, 1, 1]

# === POST-PROCESSING: Applied to reconstructed outputs ===
post_processing:
  denoise:
    use: false
    # Names route by keyword: Retardance, Orientation, Brightfield, Phase2D, Phase3D
    channels: ["Retardance", "Phase3D"]
    threshold: [0.1, null]
    level: [null, 2]

  registration:
    use: false
    # Raw channel indices, or deconvolved channel names (FluorDeconv)
    channel_idx: [0]
    # One (z, y, x) shift per channel
    shift: [[0, 0, 0]]

# === OUTPUT ===
output:
  # Delete an existing output store before the run
  overwrite: false

  # Zstd compression level (0-22)
  compression_level: 3

  # Log progress while running
  enable_metrics: true

  # Optional JSON metrics dump
  # metrics_output_path: "metrics.json"
"#;

    std::fs::write(&output, yaml)?;
    println!("Generated sample configuration at: {}", output.display());

    Ok(())
}
