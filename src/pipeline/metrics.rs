//! Run progress and per-stage timing.

use serde::{Serialize, Serializer};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tokio::time::interval;

fn serialize_duration<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    serializer.serialize_f64(duration.as_secs_f64())
}

/// Counters for one reconstruction run.
#[derive(Debug, Default)]
pub struct Metrics {
    /// Bytes of raw volume data read
    pub bytes_read: AtomicU64,

    /// Bytes of output volume data written
    pub bytes_written: AtomicU64,

    /// Units written to the output store
    pub units_processed: AtomicU64,

    /// Units that failed (the run stops at the first)
    pub failures: AtomicU64,

    start_time: Option<Instant>,

    // Per-stage timing, microseconds
    pub fetch_us: AtomicU64,
    pub reconstruct_us: AtomicU64,
    pub post_process_us: AtomicU64,
    pub write_us: AtomicU64,
}

impl Metrics {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            start_time: Some(Instant::now()),
            ..Default::default()
        })
    }

    pub fn add_bytes_read(&self, bytes: u64) {
        self.bytes_read.fetch_add(bytes, Ordering::Relaxed);
    }

    pub fn add_bytes_written(&self, bytes: u64) {
        self.bytes_written.fetch_add(bytes, Ordering::Relaxed);
    }

    pub fn add_unit_processed(&self) {
        self.units_processed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn add_failure(&self) {
        self.failures.fetch_add(1, Ordering::Relaxed);
    }

    /// Time spent reading raw volumes.
    pub fn add_fetch_time(&self, duration: Duration) {
        self.fetch_us.fetch_add(duration.as_micros() as u64, Ordering::Relaxed);
    }

    /// Time spent in the pipeline (stokes, pre-processing, birefringence, deconvolution).
    pub fn add_reconstruct_time(&self, duration: Duration) {
        self.reconstruct_us.fetch_add(duration.as_micros() as u64, Ordering::Relaxed);
    }

    pub fn add_post_process_time(&self, duration: Duration) {
        self.post_process_us.fetch_add(duration.as_micros() as u64, Ordering::Relaxed);
    }

    /// Time spent provisioning arrays, writing volumes and merging metadata.
    pub fn add_write_time(&self, duration: Duration) {
        self.write_us.fetch_add(duration.as_micros() as u64, Ordering::Relaxed);
    }

    pub fn elapsed(&self) -> Duration {
        self.start_time.map_or(Duration::ZERO, |t| t.elapsed())
    }

    pub fn units_per_second(&self) -> f64 {
        let units = self.units_processed.load(Ordering::Relaxed);
        let elapsed = self.elapsed().as_secs_f64();
        if elapsed > 0.0 {
            units as f64 / elapsed
        } else {
            0.0
        }
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            bytes_read: self.bytes_read.load(Ordering::Relaxed),
            bytes_written: self.bytes_written.load(Ordering::Relaxed),
            units_processed: self.units_processed.load(Ordering::Relaxed),
            failures: self.failures.load(Ordering::Relaxed),
            elapsed: self.elapsed(),
            units_per_second: self.units_per_second(),
            fetch_secs: self.fetch_us.load(Ordering::Relaxed) as f64 / 1_000_000.0,
            reconstruct_secs: self.reconstruct_us.load(Ordering::Relaxed) as f64 / 1_000_000.0,
            post_process_secs: self.post_process_us.load(Ordering::Relaxed) as f64 / 1_000_000.0,
            write_secs: self.write_us.load(Ordering::Relaxed) as f64 / 1_000_000.0,
        }
    }
}

/// Snapshot of metrics at a point in time.
#[derive(Debug, Clone, Serialize)]
pub struct MetricsSnapshot {
    pub bytes_read: u64,
    pub bytes_written: u64,
    pub units_processed: u64,
    pub failures: u64,
    #[serde(serialize_with = "serialize_duration")]
    pub elapsed: Duration,
    pub units_per_second: f64,
    pub fetch_secs: f64,
    pub reconstruct_secs: f64,
    pub post_process_secs: f64,
    pub write_secs: f64,
}

impl MetricsSnapshot {
    /// Save metrics to a JSON file.
    pub fn save_to_file(&self, path: &str) -> anyhow::Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        tracing::info!("Metrics saved to {}", path);
        Ok(())
    }

    /// Share of stage time spent in fetch, reconstruct, post-process and write, in percent.
    fn stage_percentages(&self) -> [f64; 4] {
        let stages = [
            self.fetch_secs,
            self.reconstruct_secs,
            self.post_process_secs,
            self.write_secs,
        ];
        let total: f64 = stages.iter().sum();
        if total > 0.0 {
            stages.map(|s| s / total * 100.0)
        } else {
            [0.0; 4]
        }
    }
}

impl std::fmt::Display for MetricsSnapshot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let [fetch_pct, recon_pct, post_pct, write_pct] = self.stage_percentages();

        write!(
            f,
            "Units: {} processed | Read: {:.2} MB | Write: {:.2} MB | \
             Rate: {:.2} units/s | Failures: {} | Elapsed: {:.1}s | \
             Time: fetch {:.0}% | recon {:.0}% | post {:.0}% | write {:.0}%",
            self.units_processed,
            self.bytes_read as f64 / (1024.0 * 1024.0),
            self.bytes_written as f64 / (1024.0 * 1024.0),
            self.units_per_second,
            self.failures,
            self.elapsed.as_secs_f64(),
            fetch_pct,
            recon_pct,
            post_pct,
            write_pct,
        )
    }
}

/// Periodic progress reporter.
pub struct MetricsReporter {
    metrics: Arc<Metrics>,
    interval_secs: u64,
    total_units: u64,
}

impl MetricsReporter {
    pub fn new(metrics: Arc<Metrics>, interval_secs: u64, total_units: u64) -> Self {
        Self {
            metrics,
            interval_secs,
            total_units,
        }
    }

    /// Log progress every interval until `shutdown` fires.
    pub async fn run(self, mut shutdown: mpsc::Receiver<()>) {
        let mut ticker = interval(Duration::from_secs(self.interval_secs.max(1)));
        // First tick completes immediately
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let snapshot = self.metrics.snapshot();
                    let progress = if self.total_units > 0 {
                        snapshot.units_processed as f64 / self.total_units as f64 * 100.0
                    } else {
                        0.0
                    };
                    tracing::info!("[{:.1}%] {}", progress, snapshot);
                }
                _ = shutdown.recv() => {
                    tracing::info!("Final: {}", self.metrics.snapshot());
                    break;
                }
            }
        }
    }
}
