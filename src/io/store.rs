//! Object store configuration for S3 and local filesystem access.

use anyhow::{Context, Result};
use object_store::aws::AmazonS3Builder;
use object_store::local::LocalFileSystem;
use object_store::{ClientOptions, ObjectStore, RetryConfig};
use std::sync::Arc;
use std::time::Duration;

/// Parse an S3 URI into bucket and key components.
///
/// Accepts URIs in the format `s3://bucket/key/path`.
///
/// # Errors
/// Returns an error if the URI is malformed (missing scheme, bucket, or key).
pub fn parse_s3_uri(uri: &str) -> Result<(&str, &str)> {
    let without_scheme = uri
        .strip_prefix("s3://")
        .with_context(|| format!("Invalid S3 URI: expected 's3://' prefix in '{}'", uri))?;

    without_scheme
        .split_once('/')
        .with_context(|| format!("Invalid S3 URI: expected 's3://bucket/key' format in '{}'", uri))
}

/// An object store plus the key prefix a Zarr hierarchy lives under.
#[derive(Debug, Clone)]
pub struct StoreLocation {
    pub store: Arc<dyn ObjectStore>,

    /// Empty for local stores, where the path is the store root.
    pub prefix: String,
}

fn create_client_options() -> ClientOptions {
    ClientOptions::new()
        .with_connect_timeout(Duration::from_secs(5))
        // Volumes are large; allow slow writes
        .with_timeout(Duration::from_secs(300))
        .with_pool_idle_timeout(Duration::from_secs(90))
}

/// Create retry configuration for transient failures.
fn create_retry_config() -> RetryConfig {
    RetryConfig {
        max_retries: 5,
        backoff: object_store::BackoffConfig {
            init_backoff: Duration::from_millis(100),
            max_backoff: Duration::from_secs(10),
            base: 2.0,
        },
        retry_timeout: Duration::from_secs(120),
    }
}

/// Create an authenticated S3 client.
///
/// Credentials and region are loaded from (in order):
/// - Environment variables (AWS_ACCESS_KEY_ID, AWS_SECRET_ACCESS_KEY, AWS_REGION)
/// - AWS config files (~/.aws/credentials, ~/.aws/config)
/// - EC2 instance profile (IMDS)
fn create_s3_store(bucket: &str) -> Result<Arc<dyn ObjectStore>> {
    tracing::info!("Creating S3 client for bucket: {}", bucket);

    let builder = AmazonS3Builder::from_env()
        .with_bucket_name(bucket)
        .with_client_options(create_client_options())
        .with_retry(create_retry_config());

    Ok(Arc::new(builder.build()?))
}

/// Open a local path or `s3://bucket/prefix` URI.
///
/// With `create`, a missing local directory is created; otherwise it is an error.
pub fn open_location(location: &str, create: bool) -> Result<StoreLocation> {
    if location.starts_with("s3://") {
        let (bucket, key) = parse_s3_uri(location)?;
        return Ok(StoreLocation {
            store: create_s3_store(bucket)?,
            prefix: key.trim_end_matches('/').to_string(),
        });
    }

    let path = std::path::Path::new(location);
    if !path.exists() {
        if create {
            std::fs::create_dir_all(path)
                .with_context(|| format!("Failed to create {}", path.display()))?;
        } else {
            anyhow::bail!("{} does not exist", path.display());
        }
    }
    tracing::debug!("Creating LocalFileSystem store at: {}", path.display());
    Ok(StoreLocation {
        store: Arc::new(LocalFileSystem::new_with_prefix(path)?),
        prefix: String::new(),
    })
}
