//! Configuration management for the variant store.
//!
//! This module provides a flexible configuration system that supports:
//! - Command-line arguments via clap
//! - Environment variables with `VARIANT_` prefix
//! - Sensible defaults for all optional settings
//!
//! # Environment Variables
//!
//! - `VARIANT_HOST` - Server bind address (default: 0.0.0.0)
//! - `VARIANT_PORT` - Server port (default: 3000)
//! - `VARIANT_S3_BUCKET` - S3 bucket name (required unless `--in-memory`)
//! - `VARIANT_S3_ENDPOINT` - Custom S3 endpoint for S3-compatible services
//! - `VARIANT_S3_REGION` - AWS region (default: us-east-1)
//! - `VARIANT_PUBLIC_BASE_URL` - Base of the URLs handed back to clients
//! - `VARIANT_SUPPORTED_EXTENSIONS` - Upload allow-list (default: jpg,jpeg,png,gif,webp,bmp)
//! - `VARIANT_MAX_IMAGE_SIZE_BYTES` - Upload size limit (default: 10 MiB)
//! - `VARIANT_THUMBNAIL_HEIGHT` - Thumbnail height (default: 160)
//! - `VARIANT_UPLOAD_PART_SIZE` - Multipart upload part size (default: 8 MiB)
//! - `VARIANT_UPLOAD_CONCURRENCY` - Parts uploaded in parallel (default: 4)
//! - `VARIANT_REQUEST_TIMEOUT` - Per-request budget in seconds (default: 30)
//! - `VARIANT_CORS_ORIGINS` - Allowed CORS origins (default: any)

use std::time::Duration;

use clap::{Args, Parser, Subcommand};

use crate::store::{DEFAULT_UPLOAD_CONCURRENCY, DEFAULT_UPLOAD_PART_SIZE, MIN_UPLOAD_PART_SIZE};
use crate::variant::{
    EngineConfig, DEFAULT_MAX_IMAGE_SIZE_BYTES, DEFAULT_SUPPORTED_EXTENSIONS,
    DEFAULT_THUMBNAIL_HEIGHT,
};

// =============================================================================
// Default Values
// =============================================================================

/// Default server host.
pub const DEFAULT_HOST: &str = "0.0.0.0";

/// Default server port.
pub const DEFAULT_PORT: u16 = 3000;

/// Default AWS region.
pub const DEFAULT_REGION: &str = "us-east-1";

/// Default per-request timeout in seconds.
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;

// =============================================================================
// CLI Arguments
// =============================================================================

/// Variant Store - on-demand image variants over S3.
///
/// Stores uploaded originals in S3 or S3-compatible storage and produces
/// height-resized variants the first time they are requested.
#[derive(Parser, Debug, Clone)]
#[command(name = "variant-store")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

impl Cli {
    pub fn into_command(self) -> Command {
        self.command
    }
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Start the HTTP server
    Serve(ServeConfig),

    /// Check storage connectivity and inspect stored images
    Check(CheckConfig),
}

/// Options for the `serve` command.
#[derive(Args, Debug, Clone)]
pub struct ServeConfig {
    // =========================================================================
    // Server Configuration
    // =========================================================================
    /// Host address to bind the server to.
    #[arg(long, default_value = DEFAULT_HOST, env = "VARIANT_HOST")]
    pub host: String,

    /// Port to listen on.
    #[arg(short, long, default_value_t = DEFAULT_PORT, env = "VARIANT_PORT")]
    pub port: u16,

    /// Seconds a request may run before its work is cancelled.
    #[arg(long, default_value_t = DEFAULT_REQUEST_TIMEOUT_SECS, env = "VARIANT_REQUEST_TIMEOUT")]
    pub request_timeout: u64,

    // =========================================================================
    // S3 Configuration
    // =========================================================================
    /// S3 bucket holding originals and variants.
    #[arg(long, env = "VARIANT_S3_BUCKET")]
    pub s3_bucket: Option<String>,

    /// Custom S3 endpoint URL for S3-compatible services (MinIO, etc.).
    #[arg(long, env = "VARIANT_S3_ENDPOINT")]
    pub s3_endpoint: Option<String>,

    /// AWS region for S3.
    #[arg(long, default_value = DEFAULT_REGION, env = "VARIANT_S3_REGION")]
    pub s3_region: String,

    /// Base URL prepended to object keys in responses.
    ///
    /// Defaults to the bucket's S3 URL.
    #[arg(long, env = "VARIANT_PUBLIC_BASE_URL")]
    pub public_base_url: Option<String>,

    /// Multipart upload part size in bytes (at least 5 MiB).
    #[arg(long, default_value_t = DEFAULT_UPLOAD_PART_SIZE, env = "VARIANT_UPLOAD_PART_SIZE")]
    pub upload_part_size: usize,

    /// Number of multipart upload parts sent in parallel.
    #[arg(long, default_value_t = DEFAULT_UPLOAD_CONCURRENCY, env = "VARIANT_UPLOAD_CONCURRENCY")]
    pub upload_concurrency: usize,

    /// Keep everything in process memory instead of S3 (development only).
    #[arg(long, default_value_t = false)]
    pub in_memory: bool,

    // =========================================================================
    // Image Configuration
    // =========================================================================
    /// Accepted upload extensions (comma-separated).
    #[arg(
        long,
        env = "VARIANT_SUPPORTED_EXTENSIONS",
        value_delimiter = ',',
        default_values_t = DEFAULT_SUPPORTED_EXTENSIONS.iter().map(|e| e.to_string())
    )]
    pub supported_extensions: Vec<String>,

    /// Largest accepted upload in bytes.
    #[arg(long, default_value_t = DEFAULT_MAX_IMAGE_SIZE_BYTES, env = "VARIANT_MAX_IMAGE_SIZE_BYTES")]
    pub max_image_size_bytes: u64,

    /// Height of the thumbnail variant in pixels.
    #[arg(long, default_value_t = DEFAULT_THUMBNAIL_HEIGHT, env = "VARIANT_THUMBNAIL_HEIGHT")]
    pub thumbnail_height: u32,

    // =========================================================================
    // CORS Configuration
    // =========================================================================
    /// Allowed CORS origins (comma-separated).
    ///
    /// If not specified, allows any origin.
    #[arg(long, env = "VARIANT_CORS_ORIGINS", value_delimiter = ',')]
    pub cors_origins: Option<Vec<String>>,

    // =========================================================================
    // Logging Configuration
    // =========================================================================
    /// Enable verbose logging (debug level).
    #[arg(short, long, default_value_t = false)]
    pub verbose: bool,

    /// Disable request tracing.
    #[arg(long, default_value_t = false)]
    pub no_tracing: bool,
}

impl ServeConfig {
    /// Validate the configuration and return an error message if invalid.
    pub fn validate(&self) -> Result<(), String> {
        if !self.in_memory && self.bucket().is_none() {
            return Err(
                "S3 bucket name is required. Set --s3-bucket or VARIANT_S3_BUCKET, \
                 or run with --in-memory"
                    .to_string(),
            );
        }

        if self.engine_config().supported_extensions.is_empty() {
            return Err("supported_extensions must list at least one extension".to_string());
        }

        if self.max_image_size_bytes == 0 {
            return Err("max_image_size_bytes must be greater than 0".to_string());
        }
        if self.thumbnail_height == 0 {
            return Err("thumbnail_height must be greater than 0".to_string());
        }
        if self.request_timeout == 0 {
            return Err("request_timeout must be greater than 0".to_string());
        }
        if self.upload_concurrency == 0 {
            return Err("upload_concurrency must be greater than 0".to_string());
        }

        if self.upload_part_size < MIN_UPLOAD_PART_SIZE {
            return Err(format!(
                "upload_part_size must be at least {} bytes (5 MiB)",
                MIN_UPLOAD_PART_SIZE
            ));
        }

        Ok(())
    }

    /// Bucket name, ignoring blank values.
    pub fn bucket(&self) -> Option<&str> {
        self.s3_bucket
            .as_deref()
            .map(str::trim)
            .filter(|bucket| !bucket.is_empty())
    }

    /// Get the server bind address as "host:port".
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout)
    }

    /// Engine settings derived from this configuration.
    pub fn engine_config(&self) -> EngineConfig {
        EngineConfig::new(&self.supported_extensions, self.max_image_size_bytes)
            .with_thumbnail_height(self.thumbnail_height)
    }
}

/// Options for the `check` command.
#[derive(Args, Debug, Clone)]
pub struct CheckConfig {
    /// S3 bucket to check.
    #[arg(long, env = "VARIANT_S3_BUCKET")]
    pub s3_bucket: String,

    /// Custom S3 endpoint URL.
    #[arg(long, env = "VARIANT_S3_ENDPOINT")]
    pub s3_endpoint: Option<String>,

    /// AWS region for S3.
    #[arg(long, default_value = DEFAULT_REGION, env = "VARIANT_S3_REGION")]
    pub s3_region: String,

    /// Image id whose original and variants should be listed.
    #[arg(long)]
    pub image: Option<String>,

    /// Enable verbose logging.
    #[arg(short, long, default_value_t = false)]
    pub verbose: bool,
}

impl CheckConfig {
    /// Bucket name, or an error if blank.
    pub fn resolve_bucket(&self) -> Result<&str, String> {
        let bucket = self.s3_bucket.trim();
        if bucket.is_empty() {
            return Err("no bucket given (set --s3-bucket or VARIANT_S3_BUCKET)".to_string());
        }
        Ok(bucket)
    }
}

// =============================================================================
// Tests
// =============================================================================
