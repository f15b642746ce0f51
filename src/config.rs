//! Configuration management.
//!
//! This module provides the configuration system, which supports:
//! - Command-line arguments via clap
//! - Environment variables (names shared with existing deployments)
//! - Sensible defaults for every setting
//!
//! # Example
//!
//! ```ignore
//! use clap::Parser;
//! use image_ladder::config::Config;
//!
//! let config = Config::parse();
//! config.validate()?;
//!
//! println!("Listening on {}", config.bind_address());
//! println!("Redis at {}", config.redis_url());
//! ```
//!
//! # Environment Variables
//!
//! - `REPO_PATH` - Local mirror directory (default: ./data/repo)
//! - `REPO_URL` - Upstream image repository
//! - `REDIS_HOST` - Redis host (default: 127.0.0.1)
//! - `REDIS_PORT` - Redis port (default: 6379)
//! - `REDIS_POOL_SIZE` - Pooled Redis connections (default: 16)
//! - `API_HOST` - Server bind address (default: 0.0.0.0)
//! - `API_PORT` - Server port (default: 3000)
//! - `SYNC_INTERVAL_MS` - Delay between sync ticks (default: 300000)
//! - `BUILD_WORKERS` - Concurrent encode jobs (default: available cores)
//! - `AVIF_QUALITY` - AVIF quality 1-100 (default: 80)
//! - `AVIF_SPEED` - AVIF encoder speed 1-10 (default: 6)
//! - `LADDER` - Comma-separated tier edge lengths
//! - `CACHE_MAX_AGE` - HTTP cache max-age seconds (default: 3600)
//! - `CORS_ORIGINS` - Comma-separated allowed origins (default: any)

use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;

use crate::derive::{
    default_worker_count, is_valid_quality, is_valid_speed, DEFAULT_AVIF_QUALITY,
    DEFAULT_AVIF_SPEED, MAX_AVIF_SPEED, MIN_AVIF_SPEED,
};
use crate::ladder::{ResolutionLadder, DEFAULT_LADDER};
use crate::server::DEFAULT_CACHE_MAX_AGE;
use crate::store::DEFAULT_POOL_SIZE;

// =============================================================================
// Default Values
// =============================================================================

/// Default server host.
pub const DEFAULT_HOST: &str = "0.0.0.0";

/// Default server port.
pub const DEFAULT_PORT: u16 = 3000;

/// Default mirror location.
pub const DEFAULT_REPO_PATH: &str = "./data/repo";

/// Default upstream repository.
pub const DEFAULT_REPO_URL: &str = "https://github.com/KestrelsDevelopment/KestrelsNest";

/// Default Redis host.
pub const DEFAULT_REDIS_HOST: &str = "127.0.0.1";

/// Default Redis port.
pub const DEFAULT_REDIS_PORT: u16 = 6379;

/// Default delay between sync ticks in milliseconds (5 minutes).
pub const DEFAULT_SYNC_INTERVAL_MS: u64 = 300_000;

// =============================================================================
// CLI Arguments
// =============================================================================

/// image-ladder - Multi-resolution AVIF derivatives for a git image repository.
///
/// Mirrors an upstream repository, pre-builds AVIF derivatives at a fixed
/// ladder of sizes into Redis, and serves them over HTTP.
#[derive(Parser, Debug, Clone)]
#[command(name = "image-ladder")]
#[command(author, version, about, long_about = None)]
pub struct Config {
    // =========================================================================
    // Source Repository
    // =========================================================================
    /// Local directory of the repository mirror.
    #[arg(long, default_value = DEFAULT_REPO_PATH, env = "REPO_PATH")]
    pub repo_path: PathBuf,

    /// Upstream repository to mirror.
    #[arg(long, default_value = DEFAULT_REPO_URL, env = "REPO_URL")]
    pub repo_url: String,

    /// Delay between sync ticks in milliseconds.
    #[arg(long, default_value_t = DEFAULT_SYNC_INTERVAL_MS, env = "SYNC_INTERVAL_MS")]
    pub sync_interval_ms: u64,

    // =========================================================================
    // Redis
    // =========================================================================
    /// Redis host.
    #[arg(long, default_value = DEFAULT_REDIS_HOST, env = "REDIS_HOST")]
    pub redis_host: String,

    /// Redis port.
    #[arg(long, default_value_t = DEFAULT_REDIS_PORT, env = "REDIS_PORT")]
    pub redis_port: u16,

    /// Maximum number of pooled Redis connections.
    #[arg(long, default_value_t = DEFAULT_POOL_SIZE, env = "REDIS_POOL_SIZE")]
    pub redis_pool_size: u32,

    // =========================================================================
    // Server Configuration
    // =========================================================================
    /// Host address to bind the server to.
    #[arg(long, default_value = DEFAULT_HOST, env = "API_HOST")]
    pub host: String,

    /// Port to listen on.
    #[arg(short, long, default_value_t = DEFAULT_PORT, env = "API_PORT")]
    pub port: u16,

    /// HTTP Cache-Control max-age in seconds.
    #[arg(long, default_value_t = DEFAULT_CACHE_MAX_AGE, env = "CACHE_MAX_AGE")]
    pub cache_max_age: u32,

    /// Allowed CORS origins (comma-separated).
    ///
    /// If not specified, allows any origin.
    #[arg(long, env = "CORS_ORIGINS", value_delimiter = ',')]
    pub cors_origins: Option<Vec<String>>,

    // =========================================================================
    // Derivative Configuration
    // =========================================================================
    /// Number of concurrent decode/encode jobs.
    ///
    /// Defaults to the number of available CPU cores.
    #[arg(long, env = "BUILD_WORKERS")]
    pub workers: Option<usize>,

    /// AVIF quality (1-100).
    #[arg(long, default_value_t = DEFAULT_AVIF_QUALITY, env = "AVIF_QUALITY")]
    pub avif_quality: u8,

    /// AVIF encoder speed (1 = slowest and smallest, 10 = fastest).
    #[arg(long, default_value_t = DEFAULT_AVIF_SPEED, env = "AVIF_SPEED")]
    pub avif_speed: u8,

    /// Tier edge lengths in pixels (comma-separated, strictly increasing).
    #[arg(long, env = "LADDER", value_delimiter = ',', default_values_t = DEFAULT_LADDER)]
    pub ladder: Vec<u32>,

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

impl Config {
    /// Validate the configuration and return an error message if invalid.
    pub fn validate(&self) -> Result<(), String> {
        if self.repo_path.as_os_str().is_empty() {
            return Err("Repository path is required. Set --repo-path or REPO_PATH".to_string());
        }
        if self.repo_url.trim().is_empty() {
            return Err("Repository URL is required. Set --repo-url or REPO_URL".to_string());
        }

        if self.sync_interval_ms == 0 {
            return Err("sync_interval_ms must be greater than 0".to_string());
        }

        if self.workers == Some(0) {
            return Err("workers must be greater than 0".to_string());
        }
        if self.redis_pool_size == 0 {
            return Err("redis_pool_size must be greater than 0".to_string());
        }

        if !is_valid_quality(self.avif_quality) {
            return Err("avif_quality must be between 1 and 100".to_string());
        }
        if !is_valid_speed(self.avif_speed) {
            return Err(format!(
                "avif_speed must be between {} and {}",
                MIN_AVIF_SPEED, MAX_AVIF_SPEED
            ));
        }

        self.resolution_ladder()?;

        Ok(())
    }

    /// Get the server bind address as "host:port".
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Connection URL for the Redis server.
    pub fn redis_url(&self) -> String {
        format!("redis://{}:{}/", self.redis_host, self.redis_port)
    }

    pub fn sync_interval(&self) -> Duration {
        Duration::from_millis(self.sync_interval_ms)
    }

    /// Configured worker count, or the number of available cores.
    pub fn worker_count(&self) -> usize {
        self.workers.unwrap_or_else(default_worker_count)
    }

    /// The validated resolution ladder.
    pub fn resolution_ladder(&self) -> Result<ResolutionLadder, String> {
        ResolutionLadder::new(self.ladder.clone())
    }
}

// =============================================================================
// Tests
// =============================================================================
