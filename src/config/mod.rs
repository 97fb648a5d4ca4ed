use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Deserialize)]
pub struct AppConfig {
    /// Server bind address (e.g., "0.0.0.0:3000"). Unused by the worker.
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,

    /// PostgreSQL connection string. Jobs are kept in memory when unset.
    pub database_url: Option<String>,

    /// Redis connection string. When set, jobs are queued for the `worker`
    /// binary instead of running inside the server.
    pub redis_url: Option<String>,

    /// Root for per-job uploaded sources
    #[serde(default = "default_upload_dir")]
    pub upload_dir: PathBuf,

    /// Root for per-job outputs (artifacts)
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,

    /// Conversions run concurrently by one process
    #[serde(default = "default_max_concurrent_jobs")]
    pub max_concurrent_jobs: u32,

    /// Limit for each toolchain process; 0 disables it
    #[serde(default = "default_toolchain_timeout_secs")]
    pub toolchain_timeout_secs: u64,

    #[serde(default = "default_tsc_bin")]
    pub tsc_bin: String,

    #[serde(default = "default_npm_bin")]
    pub npm_bin: String,

    /// Maximum number of jobs returned by the job listing
    #[serde(default = "default_job_list_limit")]
    pub job_list_limit: i64,

    /// Comma-separated allowed origins, or "*"
    #[serde(default = "default_cors_origins")]
    pub cors_origins: String,

    /// Request body limit for uploads
    #[serde(default = "default_max_upload_bytes")]
    pub max_upload_bytes: usize,
}

fn default_bind_addr() -> String {
    "0.0.0.0:3000".to_string()
}

fn default_upload_dir() -> PathBuf {
    PathBuf::from("/tmp/ts2sh_uploads")
}

fn default_output_dir() -> PathBuf {
    PathBuf::from("/tmp/ts2sh_outputs")
}

fn default_max_concurrent_jobs() -> u32 {
    4
}

fn default_toolchain_timeout_secs() -> u64 {
    300
}

fn default_tsc_bin() -> String {
    "tsc".to_string()
}

fn default_npm_bin() -> String {
    "npm".to_string()
}

fn default_job_list_limit() -> i64 {
    100
}

fn default_cors_origins() -> String {
    "*".to_string()
}

fn default_max_upload_bytes() -> usize {
    50 * 1024 * 1024
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        let config: Self = envy::from_env()?;
        config.validate()?;
        Ok(config)
    }

    /// Reject combinations that would start but never finish a job.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_concurrent_jobs == 0 {
            return Err(ConfigError::Invalid(
                "MAX_CONCURRENT_JOBS must be at least 1".to_string(),
            ));
        }
        // Server and worker must see the same job records.
        if self.redis_url.is_some() && self.database_url.is_none() {
            return Err(ConfigError::Invalid(
                "DATABASE_URL must be set when REDIS_URL is set".to_string(),
            ));
        }
        Ok(())
    }

    pub fn toolchain_timeout(&self) -> Option<Duration> {
        (self.toolchain_timeout_secs > 0).then(|| Duration::from_secs(self.toolchain_timeout_secs))
    }

    /// Allowed CORS origins; `None` means any origin.
    pub fn cors_origin_list(&self) -> Option<Vec<String>> {
        let origins: Vec<String> = self
            .cors_origins
            .split(',')
            .map(str::trim)
            .filter(|o| !o.is_empty())
            .map(str::to_string)
            .collect();
        if origins.is_empty() || origins.iter().any(|o| o == "*") {
            None
        } else {
            Some(origins)
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Environment error: {0}")]
    Env(#[from] envy::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}
