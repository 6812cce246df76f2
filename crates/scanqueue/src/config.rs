use std::time::Duration;

use crate::scans::queue::WorkerOptions;
use crate::scans::retry::RetryPolicy;

// Config is the one place runtime settings are read.
// Values come from the environment (and .env), with typed defaults.
#[derive(Clone, Debug)]
pub struct Config {
    pub database_url: String,
    pub upload_base_url: String,
    pub upload_path: String,
    pub health_path: String,
    pub upload_timeout_secs: u64,
    pub admin_addr: Option<String>,
    pub migrate_on_startup: bool,
    pub synced_retention_secs: u64,
    pub maintenance_interval_secs: u64,
    pub probe_interval_secs: u64,
    pub max_sync_attempts: u32,
    pub max_image_bytes: usize,
    pub event_buffer: usize,
    pub log_format: String,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();

        let database_url = env_or_fallback("SCANQ_DATABASE_URL", "DATABASE_URL")
            .unwrap_or_else(|| "sqlite://scan_queue.db".to_string());

        let upload_base_url = env_or_fallback("SCANQ_UPLOAD_BASE_URL", "API_URL")
            .unwrap_or_else(|| "http://localhost:8000".to_string());
        if !upload_base_url.starts_with("http://") && !upload_base_url.starts_with("https://") {
            anyhow::bail!("SCANQ_UPLOAD_BASE_URL must be an http(s) URL, got {upload_base_url}");
        }

        let upload_path = env_nonempty("SCANQ_UPLOAD_PATH")
            .map(|p| normalize_path(&p))
            .unwrap_or_else(|| "/api/v2/predict".to_string());

        let health_path = env_nonempty("SCANQ_HEALTH_PATH")
            .map(|p| normalize_path(&p))
            .unwrap_or_else(|| "/health".to_string());

        let upload_timeout_secs = env_parse("SCANQ_UPLOAD_TIMEOUT_SECS").unwrap_or(30).max(1);

        let admin_addr = env_or_fallback("SCANQ_ADMIN_ADDR", "ADMIN_ADDR")
            .and_then(|s| normalize_optional_addr(&s));

        let migrate_on_startup = env_bool("SCANQ_MIGRATE_ON_STARTUP").unwrap_or(true);

        let synced_retention_secs =
            env_parse("SCANQ_SYNCED_RETENTION_SECS").unwrap_or(24 * 60 * 60);

        let maintenance_interval_secs =
            env_parse("SCANQ_MAINTENANCE_INTERVAL_SECS").unwrap_or(60 * 60).max(1);

        let probe_interval_secs = env_parse("SCANQ_PROBE_INTERVAL_SECS").unwrap_or(15).max(1);

        let max_sync_attempts = env_parse("SCANQ_MAX_SYNC_ATTEMPTS").unwrap_or(0);

        let max_image_bytes = env_parse("SCANQ_MAX_IMAGE_BYTES").unwrap_or(10 * 1024 * 1024);

        let event_buffer = env_parse("SCANQ_EVENT_BUFFER").unwrap_or(256).max(1);

        let log_format = env_nonempty("SCANQ_LOG_FORMAT").unwrap_or_else(|| "pretty".to_string());

        Ok(Self {
            database_url,
            upload_base_url,
            upload_path,
            health_path,
            upload_timeout_secs,
            admin_addr,
            migrate_on_startup,
            synced_retention_secs,
            maintenance_interval_secs,
            probe_interval_secs,
            max_sync_attempts,
            max_image_bytes,
            event_buffer,
            log_format,
        })
    }

    pub fn upload_url(&self) -> String {
        format!("{}{}", self.upload_base_url.trim_end_matches('/'), self.upload_path)
    }

    pub fn health_url(&self) -> String {
        format!("{}{}", self.upload_base_url.trim_end_matches('/'), self.health_path)
    }

    pub fn upload_timeout(&self) -> Duration {
        Duration::from_secs(self.upload_timeout_secs)
    }

    pub fn probe_interval(&self) -> Duration {
        Duration::from_secs(self.probe_interval_secs)
    }

    /// 0 keeps failed scans parked until someone resets them.
    pub fn retry_policy(&self) -> RetryPolicy {
        match self.max_sync_attempts {
            0 => RetryPolicy::Manual,
            n => RetryPolicy::Bounded { max_attempts: n },
        }
    }

    pub fn worker_options(&self) -> WorkerOptions {
        WorkerOptions {
            synced_retention: Duration::from_secs(self.synced_retention_secs),
            maintenance_interval: Duration::from_secs(self.maintenance_interval_secs),
        }
    }
}

fn env_nonempty(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|s| !s.trim().is_empty())
}

fn env_or_fallback(primary: &str, fallback: &str) -> Option<String> {
    env_nonempty(primary).or_else(|| env_nonempty(fallback))
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    env_nonempty(key).and_then(|s| s.trim().parse().ok())
}

fn env_bool(key: &str) -> Option<bool> {
    std::env::var(key)
        .ok()
        .map(|v| matches!(v.to_lowercase().as_str(), "1" | "true" | "yes" | "on"))
}

fn normalize_path(value: &str) -> String {
    let v = value.trim();
    if v.starts_with('/') {
        v.to_string()
    } else {
        format!("/{v}")
    }
}

fn normalize_optional_addr(value: &str) -> Option<String> {
    let v = value.trim();
    if v.is_empty() {
        return None;
    }
    if matches!(v.to_lowercase().as_str(), "0" | "off" | "false" | "none") {
        return None;
    }
    Some(v.to_string())
}
