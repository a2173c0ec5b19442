use std::env;
use std::time::Duration;

#[derive(Clone)]
pub struct ServerConfig {
    pub listen_addr: String,
    pub database_url: String,
    pub provider_endpoint: String,
    /// Optional TOML file overriding the built-in peak window table.
    pub peak_schedule_path: Option<String>,
}

impl ServerConfig {
    pub fn from_env() -> Result<Self, String> {
        let listen_addr =
            env::var("VARWATCH_LISTEN_ADDR").unwrap_or_else(|_| "0.0.0.0:8080".to_string());

        let database_url =
            env::var("DATABASE_URL").map_err(|_| "DATABASE_URL must be set".to_string())?;

        let provider_endpoint = env::var("VARWATCH_PROVIDER_ENDPOINT")
            .map_err(|_| "VARWATCH_PROVIDER_ENDPOINT must be set".to_string())?;

        let peak_schedule_path = env::var("VARWATCH_PEAK_SCHEDULE").ok();

        Ok(ServerConfig {
            listen_addr,
            database_url,
            provider_endpoint,
            peak_schedule_path,
        })
    }
}

/// Tunables of the monitoring scheduler. Every field has a production
/// default; each can be overridden with a `VARWATCH_*` environment variable.
#[derive(Clone, Copy, Debug)]
pub struct MonitorConfig {
    pub concurrency: usize,
    pub provider_max_attempts: u32,
    pub retry_base_delay: Duration,
    pub request_timeout: Duration,
    pub sweep_interval: Duration,
    pub dedupe_ttl: Duration,
    pub job_max_attempts: u32,
    pub heartbeat_interval: Duration,
    pub completed_retention: Duration,
    pub failed_retention: Duration,
    pub batch_summary_retention: Duration,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            concurrency: 5,
            provider_max_attempts: 3,
            retry_base_delay: Duration::from_secs(5),
            request_timeout: Duration::from_secs(10),
            sweep_interval: Duration::from_secs(3600),
            dedupe_ttl: Duration::from_secs(5),
            job_max_attempts: 1,
            heartbeat_interval: Duration::from_secs(30),
            completed_retention: Duration::from_secs(60 * 60),
            failed_retention: Duration::from_secs(24 * 60 * 60),
            batch_summary_retention: Duration::from_secs(60 * 60),
        }
    }
}

impl MonitorConfig {
    pub fn from_env() -> Result<Self, String> {
        let mut config = Self::default();
        if let Some(v) = parse_var::<usize>("VARWATCH_CONCURRENCY")? {
            if v == 0 {
                return Err("VARWATCH_CONCURRENCY must be at least 1".to_string());
            }
            config.concurrency = v;
        }
        if let Some(v) = parse_var::<u32>("VARWATCH_PROVIDER_MAX_ATTEMPTS")? {
            if v == 0 {
                return Err("VARWATCH_PROVIDER_MAX_ATTEMPTS must be at least 1".to_string());
            }
            config.provider_max_attempts = v;
        }
        if let Some(v) = parse_var::<u64>("VARWATCH_RETRY_BASE_DELAY_SECS")? {
            config.retry_base_delay = Duration::from_secs(v);
        }
        if let Some(v) = parse_var::<u64>("VARWATCH_REQUEST_TIMEOUT_SECS")? {
            config.request_timeout = Duration::from_secs(v);
        }
        if let Some(v) = parse_var::<u64>("VARWATCH_SWEEP_INTERVAL_SECS")? {
            config.sweep_interval = Duration::from_secs(v);
        }
        if let Some(v) = parse_var::<u64>("VARWATCH_DEDUPE_TTL_SECS")? {
            config.dedupe_ttl = Duration::from_secs(v);
        }
        if let Some(v) = parse_var::<u32>("VARWATCH_JOB_MAX_ATTEMPTS")? {
            if v == 0 {
                return Err("VARWATCH_JOB_MAX_ATTEMPTS must be at least 1".to_string());
            }
            config.job_max_attempts = v;
        }
        if let Some(v) = parse_var::<u64>("VARWATCH_HEARTBEAT_INTERVAL_SECS")? {
            config.heartbeat_interval = Duration::from_secs(v);
        }
        if let Some(v) = parse_var::<u64>("VARWATCH_COMPLETED_RETENTION_SECS")? {
            config.completed_retention = Duration::from_secs(v);
        }
        if let Some(v) = parse_var::<u64>("VARWATCH_FAILED_RETENTION_SECS")? {
            config.failed_retention = Duration::from_secs(v);
        }
        Ok(config)
    }
}

fn parse_var<T: std::str::FromStr>(name: &str) -> Result<Option<T>, String> {
    match env::var(name) {
        Ok(raw) => raw
            .parse::<T>()
            .map(Some)
            .map_err(|_| format!("{name} has an invalid value: {raw}")),
        Err(_) => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn monitor_defaults_match_documented_values() {
        let config = MonitorConfig::default();
        assert_eq!(config.concurrency, 5);
        assert_eq!(config.provider_max_attempts, 3);
        assert_eq!(config.retry_base_delay, Duration::from_secs(5));
        assert_eq!(config.sweep_interval, Duration::from_secs(3600));
        assert_eq!(config.dedupe_ttl, Duration::from_secs(5));
        assert_eq!(config.job_max_attempts, 1);
    }
}
