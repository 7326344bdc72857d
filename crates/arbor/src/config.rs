//! Worker configuration loaded from environment variables.
//!
//! Uses the following environment variables:
//! - `ARBOR_WORKER_NAME`: name used in log fields (default: `worker-` plus 8 random hex chars)
//! - `ARBOR_IDLE_SLEEP_MS`: pause when a poll finds no timers and no tasks (default: 100)
//! - `ARBOR_RELOAD_SCHEDULES`: re-derive expression timeouts on start (default: false)

use std::env;
use std::time::Duration;

use anyhow::{Context, Result};
use serde_json::Value;
use tracing::warn;
use uuid::Uuid;

use crate::backends::WorkerConfiguration;

pub const DEFAULT_IDLE_SLEEP_MS: u64 = 100;

#[derive(Debug, Clone)]
pub struct WorkerConfig {
    pub name: String,
    /// Pause between polls that found nothing to do.
    pub idle_sleep: Duration,
    /// Call the scheduler's reload on start, for timer stores that do not
    /// survive restarts.
    pub reload_schedules_on_start: bool,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            name: default_worker_name(),
            idle_sleep: Duration::from_millis(DEFAULT_IDLE_SLEEP_MS),
            reload_schedules_on_start: false,
        }
    }
}

fn default_worker_name() -> String {
    let id = Uuid::new_v4().simple().to_string();
    format!("worker-{}", &id[..8])
}

impl WorkerConfig {
    /// Load configuration from environment variables
    ///
    /// Loads `.env` file if present, then reads from environment.
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();

        let name = env::var("ARBOR_WORKER_NAME").unwrap_or_else(|_| default_worker_name());

        let idle_sleep_ms = match env::var("ARBOR_IDLE_SLEEP_MS") {
            Ok(raw) => raw
                .parse::<u64>()
                .with_context(|| format!("invalid ARBOR_IDLE_SLEEP_MS value '{raw}'"))?,
            Err(_) => DEFAULT_IDLE_SLEEP_MS,
        };

        let reload_schedules_on_start = env::var("ARBOR_RELOAD_SCHEDULES")
            .map(|v| v == "true" || v == "1")
            .unwrap_or(false);

        Ok(Self {
            name,
            idle_sleep: Duration::from_millis(idle_sleep_ms),
            reload_schedules_on_start,
        })
    }

    /// Apply overrides stored alongside the data. Unknown keys and values
    /// of the wrong type are logged and skipped.
    pub fn apply_overrides(&mut self, overrides: &WorkerConfiguration) {
        for (key, value) in overrides {
            match (key.as_str(), value) {
                ("name", Value::String(name)) => self.name = name.clone(),
                ("idle_sleep_ms", Value::Number(ms)) if ms.as_u64().is_some() => {
                    self.idle_sleep = Duration::from_millis(ms.as_u64().unwrap_or_default());
                }
                ("reload_schedules_on_start", Value::Bool(flag)) => {
                    self.reload_schedules_on_start = *flag;
                }
                ("name" | "idle_sleep_ms" | "reload_schedules_on_start", other) => {
                    warn!(key = %key, value = %other, "ignoring worker override with wrong type");
                }
                _ => warn!(key = %key, "ignoring unknown worker override"),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use serial_test::serial;

    use super::*;

    fn clear_env() {
        // SAFETY: tests touching the environment are serialized.
        unsafe {
            env::remove_var("ARBOR_WORKER_NAME");
            env::remove_var("ARBOR_IDLE_SLEEP_MS");
            env::remove_var("ARBOR_RELOAD_SCHEDULES");
        }
    }

    #[test]
    #[serial]
    fn test_from_env_defaults() {
        clear_env();
        let config = WorkerConfig::from_env().unwrap();
        assert!(config.name.starts_with("worker-"));
        assert_eq!(config.name.len(), "worker-".len() + 8);
        assert_eq!(config.idle_sleep, Duration::from_millis(100));
        assert!(!config.reload_schedules_on_start);
    }

    #[test]
    #[serial]
    fn test_from_env_reads_variables() {
        clear_env();
        // SAFETY: tests touching the environment are serialized.
        unsafe {
            env::set_var("ARBOR_WORKER_NAME", "alpha");
            env::set_var("ARBOR_IDLE_SLEEP_MS", "25");
            env::set_var("ARBOR_RELOAD_SCHEDULES", "1");
        }
        let config = WorkerConfig::from_env().unwrap();
        clear_env();

        assert_eq!(config.name, "alpha");
        assert_eq!(config.idle_sleep, Duration::from_millis(25));
        assert!(config.reload_schedules_on_start);
    }

    #[test]
    #[serial]
    fn test_from_env_rejects_bad_idle_sleep() {
        clear_env();
        // SAFETY: tests touching the environment are serialized.
        unsafe { env::set_var("ARBOR_IDLE_SLEEP_MS", "soon") };
        let err = WorkerConfig::from_env().unwrap_err();
        clear_env();
        assert!(err.to_string().contains("ARBOR_IDLE_SLEEP_MS"));
    }

    #[test]
    fn test_apply_overrides_skips_unknown_and_mistyped_keys() {
        let mut config = WorkerConfig::default();
        let overrides: WorkerConfiguration = [
            ("name".to_string(), json!("beta")),
            ("idle_sleep_ms".to_string(), json!("fast")),
            ("reload_schedules_on_start".to_string(), json!(true)),
            ("colour".to_string(), json!("red")),
        ]
        .into_iter()
        .collect();

        config.apply_overrides(&overrides);
        assert_eq!(config.name, "beta");
        assert_eq!(config.idle_sleep, Duration::from_millis(DEFAULT_IDLE_SLEEP_MS));
        assert!(config.reload_schedules_on_start);
    }
}
