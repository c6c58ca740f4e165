//! Runtime configuration loaded from the environment.
//!
//! TODO: Merge values from a configurable key=value file to avoid large
//!       environment surfaces.

use std::env;

/// Snapshot of configuration values consumed by the core.
#[derive(Clone, Debug)]
pub struct Config {
    /// Address the HTTP/WS server binds to.
    pub bind_addr: String,
    /// Seconds after which a pending/running job is considered stuck.
    pub job_timeout_secs: i64,
    /// Interval between stuck-job reconciliation sweeps, in seconds.
    pub reconcile_interval_secs: u64,
    /// Interval between automatic retrain evaluations, in seconds.
    pub retrain_sweep_secs: u64,
    /// Cooldown per (machine, model type) between automatic triggers, seconds.
    pub retrain_cooldown_secs: i64,
    /// Fractional degradation versus the rolling baseline that triggers retraining.
    pub degradation_threshold: f64,
    /// Days of metric history the degradation baseline averages over.
    pub retrain_baseline_days: i64,
    /// Rough duration of a training run, used for `estimated_completion`.
    pub estimated_training_secs: i64,
    /// Interval between server-side heartbeat pings, in seconds.
    pub heartbeat_interval_secs: u64,
    /// Heartbeat intervals a connection may miss before it is dropped.
    pub missed_heartbeat_limit: u32,
    /// Per-channel broker capacity before the oldest messages are dropped.
    pub broker_capacity: usize,
    /// Interval between A/B finalisation sweeps, in seconds.
    pub ab_sweep_secs: u64,
    /// Minimum metric samples per variant before a winner may be declared.
    pub ab_min_samples: usize,
    /// Margin on the primary metric a winner must clear.
    pub ab_confidence_margin: f64,
}

impl Config {
    /// Create a configuration snapshot from the process environment.
    pub fn load() -> Self {
        fn env_or(key: &str, default: &str) -> String {
            env::var(key).unwrap_or_else(|_| default.to_string())
        }
        fn parse_or<T: std::str::FromStr>(key: &str, default: T) -> T {
            env::var(key).ok().and_then(|v| v.parse().ok()).unwrap_or(default)
        }

        Self {
            bind_addr: env_or("ENERMON_BIND", "0.0.0.0:8000"),
            job_timeout_secs: parse_or("ENERMON_JOB_TIMEOUT_SECS", 1800),
            reconcile_interval_secs: parse_or("ENERMON_RECONCILE_INTERVAL_SECS", 3600),
            retrain_sweep_secs: parse_or("ENERMON_RETRAIN_SWEEP_SECS", 900),
            retrain_cooldown_secs: parse_or("ENERMON_RETRAIN_COOLDOWN_SECS", 3600),
            degradation_threshold: parse_or("ENERMON_DEGRADATION_THRESHOLD", 0.2),
            retrain_baseline_days: parse_or("ENERMON_RETRAIN_BASELINE_DAYS", 14),
            estimated_training_secs: parse_or("ENERMON_ESTIMATED_TRAINING_SECS", 300),
            heartbeat_interval_secs: parse_or("ENERMON_HEARTBEAT_INTERVAL_SECS", 30),
            missed_heartbeat_limit: parse_or("ENERMON_MISSED_HEARTBEAT_LIMIT", 3),
            broker_capacity: parse_or("ENERMON_BROKER_CAPACITY", 1024),
            ab_sweep_secs: parse_or("ENERMON_AB_SWEEP_SECS", 300),
            ab_min_samples: parse_or("ENERMON_AB_MIN_SAMPLES", 10),
            ab_confidence_margin: parse_or("ENERMON_AB_CONFIDENCE_MARGIN", 0.02),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::load()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_sane() {
        let cfg = Config::load();
        assert!(cfg.job_timeout_secs > 0);
        assert!((0.0..1.0).contains(&cfg.degradation_threshold));
        assert!(cfg.retrain_baseline_days > 0);
        assert!(cfg.missed_heartbeat_limit >= 1);
    }
}
