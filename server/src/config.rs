//! Runtime configuration, filled from command-line flags by the binary and
//! built directly by tests.

use clap::ValueEnum;
use shared::metrics::{MetricsConfig, SyncModeSelector, DEFAULT_EMA_ALPHA};
use std::time::Duration;

/// What to do when a client's schema hash differs from the server's.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum MismatchPolicy {
    /// Refuse the connection
    Reject,
    /// Log a warning and let the client in
    Warn,
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Sync rounds per second
    pub tick_rate: u32,
    pub max_clients: usize,
    pub schema_mismatch: MismatchPolicy,
    pub ema_alpha: f64,
    /// EMA change rate above which rounds switch to full snapshots
    pub full_sync_threshold: f64,
    pub client_timeout: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8080,
            tick_rate: 30,
            max_clients: 16,
            schema_mismatch: MismatchPolicy::Reject,
            ema_alpha: DEFAULT_EMA_ALPHA,
            full_sync_threshold: 0.5,
            client_timeout: Duration::from_secs(5),
        }
    }
}

impl ServerConfig {
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn tick_duration(&self) -> Duration {
        Duration::from_secs_f64(1.0 / self.tick_rate.max(1) as f64)
    }

    pub fn metrics_config(&self) -> MetricsConfig {
        MetricsConfig {
            alpha: self.ema_alpha.clamp(f64::EPSILON, 1.0),
        }
    }

    pub fn mode_selector(&self) -> SyncModeSelector {
        SyncModeSelector::new(self.full_sync_threshold)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_approx_eq::assert_approx_eq;

    #[test]
    fn test_defaults() {
        let config = ServerConfig::default();
        assert_eq!(config.bind_address(), "127.0.0.1:8080");
        assert_eq!(config.schema_mismatch, MismatchPolicy::Reject);
        assert_approx_eq!(config.metrics_config().alpha, 0.2);
    }

    #[test]
    fn test_tick_duration() {
        let config = ServerConfig {
            tick_rate: 20,
            ..Default::default()
        };
        assert_eq!(config.tick_duration(), Duration::from_millis(50));

        let zero = ServerConfig {
            tick_rate: 0,
            ..Default::default()
        };
        assert_eq!(zero.tick_duration(), Duration::from_secs(1));
    }

    #[test]
    fn test_alpha_is_clamped() {
        let config = ServerConfig {
            ema_alpha: 3.0,
            ..Default::default()
        };
        assert_approx_eq!(config.metrics_config().alpha, 1.0);
    }
}
