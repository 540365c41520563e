//! Gateway configuration
//!
//! Every component's config is nested under its own table. Values come
//! from defaults, then an optional TOML file, then `GATEWAY__` environment
//! variables (`GATEWAY__SESSION__PROFILE=bafx`).

use std::path::Path;

use can_bridge::BridgeConfig;
use elm_engine::EngineConfig;
use obd_protocol::SimulationConfig;
use obd_session::SessionConfig;
use serde::{Deserialize, Serialize};

/// File read when no `--config` path is given
pub const DEFAULT_CONFIG_FILE: &str = "gateway.toml";
/// Environment variable prefix
pub const ENV_PREFIX: &str = "GATEWAY";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    /// `trace`, `debug`, `info`, `warn` or `error`
    pub level: String,
    /// Emit JSON lines instead of text
    pub json: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}

/// Live-vehicle polling over CAN
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PollConfig {
    /// Rate for rpm, speed, load and throttle
    pub fast_rate_hz: f64,
    /// Rate for every other catalog PID
    pub slow_rate_hz: f64,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            fast_rate_hz: 5.0,
            slow_rate_hz: 0.5,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GatewayConfig {
    /// TCP address scanner apps connect to
    pub listen_addr: String,
    /// Main loop period
    pub tick_ms: u64,
    /// Diagnostics dump period, 0 disables
    pub diagnostics_interval_s: u64,
    pub log: LogConfig,
    pub bridge: BridgeConfig,
    pub engine: EngineConfig,
    pub session: SessionConfig,
    pub simulation: SimulationConfig,
    pub poll: PollConfig,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            listen_addr: "0.0.0.0:35000".to_string(),
            tick_ms: 10,
            diagnostics_interval_s: 60,
            log: LogConfig::default(),
            bridge: BridgeConfig::default(),
            engine: EngineConfig::default(),
            session: SessionConfig::default(),
            simulation: SimulationConfig::default(),
            poll: PollConfig::default(),
        }
    }
}

impl GatewayConfig {
    /// Load from `path` (or `gateway.toml` if present) and the environment
    pub fn load(path: Option<&Path>) -> Result<Self, config::ConfigError> {
        let file = match path {
            Some(p) => config::File::from(p).required(true),
            None => config::File::with_name(DEFAULT_CONFIG_FILE).required(false),
        };
        config::Config::builder()
            .add_source(file)
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()
    }

    /// Mirror a real vehicle from OBD-II responses on the bus
    pub fn live_vehicle() -> Self {
        Self {
            bridge: BridgeConfig {
                obd2_filter: true,
                ..Default::default()
            },
            simulation: SimulationConfig::live_can(),
            ..Default::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use obd_protocol::DataSource;
    use obd_session::ProfileKind;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let config = GatewayConfig::default();
        assert_eq!(config.listen_addr, "0.0.0.0:35000");
        assert_eq!(config.session.inactivity_timeout_ms, 30_000);
        assert_eq!(config.bridge.queue_capacity, 100);
    }

    #[test]
    fn test_load_from_file() {
        let path = std::env::temp_dir().join(format!("gateway-test-{}.toml", std::process::id()));
        let mut file = std::fs::File::create(&path).unwrap();
        writeln!(
            file,
            r#"
listen_addr = "127.0.0.1:35001"

[session]
profile = "bafx"
inactivity_timeout_ms = 5000

[simulation]
source = "live_can"
"#
        )
        .unwrap();

        let config = GatewayConfig::load(Some(&path)).unwrap();
        std::fs::remove_file(&path).ok();

        assert_eq!(config.listen_addr, "127.0.0.1:35001");
        assert_eq!(config.session.profile, ProfileKind::Bafx);
        assert_eq!(config.session.inactivity_timeout_ms, 5000);
        assert_eq!(config.simulation.source, DataSource::LiveCan);
        // Untouched tables keep their defaults
        assert_eq!(config.engine.header_id, 0x7E8);
    }

    #[test]
    fn test_missing_explicit_file_is_error() {
        let path = Path::new("/nonexistent/gateway.toml");
        assert!(GatewayConfig::load(Some(path)).is_err());
    }
}
