//! TOML-based configuration for the border router.
//!
//! Everything has a default, so the router runs without a config file. The
//! node suffix, TUN name and serial device come from the command line.

use std::path::Path;
use std::time::Duration;

use serde::Deserialize;

use sixbridge_protocol::window::{DEFAULT_RECV_WINDOW, DEFAULT_SEND_WINDOW, is_valid_window};

use crate::error::RouterError;

/// Top-level router configuration loaded from a TOML file.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RouterConfig {
    #[serde(default)]
    pub serial: SerialSection,
    #[serde(default)]
    pub tun: TunSection,
    #[serde(default)]
    pub flow_control: FlowControlSection,
    #[serde(default)]
    pub logging: LoggingSection,
}

impl RouterConfig {
    /// Load and validate configuration from a TOML file.
    pub fn load(path: &Path) -> Result<Self, RouterError> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| RouterError::Config(format!("failed to read config file: {e}")))?;
        Self::parse(&content)
    }

    /// Parse and validate configuration from a TOML string.
    pub fn parse(s: &str) -> Result<Self, RouterError> {
        let config: Self = toml::from_str(s)
            .map_err(|e| RouterError::Config(format!("failed to parse config: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), RouterError> {
        self.flow_control.validate()?;
        if self.tun.prefix_len > 128 {
            return Err(RouterError::Config(format!(
                "tun.prefix_len {} exceeds 128",
                self.tun.prefix_len
            )));
        }
        if self.serial.baud_rate == 0 {
            return Err(RouterError::Config("serial.baud_rate must be positive".into()));
        }
        Ok(())
    }
}

/// The `[serial]` section.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SerialSection {
    /// Line speed; the port always runs 8N1 without flow control.
    #[serde(default = "default_baud_rate")]
    pub baud_rate: u32,
}

fn default_baud_rate() -> u32 {
    115_200
}

impl Default for SerialSection {
    fn default() -> Self {
        Self {
            baud_rate: default_baud_rate(),
        }
    }
}

/// The `[tun]` section.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TunSection {
    /// Prefix length for the router address assigned to the TUN device.
    #[serde(default = "default_prefix_len")]
    pub prefix_len: u8,
}

fn default_prefix_len() -> u8 {
    64
}

impl Default for TunSection {
    fn default() -> Self {
        Self {
            prefix_len: default_prefix_len(),
        }
    }
}

/// The `[flow_control]` section.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FlowControlSection {
    /// Send window size; a power of two up to 64.
    #[serde(default = "default_send_window")]
    pub send_window: u8,
    /// Receive window size; a power of two up to 64.
    #[serde(default = "default_recv_window")]
    pub recv_window: u8,
    #[serde(default = "default_retransmit_timeout_ms")]
    pub retransmit_timeout_ms: u64,
    #[serde(default = "default_syn_interval_ms")]
    pub syn_interval_ms: u64,
    /// Give up on the peer after this many retransmissions of one frame.
    /// Unset means retry forever.
    #[serde(default)]
    pub max_retransmissions: Option<u32>,
    /// Fail the handshake after this many SYNs. Unset means retry forever.
    #[serde(default)]
    pub max_syn_attempts: Option<u32>,
}

fn default_send_window() -> u8 {
    DEFAULT_SEND_WINDOW
}

fn default_recv_window() -> u8 {
    DEFAULT_RECV_WINDOW
}

fn default_retransmit_timeout_ms() -> u64 {
    500
}

fn default_syn_interval_ms() -> u64 {
    1000
}

impl FlowControlSection {
    pub fn retransmit_timeout(&self) -> Duration {
        Duration::from_millis(self.retransmit_timeout_ms)
    }

    pub fn syn_interval(&self) -> Duration {
        Duration::from_millis(self.syn_interval_ms)
    }

    pub fn validate(&self) -> Result<(), RouterError> {
        for (name, size) in [
            ("send_window", self.send_window),
            ("recv_window", self.recv_window),
        ] {
            if !is_valid_window(size) {
                return Err(RouterError::Config(format!(
                    "flow_control.{name} = {size}: must be a power of two between 1 and 64"
                )));
            }
        }
        if self.retransmit_timeout_ms == 0 || self.syn_interval_ms == 0 {
            return Err(RouterError::Config(
                "flow_control timeouts must be positive".into(),
            ));
        }
        Ok(())
    }
}

impl Default for FlowControlSection {
    fn default() -> Self {
        Self {
            send_window: default_send_window(),
            recv_window: default_recv_window(),
            retransmit_timeout_ms: default_retransmit_timeout_ms(),
            syn_interval_ms: default_syn_interval_ms(),
            max_retransmissions: None,
            max_syn_attempts: None,
        }
    }
}

/// The `[logging]` section.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LoggingSection {
    #[serde(default = "default_log_level")]
    pub level: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LoggingSection {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_config_uses_defaults() {
        let config = RouterConfig::parse("").unwrap();
        assert_eq!(config.serial.baud_rate, 115_200);
        assert_eq!(config.tun.prefix_len, 64);
        assert_eq!(config.flow_control.send_window, 1);
        assert_eq!(config.flow_control.recv_window, 1);
        assert_eq!(
            config.flow_control.retransmit_timeout(),
            Duration::from_millis(500)
        );
        assert_eq!(config.flow_control.syn_interval(), Duration::from_secs(1));
        assert_eq!(config.flow_control.max_retransmissions, None);
        assert_eq!(config.flow_control.max_syn_attempts, None);
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn full_config() {
        let config = RouterConfig::parse(
            r#"
            [serial]
            baud_rate = 500000

            [tun]
            prefix_len = 48

            [flow_control]
            send_window = 4
            recv_window = 8
            retransmit_timeout_ms = 250
            syn_interval_ms = 2000
            max_retransmissions = 10
            max_syn_attempts = 30

            [logging]
            level = "debug"
            "#,
        )
        .unwrap();

        assert_eq!(config.serial.baud_rate, 500_000);
        assert_eq!(config.tun.prefix_len, 48);
        assert_eq!(config.flow_control.send_window, 4);
        assert_eq!(config.flow_control.recv_window, 8);
        assert_eq!(config.flow_control.retransmit_timeout_ms, 250);
        assert_eq!(config.flow_control.syn_interval_ms, 2000);
        assert_eq!(config.flow_control.max_retransmissions, Some(10));
        assert_eq!(config.flow_control.max_syn_attempts, Some(30));
        assert_eq!(config.logging.level, "debug");
    }

    #[test]
    fn rejects_window_that_is_not_power_of_two() {
        let err = RouterConfig::parse("[flow_control]\nsend_window = 3\n").unwrap_err();
        assert!(err.to_string().contains("send_window"));

        assert!(RouterConfig::parse("[flow_control]\nrecv_window = 0\n").is_err());
        assert!(RouterConfig::parse("[flow_control]\nrecv_window = 128\n").is_err());
    }

    #[test]
    fn rejects_zero_timeouts() {
        assert!(RouterConfig::parse("[flow_control]\nretransmit_timeout_ms = 0\n").is_err());
        assert!(RouterConfig::parse("[flow_control]\nsyn_interval_ms = 0\n").is_err());
    }

    #[test]
    fn rejects_bad_prefix_and_unknown_keys() {
        assert!(RouterConfig::parse("[tun]\nprefix_len = 129\n").is_err());
        assert!(RouterConfig::parse("[tun]\nmtu = 1500\n").is_err());
        assert!(RouterConfig::parse("[serial]\nbaud_rate = 0\n").is_err());
        assert!(RouterConfig::parse("[serial]\nconfigure_tty = false\n").is_err());
    }

    #[test]
    fn load_missing_file() {
        let err = RouterConfig::load(Path::new("/nonexistent/sixbridge.toml")).unwrap_err();
        assert!(matches!(err, RouterError::Config(_)));
    }
}
