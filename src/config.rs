//! Process configuration. Read once at startup from a TOML file or constructed
//! directly; never hot-reloaded — a changed file requires a process restart.

use serde::Deserialize;
use std::path::Path;

use crate::error::RelayError;
use crate::types::RelayMode;

/// Top-level relay configuration: the `rtp_*` fields plus the ambient settings
/// (bind address, log filter) a running process needs.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RelayConfig {
    /// Relay backend: disabled, userspace, or kernel masquerade.
    pub rtp_proxy_enable: RelayMode,
    /// Lowest port handed out by the port pool (inclusive).
    pub rtp_port_low: u16,
    /// Highest port handed out by the port pool (inclusive).
    pub rtp_port_high: u16,
    /// Seconds of inactivity before a slot is aged out.
    pub rtp_timeout: u64,
    /// Number of slots in the relay table.
    pub rtp_table_size: usize,
    /// Address the userspace backend binds outbound sockets on.
    pub outbound_bind_ip: std::net::IpAddr,
    /// `tracing-subscriber` `EnvFilter` directive used by the CLI entry point.
    pub log_filter: String,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            rtp_proxy_enable: RelayMode::Userspace,
            rtp_port_low: 35000,
            rtp_port_high: 65000,
            rtp_timeout: 300,
            rtp_table_size: 2048,
            outbound_bind_ip: std::net::IpAddr::V4(std::net::Ipv4Addr::UNSPECIFIED),
            log_filter: "info".to_string(),
        }
    }
}

impl RelayConfig {
    /// Load and validate configuration from a TOML file.
    pub fn load(path: impl AsRef<Path>) -> crate::Result<Self> {
        let text = std::fs::read_to_string(path).map_err(RelayError::BackendError)?;
        let config: RelayConfig = toml::from_str(&text)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate field relationships that serde alone cannot express.
    pub fn validate(&self) -> crate::Result<()> {
        if self.rtp_port_low >= self.rtp_port_high {
            return Err(RelayError::config(
                "rtp_port_low must be strictly less than rtp_port_high",
            ));
        }
        if self.rtp_table_size == 0 {
            return Err(RelayError::config("rtp_table_size must be non-zero"));
        }
        if next_even(self.rtp_port_low) > self.rtp_port_high {
            return Err(RelayError::config(
                "port range contains no even port usable by the RTP convention",
            ));
        }
        Ok(())
    }
}

fn next_even(port: u16) -> u16 {
    if port % 2 == 0 {
        port
    } else {
        port.saturating_add(1)
    }
}
