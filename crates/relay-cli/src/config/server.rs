//! HTTP server configuration.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::time::Duration;

use anyhow::{Result as AnyhowResult, anyhow};
use clap::Args;
use serde::{Deserialize, Serialize};

use crate::TRACING_TARGET_CONFIG;

/// HTTP server configuration.
///
/// # Environment Variables
///
/// - `HOST` - Server host address (default: 127.0.0.1)
/// - `PORT` - Server port (default: 3000, valid range: 1024-65535)
/// - `SHUTDOWN_TIMEOUT` - Graceful shutdown timeout in seconds (default: 30, max: 300)
/// - `TCP_KEEPALIVE` - Idle seconds before TCP keepalive probes, 0 disables (default: 10, max: 7200)
///
/// The request timeout lives in the middleware group (`REQUEST_TIMEOUT`).
///
/// # Examples
///
/// ```bash
/// relay --host 0.0.0.0 --port 8080
/// HOST=0.0.0.0 PORT=8080 relay
/// ```
#[derive(Debug, Clone, Args, Serialize, Deserialize)]
#[must_use = "config does nothing unless you use it"]
pub struct ServerConfig {
    /// Host address to bind the server to.
    ///
    /// Use "127.0.0.1" for localhost only, "0.0.0.0" for all interfaces.
    #[arg(long, env = "HOST", default_value = "127.0.0.1")]
    #[serde(default = "default_host")]
    pub host: IpAddr,

    /// TCP port number for the server to listen on.
    ///
    /// Must be in the range 1024-65535.
    #[arg(short = 'p', long, env = "PORT", default_value_t = 3000)]
    pub port: u16,

    /// Maximum time in seconds to wait for open streams during shutdown.
    ///
    /// Once a shutdown signal arrives no new connections are accepted. Open
    /// streams get this long to finish before the process exits.
    /// Valid range: 1-300 seconds.
    #[arg(long, env = "SHUTDOWN_TIMEOUT", default_value_t = 30)]
    pub shutdown_timeout: u64,

    /// Idle time in seconds before the kernel probes an accepted connection.
    ///
    /// Keeps long-lived streams alive through intermediaries between
    /// heartbeats. 0 disables keepalive. Valid range: 0-7200 seconds.
    #[arg(long, env = "TCP_KEEPALIVE", default_value_t = 10)]
    #[serde(default = "default_tcp_keepalive")]
    pub tcp_keepalive: u64,
}

/// Default host address for development.
fn default_host() -> IpAddr {
    IpAddr::V4(Ipv4Addr::LOCALHOST)
}

fn default_tcp_keepalive() -> u64 {
    10
}

impl ServerConfig {
    /// Validates all configuration values and returns errors for invalid settings.
    ///
    /// # Errors
    ///
    /// Returns an error if the port is below 1024, the shutdown timeout is
    /// outside 1-300 seconds or the keepalive exceeds 7200 seconds.
    pub fn validate(&self) -> AnyhowResult<()> {
        if self.port < 1024 {
            return Err(anyhow!(
                "Port {} is below 1024. Use ports 1024-65535 to avoid requiring root privileges.",
                self.port
            ));
        }

        if self.shutdown_timeout == 0 || self.shutdown_timeout > 300 {
            return Err(anyhow!(
                "Shutdown timeout {} seconds is invalid. Must be between 1 and 300 seconds.",
                self.shutdown_timeout
            ));
        }

        if self.tcp_keepalive > 7200 {
            return Err(anyhow!(
                "TCP keepalive {} seconds is invalid. Must be between 0 and 7200 seconds.",
                self.tcp_keepalive
            ));
        }

        Ok(())
    }

    /// Returns the complete socket address for server binding.
    #[must_use]
    pub const fn server_addr(&self) -> SocketAddr {
        SocketAddr::new(self.host, self.port)
    }

    /// Returns the graceful shutdown timeout as a `Duration`.
    #[must_use]
    pub const fn shutdown_timeout(&self) -> Duration {
        Duration::from_secs(self.shutdown_timeout)
    }

    /// Returns the TCP keepalive idle time, or `None` if keepalive is disabled.
    #[must_use]
    pub const fn tcp_keepalive(&self) -> Option<Duration> {
        match self.tcp_keepalive {
            0 => None,
            secs => Some(Duration::from_secs(secs)),
        }
    }

    /// Returns whether the server is configured to bind to all interfaces.
    #[must_use]
    pub const fn binds_to_all_interfaces(&self) -> bool {
        match self.host {
            IpAddr::V4(addr) => addr.is_unspecified(),
            IpAddr::V6(addr) => addr.is_unspecified(),
        }
    }

    /// Returns whether this is a development configuration.
    #[must_use]
    pub fn is_development(&self) -> bool {
        matches!(self.host, IpAddr::V4(addr) if addr.is_loopback()) && self.port == 3000
    }

    /// Logs server configuration at info level.
    pub fn log(&self) {
        tracing::info!(
            target: TRACING_TARGET_CONFIG,
            host = %self.host,
            port = self.port,
            shutdown_timeout_secs = self.shutdown_timeout,
            tcp_keepalive_secs = self.tcp_keepalive,
            development_mode = self.is_development(),
            "Server configured successfully"
        );
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: 3000,
            shutdown_timeout: 30,
            tcp_keepalive: default_tcp_keepalive(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validate_default_config() {
        let config = ServerConfig::default();
        assert!(config.validate().is_ok());
        assert!(config.is_development());
        assert!(!config.binds_to_all_interfaces());
    }

    #[test]
    fn reject_privileged_ports() {
        let mut config = ServerConfig::default();
        config.port = 80;
        assert!(config.validate().is_err());
    }

    #[test]
    fn reject_invalid_shutdown_timeouts() {
        let mut config = ServerConfig::default();

        config.shutdown_timeout = 0;
        assert!(config.validate().is_err());

        config.shutdown_timeout = 301;
        assert!(config.validate().is_err());

        config.shutdown_timeout = 60;
        assert!(config.validate().is_ok());
        assert_eq!(config.shutdown_timeout(), Duration::from_secs(60));
    }

    #[test]
    fn unspecified_host_binds_all_interfaces() {
        let config = ServerConfig {
            host: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            port: 8080,
            ..ServerConfig::default()
        };
        assert!(config.binds_to_all_interfaces());
        assert!(!config.is_development());
    }

    #[test]
    fn keepalive_is_optional_and_bounded() {
        let mut config = ServerConfig::default();
        assert_eq!(config.tcp_keepalive(), Some(Duration::from_secs(10)));

        config.tcp_keepalive = 0;
        assert_eq!(config.tcp_keepalive(), None);
        assert!(config.validate().is_ok());

        config.tcp_keepalive = 7201;
        assert!(config.validate().is_err());
    }

    #[test]
    fn server_addr_returns_correct_socket() {
        let config = ServerConfig::default();
        let addr = config.server_addr();
        assert_eq!(addr.ip(), IpAddr::V4(Ipv4Addr::LOCALHOST));
        assert_eq!(addr.port(), 3000);
    }
}
