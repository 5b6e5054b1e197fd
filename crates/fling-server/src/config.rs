// Numan Thabit 2025
use std::net::SocketAddr;

use clap::Parser;

pub const DEFAULT_BIND: &str = "0.0.0.0:443";
pub const DEFAULT_MAX_CALLS: usize = 1_024;

/// Command line for the reflector server.
#[derive(Parser, Debug, Clone)]
#[command(
    author,
    version,
    about = "fling server: reflects every message back to the caller",
    rename_all = "snake_case"
)]
pub struct ServerArgs {
    /// Address to listen on.
    #[arg(long, default_value = DEFAULT_BIND)]
    pub bind: SocketAddr,

    /// Concurrent calls allowed on a single connection.
    #[arg(long, default_value_t = DEFAULT_MAX_CALLS)]
    pub max_calls: usize,
}

/// Configuration for the reflector server.
#[derive(Clone, Debug)]
pub struct ServerConfig {
    /// Socket to accept client connections on.
    pub bind: SocketAddr,
    /// Upper bound on live calls per connection; further invokes are
    /// answered with `Unavailable`.
    pub max_calls_per_connection: usize,
    /// Initial capacity of each connection's read and write buffers.
    pub io_buffer: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: SocketAddr::from(([0, 0, 0, 0], 443)),
            max_calls_per_connection: DEFAULT_MAX_CALLS,
            io_buffer: 16 * 1024,
        }
    }
}

impl ServerConfig {
    pub fn from_cli(args: &ServerArgs) -> anyhow::Result<Self> {
        let config = Self {
            bind: args.bind,
            max_calls_per_connection: args.max_calls,
            ..Self::default()
        };
        config.validate()?;
        Ok(config)
    }

    /// Ensure limits are usable.
    pub fn validate(&self) -> anyhow::Result<()> {
        anyhow::ensure!(
            self.max_calls_per_connection > 0,
            "max_calls must allow at least one call per connection"
        );
        anyhow::ensure!(self.io_buffer > 0, "io_buffer must be > 0");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validate_accepts_default_config() {
        ServerConfig::default()
            .validate()
            .expect("default config should validate");
    }

    #[test]
    fn cli_defaults_match_config_defaults() {
        let args = ServerArgs::parse_from(["fling_server"]);
        let config = ServerConfig::from_cli(&args).expect("defaults validate");
        assert_eq!(config.bind, ServerConfig::default().bind);
        assert_eq!(config.max_calls_per_connection, DEFAULT_MAX_CALLS);
    }

    #[test]
    fn validate_rejects_zero_call_limit() {
        let args = ServerArgs::parse_from(["fling_server", "--max_calls", "0"]);
        let err = ServerConfig::from_cli(&args).expect_err("zero limit must fail");
        assert!(err.to_string().contains("max_calls"));
    }
}
