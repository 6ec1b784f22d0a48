use std::{env, net::SocketAddr};

use clap::Parser;
use thiserror::Error;

use crate::jsonrpc::NotificationPolicy;

pub const DEFAULT_PORT: u16 = 8080;
pub const DEFAULT_BIND_ADDR: &str = "0.0.0.0";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub bind_addr: String,
    pub bind_port: u16,
    pub notifications: NotificationPolicy,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("JRT_PORT must be a valid u16")]
    InvalidPort,
    #[error("JRT_NOTIFICATIONS must be one of: respond, suppress")]
    InvalidNotificationPolicy,
    #[error("invalid bind address or port")]
    InvalidSocket,
}

/// Command line flags. Each one overrides its environment variable.
#[derive(Debug, Default, Parser)]
#[command(name = "jrpc-server", about = "JSON-RPC 2.0 server over HTTP", version)]
pub struct Cli {
    /// API port (env JRT_PORT)
    #[arg(long)]
    pub port: Option<u16>,

    /// Listen address (env JRT_BIND_ADDR)
    #[arg(long)]
    pub bind_addr: Option<String>,

    /// Answer notifications or not: respond | suppress (env JRT_NOTIFICATIONS)
    #[arg(long)]
    pub notifications: Option<String>,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let bind_addr = lookup("JRT_BIND_ADDR")
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty())
            .unwrap_or_else(|| DEFAULT_BIND_ADDR.to_string());
        let bind_port = lookup("JRT_PORT")
            .map(|value| parse_port(&value))
            .transpose()?
            .unwrap_or(DEFAULT_PORT);
        let notifications = lookup("JRT_NOTIFICATIONS")
            .map(|value| parse_policy(&value))
            .transpose()?
            .unwrap_or_default();

        let config = Self {
            bind_addr,
            bind_port,
            notifications,
        };

        let _ = config.bind_socket()?;
        Ok(config)
    }

    pub fn apply_cli(mut self, cli: Cli) -> Result<Self, ConfigError> {
        if let Some(port) = cli.port {
            self.bind_port = port;
        }
        if let Some(bind_addr) = cli.bind_addr {
            self.bind_addr = bind_addr;
        }
        if let Some(policy) = cli.notifications {
            self.notifications = parse_policy(&policy)?;
        }

        let _ = self.bind_socket()?;
        Ok(self)
    }

    pub fn bind_socket(&self) -> Result<SocketAddr, ConfigError> {
        format!("{}:{}", self.bind_addr, self.bind_port)
            .parse::<SocketAddr>()
            .map_err(|_| ConfigError::InvalidSocket)
    }
}

fn parse_port(value: &str) -> Result<u16, ConfigError> {
    value
        .trim()
        .parse::<u16>()
        .map_err(|_| ConfigError::InvalidPort)
}

fn parse_policy(value: &str) -> Result<NotificationPolicy, ConfigError> {
    NotificationPolicy::parse(value).ok_or(ConfigError::InvalidNotificationPolicy)
}
