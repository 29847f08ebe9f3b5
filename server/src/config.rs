//! Command-line configuration
//!
//! Every option can also come from the environment, so deployments can keep
//! credentials out of the process list.

use crate::database::DatabaseConfig;
use crate::team::InvitePolicy;
use clap::Parser;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Chat and presence relay server for world servers
#[derive(Parser, Debug, Clone)]
#[clap(author, version, about)]
pub struct Args {
    /// MySQL host, optionally with `:port`
    #[clap(long, env = "MYSQL_HOST", default_value = "localhost")]
    pub mysql_host: String,
    #[clap(long, env = "MYSQL_DATABASE", default_value = "")]
    pub mysql_database: String,
    #[clap(long, env = "MYSQL_USERNAME", default_value = "")]
    pub mysql_username: String,
    #[clap(long, env = "MYSQL_PASSWORD", default_value = "", hide_env_values = true)]
    pub mysql_password: String,

    /// Address to listen on
    #[clap(short = 'H', long, env = "CHAT_HOST", default_value = "0.0.0.0")]
    pub host: String,
    /// Port to listen on
    #[clap(short, long, env = "CHAT_PORT", default_value = "1501")]
    pub port: u16,
    /// Maximum number of connected world servers
    #[clap(long, env = "MAX_CLIENTS", default_value = "50")]
    pub max_clients: usize,
    /// Address announced to the master server
    #[clap(long, env = "EXTERNAL_IP", default_value = "localhost")]
    pub external_ip: String,

    /// Directory holding the client resources
    #[clap(long, env = "CLIENT_LOCATION", default_value = "./res")]
    pub client_location: PathBuf,
    /// Accepted for compatibility with the other servers' configuration
    #[clap(long, env = "DONT_GENERATE_DCF")]
    pub dont_generate_dcf: bool,

    /// IRC channel bridged with in-game chat
    #[clap(long, env = "BRIDGE_CHANNEL", default_value = "#hacksoc-lego")]
    pub bridge_channel: String,
    /// IRC server; the bridge is disabled when absent
    #[clap(long, env = "RELAY_HOST")]
    pub relay_host: Option<String>,
    #[clap(long, env = "RELAY_PORT", default_value = "6667")]
    pub relay_port: u16,
    #[clap(long, env = "RELAY_NICK", default_value = "ChatBridge")]
    pub relay_nick: String,

    /// Tick rate (updates per second)
    #[clap(short, long, env = "TICK_RATE", default_value = "30")]
    pub tick_rate: u32,
    /// Ticks without a master link before shutting down [default: one second]
    #[clap(long, env = "MASTER_GRACE_TICKS")]
    pub master_grace_ticks: Option<u32>,
    /// Let any team member invite, not just the leader
    #[clap(long, env = "MEMBERS_MAY_INVITE")]
    pub members_may_invite: bool,

    #[clap(long, env = "LOG_TO_CONSOLE")]
    pub log_to_console: bool,
    #[clap(long, env = "LOG_DEBUG_STATEMENTS")]
    pub log_debug_statements: bool,
    #[clap(long, env = "LOG_DIR", default_value = "logs")]
    pub log_dir: PathBuf,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("bridge channel {0:?} must start with '#' or '&'")]
    InvalidBridgeChannel(String),
    #[error("relay nick must not be empty or contain spaces")]
    InvalidRelayNick,
    #[error("tick rate must be at least 1")]
    ZeroTickRate,
    #[error("client location {0:?} is not a directory")]
    MissingAssets(PathBuf),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelayConfig {
    pub host: String,
    pub port: u16,
    pub nick: String,
}

/// Validated server configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatConfig {
    pub bind_addr: String,
    pub port: u16,
    pub max_clients: usize,
    pub external_ip: String,
    pub client_location: PathBuf,
    pub database: DatabaseConfig,
    pub bridge_channel: String,
    pub relay: Option<RelayConfig>,
    pub tick_rate: u32,
    pub master_grace_ticks: u32,
    pub invite_policy: InvitePolicy,
}

fn valid_channel(name: &str) -> bool {
    name.len() > 1
        && (name.starts_with('#') || name.starts_with('&'))
        && !name.contains(|c: char| c == ' ' || c == ',' || c == '\x07')
}

impl Args {
    /// Checks everything that can be checked without touching the network.
    pub fn validate(self) -> Result<ChatConfig, ConfigError> {
        if self.tick_rate == 0 {
            return Err(ConfigError::ZeroTickRate);
        }
        if !valid_channel(&self.bridge_channel) {
            return Err(ConfigError::InvalidBridgeChannel(self.bridge_channel));
        }
        let relay = match self.relay_host {
            Some(host) => {
                if self.relay_nick.is_empty() || self.relay_nick.contains(' ') {
                    return Err(ConfigError::InvalidRelayNick);
                }
                Some(RelayConfig {
                    host,
                    port: self.relay_port,
                    nick: self.relay_nick,
                })
            }
            None => None,
        };
        if !Path::new(&self.client_location).is_dir() {
            return Err(ConfigError::MissingAssets(self.client_location));
        }

        let invite_policy = if self.members_may_invite {
            InvitePolicy::AnyMember
        } else {
            InvitePolicy::LeaderOnly
        };

        Ok(ChatConfig {
            bind_addr: format!("{}:{}", self.host, self.port),
            port: self.port,
            max_clients: self.max_clients,
            external_ip: self.external_ip,
            client_location: self.client_location,
            database: DatabaseConfig {
                host: self.mysql_host,
                database: self.mysql_database,
                username: self.mysql_username,
                password: self.mysql_password,
            },
            bridge_channel: self.bridge_channel,
            relay,
            tick_rate: self.tick_rate,
            master_grace_ticks: self.master_grace_ticks.unwrap_or(self.tick_rate),
            invite_policy,
        })
    }
}
