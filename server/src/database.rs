//! MySQL access for the chat server
//!
//! The server only needs the database for two things: finding the master
//! server's address at startup and keeping the pooled connection alive.

use log::{debug, info, warn};
use sqlx::mysql::{MySqlConnectOptions, MySqlPoolOptions};
use sqlx::MySqlPool;
use thiserror::Error;
use tokio::task::JoinHandle;

const DEFAULT_MYSQL_PORT: u16 = 3306;
const MASTER_ADDRESS_QUERY: &str = "SELECT ip, port FROM servers WHERE name='master'";

#[derive(Debug, Error)]
pub enum DatabaseError {
    #[error("invalid database host {0:?}")]
    InvalidHost(String),
    #[error(transparent)]
    Sqlx(#[from] sqlx::Error),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatabaseConfig {
    /// `host` or `host:port`
    pub host: String,
    pub database: String,
    pub username: String,
    pub password: String,
}

/// Splits `host[:port]`, defaulting the port.
fn split_host(host: &str) -> Result<(&str, u16), DatabaseError> {
    match host.rsplit_once(':') {
        Some((name, port)) if !name.is_empty() => port
            .parse()
            .map(|port| (name, port))
            .map_err(|_| DatabaseError::InvalidHost(host.to_string())),
        Some(_) => Err(DatabaseError::InvalidHost(host.to_string())),
        None if host.is_empty() => Err(DatabaseError::InvalidHost(host.to_string())),
        None => Ok((host, DEFAULT_MYSQL_PORT)),
    }
}

fn format_address(ip: &str, port: i32) -> String {
    format!("{}:{}", ip, port)
}

#[derive(Debug, Clone)]
pub struct Database {
    pool: MySqlPool,
}

impl Database {
    pub async fn connect(config: &DatabaseConfig) -> Result<Self, DatabaseError> {
        let (host, port) = split_host(&config.host)?;
        let options = MySqlConnectOptions::new()
            .host(host)
            .port(port)
            .username(&config.username)
            .password(&config.password)
            .database(&config.database);

        let pool = MySqlPoolOptions::new()
            .max_connections(2)
            .connect_with(options)
            .await?;
        info!("Connected to database {} on {}:{}", config.database, host, port);
        Ok(Self { pool })
    }

    /// `ip:port` of the master server, if it is registered
    pub async fn master_address(&self) -> Result<Option<String>, DatabaseError> {
        let row: Option<(String, i32)> = sqlx::query_as(MASTER_ADDRESS_QUERY)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(|(ip, port)| format_address(&ip, port)))
    }

    /// Runs the master-address query in the background and discards the
    /// result, keeping idle connections from timing out.
    pub fn spawn_keepalive(&self) -> JoinHandle<()> {
        let pool = self.pool.clone();
        tokio::spawn(async move {
            match sqlx::query(MASTER_ADDRESS_QUERY).fetch_optional(&pool).await {
                Ok(_) => debug!("Database keepalive ok"),
                Err(e) => warn!("Database keepalive failed: {}", e),
            }
        })
    }

    pub async fn close(self) {
        self.pool.close().await;
        info!("Database pool closed");
    }
}
