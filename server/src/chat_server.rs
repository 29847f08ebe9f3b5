//! Server context and tick loop
//!
//! [`ChatServer`] owns every long-lived resource: the chat state, the
//! transport, the database pool and the optional relay link. Everything runs
//! from one loop at a fixed tick rate; background tasks and the relay thread
//! only ever hand data to it through queues.

use crate::config::{ChatConfig, ConfigError};
use crate::database::{Database, DatabaseError};
use crate::dispatcher::{ChatState, ConnectionEvent, MessageDispatcher, Outbound};
use crate::irc::{IrcConfig, IrcLink};
use crate::network::{NetworkEvent, OutboundCommand, Transport, TransportConfig};
use crate::relay::{RelayBridge, RELAY_EVENT_QUEUE};
use crate::utils::unix_timestamp;
use chat_shared::ids::MasterId;
use chat_shared::messages::{ServerInfo, SERVER_TYPE_CHAT};
use chat_shared::wire::decode_header;
use chat_shared::{Channel, WireError, WireMessage, WireWriter};
use log::{debug, error, info, warn};
use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::time::{interval, Duration, MissedTickBehavior};

/// Upper bound on units handled in a single tick.
pub const MAX_UNITS_PER_TICK: usize = 4096;
const FLUSH_INTERVAL_SECS: u32 = 30;
const KEEPALIVE_INTERVAL_SECS: u32 = 10 * 60;

#[derive(Debug, Error)]
pub enum StartupError {
    #[error("invalid configuration: {0}")]
    Config(#[from] ConfigError),
    #[error("database unavailable: {0}")]
    Database(#[from] DatabaseError),
    #[error("failed to encode server announcement: {0}")]
    Announcement(#[from] WireError),
    #[error("failed to open listener: {0}")]
    Listen(#[source] io::Error),
    #[error("failed to start relay link: {0}")]
    Relay(#[source] io::Error),
}

/// Tick counters driving master liveness and periodic chores
#[derive(Debug, Clone)]
pub struct HousekeepingCounters {
    master_grace_ticks: u32,
    flush_every: u32,
    keepalive_every: u32,
    disconnected_ticks: u32,
    flush_ticks: u32,
    keepalive_ticks: u32,
}

impl HousekeepingCounters {
    pub fn new(tick_rate: u32, master_grace_ticks: u32) -> Self {
        Self {
            master_grace_ticks,
            flush_every: tick_rate.saturating_mul(FLUSH_INTERVAL_SECS).max(1),
            keepalive_every: tick_rate.saturating_mul(KEEPALIVE_INTERVAL_SECS).max(1),
            disconnected_ticks: 0,
            flush_ticks: 0,
            keepalive_ticks: 0,
        }
    }

    /// Records the master link state for this tick. Returns true once the
    /// link has been down for `master_grace_ticks` consecutive ticks.
    pub fn master_tick(&mut self, connected: bool) -> bool {
        if connected {
            self.disconnected_ticks = 0;
            return false;
        }
        self.disconnected_ticks = self.disconnected_ticks.saturating_add(1);
        self.disconnected_ticks >= self.master_grace_ticks
    }

    pub fn flush_due(&mut self) -> bool {
        Self::advance(&mut self.flush_ticks, self.flush_every)
    }

    pub fn keepalive_due(&mut self) -> bool {
        Self::advance(&mut self.keepalive_ticks, self.keepalive_every)
    }

    fn advance(counter: &mut u32, every: u32) -> bool {
        *counter += 1;
        if *counter >= every {
            *counter = 0;
            true
        } else {
            false
        }
    }
}

/// What the master asked for, if anything
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MasterRequest {
    Shutdown,
    Other,
}

pub fn classify_master_unit(data: &[u8]) -> MasterRequest {
    match decode_header(data) {
        Ok((channel, id))
            if channel == Channel::Master as u8 && u32::from(id) == MasterId::Shutdown as u32 =>
        {
            MasterRequest::Shutdown
        }
        _ => MasterRequest::Other,
    }
}

pub struct ChatServer {
    config: ChatConfig,
    state: ChatState,
    dispatcher: MessageDispatcher,
    counters: HousekeepingCounters,
    transport: Transport,
    database: Database,
    bridge: Option<RelayBridge>,
    irc: Option<IrcLink>,
}

impl ChatServer {
    /// Acquires every resource in order: database, master address, listener,
    /// relay link. Anything already acquired is released if a later step
    /// fails.
    pub async fn start(config: ChatConfig) -> Result<Self, StartupError> {
        let database = Database::connect(&config.database).await?;
        let master_addr = database.master_address().await?;
        if master_addr.is_none() {
            warn!("No master server registered in the database");
        }

        let announcement = ServerInfo {
            port: u32::from(config.port),
            zone_id: 0,
            instance_id: 0,
            server_type: SERVER_TYPE_CHAT,
            ip: config.external_ip.clone(),
        }
        .encode()?;

        let transport = Transport::bind(TransportConfig {
            bind_addr: config.bind_addr.clone(),
            max_clients: config.max_clients,
            master_addr,
            announcement,
        })
        .await
        .map_err(StartupError::Listen)?;

        let (bridge, irc) = match &config.relay {
            Some(relay) => {
                let (event_tx, event_rx) = mpsc::channel(RELAY_EVENT_QUEUE);
                let (line_tx, line_rx) = mpsc::unbounded_channel();
                let link = IrcLink::start(
                    IrcConfig {
                        host: relay.host.clone(),
                        port: relay.port,
                        nick: relay.nick.clone(),
                        channel: config.bridge_channel.clone(),
                    },
                    event_tx,
                    line_rx,
                )
                .map_err(StartupError::Relay)?;
                info!(
                    "Bridging {} on {}:{}",
                    config.bridge_channel, relay.host, relay.port
                );
                (
                    Some(RelayBridge::new(config.bridge_channel.clone(), event_rx, line_tx)),
                    Some(link),
                )
            }
            None => {
                info!("No relay host configured, bridge disabled");
                (None, None)
            }
        };

        Ok(Self {
            state: ChatState::new(config.invite_policy),
            dispatcher: MessageDispatcher::new(),
            counters: HousekeepingCounters::new(config.tick_rate, config.master_grace_ticks),
            config,
            transport,
            database,
            bridge,
            irc,
        })
    }

    pub fn local_addr(&self) -> std::net::SocketAddr {
        self.transport.local_addr()
    }

    /// Runs the tick loop until `shutdown` is set or the master link stays
    /// down past the grace period, then tears everything down.
    pub async fn run(mut self, shutdown: Arc<AtomicBool>) {
        let mut interval_timer =
            interval(Duration::from_secs_f64(1.0 / f64::from(self.config.tick_rate)));
        interval_timer.set_missed_tick_behavior(MissedTickBehavior::Skip);

        // Skip the first tick since it fires immediately
        interval_timer.tick().await;

        loop {
            interval_timer.tick().await;

            if shutdown.load(Ordering::SeqCst) {
                info!("Shutdown requested");
                break;
            }
            if self
                .counters
                .master_tick(self.transport.is_connected_to_master())
            {
                error!(
                    "No connection to the master server for {} ticks, shutting down",
                    self.config.master_grace_ticks
                );
                break;
            }

            let now = unix_timestamp();
            for _ in 0..MAX_UNITS_PER_TICK {
                let Some(event) = self.transport.try_recv() else {
                    break;
                };
                match event {
                    NetworkEvent::Connected { connection } => {
                        let outbound = self.dispatcher.handle_lifecycle(
                            &mut self.state,
                            connection,
                            ConnectionEvent::Opened,
                            now,
                        );
                        self.deliver(outbound);
                    }
                    NetworkEvent::Closed { connection, lost } => {
                        let event = if lost {
                            ConnectionEvent::Lost
                        } else {
                            ConnectionEvent::Closed
                        };
                        let outbound =
                            self.dispatcher
                                .handle_lifecycle(&mut self.state, connection, event, now);
                        self.deliver(outbound);
                    }
                    NetworkEvent::Unit { connection, data } => {
                        let outbound =
                            self.dispatcher
                                .handle_unit(&mut self.state, connection, &data, now);
                        self.deliver(outbound);
                    }
                    NetworkEvent::MasterUnit { data } => {
                        if self.handle_master_unit(&data) {
                            shutdown.store(true, Ordering::SeqCst);
                        }
                    }
                }
            }

            if self.counters.flush_due() {
                log::logger().flush();
            }
            if self.counters.keepalive_due() {
                self.database.spawn_keepalive();
            }

            let relayed = self
                .bridge
                .as_mut()
                .map(RelayBridge::poll)
                .unwrap_or_default();
            self.deliver(relayed);
        }

        self.teardown().await;
    }

    /// Returns true when the master asked us to shut down.
    fn handle_master_unit(&self, data: &[u8]) -> bool {
        match classify_master_unit(data) {
            MasterRequest::Shutdown => {
                info!("Master requested shutdown");
                let response =
                    WireWriter::with_header(Channel::Master, MasterId::ShutdownResponse);
                self.transport.send(OutboundCommand::SendToMaster {
                    data: response.into_bytes(),
                });
                true
            }
            MasterRequest::Other => {
                debug!("Ignoring {} byte unit from master", data.len());
                false
            }
        }
    }

    fn deliver(&self, outbound: Vec<Outbound>) {
        for effect in outbound {
            match effect {
                Outbound::Send { connection, data } => self
                    .transport
                    .send(OutboundCommand::SendPacket { connection, data }),
                Outbound::Broadcast { data, exclude } => self
                    .transport
                    .send(OutboundCommand::BroadcastPacket { data, exclude }),
                Outbound::Relay { line } => match &self.bridge {
                    Some(bridge) => bridge.send_line(line),
                    None => debug!("Bridge disabled, dropping relay line"),
                },
            }
        }
    }

    async fn teardown(self) {
        let Self {
            irc,
            transport,
            database,
            ..
        } = self;
        if let Some(link) = irc {
            if let Err(e) = tokio::task::spawn_blocking(move || link.stop()).await {
                warn!("Failed to stop the relay link: {}", e);
            }
        }
        transport.shutdown();
        database.close().await;
        info!("Chat server stopped");
        log::logger().flush();
    }
}
