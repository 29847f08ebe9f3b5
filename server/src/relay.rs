//! Bridge between in-game chat and an external relay channel
//!
//! The relay link runs on its own thread and talks to the tick loop only
//! through two queues: a bounded queue of [`RelayEvent`]s going in and an
//! unbounded queue of [`RelayLine`]s going out. The bridge drains at most
//! [`MAX_EVENTS_PER_TICK`] events per tick so a chatty channel cannot stall
//! the loop.

use crate::dispatcher::Outbound;
use chat_shared::messages::RelayMessage;
use chat_shared::WireMessage;
use log::{debug, info, warn};
use tokio::sync::mpsc::{self, error::TryRecvError};

pub const MAX_EVENTS_PER_TICK: usize = 64;
/// Capacity of the event queue between the link thread and the loop.
pub const RELAY_EVENT_QUEUE: usize = 256;

/// Something that happened on the relay link
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RelayEvent {
    Message {
        sender: String,
        target: String,
        text: String,
    },
    Connected,
    Disconnected {
        reason: String,
    },
}

/// Text to post to a relay channel
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelayLine {
    pub target: String,
    pub text: String,
}

/// Formats in-game chat for the relay channel.
pub fn relay_line(sender: &str, text: &str) -> String {
    format!("<{}> {}", sender, text)
}

pub struct RelayBridge {
    channel: String,
    events: mpsc::Receiver<RelayEvent>,
    lines: mpsc::UnboundedSender<RelayLine>,
    connected: bool,
}

impl RelayBridge {
    pub fn new(
        channel: impl Into<String>,
        events: mpsc::Receiver<RelayEvent>,
        lines: mpsc::UnboundedSender<RelayLine>,
    ) -> Self {
        Self {
            channel: channel.into(),
            events,
            lines,
            connected: false,
        }
    }

    pub fn channel(&self) -> &str {
        &self.channel
    }

    pub fn is_connected(&self) -> bool {
        self.connected
    }

    /// Drains pending relay events without blocking
    ///
    /// Messages posted to the bridge channel become relay-message broadcasts
    /// to every world server, in the order they arrived.
    pub fn poll(&mut self) -> Vec<Outbound> {
        let mut outbound = Vec::new();
        for _ in 0..MAX_EVENTS_PER_TICK {
            let event = match self.events.try_recv() {
                Ok(event) => event,
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => {
                    if self.connected {
                        warn!("Relay link stopped");
                        self.connected = false;
                    }
                    break;
                }
            };

            match event {
                RelayEvent::Message {
                    sender,
                    target,
                    text,
                } => {
                    if !target.eq_ignore_ascii_case(&self.channel) {
                        debug!("Ignoring relay message for {}", target);
                        continue;
                    }
                    let message = RelayMessage {
                        sender: format!("{} (IRC)", sender),
                        text,
                    };
                    match message.encode() {
                        Ok(data) => outbound.push(Outbound::Broadcast {
                            data,
                            exclude: None,
                        }),
                        Err(e) => warn!("Failed to encode relay message: {}", e),
                    }
                }
                RelayEvent::Connected => {
                    info!("Relay link joined {}", self.channel);
                    self.connected = true;
                }
                RelayEvent::Disconnected { reason } => {
                    warn!("Relay link disconnected: {}", reason);
                    self.connected = false;
                }
            }
        }
        outbound
    }

    /// Queues a line for the bridge channel
    pub fn send_line(&self, text: String) {
        let line = RelayLine {
            target: self.channel.clone(),
            text,
        };
        if self.lines.send(line).is_err() {
            debug!("Relay link is gone, dropping outbound line");
        }
    }
}
