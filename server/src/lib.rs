//! # Chat Server Library
//!
//! This library implements the chat and presence relay that sits between the
//! world servers of the game. World servers forward everything social to it:
//! player logins and logouts, chat, whispers, friend requests and team
//! management. The chat server keeps the shared social state and routes
//! replies back to whichever world server currently hosts each player.
//!
//! ## Core Responsibilities
//!
//! ### Presence
//! Tracks which players are online, which world server connection owns each
//! of them, their zone and their mute state. When a world server goes away
//! every player it hosted is logged out and their friends and teams are told.
//!
//! ### Social Graph
//! Maintains friendships (pending, accepted, best friend) and teams of up to
//! four members with a leader, a loot policy and pending invites.
//!
//! ### Message Routing
//! Decodes the binary units world servers send, applies them to the state and
//! produces replies, broadcasts and relay lines. Replies to a single player
//! are wrapped in a route-to-player envelope.
//!
//! ### Relay Bridge
//! Optionally mirrors chat with an IRC channel. Lines posted in the channel
//! reach every world server, and relay messages from world servers are posted
//! to the channel.
//!
//! ## Architecture Design
//!
//! ### Single-Owner Tick Loop
//! One loop owns all chat state and runs at a fixed tick rate. Network tasks
//! and the relay thread never touch the state; they only exchange data with
//! the loop through channels, which keeps every state change sequential.
//!
//! ### Length-Framed TCP
//! World servers and the master server talk to the chat server over TCP.
//! Each unit is prefixed with its length as a little-endian `u32`.
//!
//! ## Module Organization
//!
//! ### Chat Server Module (`chat_server`)
//! Startup, the tick loop, master liveness, housekeeping and teardown.
//!
//! ### Dispatcher Module (`dispatcher`)
//! The `(channel, message id)` handler table and every handler.
//!
//! ### State Modules (`roster`, `friends`, `team`)
//! - Online players indexed by id, connection and name
//! - Friend relations and their lifecycle
//! - Teams, invites, leadership and loot policy
//!
//! ### Network Module (`network`)
//! Listener, per-connection reader and writer tasks, the master link and the
//! frame codec.
//!
//! ### Relay Modules (`relay`, `irc`)
//! The tick-side bridge and the IRC client thread behind it.
//!
//! ### Support Modules (`config`, `database`, `utils`)
//! Command-line configuration, MySQL access and small helpers.
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use chat_server::chat_server::ChatServer;
//! use chat_server::config::Args;
//! use clap::Parser;
//! use std::sync::atomic::AtomicBool;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = Args::parse().validate()?;
//!     let server = ChatServer::start(config).await?;
//!
//!     // Runs until the flag is set, the master asks for a shutdown or the
//!     // master link stays down past the grace period
//!     server.run(Arc::new(AtomicBool::new(false))).await;
//!     Ok(())
//! }
//! ```

pub mod chat_server;
pub mod config;
pub mod database;
pub mod dispatcher;
pub mod friends;
pub mod irc;
pub mod network;
pub mod relay;
pub mod roster;
pub mod team;
pub mod utils;
