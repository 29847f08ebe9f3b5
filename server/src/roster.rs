//! Authoritative roster of players currently loaded into a world server
//!
//! This module tracks every player the chat server knows to be online:
//! - Which world-server connection currently owns the player
//! - The zone the player is in and their display name
//! - The mute expiry the world server reported for them
//!
//! Ownership changes whenever a player moves between zones, so every lookup
//! goes through the roster instead of caching a connection. A reverse index
//! from connection to players makes evicting a crashed world server cheap.

use chat_shared::{ObjectId, ZoneId};
use log::{debug, info};
use std::collections::{HashMap, HashSet};
use thiserror::Error;

/// Transport handle of a connected world server (or other peer).
pub type ConnectionId = u32;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum RosterError {
    #[error("player {0} is not in the roster")]
    NotFound(ObjectId),
}

/// A player as seen by the chat server
///
/// Each entry records:
/// - Identity (object id and display name)
/// - Routing data (owning connection and zone)
/// - Moderation state (mute expiry in unix seconds)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Player {
    pub id: ObjectId,
    pub name: String,
    /// World server currently responsible for this player
    pub connection: ConnectionId,
    pub zone: ZoneId,
    /// Unix seconds; `None` when the player may chat freely
    pub muted_until: Option<u64>,
}

impl Player {
    /// Creates an unmuted player owned by `connection`
    pub fn new(
        id: ObjectId,
        name: impl Into<String>,
        connection: ConnectionId,
        zone: ZoneId,
    ) -> Self {
        Self {
            id,
            name: name.into(),
            connection,
            zone,
            muted_until: None,
        }
    }

    /// Returns true while the mute expiry lies in the future
    pub fn is_muted(&self, now: u64) -> bool {
        self.muted_until.is_some_and(|expiry| expiry > now)
    }
}

/// Manages every online player and the indexes used to route to them
///
/// The PlayerRoster is the single place where player ownership changes.
/// Other components hold only object ids and ask the roster for the current
/// connection right before sending, so a zone transfer never leaves a stale
/// route behind.
#[derive(Debug, Default)]
pub struct PlayerRoster {
    /// Online players indexed by object id
    players: HashMap<ObjectId, Player>,
    /// Players owned by each connection
    by_connection: HashMap<ConnectionId, HashSet<ObjectId>>,
    /// Lowercased display name to object id
    by_name: HashMap<String, ObjectId>,
}

impl PlayerRoster {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts a player or replaces the existing entry with the same id
    ///
    /// A second insert for the same id is how a world server reports that a
    /// player finished a zone transfer: the new connection and zone win and
    /// the indexes are moved over. Returns the previous entry, if any.
    pub fn insert_or_replace(&mut self, player: Player) -> Option<Player> {
        let previous = self.detach(player.id);
        if let Some(old) = &previous {
            debug!(
                "Player {} moved from connection {} to {}",
                player.id, old.connection, player.connection
            );
        } else {
            info!(
                "Player {} ({}) added on connection {}",
                player.id, player.name, player.connection
            );
        }

        self.by_connection
            .entry(player.connection)
            .or_default()
            .insert(player.id);
        self.by_name.insert(player.name.to_lowercase(), player.id);
        self.players.insert(player.id, player);
        previous
    }

    /// Removes a player, returning the entry if it was present
    ///
    /// Removing an unknown id is a no-op so duplicate removal notices from
    /// world servers are harmless.
    pub fn remove(&mut self, id: ObjectId) -> Option<Player> {
        let removed = self.detach(id);
        if let Some(player) = &removed {
            info!("Player {} ({}) removed", player.id, player.name);
        }
        removed
    }

    /// Sets or clears the mute expiry of a player
    pub fn mute_update(&mut self, id: ObjectId, expiry: Option<u64>) -> Result<(), RosterError> {
        let player = self.players.get_mut(&id).ok_or(RosterError::NotFound(id))?;
        player.muted_until = expiry;
        Ok(())
    }

    pub fn lookup(&self, id: ObjectId) -> Result<&Player, RosterError> {
        self.players.get(&id).ok_or(RosterError::NotFound(id))
    }

    /// Returns the connection that currently owns the player
    pub fn connection_of(&self, id: ObjectId) -> Result<ConnectionId, RosterError> {
        self.lookup(id).map(|player| player.connection)
    }

    /// Finds an online player by display name, ignoring case
    pub fn find_by_name(&self, name: &str) -> Option<&Player> {
        self.by_name
            .get(&name.to_lowercase())
            .and_then(|id| self.players.get(id))
    }

    /// Evicts every player owned by a connection that went away
    ///
    /// Uses the connection index so the cost is proportional to the number of
    /// players the connection owned. Returns the evicted players so callers can
    /// notify their friends and teams.
    pub fn remove_connection(&mut self, connection: ConnectionId) -> Vec<Player> {
        let ids = self.by_connection.remove(&connection).unwrap_or_default();
        let mut evicted: Vec<Player> = ids.into_iter().filter_map(|id| self.detach(id)).collect();
        evicted.sort_by_key(|player| player.id);
        if !evicted.is_empty() {
            info!(
                "Evicted {} players owned by connection {}",
                evicted.len(),
                connection
            );
        }
        evicted
    }

    pub fn is_muted(&self, id: ObjectId, now: u64) -> bool {
        self.players
            .get(&id)
            .is_some_and(|player| player.is_muted(now))
    }

    /// Distinct connections that own at least one player
    pub fn connections(&self) -> Vec<ConnectionId> {
        let mut connections: Vec<ConnectionId> = self.by_connection.keys().copied().collect();
        connections.sort_unstable();
        connections
    }

    pub fn contains(&self, id: ObjectId) -> bool {
        self.players.contains_key(&id)
    }

    /// Returns the number of online players
    pub fn len(&self) -> usize {
        self.players.len()
    }

    pub fn is_empty(&self) -> bool {
        self.players.is_empty()
    }

    /// Removes a player from the map and both indexes.
    fn detach(&mut self, id: ObjectId) -> Option<Player> {
        let player = self.players.remove(&id)?;
        if let Some(owned) = self.by_connection.get_mut(&player.connection) {
            owned.remove(&id);
            if owned.is_empty() {
                self.by_connection.remove(&player.connection);
            }
        }
        let key = player.name.to_lowercase();
        if self.by_name.get(&key) == Some(&id) {
            self.by_name.remove(&key);
        }
        Some(player)
    }
}

/// Tests cover insertion and replacement, mute handling, name lookup and
/// connection eviction through the reverse index.
#[cfg(test)]
mod tests {
    use super::*;

    fn zone(map_id: u16) -> ZoneId {
        ZoneId::new(map_id, 0, 0)
    }

    #[test]
    fn test_insert_and_lookup() {
        let mut roster = PlayerRoster::new();
        assert!(roster.is_empty());

        let previous = roster.insert_or_replace(Player::new(100, "Alice", 1, zone(1100)));
        assert!(previous.is_none());

        let player = roster.lookup(100).unwrap();
        assert_eq!(player.name, "Alice");
        assert_eq!(player.connection, 1);
        assert_eq!(player.zone, zone(1100));
        assert_eq!(player.muted_until, None);
        assert_eq!(roster.len(), 1);
    }

    #[test]
    fn test_insert_is_idempotent() {
        let mut roster = PlayerRoster::new();
        let player = Player::new(100, "Alice", 1, zone(1100));
        roster.insert_or_replace(player.clone());
        let previous = roster.insert_or_replace(player.clone());

        assert_eq!(previous, Some(player));
        assert_eq!(roster.len(), 1);
        assert_eq!(roster.connections(), vec![1]);
    }

    #[test]
    fn test_replace_moves_connection() {
        let mut roster = PlayerRoster::new();
        roster.insert_or_replace(Player::new(100, "Alice", 1, zone(1100)));
        roster.insert_or_replace(Player::new(100, "Alice", 2, zone(1200)));

        assert_eq!(roster.connection_of(100), Ok(2));
        assert_eq!(roster.lookup(100).unwrap().zone, zone(1200));
        assert_eq!(roster.connections(), vec![2]);
        assert!(roster.remove_connection(1).is_empty());
        assert!(roster.contains(100));
    }

    #[test]
    fn test_remove() {
        let mut roster = PlayerRoster::new();
        roster.insert_or_replace(Player::new(100, "Alice", 1, zone(1100)));

        assert!(roster.remove(100).is_some());
        assert!(roster.remove(100).is_none());
        assert!(roster.lookup(100).is_err());
        assert!(roster.find_by_name("alice").is_none());
        assert!(roster.connections().is_empty());
    }

    #[test]
    fn test_mute_update() {
        let mut roster = PlayerRoster::new();
        roster.insert_or_replace(Player::new(100, "Alice", 1, zone(1100)));

        roster.mute_update(100, Some(2_000)).unwrap();
        assert_eq!(roster.lookup(100).unwrap().muted_until, Some(2_000));
        assert!(roster.is_muted(100, 1_000));
        assert!(!roster.is_muted(100, 2_000));

        roster.mute_update(100, None).unwrap();
        assert!(!roster.is_muted(100, 1_000));
    }

    #[test]
    fn test_mute_update_unknown_player() {
        let mut roster = PlayerRoster::new();
        roster.insert_or_replace(Player::new(100, "Alice", 1, zone(1100)));

        assert_eq!(
            roster.mute_update(999, Some(5)),
            Err(RosterError::NotFound(999))
        );
        assert_eq!(roster.len(), 1);
        assert_eq!(roster.lookup(100).unwrap().muted_until, None);
    }

    #[test]
    fn test_find_by_name_ignores_case() {
        let mut roster = PlayerRoster::new();
        roster.insert_or_replace(Player::new(100, "Alice", 1, zone(1100)));

        assert_eq!(roster.find_by_name("ALICE").map(|p| p.id), Some(100));
        assert!(roster.find_by_name("Bob").is_none());
    }

    #[test]
    fn test_remove_connection_evicts_owned_players() {
        let mut roster = PlayerRoster::new();
        roster.insert_or_replace(Player::new(1, "A", 10, zone(1000)));
        roster.insert_or_replace(Player::new(2, "B", 10, zone(1000)));
        roster.insert_or_replace(Player::new(3, "C", 11, zone(1100)));

        let evicted = roster.remove_connection(10);
        let ids: Vec<ObjectId> = evicted.iter().map(|p| p.id).collect();
        assert_eq!(ids, vec![1, 2]);
        assert_eq!(roster.len(), 1);
        assert!(roster.contains(3));
        assert_eq!(roster.connections(), vec![11]);
    }

    #[test]
    fn test_remove_unknown_connection() {
        let mut roster = PlayerRoster::new();
        assert!(roster.remove_connection(42).is_empty());
    }
}
