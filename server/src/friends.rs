//! Friend relationships and the request lifecycle
//!
//! A relation exists at most once per unordered pair of players and moves
//! through `pending -> accepted`. Declining or removing deletes it. Accepted
//! relations can additionally be upgraded to best friends, which needs the
//! same request/response handshake as the original request.
//!
//! The graph also caches display names so that friends and team members can be
//! listed and addressed by name while offline. The owner decides when a name
//! is no longer referenced and calls [`FriendGraph::forget_name`].

use chat_shared::ObjectId;
use log::debug;
use std::collections::{HashMap, HashSet};
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum FriendError {
    #[error("players cannot befriend themselves")]
    SelfFriendRequest,
    #[error("players are already friends")]
    AlreadyFriends,
    #[error("no pending friend request between these players")]
    NoPendingRequest,
    #[error("players are not friends")]
    NotFriends,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FriendStatus {
    Pending { requester: ObjectId },
    Accepted,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FriendRelation {
    /// Smaller id of the pair
    pub low: ObjectId,
    /// Larger id of the pair
    pub high: ObjectId,
    pub status: FriendStatus,
    pub best_friend: bool,
    /// Who asked to upgrade an accepted relation to best friends
    pub best_friend_request: Option<ObjectId>,
}

impl FriendRelation {
    pub fn is_accepted(&self) -> bool {
        self.status == FriendStatus::Accepted
    }

    /// Player waiting for `id` to answer, if any.
    fn awaiting_answer_from(&self, id: ObjectId) -> Option<ObjectId> {
        match self.status {
            FriendStatus::Pending { requester } if requester != id => Some(requester),
            FriendStatus::Accepted => self.best_friend_request.filter(|&r| r != id),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestOutcome {
    /// A new pending relation was recorded (or an older pending one replaced)
    Created,
    /// The players were already friends and one asked to become best friends
    BestFriendUpgrade,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseOutcome {
    Accepted { best_friend: bool },
    Declined,
}

fn pair_key(a: ObjectId, b: ObjectId) -> (ObjectId, ObjectId) {
    (a.min(b), a.max(b))
}

#[derive(Debug, Default)]
pub struct FriendGraph {
    relations: HashMap<(ObjectId, ObjectId), FriendRelation>,
    adjacency: HashMap<ObjectId, HashSet<ObjectId>>,
    names: HashMap<ObjectId, String>,
}

impl FriendGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a friend request from `from` to `to`
    ///
    /// A best-friend request between accepted friends that are not best
    /// friends yet is recorded as an upgrade instead of failing.
    pub fn request(
        &mut self,
        from: ObjectId,
        to: ObjectId,
        best_friend: bool,
    ) -> Result<RequestOutcome, FriendError> {
        if from == to {
            return Err(FriendError::SelfFriendRequest);
        }

        let key = pair_key(from, to);
        if let Some(relation) = self.relations.get_mut(&key) {
            if relation.is_accepted() {
                if best_friend && !relation.best_friend {
                    relation.best_friend_request = Some(from);
                    return Ok(RequestOutcome::BestFriendUpgrade);
                }
                return Err(FriendError::AlreadyFriends);
            }
        }

        self.relations.insert(
            key,
            FriendRelation {
                low: key.0,
                high: key.1,
                status: FriendStatus::Pending { requester: from },
                best_friend,
                best_friend_request: None,
            },
        );
        self.link(from, to);
        debug!("Friend request {} -> {} (best: {})", from, to, best_friend);
        Ok(RequestOutcome::Created)
    }

    /// Applies `responder`'s answer to the request sent by `requester`
    pub fn respond(
        &mut self,
        responder: ObjectId,
        requester: ObjectId,
        accept: bool,
    ) -> Result<ResponseOutcome, FriendError> {
        let key = pair_key(responder, requester);
        let relation = self
            .relations
            .get_mut(&key)
            .filter(|relation| relation.awaiting_answer_from(responder) == Some(requester))
            .ok_or(FriendError::NoPendingRequest)?;

        match (relation.status, accept) {
            (FriendStatus::Pending { .. }, true) => {
                relation.status = FriendStatus::Accepted;
                Ok(ResponseOutcome::Accepted {
                    best_friend: relation.best_friend,
                })
            }
            (FriendStatus::Pending { .. }, false) => {
                self.relations.remove(&key);
                self.unlink(responder, requester);
                Ok(ResponseOutcome::Declined)
            }
            (FriendStatus::Accepted, true) => {
                relation.best_friend = true;
                relation.best_friend_request = None;
                Ok(ResponseOutcome::Accepted { best_friend: true })
            }
            (FriendStatus::Accepted, false) => {
                relation.best_friend_request = None;
                Ok(ResponseOutcome::Declined)
            }
        }
    }

    /// Deletes any relation between `a` and `b`
    pub fn remove(&mut self, a: ObjectId, b: ObjectId) -> Result<FriendRelation, FriendError> {
        let relation = self
            .relations
            .remove(&pair_key(a, b))
            .ok_or(FriendError::NotFriends)?;
        self.unlink(a, b);
        Ok(relation)
    }

    /// Accepted friends of `id`, ordered by id
    pub fn friends_of(&self, id: ObjectId) -> Vec<(ObjectId, &FriendRelation)> {
        let mut friends: Vec<(ObjectId, &FriendRelation)> = self
            .adjacency
            .get(&id)
            .into_iter()
            .flatten()
            .filter_map(|&other| {
                self.relations
                    .get(&pair_key(id, other))
                    .filter(|relation| relation.is_accepted())
                    .map(|relation| (other, relation))
            })
            .collect();
        friends.sort_by_key(|(other, _)| *other);
        friends
    }

    pub fn relation(&self, a: ObjectId, b: ObjectId) -> Option<&FriendRelation> {
        self.relations.get(&pair_key(a, b))
    }

    pub fn remember_name(&mut self, id: ObjectId, name: &str) {
        self.names.insert(id, name.to_string());
    }

    pub fn forget_name(&mut self, id: ObjectId) {
        self.names.remove(&id);
    }

    /// True while `id` is part of any relation, pending or accepted
    pub fn has_relations(&self, id: ObjectId) -> bool {
        self.adjacency.contains_key(&id)
    }

    pub fn name_of(&self, id: ObjectId) -> Option<&str> {
        self.names.get(&id).map(String::as_str)
    }

    /// Resolves any player whose name the graph has seen, online or not
    pub fn find_known_by_name(&self, name: &str) -> Option<ObjectId> {
        self.names
            .keys()
            .copied()
            .filter(|&id| self.name_matches(id, name))
            .min()
    }

    /// Resolves the name of one of `id`'s accepted friends, ignoring case
    pub fn find_friend_by_name(&self, id: ObjectId, name: &str) -> Option<ObjectId> {
        self.friends_of(id)
            .into_iter()
            .map(|(other, _)| other)
            .find(|&other| self.name_matches(other, name))
    }

    /// Resolves the name of a player whose request `id` has not answered yet
    pub fn find_pending_requester_by_name(&self, id: ObjectId, name: &str) -> Option<ObjectId> {
        let mut requesters: Vec<ObjectId> = self
            .adjacency
            .get(&id)
            .into_iter()
            .flatten()
            .filter_map(|&other| self.relations.get(&pair_key(id, other)))
            .filter_map(|relation| relation.awaiting_answer_from(id))
            .filter(|&requester| self.name_matches(requester, name))
            .collect();
        requesters.sort_unstable();
        requesters.into_iter().next()
    }

    pub fn len(&self) -> usize {
        self.relations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.relations.is_empty()
    }

    fn name_matches(&self, id: ObjectId, name: &str) -> bool {
        self.names
            .get(&id)
            .is_some_and(|known| known.to_lowercase() == name.to_lowercase())
    }

    fn link(&mut self, a: ObjectId, b: ObjectId) {
        self.adjacency.entry(a).or_default().insert(b);
        self.adjacency.entry(b).or_default().insert(a);
    }

    fn unlink(&mut self, a: ObjectId, b: ObjectId) {
        for (from, to) in [(a, b), (b, a)] {
            if let Some(neighbours) = self.adjacency.get_mut(&from) {
                neighbours.remove(&to);
                if neighbours.is_empty() {
                    self.adjacency.remove(&from);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn befriend(graph: &mut FriendGraph, a: ObjectId, b: ObjectId) {
        graph.request(a, b, false).unwrap();
        graph.respond(b, a, true).unwrap();
    }

    #[test]
    fn test_request_then_accept() {
        let mut graph = FriendGraph::new();
        assert_eq!(graph.request(1, 2, false), Ok(RequestOutcome::Created));
        assert_eq!(
            graph.relation(1, 2).unwrap().status,
            FriendStatus::Pending { requester: 1 }
        );
        assert!(graph.friends_of(1).is_empty());

        assert_eq!(
            graph.respond(2, 1, true),
            Ok(ResponseOutcome::Accepted { best_friend: false })
        );
        assert!(graph.relation(2, 1).unwrap().is_accepted());
        assert_eq!(graph.friends_of(1).len(), 1);
        assert_eq!(graph.friends_of(2)[0].0, 1);
    }

    #[test]
    fn test_self_request_rejected() {
        let mut graph = FriendGraph::new();
        assert_eq!(graph.request(1, 1, false), Err(FriendError::SelfFriendRequest));
        assert!(graph.is_empty());
    }

    #[test]
    fn test_request_between_friends() {
        let mut graph = FriendGraph::new();
        befriend(&mut graph, 1, 2);
        assert_eq!(graph.request(2, 1, false), Err(FriendError::AlreadyFriends));
    }

    #[test]
    fn test_decline_removes_relation() {
        let mut graph = FriendGraph::new();
        graph.request(1, 2, false).unwrap();
        assert_eq!(graph.respond(2, 1, false), Ok(ResponseOutcome::Declined));
        assert!(graph.relation(1, 2).is_none());
        assert_eq!(graph.respond(2, 1, true), Err(FriendError::NoPendingRequest));
    }

    #[test]
    fn test_requester_cannot_answer_own_request() {
        let mut graph = FriendGraph::new();
        graph.request(1, 2, false).unwrap();
        assert_eq!(graph.respond(1, 2, true), Err(FriendError::NoPendingRequest));
    }

    #[test]
    fn test_best_friend_upgrade() {
        let mut graph = FriendGraph::new();
        befriend(&mut graph, 1, 2);

        assert_eq!(graph.request(1, 2, true), Ok(RequestOutcome::BestFriendUpgrade));
        assert!(!graph.relation(1, 2).unwrap().best_friend);

        assert_eq!(
            graph.respond(2, 1, true),
            Ok(ResponseOutcome::Accepted { best_friend: true })
        );
        let relation = graph.relation(1, 2).unwrap();
        assert!(relation.best_friend);
        assert_eq!(relation.best_friend_request, None);
        assert_eq!(graph.request(1, 2, true), Err(FriendError::AlreadyFriends));
    }

    #[test]
    fn test_declined_upgrade_keeps_friendship() {
        let mut graph = FriendGraph::new();
        befriend(&mut graph, 1, 2);
        graph.request(2, 1, true).unwrap();

        assert_eq!(graph.respond(1, 2, false), Ok(ResponseOutcome::Declined));
        let relation = graph.relation(1, 2).unwrap();
        assert!(relation.is_accepted());
        assert!(!relation.best_friend);
    }

    #[test]
    fn test_remove() {
        let mut graph = FriendGraph::new();
        befriend(&mut graph, 1, 2);

        assert!(graph.remove(2, 1).is_ok());
        assert!(graph.friends_of(1).is_empty());
        assert_eq!(graph.remove(1, 2), Err(FriendError::NotFriends));
    }

    #[test]
    fn test_remove_pending_request() {
        let mut graph = FriendGraph::new();
        graph.request(1, 2, false).unwrap();
        assert!(graph.remove(1, 2).is_ok());
        assert!(graph.is_empty());
    }

    #[test]
    fn test_find_by_name() {
        let mut graph = FriendGraph::new();
        graph.remember_name(1, "Ann");
        graph.remember_name(2, "Bob");
        graph.remember_name(3, "Cid");
        befriend(&mut graph, 1, 2);
        graph.request(3, 1, false).unwrap();

        assert_eq!(graph.find_friend_by_name(1, "bob"), Some(2));
        assert_eq!(graph.find_friend_by_name(1, "Cid"), None);
        assert_eq!(graph.find_pending_requester_by_name(1, "CID"), Some(3));
        assert_eq!(graph.find_pending_requester_by_name(3, "Ann"), None);
        assert_eq!(graph.name_of(2), Some("Bob"));
        assert_eq!(graph.find_known_by_name("cid"), Some(3));
        assert_eq!(graph.find_known_by_name("Dee"), None);
    }

    #[test]
    fn test_relations_tracked_per_player() {
        let mut graph = FriendGraph::new();
        graph.request(1, 2, false).unwrap();
        graph.request(1, 3, false).unwrap();
        assert!(graph.has_relations(2));

        graph.respond(2, 1, false).unwrap();
        assert!(!graph.has_relations(2));
        assert!(graph.has_relations(1));

        graph.remove(1, 3).unwrap();
        assert!(!graph.has_relations(1));
        assert!(!graph.has_relations(3));
    }

    #[test]
    fn test_forget_name() {
        let mut graph = FriendGraph::new();
        graph.remember_name(4, "Dee");
        graph.forget_name(4);
        assert_eq!(graph.name_of(4), None);
        assert_eq!(graph.find_known_by_name("dee"), None);
    }
}
