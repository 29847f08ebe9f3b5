//! Message dispatch for everything world servers send to the chat server
//!
//! The dispatcher owns no state. For each received unit it borrows the
//! [`ChatState`] and:
//! - Drops anything that does not start with the packet marker
//! - Classifies the unit by `(channel, message id)` through a lookup table
//! - Runs the matching handler, which mutates state and queues [`Outbound`]
//!   effects for the tick loop to deliver
//!
//! Handler failures are logged and never abort the tick. Client-visible
//! replies are wrapped in a route-to-player envelope and sent to the
//! connection that owns the target player at the moment of sending.

use crate::friends::{FriendError, FriendGraph, RequestOutcome, ResponseOutcome};
use crate::relay::relay_line;
use crate::roster::{ConnectionId, Player, PlayerRoster, RosterError};
use crate::team::{InvitePolicy, LeaveOutcome, LootPolicy, TeamError, TeamId, TeamRegistry};
use chat_shared::ids::{
    ChatChannel, FriendNotifyType, FriendResponseCode, FriendResponseType,
    PrivateChatResponse,
};
use chat_shared::messages::{
    route_to_player, ChatMessage, CreateTeam, FriendEntry, FriendRequest, FriendRequestNotice,
    FriendResponse, FriendResponseNotice, FriendUpdateNotice, FriendsList, IgnoreList, MuteUpdate,
    NamedTarget, PlayerAdded, PlayerRemoved, PlayerRequest, PrivateChatMessage, RelayMessage,
    RemoveFriend, RemoveFriendNotice, TeamInviteNotice, TeamInviteResponse, TeamMemberInfo,
    TeamSetLeader, TeamSetLoot, TeamState,
};
use chat_shared::wire::{decode_header, PACKET_MARKER};
use chat_shared::{
    Channel, ChatId, InternalId, ObjectId, WireError, WireMessage, WireReader, WorldId, ZoneId,
};
use log::{debug, info, warn};
use std::collections::HashMap;
use thiserror::Error;

/// All mutable chat state, owned by the tick loop.
#[derive(Debug, Default)]
pub struct ChatState {
    pub roster: PlayerRoster,
    pub friends: FriendGraph,
    pub teams: TeamRegistry,
}

impl ChatState {
    pub fn new(invite_policy: InvitePolicy) -> Self {
        Self {
            roster: PlayerRoster::new(),
            friends: FriendGraph::new(),
            teams: TeamRegistry::new(invite_policy),
        }
    }
}

/// Effect produced by a handler, delivered by the tick loop
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outbound {
    Send {
        connection: ConnectionId,
        data: Vec<u8>,
    },
    Broadcast {
        data: Vec<u8>,
        exclude: Option<ConnectionId>,
    },
    /// Line for the external relay channel
    Relay { line: String },
}

#[derive(Debug, Error)]
pub enum DispatchError {
    #[error(transparent)]
    Wire(#[from] WireError),
    #[error(transparent)]
    Roster(#[from] RosterError),
    #[error(transparent)]
    Friend(#[from] FriendError),
    #[error(transparent)]
    Team(#[from] TeamError),
    #[error("unknown {field} value {value}")]
    UnknownValue { field: &'static str, value: u8 },
}

/// Per-unit handler context
pub struct Dispatch<'a> {
    pub state: &'a mut ChatState,
    /// Connection the unit arrived on
    pub origin: ConnectionId,
    /// Unix seconds at the start of the tick
    pub now: u64,
    out: Vec<Outbound>,
}

impl<'a> Dispatch<'a> {
    pub fn new(state: &'a mut ChatState, origin: ConnectionId, now: u64) -> Self {
        Self {
            state,
            origin,
            now,
            out: Vec::new(),
        }
    }

    pub fn into_outbound(self) -> Vec<Outbound> {
        self.out
    }

    /// Routes a client message to the player's current world server
    ///
    /// Returns false when the player is offline; nothing is queued then.
    pub fn send_to_player<M: WireMessage>(
        &mut self,
        player: ObjectId,
        message: &M,
    ) -> Result<bool, DispatchError> {
        let connection = match self.state.roster.connection_of(player) {
            Ok(connection) => connection,
            Err(_) => {
                debug!("{} for offline player {} dropped", M::NAME, player);
                return Ok(false);
            }
        };
        let data = route_to_player(player, &message.encode()?)?;
        self.out.push(Outbound::Send { connection, data });
        Ok(true)
    }

    pub fn broadcast(&mut self, data: Vec<u8>, exclude: Option<ConnectionId>) {
        self.out.push(Outbound::Broadcast { data, exclude });
    }

    pub fn relay(&mut self, line: String) {
        self.out.push(Outbound::Relay { line });
    }

    /// Best known display name of a player, online or not
    pub fn name_of(&self, id: ObjectId) -> String {
        match self.state.roster.lookup(id) {
            Ok(player) => player.name.clone(),
            Err(_) => self
                .state
                .friends
                .name_of(id)
                .unwrap_or_default()
                .to_string(),
        }
    }

    fn zone_of(&self, id: ObjectId) -> ZoneId {
        self.state
            .roster
            .lookup(id)
            .map(|player| player.zone)
            .unwrap_or_default()
    }

    /// Resolves a name to an id, trying online players first.
    pub fn resolve_name(&self, name: &str) -> Option<ObjectId> {
        self.state
            .roster
            .find_by_name(name)
            .map(|player| player.id)
            .or_else(|| self.state.friends.find_known_by_name(name))
    }

    fn team_state(&self, team_id: TeamId) -> Option<TeamState> {
        let team = self.state.teams.get(team_id)?;
        let members = team
            .members
            .iter()
            .map(|&id| TeamMemberInfo {
                player_id: id,
                name: self.name_of(id),
                online: self.state.roster.contains(id),
                zone: self.zone_of(id),
            })
            .collect();
        Some(TeamState {
            team_id,
            leader_id: team.leader,
            loot: team.loot as u8,
            local: team.local,
            members,
        })
    }

    /// Sends the current state of a team to every online member
    pub fn broadcast_team(&mut self, team_id: TeamId) -> Result<(), DispatchError> {
        let Some(state) = self.team_state(team_id) else {
            return Ok(());
        };
        for member in &state.members {
            if member.online {
                self.send_to_player(member.player_id, &state)?;
            }
        }
        Ok(())
    }

    /// Tells a removed member that they have no team anymore
    pub fn send_left_team(&mut self, player: ObjectId) -> Result<(), DispatchError> {
        self.send_to_player(player, &TeamState::default())
            .map(|_| ())
    }

    fn apply_leave(&mut self, outcome: LeaveOutcome) -> Result<(), DispatchError> {
        self.send_left_team(outcome.member)?;
        if let Some(leader) = outcome.new_leader {
            info!("Player {} now leads team {}", leader, outcome.team_id);
        }
        if !outcome.disbanded {
            self.broadcast_team(outcome.team_id)?;
        }
        self.release_name(outcome.member);
        Ok(())
    }

    /// Drops the cached name of a player that is offline, friendless and
    /// teamless.
    fn release_name(&mut self, id: ObjectId) {
        let referenced = self.state.roster.contains(id)
            || self.state.friends.has_relations(id)
            || self.state.teams.team_of(id).is_some();
        if !referenced {
            self.state.friends.forget_name(id);
        }
    }

    /// Notifies every accepted friend of `player` about a presence change
    pub fn notify_friends_presence(
        &mut self,
        player: ObjectId,
        name: &str,
        zone: ZoneId,
        notify: FriendNotifyType,
    ) -> Result<(), DispatchError> {
        let friends: Vec<(ObjectId, bool)> = self
            .state
            .friends
            .friends_of(player)
            .into_iter()
            .map(|(friend, relation)| (friend, relation.best_friend))
            .collect();
        for (friend, best_friend) in friends {
            let update = FriendUpdateNotice {
                notify,
                friend_name: name.to_string(),
                zone,
                best_friend,
            };
            self.send_to_player(friend, &update)?;
        }
        Ok(())
    }

    /// Friend-response notice describing `friend` for the other party.
    fn friend_notice(
        &self,
        response: FriendResponseType,
        friend: ObjectId,
        friend_name: String,
        best_friend: bool,
    ) -> FriendResponseNotice {
        FriendResponseNotice {
            response,
            friend_online: self.state.roster.contains(friend),
            friend_name,
            friend_id: friend,
            friend_zone: self.zone_of(friend),
            best_friend,
        }
    }

    /// Presence and team updates for a player that went offline
    fn player_offline(&mut self, player: Player) -> Result<(), DispatchError> {
        self.notify_friends_presence(
            player.id,
            &player.name,
            player.zone,
            FriendNotifyType::LoggedOut,
        )?;
        if let Some(team_id) = self.state.teams.team_of(player.id).map(|team| team.id) {
            self.broadcast_team(team_id)?;
        }
        self.release_name(player.id);
        Ok(())
    }

    /// Evicts every player owned by a connection that went away
    pub fn evict_connection(&mut self, connection: ConnectionId) {
        for player in self.state.roster.remove_connection(connection) {
            let id = player.id;
            if let Err(e) = self.player_offline(player) {
                warn!("Failed to announce logout of player {}: {}", id, e);
            }
        }
    }
}

/// World server connection changes reported by the transport
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionEvent {
    Opened,
    Closed,
    Lost,
}

type Handler = fn(&mut Dispatch<'_>, &[u8]) -> Result<(), DispatchError>;

struct Route {
    name: &'static str,
    handler: Handler,
}

/// Lookup table from `(channel, message id)` to handler
pub struct MessageDispatcher {
    routes: HashMap<(Channel, u8), Route>,
}

impl Default for MessageDispatcher {
    fn default() -> Self {
        Self::new()
    }
}

impl MessageDispatcher {
    pub fn new() -> Self {
        let mut dispatcher = Self {
            routes: HashMap::new(),
        };

        let internal: [(InternalId, &'static str, Handler); 6] = [
            (InternalId::PlayerAdded, "player added", player_added),
            (InternalId::PlayerRemoved, "player removed", player_removed),
            (InternalId::MuteUpdate, "mute update", mute_update),
            (InternalId::CreateTeam, "create team", create_team),
            (InternalId::Announcement, "announcement", announcement),
            (InternalId::RelayMessage, "relay message", relay_message),
        ];
        for (id, name, handler) in internal {
            dispatcher.register(Channel::ChatInternal, id, name, handler);
        }

        let chat: [(ChatId, &'static str, Handler); 14] = [
            (ChatId::GeneralChatMessage, "general chat", general_chat),
            (ChatId::PrivateChatMessage, "private chat", private_chat),
            (ChatId::AddFriendRequest, "friend request", friend_request),
            (ChatId::AddFriendResponse, "friend response", friend_response),
            (ChatId::RemoveFriend, "remove friend", remove_friend),
            (ChatId::GetFriendsList, "friends list", friends_list),
            (ChatId::GetIgnoreList, "ignore list", ignore_list),
            (ChatId::TeamInvite, "team invite", team_invite),
            (ChatId::TeamInviteResponse, "team invite response", team_invite_response),
            (ChatId::TeamKick, "team kick", team_kick),
            (ChatId::TeamLeave, "team leave", team_leave),
            (ChatId::TeamSetLoot, "team set loot", team_set_loot),
            (ChatId::TeamSetLeader, "team set leader", team_set_leader),
            (ChatId::TeamGetStatus, "team status", team_status),
        ];
        for (id, name, handler) in chat {
            dispatcher.register(Channel::Chat, id, name, handler);
        }

        dispatcher.register(
            Channel::World,
            WorldId::ClientRoutePacket,
            "client route",
            client_route,
        );

        dispatcher
    }

    fn register(
        &mut self,
        channel: Channel,
        message_id: impl Into<u32>,
        name: &'static str,
        handler: Handler,
    ) {
        self.routes
            .insert((channel, message_id.into() as u8), Route { name, handler });
    }

    /// Number of registered handlers
    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }

    /// Applies a connection opening or going away
    ///
    /// A closed or lost connection takes every player it hosted offline,
    /// with the usual friend and team notifications.
    pub fn handle_lifecycle(
        &self,
        state: &mut ChatState,
        connection: ConnectionId,
        event: ConnectionEvent,
        now: u64,
    ) -> Vec<Outbound> {
        let mut ctx = Dispatch::new(state, connection, now);
        match event {
            ConnectionEvent::Opened => info!("New incoming connection {}", connection),
            ConnectionEvent::Closed => {
                info!("Connection {} closed", connection);
                ctx.evict_connection(connection);
            }
            ConnectionEvent::Lost => {
                warn!("Connection {} lost", connection);
                ctx.evict_connection(connection);
            }
        }
        ctx.into_outbound()
    }

    /// Processes one unit received on `origin`
    ///
    /// Never fails: malformed or unknown units are logged and dropped. A
    /// failing handler's effects are discarded along with the unit.
    pub fn handle_unit(
        &self,
        state: &mut ChatState,
        origin: ConnectionId,
        data: &[u8],
        now: u64,
    ) -> Vec<Outbound> {
        match data.first() {
            Some(&PACKET_MARKER) => {}
            Some(other) => {
                debug!("Ignoring unit with id {} from connection {}", other, origin);
                return Vec::new();
            }
            None => {
                debug!("Empty unit from connection {}", origin);
                return Vec::new();
            }
        }

        let (raw_channel, message_id) = match decode_header(data) {
            Ok(header) => header,
            Err(e) => {
                debug!("Dropping unit from connection {}: {}", origin, e);
                return Vec::new();
            }
        };
        let Ok(channel) = Channel::try_from(raw_channel) else {
            debug!("Ignoring unit on unknown channel {}", raw_channel);
            return Vec::new();
        };

        let mut ctx = Dispatch::new(state, origin, now);
        match self.routes.get(&(channel, message_id)) {
            Some(route) => {
                if let Err(e) = (route.handler)(&mut ctx, data) {
                    warn!(
                        "Failed to handle {} from connection {}: {}",
                        route.name, origin, e
                    );
                    return Vec::new();
                }
            }
            None if matches!(channel, Channel::Chat | Channel::ChatInternal | Channel::World) => {
                warn!("Unhandled {} message id {}", channel, message_id);
            }
            None => debug!("Ignoring {} unit from connection {}", channel, origin),
        }
        ctx.into_outbound()
    }
}

fn read_player_request(unit: &[u8]) -> Result<ObjectId, DispatchError> {
    let request: PlayerRequest = WireReader::body(unit).read()?;
    Ok(request.player_id)
}

fn expiry_from_wire(raw: u64) -> Option<u64> {
    (raw != 0).then_some(raw)
}

// Internal lane

fn player_added(ctx: &mut Dispatch<'_>, unit: &[u8]) -> Result<(), DispatchError> {
    let added = PlayerAdded::decode(unit)?;
    let mut player = Player::new(added.player_id, added.name.clone(), ctx.origin, added.zone);
    player.muted_until = expiry_from_wire(added.mute_expiry);

    ctx.state.friends.remember_name(added.player_id, &added.name);
    let notify = match ctx.state.roster.insert_or_replace(player) {
        Some(_) => FriendNotifyType::ChangedWorld,
        None => FriendNotifyType::LoggedIn,
    };
    ctx.notify_friends_presence(added.player_id, &added.name, added.zone, notify)?;

    if let Some(team_id) = ctx.state.teams.team_of(added.player_id).map(|team| team.id) {
        ctx.broadcast_team(team_id)?;
    }
    Ok(())
}

fn player_removed(ctx: &mut Dispatch<'_>, unit: &[u8]) -> Result<(), DispatchError> {
    let removed = PlayerRemoved::decode(unit)?;
    match ctx.state.roster.remove(removed.player_id) {
        Some(player) => ctx.player_offline(player),
        None => {
            debug!("Removal of unknown player {}", removed.player_id);
            Ok(())
        }
    }
}

fn mute_update(ctx: &mut Dispatch<'_>, unit: &[u8]) -> Result<(), DispatchError> {
    let update = MuteUpdate::decode(unit)?;
    ctx.state
        .roster
        .mute_update(update.player_id, expiry_from_wire(update.expiry))?;
    ctx.broadcast(unit.to_vec(), Some(ctx.origin));
    Ok(())
}

fn create_team(ctx: &mut Dispatch<'_>, unit: &[u8]) -> Result<(), DispatchError> {
    let request = CreateTeam::decode(unit)?;
    let created = ctx
        .state
        .teams
        .create_with_members(&request.members, request.zone, true)?;
    debug!(
        "Connection {} created team {} for player {}",
        ctx.origin, created.team_id, request.requester
    );
    for previous in created.previous_teams {
        if !previous.disbanded {
            ctx.broadcast_team(previous.team_id)?;
        }
    }
    ctx.broadcast_team(created.team_id)
}

fn announcement(ctx: &mut Dispatch<'_>, unit: &[u8]) -> Result<(), DispatchError> {
    ctx.broadcast(unit.to_vec(), Some(ctx.origin));
    Ok(())
}

fn relay_message(ctx: &mut Dispatch<'_>, unit: &[u8]) -> Result<(), DispatchError> {
    let message = RelayMessage::decode(unit)?;
    ctx.broadcast(unit.to_vec(), Some(ctx.origin));
    ctx.relay(relay_line(&message.sender, &message.text));
    Ok(())
}

// Chat lane

fn general_chat(ctx: &mut Dispatch<'_>, unit: &[u8]) -> Result<(), DispatchError> {
    let message = ChatMessage::decode(unit)?;
    let sender = message.routing_id;
    if ctx.state.roster.is_muted(sender, ctx.now) {
        info!("Dropping chat from muted player {}", sender);
        return Ok(());
    }
    if message.channel != ChatChannel::Team as u8 {
        debug!(
            "Chat channel {} from player {} is not routed here",
            message.channel, sender
        );
        return Ok(());
    }

    let members = ctx
        .state
        .teams
        .team_of(sender)
        .map(|team| team.members.clone())
        .ok_or(TeamError::NotInTeam)?;
    let sender_name = ctx.name_of(sender);
    for member in members {
        let copy = ChatMessage {
            routing_id: member,
            channel: message.channel,
            sender_name: sender_name.clone(),
            sender_id: sender,
            text: message.text.clone(),
        };
        ctx.send_to_player(member, &copy)?;
    }
    Ok(())
}

fn private_chat(ctx: &mut Dispatch<'_>, unit: &[u8]) -> Result<(), DispatchError> {
    let mut message = PrivateChatMessage::decode(unit)?;
    let sender = message.routing_id;
    if ctx.state.roster.is_muted(sender, ctx.now) {
        info!("Dropping whisper from muted player {}", sender);
        return Ok(());
    }

    message.sender_id = sender;
    if let Ok(player) = ctx.state.roster.lookup(sender) {
        message.sender_name = player.name.clone();
    }

    let receiver = ctx
        .state
        .roster
        .find_by_name(&message.receiver_name)
        .map(|player| (player.id, player.name.clone()));
    match receiver {
        Some((receiver_id, _)) if receiver_id == sender => {
            debug!("Player {} whispered to themselves", sender);
            ctx.send_to_player(
                sender,
                &message.framed_for(sender, PrivateChatResponse::GeneralError),
            )?;
        }
        Some((receiver_id, receiver_name)) => {
            message.receiver_name = receiver_name;
            ctx.send_to_player(sender, &message.framed_for(sender, PrivateChatResponse::Sent))?;
            ctx.send_to_player(
                receiver_id,
                &message.framed_for(receiver_id, PrivateChatResponse::ReceivedNewWhisper),
            )?;
        }
        None => {
            ctx.send_to_player(
                sender,
                &message.framed_for(sender, PrivateChatResponse::NotOnline),
            )?;
        }
    }
    Ok(())
}

fn friend_request(ctx: &mut Dispatch<'_>, unit: &[u8]) -> Result<(), DispatchError> {
    let request = FriendRequest::decode(unit)?;
    let requester = request.requester;

    let Some(target) = ctx.resolve_name(&request.target_name) else {
        let notice = ctx.friend_notice(
            FriendResponseType::InvalidCharacter,
            0,
            request.target_name.clone(),
            false,
        );
        ctx.send_to_player(requester, &notice)?;
        return Ok(());
    };

    let failure = match ctx
        .state
        .friends
        .request(requester, target, request.best_friend)
    {
        Ok(outcome) => {
            if outcome == RequestOutcome::BestFriendUpgrade {
                debug!("Player {} asked {} to become best friends", requester, target);
            }
            let forwarded = FriendRequestNotice {
                requester_name: ctx.name_of(requester),
                best_friend: request.best_friend,
            };
            if !ctx.send_to_player(target, &forwarded)? {
                debug!("Friend request for offline player {} kept pending", target);
            }
            return Ok(());
        }
        Err(FriendError::AlreadyFriends) => FriendResponseType::AlreadyFriend,
        Err(FriendError::SelfFriendRequest) => FriendResponseType::InvalidCharacter,
        Err(e) => return Err(e.into()),
    };

    let notice = ctx.friend_notice(failure, target, ctx.name_of(target), false);
    ctx.send_to_player(requester, &notice)?;
    Ok(())
}

fn friend_response(ctx: &mut Dispatch<'_>, unit: &[u8]) -> Result<(), DispatchError> {
    let response = FriendResponse::decode(unit)?;
    let responder = response.responder;
    let code = FriendResponseCode::try_from(response.code).map_err(|value| {
        DispatchError::UnknownValue {
            field: "friend response code",
            value,
        }
    })?;

    let requester = ctx
        .state
        .friends
        .find_pending_requester_by_name(responder, &response.requester_name)
        .ok_or(FriendError::NoPendingRequest)?;
    let outcome = ctx.state.friends.respond(
        responder,
        requester,
        code == FriendResponseCode::Accepted,
    )?;

    let (result, best_friend) = match outcome {
        ResponseOutcome::Accepted { best_friend } => (FriendResponseType::Accepted, best_friend),
        ResponseOutcome::Declined => (FriendResponseType::from(code), false),
    };

    let to_requester = ctx.friend_notice(result, responder, ctx.name_of(responder), best_friend);
    ctx.send_to_player(requester, &to_requester)?;
    let to_responder = ctx.friend_notice(result, requester, ctx.name_of(requester), best_friend);
    ctx.send_to_player(responder, &to_responder)?;
    ctx.release_name(requester);
    Ok(())
}

fn remove_friend(ctx: &mut Dispatch<'_>, unit: &[u8]) -> Result<(), DispatchError> {
    let request = RemoveFriend::decode(unit)?;
    let player = request.player_id;

    let candidate = ctx
        .state
        .friends
        .find_friend_by_name(player, &request.friend_name)
        .or_else(|| ctx.resolve_name(&request.friend_name));
    let friend = match candidate {
        Some(friend) => ctx.state.friends.remove(player, friend).ok().map(|_| friend),
        None => None,
    };

    ctx.send_to_player(
        player,
        &RemoveFriendNotice {
            success: friend.is_some(),
            friend_name: request.friend_name.clone(),
        },
    )?;
    if let Some(friend) = friend {
        let notice = RemoveFriendNotice {
            success: true,
            friend_name: ctx.name_of(player),
        };
        ctx.send_to_player(friend, &notice)?;
        ctx.release_name(friend);
    }
    Ok(())
}

fn friends_list(ctx: &mut Dispatch<'_>, unit: &[u8]) -> Result<(), DispatchError> {
    let player = read_player_request(unit)?;
    let friends: Vec<(ObjectId, bool)> = ctx
        .state
        .friends
        .friends_of(player)
        .into_iter()
        .map(|(friend, relation)| (friend, relation.best_friend))
        .collect();
    let list = FriendsList {
        friends: friends
            .into_iter()
            .map(|(friend, best_friend)| FriendEntry {
                online: ctx.state.roster.contains(friend),
                best_friend,
                zone: ctx.zone_of(friend),
                friend_id: friend,
                name: ctx.name_of(friend),
            })
            .collect(),
    };
    ctx.send_to_player(player, &list)?;
    Ok(())
}

fn ignore_list(ctx: &mut Dispatch<'_>, unit: &[u8]) -> Result<(), DispatchError> {
    let player = read_player_request(unit)?;
    ctx.send_to_player(player, &IgnoreList)?;
    Ok(())
}

fn team_invite(ctx: &mut Dispatch<'_>, unit: &[u8]) -> Result<(), DispatchError> {
    let request = NamedTarget::decode_body(&mut WireReader::body(unit))?;
    let inviter = request.player_id;
    let target = ctx
        .state
        .roster
        .find_by_name(&request.target_name)
        .map(|player| player.id)
        .ok_or(TeamError::TargetUnreachable)?;

    let zone = ctx.zone_of(inviter);
    let team_id = ctx.state.teams.invite(inviter, target, zone)?;
    let invite = TeamInviteNotice {
        inviter_name: ctx.name_of(inviter),
        inviter_id: inviter,
    };
    ctx.send_to_player(target, &invite)?;
    ctx.broadcast_team(team_id)
}

fn team_invite_response(ctx: &mut Dispatch<'_>, unit: &[u8]) -> Result<(), DispatchError> {
    let response = TeamInviteResponse::decode(unit)?;
    if let Some(invite) = ctx.state.teams.pending_invite(response.player_id) {
        if invite.inviter != response.leader_id {
            debug!(
                "Invite answer from {} names {}, invite came from {}",
                response.player_id, response.leader_id, invite.inviter
            );
        }
    }
    let joined = ctx
        .state
        .teams
        .invite_response(response.player_id, !response.declined)?;
    match joined {
        Some(team_id) => ctx.broadcast_team(team_id),
        None => Ok(()),
    }
}

fn team_kick(ctx: &mut Dispatch<'_>, unit: &[u8]) -> Result<(), DispatchError> {
    let request = NamedTarget::decode_body(&mut WireReader::body(unit))?;
    let target = ctx
        .resolve_name(&request.target_name)
        .ok_or(TeamError::TargetNotMember)?;
    let outcome = ctx.state.teams.kick(request.player_id, target)?;
    ctx.apply_leave(outcome)
}

fn team_leave(ctx: &mut Dispatch<'_>, unit: &[u8]) -> Result<(), DispatchError> {
    let player = read_player_request(unit)?;
    let outcome = ctx.state.teams.leave(player)?;
    ctx.apply_leave(outcome)
}

fn team_set_loot(ctx: &mut Dispatch<'_>, unit: &[u8]) -> Result<(), DispatchError> {
    let request = TeamSetLoot::decode(unit)?;
    let policy = LootPolicy::try_from(request.option)?;
    let team_id = ctx.state.teams.set_loot(request.player_id, policy)?;
    ctx.broadcast_team(team_id)
}

fn team_set_leader(ctx: &mut Dispatch<'_>, unit: &[u8]) -> Result<(), DispatchError> {
    let request = TeamSetLeader::decode(unit)?;
    let team_id = ctx
        .state
        .teams
        .promote(request.player_id, request.new_leader)?;
    ctx.broadcast_team(team_id)
}

fn team_status(ctx: &mut Dispatch<'_>, unit: &[u8]) -> Result<(), DispatchError> {
    let player = read_player_request(unit)?;
    let state = ctx
        .state
        .teams
        .team_of(player)
        .map(|team| team.id)
        .and_then(|team_id| ctx.team_state(team_id))
        .unwrap_or_default();
    ctx.send_to_player(player, &state)?;
    Ok(())
}

// World lane

fn client_route(ctx: &mut Dispatch<'_>, unit: &[u8]) -> Result<(), DispatchError> {
    debug!(
        "Client route packet from connection {} ({} bytes)",
        ctx.origin,
        unit.len()
    );
    Ok(())
}
