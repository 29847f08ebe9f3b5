//! Typed bodies for every message the chat server reads or writes.
//!
//! Messages on the chat lane are forwarded by world servers, which put the
//! originating player's object id in front of the client's payload. Messages
//! delivered to clients travel the other way wrapped in a route-to-player
//! envelope so the world server knows whom to hand them to.

use crate::ids::{
    Channel, ChatId, ClientId, FriendNotifyType, FriendResponseType, InternalId, MasterId,
    PrivateChatResponse,
};
use crate::wire::{decode_header, WireError, WireReader, WireWriter, NAME_UNITS};
use crate::ObjectId;
use serde::{Deserialize, Serialize};

/// A message with a fixed `(channel, id)` and a body codec.
pub trait WireMessage: Sized {
    const CHANNEL: Channel;
    const ID: u32;
    const NAME: &'static str;

    fn encode_body(&self, writer: &mut WireWriter) -> Result<(), WireError>;
    fn decode_body(reader: &mut WireReader<'_>) -> Result<Self, WireError>;

    /// Header plus body.
    fn encode(&self) -> Result<Vec<u8>, WireError> {
        let mut writer = WireWriter::with_header(Self::CHANNEL, Self::ID);
        self.encode_body(&mut writer)?;
        Ok(writer.into_bytes())
    }

    /// Checks the header and decodes the body of a complete unit.
    fn decode(unit: &[u8]) -> Result<Self, WireError> {
        let (channel, message_id) = decode_header(unit)?;
        if channel as u16 != Self::CHANNEL as u16 || message_id as u32 != Self::ID {
            return Err(WireError::UnexpectedMessage {
                expected: Self::NAME,
                channel,
                message_id,
            });
        }
        Self::decode_body(&mut WireReader::body(unit))
    }
}

/// Implements [`WireMessage`] for a fixed-layout struct that bincode encodes
/// field by field.
macro_rules! fixed_message {
    ($ty:ty, $channel:expr, $id:expr) => {
        impl WireMessage for $ty {
            const CHANNEL: Channel = $channel;
            const ID: u32 = $id as u32;
            const NAME: &'static str = stringify!($ty);

            fn encode_body(&self, writer: &mut WireWriter) -> Result<(), WireError> {
                writer.write(self)
            }

            fn decode_body(reader: &mut WireReader<'_>) -> Result<Self, WireError> {
                reader.read()
            }
        }
    };
}

/// Map, instance and clone of a zone.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ZoneId {
    pub map_id: u16,
    pub instance_id: u16,
    pub clone_id: u32,
}

impl ZoneId {
    pub fn new(map_id: u16, instance_id: u16, clone_id: u32) -> Self {
        Self {
            map_id,
            instance_id,
            clone_id,
        }
    }
}

// ---------------------------------------------------------------------------
// Internal lane
// ---------------------------------------------------------------------------

/// A world server announces a player that just loaded into one of its zones.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlayerAdded {
    pub player_id: ObjectId,
    pub name: String,
    pub zone: ZoneId,
    /// Unix seconds, zero when the player is not muted.
    pub mute_expiry: u64,
}

impl WireMessage for PlayerAdded {
    const CHANNEL: Channel = Channel::ChatInternal;
    const ID: u32 = InternalId::PlayerAdded as u32;
    const NAME: &'static str = "PlayerAdded";

    fn encode_body(&self, writer: &mut WireWriter) -> Result<(), WireError> {
        writer.write(&self.player_id)?;
        writer.write_narrow_string(&self.name)?;
        writer.write(&self.zone)?;
        writer.write(&self.mute_expiry)
    }

    fn decode_body(reader: &mut WireReader<'_>) -> Result<Self, WireError> {
        Ok(Self {
            player_id: reader.read()?,
            name: reader.read_narrow_string()?,
            zone: reader.read()?,
            mute_expiry: reader.read()?,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlayerRemoved {
    pub player_id: ObjectId,
}
fixed_message!(PlayerRemoved, Channel::ChatInternal, InternalId::PlayerRemoved);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MuteUpdate {
    pub player_id: ObjectId,
    /// Unix seconds, zero clears the mute.
    pub expiry: u64,
}
fixed_message!(MuteUpdate, Channel::ChatInternal, InternalId::MuteUpdate);

/// A world server groups players into a team of its own (minigames).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreateTeam {
    pub requester: ObjectId,
    pub members: Vec<ObjectId>,
    pub zone: ZoneId,
}

impl WireMessage for CreateTeam {
    const CHANNEL: Channel = Channel::ChatInternal;
    const ID: u32 = InternalId::CreateTeam as u32;
    const NAME: &'static str = "CreateTeam";

    fn encode_body(&self, writer: &mut WireWriter) -> Result<(), WireError> {
        writer.write(&self.requester)?;
        writer.write(&(self.members.len() as u32))?;
        for member in &self.members {
            writer.write(member)?;
        }
        writer.write(&self.zone)
    }

    fn decode_body(reader: &mut WireReader<'_>) -> Result<Self, WireError> {
        let requester = reader.read()?;
        let count: u32 = reader.read()?;
        // Eight bytes per member must still be available.
        let needed = (count as usize).saturating_mul(8);
        if needed > reader.remaining() {
            return Err(WireError::Truncated {
                offset: reader.position(),
                needed: needed - reader.remaining(),
            });
        }
        let members = (0..count)
            .map(|_| reader.read())
            .collect::<Result<Vec<ObjectId>, _>>()?;
        Ok(Self {
            requester,
            members,
            zone: reader.read()?,
        })
    }
}

/// Chat text bridged to and from the external relay channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelayMessage {
    pub sender: String,
    pub text: String,
}

impl WireMessage for RelayMessage {
    const CHANNEL: Channel = Channel::ChatInternal;
    const ID: u32 = InternalId::RelayMessage as u32;
    const NAME: &'static str = "RelayMessage";

    fn encode_body(&self, writer: &mut WireWriter) -> Result<(), WireError> {
        writer.write_byte_string(&self.sender)?;
        writer.write_byte_string(&self.text)
    }

    fn decode_body(reader: &mut WireReader<'_>) -> Result<Self, WireError> {
        Ok(Self {
            sender: reader.read_byte_string()?,
            text: reader.read_byte_string()?,
        })
    }
}

/// Wraps `inner` so the world server owning `target` delivers it.
pub fn route_to_player(target: ObjectId, inner: &[u8]) -> Result<Vec<u8>, WireError> {
    let mut writer = WireWriter::with_header(Channel::ChatInternal, InternalId::RouteToPlayer);
    writer.write(&target)?;
    writer.write_raw(inner);
    Ok(writer.into_bytes())
}

/// Splits a route-to-player envelope into the target and the inner unit.
pub fn decode_route(unit: &[u8]) -> Result<(ObjectId, &[u8]), WireError> {
    let (channel, message_id) = decode_header(unit)?;
    if channel as u16 != Channel::ChatInternal as u16
        || message_id as u32 != InternalId::RouteToPlayer as u32
    {
        return Err(WireError::UnexpectedMessage {
            expected: "RouteToPlayer",
            channel,
            message_id,
        });
    }
    let mut reader = WireReader::body(unit);
    let target = reader.read()?;
    Ok((target, reader.rest()))
}

// ---------------------------------------------------------------------------
// Chat lane
// ---------------------------------------------------------------------------

/// Body of requests that carry nothing but the player who sent them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlayerRequest {
    pub player_id: ObjectId,
}

/// General chat. The first field is the routing id: the sender on the way in,
/// the receiver on the way out.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatMessage {
    pub routing_id: ObjectId,
    pub channel: u8,
    pub sender_name: String,
    pub sender_id: ObjectId,
    pub text: Vec<u16>,
}

impl WireMessage for ChatMessage {
    const CHANNEL: Channel = Channel::Chat;
    const ID: u32 = ChatId::GeneralChatMessage as u32;
    const NAME: &'static str = "ChatMessage";

    fn encode_body(&self, writer: &mut WireWriter) -> Result<(), WireError> {
        writer.write(&self.routing_id)?;
        writer.write(&self.channel)?;
        writer.write(&(self.text.len() as u32))?;
        writer.write_fixed_name(&self.sender_name, NAME_UNITS);
        writer.write(&self.sender_id)?;
        writer.write(&0u16)?;
        writer.write(&0u8)?;
        writer.write_units(&self.text);
        writer.write(&0u16)
    }

    fn decode_body(reader: &mut WireReader<'_>) -> Result<Self, WireError> {
        let routing_id = reader.read()?;
        let channel = reader.read()?;
        let size: u32 = reader.read()?;
        let sender_name = reader.read_fixed_name(NAME_UNITS)?;
        let sender_id = reader.read()?;
        reader.skip(3)?;
        let text = reader.read_units(size as usize)?;
        Ok(Self {
            routing_id,
            channel,
            sender_name,
            sender_id,
            text,
        })
    }
}

/// Whisper between two players, addressed by display name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrivateChatMessage {
    pub routing_id: ObjectId,
    pub channel: u8,
    pub sender_name: String,
    pub sender_id: ObjectId,
    pub receiver_name: String,
    pub response: u8,
    pub text: Vec<u16>,
}

impl PrivateChatMessage {
    /// Copy addressed to `routing_id` carrying `response`.
    pub fn framed_for(&self, routing_id: ObjectId, response: PrivateChatResponse) -> Self {
        Self {
            routing_id,
            response: response as u8,
            ..self.clone()
        }
    }
}

impl WireMessage for PrivateChatMessage {
    const CHANNEL: Channel = Channel::Chat;
    const ID: u32 = ChatId::PrivateChatMessage as u32;
    const NAME: &'static str = "PrivateChatMessage";

    fn encode_body(&self, writer: &mut WireWriter) -> Result<(), WireError> {
        writer.write(&self.routing_id)?;
        writer.write(&self.channel)?;
        writer.write(&(self.text.len() as u32))?;
        writer.write_fixed_name(&self.sender_name, NAME_UNITS);
        writer.write(&self.sender_id)?;
        writer.write(&0u16)?;
        writer.write(&0u8)?;
        writer.write_fixed_name(&self.receiver_name, NAME_UNITS);
        writer.write(&0u8)?;
        writer.write(&self.response)?;
        writer.write_units(&self.text);
        writer.write(&0u16)
    }

    fn decode_body(reader: &mut WireReader<'_>) -> Result<Self, WireError> {
        let routing_id = reader.read()?;
        let channel = reader.read()?;
        let size: u32 = reader.read()?;
        let sender_name = reader.read_fixed_name(NAME_UNITS)?;
        let sender_id = reader.read()?;
        reader.skip(3)?;
        let receiver_name = reader.read_fixed_name(NAME_UNITS)?;
        reader.skip(1)?;
        let response = reader.read()?;
        let text = reader.read_units(size as usize)?;
        Ok(Self {
            routing_id,
            channel,
            sender_name,
            sender_id,
            receiver_name,
            response,
            text,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FriendRequest {
    pub requester: ObjectId,
    pub target_name: String,
    pub best_friend: bool,
}

impl WireMessage for FriendRequest {
    const CHANNEL: Channel = Channel::Chat;
    const ID: u32 = ChatId::AddFriendRequest as u32;
    const NAME: &'static str = "FriendRequest";

    fn encode_body(&self, writer: &mut WireWriter) -> Result<(), WireError> {
        writer.write(&self.requester)?;
        writer.write_fixed_name(&self.target_name, NAME_UNITS);
        writer.write_bool(self.best_friend)
    }

    fn decode_body(reader: &mut WireReader<'_>) -> Result<Self, WireError> {
        Ok(Self {
            requester: reader.read()?,
            target_name: reader.read_fixed_name(NAME_UNITS)?,
            best_friend: reader.read_bool()?,
        })
    }
}

/// A player's answer to a friend request they received.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FriendResponse {
    pub responder: ObjectId,
    pub code: u8,
    pub requester_name: String,
}

impl WireMessage for FriendResponse {
    const CHANNEL: Channel = Channel::Chat;
    const ID: u32 = ChatId::AddFriendResponse as u32;
    const NAME: &'static str = "FriendResponse";

    fn encode_body(&self, writer: &mut WireWriter) -> Result<(), WireError> {
        writer.write(&self.responder)?;
        writer.write(&self.code)?;
        writer.write_fixed_name(&self.requester_name, NAME_UNITS);
        Ok(())
    }

    fn decode_body(reader: &mut WireReader<'_>) -> Result<Self, WireError> {
        Ok(Self {
            responder: reader.read()?,
            code: reader.read()?,
            requester_name: reader.read_fixed_name(NAME_UNITS)?,
        })
    }
}

/// Request to drop a friend, addressed by display name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoveFriend {
    pub player_id: ObjectId,
    pub friend_name: String,
}

impl WireMessage for RemoveFriend {
    const CHANNEL: Channel = Channel::Chat;
    const ID: u32 = ChatId::RemoveFriend as u32;
    const NAME: &'static str = "RemoveFriend";

    fn encode_body(&self, writer: &mut WireWriter) -> Result<(), WireError> {
        writer.write(&self.player_id)?;
        writer.write_fixed_name(&self.friend_name, NAME_UNITS);
        Ok(())
    }

    fn decode_body(reader: &mut WireReader<'_>) -> Result<Self, WireError> {
        Ok(Self {
            player_id: reader.read()?,
            friend_name: reader.read_fixed_name(NAME_UNITS)?,
        })
    }
}

/// Team invite or kick, both of which name their target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NamedTarget {
    pub player_id: ObjectId,
    pub target_name: String,
}

impl NamedTarget {
    pub fn encode_as(&self, id: ChatId) -> Result<Vec<u8>, WireError> {
        let mut writer = WireWriter::with_header(Channel::Chat, id);
        writer.write(&self.player_id)?;
        writer.write_fixed_name(&self.target_name, NAME_UNITS);
        Ok(writer.into_bytes())
    }

    pub fn decode_body(reader: &mut WireReader<'_>) -> Result<Self, WireError> {
        Ok(Self {
            player_id: reader.read()?,
            target_name: reader.read_fixed_name(NAME_UNITS)?,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TeamInviteResponse {
    pub player_id: ObjectId,
    pub declined: bool,
    pub leader_id: ObjectId,
}
fixed_message!(TeamInviteResponse, Channel::Chat, ChatId::TeamInviteResponse);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TeamSetLeader {
    pub player_id: ObjectId,
    pub new_leader: ObjectId,
}
fixed_message!(TeamSetLeader, Channel::Chat, ChatId::TeamSetLeader);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TeamSetLoot {
    pub player_id: ObjectId,
    pub option: u8,
}
fixed_message!(TeamSetLoot, Channel::Chat, ChatId::TeamSetLoot);

/// Builds a chat-lane request whose body is only the sender's id.
pub fn player_request(id: ChatId, player_id: ObjectId) -> Result<Vec<u8>, WireError> {
    let mut writer = WireWriter::with_header(Channel::Chat, id);
    writer.write(&PlayerRequest { player_id })?;
    Ok(writer.into_bytes())
}

// ---------------------------------------------------------------------------
// Client notices (delivered inside route-to-player)
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FriendRequestNotice {
    pub requester_name: String,
    pub best_friend: bool,
}

impl WireMessage for FriendRequestNotice {
    const CHANNEL: Channel = Channel::Client;
    const ID: u32 = ClientId::AddFriendRequest as u32;
    const NAME: &'static str = "FriendRequestNotice";

    fn encode_body(&self, writer: &mut WireWriter) -> Result<(), WireError> {
        writer.write_fixed_name(&self.requester_name, NAME_UNITS);
        writer.write_bool(self.best_friend)
    }

    fn decode_body(reader: &mut WireReader<'_>) -> Result<Self, WireError> {
        Ok(Self {
            requester_name: reader.read_fixed_name(NAME_UNITS)?,
            best_friend: reader.read_bool()?,
        })
    }
}

/// Result of a friend request as seen by one side. `friend_*` fields describe
/// the other party.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FriendResponseNotice {
    pub response: FriendResponseType,
    pub friend_online: bool,
    pub friend_name: String,
    pub friend_id: ObjectId,
    pub friend_zone: ZoneId,
    pub best_friend: bool,
}

impl WireMessage for FriendResponseNotice {
    const CHANNEL: Channel = Channel::Client;
    const ID: u32 = ClientId::AddFriendResponse as u32;
    const NAME: &'static str = "FriendResponseNotice";

    fn encode_body(&self, writer: &mut WireWriter) -> Result<(), WireError> {
        writer.write(&(self.response as u8))?;
        writer.write_bool(self.friend_online)?;
        writer.write_fixed_name(&self.friend_name, NAME_UNITS);
        writer.write(&self.friend_id)?;
        writer.write(&self.friend_zone)?;
        writer.write_bool(self.best_friend)?;
        // Free-trial flag, never set.
        writer.write(&0u8)
    }

    fn decode_body(reader: &mut WireReader<'_>) -> Result<Self, WireError> {
        let offset = reader.position();
        let raw: u8 = reader.read()?;
        let response = FriendResponseType::try_from(raw).map_err(|raw| WireError::Invalid {
            offset,
            reason: format!("unknown friend response type {raw}"),
        })?;
        let notice = Self {
            response,
            friend_online: reader.read_bool()?,
            friend_name: reader.read_fixed_name(NAME_UNITS)?,
            friend_id: reader.read()?,
            friend_zone: reader.read()?,
            best_friend: reader.read_bool()?,
        };
        reader.skip(1)?;
        Ok(notice)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoveFriendNotice {
    pub success: bool,
    pub friend_name: String,
}

impl WireMessage for RemoveFriendNotice {
    const CHANNEL: Channel = Channel::Client;
    const ID: u32 = ClientId::RemoveFriendResponse as u32;
    const NAME: &'static str = "RemoveFriendNotice";

    fn encode_body(&self, writer: &mut WireWriter) -> Result<(), WireError> {
        writer.write_bool(self.success)?;
        writer.write_fixed_name(&self.friend_name, NAME_UNITS);
        Ok(())
    }

    fn decode_body(reader: &mut WireReader<'_>) -> Result<Self, WireError> {
        Ok(Self {
            success: reader.read_bool()?,
            friend_name: reader.read_fixed_name(NAME_UNITS)?,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FriendEntry {
    pub online: bool,
    pub best_friend: bool,
    pub zone: ZoneId,
    pub friend_id: ObjectId,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct FriendsList {
    pub friends: Vec<FriendEntry>,
}

impl WireMessage for FriendsList {
    const CHANNEL: Channel = Channel::Client;
    const ID: u32 = ClientId::GetFriendsListResponse as u32;
    const NAME: &'static str = "FriendsList";

    fn encode_body(&self, writer: &mut WireWriter) -> Result<(), WireError> {
        writer.write(&0u8)?;
        // Legacy length field; clients skip it.
        writer.write(&1u16)?;
        writer.write(&(self.friends.len() as u16))?;
        for entry in &self.friends {
            writer.write_bool(entry.online)?;
            writer.write_bool(entry.best_friend)?;
            writer.write(&0u8)?;
            writer.write_raw(&[0; 5]);
            writer.write(&entry.zone)?;
            writer.write(&entry.friend_id)?;
            writer.write_fixed_name(&entry.name, NAME_UNITS);
            writer.write_raw(&[0; 6]);
        }
        Ok(())
    }

    fn decode_body(reader: &mut WireReader<'_>) -> Result<Self, WireError> {
        reader.skip(3)?;
        let count: u16 = reader.read()?;
        let mut friends = Vec::with_capacity((count as usize).min(reader.remaining()));
        for _ in 0..count {
            let online = reader.read_bool()?;
            let best_friend = reader.read_bool()?;
            reader.skip(6)?;
            let zone = reader.read()?;
            let friend_id = reader.read()?;
            let name = reader.read_fixed_name(NAME_UNITS)?;
            reader.skip(6)?;
            friends.push(FriendEntry {
                online,
                best_friend,
                zone,
                friend_id,
                name,
            });
        }
        Ok(Self { friends })
    }
}

/// Ignore lists are not tracked; the server always answers with an empty one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct IgnoreList;

impl WireMessage for IgnoreList {
    const CHANNEL: Channel = Channel::Client;
    const ID: u32 = ClientId::GetIgnoreListResponse as u32;
    const NAME: &'static str = "IgnoreList";

    fn encode_body(&self, writer: &mut WireWriter) -> Result<(), WireError> {
        writer.write(&0u8)?;
        writer.write(&0u16)
    }

    fn decode_body(reader: &mut WireReader<'_>) -> Result<Self, WireError> {
        reader.skip(3)?;
        Ok(IgnoreList)
    }
}

/// Presence change of a friend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FriendUpdateNotice {
    pub notify: FriendNotifyType,
    pub friend_name: String,
    pub zone: ZoneId,
    pub best_friend: bool,
}

impl WireMessage for FriendUpdateNotice {
    const CHANNEL: Channel = Channel::Client;
    const ID: u32 = ClientId::UpdateFriendNotify as u32;
    const NAME: &'static str = "FriendUpdateNotice";

    fn encode_body(&self, writer: &mut WireWriter) -> Result<(), WireError> {
        writer.write(&(self.notify as u8))?;
        writer.write_fixed_name(&self.friend_name, NAME_UNITS);
        writer.write(&self.zone)?;
        writer.write_bool(self.best_friend)?;
        writer.write(&0u8)
    }

    fn decode_body(reader: &mut WireReader<'_>) -> Result<Self, WireError> {
        let offset = reader.position();
        let notify = FriendNotifyType::try_from(reader.read::<u8>()?).map_err(|raw| {
            WireError::Invalid {
                offset,
                reason: format!("unknown friend notify type {raw}"),
            }
        })?;
        let notice = Self {
            notify,
            friend_name: reader.read_fixed_name(NAME_UNITS)?,
            zone: reader.read()?,
            best_friend: reader.read_bool()?,
        };
        reader.skip(1)?;
        Ok(notice)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TeamInviteNotice {
    pub inviter_name: String,
    pub inviter_id: ObjectId,
}

impl WireMessage for TeamInviteNotice {
    const CHANNEL: Channel = Channel::Client;
    const ID: u32 = ClientId::TeamInvite as u32;
    const NAME: &'static str = "TeamInviteNotice";

    fn encode_body(&self, writer: &mut WireWriter) -> Result<(), WireError> {
        writer.write_fixed_name(&self.inviter_name, NAME_UNITS);
        writer.write(&self.inviter_id)
    }

    fn decode_body(reader: &mut WireReader<'_>) -> Result<Self, WireError> {
        Ok(Self {
            inviter_name: reader.read_fixed_name(NAME_UNITS)?,
            inviter_id: reader.read()?,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TeamMemberInfo {
    pub player_id: ObjectId,
    pub name: String,
    pub online: bool,
    pub zone: ZoneId,
}

/// Complete state of a team. An empty member list tells the receiver that
/// they are no longer in a team.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct TeamState {
    pub team_id: u64,
    pub leader_id: ObjectId,
    pub loot: u8,
    pub local: bool,
    pub members: Vec<TeamMemberInfo>,
}

impl WireMessage for TeamState {
    const CHANNEL: Channel = Channel::Client;
    const ID: u32 = ClientId::TeamState as u32;
    const NAME: &'static str = "TeamState";

    fn encode_body(&self, writer: &mut WireWriter) -> Result<(), WireError> {
        writer.write(&self.team_id)?;
        writer.write(&self.leader_id)?;
        writer.write(&self.loot)?;
        writer.write_bool(self.local)?;
        writer.write(&(self.members.len() as u8))?;
        for member in &self.members {
            writer.write(&member.player_id)?;
            writer.write_fixed_name(&member.name, NAME_UNITS);
            writer.write_bool(member.online)?;
            writer.write(&member.zone)?;
        }
        Ok(())
    }

    fn decode_body(reader: &mut WireReader<'_>) -> Result<Self, WireError> {
        let team_id = reader.read()?;
        let leader_id = reader.read()?;
        let loot = reader.read()?;
        let local = reader.read_bool()?;
        let count: u8 = reader.read()?;
        let mut members = Vec::with_capacity(count as usize);
        for _ in 0..count {
            members.push(TeamMemberInfo {
                player_id: reader.read()?,
                name: reader.read_fixed_name(NAME_UNITS)?,
                online: reader.read_bool()?,
                zone: reader.read()?,
            });
        }
        Ok(Self {
            team_id,
            leader_id,
            loot,
            local,
            members,
        })
    }
}

// ---------------------------------------------------------------------------
// Master link
// ---------------------------------------------------------------------------

/// Sent to the master when the link comes up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerInfo {
    pub port: u32,
    pub zone_id: u32,
    pub instance_id: u32,
    pub server_type: u32,
    pub ip: String,
}

/// Server type reported by the chat server.
pub const SERVER_TYPE_CHAT: u32 = 2;

impl WireMessage for ServerInfo {
    const CHANNEL: Channel = Channel::Master;
    const ID: u32 = MasterId::ServerInfo as u32;
    const NAME: &'static str = "ServerInfo";

    fn encode_body(&self, writer: &mut WireWriter) -> Result<(), WireError> {
        writer.write(&self.port)?;
        writer.write(&self.zone_id)?;
        writer.write(&self.instance_id)?;
        writer.write(&self.server_type)?;
        writer.write_byte_string(&self.ip)
    }

    fn decode_body(reader: &mut WireReader<'_>) -> Result<Self, WireError> {
        Ok(Self {
            port: reader.read()?,
            zone_id: reader.read()?,
            instance_id: reader.read()?,
            server_type: reader.read()?,
            ip: reader.read_byte_string()?,
        })
    }
}
