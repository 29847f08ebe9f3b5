//! Channel and message-id catalogue shared by every peer of the chat server.
//!
//! The numeric values are part of the wire format and must never be
//! renumbered: world servers and game clients compare them byte for byte.

use std::fmt;

/// Declares a `u8`/`u32`-backed wire enum with a fallible conversion from the
/// raw byte found in a unit's classification prefix.
macro_rules! wire_enum {
    (
        $(#[$meta:meta])*
        pub enum $name:ident : $repr:ty {
            $($(#[$vmeta:meta])* $variant:ident = $value:expr,)+
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        #[repr($repr)]
        pub enum $name {
            $($(#[$vmeta])* $variant = $value,)+
        }

        impl TryFrom<u8> for $name {
            type Error = u8;

            fn try_from(value: u8) -> Result<Self, Self::Error> {
                match value as $repr {
                    $(v if v == $value => Ok($name::$variant),)+
                    _ => Err(value),
                }
            }
        }

        impl From<$name> for u32 {
            fn from(value: $name) -> u32 {
                value as $repr as u32
            }
        }
    };
}

wire_enum! {
    /// Top-level classification (byte 1 of every unit).
    pub enum Channel: u16 {
        Server = 0,
        Auth = 1,
        Chat = 2,
        ChatInternal = 3,
        World = 4,
        Client = 5,
        Master = 6,
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Channel::Server => "SERVER",
            Channel::Auth => "AUTH",
            Channel::Chat => "CHAT",
            Channel::ChatInternal => "CHAT_INTERNAL",
            Channel::World => "WORLD",
            Channel::Client => "CLIENT",
            Channel::Master => "MASTER",
        };
        f.write_str(name)
    }
}

wire_enum! {
    /// Server-to-server control messages.
    pub enum InternalId: u32 {
        PlayerAdded = 0,
        PlayerRemoved = 1,
        AddFriend = 2,
        AddBestFriend = 3,
        AddToTeam = 4,
        RemoveFromTeam = 5,
        MuteUpdate = 6,
        CreateTeam = 7,
        TeamUpdate = 8,
        RouteToPlayer = 9,
        Announcement = 10,
        RelayMessage = 11,
    }
}

wire_enum! {
    /// Client-originated messages forwarded by world servers.
    pub enum ChatId: u32 {
        LoginSessionNotify = 0,
        GeneralChatMessage = 1,
        PrivateChatMessage = 2,
        UserChannelChatMessage = 3,
        WorldDisconnectRequest = 4,
        WorldProximityResponse = 5,
        WorldParcelResponse = 6,
        AddFriendRequest = 7,
        AddFriendResponse = 8,
        RemoveFriend = 9,
        GetFriendsList = 10,
        AddIgnore = 11,
        RemoveIgnore = 12,
        GetIgnoreList = 13,
        TeamMissedInviteCheck = 14,
        TeamInvite = 15,
        TeamInviteResponse = 16,
        TeamKick = 17,
        TeamLeave = 18,
        TeamSetLoot = 19,
        TeamSetLeader = 20,
        TeamGetStatus = 21,
    }
}

wire_enum! {
    pub enum WorldId: u32 {
        ClientRoutePacket = 21,
    }
}

wire_enum! {
    /// Messages delivered to game clients inside a route-to-player envelope.
    pub enum ClientId: u32 {
        AddFriendRequest = 27,
        AddFriendResponse = 28,
        RemoveFriendResponse = 29,
        GetFriendsListResponse = 30,
        UpdateFriendNotify = 31,
        GetIgnoreListResponse = 34,
        TeamInvite = 35,
        TeamState = 36,
    }
}

wire_enum! {
    pub enum MasterId: u32 {
        ServerInfo = 5,
        Shutdown = 15,
        ShutdownResponse = 16,
    }
}

/// Single-byte frames the transport sends instead of a packet.
pub mod notice {
    /// Sent to a peer refused because the server is full.
    pub const NO_FREE_INCOMING_CONNECTIONS: u8 = 18;
}

wire_enum! {
    /// Chat channel byte inside general and private chat messages.
    pub enum ChatChannel: u8 {
        SystemNotify = 0,
        SystemWarning = 1,
        SystemError = 2,
        Broadcast = 3,
        Local = 4,
        LocalNoAnim = 5,
        Emote = 6,
        PrivateChat = 7,
        Team = 8,
        TeamLocal = 9,
        Guild = 10,
        GuildNotify = 11,
        Property = 12,
        Admin = 13,
    }
}

wire_enum! {
    /// Response code attached to private chat so that the sender's echo and
    /// the receiver's copy render differently.
    pub enum PrivateChatResponse: u8 {
        Sent = 0,
        NotOnline = 1,
        GeneralError = 2,
        ReceivedNewWhisper = 3,
        NotFriends = 4,
        SenderFreeTrial = 5,
        ReceiverFreeTrial = 6,
    }
}

wire_enum! {
    /// What a player answered to a friend request.
    pub enum FriendResponseCode: u8 {
        Accepted = 0,
        Rejected = 1,
        Busy = 2,
        Cancelled = 3,
    }
}

wire_enum! {
    /// Outcome reported back to a client for a friend operation.
    pub enum FriendResponseType: u8 {
        Accepted = 0,
        AlreadyFriend = 1,
        InvalidCharacter = 2,
        GeneralError = 3,
        YourFriendsListFull = 4,
        TheirFriendsListFull = 5,
        Declined = 6,
        Busy = 7,
        NotOnline = 8,
        WaitingApproval = 9,
        Mythran = 10,
        Cancelled = 11,
        FriendIsFreeTrial = 12,
    }
}

impl From<FriendResponseCode> for FriendResponseType {
    fn from(code: FriendResponseCode) -> Self {
        match code {
            FriendResponseCode::Accepted => FriendResponseType::Accepted,
            FriendResponseCode::Rejected => FriendResponseType::Declined,
            FriendResponseCode::Busy => FriendResponseType::Busy,
            FriendResponseCode::Cancelled => FriendResponseType::Cancelled,
        }
    }
}

wire_enum! {
    pub enum FriendNotifyType: u8 {
        LoggedOut = 0,
        LoggedIn = 1,
        ChangedWorld = 2,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_channel_from_byte() {
        assert_eq!(Channel::try_from(2), Ok(Channel::Chat));
        assert_eq!(Channel::try_from(3), Ok(Channel::ChatInternal));
        assert_eq!(Channel::try_from(4), Ok(Channel::World));
        assert_eq!(Channel::try_from(99), Err(99));
    }

    #[test]
    fn test_message_id_values_are_stable() {
        assert_eq!(u32::from(InternalId::RelayMessage), 11);
        assert_eq!(u32::from(ChatId::TeamGetStatus), 21);
        assert_eq!(u32::from(ChatId::AddFriendRequest), 7);
        assert_eq!(ChatId::try_from(20), Ok(ChatId::TeamSetLeader));
        assert_eq!(WorldId::try_from(21), Ok(WorldId::ClientRoutePacket));
        assert!(WorldId::try_from(0).is_err());
    }

    #[test]
    fn test_friend_code_maps_to_response_type() {
        assert_eq!(
            FriendResponseType::from(FriendResponseCode::Rejected),
            FriendResponseType::Declined
        );
        assert_eq!(
            FriendResponseType::from(FriendResponseCode::Cancelled),
            FriendResponseType::Cancelled
        );
    }

    #[test]
    fn test_channel_display() {
        assert_eq!(Channel::ChatInternal.to_string(), "CHAT_INTERNAL");
        assert_eq!(Channel::World.to_string(), "WORLD");
    }
}
