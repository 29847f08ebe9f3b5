pub mod ids;
pub mod messages;
pub mod wire;

pub use ids::{Channel, ChatChannel, ChatId, ClientId, InternalId, MasterId, WorldId};
pub use messages::{WireMessage, ZoneId};
pub use wire::{WireError, WireReader, WireWriter};

/// Persistent identity of a player character.
pub type ObjectId = u64;

pub const DEFAULT_CHAT_PORT: u16 = 1501;
pub const DEFAULT_MAX_CLIENTS: usize = 50;
pub const DEFAULT_TICK_RATE: u32 = 30;
/// Frame length prefix used by the stream transport.
pub const FRAME_PREFIX_LEN: usize = 4;
/// Units larger than this are treated as a broken stream.
pub const MAX_FRAME_LEN: usize = 1 << 20;
