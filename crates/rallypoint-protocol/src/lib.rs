//! Wire protocol and data model for Rallypoint.
//!
//! This crate defines the "language" that game clients and the relay
//! speak, and the records the room store persists:
//!
//! - **Identity types** ([`MemberId`], [`RoomId`], [`RoomCode`], [`CommandId`])
//! - **Data model** ([`Room`], [`Member`], [`CommandRecord`], [`Role`],
//!   [`JobTag`], [`Target`], ...)
//! - **Events** ([`ClientEvent`], [`ServerEvent`], [`Envelope`])
//! - **Codec** ([`Codec`] trait, [`JsonCodec`])
//! - **Errors** ([`ProtocolError`], [`ParseEnumError`])
//!
//! # Architecture
//!
//! ```text
//! Transport (bytes) → Protocol (Envelope<ClientEvent>) → Relay (room context)
//! ```
//!
//! The protocol layer knows nothing about connections or persistence.

mod codec;
mod error;
mod events;
mod model;
mod types;

pub use codec::{Codec, JsonCodec};
pub use error::{ParseEnumError, ProtocolError};
pub use events::{ClientEvent, Envelope, ServerEvent};
pub use model::{
    CommandKind, CommandRecord, CommandStatus, HistoryEntry, JobTag, Member,
    MemberProfile, Params, PublicRoom, Role, Room, RoomDetails, RoomStatus, Target,
    normalize_params,
};
pub use types::{CommandId, ErrorCode, MemberId, RoomCode, RoomId};
