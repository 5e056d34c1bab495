//! Live session tracking for Rallypoint.
//!
//! This crate answers one question: "is this member reachable right now,
//! and how?" It holds:
//!
//! 1. **Authorization**: the [`Authorizer`] predicate supplied by the
//!    external whitelist layer
//! 2. **Connection handles**: [`ConnectionHandle`], the push side of a
//!    live connection
//! 3. **The registry**: [`SessionRegistry`], a bidirectional index between
//!    member identities and live connections
//!
//! # How it fits in the stack
//!
//! ```text
//! Relay (above)     ← resolves targets through the registry
//!     ↕
//! Session (this)    ← volatile, in-memory, lost on restart
//!     ↕
//! Protocol (below)  ← MemberId, RoomCode, ServerEvent
//! ```
//!
//! The registry never decides who is *allowed* to do something; the room
//! store is the only authority on membership and roles.

mod auth;
mod error;
mod handle;
mod registry;

pub use auth::{AllowAll, Authorizer};
pub use error::SessionError;
pub use handle::{ConnectionHandle, Outbound};
pub use registry::{Session, SessionRegistry};
