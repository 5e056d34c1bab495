//! Durable room state for Rallypoint.
//!
//! Everything that must survive a restart lives here, in one SQLite
//! database:
//!
//! - [`RoomStore`]: rooms, members, roles and job tags; the only source of
//!   truth for "who is allowed"
//! - [`CommandLog`]: append-only record of dispatched commands
//! - [`Database`]: the shared connection, schema and clock
//!
//! # Key types
//!
//! - [`StoreConfig`]: join-code retries, TTL and capacity limits
//! - [`RolePattern`]: compiled `MT|ST` style job-tag selector
//! - [`Clock`]: injectable time source ([`SystemClock`], [`ManualClock`])
//!
//! All methods are synchronous. Async callers should run them on the
//! blocking pool (`tokio::task::spawn_blocking`).

mod clock;
mod code;
mod commands;
mod config;
mod db;
mod error;
mod pattern;
mod rooms;

pub use clock::{Clock, ManualClock, SystemClock};
pub use code::{generate_unique_code, random_code};
pub use commands::{CommandLog, NewCommand, target_label};
pub use config::StoreConfig;
pub use db::Database;
pub use error::StoreError;
pub use pattern::RolePattern;
pub use rooms::{NewRoom, RoomStore};
