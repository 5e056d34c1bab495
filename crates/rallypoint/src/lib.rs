//! # Rallypoint
//!
//! Room and command relay for cooperating game clients.
//!
//! A controller creates a short-lived room and shares its six-character
//! join code. Members join over a WebSocket, and the controller (or a
//! leader) dispatches movement and chat commands to everyone, to one
//! member, or to members whose job tag matches a pattern. Every dispatch is
//! logged, and recipients report back how it went.
//!
//! ## Layers
//!
//! ```text
//! rallypoint-transport   WebSocket accept/send/recv
//! rallypoint-protocol    ClientEvent / ServerEvent, data model, codec
//! rallypoint-session     live session registry, Authorizer
//! rallypoint-room        SQLite room store and command log
//! rallypoint-sweep       interval task runner
//! rallypoint             relay engine, RoomService, server (this crate)
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use rallypoint::prelude::*;
//!
//! # async fn run() -> Result<(), RallyError> {
//! rallypoint::init_tracing();
//! let server = RallyServer::<AllowAll>::builder()
//!     .bind("0.0.0.0:8080")
//!     .build(AllowAll)
//!     .await?;
//! server.run().await
//! # }
//! ```

mod config;
mod error;
mod handler;
mod relay;
mod server;
mod service;
mod sweep;

pub use config::ServerConfig;
pub use error::RallyError;
pub use relay::{JoinedRoom, Peer, PeerState, Relay};
pub use server::{RallyServer, RallyServerBuilder};
pub use service::{Caller, DEFAULT_HISTORY_LIMIT, MAX_HISTORY_LIMIT, RoomService};
pub use sweep::{EXPIRED_REASON, ExpirySweep, SweepReport};

pub use rallypoint_protocol as protocol;
pub use rallypoint_room as room;
pub use rallypoint_session as session;

/// Installs a `tracing` subscriber that prints to stderr, filtered by
/// `RUST_LOG` (default `info`). Does nothing if one is already installed.
pub fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}

/// Convenience re-exports for the common case.
///
/// ```rust
/// use rallypoint::prelude::*;
/// ```
pub mod prelude {
    pub use crate::{
        Caller, ExpirySweep, Peer, PeerState, RallyError, RallyServer, RallyServerBuilder, Relay,
        RoomService, ServerConfig, SweepReport,
    };
    pub use rallypoint_protocol::{
        ClientEvent, CommandKind, CommandStatus, Envelope, ErrorCode, JobTag, Member, MemberId,
        MemberProfile, Role, Room, RoomCode, ServerEvent,
    };
    pub use rallypoint_room::{ManualClock, NewRoom, StoreConfig, SystemClock};
    pub use rallypoint_session::{AllowAll, Authorizer, SessionError};
}
