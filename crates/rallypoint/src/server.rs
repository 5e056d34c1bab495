//! `RallyServer` builder and server loop.
//!
//! This is the entry point for running a relay. It ties together all the
//! layers: transport → protocol → relay → room store, plus the expiry
//! sweeper running beside the accept loop.

use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use rallypoint_protocol::JsonCodec;
use rallypoint_room::{Clock, CommandLog, Database, RoomStore, StoreConfig, SystemClock};
use rallypoint_session::Authorizer;
use rallypoint_sweep::{SweepConfig, Sweeper};
use rallypoint_transport::{Transport, WebSocketTransport};

use crate::handler::handle_connection;
use crate::relay::blocking;
use crate::{ExpirySweep, RallyError, Relay, RoomService, ServerConfig};

/// Builder for configuring and starting a relay.
///
/// # Example
///
/// ```rust,no_run
/// use rallypoint::prelude::*;
///
/// # async fn run() -> Result<(), RallyError> {
/// let server = RallyServer::<AllowAll>::builder()
///     .bind("0.0.0.0:8080")
///     .database_path("rally.db")
///     .build(AllowAll)
///     .await?;
/// server.run().await
/// # }
/// ```
pub struct RallyServerBuilder {
    config: ServerConfig,
    clock: Arc<dyn Clock>,
}

impl RallyServerBuilder {
    /// Creates a new builder with default settings.
    pub fn new() -> Self {
        Self::from_config(ServerConfig::default())
    }

    /// Starts from an existing config, e.g. one read with
    /// [`ServerConfig::from_env`].
    pub fn from_config(config: ServerConfig) -> Self {
        Self {
            config,
            clock: Arc::new(SystemClock),
        }
    }

    /// Sets the address to bind the server to.
    pub fn bind(mut self, addr: &str) -> Self {
        self.config.bind_addr = addr.to_string();
        self
    }

    /// Persists rooms and commands to a SQLite file.
    pub fn database_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.db_path = Some(path.into());
        self
    }

    /// Keeps everything in memory. Lost on restart.
    pub fn in_memory(mut self) -> Self {
        self.config.db_path = None;
        self
    }

    pub fn sweep_interval(mut self, interval: Duration) -> Self {
        self.config.sweep_interval = interval;
        self
    }

    pub fn command_retention(mut self, retention: Duration) -> Self {
        self.config.command_retention = retention;
        self
    }

    pub fn idle_timeout(mut self, timeout: Duration) -> Self {
        self.config.idle_timeout = timeout;
        self
    }

    pub fn store_config(mut self, store: StoreConfig) -> Self {
        self.config.store = store;
        self
    }

    /// Replaces the wall clock, for tests that drive expiry by hand.
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Opens the database, binds the listener and returns a server ready
    /// to [`run`](RallyServer::run).
    ///
    /// Every member is marked offline on startup, since no session
    /// survives a restart.
    pub async fn build<A: Authorizer>(self, auth: A) -> Result<RallyServer<A>, RallyError> {
        let Self { config, clock } = self;

        let db_path = config.db_path.clone();
        let db = blocking(move || match db_path {
            Some(path) => Database::open(path, clock),
            None => Database::in_memory(clock),
        })
        .await?;
        let db = Arc::new(db);

        let rooms = RoomStore::new(Arc::clone(&db), config.store.clone());
        let commands = CommandLog::new(db);

        let store = rooms.clone();
        let reset = blocking(move || store.reset_presence()).await?;
        if reset > 0 {
            tracing::info!(members = reset, "cleared stale presence");
        }

        let transport = WebSocketTransport::bind(&config.bind_addr).await?;
        tracing::info!(addr = %config.bind_addr, db = ?config.db_path, "relay bound");

        Ok(RallyServer {
            transport,
            relay: Arc::new(Relay::new(rooms, commands, auth)),
            config,
            codec: JsonCodec,
        })
    }
}

impl Default for RallyServerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// A bound relay server.
///
/// Call [`run()`](Self::run) to start accepting connections.
pub struct RallyServer<A: Authorizer> {
    transport: WebSocketTransport,
    relay: Arc<Relay<A>>,
    config: ServerConfig,
    codec: JsonCodec,
}

impl<A: Authorizer> RallyServer<A> {
    /// Creates a new builder.
    pub fn builder() -> RallyServerBuilder {
        RallyServerBuilder::new()
    }

    /// Returns the local address the server is bound to.
    pub fn local_addr(&self) -> std::io::Result<std::net::SocketAddr> {
        self.transport.local_addr()
    }

    pub fn relay(&self) -> &Arc<Relay<A>> {
        &self.relay
    }

    /// The request/response API backed by this server's relay.
    pub fn service(&self) -> RoomService<A> {
        RoomService::new(Arc::clone(&self.relay))
    }

    /// Runs until the process is terminated.
    pub async fn run(self) -> Result<(), RallyError> {
        self.run_with_shutdown(std::future::pending()).await
    }

    /// Runs the accept loop and the expiry sweeper until `shutdown`
    /// resolves, then stops the sweeper.
    ///
    /// Connections already accepted keep their handler tasks; they end
    /// when their clients go away.
    pub async fn run_with_shutdown(
        mut self,
        shutdown: impl Future<Output = ()>,
    ) -> Result<(), RallyError> {
        let sweep = ExpirySweep::new(Arc::clone(&self.relay), self.config.command_retention);
        let sweeper = Sweeper::new(
            sweep,
            SweepConfig {
                run_at_start: true,
                ..SweepConfig::every(self.config.sweep_interval)
            },
        )
        .spawn();

        tracing::info!("Rallypoint relay running");
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                biased;

                () = &mut shutdown => {
                    tracing::info!("shutdown requested");
                    break;
                }

                accepted = self.transport.accept() => match accepted {
                    Ok(conn) => {
                        let relay = Arc::clone(&self.relay);
                        let codec = self.codec;
                        let idle = self.config.idle_timeout;
                        tokio::spawn(async move {
                            if let Err(e) = handle_connection(conn, relay, codec, idle).await {
                                tracing::debug!(error = %e, "connection ended with error");
                            }
                        });
                    }
                    Err(e) => {
                        tracing::error!(error = %e, "accept failed");
                    }
                },
            }
        }

        let metrics = sweeper.stop().await;
        tracing::info!(
            sweep_passes = metrics.total_passes,
            sweep_overruns = metrics.total_overruns,
            "relay stopped"
        );
        Ok(())
    }
}
