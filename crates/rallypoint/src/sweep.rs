//! The expiry sweep: closes rooms past their lifetime and prunes old
//! history.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use rallypoint_protocol::Room;
use rallypoint_session::Authorizer;
use rallypoint_sweep::SweepTask;

use crate::relay::blocking;
use crate::{RallyError, Relay};

/// Reason sent with `room-closed` when a room runs out of time.
pub const EXPIRED_REASON: &str = "room expired";

/// What one pass did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub rooms_closed: usize,
    /// Expired rooms that could not be closed this pass. They are retried
    /// on the next one.
    pub room_failures: usize,
    pub commands_pruned: usize,
    pub rooms_purged: usize,
}

/// Closes expired rooms, then drops command log rows and closed rooms
/// older than the retention window.
pub struct ExpirySweep<A: Authorizer> {
    relay: Arc<Relay<A>>,
    retention: Duration,
}

impl<A: Authorizer> ExpirySweep<A> {
    pub fn new(relay: Arc<Relay<A>>, retention: Duration) -> Self {
        Self { relay, retention }
    }

    /// Runs one pass. Each expired room is closed on its own; one room
    /// failing doesn't stop the others.
    pub async fn run_pass(&self) -> SweepReport {
        let mut report = SweepReport::default();

        let store = self.relay.rooms().clone();
        let expired = match blocking(move || store.expired_active_rooms()).await {
            Ok(rooms) => rooms,
            Err(e) => {
                tracing::error!(error = %e, "could not list expired rooms");
                Vec::new()
            }
        };

        for room in expired {
            match self.expire_room(&room).await {
                Ok(notified) => {
                    report.rooms_closed += 1;
                    tracing::info!(room_id = %room.id, room_code = %room.code, notified, "expired room closed");
                }
                Err(e) => {
                    report.room_failures += 1;
                    tracing::error!(room_id = %room.id, room_code = %room.code, error = %e, "failed to close expired room");
                }
            }
        }

        let cutoff = self.relay.rooms().database().ago(self.retention);

        let log = self.relay.commands().clone();
        match blocking(move || log.prune_before(cutoff)).await {
            Ok(n) => report.commands_pruned = n,
            Err(e) => tracing::error!(error = %e, "command log prune failed"),
        }

        let store = self.relay.rooms().clone();
        match blocking(move || store.purge_closed_rooms(cutoff)).await {
            Ok(n) => report.rooms_purged = n,
            Err(e) => tracing::error!(error = %e, "closed room purge failed"),
        }

        if report != SweepReport::default() {
            tracing::info!(?report, "expiry sweep finished");
        }
        report
    }

    /// Notifies the room's live sessions, then closes it. Returns how many
    /// sessions were notified.
    async fn expire_room(&self, room: &Room) -> Result<usize, RallyError> {
        let mut sessions = self.relay.sessions().await;
        let notified = self
            .relay
            .close_sessions(&mut sessions, &room.code, EXPIRED_REASON);
        let store = self.relay.rooms().clone();
        let room_id = room.id;
        blocking(move || store.close_room(room_id)).await?;
        Ok(notified)
    }
}

impl<A: Authorizer> SweepTask for ExpirySweep<A> {
    type Report = SweepReport;

    fn name(&self) -> &'static str {
        "expiry"
    }

    fn sweep(&self) -> impl Future<Output = SweepReport> + Send {
        self.run_pass()
    }
}
