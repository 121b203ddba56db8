mod availability;
mod conflict;
mod error;
mod mutations;
mod policy;
mod queries;

pub use availability::{
    conflicting_booking, is_free, merge_spans, open_slots, operating_spans, subtract_spans,
};
pub use error::EngineError;
pub use mutations::BookingPatch;
pub use policy::{can_manage_workspaces, can_mutate};

use std::io;
use std::path::PathBuf;
use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::{mpsc, oneshot, Mutex, RwLock};
use ulid::Ulid;

use crate::model::*;
use crate::notify::NotifyHub;
use crate::sidecar::SideChannel;
use crate::wal::Wal;

pub type SharedWorkspaceState = Arc<RwLock<WorkspaceState>>;

// ── Group-commit WAL channel ─────────────────────────────

pub(super) enum WalCommand {
    Append {
        event: Event,
        response: oneshot::Sender<io::Result<()>>,
    },
    Compact {
        events: Vec<Event>,
        response: oneshot::Sender<io::Result<()>>,
    },
    AppendsSinceCompact {
        response: oneshot::Sender<u64>,
    },
}

/// Background task that owns the WAL and batches appends for group commit.
/// 1. Block until the first Append arrives.
/// 2. Buffer it (no fsync).
/// 3. Drain all immediately available Appends (the batch window).
/// 4. Single flush_sync for the whole batch.
/// 5. Respond Ok to all senders.
async fn wal_writer_loop(mut wal: Wal, mut rx: mpsc::Receiver<WalCommand>) {
    while let Some(cmd) = rx.recv().await {
        match cmd {
            WalCommand::Append { event, response } => {
                let mut batch = vec![(event, response)];

                // Drain all immediately available appends
                loop {
                    match rx.try_recv() {
                        Ok(WalCommand::Append { event, response }) => {
                            batch.push((event, response));
                        }
                        Ok(other) => {
                            // Flush current batch first, then handle the non-append command
                            flush_and_respond(&mut wal, &mut batch);
                            handle_non_append(&mut wal, other);
                            break;
                        }
                        Err(_) => break, // channel empty — flush batch
                    }
                }

                if !batch.is_empty() {
                    flush_and_respond(&mut wal, &mut batch);
                }
            }
            other => handle_non_append(&mut wal, other),
        }
    }
}

fn flush_and_respond(wal: &mut Wal, batch: &mut Vec<(Event, oneshot::Sender<io::Result<()>>)>) {
    metrics::histogram!(crate::observability::WAL_FLUSH_BATCH_SIZE).record(batch.len() as f64);
    let flush_start = std::time::Instant::now();
    let result = flush_batch(wal, batch);
    metrics::histogram!(crate::observability::WAL_FLUSH_DURATION_SECONDS)
        .record(flush_start.elapsed().as_secs_f64());
    for (_, tx) in batch.drain(..) {
        let r = match &result {
            Ok(()) => Ok(()),
            Err(e) => Err(io::Error::new(e.kind(), e.to_string())),
        };
        let _ = tx.send(r);
    }
}

fn flush_batch(wal: &mut Wal, batch: &[(Event, oneshot::Sender<io::Result<()>>)]) -> io::Result<()> {
    let mut append_err: Option<io::Error> = None;
    for (event, _) in batch {
        if let Err(e) = wal.append_buffered(event) {
            append_err = Some(e);
            break;
        }
    }
    // Always flush — even on append error — so partially buffered bytes
    // don't leak into the next batch (callers were told this batch failed).
    let flush_err = wal.flush_sync().err();
    if let Some(e) = append_err {
        return Err(e);
    }
    if let Some(e) = flush_err {
        return Err(e);
    }
    Ok(())
}

fn handle_non_append(wal: &mut Wal, cmd: WalCommand) {
    match cmd {
        WalCommand::Compact { events, response } => {
            let result = Wal::write_compact_file(wal.path(), &events)
                .and_then(|()| wal.swap_compact_file());
            let _ = response.send(result);
        }
        WalCommand::AppendsSinceCompact { response } => {
            let _ = response.send(wal.appends_since_compact());
        }
        WalCommand::Append { .. } => unreachable!(),
    }
}

/// The booking engine for one organization: workspaces, bookings, users,
/// notifications, all WAL-backed. Every booking mutation runs its conflict
/// check under the owning workspace's write lock, which is what upholds the
/// no-overlap invariant under concurrent writers.
pub struct Engine {
    pub workspaces: DashMap<Ulid, SharedWorkspaceState>,
    pub(super) wal_tx: mpsc::Sender<WalCommand>,
    pub notify: Arc<NotifyHub>,
    pub(super) sidecar: Arc<dyn SideChannel>,
    /// Reverse lookup: booking id → workspace id.
    pub(super) booking_index: DashMap<Ulid, Ulid>,
    pub(super) users: DashMap<Ulid, UserRecord>,
    /// Lowercased email → user id, for case-insensitive uniqueness.
    pub(super) email_index: DashMap<String, Ulid>,
    /// Per-user notification feed, oldest first.
    pub(super) notifications: DashMap<Ulid, Vec<NotificationRecord>>,
    /// Reverse lookup: notification id → user id.
    pub(super) notification_owner: DashMap<Ulid, Ulid>,
    /// Serializes engine-level appends (workspace create, users,
    /// notifications) against compaction snapshots. Workspace-scoped events
    /// are already serialized by their workspace's own lock.
    pub(super) meta_lock: Mutex<()>,
}

/// Apply a workspace-scoped event directly to a WorkspaceState (no locking —
/// caller holds the lock).
fn apply_to_workspace(ws: &mut WorkspaceState, event: &Event, booking_index: &DashMap<Ulid, Ulid>) {
    match event {
        Event::BookingCreated {
            id,
            workspace_id,
            user_id,
            span,
            status,
            title,
        } => {
            ws.insert_booking(BookingRecord {
                id: *id,
                user_id: *user_id,
                span: *span,
                status: *status,
                title: title.clone(),
                payment_ref: None,
                checked_in_at: None,
                checked_out_at: None,
            });
            booking_index.insert(*id, *workspace_id);
        }
        Event::BookingRescheduled { id, span, .. } => {
            // Remove + reinsert to keep the list sorted by start.
            if let Some(mut booking) = ws.remove_booking(*id) {
                booking.span = *span;
                ws.insert_booking(booking);
            }
        }
        Event::BookingStatusChanged { id, status, .. } => {
            if let Some(booking) = ws.booking_mut(*id) {
                booking.status = *status;
            }
        }
        Event::BookingCancelled { id, .. } => {
            // The record is kept; cancelled status frees the slot.
            if let Some(booking) = ws.booking_mut(*id) {
                booking.status = BookingStatus::Cancelled;
            }
        }
        Event::WorkspaceUpdated { params, active, .. } => {
            ws.name = params.name.clone();
            ws.location = params.location.clone();
            ws.kind = params.kind;
            ws.capacity = params.capacity;
            ws.open_min = params.open_min;
            ws.close_min = params.close_min;
            ws.hourly_rate_cents = params.hourly_rate_cents;
            ws.image_url = params.image_url.clone();
            ws.amenities = params.amenities;
            ws.active = *active;
        }
        // Everything else is engine-level, not workspace-level.
        _ => {}
    }
}

impl Engine {
    pub fn new(
        wal_path: PathBuf,
        notify: Arc<NotifyHub>,
        sidecar: Arc<dyn SideChannel>,
    ) -> io::Result<Self> {
        let events = Wal::replay(&wal_path)?;
        let wal = Wal::open(&wal_path)?;
        let (wal_tx, wal_rx) = mpsc::channel(4096);
        tokio::spawn(wal_writer_loop(wal, wal_rx));

        let engine = Self {
            workspaces: DashMap::new(),
            wal_tx,
            notify,
            sidecar,
            booking_index: DashMap::new(),
            users: DashMap::new(),
            email_index: DashMap::new(),
            notifications: DashMap::new(),
            notification_owner: DashMap::new(),
            meta_lock: Mutex::new(()),
        };

        // Replay — we are the sole owner of these Arcs, so try_write always
        // succeeds instantly. Never blocking_write here: this may run inside
        // an async context (lazy org creation).
        for event in &events {
            match event {
                Event::WorkspaceCreated { id, params } => {
                    let ws = WorkspaceState::new(*id, params.clone());
                    engine.workspaces.insert(*id, Arc::new(RwLock::new(ws)));
                }
                Event::WorkspaceDeleted { id } => {
                    engine.drop_workspace_entry(id);
                }
                Event::UserRegistered { .. }
                | Event::NotificationCreated { .. }
                | Event::NotificationRead { .. }
                | Event::NotificationsAllRead { .. }
                | Event::NotificationDismissed { .. } => {
                    engine.apply_engine_event(event);
                }
                other => {
                    if let Some(workspace_id) = event_workspace_id(other)
                        && let Some(entry) = engine.workspaces.get(&workspace_id)
                    {
                        let ws_arc = entry.clone();
                        let mut guard = ws_arc.try_write().expect("replay: uncontended write");
                        apply_to_workspace(&mut guard, other, &engine.booking_index);
                    }
                }
            }
        }

        Ok(engine)
    }

    /// Write event to the WAL via the background group-commit writer.
    pub(super) async fn wal_append(&self, event: &Event) -> Result<(), EngineError> {
        let (tx, rx) = oneshot::channel();
        self.wal_tx
            .send(WalCommand::Append {
                event: event.clone(),
                response: tx,
            })
            .await
            .map_err(|_| EngineError::WalError("WAL writer shut down".into()))?;
        rx.await
            .map_err(|_| EngineError::WalError("WAL writer dropped response".into()))?
            .map_err(|e| EngineError::WalError(e.to_string()))
    }

    pub fn get_workspace(&self, id: &Ulid) -> Option<SharedWorkspaceState> {
        self.workspaces.get(id).map(|e| e.value().clone())
    }

    pub fn workspace_for_booking(&self, booking_id: &Ulid) -> Option<Ulid> {
        self.booking_index.get(booking_id).map(|e| *e.value())
    }

    /// WAL-append + apply in one call for workspace-scoped events.
    pub(super) async fn persist_and_apply(
        &self,
        ws: &mut WorkspaceState,
        event: &Event,
    ) -> Result<(), EngineError> {
        self.wal_append(event).await?;
        apply_to_workspace(ws, event, &self.booking_index);
        Ok(())
    }

    /// Lookup booking → workspace, then acquire the workspace write lock.
    pub(super) async fn resolve_booking_write(
        &self,
        booking_id: &Ulid,
    ) -> Result<(Ulid, tokio::sync::OwnedRwLockWriteGuard<WorkspaceState>), EngineError> {
        let workspace_id = self
            .workspace_for_booking(booking_id)
            .ok_or(EngineError::NotFound(*booking_id))?;
        let ws = self
            .get_workspace(&workspace_id)
            .ok_or(EngineError::NotFound(workspace_id))?;
        let guard = ws.write_owned().await;
        Ok((workspace_id, guard))
    }

    /// Apply user/notification events to the engine-level maps.
    pub(super) fn apply_engine_event(&self, event: &Event) {
        match event {
            Event::UserRegistered { id, email, name, role } => {
                self.email_index.insert(email.to_lowercase(), *id);
                self.users.insert(*id, UserRecord {
                    id: *id,
                    email: email.clone(),
                    name: name.clone(),
                    role: *role,
                });
            }
            Event::NotificationCreated { id, user_id, kind, booking_id, created_at } => {
                let mut feed = self.notifications.entry(*user_id).or_default();
                // Oldest entries roll off at the cap; notifications never
                // fail a booking operation.
                if feed.len() >= crate::limits::MAX_NOTIFICATIONS_PER_USER {
                    let dropped = feed.remove(0);
                    self.notification_owner.remove(&dropped.id);
                }
                feed.push(NotificationRecord {
                    id: *id,
                    user_id: *user_id,
                    kind: *kind,
                    read: false,
                    booking_id: *booking_id,
                    created_at: *created_at,
                });
                self.notification_owner.insert(*id, *user_id);
            }
            Event::NotificationRead { id, user_id } => {
                if let Some(mut feed) = self.notifications.get_mut(user_id)
                    && let Some(rec) = feed.iter_mut().find(|n| n.id == *id)
                {
                    rec.read = true;
                }
            }
            Event::NotificationsAllRead { user_id } => {
                if let Some(mut feed) = self.notifications.get_mut(user_id) {
                    for rec in feed.iter_mut() {
                        rec.read = true;
                    }
                }
            }
            Event::NotificationDismissed { id, user_id } => {
                if let Some(mut feed) = self.notifications.get_mut(user_id) {
                    feed.retain(|n| n.id != *id);
                }
                self.notification_owner.remove(id);
            }
            _ => {}
        }
    }

    /// Remove a workspace from the map and purge its booking index entries.
    /// Replay only: the live delete path removes under its write guard.
    pub(super) fn drop_workspace_entry(&self, id: &Ulid) {
        if let Some((_, ws)) = self.workspaces.remove(id) {
            let guard = ws.try_read().expect("replay: uncontended read");
            for booking in &guard.bookings {
                self.booking_index.remove(&booking.id);
            }
        }
    }

    /// Persist a notification, publish it on the hub, bump the counter.
    /// Called after the booking event committed; a failure here is logged by
    /// the caller, never surfaced, since the booking itself is durable.
    pub(super) async fn record_notification(
        &self,
        user_id: Ulid,
        kind: NotificationKind,
        booking_id: Option<Ulid>,
    ) -> Result<(), EngineError> {
        let _meta = self.meta_lock.lock().await;
        let event = Event::NotificationCreated {
            id: Ulid::new(),
            user_id,
            kind,
            booking_id,
            created_at: conflict::now_ms(),
        };
        self.wal_append(&event).await?;
        self.apply_engine_event(&event);
        if let Event::NotificationCreated { id, created_at, .. } = &event {
            self.notify.publish(&NotificationRecord {
                id: *id,
                user_id,
                kind,
                read: false,
                booking_id,
                created_at: *created_at,
            });
        }
        metrics::counter!(crate::observability::NOTIFICATIONS_TOTAL).increment(1);
        Ok(())
    }
}

/// Extract the workspace id from a workspace-scoped event.
fn event_workspace_id(event: &Event) -> Option<Ulid> {
    match event {
        Event::BookingCreated { workspace_id, .. }
        | Event::BookingRescheduled { workspace_id, .. }
        | Event::BookingStatusChanged { workspace_id, .. }
        | Event::BookingCancelled { workspace_id, .. } => Some(*workspace_id),
        Event::WorkspaceUpdated { id, .. } => Some(*id),
        _ => None,
    }
}
