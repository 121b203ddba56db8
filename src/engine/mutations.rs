use std::sync::Arc;

use tokio::sync::{oneshot, RwLock};
use ulid::Ulid;

use crate::limits::*;
use crate::model::*;
use crate::observability;

use super::conflict::{check_no_conflict, validate_range};
use super::policy::{can_manage_workspaces, can_mutate};
use super::{Engine, EngineError, WalCommand};

/// Partial update for a booking. `None` fields are left untouched — this is
/// patch semantics, not replace.
#[derive(Debug, Clone, Copy, Default)]
pub struct BookingPatch {
    pub status: Option<BookingStatus>,
    /// New `(start, end)` pair; validated and conflict-checked (excluding the
    /// booking's own id) before it is applied.
    pub times: Option<(Ms, Ms)>,
}

fn validate_workspace_params(params: &WorkspaceParams) -> Result<(), EngineError> {
    if params.name.is_empty() {
        return Err(EngineError::Validation("workspace name must not be empty"));
    }
    if params.name.len() > MAX_NAME_LEN {
        return Err(EngineError::LimitExceeded("workspace name too long"));
    }
    if params.location.len() > MAX_LOCATION_LEN {
        return Err(EngineError::LimitExceeded("workspace location too long"));
    }
    if let Some(ref url) = params.image_url
        && url.len() > MAX_IMAGE_URL_LEN
    {
        return Err(EngineError::LimitExceeded("workspace image url too long"));
    }
    if params.capacity == 0 {
        return Err(EngineError::Validation("capacity must be positive"));
    }
    if params.open_min >= params.close_min || params.close_min > MINUTES_PER_DAY {
        return Err(EngineError::Validation("invalid operating hours"));
    }
    Ok(())
}

impl Engine {
    // ── Users ────────────────────────────────────────────────

    pub async fn register_user(
        &self,
        id: Ulid,
        email: &str,
        name: &str,
        role: Role,
    ) -> Result<(), EngineError> {
        if email.is_empty() || !email.contains('@') {
            return Err(EngineError::Validation("invalid email address"));
        }
        if email.len() > MAX_EMAIL_LEN {
            return Err(EngineError::LimitExceeded("email too long"));
        }
        if name.len() > MAX_NAME_LEN {
            return Err(EngineError::LimitExceeded("user name too long"));
        }
        let _meta = self.meta_lock.lock().await;
        if self.users.contains_key(&id) {
            return Err(EngineError::AlreadyExists(id));
        }
        // Uniqueness is case-insensitive: Bob@x.com collides with bob@x.com.
        if let Some(existing) = self.email_index.get(&email.to_lowercase()) {
            return Err(EngineError::AlreadyExists(*existing.value()));
        }

        let event = Event::UserRegistered {
            id,
            email: email.to_string(),
            name: name.to_string(),
            role,
        };
        self.wal_append(&event).await?;
        self.apply_engine_event(&event);
        Ok(())
    }

    // ── Workspaces (admin-only) ──────────────────────────────

    pub async fn create_workspace(
        &self,
        actor: &Actor,
        id: Ulid,
        params: WorkspaceParams,
    ) -> Result<(), EngineError> {
        if !can_manage_workspaces(actor.role) {
            metrics::counter!(observability::FORBIDDEN_TOTAL).increment(1);
            return Err(EngineError::Forbidden(actor.id));
        }
        validate_workspace_params(&params)?;
        let _meta = self.meta_lock.lock().await;
        if self.workspaces.len() >= MAX_WORKSPACES_PER_ORG {
            return Err(EngineError::LimitExceeded("too many workspaces"));
        }
        if self.workspaces.contains_key(&id) {
            return Err(EngineError::AlreadyExists(id));
        }

        let event = Event::WorkspaceCreated {
            id,
            params: params.clone(),
        };
        self.wal_append(&event).await?;
        self.workspaces
            .insert(id, Arc::new(RwLock::new(WorkspaceState::new(id, params))));
        Ok(())
    }

    /// Full-attribute admin edit, including the active flag. Bookings are
    /// untouched.
    pub async fn update_workspace(
        &self,
        actor: &Actor,
        id: Ulid,
        params: WorkspaceParams,
        active: bool,
    ) -> Result<(), EngineError> {
        if !can_manage_workspaces(actor.role) {
            metrics::counter!(observability::FORBIDDEN_TOTAL).increment(1);
            return Err(EngineError::Forbidden(actor.id));
        }
        validate_workspace_params(&params)?;
        let ws = self.get_workspace(&id).ok_or(EngineError::NotFound(id))?;
        let mut guard = ws.write().await;

        let event = Event::WorkspaceUpdated { id, params, active };
        self.persist_and_apply(&mut guard, &event).await
    }

    /// Delete a workspace. Refused while any non-cancelled booking still
    /// references it.
    pub async fn delete_workspace(&self, actor: &Actor, id: Ulid) -> Result<(), EngineError> {
        if !can_manage_workspaces(actor.role) {
            metrics::counter!(observability::FORBIDDEN_TOTAL).increment(1);
            return Err(EngineError::Forbidden(actor.id));
        }
        let ws = self.get_workspace(&id).ok_or(EngineError::NotFound(id))?;
        // Hold the write lock across check, append, and removal so no
        // booking can land on the workspace mid-delete.
        let guard = ws.write().await;
        if guard.has_live_bookings() {
            return Err(EngineError::HasBookings(id));
        }

        let event = Event::WorkspaceDeleted { id };
        self.wal_append(&event).await?;
        self.workspaces.remove(&id);
        for booking in &guard.bookings {
            self.booking_index.remove(&booking.id);
        }
        Ok(())
    }

    // ── Booking lifecycle ────────────────────────────────────

    /// Create a booking. The availability check and the commit both happen
    /// under the workspace write lock, so two concurrent overlapping creates
    /// cannot both pass the check. Bookings go in directly as `Confirmed`.
    pub async fn create_booking(
        &self,
        actor: &Actor,
        workspace_id: Ulid,
        start: Ms,
        end: Ms,
        title: Option<String>,
    ) -> Result<BookingView, EngineError> {
        let span = validate_range(start, end)?;
        if let Some(ref t) = title
            && t.len() > MAX_TITLE_LEN
        {
            return Err(EngineError::LimitExceeded("booking title too long"));
        }
        let ws = self
            .get_workspace(&workspace_id)
            .ok_or(EngineError::NotFound(workspace_id))?;
        let mut guard = ws.write().await;
        if !guard.active {
            return Err(EngineError::Validation("workspace is not active"));
        }
        if guard.bookings.len() >= MAX_BOOKINGS_PER_WORKSPACE {
            return Err(EngineError::LimitExceeded("too many bookings on workspace"));
        }

        if let Err(e) = check_no_conflict(&guard, &span, None) {
            metrics::counter!(observability::BOOKING_CONFLICTS_TOTAL).increment(1);
            return Err(e);
        }

        let id = Ulid::new();
        let event = Event::BookingCreated {
            id,
            workspace_id,
            user_id: actor.id,
            span,
            status: BookingStatus::Confirmed,
            title,
        };
        self.persist_and_apply(&mut guard, &event).await?;
        metrics::counter!(observability::BOOKINGS_CREATED_TOTAL).increment(1);

        let view = booking_view(&guard, id).expect("booking just inserted");
        drop(guard);

        // Post-commit side effects: persisted notification plus
        // fire-and-forget collaborators. Neither can undo the booking, so
        // their failures are logged, not returned.
        if let Err(e) = self
            .record_notification(actor.id, NotificationKind::BookingConfirmed, Some(id))
            .await
        {
            tracing::warn!(booking = %id, "confirmation notification write failed: {e}");
        }
        let sidecar = self.sidecar.clone();
        let sidecar_view = view.clone();
        tokio::spawn(async move {
            if let Err(e) = sidecar.booking_confirmed(&sidecar_view).await {
                tracing::warn!(booking = %sidecar_view.id, "confirmation sidecar failed: {e}");
            }
        });

        Ok(view)
    }

    /// Patch a booking: status and/or times, each optional. Only the owner
    /// or an admin may patch. A times change re-runs the availability check
    /// excluding this booking's own id; a status-only patch never does.
    /// `Cancelled` is terminal: a cancelled booking cannot be revived or
    /// rescheduled, since its slot may have been re-booked in the meantime.
    pub async fn update_booking(
        &self,
        actor: &Actor,
        booking_id: Ulid,
        patch: BookingPatch,
    ) -> Result<BookingView, EngineError> {
        let (_, mut guard) = self.resolve_booking_write(&booking_id).await?;
        let booking = guard
            .booking(booking_id)
            .ok_or(EngineError::NotFound(booking_id))?;
        if !can_mutate(actor, booking.user_id) {
            metrics::counter!(observability::FORBIDDEN_TOTAL).increment(1);
            return Err(EngineError::Forbidden(actor.id));
        }
        // A cancelled booking stopped blocking its slot the moment it was
        // cancelled; transitioning it back to a blocking status would skip
        // the availability check against whatever booked the slot since.
        if booking.status == BookingStatus::Cancelled
            && (patch.times.is_some()
                || patch.status.is_some_and(|s| s != BookingStatus::Cancelled))
        {
            return Err(EngineError::Validation("cancelled bookings cannot be modified"));
        }
        let owner_id = booking.user_id;
        let workspace_id = guard.id;

        if let Some((start, end)) = patch.times {
            let span = validate_range(start, end)?;
            if let Err(e) = check_no_conflict(&guard, &span, Some(booking_id)) {
                metrics::counter!(observability::BOOKING_CONFLICTS_TOTAL).increment(1);
                return Err(e);
            }
            let event = Event::BookingRescheduled {
                id: booking_id,
                workspace_id,
                span,
            };
            self.persist_and_apply(&mut guard, &event).await?;
        }

        if let Some(status) = patch.status {
            let event = Event::BookingStatusChanged {
                id: booking_id,
                workspace_id,
                status,
            };
            self.persist_and_apply(&mut guard, &event).await?;
        }

        let view = booking_view(&guard, booking_id).expect("patched booking present");
        drop(guard);

        if patch.times.is_some() {
            if let Err(e) = self
                .record_notification(owner_id, NotificationKind::BookingRescheduled, Some(booking_id))
                .await
            {
                tracing::warn!(booking = %booking_id, "reschedule notification write failed: {e}");
            }
            let sidecar = self.sidecar.clone();
            let sidecar_view = view.clone();
            tokio::spawn(async move {
                if let Err(e) = sidecar.booking_rescheduled(&sidecar_view).await {
                    tracing::warn!(booking = %sidecar_view.id, "reschedule sidecar failed: {e}");
                }
            });
        }

        Ok(view)
    }

    /// Cancel a booking: marks it `Cancelled` and keeps the record, freeing
    /// the slot for every subsequent availability check. Idempotent —
    /// cancelling a cancelled booking is a no-op.
    pub async fn cancel_booking(&self, actor: &Actor, booking_id: Ulid) -> Result<(), EngineError> {
        let (workspace_id, mut guard) = self.resolve_booking_write(&booking_id).await?;
        let booking = guard
            .booking(booking_id)
            .ok_or(EngineError::NotFound(booking_id))?;
        if !can_mutate(actor, booking.user_id) {
            metrics::counter!(observability::FORBIDDEN_TOTAL).increment(1);
            return Err(EngineError::Forbidden(actor.id));
        }
        if booking.status == BookingStatus::Cancelled {
            return Ok(());
        }
        let owner_id = booking.user_id;

        let event = Event::BookingCancelled {
            id: booking_id,
            workspace_id,
        };
        self.persist_and_apply(&mut guard, &event).await?;
        metrics::counter!(observability::BOOKINGS_CANCELLED_TOTAL).increment(1);
        drop(guard);

        if let Err(e) = self
            .record_notification(owner_id, NotificationKind::BookingCancelled, Some(booking_id))
            .await
        {
            tracing::warn!(booking = %booking_id, "cancellation notification write failed: {e}");
        }
        let sidecar = self.sidecar.clone();
        tokio::spawn(async move {
            if let Err(e) = sidecar.booking_cancelled(booking_id, owner_id).await {
                tracing::warn!(booking = %booking_id, "cancellation sidecar failed: {e}");
            }
        });

        Ok(())
    }

    // ── Notifications ────────────────────────────────────────

    pub async fn mark_notification_read(
        &self,
        actor: &Actor,
        notification_id: Ulid,
    ) -> Result<(), EngineError> {
        let _meta = self.meta_lock.lock().await;
        let owner = self
            .notification_owner
            .get(&notification_id)
            .map(|e| *e.value())
            .ok_or(EngineError::NotFound(notification_id))?;
        if !can_mutate(actor, owner) {
            metrics::counter!(observability::FORBIDDEN_TOTAL).increment(1);
            return Err(EngineError::Forbidden(actor.id));
        }
        let event = Event::NotificationRead {
            id: notification_id,
            user_id: owner,
        };
        self.wal_append(&event).await?;
        self.apply_engine_event(&event);
        Ok(())
    }

    pub async fn mark_all_notifications_read(
        &self,
        actor: &Actor,
        user_id: Ulid,
    ) -> Result<(), EngineError> {
        if !can_mutate(actor, user_id) {
            metrics::counter!(observability::FORBIDDEN_TOTAL).increment(1);
            return Err(EngineError::Forbidden(actor.id));
        }
        let _meta = self.meta_lock.lock().await;
        let event = Event::NotificationsAllRead { user_id };
        self.wal_append(&event).await?;
        self.apply_engine_event(&event);
        Ok(())
    }

    pub async fn dismiss_notification(
        &self,
        actor: &Actor,
        notification_id: Ulid,
    ) -> Result<(), EngineError> {
        let _meta = self.meta_lock.lock().await;
        let owner = self
            .notification_owner
            .get(&notification_id)
            .map(|e| *e.value())
            .ok_or(EngineError::NotFound(notification_id))?;
        if !can_mutate(actor, owner) {
            metrics::counter!(observability::FORBIDDEN_TOTAL).increment(1);
            return Err(EngineError::Forbidden(actor.id));
        }
        let event = Event::NotificationDismissed {
            id: notification_id,
            user_id: owner,
        };
        self.wal_append(&event).await?;
        self.apply_engine_event(&event);
        Ok(())
    }

    // ── WAL maintenance ──────────────────────────────────────

    /// Compact the WAL by rewriting it with only the events needed to
    /// recreate the current state.
    ///
    /// Quiesces writers first: the meta lock blocks engine-level appends and
    /// a read lock on every workspace blocks booking appends, so every event
    /// acked before the snapshot is in it, and every event appended after
    /// stays queued behind the rewrite. Without the fence, a write acked
    /// between snapshot and rewrite would be erased from the log.
    pub async fn compact_wal(&self) -> Result<(), EngineError> {
        let _meta = self.meta_lock.lock().await;
        let workspaces: Vec<_> = self.workspaces.iter().map(|e| e.value().clone()).collect();
        let mut guards = Vec::with_capacity(workspaces.len());
        for ws in &workspaces {
            guards.push(ws.read().await);
        }

        let mut events = Vec::new();

        for entry in self.users.iter() {
            let u = entry.value();
            events.push(Event::UserRegistered {
                id: u.id,
                email: u.email.clone(),
                name: u.name.clone(),
                role: u.role,
            });
        }

        for guard in &guards {
            // A delete may have slipped in before we took this lock.
            if !self.workspaces.contains_key(&guard.id) {
                continue;
            }
            events.push(Event::WorkspaceCreated {
                id: guard.id,
                params: WorkspaceParams {
                    name: guard.name.clone(),
                    location: guard.location.clone(),
                    kind: guard.kind,
                    capacity: guard.capacity,
                    open_min: guard.open_min,
                    close_min: guard.close_min,
                    hourly_rate_cents: guard.hourly_rate_cents,
                    image_url: guard.image_url.clone(),
                    amenities: guard.amenities,
                },
            });
            if !guard.active {
                events.push(Event::WorkspaceUpdated {
                    id: guard.id,
                    params: WorkspaceParams {
                        name: guard.name.clone(),
                        location: guard.location.clone(),
                        kind: guard.kind,
                        capacity: guard.capacity,
                        open_min: guard.open_min,
                        close_min: guard.close_min,
                        hourly_rate_cents: guard.hourly_rate_cents,
                        image_url: guard.image_url.clone(),
                        amenities: guard.amenities,
                    },
                    active: false,
                });
            }
            for b in &guard.bookings {
                events.push(Event::BookingCreated {
                    id: b.id,
                    workspace_id: guard.id,
                    user_id: b.user_id,
                    span: b.span,
                    status: b.status,
                    title: b.title.clone(),
                });
            }
        }

        for entry in self.notifications.iter() {
            for n in entry.value() {
                events.push(Event::NotificationCreated {
                    id: n.id,
                    user_id: n.user_id,
                    kind: n.kind,
                    booking_id: n.booking_id,
                    created_at: n.created_at,
                });
                if n.read {
                    events.push(Event::NotificationRead {
                        id: n.id,
                        user_id: n.user_id,
                    });
                }
            }
        }

        let (tx, rx) = oneshot::channel();
        self.wal_tx
            .send(WalCommand::Compact { events, response: tx })
            .await
            .map_err(|_| EngineError::WalError("WAL writer shut down".into()))?;
        rx.await
            .map_err(|_| EngineError::WalError("WAL writer dropped response".into()))?
            .map_err(|e| EngineError::WalError(e.to_string()))
    }

    pub async fn wal_appends_since_compact(&self) -> u64 {
        let (tx, rx) = oneshot::channel();
        if self
            .wal_tx
            .send(WalCommand::AppendsSinceCompact { response: tx })
            .await
            .is_err()
        {
            return 0;
        }
        rx.await.unwrap_or(0)
    }
}

/// Join a booking with its workspace snapshot.
pub(super) fn booking_view(ws: &WorkspaceState, booking_id: Ulid) -> Option<BookingView> {
    let b = ws.booking(booking_id)?;
    Some(BookingView {
        id: b.id,
        user_id: b.user_id,
        span: b.span,
        status: b.status,
        title: b.title.clone(),
        workspace: ws.snapshot(),
    })
}
