use ulid::Ulid;

use crate::limits::*;
use crate::model::*;

use super::availability;
use super::mutations::booking_view;
use super::policy::can_mutate;
use super::{Engine, EngineError};

impl Engine {
    /// The Availability Checker: is the workspace free for `[start, end)`,
    /// ignoring cancelled bookings and optionally one booking id (its own,
    /// during a reschedule)?
    ///
    /// Read-only and safe to call repeatedly; the mutation path re-runs the
    /// same check under the workspace write lock immediately before commit,
    /// so a stale answer here can never corrupt the invariant.
    pub async fn is_available(
        &self,
        workspace_id: Ulid,
        start: Ms,
        end: Ms,
        exclude_booking_id: Option<Ulid>,
    ) -> Result<bool, EngineError> {
        // Inverted ranges degenerate safely (nothing overlaps an empty
        // interval), but callers get a clear error instead.
        if end <= start {
            return Err(EngineError::Validation("end time must be after start time"));
        }
        let ws = self
            .get_workspace(&workspace_id)
            .ok_or(EngineError::NotFound(workspace_id))?;
        let guard = ws.read().await;
        let span = Span::new(start, end);
        Ok(availability::is_free(&guard, &span, exclude_booking_id))
    }

    /// Free intervals of a workspace within a bounded window: operating
    /// hours minus non-cancelled bookings, optionally filtered to slots of
    /// at least `min_duration_ms`.
    pub async fn open_slots(
        &self,
        workspace_id: Ulid,
        start: Ms,
        end: Ms,
        min_duration_ms: Option<Ms>,
    ) -> Result<Vec<Span>, EngineError> {
        if end <= start {
            return Err(EngineError::Validation("end time must be after start time"));
        }
        // Bound the window to valid timestamps before the width check so the
        // day expansion below never does arithmetic near the i64 edges.
        if start < MIN_VALID_TIMESTAMP_MS || end > MAX_VALID_TIMESTAMP_MS {
            return Err(EngineError::Validation("timestamp out of range"));
        }
        if end - start > MAX_QUERY_WINDOW_MS {
            return Err(EngineError::LimitExceeded("query window too wide"));
        }
        let ws = self
            .get_workspace(&workspace_id)
            .ok_or(EngineError::NotFound(workspace_id))?;
        let guard = ws.read().await;

        let mut free = availability::open_slots(&guard, &Span::new(start, end));
        if let Some(min_dur) = min_duration_ms {
            free.retain(|span| span.duration_ms() >= min_dur);
        }
        Ok(free)
    }

    /// Role-scoped booking listing: admins see everything, everyone else
    /// only their own. Each row carries its workspace snapshot (a read-time
    /// join). Sorted by start time.
    pub async fn list_bookings(&self, actor: &Actor) -> Vec<BookingView> {
        let mut views = Vec::new();
        let workspace_ids: Vec<Ulid> = self.workspaces.iter().map(|e| *e.key()).collect();
        for id in workspace_ids {
            let Some(ws) = self.get_workspace(&id) else {
                continue;
            };
            let guard = ws.read().await;
            let snapshot = guard.snapshot();
            for b in &guard.bookings {
                if matches!(actor.role, Role::Admin) || b.user_id == actor.id {
                    views.push(BookingView {
                        id: b.id,
                        user_id: b.user_id,
                        span: b.span,
                        status: b.status,
                        title: b.title.clone(),
                        workspace: snapshot.clone(),
                    });
                }
            }
        }
        views.sort_by_key(|v| v.span.start);
        views
    }

    pub async fn get_booking(&self, booking_id: Ulid) -> Result<BookingView, EngineError> {
        let workspace_id = self
            .workspace_for_booking(&booking_id)
            .ok_or(EngineError::NotFound(booking_id))?;
        let ws = self
            .get_workspace(&workspace_id)
            .ok_or(EngineError::NotFound(workspace_id))?;
        let guard = ws.read().await;
        booking_view(&guard, booking_id).ok_or(EngineError::NotFound(booking_id))
    }

    pub async fn list_workspaces(&self) -> Vec<WorkspaceInfo> {
        let workspaces: Vec<_> = self.workspaces.iter().map(|e| e.value().clone()).collect();
        let mut infos = Vec::with_capacity(workspaces.len());
        for ws in workspaces {
            let guard = ws.read().await;
            infos.push(workspace_info(&guard));
        }
        infos.sort_by_key(|w| w.id);
        infos
    }

    pub async fn workspace_info(&self, id: Ulid) -> Result<WorkspaceInfo, EngineError> {
        let ws = self.get_workspace(&id).ok_or(EngineError::NotFound(id))?;
        let guard = ws.read().await;
        Ok(workspace_info(&guard))
    }

    pub fn get_user(&self, id: Ulid) -> Option<UserRecord> {
        self.users.get(&id).map(|e| e.value().clone())
    }

    /// Case-insensitive email lookup.
    pub fn find_user_by_email(&self, email: &str) -> Option<UserRecord> {
        let id = *self.email_index.get(&email.to_lowercase())?.value();
        self.get_user(id)
    }

    /// A user's notification feed, oldest first. Scoped by the same
    /// ownership rule as notification mutations.
    pub fn list_notifications(
        &self,
        actor: &Actor,
        user_id: Ulid,
    ) -> Result<Vec<NotificationRecord>, EngineError> {
        if !can_mutate(actor, user_id) {
            return Err(EngineError::Forbidden(actor.id));
        }
        Ok(self
            .notifications
            .get(&user_id)
            .map(|e| e.value().clone())
            .unwrap_or_default())
    }
}

fn workspace_info(ws: &WorkspaceState) -> WorkspaceInfo {
    WorkspaceInfo {
        id: ws.id,
        name: ws.name.clone(),
        location: ws.location.clone(),
        kind: ws.kind,
        capacity: ws.capacity,
        image_url: ws.image_url.clone(),
        open_min: ws.open_min,
        close_min: ws.close_min,
        hourly_rate_cents: ws.hourly_rate_cents,
        amenities: ws.amenities,
        active: ws.active,
    }
}
