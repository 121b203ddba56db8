use async_trait::async_trait;
use ulid::Ulid;

use crate::model::BookingView;

/// Error from an external collaborator. Logged, never propagated into the
/// booking result — a broken mail relay must not fail a committed booking.
#[derive(Debug)]
pub struct SidecarError(pub String);

impl std::fmt::Display for SidecarError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "sidecar error: {}", self.0)
    }
}

impl std::error::Error for SidecarError {}

/// Seam for the post-commit collaborators: email confirmation, calendar
/// sync, and whatever else the deployment wires in. The engine calls these
/// fire-and-forget after the WAL commit.
#[async_trait]
pub trait SideChannel: Send + Sync {
    async fn booking_confirmed(&self, view: &BookingView) -> Result<(), SidecarError>;
    async fn booking_rescheduled(&self, view: &BookingView) -> Result<(), SidecarError>;
    async fn booking_cancelled(&self, booking_id: Ulid, user_id: Ulid) -> Result<(), SidecarError>;
}

/// Default collaborator: logs the outbound payload and does nothing else.
pub struct LogOnly;

impl LogOnly {
    fn log(&self, what: &str, view: &BookingView) -> Result<(), SidecarError> {
        let payload = serde_json::to_string(view).map_err(|e| SidecarError(e.to_string()))?;
        tracing::info!(booking = %view.id, "{what}: {payload}");
        Ok(())
    }
}

#[async_trait]
impl SideChannel for LogOnly {
    async fn booking_confirmed(&self, view: &BookingView) -> Result<(), SidecarError> {
        self.log("booking confirmation email", view)
    }

    async fn booking_rescheduled(&self, view: &BookingView) -> Result<(), SidecarError> {
        self.log("booking reschedule email", view)
    }

    async fn booking_cancelled(&self, booking_id: Ulid, user_id: Ulid) -> Result<(), SidecarError> {
        tracing::info!(booking = %booking_id, user = %user_id, "booking cancellation email");
        Ok(())
    }
}
