use ulid::Ulid;

use crate::model::*;

use super::availability::conflicting_booking;
use super::EngineError;

pub(crate) fn now_ms() -> Ms {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap()
        .as_millis() as Ms
}

/// Validate a raw `(start, end)` pair before a `Span` is ever constructed.
/// Inverted ranges are rejected here, not silently accepted downstream.
pub(crate) fn validate_range(start: Ms, end: Ms) -> Result<Span, EngineError> {
    use crate::limits::*;
    if end <= start {
        return Err(EngineError::Validation("end time must be after start time"));
    }
    if start < MIN_VALID_TIMESTAMP_MS || end > MAX_VALID_TIMESTAMP_MS {
        return Err(EngineError::Validation("timestamp out of range"));
    }
    let span = Span::new(start, end);
    if span.duration_ms() > MAX_SPAN_DURATION_MS {
        return Err(EngineError::LimitExceeded("booking span too wide"));
    }
    Ok(span)
}

/// The commit-side availability check. Runs under the workspace write lock
/// held by the caller, so no other writer can slip a conflicting booking in
/// between this check and the WAL append.
pub(crate) fn check_no_conflict(
    ws: &WorkspaceState,
    span: &Span,
    exclude: Option<Ulid>,
) -> Result<(), EngineError> {
    match conflicting_booking(ws, span, exclude) {
        Some(existing) => Err(EngineError::Conflict(existing)),
        None => Ok(()),
    }
}
