use ulid::Ulid;

/// Engine failure taxonomy. The external transport maps these onto status
/// codes (Validation → 400, Forbidden → 403, NotFound → 404, Conflict → 409);
/// none are retried automatically.
#[derive(Debug)]
pub enum EngineError {
    /// Malformed input: inverted time range, empty name, bad email, ...
    Validation(&'static str),
    /// The proposed interval overlaps the named non-cancelled booking.
    Conflict(Ulid),
    /// Actor is neither the resource owner nor an admin.
    Forbidden(Ulid),
    NotFound(Ulid),
    AlreadyExists(Ulid),
    /// Workspace still referenced by non-cancelled bookings.
    HasBookings(Ulid),
    LimitExceeded(&'static str),
    WalError(String),
}

impl std::fmt::Display for EngineError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EngineError::Validation(msg) => write!(f, "validation failed: {msg}"),
            EngineError::Conflict(id) => write!(f, "conflict with booking: {id}"),
            EngineError::Forbidden(actor) => write!(f, "forbidden for actor: {actor}"),
            EngineError::NotFound(id) => write!(f, "not found: {id}"),
            EngineError::AlreadyExists(id) => write!(f, "already exists: {id}"),
            EngineError::HasBookings(id) => {
                write!(f, "cannot delete workspace {id}: has live bookings")
            }
            EngineError::LimitExceeded(msg) => write!(f, "limit exceeded: {msg}"),
            EngineError::WalError(e) => write!(f, "WAL error: {e}"),
        }
    }
}

impl std::error::Error for EngineError {}
