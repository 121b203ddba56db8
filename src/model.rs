use serde::{Deserialize, Serialize};
use ulid::Ulid;

/// Unix milliseconds — the only time type.
pub type Ms = i64;

pub const MS_PER_MINUTE: Ms = 60_000;
pub const MS_PER_DAY: Ms = 86_400_000;

/// Half-open interval `[start, end)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Span {
    pub start: Ms,
    pub end: Ms,
}

impl Span {
    pub fn new(start: Ms, end: Ms) -> Self {
        debug_assert!(start < end, "Span start must be before end");
        Self { start, end }
    }

    pub fn duration_ms(&self) -> Ms {
        self.end - self.start
    }

    /// Half-open overlap: `[s1,e1)` and `[s2,e2)` conflict iff `s1 < e2 && s2 < e1`.
    /// Back-to-back spans never overlap.
    pub fn overlaps(&self, other: &Span) -> bool {
        self.start < other.end && other.start < self.end
    }

    /// Clamp to `window`, or None if the intersection is empty.
    pub fn clamp_to(&self, window: &Span) -> Option<Span> {
        let start = self.start.max(window.start);
        let end = self.end.min(window.end);
        (start < end).then(|| Span::new(start, end))
    }
}

/// Authorization role. Closed set — matches over it are exhaustive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Role {
    Admin,
    Employee,
    General,
}

/// An already-authenticated caller. The session layer lives outside this
/// crate; the engine only ever sees `(id, role)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Actor {
    pub id: Ulid,
    pub role: Role,
}

impl Actor {
    pub fn new(id: Ulid, role: Role) -> Self {
        Self { id, role }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum WorkspaceKind {
    Desk,
    MeetingRoom,
    CollaborativeSpace,
    PrivateOffice,
    FocusPod,
    VirtualConference,
    PhoneBooth,
}

/// Fixed amenity flags. A structured record, not an open-ended map — the
/// organization a workspace belongs to is an engine boundary (`org`), never
/// an entry smuggled in here.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Amenities {
    pub wifi: bool,
    pub monitor: bool,
    pub whiteboard: bool,
    pub video_conferencing: bool,
    pub standing_desk: bool,
    pub coffee: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BookingStatus {
    Pending,
    Confirmed,
    Cancelled,
    CheckedIn,
    Completed,
}

impl BookingStatus {
    /// Cancelled bookings never participate in the conflict set.
    pub fn blocks_slot(&self) -> bool {
        !matches!(self, BookingStatus::Cancelled)
    }
}

/// A booking as stored on its workspace. Payment and check-in/out fields are
/// opaque pass-through data owned by external collaborators.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BookingRecord {
    pub id: Ulid,
    pub user_id: Ulid,
    pub span: Span,
    pub status: BookingStatus,
    pub title: Option<String>,
    pub payment_ref: Option<String>,
    pub checked_in_at: Option<Ms>,
    pub checked_out_at: Option<Ms>,
}

/// Workspace attributes; changed only by explicit admin edit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkspaceParams {
    pub name: String,
    pub location: String,
    pub kind: WorkspaceKind,
    /// Seats, not concurrent bookings — one booking holds the whole workspace.
    pub capacity: u32,
    /// Operating hours as minutes of day, `open_min < close_min <= 1440`.
    pub open_min: u16,
    pub close_min: u16,
    pub hourly_rate_cents: Option<i64>,
    pub image_url: Option<String>,
    pub amenities: Amenities,
}

#[derive(Debug, Clone)]
pub struct WorkspaceState {
    pub id: Ulid,
    pub name: String,
    pub location: String,
    pub kind: WorkspaceKind,
    pub capacity: u32,
    pub open_min: u16,
    pub close_min: u16,
    pub hourly_rate_cents: Option<i64>,
    pub image_url: Option<String>,
    pub amenities: Amenities,
    pub active: bool,
    /// All bookings (any status), sorted by `span.start`.
    pub bookings: Vec<BookingRecord>,
}

impl WorkspaceState {
    pub fn new(id: Ulid, params: WorkspaceParams) -> Self {
        Self {
            id,
            name: params.name,
            location: params.location,
            kind: params.kind,
            capacity: params.capacity,
            open_min: params.open_min,
            close_min: params.close_min,
            hourly_rate_cents: params.hourly_rate_cents,
            image_url: params.image_url,
            amenities: params.amenities,
            active: true,
            bookings: Vec::new(),
        }
    }

    /// Insert a booking maintaining sort order by span.start.
    pub fn insert_booking(&mut self, booking: BookingRecord) {
        let pos = self
            .bookings
            .binary_search_by_key(&booking.span.start, |b| b.span.start)
            .unwrap_or_else(|e| e);
        self.bookings.insert(pos, booking);
    }

    /// Remove a booking by id, returning it.
    pub fn remove_booking(&mut self, id: Ulid) -> Option<BookingRecord> {
        let pos = self.bookings.iter().position(|b| b.id == id)?;
        Some(self.bookings.remove(pos))
    }

    pub fn booking(&self, id: Ulid) -> Option<&BookingRecord> {
        self.bookings.iter().find(|b| b.id == id)
    }

    pub fn booking_mut(&mut self, id: Ulid) -> Option<&mut BookingRecord> {
        self.bookings.iter_mut().find(|b| b.id == id)
    }

    /// Bookings whose span overlaps the query window (any status).
    /// Binary search skips everything starting at or after `query.end`.
    pub fn overlapping(&self, query: &Span) -> impl Iterator<Item = &BookingRecord> {
        let right_bound = self.bookings.partition_point(|b| b.span.start < query.end);
        self.bookings[..right_bound]
            .iter()
            .filter(move |b| b.span.end > query.start)
    }

    pub fn has_live_bookings(&self) -> bool {
        self.bookings.iter().any(|b| b.status.blocks_slot())
    }

    pub fn snapshot(&self) -> WorkspaceSnapshot {
        WorkspaceSnapshot {
            id: self.id,
            name: self.name.clone(),
            location: self.location.clone(),
            kind: self.kind,
            capacity: self.capacity,
            image_url: self.image_url.clone(),
            amenities: self.amenities,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserRecord {
    pub id: Ulid,
    /// Unique, compared case-insensitively.
    pub email: String,
    pub name: String,
    /// Immutable post-registration — there is no role-change operation.
    pub role: Role,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NotificationKind {
    BookingConfirmed,
    BookingRescheduled,
    BookingCancelled,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationRecord {
    pub id: Ulid,
    pub user_id: Ulid,
    pub kind: NotificationKind,
    pub read: bool,
    pub booking_id: Option<Ulid>,
    pub created_at: Ms,
}

/// The event types — flat, no nesting. This is the WAL record format.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Event {
    UserRegistered {
        id: Ulid,
        email: String,
        name: String,
        role: Role,
    },
    WorkspaceCreated {
        id: Ulid,
        params: WorkspaceParams,
    },
    WorkspaceUpdated {
        id: Ulid,
        params: WorkspaceParams,
        active: bool,
    },
    WorkspaceDeleted {
        id: Ulid,
    },
    BookingCreated {
        id: Ulid,
        workspace_id: Ulid,
        user_id: Ulid,
        span: Span,
        status: BookingStatus,
        title: Option<String>,
    },
    BookingRescheduled {
        id: Ulid,
        workspace_id: Ulid,
        span: Span,
    },
    BookingStatusChanged {
        id: Ulid,
        workspace_id: Ulid,
        status: BookingStatus,
    },
    BookingCancelled {
        id: Ulid,
        workspace_id: Ulid,
    },
    NotificationCreated {
        id: Ulid,
        user_id: Ulid,
        kind: NotificationKind,
        booking_id: Option<Ulid>,
        created_at: Ms,
    },
    NotificationRead {
        id: Ulid,
        user_id: Ulid,
    },
    NotificationsAllRead {
        user_id: Ulid,
    },
    NotificationDismissed {
        id: Ulid,
        user_id: Ulid,
    },
}

// ── Query result types ───────────────────────────────────────────

/// Workspace fields joined onto each returned booking — a join at read time,
/// not a stored denormalization.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WorkspaceSnapshot {
    pub id: Ulid,
    pub name: String,
    pub location: String,
    pub kind: WorkspaceKind,
    pub capacity: u32,
    pub image_url: Option<String>,
    pub amenities: Amenities,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BookingView {
    pub id: Ulid,
    pub user_id: Ulid,
    pub span: Span,
    pub status: BookingStatus,
    pub title: Option<String>,
    pub workspace: WorkspaceSnapshot,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WorkspaceInfo {
    pub id: Ulid,
    pub name: String,
    pub location: String,
    pub kind: WorkspaceKind,
    pub capacity: u32,
    pub open_min: u16,
    pub close_min: u16,
    pub hourly_rate_cents: Option<i64>,
    pub image_url: Option<String>,
    pub amenities: Amenities,
    pub active: bool,
}
