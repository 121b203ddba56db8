//! deskbook — the core of a workspace-booking system.
//!
//! The engine owns the one invariant worth owning: for every workspace, the
//! `[start, end)` intervals of all non-cancelled bookings are pairwise
//! disjoint, under concurrent writers. Around it sit the booking lifecycle,
//! the role-based authorization policy, per-user notifications, and WAL
//! durability. The HTTP/JSON transport, sessions, and rendering live outside
//! this crate and consume the `Engine` API directly.

pub mod compactor;
pub mod engine;
pub mod limits;
pub mod model;
pub mod notify;
pub mod observability;
pub mod org;
pub mod sidecar;
pub mod wal;

pub use engine::{BookingPatch, Engine, EngineError};
pub use model::{Actor, BookingStatus, Role, Span};
