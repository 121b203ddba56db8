//! Hard limits. Every unbounded input is clamped by one of these so a single
//! misbehaving caller cannot balloon memory or the WAL.

use crate::model::Ms;

pub const MAX_WORKSPACES_PER_ORG: usize = 10_000;
pub const MAX_BOOKINGS_PER_WORKSPACE: usize = 100_000;
pub const MAX_NOTIFICATIONS_PER_USER: usize = 10_000;

pub const MAX_NAME_LEN: usize = 256;
pub const MAX_LOCATION_LEN: usize = 256;
pub const MAX_TITLE_LEN: usize = 512;
pub const MAX_EMAIL_LEN: usize = 320;
pub const MAX_IMAGE_URL_LEN: usize = 2_048;

pub const MAX_ORGS: usize = 1_024;
pub const MAX_ORG_NAME_LEN: usize = 128;

/// Minutes in a day; operating hours live in `[0, 1440]`.
pub const MINUTES_PER_DAY: u16 = 1_440;

/// Negative timestamps are malformed.
pub const MIN_VALID_TIMESTAMP_MS: Ms = 0;
/// 2100-01-01T00:00:00Z.
pub const MAX_VALID_TIMESTAMP_MS: Ms = 4_102_444_800_000;

/// A single booking may not span more than 30 days.
pub const MAX_SPAN_DURATION_MS: Ms = 30 * 86_400_000;

/// Availability queries are bounded to roughly one year.
pub const MAX_QUERY_WINDOW_MS: Ms = 366 * 86_400_000;
