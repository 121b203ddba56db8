use ulid::Ulid;

use crate::model::*;

// ── Availability Checker ─────────────────────────────────────────

/// Find the first non-cancelled booking on `ws` whose interval overlaps
/// `span`, ignoring `exclude` (a booking being rescheduled over itself).
///
/// Pure decision over the workspace's sorted booking list; the `overlapping`
/// scan pre-filters by span before the status check, so history outside the
/// query window is never touched.
pub fn conflicting_booking(
    ws: &WorkspaceState,
    span: &Span,
    exclude: Option<Ulid>,
) -> Option<Ulid> {
    ws.overlapping(span)
        .filter(|b| b.status.blocks_slot())
        .find(|b| Some(b.id) != exclude)
        .map(|b| b.id)
}

/// True iff no non-cancelled booking on `ws` overlaps `span`.
pub fn is_free(ws: &WorkspaceState, span: &Span, exclude: Option<Ulid>) -> bool {
    conflicting_booking(ws, span, exclude).is_none()
}

// ── Open-slot computation ────────────────────────────────────────

/// Free intervals of `ws` within `window`: the workspace's daily operating
/// hours clipped to the window, minus every non-cancelled booking.
pub fn open_slots(ws: &WorkspaceState, window: &Span) -> Vec<Span> {
    let base = operating_spans(ws.open_min, ws.close_min, window);
    if base.is_empty() {
        return base;
    }

    let mut occupied: Vec<Span> = ws
        .overlapping(window)
        .filter(|b| b.status.blocks_slot())
        .filter_map(|b| b.span.clamp_to(window))
        .collect();
    occupied.sort_by_key(|s| s.start);
    let occupied = merge_spans(&occupied);

    subtract_spans(&base, &occupied)
}

/// Expand a `[open_min, close_min)` minutes-of-day pair into concrete spans
/// for every UTC day touched by `window`, clipped to the window.
pub fn operating_spans(open_min: u16, close_min: u16, window: &Span) -> Vec<Span> {
    if open_min >= close_min {
        return Vec::new();
    }
    let open_off = open_min as Ms * MS_PER_MINUTE;
    let close_off = close_min as Ms * MS_PER_MINUTE;

    let first_day = window.start.div_euclid(MS_PER_DAY);
    let last_day = (window.end - 1).div_euclid(MS_PER_DAY);

    let mut spans = Vec::new();
    for day in first_day..=last_day {
        let day_start = day * MS_PER_DAY;
        let hours = Span::new(day_start + open_off, day_start + close_off);
        if let Some(clipped) = hours.clamp_to(window) {
            spans.push(clipped);
        }
    }
    spans
}

/// Merge sorted overlapping/adjacent spans into disjoint spans.
pub fn merge_spans(sorted: &[Span]) -> Vec<Span> {
    let mut merged: Vec<Span> = Vec::new();
    for &span in sorted {
        match merged.last_mut() {
            Some(last) if span.start <= last.end => last.end = last.end.max(span.end),
            _ => merged.push(span),
        }
    }
    merged
}

/// Subtract sorted disjoint `holes` from sorted disjoint `base`.
pub fn subtract_spans(base: &[Span], holes: &[Span]) -> Vec<Span> {
    let mut result = Vec::new();
    let mut hi = 0;

    for &b in base {
        let mut cursor = b.start;
        // Skip holes entirely before this base span.
        while hi < holes.len() && holes[hi].end <= cursor {
            hi += 1;
        }
        let mut i = hi;
        while i < holes.len() && holes[i].start < b.end {
            if holes[i].start > cursor {
                result.push(Span::new(cursor, holes[i].start));
            }
            cursor = cursor.max(holes[i].end);
            i += 1;
        }
        if cursor < b.end {
            result.push(Span::new(cursor, b.end));
        }
    }

    result
}

#[cfg(test)]
mod tests {
    use super::*;

    const H: Ms = 3_600_000;
    const M: Ms = 60_000;

    fn desk(open_min: u16, close_min: u16) -> WorkspaceState {
        WorkspaceState::new(
            Ulid::new(),
            WorkspaceParams {
                name: "Desk".into(),
                location: "HQ".into(),
                kind: WorkspaceKind::Desk,
                capacity: 1,
                open_min,
                close_min,
                hourly_rate_cents: None,
                image_url: None,
                amenities: Amenities::default(),
            },
        )
    }

    fn booking(start: Ms, end: Ms, status: BookingStatus) -> BookingRecord {
        BookingRecord {
            id: Ulid::new(),
            user_id: Ulid::new(),
            span: Span::new(start, end),
            status,
            title: None,
            payment_ref: None,
            checked_in_at: None,
            checked_out_at: None,
        }
    }

    // ── conflicting_booking / is_free ─────────────────────

    #[test]
    fn conflict_on_overlap() {
        let mut ws = desk(0, 1440);
        let b = booking(10 * H, 11 * H, BookingStatus::Confirmed);
        let bid = b.id;
        ws.insert_booking(b);

        // new start inside existing
        assert_eq!(
            conflicting_booking(&ws, &Span::new(10 * H + 30 * M, 11 * H + 30 * M), None),
            Some(bid)
        );
        // new end inside existing
        assert_eq!(
            conflicting_booking(&ws, &Span::new(9 * H + 30 * M, 10 * H + 30 * M), None),
            Some(bid)
        );
        // new fully contains existing
        assert_eq!(
            conflicting_booking(&ws, &Span::new(9 * H, 12 * H), None),
            Some(bid)
        );
    }

    #[test]
    fn adjacent_spans_are_free() {
        let mut ws = desk(0, 1440);
        ws.insert_booking(booking(10 * H, 11 * H, BookingStatus::Confirmed));

        assert!(is_free(&ws, &Span::new(11 * H, 12 * H), None));
        assert!(is_free(&ws, &Span::new(9 * H, 10 * H), None));
    }

    #[test]
    fn cancelled_bookings_never_conflict() {
        let mut ws = desk(0, 1440);
        ws.insert_booking(booking(10 * H, 11 * H, BookingStatus::Cancelled));
        assert!(is_free(&ws, &Span::new(10 * H, 11 * H), None));
    }

    #[test]
    fn exclusion_allows_own_interval() {
        let mut ws = desk(0, 1440);
        let b = booking(10 * H, 11 * H, BookingStatus::Confirmed);
        let bid = b.id;
        ws.insert_booking(b);

        // no-op reschedule over its own span
        assert!(is_free(&ws, &Span::new(10 * H, 11 * H), Some(bid)));
        // but another booking's span still conflicts
        let other = booking(12 * H, 13 * H, BookingStatus::Confirmed);
        let other_id = other.id;
        ws.insert_booking(other);
        assert_eq!(
            conflicting_booking(&ws, &Span::new(12 * H, 14 * H), Some(bid)),
            Some(other_id)
        );
    }

    #[test]
    fn pending_and_checked_in_block() {
        let mut ws = desk(0, 1440);
        ws.insert_booking(booking(1 * H, 2 * H, BookingStatus::Pending));
        ws.insert_booking(booking(3 * H, 4 * H, BookingStatus::CheckedIn));
        assert!(!is_free(&ws, &Span::new(1 * H, 2 * H), None));
        assert!(!is_free(&ws, &Span::new(3 * H + 30 * M, 5 * H), None));
    }

    // ── merge_spans / subtract_spans ──────────────────────

    #[test]
    fn merge_basic() {
        let spans = vec![Span::new(100, 300), Span::new(200, 400), Span::new(500, 600)];
        assert_eq!(
            merge_spans(&spans),
            vec![Span::new(100, 400), Span::new(500, 600)]
        );
    }

    #[test]
    fn merge_adjacent() {
        let spans = vec![Span::new(100, 200), Span::new(200, 300)];
        assert_eq!(merge_spans(&spans), vec![Span::new(100, 300)]);
    }

    #[test]
    fn subtract_no_overlap() {
        let base = vec![Span::new(100, 200), Span::new(300, 400)];
        let holes = vec![Span::new(200, 300)];
        assert_eq!(subtract_spans(&base, &holes), base);
    }

    #[test]
    fn subtract_full_cover() {
        let base = vec![Span::new(100, 200)];
        let holes = vec![Span::new(50, 250)];
        assert!(subtract_spans(&base, &holes).is_empty());
    }

    #[test]
    fn subtract_punches_hole() {
        let base = vec![Span::new(100, 300)];
        let holes = vec![Span::new(150, 200)];
        assert_eq!(
            subtract_spans(&base, &holes),
            vec![Span::new(100, 150), Span::new(200, 300)]
        );
    }

    #[test]
    fn subtract_multiple_holes() {
        let base = vec![Span::new(0, 1000)];
        let holes = vec![Span::new(100, 200), Span::new(400, 500), Span::new(800, 900)];
        assert_eq!(
            subtract_spans(&base, &holes),
            vec![
                Span::new(0, 100),
                Span::new(200, 400),
                Span::new(500, 800),
                Span::new(900, 1000),
            ]
        );
    }

    // ── operating_spans / open_slots ──────────────────────

    #[test]
    fn operating_spans_single_day() {
        // 09:00–17:00 on day zero
        let window = Span::new(0, MS_PER_DAY);
        let spans = operating_spans(9 * 60, 17 * 60, &window);
        assert_eq!(spans, vec![Span::new(9 * H, 17 * H)]);
    }

    #[test]
    fn operating_spans_multi_day_clipped() {
        // window covers the tail of day 0 and the head of day 1
        let window = Span::new(16 * H, MS_PER_DAY + 10 * H);
        let spans = operating_spans(9 * 60, 17 * 60, &window);
        assert_eq!(
            spans,
            vec![
                Span::new(16 * H, 17 * H),
                Span::new(MS_PER_DAY + 9 * H, MS_PER_DAY + 10 * H),
            ]
        );
    }

    #[test]
    fn operating_spans_inverted_hours_empty() {
        let window = Span::new(0, MS_PER_DAY);
        assert!(operating_spans(17 * 60, 9 * 60, &window).is_empty());
    }

    #[test]
    fn open_slots_subtracts_bookings() {
        let mut ws = desk(9 * 60, 17 * 60);
        ws.insert_booking(booking(10 * H, 10 * H + 30 * M, BookingStatus::Confirmed));
        ws.insert_booking(booking(12 * H, 13 * H, BookingStatus::Cancelled));

        let slots = open_slots(&ws, &Span::new(0, MS_PER_DAY));
        assert_eq!(
            slots,
            vec![Span::new(9 * H, 10 * H), Span::new(10 * H + 30 * M, 17 * H)]
        );
    }

    #[test]
    fn open_slots_fully_booked_day() {
        let mut ws = desk(9 * 60, 17 * 60);
        ws.insert_booking(booking(8 * H, 18 * H, BookingStatus::Confirmed));
        assert!(open_slots(&ws, &Span::new(0, MS_PER_DAY)).is_empty());
    }
}
