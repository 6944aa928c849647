use std::cmp::Ordering;

use chrono::{DateTime, Utc};

use crate::models::ride::Candidate;

fn idle_longest_first(a: Option<DateTime<Utc>>, b: Option<DateTime<Utc>>) -> Ordering {
    match (a, b) {
        (Some(a), Some(b)) => a.cmp(&b),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}

fn by_straight_line(a: &Candidate, b: &Candidate) -> Ordering {
    a.straight_line_km
        .total_cmp(&b.straight_line_km)
        .then_with(|| idle_longest_first(a.last_available_at, b.last_available_at))
}

pub fn order_by_proximity(candidates: &mut [Candidate]) {
    candidates.sort_by(by_straight_line);
}

/// Routed captains by driving duration; captains without a route follow in
/// straight-line order.
pub fn order_by_route(candidates: &mut [Candidate]) {
    candidates.sort_by(|a, b| match (&a.route, &b.route) {
        (Some(ra), Some(rb)) => ra
            .duration
            .value
            .cmp(&rb.duration.value)
            .then_with(|| idle_longest_first(a.last_available_at, b.last_available_at)),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => by_straight_line(a, b),
    });
}
