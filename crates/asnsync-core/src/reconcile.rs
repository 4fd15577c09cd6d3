//! Desired versus current membership
//!
//! `reconcile` is a pure set difference; the engine owns every remote call.

use crate::model::{RangeSet, ReconciliationDelta};

/// Compute the ranges to add to and remove from one tag
///
/// `to_add = desired − current` and `to_remove = current − desired`. The two
/// sides are disjoint by construction, and reconciling the result of
/// applying a delta yields an empty delta.
pub fn reconcile(desired: &RangeSet, current: &RangeSet) -> ReconciliationDelta {
    ReconciliationDelta {
        to_add: desired.difference(current).copied().collect(),
        to_remove: current.difference(desired).copied().collect(),
    }
}

/// Apply a delta to a membership set
pub fn apply(current: &RangeSet, delta: &ReconciliationDelta) -> RangeSet {
    current
        .difference(&delta.to_remove)
        .chain(delta.to_add.iter())
        .copied()
        .collect()
}
