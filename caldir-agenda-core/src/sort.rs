//! Sort stage: orders filtered candidates for reconciliation.

use std::sync::Arc;

use crate::occurrence::Occurrence;

/// Sort occurrences into agenda order (see [`Occurrence::cmp_order`]).
pub fn sort_occurrences(occurrences: &mut [Arc<Occurrence>]) {
    occurrences.sort_by(|a, b| a.cmp_order(b));
}

/// Whether `occurrences` is already in agenda order.
pub fn is_sorted(occurrences: &[Arc<Occurrence>]) -> bool {
    occurrences.windows(2).all(|w| !w[1].less_than(&w[0]))
}
