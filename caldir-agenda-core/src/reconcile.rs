//! Incremental reconciliation of a displayed occurrence list.
//!
//! Given the list currently on screen and a freshly fetched list (both in
//! agenda order), [`reconcile`] walks the two in a single merge pass and turns
//! the old list into the new one using contiguous remove and insert runs.
//! Each run is reported once as a [`RowChange`], so a consumer bound to the
//! list sees batched row updates instead of a full reset.
//!
//! Occurrences present in both lists (see [`Occurrence::same_instance`]) are
//! left in place: the already displayed `Arc` is kept and the incoming copy is
//! handed back for disposal. Anyone holding the old `Arc` keeps a valid,
//! unchanged record.

use std::sync::Arc;

use crate::occurrence::Occurrence;
use crate::sort::is_sorted;

/// A contiguous row mutation, with indices into the list as it is at the
/// moment the change is emitted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RowChange {
    Removed { start: usize, count: usize },
    Inserted { start: usize, count: usize },
}

impl RowChange {
    pub fn count(&self) -> usize {
        match self {
            RowChange::Removed { count, .. } | RowChange::Inserted { count, .. } => *count,
        }
    }
}

/// Transform `live` into `incoming`, reporting each run through `on_change`.
///
/// Returns every occurrence that is no longer referenced by `live`: removed
/// old entries and incoming entries that matched an existing one.
///
/// Both `live` and `incoming` must be in agenda order. An incoming entry that
/// matches the next displayed one always ends an insert run, so matched
/// entries are never removed and re-inserted.
pub fn reconcile<F>(
    live: &mut Vec<Arc<Occurrence>>,
    incoming: Vec<Arc<Occurrence>>,
    mut on_change: F,
) -> Vec<Arc<Occurrence>>
where
    F: FnMut(RowChange),
{
    debug_assert!(is_sorted(&incoming), "incoming occurrences out of order");

    // `merged` is the settled prefix of the live list; the untouched suffix
    // is whatever `old` has left. Row indices are positions in their concatenation.
    let mut merged: Vec<Arc<Occurrence>> = Vec::with_capacity(incoming.len());
    let mut disposed = Vec::new();
    let mut old = std::mem::take(live).into_iter().peekable();
    let mut new = incoming.into_iter().peekable();

    while old.peek().is_some() || new.peek().is_some() {
        let mut removed = 0;
        while let Some(stale) = old.next_if(|o| new.peek().is_none_or(|n| o.less_than(n))) {
            disposed.push(stale);
            removed += 1;
        }
        if removed > 0 {
            on_change(RowChange::Removed {
                start: merged.len(),
                count: removed,
            });
        }

        loop {
            let matched = match (old.peek(), new.peek()) {
                (Some(o), Some(n)) => n.same_instance(o),
                _ => false,
            };
            if !matched {
                break;
            }
            if let (Some(kept), Some(duplicate)) = (old.next(), new.next()) {
                merged.push(kept);
                disposed.push(duplicate);
            }
        }

        let insert_at = merged.len();
        while let Some(fresh) = new.next_if(|n| {
            old.peek()
                .is_none_or(|o| !o.less_than(n) && !n.same_instance(o))
        }) {
            merged.push(fresh);
        }
        if merged.len() > insert_at {
            on_change(RowChange::Inserted {
                start: insert_at,
                count: merged.len() - insert_at,
            });
        }
    }

    *live = merged;
    disposed
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::occurrence::tests::{at, occurrence};
    use chrono::{DateTime, Utc};

    fn occ(uid: &str, start: DateTime<Utc>, end: DateTime<Utc>) -> Arc<Occurrence> {
        Arc::new(occurrence(uid, uid, start, end))
    }

    /// Events at consecutive hours from 08:00, one hour long.
    fn hourly(uids: &[&str]) -> Vec<Arc<Occurrence>> {
        uids.iter()
            .enumerate()
            .map(|(i, uid)| occ(uid, at(8 + i as u32, 0), at(9 + i as u32, 0)))
            .collect()
    }

    fn uids(list: &[Arc<Occurrence>]) -> Vec<&str> {
        list.iter().map(|o| o.uid.as_str()).collect()
    }

    fn run(
        live: &mut Vec<Arc<Occurrence>>,
        incoming: Vec<Arc<Occurrence>>,
    ) -> (Vec<RowChange>, Vec<Arc<Occurrence>>) {
        let mut changes = Vec::new();
        let disposed = reconcile(live, incoming, |change| changes.push(change));

        (changes, disposed)
    }

    /// Replay changes on a copy of the old list the way a bound view would,
    /// checking every emitted index along the way.
    fn replay(before: &[Arc<Occurrence>], after: &[Arc<Occurrence>], changes: &[RowChange]) {
        let mut mirror: Vec<Arc<Occurrence>> = before.to_vec();
        for change in changes {
            match *change {
                RowChange::Removed { start, count } => {
                    assert!(start + count <= mirror.len());
                    mirror.drain(start..start + count);
                }
                RowChange::Inserted { start, count } => {
                    assert!(start <= mirror.len());
                    let rows = after[start..start + count].iter().cloned();
                    mirror.splice(start..start, rows);
                }
            }
        }
        assert_eq!(uids(&mirror), uids(after));
    }

    #[test]
    fn identical_lists_emit_nothing() {
        let mut live = hourly(&["a", "b", "c"]);
        let before = live.clone();

        let (changes, disposed) = run(&mut live, hourly(&["a", "b", "c"]));

        assert!(changes.is_empty());
        assert_eq!(disposed.len(), 3);
        assert!(live.iter().zip(&before).all(|(l, b)| Arc::ptr_eq(l, b)));
    }

    #[test]
    fn fills_an_empty_list_with_one_insert() {
        let mut live = Vec::new();

        let (changes, disposed) = run(&mut live, hourly(&["a", "b", "c"]));

        assert_eq!(changes, [RowChange::Inserted { start: 0, count: 3 }]);
        assert!(disposed.is_empty());
        assert_eq!(uids(&live), ["a", "b", "c"]);
    }

    #[test]
    fn clears_a_list_with_one_remove() {
        let mut live = hourly(&["a", "b", "c"]);

        let (changes, disposed) = run(&mut live, Vec::new());

        assert_eq!(changes, [RowChange::Removed { start: 0, count: 3 }]);
        assert_eq!(uids(&disposed), ["a", "b", "c"]);
        assert!(live.is_empty());
    }

    #[test]
    fn collapses_adjacent_changes_into_runs() {
        let all = hourly(&["a", "b", "c", "d", "e", "f"]);
        let mut live = vec![all[0].clone(), all[1].clone(), all[2].clone(), all[5].clone()];
        let before = live.clone();
        let incoming = hourly(&["a", "b", "c", "d", "e", "f"])
            .into_iter()
            .enumerate()
            .filter(|(i, _)| ![1, 2].contains(i))
            .map(|(_, o)| o)
            .collect();

        let (changes, _) = run(&mut live, incoming);

        assert_eq!(
            changes,
            [
                RowChange::Removed { start: 1, count: 2 },
                RowChange::Inserted { start: 1, count: 2 },
            ]
        );
        assert_eq!(uids(&live), ["a", "d", "e", "f"]);
        replay(&before, &live, &changes);
    }

    #[test]
    fn interleaved_changes_report_each_block() {
        let all = hourly(&["a", "b", "c", "d", "e"]);
        let mut live = vec![all[0].clone(), all[2].clone(), all[4].clone()];
        let before = live.clone();
        let incoming = vec![all[1].clone(), all[2].clone(), all[3].clone()];

        let (changes, _) = run(&mut live, incoming);

        assert_eq!(
            changes,
            [
                RowChange::Removed { start: 0, count: 1 },
                RowChange::Inserted { start: 0, count: 1 },
                RowChange::Inserted { start: 2, count: 1 },
                RowChange::Removed { start: 3, count: 1 },
            ]
        );
        assert_eq!(uids(&live), ["b", "c", "d"]);
        replay(&before, &live, &changes);
    }

    #[test]
    fn keeps_the_displayed_instance_on_match() {
        let mut live = hourly(&["a", "b"]);
        let held = live[1].clone();
        let incoming = hourly(&["a", "b"]);
        let incoming_b = incoming[1].clone();

        let (_, disposed) = run(&mut live, incoming);

        assert!(Arc::ptr_eq(&live[1], &held));
        assert!(disposed.iter().any(|d| Arc::ptr_eq(d, &incoming_b)));
        assert_eq!(held.uid, "b");
    }

    #[test]
    fn changed_end_time_replaces_the_row() {
        let e1 = occ("e1", at(10, 0), at(10, 30));
        let e2 = occ("e2", at(11, 0), at(12, 0));
        let mut live = vec![e1.clone(), e2.clone()];
        let before = live.clone();

        let e2_moved = occ("e2", at(11, 0), at(12, 30));
        let incoming = vec![
            occ("e1", at(10, 0), at(10, 30)),
            occ("e3", at(10, 30), at(11, 0)),
            e2_moved.clone(),
        ];

        let (changes, disposed) = run(&mut live, incoming);

        assert_eq!(
            changes,
            [
                RowChange::Inserted { start: 1, count: 2 },
                RowChange::Removed { start: 3, count: 1 },
            ]
        );
        assert_eq!(uids(&live), ["e1", "e3", "e2"]);
        assert!(Arc::ptr_eq(&live[0], &e1));
        assert!(Arc::ptr_eq(&live[2], &e2_moved));
        assert!(disposed.iter().any(|d| Arc::ptr_eq(d, &e2)));
        replay(&before, &live, &changes);
    }

    #[test]
    fn unresolved_occurrences_are_replaced_not_matched() {
        let mut unresolved = occurrence("u", "u", at(9, 0), at(10, 0));
        unresolved.event = None;
        let mut live = vec![Arc::new(unresolved.clone())];
        let before = live.clone();

        let (changes, _) = run(&mut live, vec![Arc::new(unresolved)]);

        assert_eq!(
            changes,
            [
                RowChange::Inserted { start: 0, count: 1 },
                RowChange::Removed { start: 1, count: 1 },
            ]
        );
        assert_eq!(live.len(), 1);
        assert!(!Arc::ptr_eq(&live[0], &before[0]));
        replay(&before, &live, &changes);
    }

    #[test]
    fn result_always_matches_incoming() {
        let pool = hourly(&["a", "b", "c", "d", "e"]);
        // Every pair of subsets, as bitmasks over the pool.
        for old_mask in 0u32..32 {
            for new_mask in 0u32..32 {
                let pick = |mask: u32| -> Vec<Arc<Occurrence>> {
                    pool.iter()
                        .enumerate()
                        .filter(|(i, _)| mask & (1 << *i) != 0)
                        .map(|(_, o)| Arc::new((**o).clone()))
                        .collect()
                };
                let mut live = pick(old_mask);
                let before = live.clone();
                let incoming = pick(new_mask);
                let expected: Vec<String> = incoming.iter().map(|o| o.uid.clone()).collect();

                let (changes, _) = run(&mut live, incoming);

                assert_eq!(uids(&live), expected);
                replay(&before, &live, &changes);
                if old_mask == new_mask {
                    assert!(changes.is_empty());
                }
                for pair in changes.windows(2) {
                    let split = match (pair[0], pair[1]) {
                        (RowChange::Removed { start: a, .. }, RowChange::Removed { start: b, .. }) => {
                            a == b
                        }
                        (
                            RowChange::Inserted { start: a, count },
                            RowChange::Inserted { start: b, .. },
                        ) => a + count == b,
                        _ => false,
                    };
                    assert!(
                        !split,
                        "split run for {:05b} -> {:05b}: {:?}",
                        old_mask, new_mask, changes
                    );
                }
            }
        }
    }
}
