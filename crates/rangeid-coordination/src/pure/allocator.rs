//! Pure range allocation functions.
//!
//! Ranges are inclusive and ids are strictly positive; `0` is the sentinel
//! for "no id available". None of these functions touch the store.

use std::collections::BTreeSet;

use rangeid_constants::allocation::MAX_RANGES;

use crate::error::RangeError;
use crate::types::IdRange;

// ============================================================================
// Validation
// ============================================================================

/// Check a range list before it is used for allocation.
///
/// Rejects, in order: an empty list, too many ranges, zero bounds, inverted
/// ranges, and overlap between neighbours once sorted by `from`. Two ranges
/// overlap when the later one starts strictly before the earlier one ends.
///
/// Non-numeric bounds are rejected earlier, when parsing an [`IdRange`].
pub fn validate_ranges(ranges: &[IdRange]) -> Result<(), RangeError> {
    normalize_ranges(ranges).map(|_| ())
}

/// Validate `ranges` and return them sorted ascending by `from`.
///
/// The caller's slice is left untouched.
pub fn normalize_ranges(ranges: &[IdRange]) -> Result<Vec<IdRange>, RangeError> {
    if ranges.is_empty() {
        return Err(RangeError::Empty);
    }
    if ranges.len() > MAX_RANGES as usize {
        return Err(RangeError::TooMany {
            count: ranges.len(),
            max: MAX_RANGES,
        });
    }
    for range in ranges {
        if range.from == 0 || range.to == 0 {
            return Err(RangeError::ZeroBound { range: *range });
        }
        if range.to < range.from {
            return Err(RangeError::Inverted { range: *range });
        }
    }

    let mut sorted = ranges.to_vec();
    sorted.sort_by_key(|range| (range.from, range.to));
    for pair in sorted.windows(2) {
        if pair[1].from < pair[0].to {
            return Err(RangeError::Overlap {
                first: pair[0],
                second: pair[1],
            });
        }
    }
    Ok(sorted)
}

/// Whether `id` falls in any of `ranges`.
#[inline]
pub fn ranges_contain(ranges: &[IdRange], id: u64) -> bool {
    ranges.iter().any(|range| range.contains(id))
}

// ============================================================================
// Search
// ============================================================================

/// Find the smallest free id, visiting ranges in ascending `from` order.
///
/// Returns `0` if every id of every range is in `consumed`. Ranges are
/// re-sorted here, so callers need not pre-sort. Runs in
/// `O(|ranges| + |consumed|)` steps regardless of range width.
///
/// # Example
///
/// ```ignore
/// let ranges = [IdRange::new(10, 12), IdRange::new(1, 3)];
/// assert_eq!(find_first_available_id(&ranges, &[1, 2]), 3);
/// assert_eq!(find_first_available_id(&ranges, &[1, 2, 3, 10, 11, 12]), 0);
/// ```
pub fn find_first_available_id(ranges: &[IdRange], consumed: &[u64]) -> u64 {
    let mut sorted = ranges.to_vec();
    sorted.sort_by_key(|range| range.from);
    let consumed: BTreeSet<u64> = consumed.iter().copied().collect();

    'ranges: for range in sorted.iter().filter(|range| !range.is_empty() && range.from != 0) {
        let mut candidate = range.from;
        for &taken in consumed.range(range.from..=range.to) {
            if taken != candidate {
                break;
            }
            if candidate == range.to {
                continue 'ranges;
            }
            candidate += 1;
        }
        return candidate;
    }
    0
}

/// Number of distinct ids in `ranges` not yet in `consumed`.
///
/// An id shared by touching ranges (`1-5`, `5-9`) is counted once.
pub fn count_available(ranges: &[IdRange], consumed: &[u64]) -> u64 {
    let consumed: BTreeSet<u64> = consumed.iter().copied().collect();
    let mut sorted = ranges.to_vec();
    sorted.sort_by_key(|range| (range.from, range.to));

    let mut total = 0u64;
    // Lowest id not counted yet; None once u64::MAX has been counted
    let mut uncounted_from = Some(0u64);
    for range in &sorted {
        let Some(floor) = uncounted_from else {
            break;
        };
        let from = range.from.max(floor);
        if from > range.to {
            continue;
        }
        let taken = consumed.range(from..=range.to).count() as u64;
        total = total.saturating_add(IdRange::new(from, range.to).len().saturating_sub(taken));
        uncounted_from = range.to.checked_add(1);
    }
    total
}

// ============================================================================
// Merge
// ============================================================================

/// Sorted, de-duplicated union of two id lists.
pub fn merge_consumed_ids(existing: &[u64], additions: &[u64]) -> Vec<u64> {
    existing.iter().chain(additions).copied().collect::<BTreeSet<u64>>().into_iter().collect()
}

// ============================================================================
// Consumption Planning
// ============================================================================

/// What to do with a freshly read consumption document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConsumptionPlan {
    /// Record `id`; `consumed` is the new document content.
    Claim { id: u64, consumed: Vec<u64> },
    /// The required id is already taken; nothing to write.
    AlreadyConsumed { id: u64 },
    /// Every id in the ranges is taken; nothing to write.
    Exhausted,
}

/// Decide how to extend `consumed` (absent for a brand new document).
///
/// With `required` set, that id is claimed unless already present. Without
/// it, `previous_candidate` is reused while it is still free, so a retry
/// after a lost race only moves to a new id when the old one was taken.
pub fn plan_consumption(
    ranges: &[IdRange],
    consumed: Option<&[u64]>,
    previous_candidate: Option<u64>,
    required: Option<u64>,
) -> ConsumptionPlan {
    let consumed = consumed.unwrap_or(&[]);

    let id = match required {
        Some(id) if consumed.contains(&id) => return ConsumptionPlan::AlreadyConsumed { id },
        Some(id) => id,
        None => match previous_candidate {
            Some(candidate) if candidate != 0 && !consumed.contains(&candidate) => candidate,
            _ => match find_first_available_id(ranges, consumed) {
                0 => return ConsumptionPlan::Exhausted,
                id => id,
            },
        },
    };

    ConsumptionPlan::Claim {
        id,
        consumed: merge_consumed_ids(consumed, &[id]),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn r(from: u64, to: u64) -> IdRange {
        IdRange::new(from, to)
    }

    // ------------------------------------------------------------------------
    // validate_ranges
    // ------------------------------------------------------------------------

    #[test]
    fn empty_list_rejected() {
        assert_eq!(validate_ranges(&[]), Err(RangeError::Empty));
    }

    #[test]
    fn zero_bounds_rejected() {
        assert_eq!(validate_ranges(&[r(0, 5)]), Err(RangeError::ZeroBound { range: r(0, 5) }));
        assert!(matches!(validate_ranges(&[r(1, 5), r(7, 0)]), Err(RangeError::ZeroBound { .. })));
    }

    #[test]
    fn inverted_range_rejected() {
        assert_eq!(validate_ranges(&[r(9, 3)]), Err(RangeError::Inverted { range: r(9, 3) }));
    }

    #[test]
    fn overlap_detected_after_sorting() {
        let err = validate_ranges(&[r(50, 60), r(1, 100)]).unwrap_err();
        assert_eq!(err, RangeError::Overlap {
            first: r(1, 100),
            second: r(50, 60),
        });
    }

    #[test]
    fn adjacent_ranges_accepted() {
        assert!(validate_ranges(&[r(1, 10), r(11, 20)]).is_ok());
        // Next range starting exactly at the previous end is not an overlap
        assert!(validate_ranges(&[r(1, 10), r(10, 20)]).is_ok());
    }

    #[test]
    fn too_many_ranges_rejected() {
        let ranges: Vec<IdRange> = (1..=MAX_RANGES as u64 + 1).map(|i| r(i * 10, i * 10 + 1)).collect();
        assert!(matches!(validate_ranges(&ranges), Err(RangeError::TooMany { .. })));
    }

    #[test]
    fn normalize_sorts_without_touching_input() {
        let input = [r(100, 199), r(1, 9)];
        let sorted = normalize_ranges(&input).unwrap();
        assert_eq!(sorted, vec![r(1, 9), r(100, 199)]);
        assert_eq!(input[0], r(100, 199));
    }

    // ------------------------------------------------------------------------
    // find_first_available_id
    // ------------------------------------------------------------------------

    #[test]
    fn first_id_of_first_range_when_nothing_consumed() {
        assert_eq!(find_first_available_id(&[r(5, 9)], &[]), 5);
    }

    #[test]
    fn skips_consumed_prefix() {
        assert_eq!(find_first_available_id(&[r(1, 10)], &[1, 2, 3]), 4);
    }

    #[test]
    fn finds_gap_in_middle() {
        assert_eq!(find_first_available_id(&[r(1, 10)], &[1, 2, 4, 5]), 3);
    }

    #[test]
    fn moves_to_next_range_when_first_is_full() {
        assert_eq!(find_first_available_id(&[r(1, 3), r(20, 30)], &[1, 2, 3]), 20);
    }

    #[test]
    fn visits_ranges_in_from_order() {
        assert_eq!(find_first_available_id(&[r(20, 30), r(1, 3)], &[]), 1);
    }

    #[test]
    fn exhausted_returns_zero() {
        assert_eq!(find_first_available_id(&[r(1, 2), r(5, 5)], &[5, 2, 1]), 0);
    }

    #[test]
    fn ignores_consumed_ids_outside_ranges() {
        assert_eq!(find_first_available_id(&[r(10, 12)], &[1, 2, 3, 99]), 10);
    }

    #[test]
    fn unsorted_and_duplicated_consumed_ids() {
        assert_eq!(find_first_available_id(&[r(1, 5)], &[3, 1, 2, 2, 1]), 4);
    }

    #[test]
    fn range_ending_at_max_does_not_overflow() {
        let range = r(u64::MAX - 1, u64::MAX);
        assert_eq!(find_first_available_id(&[range], &[u64::MAX - 1]), u64::MAX);
        assert_eq!(find_first_available_id(&[range], &[u64::MAX - 1, u64::MAX]), 0);
    }

    #[test]
    fn wide_range_is_cheap() {
        let consumed: Vec<u64> = (1..=1_000).collect();
        assert_eq!(find_first_available_id(&[r(1, u64::MAX)], &consumed), 1_001);
    }

    // ------------------------------------------------------------------------
    // count_available / merge_consumed_ids
    // ------------------------------------------------------------------------

    #[test]
    fn count_available_subtracts_in_range_ids_only() {
        assert_eq!(count_available(&[r(1, 10), r(20, 24)], &[1, 2, 20, 99]), 12);
    }

    #[test]
    fn count_available_counts_shared_bound_once() {
        let touching = normalize_ranges(&[r(5, 9), r(1, 5)]).unwrap();
        assert_eq!(count_available(&touching, &[]), 9);
        assert_eq!(count_available(&touching, &[5]), 8);
        assert_eq!(count_available(&[r(1, u64::MAX), r(u64::MAX, u64::MAX)], &[]), u64::MAX);
    }

    #[test]
    fn merge_is_sorted_unique_union() {
        assert_eq!(merge_consumed_ids(&[5, 1, 3], &[3, 2, 9]), vec![1, 2, 3, 5, 9]);
        assert_eq!(merge_consumed_ids(&[], &[]), Vec::<u64>::new());
    }

    // ------------------------------------------------------------------------
    // plan_consumption
    // ------------------------------------------------------------------------

    #[test]
    fn plan_for_absent_document_claims_first_id() {
        assert_eq!(plan_consumption(&[r(7, 9)], None, None, None), ConsumptionPlan::Claim {
            id: 7,
            consumed: vec![7],
        });
    }

    #[test]
    fn plan_keeps_previous_candidate_while_free() {
        // 8 is still free even though 7 would now be the first free id
        let plan = plan_consumption(&[r(7, 9)], Some(&[9]), Some(8), None);
        assert_eq!(plan, ConsumptionPlan::Claim {
            id: 8,
            consumed: vec![8, 9],
        });
    }

    #[test]
    fn plan_recomputes_when_candidate_was_taken() {
        let plan = plan_consumption(&[r(7, 9)], Some(&[7]), Some(7), None);
        assert_eq!(plan, ConsumptionPlan::Claim {
            id: 8,
            consumed: vec![7, 8],
        });
    }

    #[test]
    fn plan_exhausted() {
        assert_eq!(plan_consumption(&[r(1, 2)], Some(&[1, 2]), Some(2), None), ConsumptionPlan::Exhausted);
    }

    #[test]
    fn plan_required_id() {
        assert_eq!(plan_consumption(&[r(1, 9)], Some(&[1]), None, Some(5)), ConsumptionPlan::Claim {
            id: 5,
            consumed: vec![1, 5],
        });
        assert_eq!(
            plan_consumption(&[r(1, 9)], Some(&[1, 5]), None, Some(5)),
            ConsumptionPlan::AlreadyConsumed { id: 5 }
        );
    }
}

#[cfg(all(test, feature = "bolero"))]
mod property_tests {
    use super::*;
    use bolero::check;

    fn small_ranges(raw: &[(u8, u8)]) -> Vec<IdRange> {
        raw.iter()
            .map(|&(from, width)| {
                let from = from as u64 + 1;
                IdRange::new(from, from + (width % 8) as u64)
            })
            .collect()
    }

    #[test]
    fn prop_first_available_is_smallest_free_id() {
        check!().with_type::<(Vec<(u8, u8)>, Vec<u16>)>().for_each(|(raw, consumed)| {
            let ranges = small_ranges(raw);
            let consumed: Vec<u64> = consumed.iter().map(|&id| id as u64 % 300).collect();
            let mut sorted = ranges.clone();
            sorted.sort_by_key(|range| range.from);

            let expected = sorted
                .iter()
                .flat_map(|range| range.from..=range.to)
                .find(|id| !consumed.contains(id))
                .unwrap_or(0);
            assert_eq!(find_first_available_id(&ranges, &consumed), expected);
        });
    }

    #[test]
    fn prop_merge_contains_both_inputs() {
        check!().with_type::<(Vec<u64>, Vec<u64>)>().for_each(|(a, b)| {
            let merged = merge_consumed_ids(a, b);
            assert!(merged.windows(2).all(|pair| pair[0] < pair[1]));
            assert!(a.iter().chain(b).all(|id| merged.binary_search(id).is_ok()));
        });
    }

    #[test]
    fn prop_normalized_ranges_are_sorted_and_disjoint() {
        check!().with_type::<Vec<(u8, u8)>>().for_each(|raw| {
            let ranges = small_ranges(raw);
            if let Ok(sorted) = normalize_ranges(&ranges) {
                assert!(sorted.windows(2).all(|pair| pair[0].from <= pair[1].from && pair[1].from >= pair[0].to));
            }
        });
    }
}
