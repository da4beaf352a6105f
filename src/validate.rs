//! Pre-flight conflict detection for edit batches.
//!
//! A batch whose hinted line ranges overlap is self-contradictory: the edits
//! would fight over the same region regardless of how matching resolves.
//! Validation runs before any file I/O and reports every conflicting pair at
//! once, not just the first, so the caller can fix the whole batch in one
//! round trip.

use crate::request::EditRequest;
use std::fmt;
use thiserror::Error;

/// A pair of edits whose hinted ranges intersect. Indices refer to the
/// batch's original declaration order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConflictPair {
    pub first_index: usize,
    pub second_index: usize,
    pub first_range: (usize, usize),
    pub second_range: (usize, usize),
}

impl fmt::Display for ConflictPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "diff #{} (lines {}-{}) overlaps diff #{} (lines {}-{})",
            self.first_index,
            self.first_range.0,
            self.first_range.1,
            self.second_index,
            self.second_range.0,
            self.second_range.1,
        )
    }
}

/// Overlapping edits detected before application. Always fatal for the whole
/// batch; no file content is read or mutated once this is returned.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub struct ConflictError {
    pub conflicts: Vec<ConflictPair>,
}

impl fmt::Display for ConflictError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "overlapping diffs in batch: ")?;
        for (idx, pair) in self.conflicts.iter().enumerate() {
            if idx > 0 {
                write!(f, "; ")?;
            }
            write!(f, "{pair}")?;
        }
        Ok(())
    }
}

/// Screens a batch for hinted-range overlaps.
pub struct DiffValidator;

impl DiffValidator {
    /// Sort edits by start hint and sweep once, comparing each edit against
    /// the furthest-reaching range seen so far. Catches conflicts between
    /// non-adjacent edits too (e.g. a long range swallowing a later short
    /// one). Symmetric in declaration order by construction.
    pub fn validate(edits: &[EditRequest]) -> Result<(), ConflictError> {
        if edits.len() < 2 {
            return Ok(());
        }

        let mut order: Vec<usize> = (0..edits.len()).collect();
        order.sort_by_key(|&i| (edits[i].start_hint, edits[i].end_hint, i));

        let mut conflicts = Vec::new();
        // The sweep keeps the edit whose range reaches furthest; any later
        // start inside that range is a conflict with it.
        let mut reach = order[0];

        for &current in &order[1..] {
            if edits[current].start_hint <= edits[reach].end_hint {
                let (a, b) = if reach < current {
                    (reach, current)
                } else {
                    (current, reach)
                };
                conflicts.push(ConflictPair {
                    first_index: a,
                    second_index: b,
                    first_range: edits[a].hint_range(),
                    second_range: edits[b].hint_range(),
                });
            }
            if edits[current].end_hint > edits[reach].end_hint {
                reach = current;
            }
        }

        if conflicts.is_empty() {
            Ok(())
        } else {
            Err(ConflictError { conflicts })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn edit(start: usize, end: usize) -> EditRequest {
        EditRequest {
            start_hint: start,
            end_hint: end,
            original: "x".to_string(),
            replacement: "y".to_string(),
            description: None,
        }
    }

    #[test]
    fn disjoint_ranges_pass() {
        let edits = vec![edit(0, 1), edit(3, 4), edit(8, 10)];
        assert!(DiffValidator::validate(&edits).is_ok());
    }

    #[test]
    fn touching_ranges_conflict() {
        let edits = vec![edit(0, 2), edit(2, 5)];
        let err = DiffValidator::validate(&edits).unwrap_err();
        assert_eq!(err.conflicts.len(), 1);
    }

    #[test]
    fn nested_range_conflicts() {
        let edits = vec![edit(0, 2), edit(1, 1)];
        let err = DiffValidator::validate(&edits).unwrap_err();
        assert_eq!(err.conflicts.len(), 1);
        assert_eq!(err.conflicts[0].first_range, (0, 2));
        assert_eq!(err.conflicts[0].second_range, (1, 1));
        assert!(err.to_string().contains("overlap"));
    }

    #[test]
    fn overlap_detection_is_symmetric() {
        let a = edit(1, 3);
        let b = edit(2, 2);

        let forward = DiffValidator::validate(&[a.clone(), b.clone()]).unwrap_err();
        let reverse = DiffValidator::validate(&[b, a]).unwrap_err();

        assert_eq!(forward.conflicts.len(), 1);
        assert_eq!(reverse.conflicts.len(), 1);
        // Same pair of ranges either way; only the declaration indices swap.
        assert_eq!(forward.conflicts[0].first_range, (1, 3));
        assert_eq!(reverse.conflicts[0].first_range, (2, 2));
        assert_eq!(reverse.conflicts[0].second_range, (1, 3));
    }

    #[test]
    fn long_range_conflicts_with_non_adjacent_edit() {
        // Sorted order is [0,10], [2,3], [5,6]; the third edit is not
        // adjacent to the first but still falls inside its range.
        let edits = vec![edit(0, 10), edit(2, 3), edit(5, 6)];
        let err = DiffValidator::validate(&edits).unwrap_err();
        assert_eq!(err.conflicts.len(), 2);
    }

    #[test]
    fn all_conflicts_reported_at_once() {
        let edits = vec![edit(0, 1), edit(1, 2), edit(2, 3)];
        let err = DiffValidator::validate(&edits).unwrap_err();
        assert_eq!(err.conflicts.len(), 2);
        let message = err.to_string();
        assert!(message.contains("diff #0"));
        assert!(message.contains("diff #2"));
    }

    #[test]
    fn single_edit_never_conflicts() {
        assert!(DiffValidator::validate(&[edit(4, 4)]).is_ok());
        assert!(DiffValidator::validate(&[]).is_ok());
    }
}
