//! Folding per-test raw scores into a final score.
//!
//! Tests must be recorded strictly in ascending id order. ACM short-circuiting
//! and the subtask AND-fold both depend on that order.

use serde::Serialize;
use thiserror::Error;

/// Aggregation policy
#[derive(Debug, Clone, PartialEq)]
pub enum Policy {
    /// Final score is the sum of raw scores
    Normal,
    /// The first test below its full share halts the run
    Acm,
    /// A subtask's weight counts only if every member test earns its full share
    Subtask {
        /// Subtask id of each test, indexed by test id
        assignment: Vec<usize>,
        /// Weight of each subtask, indexed by subtask id
        weights: Vec<f64>,
    },
}

/// Whether the caller should keep running tests
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Halt,
}

/// Scoring engine errors
#[derive(Error, Debug, PartialEq)]
pub enum ScoringError {
    #[error("test {got} recorded out of order, expected test {expected}")]
    OutOfOrder { expected: usize, got: usize },

    #[error("test {0} recorded after the run was halted")]
    AfterHalt(usize),

    #[error("test {0} does not exist")]
    UnknownTest(usize),

    #[error("subtask assignment covers {assigned} tests but there are {tests}")]
    AssignmentLength { assigned: usize, tests: usize },

    #[error("test {test} belongs to subtask {subtask} which has no weight")]
    UnknownSubtask { test: usize, subtask: usize },
}

/// Final aggregation result
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Aggregate {
    /// Unrounded final score
    pub final_score: f64,
    /// Raw score per test; tests never run contribute 0
    pub raw_scores: Vec<f64>,
    /// Whether any recorded test scored below its full share
    pub failed: bool,
    /// Test at which an ACM run stopped
    pub halted_at: Option<usize>,
    /// Pass flag per subtask (empty unless the subtask policy is used)
    pub subtask_passed: Vec<bool>,
}

/// Running state of the scoring engine for one run
#[derive(Debug, Clone)]
pub struct ScoreAccumulator {
    policy: Policy,
    shares: Vec<f64>,
    raw: Vec<f64>,
    sum: f64,
    failed: bool,
    halted_at: Option<usize>,
    subtask_passed: Vec<bool>,
}

impl ScoreAccumulator {
    /// Create an accumulator for tests with the given full shares
    pub fn new(policy: Policy, shares: Vec<f64>) -> Result<Self, ScoringError> {
        let subtask_passed = match &policy {
            Policy::Subtask { assignment, weights } => {
                if assignment.len() != shares.len() {
                    return Err(ScoringError::AssignmentLength {
                        assigned: assignment.len(),
                        tests: shares.len(),
                    });
                }
                if let Some((test, &subtask)) =
                    assignment.iter().enumerate().find(|(_, s)| **s >= weights.len())
                {
                    return Err(ScoringError::UnknownSubtask { test, subtask });
                }
                vec![true; weights.len()]
            }
            _ => Vec::new(),
        };

        Ok(Self {
            raw: Vec::with_capacity(shares.len()),
            policy,
            shares,
            sum: 0.0,
            failed: false,
            halted_at: None,
            subtask_passed,
        })
    }

    /// Id of the next test the accumulator expects
    pub fn next_test(&self) -> usize {
        self.raw.len()
    }

    /// Whether any recorded test scored below its full share
    pub fn failed(&self) -> bool {
        self.failed
    }

    /// Whether the run was stopped early
    pub fn is_halted(&self) -> bool {
        self.halted_at.is_some()
    }

    /// Record the raw score of the next test.
    pub fn record(&mut self, test_id: usize, raw_score: f64) -> Result<Flow, ScoringError> {
        if self.is_halted() {
            return Err(ScoringError::AfterHalt(test_id));
        }
        if test_id >= self.shares.len() {
            return Err(ScoringError::UnknownTest(test_id));
        }
        if test_id != self.next_test() {
            return Err(ScoringError::OutOfOrder {
                expected: self.next_test(),
                got: test_id,
            });
        }

        let share = self.shares[test_id];
        self.raw.push(raw_score);
        self.sum += raw_score;

        if raw_score < share {
            self.failed = true;
        }

        match &self.policy {
            Policy::Normal => Ok(Flow::Continue),
            Policy::Acm => {
                if raw_score < share {
                    self.halted_at = Some(test_id);
                    Ok(Flow::Halt)
                } else {
                    Ok(Flow::Continue)
                }
            }
            Policy::Subtask { assignment, .. } => {
                let subtask = assignment[test_id];
                // Exact equality: shares are products of the same inputs on both sides.
                self.subtask_passed[subtask] &= raw_score == share;
                Ok(Flow::Continue)
            }
        }
    }

    /// Finish the run and compute the final score
    pub fn finish(self) -> Aggregate {
        let tests = self.shares.len();
        let recorded = self.raw.len();
        let mut raw_scores = self.raw;
        raw_scores.resize(tests, 0.0);

        let mut subtask_passed = self.subtask_passed;
        let final_score = match &self.policy {
            Policy::Subtask { assignment, weights } => {
                for &subtask in &assignment[recorded..] {
                    subtask_passed[subtask] = false;
                }
                subtask_passed
                    .iter()
                    .zip(weights)
                    .filter(|(passed, _)| **passed)
                    .map(|(_, weight)| weight)
                    .sum()
            }
            _ => self.sum,
        };

        Aggregate {
            final_score,
            raw_scores,
            failed: self.failed,
            halted_at: self.halted_at,
            subtask_passed,
        }
    }
}

/// Aggregate a complete sequence of raw scores in one call.
///
/// Scores past an ACM halt are ignored.
pub fn aggregate(policy: Policy, shares: Vec<f64>, raw: &[f64]) -> Result<Aggregate, ScoringError> {
    let mut acc = ScoreAccumulator::new(policy, shares)?;
    for (id, &score) in raw.iter().enumerate() {
        if acc.record(id, score)? == Flow::Halt {
            break;
        }
    }
    Ok(acc.finish())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shares::{equal_shares, proportional_shares};

    #[test]
    fn test_normal_sums_everything() {
        let shares = equal_shares(30.0, 3);
        let result = aggregate(Policy::Normal, shares, &[10.0, 0.0, 10.0]).unwrap();
        assert_eq!(result.final_score, 20.0);
        assert!(result.failed);
        assert_eq!(result.halted_at, None);
        assert_eq!(result.raw_scores, vec![10.0, 0.0, 10.0]);
    }

    #[test]
    fn test_acm_halts_on_first_failure() {
        let shares = equal_shares(30.0, 3);
        let result = aggregate(Policy::Acm, shares, &[10.0, 0.0, 10.0]).unwrap();
        assert_eq!(result.final_score, 10.0);
        assert!(result.failed);
        assert_eq!(result.halted_at, Some(1));
        assert_eq!(result.raw_scores, vec![10.0, 0.0, 0.0]);
    }

    #[test]
    fn test_acm_partial_credit_counts_then_halts() {
        let shares = equal_shares(30.0, 3);
        let result = aggregate(Policy::Acm, shares, &[10.0, 5.0, 10.0]).unwrap();
        assert_eq!(result.final_score, 15.0);
        assert_eq!(result.halted_at, Some(1));
    }

    #[test]
    fn test_acm_all_full_share_sums_to_max() {
        let shares = proportional_shares(100.0, &[1.0, 3.0, 4.0, 2.0]);
        let raw = shares.clone();
        let result = aggregate(Policy::Acm, shares, &raw).unwrap();
        assert!((result.final_score - 100.0).abs() < 1e-9);
        assert!(!result.failed);
        assert_eq!(result.halted_at, None);
    }

    #[test]
    fn test_record_after_halt_rejected() {
        let mut acc = ScoreAccumulator::new(Policy::Acm, equal_shares(20.0, 2)).unwrap();
        assert_eq!(acc.record(0, 0.0).unwrap(), Flow::Halt);
        assert!(acc.is_halted());
        assert_eq!(acc.record(1, 10.0), Err(ScoringError::AfterHalt(1)));
    }

    #[test]
    fn test_out_of_order_rejected() {
        let mut acc = ScoreAccumulator::new(Policy::Normal, equal_shares(30.0, 3)).unwrap();
        assert_eq!(
            acc.record(1, 10.0),
            Err(ScoringError::OutOfOrder { expected: 0, got: 1 })
        );
        assert_eq!(acc.record(3, 10.0), Err(ScoringError::UnknownTest(3)));
    }

    #[test]
    fn test_subtask_all_or_nothing() {
        let shares = equal_shares(40.0, 4);
        let policy = Policy::Subtask {
            assignment: vec![0, 0, 1, 1],
            weights: proportional_shares(40.0, &[1.0, 3.0]),
        };
        // Subtask 0 fully passes; subtask 1 loses one test by a sliver.
        let result = aggregate(policy, shares, &[10.0, 10.0, 10.0, 9.5]).unwrap();
        assert_eq!(result.subtask_passed, vec![true, false]);
        assert_eq!(result.final_score, 10.0);
        assert!(result.failed);
    }

    #[test]
    fn test_subtask_discards_raw_sum() {
        let shares = equal_shares(30.0, 3);
        let policy = Policy::Subtask {
            assignment: vec![0, 1, 1],
            weights: vec![5.0, 25.0],
        };
        let result = aggregate(policy, shares, &[10.0, 10.0, 10.0]).unwrap();
        assert_eq!(result.final_score, 30.0);
        assert_eq!(result.subtask_passed, vec![true, true]);
    }

    #[test]
    fn test_subtask_unrecorded_members_fail() {
        let policy = Policy::Subtask {
            assignment: vec![0, 1],
            weights: vec![10.0, 10.0],
        };
        let mut acc = ScoreAccumulator::new(policy, equal_shares(20.0, 2)).unwrap();
        acc.record(0, 10.0).unwrap();
        let result = acc.finish();
        assert_eq!(result.final_score, 10.0);
        assert_eq!(result.subtask_passed, vec![true, false]);
    }

    #[test]
    fn test_subtask_shape_validated() {
        let policy = Policy::Subtask {
            assignment: vec![0, 1],
            weights: vec![10.0, 10.0],
        };
        assert_eq!(
            ScoreAccumulator::new(policy, equal_shares(20.0, 3)).unwrap_err(),
            ScoringError::AssignmentLength { assigned: 2, tests: 3 }
        );

        let policy = Policy::Subtask {
            assignment: vec![0, 2],
            weights: vec![10.0, 10.0],
        };
        assert_eq!(
            ScoreAccumulator::new(policy, equal_shares(20.0, 2)).unwrap_err(),
            ScoringError::UnknownSubtask { test: 1, subtask: 2 }
        );
    }

    #[test]
    fn test_aggregate_serializes() {
        let result = aggregate(Policy::Normal, equal_shares(10.0, 1), &[10.0]).unwrap();
        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["final_score"], 10.0);
        assert_eq!(json["failed"], false);
    }
}
