//! Scoring engine for Themis.
//!
//! Pure functions that turn per-test raw scores into a final score:
//!
//! - [`equal_shares`] / [`proportional_shares`] split a problem's maximum
//!   score across tests (or subtasks).
//! - [`ScoreAccumulator`] folds raw scores in ascending test order under one
//!   of the [`Policy`] variants and reports when a run must stop early.
//!
//! # Example
//!
//! ```
//! use themis_scoring::{proportional_shares, Flow, Policy, ScoreAccumulator};
//!
//! let shares = proportional_shares(30.0, &[1.0, 1.0, 1.0]);
//! let mut acc = ScoreAccumulator::new(Policy::Acm, shares).unwrap();
//! assert_eq!(acc.record(0, 10.0).unwrap(), Flow::Continue);
//! assert_eq!(acc.record(1, 0.0).unwrap(), Flow::Halt);
//! let result = acc.finish();
//! assert_eq!(result.final_score, 10.0);
//! assert!(result.failed);
//! ```

pub mod aggregate;
pub mod shares;

pub use aggregate::{Aggregate, Flow, Policy, ScoreAccumulator, ScoringError, aggregate};
pub use shares::{equal_shares, proportional_shares};
