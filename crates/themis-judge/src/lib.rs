//! Themis contest judge
//!
//! Compiles a submission and a checker, runs the submission against every
//! test under time and memory ceilings, scores each output with the checker
//! and folds the per-test scores into a final score.

pub mod capability;
pub mod checker;
pub mod compiler;
pub mod config;
pub mod constants;
pub mod judge;
pub mod plan;
pub mod problem;
pub mod report;
pub mod sandbox;
pub mod stub;

pub use config::Config;
pub use judge::Judge;
pub use report::ScoreReport;
