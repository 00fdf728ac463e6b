//! Before/after tree diffing and decomposition into candidate units.

pub mod decomposer;
pub mod narrower;

pub use decomposer::{CandidateSite, CandidateUnit, decompose, is_edit_shaped, sites};
pub use narrower::{DiffNarrower, DiffStep};
