//! Core data models for match statistics.

mod catalog;
mod group;
mod ids;
mod outcome;
mod stats;

pub use catalog::*;
pub use group::*;
pub use ids::*;
pub use outcome::*;
pub use stats::*;
