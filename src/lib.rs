//! # Brawl Stats
//!
//! Shrunk win-rate statistics for ranked 3v3 matches.
//!
//! ## Architecture
//!
//! - **models**: Identifiers, teams, grouping keys and result records
//! - **storage**: Batched match sources (SQLite, JSONL)
//! - **calculate**: Dataset loading, grouping, Beta-Binomial shrinkage and ranking
//! - **export**: JSON documents and all-or-nothing publication
//! - **pipeline**: Runs aggregation kinds concurrently over one dataset
//! - **api**: Read-only REST API over the published output
//! - **config**: Configuration loading and validation

pub mod api;
pub mod calculate;
pub mod config;
pub mod export;
pub mod models;
pub mod pipeline;
pub mod storage;

pub use models::*;
