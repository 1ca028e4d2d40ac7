//! Pipeline orchestration and domain logic for rulefeed.
//!
//! This crate ties together fetching, filter-list merging, the external
//! rule-set converter, rule document merging, workspace upkeep and
//! publishing into the end-to-end `run` workflow.

pub mod converter;
pub mod filter;
pub mod merge;
pub mod pipeline;
pub mod publisher;
pub mod workspace;
