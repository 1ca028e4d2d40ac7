//! Shared types, error model, and configuration for rulefeed.
//!
//! This crate is the foundation depended on by all other rulefeed crates.
//! It provides:
//! - [`RulefeedError`] — the unified error type
//! - Rule document types ([`RuleDocument`], [`RuleEntry`], [`RuleValue`], [`Scalar`])
//! - Configuration ([`AppConfig`], [`RuleSource`], [`Category`], config loading)

pub mod config;
pub mod error;
pub mod types;

// Re-export public API at crate root for ergonomic imports.
pub use config::{
    AppConfig, ConverterConfig, HttpConfig, PublishConfig, RuleSource, config_dir,
    config_file_path, init_config, load_config, load_config_from, validate_config,
};
pub use error::{Result, RulefeedError};
pub use types::{
    ADBLOCK_ARTIFACT, Category, DEFAULT_RULE_SET_VERSION, RuleDocument, RuleEntry, RuleValue, Scalar,
    retained_artifacts,
};
