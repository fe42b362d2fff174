//! Storage infrastructure: configuration file persistence.
//!
//! The `config` sub-module reads the consumer's TOML configuration, writes it
//! back, and falls back to defaults when no file exists yet (first run).

pub mod config;
