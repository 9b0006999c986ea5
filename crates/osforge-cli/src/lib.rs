//! # osforge-cli — Command-Line Interface
//!
//! Subcommand handlers for the `osforge` binary. Each handler takes the
//! immutable [`config::CliConfig`] and its parsed arguments, talks to
//! the gateway through osforge-client, and reports errors up for a
//! single exit-code-1 path in `main`.

pub mod build;
pub mod config;
pub mod download;
pub mod list;
