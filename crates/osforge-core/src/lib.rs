//! # osforge-core — Foundational Types for the osforge Stack
//!
//! Domain model shared by every other osforge crate:
//!
//! - [`build`] — the declarative [`build::BuildResource`] with its spec,
//!   status, and finite [`build::BuildPhase`] lifecycle.
//! - [`fileref`] — [`fileref::FileReference`] input-file declarations and
//!   the path-safety rules enforced before any byte crosses the wire.
//! - [`artifact`] — [`artifact::ArtifactDescriptor`] naming and
//!   [`artifact::Compression`] scheme selection.
//! - [`define`] — `KEY=VALUE` tool-argument parsing for the
//!   `--define` CLI flag and the build request body.
//!
//! ## Crate Policy
//!
//! This crate sits at the bottom of the dependency DAG: pure types,
//! serde round-trips, no I/O, no async. The cluster never sees a value
//! that did not pass validation here first.

pub mod artifact;
pub mod build;
pub mod define;
pub mod error;
pub mod fileref;

pub use artifact::{ArtifactDescriptor, Compression};
pub use build::{BuildPhase, BuildResource, BuildSpec, BuildStatus, RequestSnapshot};
pub use define::DefineArg;
pub use error::ValidationError;
pub use fileref::{FileReference, FileSource};
