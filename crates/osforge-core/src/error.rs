//! Shared validation error hierarchy.
//!
//! Validation errors are rejected synchronously, never retried, and always
//! carry enough detail to fix the offending input by hand.

use thiserror::Error;

/// An input was rejected before any remote operation was attempted.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
    /// A required field was blank or missing.
    #[error("required field `{0}` must not be blank")]
    BlankField(&'static str),

    /// A destination or source path is empty or refers to the filesystem root.
    #[error("path {0:?} is empty or refers to the filesystem root")]
    EmptyPath(String),

    /// A path contains a `..` segment.
    #[error("path {0:?} contains a `..` segment")]
    ParentTraversal(String),

    /// An absolute path outside the allow-list.
    #[error("absolute path {0:?} is not on the allow-list")]
    AbsolutePath(String),

    /// A `KEY=VALUE` definition could not be parsed.
    #[error("malformed definition {0:?}: expected KEY=VALUE with a non-empty key")]
    MalformedDefine(String),

    /// A build name is not usable as a cluster resource name.
    #[error("invalid build name {0:?}: {1}")]
    InvalidName(String, &'static str),
}
