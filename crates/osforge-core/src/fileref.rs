//! Input-file references and path-safety validation.
//!
//! Every file a build consumes is declared as a [`FileReference`]:
//! a destination path inside the build unit's shared storage plus a
//! source. References are validated *before* any remote call is made —
//! a reference that fails validation never opens a channel.

use std::path::{Component, Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::ValidationError;

/// Absolute destination prefixes that are permitted. Currently empty:
/// every absolute path is rejected. Broadening this is a deliberate,
/// reviewed change.
pub const ALLOWED_ABSOLUTE_PREFIXES: &[&str] = &[];

/// Where the bytes of a declared input file come from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FileSource {
    /// A file on the caller's local filesystem.
    Local(PathBuf),
    /// Literal content carried inline in the request.
    Inline(String),
    /// A remote URL fetched by the build unit itself.
    Url(String),
}

/// A logical destination inside the build's shared storage plus a source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileReference {
    /// Destination path relative to the shared storage root.
    pub dest: String,
    pub source: FileSource,
}

impl FileReference {
    pub fn local(dest: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        Self { dest: dest.into(), source: FileSource::Local(path.into()) }
    }

    pub fn inline(dest: impl Into<String>, content: impl Into<String>) -> Self {
        Self { dest: dest.into(), source: FileSource::Inline(content.into()) }
    }

    /// Validate the destination and, for local sources, the source path.
    ///
    /// Rejects empty or root destinations, any `..` segment, and absolute
    /// paths not covered by [`ALLOWED_ABSOLUTE_PREFIXES`].
    pub fn validate(&self) -> Result<(), ValidationError> {
        validate_dest_path(&self.dest)?;
        if let FileSource::Local(src) = &self.source {
            validate_source_path(src)?;
        }
        Ok(())
    }
}

/// Validate a destination path against the traversal/absolute-path rules.
pub fn validate_dest_path(dest: &str) -> Result<(), ValidationError> {
    if dest.is_empty() || dest == "/" {
        return Err(ValidationError::EmptyPath(dest.into()));
    }
    let path = Path::new(dest);
    if has_parent_segment(path) {
        return Err(ValidationError::ParentTraversal(dest.into()));
    }
    if path.is_absolute() && !absolute_allowed(dest) {
        return Err(ValidationError::AbsolutePath(dest.into()));
    }
    Ok(())
}

/// Validate a local source path. Sources may be absolute (they live on
/// the caller's own filesystem) but must not contain `..` segments.
pub fn validate_source_path(src: &Path) -> Result<(), ValidationError> {
    let display = src.display().to_string();
    if display.is_empty() {
        return Err(ValidationError::EmptyPath(display));
    }
    if has_parent_segment(src) {
        return Err(ValidationError::ParentTraversal(display));
    }
    Ok(())
}

fn has_parent_segment(path: &Path) -> bool {
    path.components().any(|c| matches!(c, Component::ParentDir))
}

fn absolute_allowed(dest: &str) -> bool {
    ALLOWED_ABSOLUTE_PREFIXES
        .iter()
        .any(|prefix| dest.starts_with(prefix))
}
