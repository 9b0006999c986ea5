//! Artifact naming and compression scheme selection.

use serde::{Deserialize, Serialize};

/// Compression scheme for artifact downloads. Gzip unless the request
/// asked for lz4.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Compression {
    #[default]
    Gzip,
    Lz4,
}

impl Compression {
    /// File-name extension appended to compressed output.
    pub fn extension(self) -> &'static str {
        match self {
            Self::Gzip => "gz",
            Self::Lz4 => "lz4",
        }
    }

    /// MIME type of the compressed stream.
    pub fn content_type(self) -> &'static str {
        match self {
            Self::Gzip => "application/gzip",
            Self::Lz4 => "application/x-lz4",
        }
    }

    /// Shell command that compresses stdin to stdout inside the unit.
    pub fn command(self) -> &'static str {
        match self {
            Self::Gzip => "gzip",
            Self::Lz4 => "lz4",
        }
    }
}

impl std::fmt::Display for Compression {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Gzip => f.write_str("gzip"),
            Self::Lz4 => f.write_str("lz4"),
        }
    }
}

/// Description of a finished artifact as served to a caller.
///
/// `is_dir` is always determined by live inspection of the unit's
/// filesystem, never stored on the resource.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactDescriptor {
    pub file_name: String,
    pub is_dir: bool,
    pub compression: Compression,
}

impl ArtifactDescriptor {
    /// Derive the artifact file name from the build parameters when the
    /// controller did not report an explicit one. The extension follows
    /// the export format; "image" exports are raw disk images.
    pub fn derive_file_name(distro: &str, target: &str, export_format: &str) -> String {
        let extension = match export_format {
            "image" => "img",
            other => other,
        };
        format!("{distro}-{target}-{export_format}.{extension}")
    }

    /// Name the download is served under: a directory artifact becomes a
    /// tar container before compression.
    pub fn download_name(&self) -> String {
        if self.is_dir {
            format!("{}.tar.{}", self.file_name, self.compression.extension())
        } else {
            format!("{}.{}", self.file_name, self.compression.extension())
        }
    }
}
