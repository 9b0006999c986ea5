//! Single-file archive framing.
//!
//! Encodes one local file as a streamable ustar archive (name, size, mode
//! bits, mtime, content) and decodes the inverse. The file content is
//! never materialized in memory: it is read and forwarded in bounded
//! chunks concurrently with whatever consumes the stream on the far side
//! of the channel. Zero-byte files are valid entries.

use std::path::{Path, PathBuf};

use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// Chunk size for streaming file content through the archive framing.
const CHUNK_SIZE: usize = 2 * 1024 * 1024;

const BLOCK: usize = 512;

#[derive(Debug, Error)]
pub enum ArchiveError {
    #[error("archive header invalid: {reason}")]
    BadHeader { reason: String },

    #[error("archive stream truncated: expected {expected} bytes, got {got}")]
    Truncated { expected: u64, got: u64 },

    #[error("archive i/o error: {0}")]
    Io(#[from] std::io::Error),
}

/// Encode `path` as a single-entry archive under its own base name.
pub async fn encode_single_file<W>(path: &Path, writer: &mut W) -> Result<u64, ArchiveError>
where
    W: AsyncWrite + Unpin,
{
    let name = path
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| ArchiveError::BadHeader {
            reason: format!("path {path:?} has no usable file name"),
        })?
        .to_owned();
    encode_single_file_as(path, &name, writer).await
}

/// Encode `path` as a single-entry archive under `entry_name`.
///
/// Writes the ustar header, the content in [`CHUNK_SIZE`] chunks, padding
/// to the 512-byte block boundary, and the two terminating zero blocks.
pub async fn encode_single_file_as<W>(
    path: &Path,
    entry_name: &str,
    writer: &mut W,
) -> Result<u64, ArchiveError>
where
    W: AsyncWrite + Unpin,
{
    let meta = tokio::fs::metadata(path).await?;
    let size = meta.len();
    let mtime = meta
        .modified()
        .ok()
        .and_then(|t| t.duration_since(std::time::UNIX_EPOCH).ok())
        .map(|d| d.as_secs())
        .unwrap_or(0);

    let mut header = tar::Header::new_ustar();
    header
        .set_path(entry_name)
        .map_err(|e| ArchiveError::BadHeader { reason: e.to_string() })?;
    header.set_size(size);
    header.set_entry_type(tar::EntryType::Regular);
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        header.set_mode(meta.permissions().mode() & 0o7777);
    }
    #[cfg(not(unix))]
    header.set_mode(0o644);
    header.set_mtime(mtime);
    header.set_cksum();

    writer.write_all(header.as_bytes()).await?;

    let mut file = tokio::fs::File::open(path).await?;
    let mut buf = vec![0u8; CHUNK_SIZE];
    let mut written: u64 = 0;
    loop {
        let n = file.read(&mut buf).await?;
        if n == 0 {
            break;
        }
        writer.write_all(&buf[..n]).await?;
        written += n as u64;
    }
    if written != size {
        return Err(ArchiveError::Truncated { expected: size, got: written });
    }

    // Pad content to the block boundary, then two terminating zero blocks.
    let padding = (BLOCK - (size as usize % BLOCK)) % BLOCK;
    writer.write_all(&vec![0u8; padding + 2 * BLOCK]).await?;
    writer.flush().await?;

    Ok(size)
}

/// Decode a single-entry archive from `reader`, writing the entry into
/// `dir` under its archived base name. Returns the written path and size.
pub async fn decode_single_file<R>(
    reader: &mut R,
    dir: &Path,
) -> Result<(PathBuf, u64), ArchiveError>
where
    R: AsyncRead + Unpin,
{
    let mut header_bytes = [0u8; BLOCK];
    reader.read_exact(&mut header_bytes).await.map_err(|_| ArchiveError::Truncated {
        expected: BLOCK as u64,
        got: 0,
    })?;
    if header_bytes.iter().all(|&b| b == 0) {
        return Err(ArchiveError::BadHeader { reason: "archive contains no entries".into() });
    }

    let header = tar::Header::from_byte_slice(&header_bytes);
    let size = header
        .entry_size()
        .map_err(|e| ArchiveError::BadHeader { reason: e.to_string() })?;
    let entry_path = header
        .path()
        .map_err(|e| ArchiveError::BadHeader { reason: e.to_string() })?;
    let name = entry_path
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| ArchiveError::BadHeader {
            reason: "entry has no usable file name".into(),
        })?
        .to_owned();

    let dest = dir.join(&name);
    let mut file = tokio::fs::File::create(&dest).await?;

    let mut remaining = size;
    let mut buf = vec![0u8; CHUNK_SIZE];
    while remaining > 0 {
        let want = remaining.min(buf.len() as u64) as usize;
        let n = reader.read(&mut buf[..want]).await?;
        if n == 0 {
            return Err(ArchiveError::Truncated { expected: size, got: size - remaining });
        }
        file.write_all(&buf[..n]).await?;
        remaining -= n as u64;
    }
    file.flush().await?;

    #[cfg(unix)]
    if let Ok(mode) = header.mode() {
        use std::os::unix::fs::PermissionsExt;
        let _ = tokio::fs::set_permissions(&dest, std::fs::Permissions::from_mode(mode)).await;
    }

    // Consume the content padding so the reader is left at the block
    // boundary for callers that inspect trailing data.
    let padding = (BLOCK - (size as usize % BLOCK)) % BLOCK;
    if padding > 0 {
        let mut pad = vec![0u8; padding];
        let _ = reader.read_exact(&mut pad).await;
    }

    Ok((dest, size))
}
