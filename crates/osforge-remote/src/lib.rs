//! # osforge-remote — Cluster Access for the osforge Stack
//!
//! Everything that talks to the cluster lives here. There is no shared
//! filesystem and no object store: the only way to move bytes in or out
//! of a build unit is to open a streaming command channel into it.
//!
//! - [`channel`] — the [`channel::RemoteChannel`] trait and the
//!   [`channel::RemoteProcess`] streaming handle; non-zero remote exits
//!   surface captured stderr, dropped handles kill the remote command.
//! - [`kubectl`] — production channel and resource client backed by
//!   `kubectl` subprocesses.
//! - [`local`] — a channel that runs commands in per-unit sandbox
//!   directories on the local host; used by tests and development mode.
//! - [`archive`] — single-entry ustar framing, streamed in bounded
//!   chunks, never materializing the file in memory.
//! - [`transfer`] — push/pull of files over a channel, with the
//!   verify-then-rename discipline on the pull side.
//! - [`cluster`] — the [`cluster::ClusterClient`] trait over build
//!   resources and units, with kubectl and in-memory implementations.
//! - [`credentials`] — ordered credential-provider chain for locating
//!   cluster access configuration.

pub mod archive;
pub mod channel;
pub mod cluster;
pub mod credentials;
pub mod kubectl;
pub mod local;
mod spawn;
pub mod transfer;

pub use channel::{ExecOutput, RemoteChannel, RemoteError, RemoteProcess};
pub use cluster::{ClusterClient, ClusterError, LogStep, MemoryCluster, StatusPatch, UnitInfo};
pub use credentials::{ClusterAccess, CredentialError};
pub use kubectl::{KubectlChannel, KubectlCluster, KubectlConfig};
pub use local::LocalChannel;
pub use transfer::{FileTransfer, TransferError};
