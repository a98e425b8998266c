//! Run-level error taxonomy.
//!
//! Transient fetch errors (`FetchError`) are consumed by the retry budget
//! inside the engine and never surface on their own. Everything below
//! escalates: the run is cancelled and exactly one of these is reported.

use std::path::PathBuf;
use thiserror::Error;

use crate::crypto::CryptoError;
use crate::http::FetchError;
use crate::playlist::PlaylistError;

/// Permanent per-segment failure after a successful fetch; never retried.
#[derive(Debug, Error)]
pub enum SegmentError {
    #[error("decryption failed: {0}")]
    Decrypt(#[from] CryptoError),
    #[error("segment I/O failed: {0}")]
    Io(#[from] std::io::Error),
}

/// The single failure reported for an unsuccessful run.
#[derive(Debug, Error)]
pub enum DownloadError {
    #[error("playlist error: {0}")]
    Playlist(#[from] PlaylistError),
    #[error("http client setup failed: {0}")]
    Client(#[source] FetchError),
    #[error("failed to fetch decryption key: {0}")]
    Key(#[source] FetchError),
    #[error("invalid decryption key: {0}")]
    KeyFormat(#[from] CryptoError),
    #[error("failed to prepare scratch directory {path}: {source}")]
    Workspace {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("segment {index} failed after {attempts} attempts: {source}")]
    RetriesExhausted {
        index: usize,
        attempts: u32,
        source: FetchError,
    },
    #[error("segment {index}: {source}")]
    Segment { index: usize, source: SegmentError },
    #[error("merge I/O error: {0}")]
    MergeIo(#[source] std::io::Error),
    #[error("download cancelled")]
    Cancelled,
    #[error("engine task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}
