//! Core segment-fetch orchestration engine.
//!
//! Downloads every playlist segment through a bounded worker pool, retries
//! on fetch errors and per-attempt timeouts, decrypts when the playlist
//! carries an AES-128 key, and merges artifacts strictly in index order
//! while fetches are still in flight. A run is resumable: finalized
//! `<index>.seg` files in the scratch directory are not re-fetched.

mod error;
mod fetch;
mod merge;
mod pool;

pub use error::{DownloadError, SegmentError};

use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::config::DownloadConfig;
use crate::crypto::SegmentKey;
use crate::http::{FetchError, HttpClient};
use crate::progress::ProgressStats;
use crate::segment::{Segment, SegmentStore};

/// Process-wide state for one download session. Owned by the run's tasks
/// through an `Arc`; the segment store is created once and never replaced.
pub(crate) struct RunContext {
    pub(crate) store: SegmentStore,
    pub(crate) key: Option<SegmentKey>,
    pub(crate) client: HttpClient,
    pub(crate) scratch_dir: PathBuf,
    pub(crate) output_path: PathBuf,
    pub(crate) bytes_transferred: AtomicU64,
    pub(crate) cancel: CancellationToken,
    pub(crate) retry_tx: mpsc::Sender<usize>,
    pub(crate) segment_timeout: Duration,
    pub(crate) retry_count: u32,
    pub(crate) max_concurrency: usize,
    failure: Mutex<Option<DownloadError>>,
}

impl RunContext {
    /// Finalized artifact location for a segment; its existence across runs
    /// is the resume mechanism.
    pub(crate) fn artifact_path(&self, index: usize) -> PathBuf {
        self.scratch_dir.join(format!("{}.seg", index))
    }

    /// Records the first failure and cancels the run. Later failures are
    /// side effects of the cancellation and are dropped.
    pub(crate) fn fail(&self, err: DownloadError) {
        {
            let mut slot = self.failure.lock().unwrap();
            if slot.is_none() {
                *slot = Some(err);
            }
        }
        self.cancel.cancel();
    }

    pub(crate) fn take_failure(&self) -> Option<DownloadError> {
        self.failure.lock().unwrap().take()
    }

    /// Shared retry path for fetch errors and attempt timeouts: consume one
    /// retry and re-enqueue, or fail the run on an exhausted budget.
    pub(crate) fn retry_or_fail(&self, segment: &Arc<Segment>, cause: FetchError) {
        let attempt = segment.bump_retry();
        if attempt <= self.retry_count {
            if self.cancel.is_cancelled() {
                return;
            }
            tracing::debug!(
                index = segment.index(),
                attempt,
                error = %cause,
                "segment attempt failed, re-enqueueing"
            );
            segment.reset_pending();
            if let Err(err) = self.retry_tx.try_send(segment.index()) {
                // Never block or abort the pool on a saturated retry queue.
                tracing::warn!(
                    index = segment.index(),
                    "could not re-enqueue segment for retry: {}",
                    err
                );
            }
        } else {
            tracing::error!(
                index = segment.index(),
                attempts = attempt,
                error = %cause,
                "segment retry budget exhausted"
            );
            // Record the failure before the completion signal fires so the
            // merge stage always observes the real cause.
            self.fail(DownloadError::RetriesExhausted {
                index: segment.index(),
                attempts: attempt,
                source: cause,
            });
            segment.mark_failed();
        }
    }
}

/// Entry point for one download run.
pub struct Downloader {
    cfg: DownloadConfig,
    client: HttpClient,
}

impl Downloader {
    pub fn new(cfg: DownloadConfig) -> Result<Self, DownloadError> {
        let client = HttpClient::new(&cfg).map_err(DownloadError::Client)?;
        Ok(Self { cfg, client })
    }

    /// Loads the playlist, fetches the key once, and spawns the pipeline.
    /// Returns as soon as the pool and merge stage are running.
    pub async fn start(self) -> Result<RunHandle, DownloadError> {
        let playlist = self.cfg.playlist_source()?.load(&self.client).await?;
        let store = SegmentStore::initialize(playlist.segment_uris);
        let total = store.len() as u64;
        tracing::info!(segments = total, "playlist loaded");

        // The key is fetched once, before any segment work; every worker
        // reads it without locking afterwards.
        let key = match playlist.key {
            Some(desc) => {
                let bytes = self
                    .client
                    .fetch(&desc.key_uri)
                    .await
                    .map_err(DownloadError::Key)?;
                Some(SegmentKey::new(&bytes, desc.iv.as_ref().map(|iv| iv.as_slice()))?)
            }
            None => None,
        };

        let scratch_dir = self.cfg.scratch_dir();
        tokio::fs::create_dir_all(&scratch_dir)
            .await
            .map_err(|source| DownloadError::Workspace {
                path: scratch_dir.clone(),
                source,
            })?;

        // Buffered past pool capacity so retry producers are never held up.
        let (retry_tx, retry_rx) = mpsc::channel(self.cfg.max_concurrency.max(1) * 2);

        let ctx = Arc::new(RunContext {
            store,
            key,
            client: self.client,
            scratch_dir,
            output_path: self.cfg.output_path(),
            bytes_transferred: AtomicU64::new(0),
            cancel: CancellationToken::new(),
            retry_tx,
            segment_timeout: self.cfg.segment_timeout,
            retry_count: self.cfg.retry_count,
            max_concurrency: self.cfg.max_concurrency.max(1),
            failure: Mutex::new(None),
        });

        pool::spawn(Arc::clone(&ctx), retry_rx);

        let finished = CancellationToken::new();
        let driver = tokio::spawn({
            let ctx = Arc::clone(&ctx);
            let finished = finished.clone();
            async move {
                let result = merge::run(&ctx).await;
                // Stop dispatch and in-flight workers either way.
                ctx.cancel.cancel();
                match &result {
                    Ok(()) => tracing::info!("download complete"),
                    Err(err) => tracing::error!("download failed: {}", err),
                }
                finished.cancel();
                result
            }
        });

        Ok(RunHandle {
            total,
            ctx,
            finished,
            driver,
        })
    }
}

/// Handle on a running download. Progress is pull-based: poll `stats()` on
/// your own timer; `done()` fires on success or unrecoverable failure.
pub struct RunHandle {
    total: u64,
    ctx: Arc<RunContext>,
    finished: CancellationToken,
    driver: tokio::task::JoinHandle<Result<(), DownloadError>>,
}

impl RunHandle {
    /// `(completed, total)` segment counts.
    pub fn progress(&self) -> (u64, u64) {
        (self.ctx.store.finalized_count() as u64, self.total)
    }

    /// Bytes received over the network so far.
    pub fn bytes_transferred(&self) -> u64 {
        self.ctx.bytes_transferred.load(Ordering::Relaxed)
    }

    pub fn stats(&self) -> ProgressStats {
        ProgressStats {
            completed_segments: self.ctx.store.finalized_count() as u64,
            total_segments: self.total,
            bytes_transferred: self.ctx.bytes_transferred.load(Ordering::Relaxed),
        }
    }

    /// Requests cancellation: no new downloads start, in-flight work is
    /// abandoned, the merge stage exits without producing an output file.
    pub fn cancel(&self) {
        self.ctx.cancel.cancel();
    }

    /// Token that fires when the run finishes, successfully or not.
    pub fn done(&self) -> CancellationToken {
        self.finished.clone()
    }

    /// Waits for the run to finish and returns its outcome.
    pub async fn wait(self) -> Result<(), DownloadError> {
        match self.driver.await {
            Ok(result) => result,
            Err(err) => Err(DownloadError::Task(err)),
        }
    }
}
