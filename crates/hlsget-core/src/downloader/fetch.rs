//! Fetch-and-decode of a single segment.
//!
//! One `process` call is one attempt: resume fast path, streaming fetch
//! into a uniquely-named temp file, then a locked commit (decrypt or atomic
//! rename). A sibling watcher races the configured timeout against the
//! attempt; timeout and fetch-error retries share one budget and one queue.
//! An attempt-scoped `settled` flag guarantees the watcher and the fetch
//! path consume at most one retry between them.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use super::error::{DownloadError, SegmentError};
use super::RunContext;
use crate::http::FetchError;
use crate::segment::Segment;

/// Runs one download attempt for `segment`. `Ok(())` covers success,
/// idempotent skips, discarded late results, and consumed retries; `Err`
/// is fatal for the whole run.
pub(crate) async fn process(
    ctx: &Arc<RunContext>,
    segment: &Arc<Segment>,
) -> Result<(), DownloadError> {
    // Duplicate dispatch from the retry path racing the original task.
    if segment.is_finalized() {
        return Ok(());
    }

    let index = segment.index();
    let final_path = ctx.artifact_path(index);

    // Resume fast path: a finalized artifact from a prior interrupted run
    // means this segment never touches the network.
    if tokio::fs::try_exists(&final_path).await.unwrap_or(false) {
        if segment.finalize_success(final_path) {
            tracing::debug!(index, "segment already on disk, skipping fetch");
        }
        return Ok(());
    }

    if ctx.cancel.is_cancelled() {
        return Ok(());
    }
    if !segment.begin_download() {
        return Ok(());
    }

    let tmp = tempfile::Builder::new()
        .prefix(&format!("{}_", index))
        .suffix(".part")
        .tempfile_in(&ctx.scratch_dir)
        .map_err(|e| segment_io(index, e))?;
    let mut file = tokio::fs::File::from_std(tmp.reopen().map_err(|e| segment_io(index, e))?);

    let settled = Arc::new(AtomicBool::new(false));
    let attempt_done = CancellationToken::new();
    let watcher = tokio::spawn(watch_timeout(
        Arc::clone(ctx),
        Arc::clone(segment),
        Arc::clone(&settled),
        attempt_done.clone(),
    ));

    let fetch_result = ctx
        .client
        .fetch_to_file(segment.uri(), &mut file, |n| {
            ctx.bytes_transferred.fetch_add(n as u64, Ordering::Relaxed);
        })
        .await;
    attempt_done.cancel();
    let _ = watcher.await;
    drop(file);

    if let Err(err) = fetch_result {
        if settled.swap(true, Ordering::SeqCst) {
            // The watcher already charged this attempt to the budget.
            return Ok(());
        }
        if segment.is_finalized() {
            return Ok(());
        }
        ctx.retry_or_fail(segment, err);
        return Ok(());
    }
    settled.store(true, Ordering::SeqCst);

    // A late success must not be committed once the run is cancelled.
    if ctx.cancel.is_cancelled() || segment.is_finalized() {
        return Ok(());
    }

    if let Some(key) = &ctx.key {
        let ciphertext = tokio::fs::read(tmp.path())
            .await
            .map_err(|e| segment_io(index, e))?;
        let plaintext = key.decrypt(&ciphertext).map_err(|e| DownloadError::Segment {
            index,
            source: SegmentError::Decrypt(e),
        })?;
        tokio::fs::write(tmp.path(), &plaintext)
            .await
            .map_err(|e| segment_io(index, e))?;
    }
    // The rename commit happens under the segment's lock: the merge stage
    // never sees a partial artifact, and a losing duplicate attempt never
    // persists at all.
    let artifact = final_path.clone();
    let committed = segment.finalize_with(artifact, || {
        tmp.persist(&final_path)
            .map(|_| ())
            .map_err(|e| segment_io(index, e.error))
    })?;
    if committed {
        tracing::debug!(index, "segment finalized");
    }
    Ok(())
}

/// Races the per-attempt timeout against the attempt, the segment's
/// completion signal, and run cancellation. On timeout it re-enqueues the
/// segment through the shared retry path.
async fn watch_timeout(
    ctx: Arc<RunContext>,
    segment: Arc<Segment>,
    settled: Arc<AtomicBool>,
    attempt_done: CancellationToken,
) {
    let done = segment.done();
    tokio::select! {
        _ = attempt_done.cancelled() => {}
        _ = done.cancelled() => {}
        _ = ctx.cancel.cancelled() => {}
        _ = tokio::time::sleep(ctx.segment_timeout) => {
            if settled.swap(true, Ordering::SeqCst) || segment.is_finalized() {
                return;
            }
            tracing::debug!(index = segment.index(), "segment attempt timed out");
            ctx.retry_or_fail(&segment, FetchError::Timeout(ctx.segment_timeout));
        }
    }
}

fn segment_io(index: usize, source: std::io::Error) -> DownloadError {
    DownloadError::Segment {
        index,
        source: SegmentError::Io(source),
    }
}
