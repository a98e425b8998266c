//! Order-preserving merge stage.
//!
//! Runs concurrently with the pool and consumes segments strictly by index,
//! suspending on each segment's completion signal. Fetches may finish in
//! any order; output bytes never do. On failure no output file is left
//! behind, but the scratch directory survives as the resume anchor.

use std::io;
use std::sync::Arc;
use std::time::Duration;

use super::error::DownloadError;
use super::RunContext;
use crate::segment::SegmentState;

const SCRATCH_REMOVE_ATTEMPTS: u32 = 5;

pub(crate) async fn run(ctx: &Arc<RunContext>) -> Result<(), DownloadError> {
    let result = merge_segments(ctx).await;
    if result.is_err() {
        // Either a complete output file or none at all.
        let _ = tokio::fs::remove_file(&ctx.output_path).await;
    }
    result
}

async fn merge_segments(ctx: &Arc<RunContext>) -> Result<(), DownloadError> {
    let mut out = tokio::fs::File::create(&ctx.output_path)
        .await
        .map_err(DownloadError::MergeIo)?;

    for (index, segment) in ctx.store.iter().enumerate() {
        let done = segment.done();
        tokio::select! {
            _ = ctx.cancel.cancelled() => {
                return Err(ctx.take_failure().unwrap_or(DownloadError::Cancelled));
            }
            _ = done.cancelled() => {}
        }
        // The signal also fires for permanent failure.
        if segment.state() != SegmentState::Succeeded {
            return Err(ctx.take_failure().unwrap_or(DownloadError::Cancelled));
        }

        let artifact = segment.artifact_path().ok_or_else(|| {
            DownloadError::MergeIo(io::Error::new(
                io::ErrorKind::NotFound,
                format!("segment {} has no artifact", index),
            ))
        })?;
        let mut reader = tokio::fs::File::open(&artifact)
            .await
            .map_err(DownloadError::MergeIo)?;
        tokio::io::copy(&mut reader, &mut out)
            .await
            .map_err(DownloadError::MergeIo)?;
        let _ = tokio::fs::remove_file(&artifact).await;
        segment.mark_merged();
        tracing::trace!(index, "segment merged");
    }

    out.sync_all().await.map_err(DownloadError::MergeIo)?;
    remove_scratch_dir(ctx).await;
    Ok(())
}

/// Deletes the scratch directory, retrying a few times since delayed
/// unlinks of just-removed artifacts can race the directory removal.
async fn remove_scratch_dir(ctx: &Arc<RunContext>) {
    for attempt in 1..=SCRATCH_REMOVE_ATTEMPTS {
        match tokio::fs::remove_dir_all(&ctx.scratch_dir).await {
            Ok(()) => return,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return,
            Err(err) => {
                if attempt == SCRATCH_REMOVE_ATTEMPTS {
                    tracing::warn!(
                        path = %ctx.scratch_dir.display(),
                        "could not remove scratch directory: {}",
                        err
                    );
                    return;
                }
                tokio::time::sleep(Duration::from_millis(50)).await;
            }
        }
    }
}
