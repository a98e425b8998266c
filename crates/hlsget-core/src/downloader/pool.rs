//! Bounded worker pool and retry queue.
//!
//! Two producers feed the pool: the initial in-order dispatch of every
//! segment, and the retry queue filled by fetch errors and attempt
//! timeouts. A semaphore caps how many segments are in `Downloading` at
//! once; a permit is acquired before each worker is spawned and held for
//! the whole attempt. Both producers stop at cancellation, so submission
//! after cancellation is a no-op.

use std::sync::Arc;
use tokio::sync::{mpsc, Semaphore};

use super::{fetch, RunContext};
use crate::segment::Segment;

pub(crate) fn spawn(ctx: Arc<RunContext>, mut retry_rx: mpsc::Receiver<usize>) {
    let semaphore = Arc::new(Semaphore::new(ctx.max_concurrency));

    // Initial dispatch: one task per segment, in playlist order.
    let dispatch_ctx = Arc::clone(&ctx);
    let dispatch_sem = Arc::clone(&semaphore);
    tokio::spawn(async move {
        for segment in dispatch_ctx.store.iter() {
            if dispatch_ctx.cancel.is_cancelled() {
                break;
            }
            let permit = tokio::select! {
                _ = dispatch_ctx.cancel.cancelled() => break,
                permit = dispatch_sem.clone().acquire_owned() => match permit {
                    Ok(permit) => permit,
                    Err(_) => break,
                },
            };
            run_segment(&dispatch_ctx, segment, permit);
        }
    });

    // Retry consumer: drains the shared retry queue into the same pool.
    tokio::spawn(async move {
        loop {
            let index = tokio::select! {
                _ = ctx.cancel.cancelled() => break,
                index = retry_rx.recv() => match index {
                    Some(index) => index,
                    None => break,
                },
            };
            let Some(segment) = ctx.store.get(index) else {
                continue;
            };
            let permit = tokio::select! {
                _ = ctx.cancel.cancelled() => break,
                permit = semaphore.clone().acquire_owned() => match permit {
                    Ok(permit) => permit,
                    Err(_) => break,
                },
            };
            run_segment(&ctx, segment, permit);
        }
    });
}

fn run_segment(
    ctx: &Arc<RunContext>,
    segment: &Arc<Segment>,
    permit: tokio::sync::OwnedSemaphorePermit,
) {
    let ctx = Arc::clone(ctx);
    let segment = Arc::clone(segment);
    tokio::spawn(async move {
        let result = fetch::process(&ctx, &segment).await;
        drop(permit);
        if let Err(err) = result {
            // A segment that cannot be completed aborts the whole run; the
            // sequential merge cannot skip a gap.
            ctx.fail(err);
        }
    });
}
