//! Segment store: the ordered list of segment descriptors and their
//! per-segment state.
//!
//! Each segment's `(state, retry_count, artifact_path)` triple is guarded by
//! its own mutex; the one-shot `done` token is the completion signal the
//! merge stage suspends on. The token fires at most once, and only after the
//! artifact is durably on disk (success) or the retry budget is exhausted
//! (failure). The store itself is immutable after initialization: segments
//! are never removed or reordered.

use std::path::PathBuf;
use std::sync::Mutex;
use tokio_util::sync::CancellationToken;

/// Lifecycle of one segment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SegmentState {
    Pending,
    Downloading,
    Succeeded,
    Merged,
    Failed,
}

#[derive(Debug)]
struct SegmentInner {
    state: SegmentState,
    retry_count: u32,
    artifact_path: Option<PathBuf>,
}

/// One unit of the playlist: immutable index and URI, locked mutable state.
#[derive(Debug)]
pub struct Segment {
    index: usize,
    uri: String,
    inner: Mutex<SegmentInner>,
    done: CancellationToken,
}

impl Segment {
    fn new(index: usize, uri: String) -> Self {
        Self {
            index,
            uri,
            inner: Mutex::new(SegmentInner {
                state: SegmentState::Pending,
                retry_count: 0,
                artifact_path: None,
            }),
            done: CancellationToken::new(),
        }
    }

    /// Position in the final output; defines merge order.
    pub fn index(&self) -> usize {
        self.index
    }

    pub fn uri(&self) -> &str {
        &self.uri
    }

    pub fn state(&self) -> SegmentState {
        self.inner.lock().unwrap().state
    }

    pub fn retry_count(&self) -> u32 {
        self.inner.lock().unwrap().retry_count
    }

    pub fn artifact_path(&self) -> Option<PathBuf> {
        self.inner.lock().unwrap().artifact_path.clone()
    }

    /// Completion signal; fires once the segment succeeds or permanently fails.
    pub fn done(&self) -> CancellationToken {
        self.done.clone()
    }

    /// Whether the segment already holds a finalized artifact.
    pub fn is_finalized(&self) -> bool {
        matches!(
            self.state(),
            SegmentState::Succeeded | SegmentState::Merged
        )
    }

    /// Pending -> Downloading. Returns false when the segment is already
    /// finalized or failed (duplicate dispatch from the retry path).
    pub fn begin_download(&self) -> bool {
        let mut inner = self.inner.lock().unwrap();
        match inner.state {
            SegmentState::Pending => {
                inner.state = SegmentState::Downloading;
                true
            }
            SegmentState::Downloading => true,
            _ => false,
        }
    }

    /// Downloading -> Pending, ahead of a retry re-enqueue.
    pub fn reset_pending(&self) {
        let mut inner = self.inner.lock().unwrap();
        if inner.state == SegmentState::Downloading {
            inner.state = SegmentState::Pending;
        }
    }

    /// Consumes one retry from the budget; returns the new count.
    pub fn bump_retry(&self) -> u32 {
        let mut inner = self.inner.lock().unwrap();
        inner.retry_count += 1;
        inner.retry_count
    }

    /// Records the finalized artifact and fires the completion signal.
    /// Returns false when a concurrent duplicate attempt already finalized
    /// the segment; the caller must then discard its own artifact.
    pub fn finalize_success(&self, artifact: PathBuf) -> bool {
        let mut inner = self.inner.lock().unwrap();
        if matches!(
            inner.state,
            SegmentState::Succeeded | SegmentState::Merged
        ) {
            return false;
        }
        inner.state = SegmentState::Succeeded;
        inner.artifact_path = Some(artifact);
        drop(inner);
        self.done.cancel();
        true
    }

    /// Runs `commit` and records the artifact while holding the segment's
    /// lock, then fires the completion signal. Returns `Ok(false)` without
    /// running `commit` when the segment is already finalized, so a losing
    /// duplicate attempt can never re-create an artifact the merge stage
    /// already consumed. A `commit` error leaves the segment untouched.
    pub fn finalize_with<E>(
        &self,
        artifact: PathBuf,
        commit: impl FnOnce() -> Result<(), E>,
    ) -> Result<bool, E> {
        let mut inner = self.inner.lock().unwrap();
        if matches!(
            inner.state,
            SegmentState::Succeeded | SegmentState::Merged
        ) {
            return Ok(false);
        }
        commit()?;
        inner.state = SegmentState::Succeeded;
        inner.artifact_path = Some(artifact);
        drop(inner);
        self.done.cancel();
        Ok(true)
    }

    /// Marks the segment permanently failed and fires the completion signal.
    pub fn mark_failed(&self) {
        let mut inner = self.inner.lock().unwrap();
        if matches!(
            inner.state,
            SegmentState::Succeeded | SegmentState::Merged
        ) {
            return;
        }
        inner.state = SegmentState::Failed;
        drop(inner);
        self.done.cancel();
    }

    /// Succeeded -> Merged, after the merge stage consumed the artifact.
    pub fn mark_merged(&self) {
        let mut inner = self.inner.lock().unwrap();
        if inner.state == SegmentState::Succeeded {
            inner.state = SegmentState::Merged;
        }
    }
}

/// Ordered, append-only collection of segments for one run.
#[derive(Debug)]
pub struct SegmentStore {
    segments: Vec<std::sync::Arc<Segment>>,
}

impl SegmentStore {
    /// Builds one segment per URI, preserving playlist order as the index.
    pub fn initialize(uris: Vec<String>) -> Self {
        let segments = uris
            .into_iter()
            .enumerate()
            .map(|(index, uri)| std::sync::Arc::new(Segment::new(index, uri)))
            .collect();
        Self { segments }
    }

    pub fn len(&self) -> usize {
        self.segments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&std::sync::Arc<Segment>> {
        self.segments.get(index)
    }

    pub fn iter(&self) -> impl Iterator<Item = &std::sync::Arc<Segment>> {
        self.segments.iter()
    }

    /// Segments holding a finalized artifact. Safe to read while the run is
    /// in flight; a segment's state is set before its completion signal fires.
    pub fn finalized_count(&self) -> usize {
        self.segments.iter().filter(|s| s.is_finalized()).count()
    }
}
