//! Pull-based progress reporting.
//!
//! The engine never pushes progress events; an external poller (the CLI)
//! reads snapshots on its own timer. Values are monotonically non-decreasing
//! within a run.

/// Snapshot of download progress for one run.
#[derive(Debug, Clone, Copy)]
pub struct ProgressStats {
    /// Segments finalized so far (fetched or resumed from disk).
    pub completed_segments: u64,
    /// Total number of segments in the playlist.
    pub total_segments: u64,
    /// Bytes received over the network this run. Resumed segments add
    /// nothing here, so this can lag `completed_segments`.
    pub bytes_transferred: u64,
}

impl ProgressStats {
    /// Fraction of segments completed, in [0.0, 1.0].
    pub fn fraction(&self) -> f64 {
        if self.total_segments == 0 {
            return 1.0;
        }
        (self.completed_segments as f64 / self.total_segments as f64).min(1.0)
    }

    pub fn is_complete(&self) -> bool {
        self.completed_segments >= self.total_segments
    }
}
