//! Collective communication seam for distributed bin construction.

/// Byte-addressed allgather over a fixed set of machines.
///
/// Rank `r` contributes the bytes at `[starts[r], starts[r] + lens[r])` of
/// `input`; after the call `output` holds every rank's contribution at its
/// own offset. The call is collective and blocking: all ranks must reach
/// it in the same iteration with identical `starts` and `lens`.
pub trait Network: Send + Sync {
    /// Gather every rank's byte range into `output`.
    ///
    /// `input` and `output` are both sized to the full gathered length
    /// (`starts.last() + lens.last()`).
    fn allgather(&self, input: &[u8], starts: &[usize], lens: &[usize], output: &mut [u8]);
}
