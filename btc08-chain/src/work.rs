//! Collaborator contracts for upstream work (spec §1 "out of scope: the
//! outer miner framework"; spec §9 "non-owning back-references — the chain
//! holds a weak reference back, used only for notification callbacks").
//!
//! The chain never owns the framework; it is handed a [`WorkQueue`] and an
//! [`Upstream`] implementation on every call into [`crate::Chain`], the same
//! way the teacher's `Chain` is handed its `port`/`delay` per construction
//! rather than reaching for a process-wide singleton.

/// One upstream mining job: a 128-byte block-header prefix (only the
/// merkle-root tail, timestamp and nbits of which the chip needs) and the
/// four precomputed ASIC-boost midstates (spec §4.4 `set_work` contract).
pub trait Work: Clone {
    /// `midstate0..3`: the SHA-256 intermediate state after the first 64
    /// bytes of each of the four version-rolled header variants.
    fn midstates(&self) -> &[[u8; 32]; 4];
    /// `data[64..76]` of the 128-byte header: merkle_root tail + timestamp +
    /// nbits, shared by all four midstates.
    fn header_tail(&self) -> &[u8; 12];
    /// 32-byte big-endian target derived from the pool's share difficulty.
    fn target(&self) -> &[u8; 32];
    /// Share difficulty; compared against the chain's remembered `sdiff` to
    /// decide whether `WRITE_TARGET` needs resending (spec §3 invariant).
    fn sdiff(&self) -> f64;
    /// Whether the pool negotiated version-rolling (ASIC-boost) for this job.
    fn version_rolling(&self) -> bool;
}

/// The upstream work-queue producer the Job Pipeline dequeues from
/// (spec §4.4 step 1, §7 error 5 "Underflow").
pub trait WorkQueue<W: Work> {
    /// Pop the next queued work item, or `None` on underflow.
    fn dequeue(&mut self) -> Option<W>;
}

/// Framework notification callbacks (spec §9: the chain's only handle back
/// to the framework, held weakly and used solely for these two calls).
pub trait Upstream<W: Work> {
    /// A job slot's work item retired — normal eviction, flush, or teardown —
    /// and the framework reclaims it.
    fn work_completed(&mut self, work: W);
    /// A candidate nonce for `work`, tagged with its ASIC-boost micro-job id.
    /// Returns `true` if the upstream validator accepted it as a real share.
    fn submit_nonce(&mut self, work: &W, nonce: u32, micro_job_id: u8) -> bool;
}
