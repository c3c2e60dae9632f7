use crate::tensor::{Result, TensorElem};

/// Abstraction for a distributed communication backend.
///
/// This trait allows swapping between different communication implementations:
/// - **NCCL/MPI**: Optimized for GPU clusters (provided by downstream crates).
/// - **CPU/Ring**: [`CpuBackend`](super::cpu_backend::CpuBackend), channels between threads.
///
/// Collectives operate on flat element buffers so that gradient buckets (many parameters packed
/// end to end) can be reduced in one call. Every rank of a group must issue the same sequence of
/// collectives with buffers of the same length.
pub trait CollectiveBackend<T: TensorElem>: Send + Sync {
    /// Returns the rank of the current process/thread.
    fn rank(&self) -> usize;

    /// Returns the total number of processes/threads.
    fn world_size(&self) -> usize;

    /// Replaces `data` on every rank with the element-wise sum over all ranks.
    fn all_reduce_sum(&self, data: &mut [T]) -> Result<()>;

    /// Overwrites `data` on every rank with the contents held by `root`.
    fn broadcast(&self, data: &mut [T], root: usize) -> Result<()>;
}
