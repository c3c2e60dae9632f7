use super::backend::CollectiveBackend;
use crate::tensor::{Result, TensorElem, TensorError};
use crossbeam::channel::{unbounded, Receiver, Sender};

/// A CPU-based collective backend.
///
/// Implements the **Ring All-Reduce** algorithm using `crossbeam` channels, one rank per thread.
/// This simulates the data movement that happens on GPUs via NCCL.
pub struct CpuBackend<T: TensorElem> {
    rank: usize,
    world_size: usize,
    left_rx: Receiver<Vec<T>>, // Receive from rank - 1
    right_tx: Sender<Vec<T>>,  // Send to rank + 1
}

impl<T: TensorElem> CpuBackend<T> {
    pub fn new(
        rank: usize,
        world_size: usize,
        left_rx: Receiver<Vec<T>>,
        right_tx: Sender<Vec<T>>,
    ) -> Self {
        Self {
            rank,
            world_size,
            left_rx,
            right_tx,
        }
    }

    /// Builds a fully wired ring of `world_size` backends, indexed by rank.
    ///
    /// Channel `i` connects rank `i` to rank `i + 1`.
    pub fn ring(world_size: usize) -> Vec<Self> {
        let (txs, rxs): (Vec<_>, Vec<_>) = (0..world_size).map(|_| unbounded()).unzip();

        (0..world_size)
            .map(|rank| {
                let left = (rank + world_size - 1) % world_size;
                Self::new(rank, world_size, rxs[left].clone(), txs[rank].clone())
            })
            .collect()
    }

    fn send(&self, chunk: &[T]) -> Result<()> {
        self.right_tx.send(chunk.to_vec()).map_err(|_| {
            TensorError::Collective(format!("rank {}: right neighbour hung up", self.rank))
        })
    }

    fn recv(&self) -> Result<Vec<T>> {
        self.left_rx.recv().map_err(|_| {
            TensorError::Collective(format!("rank {}: left neighbour hung up", self.rank))
        })
    }

    fn chunk_range(&self, idx: usize, chunk_size: usize, total: usize) -> std::ops::Range<usize> {
        let start = (idx * chunk_size).min(total);
        let end = (start + chunk_size).min(total);
        start..end
    }

    /// `(rank - offset) mod world_size`
    fn ring_index(&self, offset: usize) -> usize {
        (self.rank + self.world_size - offset % self.world_size) % self.world_size
    }
}

impl<T: TensorElem> CollectiveBackend<T> for CpuBackend<T> {
    fn rank(&self) -> usize {
        self.rank
    }

    fn world_size(&self) -> usize {
        self.world_size
    }

    fn all_reduce_sum(&self, data: &mut [T]) -> Result<()> {
        if self.world_size <= 1 || data.is_empty() {
            return Ok(());
        }

        let total = data.len();
        let chunk_size = total.div_ceil(self.world_size);

        // --- Phase 1: Scatter-Reduce ---
        // Rank r sends chunk (r - step) and accumulates chunk (r - step - 1).
        for step in 0..self.world_size - 1 {
            let send = self.chunk_range(self.ring_index(step), chunk_size, total);
            self.send(&data[send])?;

            let recv = self.chunk_range(self.ring_index(step + 1), chunk_size, total);
            let incoming = self.recv()?;
            if incoming.len() != recv.len() {
                return Err(TensorError::ShapeMismatch {
                    expected: vec![recv.len()],
                    got: vec![incoming.len()],
                });
            }
            for (dst, src) in data[recv].iter_mut().zip(incoming) {
                *dst += src;
            }
        }

        // --- Phase 2: All-Gather ---
        // Each rank now owns the fully reduced chunk (r + 1); pass the finished chunks around.
        for step in 0..self.world_size - 1 {
            let send = self.chunk_range(
                (self.rank + 1 + self.world_size - step) % self.world_size,
                chunk_size,
                total,
            );
            self.send(&data[send])?;

            let recv = self.chunk_range(self.ring_index(step), chunk_size, total);
            let incoming = self.recv()?;
            if incoming.len() != recv.len() {
                return Err(TensorError::ShapeMismatch {
                    expected: vec![recv.len()],
                    got: vec![incoming.len()],
                });
            }
            data[recv].copy_from_slice(&incoming);
        }

        Ok(())
    }

    fn broadcast(&self, data: &mut [T], root: usize) -> Result<()> {
        if root >= self.world_size {
            return Err(TensorError::Collective(format!(
                "broadcast root {root} outside world of size {}",
                self.world_size
            )));
        }
        if self.world_size <= 1 {
            return Ok(());
        }

        // root -> root+1 -> ... -> root-1; the last rank in the chain does not forward.
        let last = (root + self.world_size - 1) % self.world_size;
        if self.rank != root {
            let incoming = self.recv()?;
            if incoming.len() != data.len() {
                return Err(TensorError::ShapeMismatch {
                    expected: vec![data.len()],
                    got: vec![incoming.len()],
                });
            }
            data.copy_from_slice(&incoming);
        }
        if self.rank != last {
            self.send(data)?;
        }
        Ok(())
    }
}
