//! # Distributed Training
//!
//! ## Data Parallelism, one network at a time
//!
//! In **Data Parallelism** every worker holds a full replica of the model and trains on its own
//! slice of the data. After each backward pass the gradients are averaged across workers with an
//! **All-Reduce**, so every replica applies the identical update and stays in lockstep.
//!
//! Multi-network models (GANs above all) do not fit the "one wrapper around everything" recipe:
//! the generator and discriminator are backpropagated through at different times. This module
//! therefore provides:
//!
//! *   [`CollectiveBackend`](backend::CollectiveBackend): the communication interface
//!     (`all_reduce_sum`, `broadcast`).
//! *   [`CpuBackend`](cpu_backend::CpuBackend): Ring All-Reduce between threads over channels.
//! *   [`DistributedDataParallel`](ddp::DistributedDataParallel): gradient synchronization for a
//!     single module, with bucketing and a `no_sync` scope for gradient accumulation.
//! *   [`SeparateDistributedDataParallel`](separate::SeparateDistributedDataParallel): wraps each
//!     trainable submodule of a composite model in its own adapter.

pub mod backend;
pub mod cpu_backend;
pub mod ddp;
pub mod separate;

pub use backend::CollectiveBackend;
pub use cpu_backend::CpuBackend;
pub use ddp::{DdpConfig, DistributedDataParallel, NoSyncGuard};
pub use separate::{
    classify_child, ChildKind, FrozenCheck, NoSyncScope, SeparateDistributedDataParallel,
};
