//! Device abstraction for Tensor placement.
//!
//! # ML Context
//!
//! In machine learning frameworks, a "Device" represents the hardware accelerator where
//! computation happens. Distributed data parallel training usually pins one accelerator per
//! worker process, so the wrappers in [`crate::distributed`] move every submodule to the
//! configured compute device before training starts.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Where a tensor's data lives.
///
/// # Examples
///
/// ```rust
/// use ddp_rs::tensor::Device;
/// assert_eq!(Device::Cpu.name(), "CPU");
/// assert_eq!(Device::Cuda(1).to_string(), "cuda:1");
/// ```
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Device {
    /// Host memory.
    #[default]
    Cpu,
    /// An accelerator, identified by its local index.
    Cuda(usize),
}

impl Device {
    /// Returns the name of the device kind.
    pub fn name(&self) -> &'static str {
        match self {
            Device::Cpu => "CPU",
            Device::Cuda(_) => "CUDA",
        }
    }

    pub fn is_cuda(&self) -> bool {
        matches!(self, Device::Cuda(_))
    }
}

impl fmt::Display for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Device::Cpu => write!(f, "cpu"),
            Device::Cuda(index) => write!(f, "cuda:{index}"),
        }
    }
}
