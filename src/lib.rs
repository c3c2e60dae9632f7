//! # ddp-rs
//!
//! `ddp-rs` provides distributed data parallel wrappers for models built from several
//! independently optimized networks, such as the generator and discriminator of a GAN.
//!
//! Instead of synchronizing a whole model as one unit,
//! [`SeparateDistributedDataParallel`](distributed::SeparateDistributedDataParallel) wraps every
//! trainable submodule in its own [`DistributedDataParallel`](distributed::DistributedDataParallel)
//! adapter, leaves parameter-free and frozen submodules alone, and forwards training, validation
//! and test steps to the model.
//!
//! ## Modules
//!
//! - [`mod@tensor`]: A small dynamically shaped tensor with device placement.
//! - [`nn`]: The `Module` trait, parameters, and a few layers.
//! - [`optim`]: Optimizers and optimizer wrappers with gradient accumulation.
//! - [`model`]: The composite-model contract.
//! - [`distributed`]: Collective backends and the data parallel wrappers.
//!
//! ## Example
//!
//! ```rust
//! use ddp_rs::distributed::{CpuBackend, DdpConfig, SeparateDistributedDataParallel};
//! use ddp_rs::model::{BaseModel, LogVars};
//! use ddp_rs::nn::{Activation, Linear, ModuleDict};
//! use ddp_rs::optim::OptimWrapperDict;
//! use ddp_rs::tensor::{Result, Tensor};
//! use std::sync::Arc;
//!
//! struct Gan {
//!     children: ModuleDict<f32>,
//! }
//!
//! impl BaseModel<f32> for Gan {
//!     type Sample = Vec<f32>;
//!     type Prediction = f32;
//!
//!     fn children(&self) -> &ModuleDict<f32> {
//!         &self.children
//!     }
//!     fn children_mut(&mut self) -> &mut ModuleDict<f32> {
//!         &mut self.children
//!     }
//!     fn train_step(&mut self, _: &[Vec<f32>], _: &mut OptimWrapperDict<f32>) -> Result<LogVars<f32>> {
//!         Ok(LogVars::new())
//!     }
//!     fn val_step(&mut self, data: &[Vec<f32>]) -> Result<Vec<f32>> {
//!         Ok(vec![0.0; data.len()])
//!     }
//!     fn test_step(&mut self, data: &[Vec<f32>]) -> Result<Vec<f32>> {
//!         self.val_step(data)
//!     }
//! }
//!
//! let gan = Gan {
//!     children: ModuleDict::new()
//!         .with("gen", Linear::<f32>::new(Tensor::ones(&[2, 2]), None)?)
//!         .with("disc", Linear::<f32>::new(Tensor::ones(&[1, 2]), None)?)
//!         .with("act", Activation::relu()),
//! };
//!
//! let backend = Arc::new(CpuBackend::<f32>::ring(1).remove(0));
//! let model = SeparateDistributedDataParallel::<f32, _>::new(gan, backend, DdpConfig::default())?;
//!
//! let scope = model.no_sync();
//! assert_eq!(scope.len(), 2); // gen and disc
//! # Ok::<(), ddp_rs::tensor::TensorError>(())
//! ```

pub mod distributed;
pub mod model;
pub mod nn;
pub mod optim;
pub mod tensor;

pub use tensor::{Device, Result, Tensor, TensorElem, TensorError};
