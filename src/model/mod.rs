//! Composite models.
//!
//! A [`BaseModel`] owns several named submodules (for a GAN: a generator and a discriminator)
//! and knows how to run one training, validation or test iteration over a batch. Distributed
//! wrappers only interact with models through this trait.

use crate::nn::ModuleDict;
use crate::optim::OptimWrapperDict;
use crate::tensor::{Result, TensorElem};
use std::collections::BTreeMap;

/// Named scalars produced by a training step for logging (e.g. `loss_gen`, `loss_disc`).
pub type LogVars<T> = BTreeMap<String, T>;

/// A model composed of named submodules.
pub trait BaseModel<T: TensorElem>: Send + Sync {
    /// One element of a batch.
    type Sample;
    /// One prediction produced by `val_step` / `test_step`.
    type Prediction;

    fn children(&self) -> &ModuleDict<T>;

    fn children_mut(&mut self) -> &mut ModuleDict<T>;

    /// Forward, backward and parameter updates for one batch.
    fn train_step(
        &mut self,
        data: &[Self::Sample],
        optim_wrapper: &mut OptimWrapperDict<T>,
    ) -> Result<LogVars<T>>;

    fn val_step(&mut self, data: &[Self::Sample]) -> Result<Vec<Self::Prediction>>;

    fn test_step(&mut self, data: &[Self::Sample]) -> Result<Vec<Self::Prediction>>;

    /// Sets training or evaluation mode on every child.
    fn train(&mut self, mode: bool) {
        for (_, child) in self.children_mut().iter_mut() {
            child.train(mode);
        }
    }
}
