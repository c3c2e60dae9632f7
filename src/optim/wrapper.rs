use super::Optimizer;
use crate::distributed::NoSyncGuard;
use crate::nn::Module;
use crate::tensor::{Result, TensorElem, TensorError};
use std::collections::BTreeMap;
use std::fmt;

/// An optimizer plus the bookkeeping for gradient accumulation.
///
/// With `accumulative_counts = n`, parameters are only stepped on every `n`-th call to
/// [`update_params`](Self::update_params), and the accumulated gradient is scaled by `1 / n`.
/// [`optim_context`](Self::optim_context) suspends gradient synchronization on the iterations in
/// between, so workers only communicate when an update actually happens.
pub struct OptimWrapper<T: TensorElem> {
    optimizer: Box<dyn Optimizer<T>>,
    accumulative_counts: usize,
    inner_count: usize,
}

impl<T: TensorElem> OptimWrapper<T> {
    pub fn new(optimizer: impl Optimizer<T> + 'static) -> Self {
        Self {
            optimizer: Box::new(optimizer),
            accumulative_counts: 1,
            inner_count: 0,
        }
    }

    /// Accumulates gradients over `counts` iterations per update. Zero is treated as one.
    pub fn with_accumulative_counts(mut self, counts: usize) -> Self {
        self.accumulative_counts = counts.max(1);
        self
    }

    pub fn accumulative_counts(&self) -> usize {
        self.accumulative_counts
    }

    /// Number of completed `update_params` calls.
    pub fn inner_count(&self) -> usize {
        self.inner_count
    }

    /// Whether the current iteration ends with a parameter update.
    pub fn should_update(&self) -> bool {
        (self.inner_count + 1) % self.accumulative_counts == 0
    }

    /// Enters `module`'s no-sync scope on iterations that only accumulate.
    ///
    /// Hold the returned guard across the backward pass.
    pub fn optim_context(&self, module: &dyn Module<T>) -> Option<NoSyncGuard> {
        if self.should_update() {
            None
        } else {
            module.no_sync()
        }
    }

    /// Finishes one iteration: steps and clears gradients when an update is due.
    pub fn update_params(&mut self, module: &mut dyn Module<T>) -> Result<()> {
        if self.should_update() {
            self.step(module)?;
            module.zero_grad();
        }
        self.inner_count += 1;
        Ok(())
    }

    /// Applies the optimizer to every trainable parameter of `module`.
    pub fn step(&self, module: &mut dyn Module<T>) -> Result<()> {
        let counts = T::from_usize(self.accumulative_counts).ok_or_else(|| {
            TensorError::Unsupported(format!(
                "accumulative count {} not representable",
                self.accumulative_counts
            ))
        })?;
        let grad_scale = T::one() / counts;

        for p in module.parameters_mut() {
            if p.requires_grad {
                self.optimizer.update(p, grad_scale)?;
            }
        }
        Ok(())
    }
}

impl<T: TensorElem> fmt::Debug for OptimWrapper<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OptimWrapper")
            .field("accumulative_counts", &self.accumulative_counts)
            .field("inner_count", &self.inner_count)
            .finish()
    }
}

/// Per-submodule optimizer wrappers, keyed by submodule name.
#[derive(Debug)]
pub struct OptimWrapperDict<T: TensorElem> {
    wrappers: BTreeMap<String, OptimWrapper<T>>,
}

impl<T: TensorElem> OptimWrapperDict<T> {
    pub fn new() -> Self {
        Self {
            wrappers: BTreeMap::new(),
        }
    }

    pub fn with(mut self, name: impl Into<String>, wrapper: OptimWrapper<T>) -> Self {
        self.insert(name, wrapper);
        self
    }

    pub fn insert(
        &mut self,
        name: impl Into<String>,
        wrapper: OptimWrapper<T>,
    ) -> Option<OptimWrapper<T>> {
        self.wrappers.insert(name.into(), wrapper)
    }

    pub fn get(&self, name: &str) -> Result<&OptimWrapper<T>> {
        self.wrappers
            .get(name)
            .ok_or_else(|| TensorError::MissingOptimWrapper(name.to_string()))
    }

    pub fn get_mut(&mut self, name: &str) -> Result<&mut OptimWrapper<T>> {
        self.wrappers
            .get_mut(name)
            .ok_or_else(|| TensorError::MissingOptimWrapper(name.to_string()))
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.wrappers.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.wrappers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.wrappers.is_empty()
    }
}

impl<T: TensorElem> Default for OptimWrapperDict<T> {
    fn default() -> Self {
        Self::new()
    }
}
