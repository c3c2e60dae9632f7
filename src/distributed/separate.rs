//! Per-submodule Distributed Data Parallel.
//!
//! ## Why not wrap the whole model?
//!
//! A GAN has (at least) two networks that are updated at different moments of one iteration: the
//! discriminator step leaves the generator's parameters without gradients and vice versa. A single
//! [`DistributedDataParallel`] around the whole model expects a gradient for *every* trainable
//! parameter on every backward pass and fails with
//! [`TensorError::UnusedParameter`](crate::tensor::TensorError::UnusedParameter).
//!
//! [`SeparateDistributedDataParallel`] instead gives every trainable child of the model its own
//! adapter, so each network synchronizes exactly when it is backpropagated through.

use crate::distributed::backend::CollectiveBackend;
use crate::distributed::ddp::{DdpConfig, DistributedDataParallel, NoSyncGuard};
use crate::model::{BaseModel, LogVars};
use crate::nn::{Module, ModuleDict};
use crate::optim::OptimWrapperDict;
use crate::tensor::{Result, TensorElem};
use log::{debug, info};
use serde::{Deserialize, Serialize};
use std::marker::PhantomData;
use std::sync::Arc;

/// Which parameters decide whether a child counts as frozen.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum FrozenCheck {
    /// A child with parameters is frozen only if *every parameter of the whole model* has
    /// gradient tracking disabled. Any trainable parameter anywhere makes all parameterised
    /// children trainable.
    #[default]
    Model,
    /// A child is frozen if none of its own parameters track gradients.
    Child,
}

/// How a child module is treated when the model gets wrapped.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ChildKind {
    /// No parameters; moved to the compute device only.
    ParameterFree,
    /// Parameters, none of them trainable; moved to the compute device only.
    Frozen,
    /// At least one trainable parameter; moved and wrapped in [`DistributedDataParallel`].
    Trainable,
}

/// Classifies `child`.
///
/// `model_frozen` must be `true` iff no parameter of the whole model requires grad; it is only
/// consulted under [`FrozenCheck::Model`].
pub fn classify_child<T: TensorElem>(
    child: &dyn Module<T>,
    model_frozen: bool,
    check: FrozenCheck,
) -> ChildKind {
    let params = child.parameters();
    if params.is_empty() {
        return ChildKind::ParameterFree;
    }
    let frozen = match check {
        FrozenCheck::Model => model_frozen,
        FrozenCheck::Child => params.iter().all(|p| !p.requires_grad),
    };
    if frozen {
        ChildKind::Frozen
    } else {
        ChildKind::Trainable
    }
}

/// Scope in which no wrapped child synchronizes gradients.
///
/// Holds one [`NoSyncGuard`] per adapter-wrapped child, acquired in child order and released in
/// reverse order on drop, including when the scope is left through `?` or a panic.
#[must_use = "synchronization resumes as soon as the scope is dropped"]
#[derive(Debug)]
pub struct NoSyncScope {
    guards: Vec<NoSyncGuard>,
}

impl NoSyncScope {
    /// Number of children whose synchronization is suspended.
    pub fn len(&self) -> usize {
        self.guards.len()
    }

    pub fn is_empty(&self) -> bool {
        self.guards.is_empty()
    }
}

impl Drop for NoSyncScope {
    fn drop(&mut self) {
        while let Some(guard) = self.guards.pop() {
            drop(guard);
        }
    }
}

/// Wraps every trainable child of a composite model in its own [`DistributedDataParallel`].
///
/// Construction moves every child to `config.device`. Children with trainable parameters are
/// replaced, under the same name, by an adapter built from `backend` and a clone of `config`.
/// Parameter-free and frozen children stay as they are. Training, validation and test steps are
/// forwarded to the model unchanged.
///
/// Classification happens once, here. Parameters added to a child or (un)frozen afterwards do not
/// change whether it is wrapped.
///
/// If construction fails the model is consumed and dropped: some children may already have been
/// wrapped and the value must not be used further.
pub struct SeparateDistributedDataParallel<T: TensorElem, M: BaseModel<T>> {
    module: M,
    training: bool,
    classification: Vec<(String, ChildKind)>,
    _elem: PhantomData<T>,
}

impl<T: TensorElem, M: BaseModel<T>> SeparateDistributedDataParallel<T, M> {
    /// Wraps `module` using [`FrozenCheck::Model`].
    pub fn new(module: M, backend: Arc<dyn CollectiveBackend<T>>, config: DdpConfig) -> Result<Self> {
        Self::with_frozen_check(module, backend, config, FrozenCheck::default())
    }

    /// Wraps `module`, deciding which children count as frozen according to `check`.
    ///
    /// [`FrozenCheck::Model`] only treats a parameterised child as frozen when no parameter of
    /// the whole model requires grad, so a frozen child next to a trainable one still gets an
    /// adapter. [`FrozenCheck::Child`] looks at the child's own parameters, leaving such a child
    /// unwrapped.
    pub fn with_frozen_check(
        mut module: M,
        backend: Arc<dyn CollectiveBackend<T>>,
        config: DdpConfig,
        check: FrozenCheck,
    ) -> Result<Self> {
        let classification = classify_children(module.children(), check);

        for (name, kind) in &classification {
            debug!("{name}: {kind:?}, moving to {}", config.device);
            module.children_mut().replace_with(name, |mut child| {
                child.to_device(config.device)?;
                let child: Box<dyn Module<T>> = match kind {
                    ChildKind::Trainable => Box::new(DistributedDataParallel::new(
                        child,
                        backend.clone(),
                        config.clone(),
                    )?),
                    ChildKind::ParameterFree | ChildKind::Frozen => child,
                };
                Ok(child)
            })?;
        }

        info!(
            "rank {}/{}: wrapped {} of {} submodules separately",
            backend.rank(),
            backend.world_size(),
            classification
                .iter()
                .filter(|(_, k)| *k == ChildKind::Trainable)
                .count(),
            classification.len()
        );

        Ok(Self {
            module,
            training: true,
            classification,
            _elem: PhantomData,
        })
    }

    /// Forwards to the model's `train_step`.
    pub fn train_step(
        &mut self,
        data: &[M::Sample],
        optim_wrapper: &mut OptimWrapperDict<T>,
    ) -> Result<LogVars<T>> {
        self.module.train_step(data, optim_wrapper)
    }

    /// Forwards to the model's `val_step`.
    pub fn val_step(&mut self, data: &[M::Sample]) -> Result<Vec<M::Prediction>> {
        self.module.val_step(data)
    }

    /// Forwards to the model's `test_step`.
    pub fn test_step(&mut self, data: &[M::Sample]) -> Result<Vec<M::Prediction>> {
        self.module.test_step(data)
    }

    /// Suspends gradient synchronization of every wrapped child until the scope drops.
    pub fn no_sync(&self) -> NoSyncScope {
        let guards = self
            .module
            .children()
            .iter()
            .filter_map(|(_, child)| child.no_sync())
            .collect();
        NoSyncScope { guards }
    }

    /// Sets training (`true`) or evaluation (`false`) mode on the wrapper and every child.
    pub fn train(&mut self, mode: bool) -> &mut Self {
        self.training = mode;
        self.module.train(mode);
        self
    }

    pub fn is_training(&self) -> bool {
        self.training
    }

    /// `(name, kind)` for every child, as decided at construction.
    pub fn classification(&self) -> &[(String, ChildKind)] {
        &self.classification
    }

    pub fn module(&self) -> &M {
        &self.module
    }

    pub fn module_mut(&mut self) -> &mut M {
        &mut self.module
    }

    pub fn into_inner(self) -> M {
        self.module
    }
}

/// First pass: decide every child's fate before any replacement happens.
fn classify_children<T: TensorElem>(
    children: &ModuleDict<T>,
    check: FrozenCheck,
) -> Vec<(String, ChildKind)> {
    let model_frozen = children
        .iter()
        .flat_map(|(_, child)| child.parameters())
        .all(|p| !p.requires_grad);

    children
        .iter()
        .map(|(name, child)| (name.to_string(), classify_child(child, model_frozen, check)))
        .collect()
}

impl<T: TensorElem, M: BaseModel<T>> BaseModel<T> for SeparateDistributedDataParallel<T, M> {
    type Sample = M::Sample;
    type Prediction = M::Prediction;

    fn children(&self) -> &ModuleDict<T> {
        self.module.children()
    }

    fn children_mut(&mut self) -> &mut ModuleDict<T> {
        self.module.children_mut()
    }

    fn train_step(
        &mut self,
        data: &[Self::Sample],
        optim_wrapper: &mut OptimWrapperDict<T>,
    ) -> Result<LogVars<T>> {
        SeparateDistributedDataParallel::train_step(self, data, optim_wrapper)
    }

    fn val_step(&mut self, data: &[Self::Sample]) -> Result<Vec<Self::Prediction>> {
        SeparateDistributedDataParallel::val_step(self, data)
    }

    fn test_step(&mut self, data: &[Self::Sample]) -> Result<Vec<Self::Prediction>> {
        SeparateDistributedDataParallel::test_step(self, data)
    }

    fn train(&mut self, mode: bool) {
        SeparateDistributedDataParallel::train(self, mode);
    }
}
