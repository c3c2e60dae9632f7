use crate::distributed::NoSyncGuard;
use crate::nn::Parameter;
use crate::tensor::{Device, Result, Tensor, TensorElem};
use std::any::Any;
use std::fmt::Debug;

/// A Module trait for Neural Network layers.
///
/// This is the capability surface every distributed wrapper relies on:
///
/// 1.  **Computation**: `forward` and a hand-written `backward` that accumulates parameter
///     gradients and returns the gradient with respect to the input.
/// 2.  **Introspection**: `parameters` exposes each tensor with its `requires_grad` flag, which is
///     how submodules get classified as parameter-free, frozen or trainable.
/// 3.  **Placement and mode**: `to_device`, `train` / `is_training`.
/// 4.  **Synchronization**: `no_sync` returns a guard for modules that synchronize gradients
///     across workers, `None` for everything else.
///
/// `Send + Sync` lets replicas move onto worker threads; `Debug` keeps model structure inspectable.
pub trait Module<T: TensorElem>: Debug + Send + Sync {
    fn forward(&self, input: &Tensor<T>) -> Result<Tensor<T>>;

    /// Accumulates parameter gradients for one forward pass on `input` and returns the
    /// gradient with respect to `input`.
    fn backward(&mut self, input: &Tensor<T>, grad_output: &Tensor<T>) -> Result<Tensor<T>>;

    fn parameters(&self) -> Vec<&Parameter<T>>;

    fn parameters_mut(&mut self) -> Vec<&mut Parameter<T>>;

    /// Moves all state to `device`.
    fn to_device(&mut self, device: Device) -> Result<()>;

    fn device(&self) -> Device;

    /// Sets training (`true`) or evaluation (`false`) mode.
    fn train(&mut self, mode: bool);

    fn is_training(&self) -> bool;

    /// Suspends gradient synchronization until the returned guard drops.
    fn no_sync(&self) -> Option<NoSyncGuard> {
        None
    }

    fn zero_grad(&mut self) {
        for p in self.parameters_mut() {
            p.zero_grad();
        }
    }

    /// Total number of scalar parameters.
    fn num_parameters(&self) -> usize {
        self.parameters().iter().map(|p| p.data.numel()).sum()
    }

    fn as_any(&self) -> &dyn Any;
}
