pub mod sgd;
pub mod wrapper;

pub use sgd::Sgd;
pub use wrapper::{OptimWrapper, OptimWrapperDict};

use crate::nn::Parameter;
use crate::tensor::{Result, TensorElem};

/// A trait for optimizers (e.g., SGD).
///
/// Optimizers are responsible for updating model parameters based on computed gradients.
/// Updates are applied one parameter at a time; [`OptimWrapper`] drives the iteration over a
/// module's trainable parameters.
pub trait Optimizer<T: TensorElem>: Send + Sync {
    /// Updates `param.data` in place from `param.grad`, scaled by `grad_scale`.
    ///
    /// Parameters without a gradient are left untouched.
    ///
    /// # Errors
    ///
    /// Returns an error if the gradient shape does not match the parameter.
    fn update(&self, param: &mut Parameter<T>, grad_scale: T) -> Result<()>;
}
