//! Activation Functions.
//!
//! Activation layers introduce **non-linearity** and own no parameters. In a composite model
//! they are the typical *parameter-free* children: they get moved to the compute device like
//! everything else but are never wrapped for gradient synchronization.

use crate::nn::{Module, Parameter};
use crate::tensor::{Device, Result, Tensor, TensorElem};
use std::any::Any;

/// The element-wise function an [`Activation`] layer applies.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ActivationKind {
    /// $f(x) = \max(0, x)$
    Relu,
    /// $f(x) = x$
    Identity,
}

/// A parameter-free activation layer.
#[derive(Debug)]
pub struct Activation {
    kind: ActivationKind,
    device: Device,
    training: bool,
}

impl Activation {
    pub fn new(kind: ActivationKind) -> Self {
        Self {
            kind,
            device: Device::Cpu,
            training: true,
        }
    }

    pub fn relu() -> Self {
        Self::new(ActivationKind::Relu)
    }

    pub fn identity() -> Self {
        Self::new(ActivationKind::Identity)
    }

    pub fn kind(&self) -> ActivationKind {
        self.kind
    }
}

impl<T: TensorElem> Module<T> for Activation {
    fn forward(&self, input: &Tensor<T>) -> Result<Tensor<T>> {
        Ok(match self.kind {
            ActivationKind::Relu => input.map(|x| if x > T::zero() { x } else { T::zero() }),
            ActivationKind::Identity => input.clone(),
        })
    }

    fn backward(&mut self, input: &Tensor<T>, grad_output: &Tensor<T>) -> Result<Tensor<T>> {
        match self.kind {
            ActivationKind::Relu => {
                input.zip_map(grad_output, |x, g| if x > T::zero() { g } else { T::zero() })
            }
            ActivationKind::Identity => Ok(grad_output.clone()),
        }
    }

    fn parameters(&self) -> Vec<&Parameter<T>> {
        Vec::new()
    }

    fn parameters_mut(&mut self) -> Vec<&mut Parameter<T>> {
        Vec::new()
    }

    fn to_device(&mut self, device: Device) -> Result<()> {
        self.device = device;
        Ok(())
    }

    fn device(&self) -> Device {
        self.device
    }

    fn train(&mut self, mode: bool) {
        self.training = mode;
    }

    fn is_training(&self) -> bool {
        self.training
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}
