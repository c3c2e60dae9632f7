use crate::tensor::{Device, Result, Tensor, TensorElem};

/// A named, learnable tensor together with its accumulated gradient.
///
/// `requires_grad` mirrors the autograd flag of larger frameworks: a parameter with the flag
/// cleared is *frozen*. Its gradient is never accumulated, it is never synchronized across
/// workers and optimizers skip it.
#[derive(Clone, Debug)]
pub struct Parameter<T: TensorElem> {
    pub name: String,
    pub data: Tensor<T>,
    pub grad: Option<Tensor<T>>,
    pub requires_grad: bool,
}

impl<T: TensorElem> Parameter<T> {
    /// Creates a trainable parameter.
    pub fn new(name: impl Into<String>, data: Tensor<T>) -> Self {
        Self {
            name: name.into(),
            data,
            grad: None,
            requires_grad: true,
        }
    }

    /// Sets the gradient-tracking flag, dropping any stale gradient when frozen.
    pub fn set_requires_grad(&mut self, requires_grad: bool) {
        self.requires_grad = requires_grad;
        if !requires_grad {
            self.grad = None;
        }
    }

    /// Adds `grad` to the accumulated gradient. No-op for frozen parameters.
    pub fn accumulate_grad(&mut self, grad: &Tensor<T>) -> Result<()> {
        if !self.requires_grad {
            return Ok(());
        }
        match &mut self.grad {
            Some(existing) => existing.add_assign(grad),
            None => {
                self.grad = Some(grad.clone());
                Ok(())
            }
        }
    }

    pub fn zero_grad(&mut self) {
        self.grad = None;
    }

    /// Moves data and gradient to `device`.
    pub fn to_device(&mut self, device: Device) {
        self.data = std::mem::replace(&mut self.data, Tensor::zeros(&[0])).to(device);
        if let Some(grad) = self.grad.take() {
            self.grad = Some(grad.to(device));
        }
    }
}
