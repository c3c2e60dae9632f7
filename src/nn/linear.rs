use crate::nn::{Module, Parameter};
use crate::tensor::{Device, Result, Tensor, TensorElem, TensorError};
use std::any::Any;

/// Linear Layer: `y = xA^T + b`
///
/// Performs a linear transformation on a batch of row vectors.
///
/// - **Weights ($A$):** `[out_features, in_features]`.
/// - **Bias ($b$):** `[out_features]`.
/// - **Input ($x$):** `[batch, in_features]`.
///
/// # Examples
/// ```rust
/// use ddp_rs::nn::{Linear, Module};
/// use ddp_rs::tensor::Tensor;
///
/// let layer = Linear::<f32>::new(
///     Tensor::ones(&[5, 10]),       // Weights: [out, in]
///     Some(Tensor::zeros(&[5])),    // Bias: [out]
/// ).unwrap();
/// let y = layer.forward(&Tensor::ones(&[2, 10])).unwrap();
/// assert_eq!(y.shape(), &[2, 5]);
/// assert_eq!(y.data()[0], 10.0);
/// ```
#[derive(Debug)]
pub struct Linear<T: TensorElem> {
    pub weight: Parameter<T>,
    pub bias: Option<Parameter<T>>,
    training: bool,
}

impl<T: TensorElem> Linear<T> {
    /// Creates a new Linear layer.
    ///
    /// # Errors
    ///
    /// Returns `TensorError::Unsupported` if `weight` is not rank 2, and
    /// `TensorError::ShapeMismatch` if it has a zero-sized dimension or `bias` does not match
    /// `out_features`.
    pub fn new(weight: Tensor<T>, bias: Option<Tensor<T>>) -> Result<Self> {
        let out_features = match weight.shape() {
            [0, _] | [_, 0] => {
                return Err(TensorError::ShapeMismatch {
                    expected: weight.shape().iter().map(|&d| d.max(1)).collect(),
                    got: weight.shape().to_vec(),
                })
            }
            [out, _] => *out,
            other => {
                return Err(TensorError::Unsupported(format!(
                    "linear weight must be rank 2 [out, in], got rank {}",
                    other.len()
                )))
            }
        };
        if let Some(b) = &bias {
            if b.shape() != [out_features] {
                return Err(TensorError::ShapeMismatch {
                    expected: vec![out_features],
                    got: b.shape().to_vec(),
                });
            }
        }

        Ok(Self {
            weight: Parameter::new("weight", weight),
            bias: bias.map(|b| Parameter::new("bias", b)),
            training: true,
        })
    }

    pub fn in_features(&self) -> usize {
        self.weight.data.shape()[1]
    }

    pub fn out_features(&self) -> usize {
        self.weight.data.shape()[0]
    }

    /// Disables gradient tracking for every parameter of the layer.
    pub fn freeze(mut self) -> Self {
        for p in self.parameters_mut() {
            p.set_requires_grad(false);
        }
        self
    }
}

impl<T: TensorElem> Module<T> for Linear<T> {
    fn forward(&self, input: &Tensor<T>) -> Result<Tensor<T>> {
        let mut out = input.matmul(&self.weight.data.transpose()?)?;
        if let Some(bias) = &self.bias {
            let out_features = self.out_features();
            let b = bias.data.data();
            for row in out.data_mut().chunks_mut(out_features) {
                for (y, &bj) in row.iter_mut().zip(b) {
                    *y += bj;
                }
            }
        }
        Ok(out)
    }

    fn backward(&mut self, input: &Tensor<T>, grad_output: &Tensor<T>) -> Result<Tensor<T>> {
        // dW = dY^T x, db = sum_batch(dY), dx = dY W
        let grad_input = grad_output.matmul(&self.weight.data)?;

        if self.weight.requires_grad {
            let grad_weight = grad_output.transpose()?.matmul(input)?;
            self.weight.accumulate_grad(&grad_weight)?;
        }
        if let Some(bias) = &mut self.bias {
            if bias.requires_grad {
                let out_features = bias.data.numel();
                let mut grad_bias = vec![T::zero(); out_features];
                for row in grad_output.data().chunks(out_features) {
                    for (g, &dy) in grad_bias.iter_mut().zip(row) {
                        *g += dy;
                    }
                }
                let grad_bias = Tensor::new(grad_bias, &[out_features])?.to(bias.data.device());
                bias.accumulate_grad(&grad_bias)?;
            }
        }

        Ok(grad_input)
    }

    fn parameters(&self) -> Vec<&Parameter<T>> {
        std::iter::once(&self.weight).chain(self.bias.as_ref()).collect()
    }

    fn parameters_mut(&mut self) -> Vec<&mut Parameter<T>> {
        std::iter::once(&mut self.weight)
            .chain(self.bias.as_mut())
            .collect()
    }

    fn to_device(&mut self, device: Device) -> Result<()> {
        for p in self.parameters_mut() {
            p.to_device(device);
        }
        Ok(())
    }

    fn device(&self) -> Device {
        self.weight.data.device()
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
