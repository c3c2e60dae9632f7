use super::Optimizer;
use crate::nn::Parameter;
use crate::tensor::{Result, TensorElem, TensorError};
use rayon::prelude::*;

/// Stochastic Gradient Descent (SGD) optimizer.
///
/// Updates parameters using the rule:
/// `param = param - learning_rate * (grad + weight_decay * param)`
#[derive(Clone, Debug)]
pub struct Sgd<T: TensorElem> {
    pub learning_rate: T,
    pub weight_decay: T,
}

impl<T: TensorElem> Sgd<T> {
    pub fn new(learning_rate: T) -> Self {
        Self {
            learning_rate,
            weight_decay: T::zero(),
        }
    }

    pub fn with_weight_decay(mut self, weight_decay: T) -> Self {
        self.weight_decay = weight_decay;
        self
    }
}

impl<T: TensorElem> Optimizer<T> for Sgd<T> {
    fn update(&self, param: &mut Parameter<T>, grad_scale: T) -> Result<()> {
        let Some(grad) = &param.grad else {
            return Ok(());
        };
        if param.data.shape() != grad.shape() {
            return Err(TensorError::ShapeMismatch {
                expected: param.data.shape().to_vec(),
                got: grad.shape().to_vec(),
            });
        }

        let lr = self.learning_rate;
        let wd = self.weight_decay;

        param
            .data
            .data_mut()
            .par_iter_mut()
            .zip(grad.data().par_iter())
            .for_each(|(p, g)| {
                *p -= lr * (*g * grad_scale + wd * *p);
            });

        Ok(())
    }
}
