//! Core Tensor implementation.
//!
//! # What is a Tensor here?
//!
//! A **Tensor** is a flat, row-major buffer of elements plus a shape and a device tag. It is
//! deliberately small: the distributed wrappers in this crate only need to hold parameters and
//! gradients, move them between devices, and hand their raw elements to a collective backend.
//!
//! ## Example
//!
//! ```rust
//! use ddp_rs::tensor::{Device, Tensor};
//!
//! let t = Tensor::<f32>::new(vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0], &[2, 3]).unwrap();
//! assert_eq!(t.shape(), &[2, 3]);
//! assert_eq!(t.device(), Device::Cpu);
//!
//! let t = t.to(Device::Cuda(0));
//! assert_eq!(t.device(), Device::Cuda(0));
//! ```
//!
//! > [!TIP]
//! > **Expert Note: Placement is a tag**
//! > There is no accelerator runtime behind [`Device::Cuda`]. Moving a tensor re-tags it, and every
//! > binary op checks that both operands live on the same device, which is what a real runtime
//! > would enforce before launching a kernel.

use num_traits::{FromPrimitive, Num, NumAssign, ToPrimitive};
use rayon::prelude::*;
use std::fmt::Debug;
use thiserror::Error;

pub mod device;

pub use device::Device;

/// Error type for every fallible operation in the crate.
#[derive(Error, Debug)]
pub enum TensorError {
    /// The shape of the data does not match the expected shape.
    #[error("Shape mismatch: expected {expected:?}, got {got:?}")]
    ShapeMismatch {
        expected: Vec<usize>,
        got: Vec<usize>,
    },
    /// The requested operation is not supported (e.g., for a specific rank or type).
    #[error("Unsupported operation: {0}")]
    Unsupported(String),
    /// Two operands live on different devices.
    #[error("Device mismatch: {lhs} vs {rhs}")]
    DeviceMismatch { lhs: Device, rhs: Device },
    /// A collective operation failed (peer hung up, invalid root, ...).
    #[error("Collective communication failed: {0}")]
    Collective(String),
    /// A trainable parameter produced no gradient before synchronization.
    #[error(
        "Parameter `{0}` requires grad but received no gradient; \
         enable `find_unused_parameters` or wrap submodules separately"
    )]
    UnusedParameter(String),
    /// An optimizer wrapper was requested for a submodule that has none.
    #[error("No optimizer wrapper registered for `{0}`")]
    MissingOptimWrapper(String),
}

pub type Result<T> = std::result::Result<T, TensorError>;

/// Trait bound for elements that can be stored in a Tensor.
///
/// # Requirements
/// - `Copy + Clone`: Essential for efficient storage in contiguous memory (e.g., `Vec<T>`) and fast element access.
/// - `Num + ...`: Provides necessary numeric operations for tensor math.
/// - `Send + Sync + 'static`: Required for parallel execution via `rayon` and for shipping
///   buffers between ranks.
pub trait TensorElem:
    Num
    + NumAssign
    + Copy
    + Clone
    + Debug
    + Send
    + Sync
    + FromPrimitive
    + ToPrimitive
    + PartialOrd
    + 'static
{
}

impl<T> TensorElem for T where
    T: Num
        + NumAssign
        + Copy
        + Clone
        + Debug
        + Send
        + Sync
        + FromPrimitive
        + ToPrimitive
        + PartialOrd
        + 'static
{
}

/// A dynamically shaped tensor stored row-major on a [`Device`].
#[derive(Clone, Debug, PartialEq)]
pub struct Tensor<T: TensorElem> {
    shape: Vec<usize>,
    data: Vec<T>,
    device: Device,
}

impl<T: TensorElem> Tensor<T> {
    /// Creates a new CPU tensor from a vector of data and a shape.
    ///
    /// # Errors
    ///
    /// Returns `TensorError::ShapeMismatch` if the length of `data` does not match the product of `shape`.
    pub fn new(data: Vec<T>, shape: &[usize]) -> Result<Self> {
        let size: usize = shape.iter().product();
        if data.len() != size {
            return Err(TensorError::ShapeMismatch {
                expected: vec![size],
                got: vec![data.len()],
            });
        }

        Ok(Self {
            shape: shape.to_vec(),
            data,
            device: Device::Cpu,
        })
    }

    /// Creates a new CPU tensor filled with zeros.
    pub fn zeros(shape: &[usize]) -> Self {
        Self::full(shape, T::zero())
    }

    /// Creates a new CPU tensor filled with ones.
    pub fn ones(shape: &[usize]) -> Self {
        Self::full(shape, T::one())
    }

    /// Creates a new CPU tensor where every element is `value`.
    pub fn full(shape: &[usize], value: T) -> Self {
        let size: usize = shape.iter().product();
        Self {
            shape: shape.to_vec(),
            data: vec![value; size],
            device: Device::Cpu,
        }
    }

    /// Creates a zero tensor with the same shape and device as `self`.
    pub fn zeros_like(&self) -> Self {
        Self::zeros(&self.shape).to(self.device)
    }

    pub fn shape(&self) -> &[usize] {
        &self.shape
    }

    pub fn data(&self) -> &[T] {
        &self.data
    }

    pub fn data_mut(&mut self) -> &mut [T] {
        &mut self.data
    }

    pub fn device(&self) -> Device {
        self.device
    }

    /// Number of elements.
    pub fn numel(&self) -> usize {
        self.data.len()
    }

    /// Size of the element buffer in bytes.
    pub fn size_in_bytes(&self) -> usize {
        std::mem::size_of_val(self.data.as_slice())
    }

    /// Moves the tensor to `device`.
    pub fn to(mut self, device: Device) -> Self {
        self.device = device;
        self
    }

    /// Applies `f` to every element.
    pub fn map<F>(&self, f: F) -> Self
    where
        F: Fn(T) -> T + Sync + Send,
    {
        Self {
            shape: self.shape.clone(),
            data: self.data.par_iter().map(|&x| f(x)).collect(),
            device: self.device,
        }
    }

    /// Combines `self` and `other` element-wise.
    pub fn zip_map<F>(&self, other: &Self, f: F) -> Result<Self>
    where
        F: Fn(T, T) -> T + Sync + Send,
    {
        self.check_compatible(other)?;
        Ok(Self {
            shape: self.shape.clone(),
            data: self
                .data
                .par_iter()
                .zip(other.data.par_iter())
                .map(|(&a, &b)| f(a, b))
                .collect(),
            device: self.device,
        })
    }

    /// Element-wise `self += other`.
    pub fn add_assign(&mut self, other: &Self) -> Result<()> {
        self.check_compatible(other)?;
        self.data
            .par_iter_mut()
            .zip(other.data.par_iter())
            .for_each(|(a, &b)| *a += b);
        Ok(())
    }

    /// Sum of all elements.
    pub fn sum(&self) -> T {
        self.data.iter().fold(T::zero(), |acc, &x| acc + x)
    }

    /// Matrix multiplication for rank-2 tensors: `[m, k] x [k, n] -> [m, n]`.
    pub fn matmul(&self, other: &Self) -> Result<Self> {
        if self.device != other.device {
            return Err(TensorError::DeviceMismatch {
                lhs: self.device,
                rhs: other.device,
            });
        }
        let (m, k, n) = match (self.shape.as_slice(), other.shape.as_slice()) {
            ([m, k], [k2, n]) if k == k2 => (*m, *k, *n),
            _ => {
                return Err(TensorError::ShapeMismatch {
                    expected: self.shape.clone(),
                    got: other.shape.clone(),
                })
            }
        };

        if m == 0 || n == 0 {
            return Ok(Tensor::zeros(&[m, n]).to(self.device));
        }

        let lhs = &self.data;
        let rhs = &other.data;
        let mut out = vec![T::zero(); m * n];
        out.par_chunks_mut(n).enumerate().for_each(|(i, row)| {
            for (j, cell) in row.iter_mut().enumerate() {
                let mut acc = T::zero();
                for p in 0..k {
                    acc += lhs[i * k + p] * rhs[p * n + j];
                }
                *cell = acc;
            }
        });

        Ok(Tensor::new(out, &[m, n])?.to(self.device))
    }

    /// Transposes a rank-2 tensor.
    pub fn transpose(&self) -> Result<Self> {
        let (rows, cols) = match self.shape.as_slice() {
            [r, c] => (*r, *c),
            _ => {
                return Err(TensorError::Unsupported(format!(
                    "transpose expects rank 2, got rank {}",
                    self.shape.len()
                )))
            }
        };
        let mut out = vec![T::zero(); rows * cols];
        for i in 0..rows {
            for j in 0..cols {
                out[j * rows + i] = self.data[i * cols + j];
            }
        }
        Ok(Tensor::new(out, &[cols, rows])?.to(self.device))
    }

    fn check_compatible(&self, other: &Self) -> Result<()> {
        if self.device != other.device {
            return Err(TensorError::DeviceMismatch {
                lhs: self.device,
                rhs: other.device,
            });
        }
        if self.shape != other.shape {
            return Err(TensorError::ShapeMismatch {
                expected: self.shape.clone(),
                got: other.shape.clone(),
            });
        }
        Ok(())
    }
}
