use crate::distributed::backend::CollectiveBackend;
use crate::nn::{Module, Parameter};
use crate::tensor::{Device, Result, Tensor, TensorElem, TensorError};
use log::{debug, trace, warn};
use serde::{Deserialize, Serialize};
use std::any::Any;
use std::fmt;
use std::ops::Range;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// Configuration for a [`DistributedDataParallel`] adapter.
///
/// A single config value is cloned into every adapter a
/// [`SeparateDistributedDataParallel`](super::SeparateDistributedDataParallel) creates.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DdpConfig {
    /// Compute device the wrapped module is moved to.
    pub device: Device,
    /// Broadcast parameters from rank 0 on construction so replicas start identical.
    pub broadcast_parameters: bool,
    /// Upper bound for one gradient bucket, in MiB.
    pub bucket_cap_mb: f64,
    /// Treat trainable parameters without a gradient as zero instead of failing.
    pub find_unused_parameters: bool,
}

impl Default for DdpConfig {
    fn default() -> Self {
        Self {
            device: Device::Cpu,
            broadcast_parameters: true,
            bucket_cap_mb: 25.0,
            find_unused_parameters: false,
        }
    }
}

impl DdpConfig {
    pub fn with_device(mut self, device: Device) -> Self {
        self.device = device;
        self
    }

    pub fn with_broadcast_parameters(mut self, broadcast: bool) -> Self {
        self.broadcast_parameters = broadcast;
        self
    }

    pub fn with_bucket_cap_mb(mut self, cap: f64) -> Self {
        self.bucket_cap_mb = cap;
        self
    }

    pub fn with_find_unused_parameters(mut self, find_unused: bool) -> Self {
        self.find_unused_parameters = find_unused;
        self
    }

    fn bucket_cap_bytes(&self) -> usize {
        (self.bucket_cap_mb.max(0.0) * 1024.0 * 1024.0) as usize
    }
}

/// RAII guard that suspends gradient synchronization of one adapter.
///
/// The guard shares a depth counter with the adapter instead of borrowing it, so the model stays
/// usable (forward, backward, optimizer steps) while synchronization is off. Guards nest.
#[must_use = "synchronization resumes as soon as the guard is dropped"]
pub struct NoSyncGuard {
    depth: Arc<AtomicUsize>,
}

impl NoSyncGuard {
    fn new(depth: Arc<AtomicUsize>) -> Self {
        depth.fetch_add(1, Ordering::SeqCst);
        Self { depth }
    }
}

impl Drop for NoSyncGuard {
    fn drop(&mut self) {
        self.depth.fetch_sub(1, Ordering::SeqCst);
    }
}

impl fmt::Debug for NoSyncGuard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NoSyncGuard")
            .field("depth", &self.depth.load(Ordering::SeqCst))
            .finish()
    }
}

/// Distributed Data Parallel adapter for a single module.
///
/// After every backward pass the gradients of all trainable parameters are averaged across the
/// ranks of `backend`, so each replica applies the same optimizer update.
///
/// # Example
///
/// ```rust
/// use ddp_rs::distributed::{CpuBackend, DdpConfig, DistributedDataParallel};
/// use ddp_rs::nn::{Linear, Module};
/// use ddp_rs::tensor::Tensor;
/// use std::sync::Arc;
///
/// let backend = Arc::new(CpuBackend::<f32>::ring(1).remove(0));
/// let layer = Linear::<f32>::new(Tensor::ones(&[1, 2]), None).unwrap();
/// let mut ddp =
///     DistributedDataParallel::<f32>::new(Box::new(layer), backend, DdpConfig::default()).unwrap();
///
/// let x = Tensor::ones(&[1, 2]);
/// ddp.backward(&x, &Tensor::ones(&[1, 1])).unwrap();
/// assert_eq!(ddp.sync_count(), 1);
///
/// {
///     let _guard = ddp.no_sync();
///     ddp.backward(&x, &Tensor::ones(&[1, 1])).unwrap();
/// }
/// assert_eq!(ddp.sync_count(), 1);
/// ```
pub struct DistributedDataParallel<T: TensorElem> {
    module: Box<dyn Module<T>>,
    backend: Arc<dyn CollectiveBackend<T>>,
    config: DdpConfig,
    no_sync_depth: Arc<AtomicUsize>,
    sync_count: usize,
}

impl<T: TensorElem> DistributedDataParallel<T> {
    /// Moves `module` to `config.device` and wraps it.
    ///
    /// With `broadcast_parameters` set, every parameter is overwritten with rank 0's copy.
    pub fn new(
        mut module: Box<dyn Module<T>>,
        backend: Arc<dyn CollectiveBackend<T>>,
        config: DdpConfig,
    ) -> Result<Self> {
        module.to_device(config.device)?;

        if config.broadcast_parameters && backend.world_size() > 1 {
            for p in module.parameters_mut() {
                backend.broadcast(p.data.data_mut(), 0)?;
            }
        }

        debug!(
            "rank {}/{}: wrapped module with {} parameters on {}",
            backend.rank(),
            backend.world_size(),
            module.num_parameters(),
            config.device
        );

        Ok(Self {
            module,
            backend,
            config,
            no_sync_depth: Arc::new(AtomicUsize::new(0)),
            sync_count: 0,
        })
    }

    /// Suspends gradient synchronization until the returned guard drops.
    pub fn no_sync(&self) -> NoSyncGuard {
        NoSyncGuard::new(self.no_sync_depth.clone())
    }

    /// `false` while at least one [`NoSyncGuard`] is alive.
    pub fn require_backward_grad_sync(&self) -> bool {
        self.no_sync_depth.load(Ordering::SeqCst) == 0
    }

    /// Number of completed gradient synchronizations.
    pub fn sync_count(&self) -> usize {
        self.sync_count
    }

    pub fn config(&self) -> &DdpConfig {
        &self.config
    }

    pub fn module(&self) -> &dyn Module<T> {
        self.module.as_ref()
    }

    pub fn module_mut(&mut self) -> &mut dyn Module<T> {
        self.module.as_mut()
    }

    pub fn into_inner(self) -> Box<dyn Module<T>> {
        self.module
    }

    /// Averages the gradients of all trainable parameters across ranks.
    ///
    /// Gradients are packed into buckets of at most `bucket_cap_mb` and each bucket is reduced
    /// with one collective call. Every rank must call this the same number of times.
    pub fn sync_gradients(&mut self) -> Result<()> {
        let world_size = self.backend.world_size();
        let find_unused = self.config.find_unused_parameters;
        let bucket_cap = self.config.bucket_cap_bytes();

        let mut params: Vec<&mut Parameter<T>> = self
            .module
            .parameters_mut()
            .into_iter()
            .filter(|p| p.requires_grad)
            .collect();
        // Gradients become ready roughly back to front.
        params.reverse();

        for p in params.iter_mut() {
            if p.grad.is_none() {
                if !find_unused {
                    return Err(TensorError::UnusedParameter(p.name.clone()));
                }
                warn!("parameter `{}` received no gradient, reducing zeros", p.name);
                p.grad = Some(p.data.zeros_like());
            }
        }

        let sizes: Vec<usize> = params.iter().map(|p| p.data.size_in_bytes()).collect();
        let scale = T::from_usize(world_size).ok_or_else(|| {
            TensorError::Unsupported(format!("world size {world_size} not representable"))
        })?;

        for bucket in plan_buckets(&sizes, bucket_cap) {
            let grads: Vec<&mut Tensor<T>> = params[bucket.clone()]
                .iter_mut()
                .filter_map(|p| p.grad.as_mut())
                .collect();
            reduce_bucket(self.backend.as_ref(), grads, scale)?;
            trace!(
                "rank {}: reduced bucket of {} parameters",
                self.backend.rank(),
                bucket.len()
            );
        }

        self.sync_count += 1;
        Ok(())
    }
}

/// Flattens `grads`, sums them across ranks, divides by `world_size` and scatters back.
fn reduce_bucket<T: TensorElem>(
    backend: &dyn CollectiveBackend<T>,
    mut grads: Vec<&mut Tensor<T>>,
    world_size: T,
) -> Result<()> {
    let mut flat: Vec<T> = Vec::with_capacity(grads.iter().map(|g| g.numel()).sum());
    for g in &grads {
        flat.extend_from_slice(g.data());
    }

    backend.all_reduce_sum(&mut flat)?;

    let mut offset = 0;
    for g in grads.iter_mut() {
        let n = g.numel();
        for (dst, &src) in g.data_mut().iter_mut().zip(&flat[offset..offset + n]) {
            *dst = src / world_size;
        }
        offset += n;
    }
    Ok(())
}

/// Groups consecutive parameters into buckets of at most `cap` bytes.
///
/// A parameter larger than `cap` gets a bucket of its own.
fn plan_buckets(sizes: &[usize], cap: usize) -> Vec<Range<usize>> {
    let mut buckets = Vec::new();
    let mut start = 0;
    let mut current = 0;
    for (i, &size) in sizes.iter().enumerate() {
        if i > start && current + size > cap {
            buckets.push(start..i);
            start = i;
            current = 0;
        }
        current += size;
    }
    if start < sizes.len() {
        buckets.push(start..sizes.len());
    }
    buckets
}

impl<T: TensorElem> Module<T> for DistributedDataParallel<T> {
    fn forward(&self, input: &Tensor<T>) -> Result<Tensor<T>> {
        self.module.forward(input)
    }

    fn backward(&mut self, input: &Tensor<T>, grad_output: &Tensor<T>) -> Result<Tensor<T>> {
        let grad_input = self.module.backward(input, grad_output)?;
        if self.require_backward_grad_sync() {
            self.sync_gradients()?;
        }
        Ok(grad_input)
    }

    fn parameters(&self) -> Vec<&Parameter<T>> {
        self.module.parameters()
    }

    fn parameters_mut(&mut self) -> Vec<&mut Parameter<T>> {
        self.module.parameters_mut()
    }

    fn to_device(&mut self, device: Device) -> Result<()> {
        self.module.to_device(device)
    }

    fn device(&self) -> Device {
        self.module.device()
    }

    fn train(&mut self, mode: bool) {
        self.module.train(mode);
    }

    fn is_training(&self) -> bool {
        self.module.is_training()
    }

    fn no_sync(&self) -> Option<NoSyncGuard> {
        Some(DistributedDataParallel::no_sync(self))
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

impl<T: TensorElem> fmt::Debug for DistributedDataParallel<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DistributedDataParallel")
            .field("module", &self.module)
            .field("rank", &self.backend.rank())
            .field("world_size", &self.backend.world_size())
            .field("config", &self.config)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::nn::{Activation, Linear};
    use std::sync::Mutex;

    // Mock CollectiveBackend to verify calls
    struct MockBackend {
        world_size: usize,
        log: Arc<Mutex<Vec<String>>>,
    }

    impl CollectiveBackend<f32> for MockBackend {
        fn rank(&self) -> usize {
            0
        }

        fn world_size(&self) -> usize {
            self.world_size
        }

        fn all_reduce_sum(&self, data: &mut [f32]) -> Result<()> {
            self.log
                .lock()
                .unwrap()
                .push(format!("all_reduce_sum:{}", data.len()));
            // Pretend every other rank holds the same values.
            for x in data.iter_mut() {
                *x *= self.world_size as f32;
            }
            Ok(())
        }

        fn broadcast(&self, data: &mut [f32], root: usize) -> Result<()> {
            self.log
                .lock()
                .unwrap()
                .push(format!("broadcast:{}:{}", data.len(), root));
            Ok(())
        }
    }

    fn backend(world_size: usize) -> (Arc<MockBackend>, Arc<Mutex<Vec<String>>>) {
        let log = Arc::new(Mutex::new(Vec::new()));
        (
            Arc::new(MockBackend {
                world_size,
                log: log.clone(),
            }),
            log,
        )
    }

    fn linear() -> Box<dyn Module<f32>> {
        Box::new(Linear::<f32>::new(Tensor::ones(&[2, 2]), Some(Tensor::zeros(&[2]))).unwrap())
    }

    #[test]
    fn test_plan_buckets() {
        assert_eq!(plan_buckets(&[4, 4, 4], 8), vec![0..2, 2..3]);
        assert_eq!(plan_buckets(&[16, 4], 8), vec![0..1, 1..2]);
        assert_eq!(plan_buckets(&[4, 16, 4], 8), vec![0..1, 1..2, 2..3]);
        assert!(plan_buckets(&[], 8).is_empty());
    }

    #[test]
    fn test_construction_broadcasts_and_moves() {
        let (b, log) = backend(2);
        let ddp = DistributedDataParallel::new(
            linear(),
            b,
            DdpConfig::default().with_device(Device::Cuda(1)),
        )
        .unwrap();
        assert_eq!(ddp.device(), Device::Cuda(1));
        assert_eq!(*log.lock().unwrap(), vec!["broadcast:4:0", "broadcast:2:0"]);
    }

    #[test]
    fn test_backward_syncs_once_per_bucket() {
        let (b, log) = backend(2);
        let config = DdpConfig::default().with_broadcast_parameters(false);
        let mut ddp = DistributedDataParallel::new(linear(), b, config).unwrap();

        let x = Tensor::ones(&[1, 2]);
        ddp.backward(&x, &Tensor::ones(&[1, 2])).unwrap();

        // bias (2) and weight (4) share one 25 MiB bucket
        assert_eq!(*log.lock().unwrap(), vec!["all_reduce_sum:6"]);
        assert_eq!(ddp.sync_count(), 1);
        // mock sums to 2x, averaging brings it back
        let w = ddp.parameters()[0].grad.clone().unwrap();
        assert_eq!(w.data(), &[1.0, 1.0, 1.0, 1.0]);
    }

    #[test]
    fn test_small_buckets_split_calls() {
        let (b, log) = backend(2);
        let config = DdpConfig::default()
            .with_broadcast_parameters(false)
            .with_bucket_cap_mb(1e-6);
        let mut ddp = DistributedDataParallel::new(linear(), b, config).unwrap();
        ddp.backward(&Tensor::ones(&[1, 2]), &Tensor::ones(&[1, 2]))
            .unwrap();
        assert_eq!(
            *log.lock().unwrap(),
            vec!["all_reduce_sum:2", "all_reduce_sum:4"]
        );
    }

    #[test]
    fn test_no_sync_guard_nests() {
        let (b, log) = backend(2);
        let config = DdpConfig::default().with_broadcast_parameters(false);
        let mut ddp = DistributedDataParallel::new(linear(), b, config).unwrap();
        let x = Tensor::ones(&[1, 2]);
        let dy = Tensor::ones(&[1, 2]);

        let outer = ddp.no_sync();
        let inner = ddp.no_sync();
        ddp.backward(&x, &dy).unwrap();
        drop(inner);
        assert!(!ddp.require_backward_grad_sync());
        ddp.backward(&x, &dy).unwrap();
        drop(outer);
        assert!(log.lock().unwrap().is_empty());

        ddp.backward(&x, &dy).unwrap();
        assert_eq!(log.lock().unwrap().len(), 1);
        // three local backward passes accumulated before the one synchronization
        let w = ddp.parameters()[0].grad.clone().unwrap();
        assert_eq!(w.data(), &[3.0, 3.0, 3.0, 3.0]);
    }

    #[test]
    fn test_unused_parameter() {
        let (b, _) = backend(2);
        let config = DdpConfig::default().with_broadcast_parameters(false);
        let mut ddp = DistributedDataParallel::new(linear(), b, config).unwrap();
        assert!(matches!(
            ddp.sync_gradients(),
            Err(TensorError::UnusedParameter(_))
        ));

        let (b, log) = backend(2);
        let config = DdpConfig::default()
            .with_broadcast_parameters(false)
            .with_find_unused_parameters(true);
        let mut ddp = DistributedDataParallel::new(linear(), b, config).unwrap();
        ddp.sync_gradients().unwrap();
        assert_eq!(log.lock().unwrap().len(), 1);
        assert!(ddp.parameters().iter().all(|p| p.grad.is_some()));
    }

    #[test]
    fn test_delegates_mode_and_reports_no_sync() {
        let (b, _) = backend(1);
        let mut ddp = DistributedDataParallel::<f32>::new(
            Box::new(Activation::relu()),
            b,
            DdpConfig::default(),
        )
        .unwrap();
        ddp.train(false);
        assert!(!ddp.is_training());
        assert!(!ddp.module().is_training());
        assert!(Module::no_sync(&ddp).is_some());
    }

    #[test]
    fn test_config_from_json_fills_defaults() {
        let config: DdpConfig =
            serde_json::from_str(r#"{"device": {"Cuda": 0}, "find_unused_parameters": true}"#)
                .unwrap();
        assert_eq!(config.device, Device::Cuda(0));
        assert!(config.find_unused_parameters);
        assert_eq!(config.bucket_cap_mb, 25.0);
        assert!(config.broadcast_parameters);
    }
}
