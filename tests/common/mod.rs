#![allow(dead_code)]

use ddp_rs::distributed::CollectiveBackend;
use ddp_rs::model::{BaseModel, LogVars};
use ddp_rs::nn::{Activation, Linear, Module, ModuleDict};
use ddp_rs::optim::{OptimWrapper, OptimWrapperDict, Sgd};
use ddp_rs::tensor::{Device, Result, Tensor, TensorError};
use std::sync::{Arc, Mutex};

/// A tiny Wasserstein GAN over 2-d points.
///
/// - `gen`: `Linear [2, 2]`, maps noise to a point
/// - `aux`: ReLU on the generator output (parameter-free)
/// - `disc`: `Linear [1, 2]`, scores a point
#[derive(Debug)]
pub struct ToyGan {
    pub children: ModuleDict<f32>,
}

impl ToyGan {
    pub fn new() -> Self {
        Self {
            children: ModuleDict::new()
                .with("gen", generator())
                .with("disc", discriminator())
                .with("aux", Activation::relu()),
        }
    }

    fn child(&mut self, name: &str) -> Result<&mut (dyn Module<f32> + 'static)> {
        self.children
            .get_mut(name)
            .ok_or_else(|| TensorError::Unsupported(format!("missing child `{name}`")))
    }

    /// Device the submodules were moved to.
    fn device(&self) -> Device {
        self.children
            .get("gen")
            .map(|m| m.device())
            .unwrap_or_default()
    }

    fn batch(&self, data: &[Vec<f32>]) -> Result<Tensor<f32>> {
        Ok(Tensor::new(data.concat(), &[data.len(), 2])?.to(self.device()))
    }

    fn noise(&self, n: usize) -> Tensor<f32> {
        Tensor::ones(&[n, 2]).to(self.device())
    }
}

pub fn generator() -> Linear<f32> {
    Linear::<f32>::new(
        Tensor::new(vec![0.5, 0.0, 0.0, 0.5], &[2, 2]).unwrap(),
        Some(Tensor::zeros(&[2])),
    )
    .unwrap()
}

pub fn discriminator() -> Linear<f32> {
    Linear::<f32>::new(Tensor::new(vec![1.0, -1.0], &[1, 2]).unwrap(), None).unwrap()
}

impl BaseModel<f32> for ToyGan {
    type Sample = Vec<f32>;
    type Prediction = f32;

    fn children(&self) -> &ModuleDict<f32> {
        &self.children
    }

    fn children_mut(&mut self) -> &mut ModuleDict<f32> {
        &mut self.children
    }

    fn train_step(
        &mut self,
        data: &[Vec<f32>],
        optim_wrapper: &mut OptimWrapperDict<f32>,
    ) -> Result<LogVars<f32>> {
        let n = data.len();
        let inv_n = 1.0 / n as f32;
        let device = self.device();
        let real = self.batch(data)?;
        let z = self.noise(n);

        // --- discriminator: loss = mean(D(fake)) - mean(D(real)) ---
        let gen_out = self.child("gen")?.forward(&z)?;
        let fake = self.child("aux")?.forward(&gen_out)?;
        let both = Tensor::new([real.data(), fake.data()].concat(), &[2 * n, 2])?.to(device);
        let disc = self.child("disc")?;
        let scores = disc.forward(&both)?;
        let loss_disc = scores.data()[n..].iter().sum::<f32>() * inv_n
            - scores.data()[..n].iter().sum::<f32>() * inv_n;
        let dy: Vec<f32> = (0..2 * n).map(|i| if i < n { -inv_n } else { inv_n }).collect();
        {
            let wrapper = optim_wrapper.get_mut("disc")?;
            let _ctx = wrapper.optim_context(disc);
            disc.backward(&both, &Tensor::new(dy, &[2 * n, 1])?.to(device))?;
        }
        optim_wrapper.get_mut("disc")?.update_params(disc)?;

        // --- generator: loss = -mean(D(fake)) ---
        let disc = self.child("disc")?;
        let fake_scores = disc.forward(&fake)?;
        let loss_gen = -fake_scores.sum() * inv_n;
        // dD/dx is the discriminator weight; backprop without touching its gradients
        let w = disc.parameters()[0].data.clone();
        let grad_fake = Tensor::full(&[n, 1], -inv_n).to(device).matmul(&w)?;
        let grad_gen_out = self.child("aux")?.backward(&gen_out, &grad_fake)?;
        let generator = self.child("gen")?;
        {
            let wrapper = optim_wrapper.get_mut("gen")?;
            let _ctx = wrapper.optim_context(generator);
            generator.backward(&z, &grad_gen_out)?;
        }
        optim_wrapper.get_mut("gen")?.update_params(generator)?;

        let mut log_vars = LogVars::new();
        log_vars.insert("loss_disc".to_string(), loss_disc);
        log_vars.insert("loss_gen".to_string(), loss_gen);
        Ok(log_vars)
    }

    fn val_step(&mut self, data: &[Vec<f32>]) -> Result<Vec<f32>> {
        let real = self.batch(data)?;
        Ok(self.child("disc")?.forward(&real)?.data().to_vec())
    }

    fn test_step(&mut self, data: &[Vec<f32>]) -> Result<Vec<f32>> {
        let z = self.noise(data.len());
        let fake = self.child("gen")?.forward(&z)?;
        Ok(self.child("disc")?.forward(&fake)?.data().to_vec())
    }
}

pub fn optim_wrappers(lr: f32) -> OptimWrapperDict<f32> {
    OptimWrapperDict::new()
        .with("gen", OptimWrapper::new(Sgd::new(lr)))
        .with("disc", OptimWrapper::new(Sgd::new(lr)))
}

pub fn batch() -> Vec<Vec<f32>> {
    vec![vec![1.0, 2.0], vec![3.0, 1.0]]
}

/// Records every collective call; behaves like a world where all ranks hold identical data.
pub struct RecordingBackend {
    pub world_size: usize,
    pub log: Arc<Mutex<Vec<String>>>,
    pub fail_broadcast: bool,
}

impl RecordingBackend {
    pub fn shared(world_size: usize) -> (Arc<dyn CollectiveBackend<f32>>, Arc<Mutex<Vec<String>>>) {
        let log = Arc::new(Mutex::new(Vec::new()));
        let backend = Arc::new(Self {
            world_size,
            log: log.clone(),
            fail_broadcast: false,
        });
        (backend, log)
    }

    pub fn failing_broadcast() -> Arc<dyn CollectiveBackend<f32>> {
        Arc::new(Self {
            world_size: 2,
            log: Arc::new(Mutex::new(Vec::new())),
            fail_broadcast: true,
        })
    }
}

impl CollectiveBackend<f32> for RecordingBackend {
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
        for x in data.iter_mut() {
            *x *= self.world_size as f32;
        }
        Ok(())
    }

    fn broadcast(&self, data: &mut [f32], root: usize) -> Result<()> {
        if self.fail_broadcast {
            return Err(TensorError::Collective("peer unreachable".to_string()));
        }
        self.log
            .lock()
            .unwrap()
            .push(format!("broadcast:{}:{}", data.len(), root));
        Ok(())
    }
}
