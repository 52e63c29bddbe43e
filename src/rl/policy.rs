//! Q-network using the Burn framework.

use burn::module::Module;
use burn::nn::{Linear, LinearConfig, Relu};
use burn::prelude::*;

/// Network topology for the Q-value approximator.
#[derive(Debug, Clone)]
pub struct QNetworkConfig {
    /// Observation vector length.
    pub obs_size: usize,
    /// Number of discrete actions (output width).
    pub action_count: usize,
    /// Hidden layer widths, applied in order with ReLU between them.
    pub hidden_sizes: Vec<usize>,
}

impl QNetworkConfig {
    pub fn new(obs_size: usize, action_count: usize) -> Self {
        Self {
            obs_size,
            action_count,
            hidden_sizes: vec![128, 128, 64],
        }
    }
}

/// MLP mapping an observation to one Q-value per action. The output layer
/// is linear; values are unbounded estimates, not probabilities.
#[derive(Module, Debug)]
pub struct QNetwork<B: Backend> {
    hidden: Vec<Linear<B>>,
    output: Linear<B>,
    activation: Relu,
}

impl<B: Backend> QNetwork<B> {
    pub fn new(device: &B::Device, config: &QNetworkConfig) -> Self {
        let mut hidden = Vec::with_capacity(config.hidden_sizes.len());
        let mut in_size = config.obs_size;
        for &width in &config.hidden_sizes {
            hidden.push(LinearConfig::new(in_size, width).init(device));
            in_size = width;
        }
        let output = LinearConfig::new(in_size, config.action_count).init(device);

        Self {
            hidden,
            output,
            activation: Relu::new(),
        }
    }

    /// Forward pass: [batch, obs_size] → [batch, action_count].
    pub fn forward(&self, obs: Tensor<B, 2>) -> Tensor<B, 2> {
        let mut x = obs;
        for layer in &self.hidden {
            x = self.activation.forward(layer.forward(x));
        }
        self.output.forward(x)
    }
}
