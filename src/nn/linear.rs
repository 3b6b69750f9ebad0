//! A basic linear layer.

use crate::nn::Module;
use crate::tensor::Tensor;
use tracing::debug;

pub struct Linear {
    weights: Tensor,
    bias: Tensor,
}

impl Linear {
    /// Random weights, zero bias.
    pub fn new(in_features: usize, out_features: usize) -> Self {
        Self::with_bias_init(in_features, out_features, 0.0)
    }

    /// Random weights, every bias entry set to `bias_init`.
    pub fn with_bias_init(in_features: usize, out_features: usize, bias_init: f32) -> Self {
        debug!(in_features, out_features, bias_init, "initializing Linear layer");
        Self {
            weights: Tensor::rand(vec![in_features, out_features]),
            bias: Tensor::full(vec![out_features], bias_init),
        }
    }

    pub fn in_features(&self) -> usize {
        self.weights.shape()[0]
    }

    pub fn out_features(&self) -> usize {
        self.weights.shape()[1]
    }

    pub fn weights(&self) -> &Tensor {
        &self.weights
    }

    pub fn bias(&self) -> &Tensor {
        &self.bias
    }
}

impl Module for Linear {
    /// Applies `x W + b` over the last axis of a 2D or 3D input.
    fn forward_t(&self, input: &Tensor, _train: bool) -> Tensor {
        let x = input.matmul(&self.weights);
        &x + &self.bias
    }

    fn parameters(&self) -> Vec<Tensor> {
        vec![self.weights.clone(), self.bias.clone()]
    }
}
