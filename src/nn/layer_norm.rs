//! Layer Normalization module.

use crate::nn::Module;
use crate::tensor::Tensor;
use tracing::debug;

pub struct LayerNorm {
    gamma: Tensor, // Learnable gain
    beta: Tensor,  // Learnable bias
    epsilon: f32,
}

impl LayerNorm {
    /// Creates a new LayerNorm module normalizing over a last axis of size `dim`.
    pub fn new(dim: usize, epsilon: f32) -> Self {
        debug!(dim, epsilon, "initializing LayerNorm");
        Self {
            gamma: Tensor::ones(vec![dim]),
            beta: Tensor::zeros(vec![dim]),
            epsilon,
        }
    }

    pub fn dim(&self) -> usize {
        self.gamma.shape()[0]
    }
}

impl Module for LayerNorm {
    fn forward_t(&self, input: &Tensor, _train: bool) -> Tensor {
        // Normalize over the last dimension (the channel axis).
        let axis = input.ndim() - 1;

        let mean = input.mean_axis(axis, true);
        let variance = input.var_axis(axis, true);

        // (x - mean) / sqrt(variance + epsilon)
        let normalized = (input - &mean) / &((&variance + self.epsilon).sqrt());

        &(&self.gamma * &normalized) + &self.beta
    }

    fn parameters(&self) -> Vec<Tensor> {
        vec![self.gamma.clone(), self.beta.clone()]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn normalizes_each_row_over_channels() {
        let norm = LayerNorm::new(4, 1e-6);
        let x = Tensor::new(
            vec![1.0, 2.0, 3.0, 4.0, 10.0, 10.0, 10.0, 14.0],
            vec![1, 2, 4],
        );
        let y = norm.forward(&x);
        for row in y.data().rows() {
            let mean: f32 = row.iter().sum::<f32>() / 4.0;
            let var: f32 = row.iter().map(|v| (v - mean).powi(2)).sum::<f32>() / 4.0;
            assert_abs_diff_eq!(mean, 0.0, epsilon = 1e-5);
            assert_abs_diff_eq!(var, 1.0, epsilon = 1e-3);
        }
    }

    #[test]
    fn affine_parameters_rescale() {
        let norm = LayerNorm::new(2, 1e-6);
        norm.parameters()[0].fill(2.0);
        norm.parameters()[1].fill(1.0);
        let y = norm.forward(&Tensor::new(vec![-1.0, 1.0], vec![1, 2]));
        assert_abs_diff_eq!(y.data()[[0, 0]], -1.0, epsilon = 1e-4);
        assert_abs_diff_eq!(y.data()[[0, 1]], 3.0, epsilon = 1e-4);
    }
}
