//! A two-layer feed-forward network with a GELU between the layers.

use crate::error::ConfigError;
use crate::nn::dropout::Dropout;
use crate::nn::linear::Linear;
use crate::nn::Module;
use crate::tensor::Tensor;
use tracing::debug;

/// Where the network's dropout sits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DropoutPlacement {
    /// Dense -> GELU -> Dropout -> Dense
    Hidden,
    /// Dense -> GELU -> Dense -> Dropout
    Output,
}

pub struct FeedForward {
    linear1: Linear,
    linear2: Linear,
    dropout: Dropout,
    placement: DropoutPlacement,
}

impl FeedForward {
    pub fn new(
        in_dim: usize,
        hidden_dim: usize,
        out_dim: usize,
        dropout_rate: f32,
        placement: DropoutPlacement,
    ) -> Result<Self, ConfigError> {
        debug!(in_dim, hidden_dim, out_dim, ?placement, "initializing FeedForward network");
        Ok(Self {
            linear1: Linear::new(in_dim, hidden_dim),
            linear2: Linear::new(hidden_dim, out_dim),
            dropout: Dropout::new(dropout_rate)?,
            placement,
        })
    }

    pub fn linear1(&self) -> &Linear {
        &self.linear1
    }

    pub fn linear2(&self) -> &Linear {
        &self.linear2
    }
}

impl Module for FeedForward {
    fn forward_t(&self, input: &Tensor, train: bool) -> Tensor {
        let x = self.linear1.forward_t(input, train).gelu();
        match self.placement {
            DropoutPlacement::Hidden => {
                let x = self.dropout.forward_t(&x, train);
                self.linear2.forward_t(&x, train)
            }
            DropoutPlacement::Output => {
                let x = self.linear2.forward_t(&x, train);
                self.dropout.forward_t(&x, train)
            }
        }
    }

    fn parameters(&self) -> Vec<Tensor> {
        let mut params = self.linear1.parameters();
        params.extend(self.linear2.parameters());
        params
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn maps_last_axis_through_hidden_width() {
        let ff = FeedForward::new(6, 4, 3, 0.2, DropoutPlacement::Output).unwrap();
        let y = ff.forward(&Tensor::rand(vec![2, 5, 6]));
        assert_eq!(y.shape(), vec![2, 5, 3]);
        assert_eq!(ff.num_parameters(), 6 * 4 + 4 + 4 * 3 + 3);
    }

    #[test]
    fn zero_weights_give_zero_output() {
        let ff = FeedForward::new(3, 3, 3, 0.0, DropoutPlacement::Hidden).unwrap();
        for p in ff.parameters() {
            p.fill(0.0);
        }
        let y = ff.forward(&Tensor::rand(vec![1, 2, 3]));
        assert!(y.data().iter().all(|&v| v == 0.0));
    }
}
