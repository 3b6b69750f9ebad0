//! Embedding module.

use crate::nn::Module;
use crate::tensor::Tensor;
use tracing::debug;

/// A table of `num_embeddings` learned vectors of width `embed_dim`.
pub struct Embedding {
    weights: Tensor,
}

impl Embedding {
    pub fn new(num_embeddings: usize, embed_dim: usize) -> Self {
        debug!(num_embeddings, embed_dim, "initializing Embedding table");
        Self {
            weights: Tensor::rand(vec![num_embeddings, embed_dim]),
        }
    }

    pub fn num_embeddings(&self) -> usize {
        self.weights.shape()[0]
    }

    pub fn embed_dim(&self) -> usize {
        self.weights.shape()[1]
    }

    pub fn weights(&self) -> &Tensor {
        &self.weights
    }

    /// Rows of the table at `indices`: `[indices.len(), embed_dim]`.
    pub fn lookup(&self, indices: &[usize]) -> Tensor {
        self.weights.gather(indices, 0)
    }
}

impl Module for Embedding {
    /// Input is a 1D `[seq_len]` or 2D `[batch_size, seq_len]` tensor of indices.
    fn forward_t(&self, input: &Tensor, _train: bool) -> Tensor {
        let input_shape = input.shape();
        let indices: Vec<usize> = input.data().iter().map(|&id| id as usize).collect();

        match input_shape.len() {
            1 => self.lookup(&indices),
            2 => self
                .lookup(&indices)
                .reshape(vec![input_shape[0], input_shape[1], self.embed_dim()]),
            _ => panic!(
                "Embedding input must be a 1D or 2D tensor of indices, but got shape {:?}",
                input_shape
            ),
        }
    }

    fn parameters(&self) -> Vec<Tensor> {
        vec![self.weights.clone()]
    }
}
