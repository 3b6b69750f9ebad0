//! Patch embedding: projects flattened patches to the model width.

use crate::nn::embedding::Embedding;
use crate::nn::linear::Linear;
use crate::nn::Module;
use crate::tensor::Tensor;
use tracing::debug;

/// Maps `[batch, num_patches, patch_dim]` to `[batch, num_patches, embedding_dim]`
/// with one dense layer shared by all patches, optionally adding a learned
/// vector per patch position.
pub struct PatchEmbedding {
    projection: Linear,
    positions: Option<Embedding>,
    position_ids: Vec<usize>,
}

impl PatchEmbedding {
    pub fn new(num_patches: usize, patch_dim: usize, embedding_dim: usize, positional_encoding: bool) -> Self {
        debug!(num_patches, patch_dim, embedding_dim, positional_encoding, "initializing PatchEmbedding");
        Self {
            projection: Linear::new(patch_dim, embedding_dim),
            positions: positional_encoding.then(|| Embedding::new(num_patches, embedding_dim)),
            position_ids: (0..num_patches).collect(),
        }
    }

    pub fn embedding_dim(&self) -> usize {
        self.projection.out_features()
    }

    pub fn projection(&self) -> &Linear {
        &self.projection
    }

    pub fn positions(&self) -> Option<&Embedding> {
        self.positions.as_ref()
    }
}

impl Module for PatchEmbedding {
    fn forward_t(&self, input: &Tensor, train: bool) -> Tensor {
        let x = self.projection.forward_t(input, train);
        match &self.positions {
            // [num_patches, embedding_dim] broadcasts over the batch axis.
            Some(positions) => &x + &positions.lookup(&self.position_ids),
            None => x,
        }
    }

    fn parameters(&self) -> Vec<Tensor> {
        let mut params = self.projection.parameters();
        if let Some(positions) = &self.positions {
            params.extend(positions.parameters());
        }
        params
    }
}
