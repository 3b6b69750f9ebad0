//! Patch-based classifiers and the three mixing blocks they stack.

pub mod block;
pub mod classifier;
pub mod fnet;
pub mod gmlp;
pub mod mixer;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Hyperparameters shared by every mixing block of a model.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BlockConfig {
    pub num_patches: usize,
    pub embedding_dim: usize,
    pub dropout_rate: f32,
    pub layer_norm_eps: f32,
}

impl BlockConfig {
    pub fn new(num_patches: usize, embedding_dim: usize, dropout_rate: f32) -> Self {
        Self {
            num_patches,
            embedding_dim,
            dropout_rate,
            layer_norm_eps: 1e-6,
        }
    }

    pub(crate) fn validate(&self) -> Result<(), ConfigError> {
        if self.num_patches == 0 {
            return Err(ConfigError::ZeroDimension { name: "num_patches" });
        }
        if self.embedding_dim == 0 {
            return Err(ConfigError::ZeroDimension { name: "embedding_dim" });
        }
        if !(0.0..1.0).contains(&self.dropout_rate) {
            return Err(ConfigError::InvalidDropout(self.dropout_rate));
        }
        Ok(())
    }
}
