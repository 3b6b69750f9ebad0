//! MLP-Mixer block.
//!
//! A token-mixing MLP runs across patches (shared over channels), then a
//! channel-mixing MLP runs across channels (shared over patches). Both are
//! pre-normalized and wrapped in residual connections.

use tracing::debug;

use super::BlockConfig;
use crate::error::ConfigError;
use crate::nn::feed_forward::{DropoutPlacement, FeedForward};
use crate::nn::layer_norm::LayerNorm;
use crate::nn::Module;
use crate::tensor::Tensor;

pub struct MlpMixerBlock {
    config: BlockConfig,
    /// N -> N -> N, applied to `[batch, embedding_dim, num_patches]`.
    token_mixing: FeedForward,
    /// E -> N -> E, applied to `[batch, num_patches, embedding_dim]`.
    channel_mixing: FeedForward,
    /// Used before both MLPs.
    normalize: LayerNorm,
}

impl MlpMixerBlock {
    pub fn new(config: &BlockConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        debug!(?config, "initializing MLP-Mixer block");
        let n = config.num_patches;
        let e = config.embedding_dim;
        Ok(Self {
            config: *config,
            token_mixing: FeedForward::new(n, n, n, config.dropout_rate, DropoutPlacement::Output)?,
            channel_mixing: FeedForward::new(e, n, e, config.dropout_rate, DropoutPlacement::Output)?,
            normalize: LayerNorm::new(e, config.layer_norm_eps),
        })
    }

    pub fn config(&self) -> &BlockConfig {
        &self.config
    }

    pub fn token_mixing(&self) -> &FeedForward {
        &self.token_mixing
    }

    pub fn channel_mixing(&self) -> &FeedForward {
        &self.channel_mixing
    }
}

impl Module for MlpMixerBlock {
    fn forward_t(&self, input: &Tensor, train: bool) -> Tensor {
        let x = self.normalize.forward_t(input, train);

        // [B, N, E] -> [B, E, N]: patches become the feature axis.
        let x_channels = x.transpose(1, 2);
        let mixed_tokens = self.token_mixing.forward_t(&x_channels, train).transpose(1, 2);
        let x = &mixed_tokens + input;

        let x_patches = self.normalize.forward_t(&x, train);
        let mixed_channels = self.channel_mixing.forward_t(&x_patches, train);
        &x + &mixed_channels
    }

    fn parameters(&self) -> Vec<Tensor> {
        let mut params = self.token_mixing.parameters();
        params.extend(self.channel_mixing.parameters());
        params.extend(self.normalize.parameters());
        params
    }
}
