//! FNet block: a transformer-style block whose attention is replaced by the
//! real part of a 2D Fourier transform over the (patch, channel) plane.

use tracing::debug;

use super::BlockConfig;
use crate::error::ConfigError;
use crate::nn::feed_forward::{DropoutPlacement, FeedForward};
use crate::nn::fourier::FourierTransform;
use crate::nn::layer_norm::LayerNorm;
use crate::nn::Module;
use crate::tensor::Tensor;

pub struct FNetBlock {
    config: BlockConfig,
    fourier: FourierTransform,
    ffn: FeedForward,
    normalize1: LayerNorm,
    normalize2: LayerNorm,
}

impl FNetBlock {
    pub fn new(config: &BlockConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        debug!(?config, "initializing FNet block");
        let e = config.embedding_dim;
        Ok(Self {
            config: *config,
            fourier: FourierTransform::new(config.num_patches, e),
            ffn: FeedForward::new(e, e, e, config.dropout_rate, DropoutPlacement::Hidden)?,
            normalize1: LayerNorm::new(e, config.layer_norm_eps),
            normalize2: LayerNorm::new(e, config.layer_norm_eps),
        })
    }

    pub fn config(&self) -> &BlockConfig {
        &self.config
    }

    pub fn ffn(&self) -> &FeedForward {
        &self.ffn
    }
}

impl Module for FNetBlock {
    fn forward_t(&self, input: &Tensor, train: bool) -> Tensor {
        let x = self.fourier.forward(input);
        let x = self.normalize1.forward_t(&(&x + input), train);

        let x_ffn = self.ffn.forward_t(&x, train);
        self.normalize2.forward_t(&(&x + &x_ffn), train)
    }

    fn parameters(&self) -> Vec<Tensor> {
        let mut params = self.ffn.parameters();
        params.extend(self.normalize1.parameters());
        params.extend(self.normalize2.parameters());
        params
    }
}
