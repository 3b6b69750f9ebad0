//! gMLP block with a Spatial Gating Unit.
//!
//! Channels are projected up, split into a pass-through half `u` and a gate
//! half `v`, and `v` is projected across patches before gating `u`
//! elementwise. The spatial projection is the only place patches interact.

use tracing::debug;

use super::BlockConfig;
use crate::error::ConfigError;
use crate::nn::dropout::Dropout;
use crate::nn::layer_norm::LayerNorm;
use crate::nn::linear::Linear;
use crate::nn::Module;
use crate::tensor::Tensor;

/// Projects the gate half across patches and multiplies it into the other half.
pub struct SpatialGatingUnit {
    normalize: LayerNorm,
    /// N -> N over the patch axis; bias starts at one so the gate opens as identity.
    spatial_projection: Linear,
}

impl SpatialGatingUnit {
    pub fn new(num_patches: usize, gate_dim: usize, layer_norm_eps: f32) -> Self {
        Self {
            normalize: LayerNorm::new(gate_dim, layer_norm_eps),
            spatial_projection: Linear::with_bias_init(num_patches, num_patches, 1.0),
        }
    }

    pub fn spatial_projection(&self) -> &Linear {
        &self.spatial_projection
    }

    /// `[B, N, 2K] -> [B, N, K]`: first half `u`, second half `v`, returns `u * proj(v)`.
    pub fn forward_t(&self, input: &Tensor, train: bool) -> Tensor {
        let (u, v) = input.split_halves(2);
        let v = self.normalize.forward_t(&v, train);
        let v_channels = v.transpose(1, 2);
        let v_projected = self.spatial_projection.forward_t(&v_channels, train).transpose(1, 2);
        &u * &v_projected
    }

    pub fn parameters(&self) -> Vec<Tensor> {
        let mut params = self.normalize.parameters();
        params.extend(self.spatial_projection.parameters());
        params
    }
}

pub struct GmlpBlock {
    config: BlockConfig,
    normalize: LayerNorm,
    channel_projection1: Linear,
    dropout: Dropout,
    gating: SpatialGatingUnit,
    channel_projection2: Linear,
}

impl GmlpBlock {
    /// Block with the standard `2 * embedding_dim` channel projection.
    pub fn new(config: &BlockConfig) -> Result<Self, ConfigError> {
        Self::with_projection_dim(config, config.embedding_dim * 2)
    }

    /// Block whose first channel projection is `projection_dim` wide. The width
    /// must be even: half of it passes through, half becomes the gate.
    pub fn with_projection_dim(config: &BlockConfig, projection_dim: usize) -> Result<Self, ConfigError> {
        config.validate()?;
        if projection_dim == 0 {
            return Err(ConfigError::ZeroDimension { name: "projection_dim" });
        }
        if projection_dim % 2 != 0 {
            return Err(ConfigError::OddProjectionWidth(projection_dim));
        }
        debug!(?config, projection_dim, "initializing gMLP block");

        let gate_dim = projection_dim / 2;
        Ok(Self {
            config: *config,
            normalize: LayerNorm::new(config.embedding_dim, config.layer_norm_eps),
            channel_projection1: Linear::new(config.embedding_dim, projection_dim),
            dropout: Dropout::new(config.dropout_rate)?,
            gating: SpatialGatingUnit::new(config.num_patches, gate_dim, config.layer_norm_eps),
            channel_projection2: Linear::new(gate_dim, config.embedding_dim),
        })
    }

    pub fn config(&self) -> &BlockConfig {
        &self.config
    }

    pub fn projection_dim(&self) -> usize {
        self.channel_projection1.out_features()
    }

    pub fn gating(&self) -> &SpatialGatingUnit {
        &self.gating
    }
}

impl Module for GmlpBlock {
    fn forward_t(&self, input: &Tensor, train: bool) -> Tensor {
        let x = self.normalize.forward_t(input, train);
        let x_projected = self.channel_projection1.forward_t(&x, train).gelu();
        let x_projected = self.dropout.forward_t(&x_projected, train);

        let x_spatial = self.gating.forward_t(&x_projected, train);
        let x_out = self.channel_projection2.forward_t(&x_spatial, train);
        &x_out + input
    }

    fn parameters(&self) -> Vec<Tensor> {
        let mut params = self.normalize.parameters();
        params.extend(self.channel_projection1.parameters());
        params.extend(self.gating.parameters());
        params.extend(self.channel_projection2.parameters());
        params
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn preserves_shape() {
        let block = GmlpBlock::new(&BlockConfig::new(16, 32, 0.2)).unwrap();
        assert_eq!(block.projection_dim(), 64);
        let x = Tensor::rand(vec![2, 16, 32]);
        assert_eq!(block.forward(&x).shape(), vec![2, 16, 32]);
    }

    #[test]
    fn odd_projection_width_is_rejected() {
        let config = BlockConfig::new(4, 8, 0.1);
        assert_eq!(
            GmlpBlock::with_projection_dim(&config, 15).err(),
            Some(ConfigError::OddProjectionWidth(15))
        );
        assert!(GmlpBlock::with_projection_dim(&config, 12).is_ok());
    }

    #[test]
    fn split_halves_have_equal_width() {
        let x = Tensor::rand(vec![2, 4, 16]);
        let (u, v) = x.split_halves(2);
        assert_eq!(u.shape(), vec![2, 4, 8]);
        assert_eq!(v.shape(), vec![2, 4, 8]);
        assert_eq!(u.shape()[2] + v.shape()[2], 16);
    }

    #[test]
    fn unit_gate_passes_u_through() {
        let gating = SpatialGatingUnit::new(4, 3, 1e-6);
        assert!(gating.spatial_projection().bias().data().iter().all(|&b| b == 1.0));
        gating.spatial_projection().weights().fill(0.0);

        let x = Tensor::rand(vec![2, 4, 6]);
        let gated = gating.forward_t(&x, false);
        let u = x.narrow(2, 0, 3);
        assert_eq!(gated.shape(), vec![2, 4, 3]);
        for (got, want) in gated.data().iter().zip(u.data().iter()) {
            assert_abs_diff_eq!(*got, *want, epsilon = 1e-7);
        }
    }

    #[test]
    fn residual_is_the_block_input() {
        let block = GmlpBlock::new(&BlockConfig::new(4, 6, 0.0)).unwrap();
        for p in block.channel_projection2.parameters() {
            p.fill(0.0);
        }
        let x = Tensor::rand(vec![1, 4, 6]);
        assert_eq!(*block.forward(&x).data(), *x.data());
    }

    #[test]
    fn narrower_projection_maps_back_to_embedding_width() {
        let block = GmlpBlock::with_projection_dim(&BlockConfig::new(4, 6, 0.0), 4).unwrap();
        let y = block.forward(&Tensor::rand(vec![3, 4, 6]));
        assert_eq!(y.shape(), vec![3, 4, 6]);
    }
}
