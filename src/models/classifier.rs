//! Image classifier: patches -> embedding -> mixing blocks -> pooled logits.

use serde::{Deserialize, Serialize};
use tracing::info;

use super::block::{BlockKind, MixingBlock};
use super::BlockConfig;
use crate::error::ConfigError;
use crate::nn::dropout::Dropout;
use crate::nn::linear::Linear;
use crate::nn::patch_embedding::PatchEmbedding;
use crate::nn::patches::PatchExtractor;
use crate::nn::Module;
use crate::tensor::Tensor;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClassifierConfig {
    pub block: BlockKind,
    /// Side of the square input images, after any resizing done upstream.
    pub image_size: usize,
    pub channels: usize,
    pub patch_size: usize,
    pub embedding_dim: usize,
    pub num_blocks: usize,
    pub num_classes: usize,
    pub dropout_rate: f32,
    pub layer_norm_eps: f32,
    pub positional_encoding: bool,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            block: BlockKind::MlpMixer,
            image_size: 64,
            channels: 3,
            patch_size: 8,
            embedding_dim: 256,
            num_blocks: 4,
            num_classes: 100,
            dropout_rate: 0.2,
            layer_norm_eps: 1e-6,
            positional_encoding: false,
        }
    }
}

impl ClassifierConfig {
    /// Defaults for `kind`. FNet adds positional embeddings since the Fourier
    /// transform mixes positions without any learned notion of where a patch is.
    pub fn for_block(kind: BlockKind) -> Self {
        Self {
            block: kind,
            positional_encoding: kind == BlockKind::FNet,
            ..Self::default()
        }
    }

    pub fn num_patches(&self) -> usize {
        let side = self.image_size / self.patch_size.max(1);
        side * side
    }

    pub fn patch_dim(&self) -> usize {
        self.patch_size * self.patch_size * self.channels
    }

    pub fn block_config(&self) -> BlockConfig {
        BlockConfig {
            num_patches: self.num_patches(),
            embedding_dim: self.embedding_dim,
            dropout_rate: self.dropout_rate,
            layer_norm_eps: self.layer_norm_eps,
        }
    }
}

/// Mean over patches, dropout, then a dense layer to raw logits.
pub struct ClassifierHead {
    dropout: Dropout,
    projection: Linear,
}

impl ClassifierHead {
    pub fn new(embedding_dim: usize, num_classes: usize, dropout_rate: f32) -> Result<Self, ConfigError> {
        if num_classes == 0 {
            return Err(ConfigError::ZeroDimension { name: "num_classes" });
        }
        Ok(Self {
            dropout: Dropout::new(dropout_rate)?,
            projection: Linear::new(embedding_dim, num_classes),
        })
    }

    pub fn projection(&self) -> &Linear {
        &self.projection
    }
}

impl Module for ClassifierHead {
    /// `[B, N, E] -> [B, num_classes]`
    fn forward_t(&self, input: &Tensor, train: bool) -> Tensor {
        let representation = input.mean_axis(1, false);
        let representation = self.dropout.forward_t(&representation, train);
        self.projection.forward_t(&representation, train)
    }

    fn parameters(&self) -> Vec<Tensor> {
        self.projection.parameters()
    }
}

pub struct Classifier {
    config: ClassifierConfig,
    patches: PatchExtractor,
    embedding: PatchEmbedding,
    blocks: Vec<MixingBlock>,
    head: ClassifierHead,
}

impl Classifier {
    /// Builds `config.num_blocks` blocks of kind `config.block`.
    pub fn new(config: &ClassifierConfig) -> Result<Self, ConfigError> {
        if config.num_blocks == 0 {
            return Err(ConfigError::ZeroDimension { name: "num_blocks" });
        }
        // Checked up front so the block constructors see a valid patch grid.
        PatchExtractor::new(config.image_size, config.image_size, config.channels, config.patch_size)?;

        let block_config = config.block_config();
        let blocks = (0..config.num_blocks)
            .map(|_| MixingBlock::new(config.block, &block_config))
            .collect::<Result<Vec<_>, _>>()?;
        Self::from_blocks(config, blocks)
    }

    /// Assembles a classifier around an existing block stack. Every block must
    /// mix `[num_patches, embedding_dim]` sequences as implied by `config`;
    /// `config.block` and `config.num_blocks` are overwritten from the stack.
    pub fn from_blocks(config: &ClassifierConfig, blocks: Vec<MixingBlock>) -> Result<Self, ConfigError> {
        if config.embedding_dim == 0 {
            return Err(ConfigError::ZeroDimension { name: "embedding_dim" });
        }
        let patches = PatchExtractor::new(config.image_size, config.image_size, config.channels, config.patch_size)?;
        let num_patches = patches.num_patches();

        for (index, block) in blocks.iter().enumerate() {
            let block_config = block.config();
            if block_config.num_patches != num_patches || block_config.embedding_dim != config.embedding_dim {
                return Err(ConfigError::BlockShapeMismatch {
                    index,
                    block_patches: block_config.num_patches,
                    block_dim: block_config.embedding_dim,
                    num_patches,
                    embedding_dim: config.embedding_dim,
                });
            }
        }

        let mut config = config.clone();
        config.num_blocks = blocks.len();
        if let Some(first) = blocks.first() {
            config.block = first.kind();
        }

        let embedding = PatchEmbedding::new(
            num_patches,
            patches.patch_dim(),
            config.embedding_dim,
            config.positional_encoding,
        );
        let head = ClassifierHead::new(config.embedding_dim, config.num_classes, config.dropout_rate)?;

        let model = Self {
            config,
            patches,
            embedding,
            blocks,
            head,
        };
        info!(
            block = %model.config.block,
            num_blocks = model.blocks.len(),
            num_patches,
            embedding_dim = model.config.embedding_dim,
            num_classes = model.config.num_classes,
            parameters = model.num_parameters(),
            "built classifier"
        );
        Ok(model)
    }

    pub fn config(&self) -> &ClassifierConfig {
        &self.config
    }

    pub fn patch_extractor(&self) -> &PatchExtractor {
        &self.patches
    }

    pub fn embedding(&self) -> &PatchEmbedding {
        &self.embedding
    }

    pub fn blocks(&self) -> &[MixingBlock] {
        &self.blocks
    }

    pub fn head(&self) -> &ClassifierHead {
        &self.head
    }

    /// Images `[B, H, W, C]` to the `[B, N, E]` sequence leaving the last block.
    pub fn encode_t(&self, images: &Tensor, train: bool) -> Tensor {
        let patches = self.patches.extract(images);
        let mut x = self.embedding.forward_t(&patches, train);
        for block in &self.blocks {
            x = block.forward_t(&x, train);
        }
        x
    }
}

impl Module for Classifier {
    /// Images `[B, H, W, C]` to logits `[B, num_classes]`.
    fn forward_t(&self, images: &Tensor, train: bool) -> Tensor {
        let x = self.encode_t(images, train);
        self.head.forward_t(&x, train)
    }

    fn parameters(&self) -> Vec<Tensor> {
        let mut params = self.embedding.parameters();
        for block in &self.blocks {
            params.extend(block.parameters());
        }
        params.extend(self.head.parameters());
        params
    }
}
