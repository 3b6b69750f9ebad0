use serde::{Deserialize, Serialize};
use std::fmt;

use super::fnet::FNetBlock;
use super::gmlp::GmlpBlock;
use super::mixer::MlpMixerBlock;
use super::BlockConfig;
use crate::error::ConfigError;
use crate::nn::Module;
use crate::tensor::Tensor;

/// Which mixing block a classifier stacks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BlockKind {
    MlpMixer,
    #[serde(rename = "fnet")]
    FNet,
    Gmlp,
}

impl BlockKind {
    pub const ALL: [BlockKind; 3] = [BlockKind::MlpMixer, BlockKind::FNet, BlockKind::Gmlp];
}

impl fmt::Display for BlockKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            BlockKind::MlpMixer => "MLP-Mixer",
            BlockKind::FNet => "FNet",
            BlockKind::Gmlp => "gMLP",
        };
        f.write_str(name)
    }
}

/// One `[B, N, E] -> [B, N, E]` block of any of the three variants.
pub enum MixingBlock {
    MlpMixer(MlpMixerBlock),
    FNet(FNetBlock),
    Gmlp(GmlpBlock),
}

impl MixingBlock {
    pub fn new(kind: BlockKind, config: &BlockConfig) -> Result<Self, ConfigError> {
        Ok(match kind {
            BlockKind::MlpMixer => MixingBlock::MlpMixer(MlpMixerBlock::new(config)?),
            BlockKind::FNet => MixingBlock::FNet(FNetBlock::new(config)?),
            BlockKind::Gmlp => MixingBlock::Gmlp(GmlpBlock::new(config)?),
        })
    }

    pub fn kind(&self) -> BlockKind {
        match self {
            MixingBlock::MlpMixer(_) => BlockKind::MlpMixer,
            MixingBlock::FNet(_) => BlockKind::FNet,
            MixingBlock::Gmlp(_) => BlockKind::Gmlp,
        }
    }

    pub fn config(&self) -> &BlockConfig {
        match self {
            MixingBlock::MlpMixer(block) => block.config(),
            MixingBlock::FNet(block) => block.config(),
            MixingBlock::Gmlp(block) => block.config(),
        }
    }
}

impl Module for MixingBlock {
    fn forward_t(&self, input: &Tensor, train: bool) -> Tensor {
        match self {
            MixingBlock::MlpMixer(block) => block.forward_t(input, train),
            MixingBlock::FNet(block) => block.forward_t(input, train),
            MixingBlock::Gmlp(block) => block.forward_t(input, train),
        }
    }

    fn parameters(&self) -> Vec<Tensor> {
        match self {
            MixingBlock::MlpMixer(block) => block.parameters(),
            MixingBlock::FNet(block) => block.parameters(),
            MixingBlock::Gmlp(block) => block.parameters(),
        }
    }
}

impl From<MlpMixerBlock> for MixingBlock {
    fn from(block: MlpMixerBlock) -> Self {
        MixingBlock::MlpMixer(block)
    }
}

impl From<FNetBlock> for MixingBlock {
    fn from(block: FNetBlock) -> Self {
        MixingBlock::FNet(block)
    }
}

impl From<GmlpBlock> for MixingBlock {
    fn from(block: GmlpBlock) -> Self {
        MixingBlock::Gmlp(block)
    }
}
