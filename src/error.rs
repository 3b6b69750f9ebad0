//! Error types raised while building models and moving parameters around.

use thiserror::Error;

/// Invalid model or data configuration, detected before any forward pass runs.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConfigError {
    #[error("{name} must be positive")]
    ZeroDimension { name: &'static str },

    #[error("image size {height}x{width} is not divisible by patch size {patch_size}")]
    IndivisiblePatchGrid {
        height: usize,
        width: usize,
        patch_size: usize,
    },

    #[error("gMLP channel projection width {0} is odd and cannot be split into two gate halves")]
    OddProjectionWidth(usize),

    #[error(
        "block {index} mixes [{block_patches}, {block_dim}] sequences but the pipeline carries [{num_patches}, {embedding_dim}]"
    )]
    BlockShapeMismatch {
        index: usize,
        block_patches: usize,
        block_dim: usize,
        num_patches: usize,
        embedding_dim: usize,
    },

    #[error("dropout rate {0} must lie in [0, 1)")]
    InvalidDropout(f32),

    #[error("validation split {0} must lie in [0, 1)")]
    InvalidValidationSplit(f32),

    #[error("dataset has {images} images but {labels} labels")]
    LabelCountMismatch { images: usize, labels: usize },

    #[error("label {label} is out of range for {num_classes} classes")]
    LabelOutOfRange { label: usize, num_classes: usize },
}

/// Failure to load a parameter snapshot into a module.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ParameterError {
    #[error("parameter count mismatch: module has {expected}, snapshot has {got}")]
    CountMismatch { expected: usize, got: usize },

    #[error("shape mismatch for parameter {index}: module {expected:?} vs snapshot {got:?}")]
    ShapeMismatch {
        index: usize,
        expected: Vec<usize>,
        got: Vec<usize>,
    },
}

/// Failure of an experiment run before or after training.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ExperimentError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Parameter(#[from] ParameterError),
}
