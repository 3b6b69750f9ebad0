//! Attention-free image classifiers: MLP-Mixer, FNet and gMLP.
//!
//! Images are cut into patches, embedded, passed through a stack of mixing
//! blocks and mean-pooled into class logits. Everything runs on a small
//! `ndarray`-backed [`tensor::Tensor`]; gradient computation and parameter
//! updates are left to an external [`training::TrainingDriver`].
//!
//! ```no_run
//! use mlp_vision::models::block::BlockKind;
//! use mlp_vision::models::classifier::{Classifier, ClassifierConfig};
//! use mlp_vision::nn::Module;
//! use mlp_vision::tensor::Tensor;
//!
//! let config = ClassifierConfig {
//!     image_size: 32,
//!     ..ClassifierConfig::for_block(BlockKind::Gmlp)
//! };
//! let model = Classifier::new(&config)?;
//! let logits = model.forward(&Tensor::rand(vec![2, 32, 32, 3]));
//! assert_eq!(logits.shape(), vec![2, 100]);
//! # Ok::<(), mlp_vision::error::ConfigError>(())
//! ```

pub mod data;
pub mod error;
pub mod loss;
pub mod metrics;
pub mod models;
pub mod nn;
pub mod tensor;
pub mod training;

pub use error::{ConfigError, ExperimentError, ParameterError};
pub use models::block::{BlockKind, MixingBlock};
pub use models::classifier::{Classifier, ClassifierConfig};
pub use nn::Module;
pub use tensor::Tensor;
