use std::fs;
use std::path::PathBuf;
use std::time::Instant;

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use ndarray::{Array2, Array4, Axis, Ix1, Ix2};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::Deserialize;
use tracing::info;
use tracing_subscriber::EnvFilter;

use mlp_vision::data::ImageDataset;
use mlp_vision::training::{run_experiment, ExperimentConfig, TrainingDriver};
use mlp_vision::{BlockKind, Classifier, ClassifierConfig, Module};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum BlockArg {
    Mixer,
    Fnet,
    Gmlp,
    All,
}

impl BlockArg {
    fn kinds(self) -> Vec<BlockKind> {
        match self {
            BlockArg::Mixer => vec![BlockKind::MlpMixer],
            BlockArg::Fnet => vec![BlockKind::FNet],
            BlockArg::Gmlp => vec![BlockKind::Gmlp],
            BlockArg::All => BlockKind::ALL.to_vec(),
        }
    }
}

/// Builds MLP-Mixer, FNet and gMLP classifiers and runs a short experiment
/// on synthetic images.
#[derive(Debug, Parser)]
#[command(name = "mlp_image_classification")]
struct Args {
    /// Which mixing block to use.
    #[arg(long, value_enum, default_value = "all")]
    block: BlockArg,

    /// JSON file with `model` and `experiment` overrides.
    #[arg(long)]
    config: Option<PathBuf>,

    #[arg(long, default_value_t = 512)]
    train_samples: usize,

    #[arg(long, default_value_t = 128)]
    test_samples: usize,

    #[arg(long)]
    batch_size: Option<usize>,

    #[arg(long)]
    num_epochs: Option<usize>,

    #[arg(long, default_value_t = 42)]
    seed: u64,
}

/// Optional overrides read from `--config`. Fields left out keep the
/// per-block defaults.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct FileConfig {
    model: Option<ClassifierOverrides>,
    experiment: Option<ExperimentConfig>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct ClassifierOverrides {
    image_size: Option<usize>,
    patch_size: Option<usize>,
    embedding_dim: Option<usize>,
    num_blocks: Option<usize>,
    num_classes: Option<usize>,
    dropout_rate: Option<f32>,
}

impl ClassifierOverrides {
    fn apply(&self, config: &mut ClassifierConfig) {
        if let Some(v) = self.image_size {
            config.image_size = v;
        }
        if let Some(v) = self.patch_size {
            config.patch_size = v;
        }
        if let Some(v) = self.embedding_dim {
            config.embedding_dim = v;
        }
        if let Some(v) = self.num_blocks {
            config.num_blocks = v;
        }
        if let Some(v) = self.num_classes {
            config.num_classes = v;
        }
        if let Some(v) = self.dropout_rate {
            config.dropout_rate = v;
        }
    }
}

/// Trains only the classifier's final dense layer with plain SGD and weight
/// decay, treating the pooled encoder output as fixed features.
struct HeadOnlySgd {
    rng: StdRng,
}

impl TrainingDriver for HeadOnlySgd {
    fn train_epoch(
        &mut self,
        model: &Classifier,
        train: &ImageDataset,
        config: &ExperimentConfig,
        learning_rate: f32,
    ) -> f32 {
        let mut shuffled = train.clone();
        shuffled.shuffle(&mut self.rng);

        let projection = model.head().projection();
        let mut total_loss = 0.0;
        for batch in shuffled.batches(config.batch_size) {
            let features = model
                .encode_t(&batch.images, false)
                .mean_axis(1, false)
                .to_array()
                .into_dimensionality::<Ix2>()
                .expect("pooled features are 2D");
            let mut weights = projection
                .weights()
                .to_array()
                .into_dimensionality::<Ix2>()
                .expect("dense weights are 2D");
            let mut bias = projection
                .bias()
                .to_array()
                .into_dimensionality::<Ix1>()
                .expect("dense bias is 1D");

            let mut grad = features.dot(&weights) + &bias;
            let n = batch.labels.len() as f32;
            for (mut row, &label) in grad.axis_iter_mut(Axis(0)).zip(&batch.labels) {
                let max = row.fold(f32::NEG_INFINITY, |m, &v| m.max(v));
                row.mapv_inplace(|v| (v - max).exp());
                let sum = row.sum();
                row.mapv_inplace(|v| v / sum);
                total_loss -= row[label].max(f32::MIN_POSITIVE).ln();
                row[label] -= 1.0;
                row.mapv_inplace(|v| v / n);
            }

            let grad_weights: Array2<f32> = features.t().dot(&grad);
            weights.zip_mut_with(&grad_weights, |w, &g| {
                *w -= learning_rate * (g + config.weight_decay * *w);
            });
            bias.zip_mut_with(&grad.sum_axis(Axis(0)), |b, &g| *b -= learning_rate * g);

            projection
                .weights()
                .assign(weights.into_dyn())
                .expect("weights keep their shape");
            projection
                .bias()
                .assign(bias.into_dyn())
                .expect("bias keeps its shape");
        }
        total_loss / train.len().max(1) as f32
    }
}

/// Images whose brightness and one colour channel depend on the label, plus noise.
fn synthetic_dataset(rng: &mut StdRng, n: usize, config: &ClassifierConfig) -> Result<ImageDataset> {
    let labels: Vec<usize> = (0..n).map(|_| rng.gen_range(0..config.num_classes)).collect();
    let size = config.image_size;
    let mut images = Array4::<f32>::zeros((n, size, size, config.channels));
    for (mut image, &label) in images.axis_iter_mut(Axis(0)).zip(&labels) {
        let level = label as f32 / config.num_classes as f32;
        let channel = label % config.channels;
        for ((_, _, c), pixel) in image.indexed_iter_mut() {
            let signal = if c == channel { level } else { 0.5 * level };
            *pixel = signal + rng.gen_range(-0.1f32..0.1);
        }
    }
    Ok(ImageDataset::new(images, labels)?)
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args = Args::parse();
    let file_config = match &args.config {
        Some(path) => {
            let text = fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
            serde_json::from_str(&text).with_context(|| format!("parsing {}", path.display()))?
        }
        None => FileConfig::default(),
    };

    for kind in args.block.kinds() {
        let mut model_config = ClassifierConfig {
            image_size: 32,
            embedding_dim: 64,
            num_classes: 10,
            ..ClassifierConfig::for_block(kind)
        };
        if let Some(overrides) = &file_config.model {
            overrides.apply(&mut model_config);
        }

        let mut experiment = match &file_config.experiment {
            Some(experiment) => experiment.clone(),
            None => ExperimentConfig {
                num_epochs: 5,
                batch_size: 64,
                learning_rate: 0.05,
                ..ExperimentConfig::for_block(kind)
            },
        };
        if let Some(batch_size) = args.batch_size {
            experiment.batch_size = batch_size;
        }
        if let Some(num_epochs) = args.num_epochs {
            experiment.num_epochs = num_epochs;
        }

        info!(block = %kind, "--- {} ---", kind);
        let model = Classifier::new(&model_config).with_context(|| format!("building {kind} classifier"))?;
        info!(
            patches = model.config().num_patches(),
            patch_dim = model.config().patch_dim(),
            parameters = model.num_parameters(),
            "model ready"
        );

        let mut rng = StdRng::seed_from_u64(args.seed);
        let train = synthetic_dataset(&mut rng, args.train_samples, &model_config)?;
        let test = synthetic_dataset(&mut rng, args.test_samples, &model_config)?;

        let mut driver = HeadOnlySgd { rng };
        let start = Instant::now();
        let report = run_experiment(&model, &mut driver, &train, &test, &experiment)?;
        info!(
            epochs = report.history.len(),
            best_epoch = report.best_epoch.map(|e| e + 1),
            stopped_early = report.stopped_early,
            elapsed = ?start.elapsed(),
            "experiment finished"
        );
        println!("{}", serde_json::to_string_pretty(&report)?);
    }

    Ok(())
}
