use approx::assert_abs_diff_eq;
use ndarray::Array4;

use mlp_vision::data::ImageDataset;
use mlp_vision::models::block::{BlockKind, MixingBlock};
use mlp_vision::models::classifier::{Classifier, ClassifierConfig};
use mlp_vision::nn::Module;
use mlp_vision::tensor::Tensor;
use mlp_vision::training::{run_experiment, ExperimentConfig, TrainingDriver};

fn cifar_config(kind: BlockKind) -> ClassifierConfig {
    ClassifierConfig {
        image_size: 32,
        patch_size: 8,
        embedding_dim: 256,
        num_blocks: 4,
        num_classes: 100,
        ..ClassifierConfig::for_block(kind)
    }
}

#[test]
fn end_to_end_shapes_for_every_block_kind() {
    let images = Tensor::rand(vec![2, 32, 32, 3]);

    for kind in BlockKind::ALL {
        let model = Classifier::new(&cifar_config(kind)).unwrap();
        assert_eq!(model.blocks().len(), 4);
        assert!(model.blocks().iter().all(|b| b.kind() == kind));

        let patches = model.patch_extractor().extract(&images);
        assert_eq!(patches.shape(), vec![2, 16, 192]);

        let mut x = model.embedding().forward(&patches);
        assert_eq!(x.shape(), vec![2, 16, 256]);

        for block in model.blocks() {
            x = block.forward(&x);
            assert_eq!(x.shape(), vec![2, 16, 256]);
        }
        assert_eq!(model.encode_t(&images, false).shape(), vec![2, 16, 256]);

        let logits = model.head().forward(&x);
        assert_eq!(logits.shape(), vec![2, 100]);
        assert_eq!(model.forward_t(&images, true).shape(), vec![2, 100]);
    }
}

#[test]
fn inference_is_deterministic() {
    let model = Classifier::new(&ClassifierConfig {
        image_size: 16,
        embedding_dim: 32,
        num_blocks: 2,
        num_classes: 10,
        ..ClassifierConfig::for_block(BlockKind::FNet)
    })
    .unwrap();
    let images = Tensor::rand(vec![3, 16, 16, 3]);
    let first = model.forward(&images);
    let second = model.forward(&images);
    assert_eq!(*first.data(), *second.data());
}

/// Writes fixed parameter values instead of following gradients, so the
/// validation loss of each epoch is known in advance.
struct ScriptedDriver {
    learning_rates: Vec<f32>,
}

impl TrainingDriver for ScriptedDriver {
    fn train_epoch(
        &mut self,
        model: &Classifier,
        _train: &ImageDataset,
        _config: &ExperimentConfig,
        learning_rate: f32,
    ) -> f32 {
        let epoch = self.learning_rates.len();
        self.learning_rates.push(learning_rate);

        for p in model.parameters() {
            p.fill(0.0);
        }
        if epoch > 0 {
            // Every logit but class 0 jumps, so labels of class 0 get expensive.
            let bias = model.head().projection().bias();
            let mut values = bias.to_array();
            values.iter_mut().skip(1).for_each(|v| *v = 10.0);
            bias.assign(values).unwrap();
        }
        1.0 / (epoch + 1) as f32
    }
}

fn class_zero_dataset(n: usize) -> ImageDataset {
    let images = Array4::from_shape_fn((n, 8, 8, 3), |(i, y, x, c)| ((i + y * 3 + x * 5 + c) % 7) as f32);
    ImageDataset::new(images, vec![0; n]).unwrap()
}

#[test]
fn experiment_stops_early_and_restores_best_weights() {
    for kind in BlockKind::ALL {
        let model = Classifier::new(&ClassifierConfig {
            image_size: 8,
            patch_size: 4,
            embedding_dim: 4,
            num_blocks: 1,
            num_classes: 3,
            ..ClassifierConfig::for_block(kind)
        })
        .unwrap();

        let config = ExperimentConfig {
            batch_size: 4,
            num_epochs: 5,
            early_stopping_patience: 1,
            ..ExperimentConfig::for_block(kind)
        };
        let mut driver = ScriptedDriver {
            learning_rates: Vec::new(),
        };

        let report = run_experiment(
            &model,
            &mut driver,
            &class_zero_dataset(10),
            &class_zero_dataset(4),
            &config,
        )
        .unwrap();

        assert_eq!(report.history.len(), 2, "{}", kind);
        assert!(report.stopped_early);
        assert_eq!(report.best_epoch, Some(0));
        assert_eq!(driver.learning_rates, vec![config.learning_rate; 2]);

        // Epoch 0 left every parameter at zero, so all logits are zero.
        assert_abs_diff_eq!(report.history[0].validation.loss, 3f32.ln(), epsilon = 1e-5);
        assert!(report.history[1].validation.loss > 10.0);

        assert!(model.parameters().iter().all(|p| p.data().iter().all(|&v| v == 0.0)));
        assert_abs_diff_eq!(report.test.loss, 3f32.ln(), epsilon = 1e-5);
        assert_abs_diff_eq!(report.test.accuracy, 1.0);
        assert_abs_diff_eq!(report.test.top5_accuracy, 1.0);
    }
}

/// Raises the head bias of every class but 0 by 0.1 per epoch, so the
/// validation loss on class-0 labels gets worse each epoch.
struct RisingBiasDriver {
    epochs: usize,
}

impl TrainingDriver for RisingBiasDriver {
    fn train_epoch(
        &mut self,
        model: &Classifier,
        _train: &ImageDataset,
        _config: &ExperimentConfig,
        _learning_rate: f32,
    ) -> f32 {
        for p in model.parameters() {
            p.fill(0.0);
        }
        let bias = model.head().projection().bias();
        let mut values = bias.to_array();
        values.iter_mut().skip(1).for_each(|v| *v = 0.1 * self.epochs as f32);
        bias.assign(values).unwrap();
        self.epochs += 1;
        0.0
    }
}

#[test]
fn experiment_without_early_stop_keeps_last_weights() {
    let model = Classifier::new(&ClassifierConfig {
        image_size: 8,
        patch_size: 4,
        embedding_dim: 4,
        num_blocks: 1,
        num_classes: 3,
        ..ClassifierConfig::for_block(BlockKind::Gmlp)
    })
    .unwrap();
    let config = ExperimentConfig {
        batch_size: 4,
        num_epochs: 3,
        early_stopping_patience: 10,
        restore_best_weights: true,
        ..ExperimentConfig::for_block(BlockKind::Gmlp)
    };
    let mut driver = RisingBiasDriver { epochs: 0 };

    let report = run_experiment(
        &model,
        &mut driver,
        &class_zero_dataset(10),
        &class_zero_dataset(4),
        &config,
    )
    .unwrap();

    assert_eq!(report.history.len(), 3);
    assert!(!report.stopped_early);
    assert_eq!(report.best_epoch, Some(0));

    let bias = model.head().projection().bias().to_array();
    let expected = [0.0, 0.2, 0.2];
    for (&got, &want) in bias.iter().zip(&expected) {
        assert_abs_diff_eq!(got, want, epsilon = 1e-6);
    }
    assert!(report.test.loss > 3f32.ln());
}

#[test]
fn experiment_rejects_labels_outside_the_head() {
    let model = Classifier::new(&ClassifierConfig {
        image_size: 8,
        patch_size: 4,
        embedding_dim: 4,
        num_blocks: 1,
        num_classes: 3,
        ..ClassifierConfig::default()
    })
    .unwrap();
    let images = Array4::zeros((2, 8, 8, 3));
    let bad = ImageDataset::new(images, vec![0, 5]).unwrap();
    let mut driver = ScriptedDriver {
        learning_rates: Vec::new(),
    };

    let result = run_experiment(&model, &mut driver, &bad, &bad, &ExperimentConfig::default());
    assert!(result.is_err());
    assert!(driver.learning_rates.is_empty());
}

#[test]
fn custom_stacks_must_match_the_pipeline() {
    let config = cifar_config(BlockKind::Gmlp);
    let mut block_config = config.block_config();
    block_config.embedding_dim = 128;
    let block = MixingBlock::new(BlockKind::Gmlp, &block_config).unwrap();
    assert!(Classifier::from_blocks(&config, vec![block]).is_err());
}
