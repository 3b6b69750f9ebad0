//! Inverted dropout.

use crate::error::ConfigError;
use crate::nn::Module;
use crate::tensor::Tensor;
use rand::Rng;

pub struct Dropout {
    rate: f32,
}

impl Dropout {
    pub fn new(rate: f32) -> Result<Self, ConfigError> {
        if !(0.0..1.0).contains(&rate) {
            return Err(ConfigError::InvalidDropout(rate));
        }
        Ok(Self { rate })
    }

    pub fn rate(&self) -> f32 {
        self.rate
    }
}

impl Module for Dropout {
    /// Zeroes each element with probability `rate` and scales survivors by
    /// `1 / (1 - rate)`. Identity outside training.
    fn forward_t(&self, input: &Tensor, train: bool) -> Tensor {
        if !train || self.rate == 0.0 {
            return input.clone();
        }

        let mut rng = rand::thread_rng();
        let scale = 1.0 / (1.0 - self.rate);
        let data = input.data().mapv(|x| {
            if rng.gen::<f32>() < self.rate {
                0.0
            } else {
                x * scale
            }
        });
        Tensor::from_data(data)
    }

    fn parameters(&self) -> Vec<Tensor> {
        vec![]
    }
}
