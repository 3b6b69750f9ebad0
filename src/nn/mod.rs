pub mod dropout;
pub mod embedding;
pub mod feed_forward;
pub mod fourier;
pub mod layer_norm;
pub mod linear;
pub mod patch_embedding;
pub mod patches;

use crate::error::ParameterError;
use crate::tensor::Tensor;
use ndarray::ArrayD;

/// A trait for a neural network module.
pub trait Module {
    /// Performs a forward pass. `train` switches stochastic layers such as dropout on.
    fn forward_t(&self, input: &Tensor, train: bool) -> Tensor;

    /// Performs an inference-mode forward pass.
    fn forward(&self, input: &Tensor) -> Tensor {
        self.forward_t(input, false)
    }

    /// Returns handles to all learnable parameters, in a stable order.
    fn parameters(&self) -> Vec<Tensor>;

    /// Total number of scalar parameters.
    fn num_parameters(&self) -> usize {
        self.parameters().iter().map(Tensor::len).sum()
    }
}

/// Copies the current value of every parameter of `module`.
pub fn snapshot<M: Module + ?Sized>(module: &M) -> Vec<ArrayD<f32>> {
    module.parameters().iter().map(Tensor::to_array).collect()
}

/// Writes a snapshot taken by [`snapshot`] back into `module`.
///
/// The whole snapshot is validated before any parameter is touched, so a
/// mismatched snapshot leaves the module unchanged.
pub fn restore<M: Module + ?Sized>(module: &M, state: &[ArrayD<f32>]) -> Result<(), ParameterError> {
    let params = module.parameters();
    if params.len() != state.len() {
        return Err(ParameterError::CountMismatch {
            expected: params.len(),
            got: state.len(),
        });
    }

    for (index, (p, data)) in params.iter().zip(state).enumerate() {
        if p.shape() != data.shape() {
            return Err(ParameterError::ShapeMismatch {
                index,
                expected: p.shape(),
                got: data.shape().to_vec(),
            });
        }
    }

    for (p, data) in params.iter().zip(state) {
        p.assign(data.clone())?;
    }
    Ok(())
}
