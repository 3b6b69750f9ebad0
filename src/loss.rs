//! Loss functions.

use crate::tensor::Tensor;

/// Sparse categorical cross-entropy between raw logits and class indices.
///
/// # Arguments
/// * `logits` - Unnormalized scores. Shape `[..., num_classes]`.
/// * `targets` - One class index per row of `logits`.
///
/// Leading dimensions of `logits` are flattened, so `[B, C]` and `[B, T, C]`
/// both work as long as `targets` has one entry per flattened row.
pub fn cross_entropy_loss(logits: &Tensor, targets: &[usize]) -> f32 {
    let logits_shape = logits.shape();
    let num_classes = logits_shape[logits_shape.len() - 1];

    let n: usize = logits_shape[..logits_shape.len() - 1].iter().product();
    let logits_2d = logits.reshape(vec![n, num_classes]);

    logits_2d.log_softmax(1).nll_loss(targets)
}
