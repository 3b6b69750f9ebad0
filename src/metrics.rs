//! Metrics for evaluating classifier outputs.

use crate::tensor::Tensor;
use ndarray::Ix2;

/// Index of the largest logit in each row. Ties go to the lowest index.
pub fn argmax(logits: &Tensor) -> Vec<usize> {
    let data = logits.data();
    let rows = data
        .view()
        .into_dimensionality::<Ix2>()
        .unwrap_or_else(|_| panic!("argmax expects [batch, classes] logits, got {:?}", data.shape()));
    rows.outer_iter()
        .map(|row| {
            row.iter()
                .enumerate()
                .fold(0usize, |best, (i, &v)| if v > row[best] { i } else { best })
        })
        .collect()
}

/// Fraction of rows whose [`argmax`] is the label.
pub fn accuracy(logits: &Tensor, labels: &[usize]) -> f32 {
    assert_eq!(logits.shape()[0], labels.len(), "one label per logits row");
    if labels.is_empty() {
        return 0.0;
    }
    let hits = argmax(logits)
        .into_iter()
        .zip(labels)
        .filter(|&(pred, &label)| pred == label)
        .count();
    hits as f32 / labels.len() as f32
}

/// Fraction of rows whose label is among the `k` highest logits.
///
/// A label counts as inside the top k when fewer than `k` classes score
/// strictly higher than it, so classes tied at the boundary are all inside.
pub fn top_k_accuracy(logits: &Tensor, labels: &[usize], k: usize) -> f32 {
    let data = logits.data();
    let rows = data
        .view()
        .into_dimensionality::<Ix2>()
        .unwrap_or_else(|_| panic!("top_k_accuracy expects [batch, classes] logits, got {:?}", data.shape()));
    assert_eq!(rows.nrows(), labels.len(), "one label per logits row");
    if labels.is_empty() {
        return 0.0;
    }

    let hits = rows
        .outer_iter()
        .zip(labels)
        .filter(|(row, label)| {
            let label = **label;
            let target = row[label];
            let ahead = row.iter().filter(|&&v| v > target).count();
            ahead < k
        })
        .count();
    hits as f32 / labels.len() as f32
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    fn logits() -> Tensor {
        Tensor::new(
            vec![
                0.1, 0.7, 0.2, //
                0.5, 0.3, 0.9, //
                0.4, 0.4, 0.1, //
            ],
            vec![3, 3],
        )
    }

    #[test]
    fn argmax_breaks_ties_low() {
        assert_eq!(argmax(&logits()), vec![1, 2, 0]);
    }

    #[test]
    fn accuracy_counts_top_one() {
        assert_abs_diff_eq!(accuracy(&logits(), &[1, 0, 0]), 2.0 / 3.0, epsilon = 1e-6);
    }

    #[test]
    fn top_k_widens_the_window() {
        let labels = [2, 0, 1];
        // Row 2 ties its label with class 0 at the top.
        assert_abs_diff_eq!(top_k_accuracy(&logits(), &labels, 1), 1.0 / 3.0, epsilon = 1e-6);
        assert_abs_diff_eq!(top_k_accuracy(&logits(), &labels, 2), 1.0, epsilon = 1e-6);
        assert_abs_diff_eq!(top_k_accuracy(&logits(), &labels, 5), 1.0, epsilon = 1e-6);
    }

    #[test]
    fn ties_at_the_boundary_count_as_inside() {
        let flat = Tensor::zeros(vec![2, 10]);
        assert_abs_diff_eq!(top_k_accuracy(&flat, &[9, 0], 5), 1.0, epsilon = 1e-6);
        assert_abs_diff_eq!(top_k_accuracy(&flat, &[9, 0], 1), 1.0, epsilon = 1e-6);
        // Top-1 accuracy still resolves ties to the lowest index.
        assert_abs_diff_eq!(accuracy(&flat, &[9, 0]), 0.5, epsilon = 1e-6);
    }
}
