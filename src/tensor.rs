//! A Tensor: a cheap-to-clone handle over an n-dimensional `f32` array.
//!
//! Parameters are shared between a module and whoever updates them (an external
//! training driver, a checkpoint restore), so the array sits behind
//! `Rc<RefCell<_>>` and every clone of a tensor sees writes made through any other.

use crate::error::ParameterError;
use ndarray::{Array, ArrayD, ArrayViewD, Axis, Ix2, IxDyn, Slice};
use rand::distributions::{Distribution, Uniform};
use std::cell::{Ref, RefCell};
use std::fmt;
use std::ops::{Add, Div, Mul, Sub};
use std::rc::Rc;

/// sqrt(2 / pi), used by the tanh approximation of GELU.
const GELU_COEFF: f32 = 0.797_884_6;

/// The public Tensor struct, a smart pointer to the underlying data.
/// Cloning a Tensor only copies the Rc pointer.
#[derive(Debug, Clone)]
pub struct Tensor {
    inner: Rc<RefCell<ArrayD<f32>>>,
}

impl Tensor {
    /// Creates a new tensor from raw row-major data and a shape.
    pub fn new(data: Vec<f32>, shape: Vec<usize>) -> Self {
        let data = Array::from_shape_vec(IxDyn(&shape), data)
            .unwrap_or_else(|e| panic!("Data size does not match shape {:?}: {}", shape, e));
        Self::from_data(data)
    }

    /// Wraps an existing ndarray::ArrayD.
    pub fn from_data(data: ArrayD<f32>) -> Self {
        Self {
            inner: Rc::new(RefCell::new(data)),
        }
    }

    pub fn zeros(shape: Vec<usize>) -> Self {
        Self::from_data(Array::zeros(IxDyn(&shape)))
    }

    pub fn ones(shape: Vec<usize>) -> Self {
        Self::full(shape, 1.0)
    }

    pub fn full(shape: Vec<usize>, value: f32) -> Self {
        Self::from_data(Array::from_elem(IxDyn(&shape), value))
    }

    /// Creates a new tensor with small uniform random values for weight initialization.
    pub fn rand(shape: Vec<usize>) -> Self {
        let num_elements: usize = shape.iter().product();
        let mut rng = rand::thread_rng();
        let dist = Uniform::new(-0.02, 0.02);
        let data_vec: Vec<f32> = (0..num_elements).map(|_| dist.sample(&mut rng)).collect();
        Self::new(data_vec, shape)
    }

    // --- Accessors ---

    pub fn shape(&self) -> Vec<usize> {
        self.inner.borrow().shape().to_vec()
    }

    pub fn ndim(&self) -> usize {
        self.inner.borrow().ndim()
    }

    /// Number of scalar elements.
    pub fn len(&self) -> usize {
        self.inner.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn data(&self) -> Ref<'_, ArrayD<f32>> {
        self.inner.borrow()
    }

    /// Copies the data out of the handle.
    pub fn to_array(&self) -> ArrayD<f32> {
        self.inner.borrow().clone()
    }

    /// True when both handles point at the same storage.
    pub fn shares_storage(&self, other: &Tensor) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }

    // --- Parameter writes ---

    /// Replaces the data in place. Every clone of this handle observes the new values.
    pub fn assign(&self, data: ArrayD<f32>) -> Result<(), ParameterError> {
        let current = self.shape();
        if current != data.shape() {
            return Err(ParameterError::ShapeMismatch {
                index: 0,
                expected: current,
                got: data.shape().to_vec(),
            });
        }
        *self.inner.borrow_mut() = data;
        Ok(())
    }

    pub fn fill(&self, value: f32) {
        self.inner.borrow_mut().fill(value);
    }

    // --- Elementwise operations ---

    /// Applies `f` to every element, producing a new tensor.
    pub fn map(&self, f: impl Fn(f32) -> f32) -> Tensor {
        Tensor::from_data(self.data().mapv(f))
    }

    pub fn sqrt(&self) -> Tensor {
        self.map(f32::sqrt)
    }

    /// GELU with the tanh approximation.
    pub fn gelu(&self) -> Tensor {
        self.map(|x| 0.5 * x * (1.0 + (GELU_COEFF * (x + 0.044715 * x * x * x)).tanh()))
    }

    // --- Reductions ---

    pub fn sum_axis(&self, axis: usize, keep_dims: bool) -> Tensor {
        let ax = Axis(axis);
        let summed = self.data().sum_axis(ax);
        if keep_dims {
            Tensor::from_data(summed.insert_axis(ax))
        } else {
            Tensor::from_data(summed)
        }
    }

    pub fn mean_axis(&self, axis: usize, keep_dims: bool) -> Tensor {
        let n = self.shape()[axis] as f32;
        self.sum_axis(axis, keep_dims) / n
    }

    /// Population variance along an axis.
    pub fn var_axis(&self, axis: usize, keep_dims: bool) -> Tensor {
        let mean = self.mean_axis(axis, true);
        let centered = self - &mean;
        (&centered * &centered).mean_axis(axis, keep_dims)
    }

    // --- Shape manipulation ---

    /// Reshapes the tensor. Copies data into standard layout first if needed.
    pub fn reshape(&self, new_shape: Vec<usize>) -> Tensor {
        Tensor::from_data(reshape_standard(self.data().view(), &new_shape))
    }

    /// Swaps two axes. The result is materialized in standard layout so that
    /// later reshapes read elements in logical order.
    pub fn transpose(&self, axis1: usize, axis2: usize) -> Tensor {
        let data = self.data();
        let mut view = data.view();
        view.swap_axes(axis1, axis2);
        Tensor::from_data(view.as_standard_layout().into_owned())
    }

    /// Takes `len` consecutive entries of `axis` starting at `start`.
    pub fn narrow(&self, axis: usize, start: usize, len: usize) -> Tensor {
        let size = self.shape()[axis];
        assert!(
            start + len <= size,
            "narrow {}..{} out of bounds for axis {} of size {}",
            start,
            start + len,
            axis,
            size
        );
        let data = self.data();
        let view = data.slice_axis(Axis(axis), Slice::from(start..start + len));
        Tensor::from_data(view.as_standard_layout().into_owned())
    }

    /// Splits the given axis into two equal halves.
    pub fn split_halves(&self, axis: usize) -> (Tensor, Tensor) {
        let size = self.shape()[axis];
        assert!(size % 2 == 0, "cannot halve axis {} of odd size {}", axis, size);
        let half = size / 2;
        (self.narrow(axis, 0, half), self.narrow(axis, half, half))
    }

    // --- Linear algebra ---

    /// Matrix multiplication for `[M, K] x [K, N]` and `[B, M, K] x [K, N]`.
    pub fn matmul(&self, other: &Tensor) -> Tensor {
        let self_shape = self.shape();
        let other_shape = other.shape();
        let other_data = other.data();
        let rhs = other_data
            .view()
            .into_dimensionality::<Ix2>()
            .unwrap_or_else(|_| panic!("Matmul right operand must be 2D, got {:?}", other_shape));

        match self_shape.len() {
            2 => {
                if self_shape[1] != other_shape[0] {
                    panic!("Incompatible dimensions for matmul: {:?} and {:?}", self_shape, other_shape);
                }
                let lhs_data = self.data();
                let lhs = lhs_data
                    .view()
                    .into_dimensionality::<Ix2>()
                    .unwrap_or_else(|e| panic!("Matmul left operand is not 2D: {}", e));
                Tensor::from_data(lhs.dot(&rhs).into_dyn())
            }
            3 => {
                let (batch_size, m, k) = (self_shape[0], self_shape[1], self_shape[2]);
                let n = other_shape[1];
                if k != other_shape[0] {
                    panic!("Incompatible dimensions for 3D x 2D matmul: {:?} and {:?}", self_shape, other_shape);
                }
                let flat = reshape_standard(self.data().view(), &[batch_size * m, k])
                    .into_dimensionality::<Ix2>()
                    .unwrap_or_else(|e| panic!("Flattened matmul operand is not 2D: {}", e));
                let result = flat.dot(&rhs).into_dyn();
                Tensor::from_data(reshape_standard(result.view(), &[batch_size, m, n]))
            }
            _ => panic!("Matmul not implemented for shapes {:?} and {:?}", self_shape, other_shape),
        }
    }

    /// Gathers slices along `axis` at the given indices, stacking them on a new leading axis.
    pub fn gather(&self, indices: &[usize], axis: usize) -> Tensor {
        let data = self.data();
        let slices: Vec<_> = indices
            .iter()
            .map(|&idx| data.index_axis(Axis(axis), idx))
            .collect();
        let stacked = ndarray::stack(Axis(0), &slices)
            .unwrap_or_else(|e| panic!("Failed to gather indices {:?}: {}", indices, e));
        Tensor::from_data(stacked)
    }

    // --- Classification helpers ---

    /// log_softmax using the log-sum-exp trick.
    pub fn log_softmax(&self, axis: usize) -> Tensor {
        let ax = Axis(axis);
        let data = self.data();

        let max_val = data.map_axis(ax, |view| view.iter().fold(f32::NEG_INFINITY, |a, &b| a.max(b)));
        let shifted = &*data - &max_val.clone().insert_axis(ax);
        let log_sum_exp = shifted.mapv(f32::exp).sum_axis(ax).mapv(f32::ln) + max_val;

        Tensor::from_data(&*data - &log_sum_exp.insert_axis(ax))
    }

    /// Mean negative log likelihood of `targets` under log-probabilities `[N, C]`.
    pub fn nll_loss(&self, targets: &[usize]) -> f32 {
        let data = self.data();
        assert_eq!(data.ndim(), 2, "nll_loss input must be 2D");
        let batch_size = data.shape()[0];
        assert_eq!(
            batch_size,
            targets.len(),
            "nll_loss got {} rows but {} targets",
            batch_size,
            targets.len()
        );
        if batch_size == 0 {
            return 0.0;
        }

        let total: f32 = targets
            .iter()
            .enumerate()
            .map(|(i, &target)| -data[[i, target]])
            .sum();
        total / batch_size as f32
    }
}

/// Copies `view` into a standard-layout array of `shape`, panicking if the sizes differ.
fn reshape_standard(view: ArrayViewD<'_, f32>, shape: &[usize]) -> ArrayD<f32> {
    let original_shape = view.shape().to_vec();
    view.as_standard_layout()
        .into_owned()
        .into_shape(IxDyn(shape))
        .unwrap_or_else(|e| {
            panic!(
                "Failed to reshape tensor from {:?} to {:?}: {}",
                original_shape, shape, e
            )
        })
}

// --- Operator Overloads ---
// Binary operators broadcast both operands the way ndarray does.

impl Add for &Tensor {
    type Output = Tensor;
    fn add(self, rhs: &Tensor) -> Tensor {
        Tensor::from_data(&*self.data() + &*rhs.data())
    }
}
impl<'a> Add<&'a Tensor> for Tensor { type Output = Tensor; fn add(self, rhs: &'a Tensor) -> Tensor { &self + rhs } }
impl Add<f32> for &Tensor {
    type Output = Tensor;
    fn add(self, rhs: f32) -> Tensor {
        Tensor::from_data(&*self.data() + rhs)
    }
}
impl Add<f32> for Tensor { type Output = Tensor; fn add(self, rhs: f32) -> Tensor { &self + rhs } }

impl Sub for &Tensor {
    type Output = Tensor;
    fn sub(self, rhs: &Tensor) -> Tensor {
        Tensor::from_data(&*self.data() - &*rhs.data())
    }
}
impl<'a> Sub<&'a Tensor> for Tensor { type Output = Tensor; fn sub(self, rhs: &'a Tensor) -> Tensor { &self - rhs } }

impl Mul for &Tensor {
    type Output = Tensor;
    fn mul(self, rhs: &Tensor) -> Tensor {
        Tensor::from_data(&*self.data() * &*rhs.data())
    }
}
impl<'a> Mul<&'a Tensor> for Tensor { type Output = Tensor; fn mul(self, rhs: &'a Tensor) -> Tensor { &self * rhs } }
impl Mul<f32> for &Tensor {
    type Output = Tensor;
    fn mul(self, rhs: f32) -> Tensor {
        Tensor::from_data(&*self.data() * rhs)
    }
}
impl Mul<f32> for Tensor { type Output = Tensor; fn mul(self, rhs: f32) -> Tensor { &self * rhs } }

impl Div for &Tensor {
    type Output = Tensor;
    fn div(self, rhs: &Tensor) -> Tensor {
        Tensor::from_data(&*self.data() / &*rhs.data())
    }
}
impl<'a> Div<&'a Tensor> for Tensor { type Output = Tensor; fn div(self, rhs: &'a Tensor) -> Tensor { &self / rhs } }
impl Div<f32> for &Tensor {
    type Output = Tensor;
    fn div(self, rhs: f32) -> Tensor {
        Tensor::from_data(&*self.data() / rhs)
    }
}
impl Div<f32> for Tensor { type Output = Tensor; fn div(self, rhs: f32) -> Tensor { &self / rhs } }

impl fmt::Display for Tensor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Tensor(shape: {:?})\n{}", self.shape(), self.data())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    fn sequence(shape: Vec<usize>) -> Tensor {
        let n: usize = shape.iter().product();
        Tensor::new((0..n).map(|i| i as f32).collect(), shape)
    }

    #[test]
    fn transpose_round_trip_is_identity() {
        let x = Tensor::rand(vec![2, 5, 7]);
        let back = x.transpose(1, 2).transpose(1, 2);
        assert_eq!(back.shape(), vec![2, 5, 7]);
        assert_eq!(*back.data(), *x.data());
    }

    #[test]
    fn transpose_moves_elements() {
        let x = sequence(vec![1, 2, 3]);
        let t = x.transpose(1, 2);
        assert_eq!(t.shape(), vec![1, 3, 2]);
        assert_eq!(t.data()[[0, 2, 1]], x.data()[[0, 1, 2]]);
        // Standard layout: the flattened order follows the new logical order.
        let flat: Vec<f32> = t.reshape(vec![6]).data().iter().copied().collect();
        assert_eq!(flat, vec![0.0, 3.0, 1.0, 4.0, 2.0, 5.0]);
    }

    #[test]
    fn batched_matmul_after_transpose_matches_per_sample_product() {
        let x = sequence(vec![2, 3, 4]).transpose(1, 2); // [2, 4, 3]
        let w = sequence(vec![3, 2]);
        let y = x.matmul(&w);
        assert_eq!(y.shape(), vec![2, 4, 2]);

        let xd = x.data();
        let wd = w.data();
        for b in 0..2 {
            for i in 0..4 {
                for j in 0..2 {
                    let expected: f32 = (0..3).map(|k| xd[[b, i, k]] * wd[[k, j]]).sum();
                    assert_abs_diff_eq!(y.data()[[b, i, j]], expected, epsilon = 1e-4);
                }
            }
        }
    }

    #[test]
    fn clones_share_writes() {
        let p = Tensor::zeros(vec![2, 2]);
        let handle = p.clone();
        handle.fill(3.0);
        assert!(p.shares_storage(&handle));
        assert!(p.data().iter().all(|&v| v == 3.0));
    }

    #[test]
    fn assign_rejects_wrong_shape() {
        let p = Tensor::zeros(vec![2, 2]);
        let err = p.assign(ArrayD::zeros(IxDyn(&[3]))).unwrap_err();
        assert!(matches!(err, ParameterError::ShapeMismatch { .. }));
    }

    #[test]
    fn split_halves_keeps_order() {
        let x = sequence(vec![1, 1, 4]);
        let (u, v) = x.split_halves(2);
        assert_eq!(u.data().iter().copied().collect::<Vec<_>>(), vec![0.0, 1.0]);
        assert_eq!(v.data().iter().copied().collect::<Vec<_>>(), vec![2.0, 3.0]);
    }

    #[test]
    fn gelu_reference_values() {
        let x = Tensor::new(vec![-1.0, 0.0, 1.0, 2.0], vec![4]);
        let y = x.gelu();
        let y = y.data();
        assert_abs_diff_eq!(y[[0]], -0.158_808, epsilon = 1e-5);
        assert_abs_diff_eq!(y[[1]], 0.0, epsilon = 1e-7);
        assert_abs_diff_eq!(y[[2]], 0.841_192, epsilon = 1e-5);
        assert_abs_diff_eq!(y[[3]], 1.954_598, epsilon = 1e-5);
    }

    #[test]
    fn log_softmax_rows_exponentiate_to_one() {
        let logits = Tensor::new(vec![1.0, 2.0, 3.0, 10.0, 0.0, -10.0], vec![2, 3]);
        let log_probs = logits.log_softmax(1);
        for row in log_probs.data().outer_iter() {
            let total: f32 = row.iter().map(|v| v.exp()).sum();
            assert_abs_diff_eq!(total, 1.0, epsilon = 1e-5);
        }
    }

    #[test]
    fn var_axis_is_population_variance() {
        let x = Tensor::new(vec![1.0, 2.0, 3.0, 4.0], vec![1, 4]);
        let var = x.var_axis(1, false);
        assert_abs_diff_eq!(var.data()[[0]], 1.25, epsilon = 1e-6);
    }
}
