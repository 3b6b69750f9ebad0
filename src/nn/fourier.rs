//! Parameter-free 2D Fourier mixing.
//!
//! For every sample the `[rows, cols]` plane is transformed with a standard
//! forward DFT along both axes and only the real part is kept:
//!
//! `Y[k, l] = Re( sum_n sum_m x[n, m] * exp(-2 pi i (k n / rows + l m / cols)) )`
//!
//! Dropping the imaginary part loses information, and the FNet model is built
//! on that loss.

use ndarray::{Array2, Array3, Ix3};
use rustfft::num_complex::Complex32;
use rustfft::{Fft, FftPlanner};
use std::fmt;
use std::sync::Arc;
use tracing::debug;

use crate::tensor::Tensor;

/// Real part of a 2D FFT over the last two axes of a `[batch, rows, cols]` tensor.
/// Plans are built once for a fixed plane size.
pub struct FourierTransform {
    rows: usize,
    cols: usize,
    row_fft: Arc<dyn Fft<f32>>,
    column_fft: Arc<dyn Fft<f32>>,
}

impl FourierTransform {
    pub fn new(rows: usize, cols: usize) -> Self {
        debug!(rows, cols, "planning 2D FFT");
        let mut planner = FftPlanner::new();
        Self {
            rows,
            cols,
            // Transforms along a row run over the `cols` entries of that row.
            row_fft: planner.plan_fft_forward(cols),
            column_fft: planner.plan_fft_forward(rows),
        }
    }

    /// Complex spectrum of one `[rows, cols]` plane.
    pub fn spectrum(&self, plane: &Array2<f32>) -> Array2<Complex32> {
        assert_eq!(
            plane.dim(),
            (self.rows, self.cols),
            "FourierTransform planned for [{}, {}]",
            self.rows,
            self.cols
        );

        // Row-major buffer: one FFT per row of `cols` entries.
        let mut by_rows: Vec<Complex32> = plane.iter().map(|&x| Complex32::new(x, 0.0)).collect();
        self.row_fft.process(&mut by_rows);

        // Column-major buffer: one FFT per column of `rows` entries.
        let cols = self.cols;
        let rows = self.rows;
        let mut by_columns: Vec<Complex32> = (0..cols)
            .flat_map(|j| (0..rows).map(move |i| (i, j)))
            .map(|(i, j)| by_rows[i * cols + j])
            .collect();
        self.column_fft.process(&mut by_columns);

        Array2::from_shape_fn((rows, cols), |(i, j)| by_columns[j * rows + i])
    }

    /// Applies the transform to every sample, keeping the real part.
    pub fn forward(&self, input: &Tensor) -> Tensor {
        let shape = input.shape();
        let data = input.data();
        let batch = data
            .view()
            .into_dimensionality::<Ix3>()
            .unwrap_or_else(|_| panic!("FourierTransform expects [batch, rows, cols], got {:?}", shape));

        let mut output = Array3::<f32>::zeros(batch.dim());
        for (sample, mut target) in batch.outer_iter().zip(output.outer_iter_mut()) {
            let spectrum = self.spectrum(&sample.to_owned());
            target.assign(&spectrum.mapv(|c| c.re));
        }
        Tensor::from_data(output.into_dyn())
    }
}

impl fmt::Debug for FourierTransform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FourierTransform")
            .field("rows", &self.rows)
            .field("cols", &self.cols)
            .finish()
    }
}
