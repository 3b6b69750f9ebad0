//! Splits images into flattened non-overlapping square patches.

use ndarray::{Array3, Ix4};
use tracing::debug;

use crate::error::ConfigError;
use crate::tensor::Tensor;

/// Turns `[batch, height, width, channels]` images into
/// `[batch, num_patches, patch_size * patch_size * channels]`.
///
/// Patches are numbered row-major over the grid (left to right, then top to
/// bottom). Inside a patch, values are laid out by pixel row, pixel column and
/// then channel.
#[derive(Debug, Clone)]
pub struct PatchExtractor {
    height: usize,
    width: usize,
    channels: usize,
    patch_size: usize,
}

impl PatchExtractor {
    pub fn new(height: usize, width: usize, channels: usize, patch_size: usize) -> Result<Self, ConfigError> {
        for (name, value) in [
            ("image height", height),
            ("image width", width),
            ("channel count", channels),
            ("patch size", patch_size),
        ] {
            if value == 0 {
                return Err(ConfigError::ZeroDimension { name });
            }
        }
        if height % patch_size != 0 || width % patch_size != 0 {
            return Err(ConfigError::IndivisiblePatchGrid {
                height,
                width,
                patch_size,
            });
        }

        let extractor = Self {
            height,
            width,
            channels,
            patch_size,
        };
        debug!(
            patch_size,
            num_patches = extractor.num_patches(),
            patch_dim = extractor.patch_dim(),
            "initializing PatchExtractor"
        );
        Ok(extractor)
    }

    pub fn patch_size(&self) -> usize {
        self.patch_size
    }

    pub fn grid(&self) -> (usize, usize) {
        (self.height / self.patch_size, self.width / self.patch_size)
    }

    pub fn num_patches(&self) -> usize {
        let (rows, cols) = self.grid();
        rows * cols
    }

    pub fn patch_dim(&self) -> usize {
        self.patch_size * self.patch_size * self.channels
    }

    pub fn extract(&self, images: &Tensor) -> Tensor {
        let shape = images.shape();
        let data = images.data();
        let images = data
            .view()
            .into_dimensionality::<Ix4>()
            .unwrap_or_else(|_| panic!("PatchExtractor expects [batch, height, width, channels], got {:?}", shape));
        let (batch, height, width, channels) = images.dim();
        assert!(
            (height, width, channels) == (self.height, self.width, self.channels),
            "PatchExtractor configured for {}x{}x{} images, got {:?}",
            self.height,
            self.width,
            self.channels,
            shape
        );

        let p = self.patch_size;
        let (_, grid_cols) = self.grid();
        let patches = Array3::from_shape_fn((batch, self.num_patches(), self.patch_dim()), |(b, n, d)| {
            let (grid_y, grid_x) = (n / grid_cols, n % grid_cols);
            let pixel = d / channels;
            let (py, px) = (pixel / p, pixel % p);
            images[[b, grid_y * p + py, grid_x * p + px, d % channels]]
        });
        Tensor::from_data(patches.into_dyn())
    }
}
