//! In-memory image datasets and batching.

use ndarray::{s, Array4, Axis};
use rand::seq::SliceRandom;
use rand::Rng;

use crate::error::ConfigError;
use crate::tensor::Tensor;

/// Images `[N, H, W, C]` with one class label each.
#[derive(Debug, Clone)]
pub struct ImageDataset {
    images: Array4<f32>,
    labels: Vec<usize>,
}

impl ImageDataset {
    pub fn new(images: Array4<f32>, labels: Vec<usize>) -> Result<Self, ConfigError> {
        if images.len_of(Axis(0)) != labels.len() {
            return Err(ConfigError::LabelCountMismatch {
                images: images.len_of(Axis(0)),
                labels: labels.len(),
            });
        }
        Ok(Self { images, labels })
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    /// `(height, width, channels)` of every image.
    pub fn image_shape(&self) -> (usize, usize, usize) {
        let (_, h, w, c) = self.images.dim();
        (h, w, c)
    }

    pub fn images(&self) -> &Array4<f32> {
        &self.images
    }

    pub fn labels(&self) -> &[usize] {
        &self.labels
    }

    /// Fails on the first label that is not a valid class index.
    pub fn check_labels(&self, num_classes: usize) -> Result<(), ConfigError> {
        match self.labels.iter().find(|&&label| label >= num_classes) {
            Some(&label) => Err(ConfigError::LabelOutOfRange { label, num_classes }),
            None => Ok(()),
        }
    }

    /// Keeps the first `floor(len * (1 - fraction))` samples for training and
    /// the rest for validation, without shuffling.
    pub fn split_validation(&self, fraction: f32) -> Result<(ImageDataset, ImageDataset), ConfigError> {
        if !(0.0..1.0).contains(&fraction) {
            return Err(ConfigError::InvalidValidationSplit(fraction));
        }
        let n = self.len() as f64;
        // Absorbs the f32 rounding of `fraction`, so 10 samples at 0.1 keep 9.
        let tolerance = n * f64::from(f32::EPSILON);
        let split_at = ((n * (1.0 - f64::from(fraction)) + tolerance).floor() as usize).min(self.len());

        let train = ImageDataset {
            images: self.images.slice(s![..split_at, .., .., ..]).to_owned(),
            labels: self.labels[..split_at].to_vec(),
        };
        let validation = ImageDataset {
            images: self.images.slice(s![split_at.., .., .., ..]).to_owned(),
            labels: self.labels[split_at..].to_vec(),
        };
        Ok((train, validation))
    }

    /// Applies one random permutation to images and labels together.
    pub fn shuffle<R: Rng + ?Sized>(&mut self, rng: &mut R) {
        let mut order: Vec<usize> = (0..self.len()).collect();
        order.shuffle(rng);
        self.images = self.images.select(Axis(0), &order);
        self.labels = order.iter().map(|&i| self.labels[i]).collect();
    }

    /// Iterates over consecutive batches, the last one possibly smaller.
    pub fn batches(&self, batch_size: usize) -> DataLoader<'_> {
        assert!(batch_size > 0, "batch_size must be positive");
        DataLoader {
            dataset: self,
            batch_size,
            current_pos: 0,
        }
    }
}

/// Represents a batch of data.
#[derive(Debug)]
pub struct DataBatch {
    /// `[batch, H, W, C]`
    pub images: Tensor,
    pub labels: Vec<usize>,
}

/// An iterator that yields batches of data.
pub struct DataLoader<'a> {
    dataset: &'a ImageDataset,
    batch_size: usize,
    current_pos: usize,
}

impl Iterator for DataLoader<'_> {
    type Item = DataBatch;

    fn next(&mut self) -> Option<Self::Item> {
        if self.current_pos >= self.dataset.len() {
            return None;
        }

        let end = (self.current_pos + self.batch_size).min(self.dataset.len());
        let images = self
            .dataset
            .images
            .slice(s![self.current_pos..end, .., .., ..])
            .to_owned()
            .into_dyn();
        let labels = self.dataset.labels[self.current_pos..end].to_vec();
        self.current_pos = end;

        Some(DataBatch {
            images: Tensor::from_data(images),
            labels,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    /// Every pixel of image `i` holds the value `i`.
    fn tagged(n: usize) -> ImageDataset {
        let images = Array4::from_shape_fn((n, 2, 2, 1), |(i, _, _, _)| i as f32);
        ImageDataset::new(images, (0..n).map(|i| i % 3).collect()).unwrap()
    }

    #[test]
    fn rejects_label_count_mismatch() {
        let err = ImageDataset::new(Array4::zeros((3, 2, 2, 1)), vec![0, 1]).unwrap_err();
        assert_eq!(err, ConfigError::LabelCountMismatch { images: 3, labels: 2 });
    }

    #[test]
    fn batches_cover_everything_including_remainder() {
        let data = tagged(10);
        let sizes: Vec<usize> = data.batches(4).map(|b| b.labels.len()).collect();
        assert_eq!(sizes, vec![4, 4, 2]);
        let last = data.batches(4).last().unwrap();
        assert_eq!(last.images.shape(), vec![2, 2, 2, 1]);
        assert_eq!(last.images.data()[[1, 0, 0, 0]], 9.0);
    }

    #[test]
    fn validation_split_takes_the_tail() {
        let (train, val) = tagged(10).split_validation(0.1).unwrap();
        assert_eq!(train.len(), 9);
        assert_eq!(val.len(), 1);
        assert_eq!(val.images()[[0, 0, 0, 0]], 9.0);
        assert!(tagged(10).split_validation(1.0).is_err());
    }

    #[test]
    fn small_sets_still_get_a_validation_sample() {
        let (train, val) = tagged(4).split_validation(0.1).unwrap();
        assert_eq!((train.len(), val.len()), (3, 1));
        assert_eq!(val.images()[[0, 0, 0, 0]], 3.0);

        let (train, val) = tagged(50).split_validation(0.1).unwrap();
        assert_eq!((train.len(), val.len()), (45, 5));

        let (train, val) = tagged(7).split_validation(0.0).unwrap();
        assert_eq!((train.len(), val.len()), (7, 0));
    }

    #[test]
    fn shuffle_keeps_images_and_labels_paired() {
        let mut data = tagged(12);
        data.shuffle(&mut StdRng::seed_from_u64(7));
        for (i, &label) in data.labels().iter().enumerate() {
            let tag = data.images()[[i, 1, 1, 0]] as usize;
            assert_eq!(label, tag % 3);
        }
        let mut tags: Vec<usize> = (0..12).map(|i| data.images()[[i, 0, 0, 0]] as usize).collect();
        tags.sort_unstable();
        assert_eq!(tags, (0..12).collect::<Vec<_>>());
    }

    #[test]
    fn check_labels_reports_out_of_range() {
        let data = tagged(5);
        assert!(data.check_labels(3).is_ok());
        assert_eq!(
            data.check_labels(2),
            Err(ConfigError::LabelOutOfRange { label: 2, num_classes: 2 })
        );
    }
}
