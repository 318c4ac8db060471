//! Train / validation / test partitioning.

use crate::dataset::Dataset;
use crate::error::{TrainingError, TrainingResult};
use rand::seq::SliceRandom;
use rand::Rng;

pub const TRAIN_RATIO: f64 = 0.7;
pub const VAL_RATIO: f64 = 0.1;

/// Three disjoint index sets covering `0..total` exactly once.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Split {
    pub train: Vec<usize>,
    pub val: Vec<usize>,
    pub test: Vec<usize>,
}

impl Split {
    #[must_use]
    pub fn sizes(&self) -> (usize, usize, usize) {
        (self.train.len(), self.val.len(), self.test.len())
    }
}

/// `floor(total * ratio)` for train and validation; test absorbs the rest.
pub fn partition_sizes(total: usize, train_ratio: f64, val_ratio: f64) -> TrainingResult<(usize, usize, usize)> {
    let valid = |r: f64| r.is_finite() && r > 0.0;
    if !valid(train_ratio) || !valid(val_ratio) || train_ratio + val_ratio > 1.0 {
        return Err(TrainingError::InvalidRatio { train: train_ratio, val: val_ratio });
    }

    let train = (total as f64 * train_ratio).floor() as usize;
    let val = (total as f64 * val_ratio).floor() as usize;
    // Guard against float overshoot so the test partition never underflows.
    let train = train.min(total);
    let val = val.min(total - train);
    Ok((train, val, total - train - val))
}

/// Randomly assign each of `0..total` to exactly one partition.
pub fn split_indices<R: Rng + ?Sized>(
    total: usize,
    train_ratio: f64,
    val_ratio: f64,
    rng: &mut R,
) -> TrainingResult<Split> {
    let (train_size, val_size, _) = partition_sizes(total, train_ratio, val_ratio)?;

    let mut order: Vec<usize> = (0..total).collect();
    order.shuffle(rng);

    let test = order.split_off(train_size + val_size);
    let val = order.split_off(train_size);
    Ok(Split { train: order, val, test })
}

/// Split a dataset with fresh entropy. Does not touch the dataset.
pub fn split(dataset: &Dataset, train_ratio: f64, val_ratio: f64) -> TrainingResult<Split> {
    split_indices(dataset.len(), train_ratio, val_ratio, &mut rand::thread_rng())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use std::collections::HashSet;

    fn assert_covers(split: &Split, total: usize) {
        let all: HashSet<usize> =
            split.train.iter().chain(split.val.iter()).chain(split.test.iter()).copied().collect();
        assert_eq!(all.len(), total, "partitions overlap or miss indices");
        assert_eq!(split.train.len() + split.val.len() + split.test.len(), total);
        assert!(all.iter().all(|&i| i < total));
    }

    #[test]
    fn test_hundred_images_split_seventy_ten_twenty() {
        let mut rng = StdRng::seed_from_u64(7);
        let split = split_indices(100, TRAIN_RATIO, VAL_RATIO, &mut rng).unwrap();
        assert_eq!(split.sizes(), (70, 10, 20));
        assert_covers(&split, 100);
    }

    #[test]
    fn test_sizes_and_disjointness_across_totals() {
        let mut rng = StdRng::seed_from_u64(42);
        for total in [0usize, 1, 2, 3, 9, 10, 11, 57, 101, 1000, 4097] {
            for (tr, va) in [(0.7, 0.1), (0.5, 0.5), (0.33, 0.33), (0.9, 0.05), (0.01, 0.99)] {
                let split = split_indices(total, tr, va, &mut rng).unwrap();
                let (t, v, _) = split.sizes();
                assert_eq!(t, (total as f64 * tr).floor() as usize);
                assert_eq!(v, (total as f64 * va).floor() as usize);
                assert_covers(&split, total);
            }
        }
    }

    #[test]
    fn test_invalid_ratios_rejected() {
        let mut rng = StdRng::seed_from_u64(0);
        for (tr, va) in [(0.8, 0.3), (0.0, 0.1), (0.7, 0.0), (-0.1, 0.5), (f64::NAN, 0.1), (0.5, f64::INFINITY)] {
            let err = split_indices(10, tr, va, &mut rng).unwrap_err();
            assert!(matches!(err, TrainingError::InvalidRatio { .. }), "{tr}/{va}");
        }
    }

    #[test]
    fn test_assignment_is_randomized() {
        let a = split_indices(200, TRAIN_RATIO, VAL_RATIO, &mut StdRng::seed_from_u64(1)).unwrap();
        let b = split_indices(200, TRAIN_RATIO, VAL_RATIO, &mut StdRng::seed_from_u64(2)).unwrap();
        assert_ne!(a.train, b.train);
        let identity: Vec<usize> = (0..140).collect();
        assert_ne!(a.train, identity);
    }

    #[test]
    fn test_split_dataset_leaves_source_untouched() {
        let samples = (0..20)
            .map(|i| crate::dataset::Sample { path: format!("{i}.png").into(), label: 0 })
            .collect::<Vec<_>>();
        let ds = Dataset::from_samples(samples.clone(), vec!["only".into()]).unwrap();
        let split = split(&ds, TRAIN_RATIO, VAL_RATIO).unwrap();
        assert_eq!(split.sizes(), (14, 2, 4));
        assert_eq!(ds.samples(), samples.as_slice());
    }
}
