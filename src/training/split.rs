//! Holdout split of row indices

use crate::error::{GenderError, Result};
use rand::seq::SliceRandom;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};

/// Train/validation partition of row indices
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrainTestSplit {
    pub train_indices: Vec<usize>,
    pub test_indices: Vec<usize>,
}

/// Shuffle `0..n_samples` with a seeded stream and hold out the first
/// `ceil(n_samples * test_fraction)` indices for validation
pub fn train_test_split(n_samples: usize, test_fraction: f64, seed: u64) -> Result<TrainTestSplit> {
    if !(0.0..1.0).contains(&test_fraction) {
        return Err(GenderError::InvalidParameter {
            name: "test_fraction".to_string(),
            value: test_fraction.to_string(),
            reason: "must be in [0, 1)".to_string(),
        });
    }

    let n_test = (n_samples as f64 * test_fraction).ceil() as usize;
    if n_test >= n_samples {
        return Err(GenderError::ValidationError(format!(
            "Holding out {} of {} samples leaves nothing to train on",
            n_test, n_samples
        )));
    }

    let mut indices: Vec<usize> = (0..n_samples).collect();
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    indices.shuffle(&mut rng);

    let train_indices = indices.split_off(n_test);
    Ok(TrainTestSplit {
        train_indices,
        test_indices: indices,
    })
}
