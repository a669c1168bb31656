//! Offline training loop.
//!
//! Implicit-feedback training: every observed interaction is a positive
//! example, and each positive is paired with sampled items the user has
//! not interacted with. The whole run is deterministic for a given seed.

pub mod grid;
pub mod metrics;

use std::collections::HashMap;
use std::path::Path;

use ndarray::Array1;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use tracing::info;

use crate::dataset::{Interaction, Interactions};
use crate::model::{ModelAssets, ModelError, NeuMf, Parameters};

#[derive(Debug, Clone)]
pub struct TrainConfig {
    pub factors: usize,
    pub layer_sizes: Vec<usize>,
    pub epochs: usize,
    pub batch_size: usize,
    pub learning_rate: f32,
    /// Negative samples drawn per positive interaction, per epoch.
    pub n_negatives: usize,
    pub seed: u64,
}

impl Default for TrainConfig {
    fn default() -> Self {
        Self {
            factors: 8,
            layer_sizes: vec![16, 8, 4],
            epochs: 100,
            batch_size: 128,
            learning_rate: 5e-3,
            n_negatives: 4,
            seed: 42,
        }
    }
}

/// Train a NeuMF model on `records`. The full `data` is still needed for
/// the user/item counts so that train-split models share the index space
/// of the complete dataset.
pub fn fit(data: &Interactions, records: &[Interaction], config: &TrainConfig) -> NeuMf {
    let n_users = data.n_users();
    let n_items = data.n_items();
    let positives = Interactions::positives_by_user(records);

    let mut network = NeuMf::new(
        n_users,
        n_items,
        config.factors,
        &config.layer_sizes,
        config.seed,
    );
    let mut rng = StdRng::seed_from_u64(config.seed);

    for epoch in 0..config.epochs {
        let mut examples = build_examples(records, &positives, n_items, config.n_negatives, &mut rng);
        examples.shuffle(&mut rng);

        let mut loss_sum = 0.0f64;
        let mut batches = 0usize;
        for chunk in examples.chunks(config.batch_size) {
            let users: Vec<usize> = chunk.iter().map(|e| e.0).collect();
            let items: Vec<usize> = chunk.iter().map(|e| e.1).collect();
            let labels = Array1::from_iter(chunk.iter().map(|e| e.2));
            loss_sum += network.train_batch(&users, &items, &labels, config.learning_rate) as f64;
            batches += 1;
        }

        info!(
            epoch = epoch + 1,
            epochs = config.epochs,
            loss = loss_sum / batches.max(1) as f64,
            "epoch complete"
        );
    }

    network
}

/// Positives plus freshly sampled negatives, as (user, item, label).
fn build_examples(
    records: &[Interaction],
    positives: &HashMap<usize, std::collections::HashSet<usize>>,
    n_items: usize,
    n_negatives: usize,
    rng: &mut StdRng,
) -> Vec<(usize, usize, f32)> {
    let mut examples = Vec::with_capacity(records.len() * (1 + n_negatives));
    for rec in records {
        examples.push((rec.user, rec.item, 1.0));

        let seen = &positives[&rec.user];
        if seen.len() >= n_items {
            // user has interacted with the entire catalog
            continue;
        }
        for _ in 0..n_negatives {
            loop {
                let item = rng.gen_range(0..n_items);
                if !seen.contains(&item) {
                    examples.push((rec.user, item, 0.0));
                    break;
                }
            }
        }
    }
    examples
}

/// Write the asset directory the server reads: both mapping tables, the
/// parameter bundle and the trained weights.
pub fn save_assets(
    data: &Interactions,
    config: &TrainConfig,
    network: NeuMf,
    dir: &Path,
) -> Result<(), ModelError> {
    let parameters = Parameters {
        n_users: data.n_users(),
        n_items: data.n_items(),
        factors: config.factors,
        layer_sizes: config.layer_sizes.clone(),
        epochs: config.epochs,
        batch_size: config.batch_size,
        learning_rate: config.learning_rate,
        seed: config.seed,
    };
    let assets = ModelAssets {
        user_mapping: data.user_index.clone(),
        item_mapping: data.item_index.clone(),
        parameters,
        network,
    };
    assets.save(dir)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn small_dataset() -> (tempfile::NamedTempFile, Interactions) {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        let mut content = String::new();
        for u in 0..4 {
            for i in 0..5 {
                if (u + i) % 2 == 0 {
                    content.push_str(&format!("u{},i{},5.0,{}\n", u, i, u * 10 + i));
                }
            }
        }
        file.write_all(content.as_bytes()).unwrap();
        file.flush().unwrap();
        let data = Interactions::from_csv(file.path(), b',', false).unwrap();
        (file, data)
    }

    fn quick_config() -> TrainConfig {
        TrainConfig {
            factors: 4,
            layer_sizes: vec![8, 4],
            epochs: 3,
            batch_size: 8,
            learning_rate: 0.05,
            n_negatives: 2,
            seed: 11,
        }
    }

    #[test]
    fn test_fit_produces_scorable_model() {
        let (_file, data) = small_dataset();
        let network = fit(&data, &data.records, &quick_config());
        let scores = network.score(&[0, 1], &[0, 1]);
        assert_eq!(scores.len(), 2);
        assert!(scores.iter().all(|s| s.is_finite()));
    }

    #[test]
    fn test_fit_deterministic_for_seed() {
        let (_file, data) = small_dataset();
        let config = quick_config();
        let a = fit(&data, &data.records, &config);
        let b = fit(&data, &data.records, &config);
        assert_eq!(a.score(&[0, 2], &[1, 3]), b.score(&[0, 2], &[1, 3]));
    }

    #[test]
    fn test_negatives_avoid_seen_items() {
        let (_file, data) = small_dataset();
        let positives = Interactions::positives_by_user(&data.records);
        let mut rng = StdRng::seed_from_u64(5);
        let examples = build_examples(&data.records, &positives, data.n_items(), 3, &mut rng);
        for (user, item, label) in examples {
            if label == 0.0 {
                assert!(!positives[&user].contains(&item));
            }
        }
    }

    #[test]
    fn test_save_assets_roundtrip() {
        let (_file, data) = small_dataset();
        let config = quick_config();
        let network = fit(&data, &data.records, &config);
        let expected = network.score(&[1], &[2]);

        let dir = tempfile::tempdir().unwrap();
        save_assets(&data, &config, network, dir.path()).unwrap();

        let wrapper = crate::model::ModelWrapper::load(dir.path()).unwrap();
        assert_eq!(wrapper.n_items(), data.n_items());
        let preds = wrapper.predict("u1", 3).unwrap();
        assert_eq!(preds.len(), 3);
        assert!(expected.iter().all(|s| s.is_finite()));
    }
}
