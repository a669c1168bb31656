//! Exhaustive hyperparameter grid search.
//!
//! Every combination is trained on the chronological train split and
//! scored with MAP@k on the held-out split; the best combination wins.
//! The caller then retrains on the full dataset with those parameters.

use tracing::info;

use super::metrics::{ranking_scores, RankingScores};
use super::{fit, TrainConfig};
use crate::dataset::Interactions;

#[derive(Debug, Clone)]
pub struct ParamGrid {
    pub learning_rates: Vec<f32>,
    pub factors: Vec<usize>,
    pub epochs: Vec<usize>,
}

impl Default for ParamGrid {
    fn default() -> Self {
        Self {
            learning_rates: vec![1e-3, 5e-3, 1e-2],
            factors: vec![8, 16, 32],
            epochs: vec![50, 100],
        }
    }
}

impl ParamGrid {
    fn combinations(&self, base: &TrainConfig) -> Vec<TrainConfig> {
        let mut configs = Vec::new();
        for &learning_rate in &self.learning_rates {
            for &factors in &self.factors {
                for &epochs in &self.epochs {
                    configs.push(TrainConfig {
                        learning_rate,
                        factors,
                        epochs,
                        ..base.clone()
                    });
                }
            }
        }
        configs
    }
}

#[derive(Debug, Clone)]
pub struct GridResult {
    pub config: TrainConfig,
    pub scores: RankingScores,
}

#[derive(Debug, thiserror::Error)]
pub enum GridError {
    #[error("Grid search requires a non-empty parameter grid")]
    EmptyGrid,
    #[error("Grid search requires a non-empty test split")]
    NoTestData,
}

/// Run the full grid and return every result plus the index of the best
/// one (highest MAP@k).
pub fn search(
    data: &Interactions,
    base: &TrainConfig,
    grid: &ParamGrid,
    split: f64,
    k: usize,
) -> Result<(Vec<GridResult>, usize), GridError> {
    let configs = grid.combinations(base);
    if configs.is_empty() {
        return Err(GridError::EmptyGrid);
    }

    let (train, test) = data.chrono_split(split);
    if test.is_empty() {
        return Err(GridError::NoTestData);
    }

    let total = configs.len();
    let mut results = Vec::with_capacity(total);
    for (i, config) in configs.into_iter().enumerate() {
        info!(
            combination = i + 1,
            total,
            learning_rate = config.learning_rate,
            factors = config.factors,
            epochs = config.epochs,
            "grid search: training"
        );
        let network = fit(data, &train, &config);
        let scores = ranking_scores(&network, &train, &test, data.n_items(), k);
        info!(
            combination = i + 1,
            map = scores.map,
            ndcg = scores.ndcg,
            users = scores.n_users,
            "grid search: scored"
        );
        results.push(GridResult { config, scores });
    }

    let best = results
        .iter()
        .enumerate()
        .max_by(|a, b| a.1.scores.map.total_cmp(&b.1.scores.map))
        .map(|(i, _)| i)
        .unwrap_or(0);

    let winner = &results[best];
    info!(
        learning_rate = winner.config.learning_rate,
        factors = winner.config.factors,
        epochs = winner.config.epochs,
        map = winner.scores.map,
        "grid search: best parameters"
    );

    Ok((results, best))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_combinations_cartesian() {
        let grid = ParamGrid {
            learning_rates: vec![0.01, 0.05],
            factors: vec![4],
            epochs: vec![1, 2, 3],
        };
        let combos = grid.combinations(&TrainConfig::default());
        assert_eq!(combos.len(), 6);
    }

    #[test]
    fn test_search_picks_a_result() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        let mut content = String::new();
        for u in 0..3 {
            for i in 0..4 {
                content.push_str(&format!("u{},i{},4.0,{}\n", u, i, i));
            }
        }
        file.write_all(content.as_bytes()).unwrap();
        file.flush().unwrap();
        let data = Interactions::from_csv(file.path(), b',', false).unwrap();

        let grid = ParamGrid {
            learning_rates: vec![0.05],
            factors: vec![4],
            epochs: vec![1, 2],
        };
        let base = TrainConfig {
            layer_sizes: vec![8, 4],
            batch_size: 8,
            n_negatives: 1,
            seed: 2,
            ..TrainConfig::default()
        };
        let (results, best) = search(&data, &base, &grid, 0.75, 5).unwrap();
        assert_eq!(results.len(), 2);
        assert!(best < results.len());
    }

    #[test]
    fn test_search_rejects_empty_grid() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(b"u1,A,5.0,1\nu1,B,4.0,2\n").unwrap();
        file.flush().unwrap();
        let data = Interactions::from_csv(file.path(), b',', false).unwrap();

        let grid = ParamGrid {
            learning_rates: vec![],
            factors: vec![],
            epochs: vec![],
        };
        assert!(matches!(
            search(&data, &TrainConfig::default(), &grid, 0.5, 5),
            Err(GridError::EmptyGrid)
        ));
    }
}
