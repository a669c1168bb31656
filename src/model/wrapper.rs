//! Serving-side view of a trained model.
//!
//! The wrapper owns the ID mapping tables and the network, all of it
//! read-only after load. It is shared across request handlers through a
//! plain `Arc`; nothing here mutates, so no locking is needed.

use std::collections::HashMap;
use std::path::Path;

use serde::Serialize;

use super::assets::{ModelAssets, ModelError, Parameters};
use super::ncf::NeuMf;

/// One ranked recommendation, carrying the external ids.
#[derive(Debug, Clone, Serialize)]
pub struct Prediction {
    pub user: String,
    pub item: String,
    pub prediction: f32,
}

pub struct ModelWrapper {
    user_mapping: HashMap<String, usize>,
    /// External item id per internal index, so `catalog[i]` is the item
    /// the network scores at index `i`.
    catalog: Vec<String>,
    item_indices: Vec<usize>,
    network: NeuMf,
    parameters: Parameters,
}

impl ModelWrapper {
    /// Deserialize the mapping tables and weights from `dir`. Any missing
    /// or inconsistent file is fatal; the caller must not serve.
    pub fn load(dir: &Path) -> Result<Self, ModelError> {
        let assets = ModelAssets::load(dir)?;
        Self::from_assets(assets)
    }

    pub fn from_assets(assets: ModelAssets) -> Result<Self, ModelError> {
        let ModelAssets {
            user_mapping,
            item_mapping,
            parameters,
            network,
        } = assets;

        for &index in user_mapping.values() {
            if index >= parameters.n_users {
                return Err(ModelError::BadMapping { index });
            }
        }

        // Invert item -> index into a dense catalog.
        let mut catalog = vec![None; parameters.n_items];
        for (item, &index) in &item_mapping {
            match catalog.get_mut(index) {
                Some(slot) if slot.is_none() => *slot = Some(item.clone()),
                _ => return Err(ModelError::BadMapping { index }),
            }
        }
        let catalog: Vec<String> = catalog.into_iter().flatten().collect();
        if catalog.len() != parameters.n_items {
            return Err(ModelError::BadMapping {
                index: catalog.len(),
            });
        }

        let item_indices = (0..parameters.n_items).collect();

        Ok(Self {
            user_mapping,
            catalog,
            item_indices,
            network,
            parameters,
        })
    }

    pub fn n_items(&self) -> usize {
        self.catalog.len()
    }

    pub fn parameters(&self) -> &Parameters {
        &self.parameters
    }

    /// Score every catalog item for `user_id` in one batched forward pass
    /// and return the top `num_results`, sorted by score descending.
    /// Equal scores are ordered by ascending external item id, so the
    /// ranking is deterministic for identical inputs.
    pub fn predict(
        &self,
        user_id: &str,
        num_results: usize,
    ) -> Result<Vec<Prediction>, PredictError> {
        let &user_index = self
            .user_mapping
            .get(user_id)
            .ok_or(PredictError::UnknownUser)?;

        let users = vec![user_index; self.item_indices.len()];
        let scores = self.network.score(&users, &self.item_indices);

        let ranked = rank_items(&scores.to_vec(), &self.catalog, num_results);

        Ok(ranked
            .into_iter()
            .map(|(index, score)| Prediction {
                user: user_id.to_string(),
                item: self.catalog[index].clone(),
                prediction: score,
            })
            .collect())
    }
}

/// Order item indices by score descending, ascending external item id on
/// ties, truncated to `k`.
fn rank_items(scores: &[f32], catalog: &[String], k: usize) -> Vec<(usize, f32)> {
    let mut ranked: Vec<(usize, f32)> = scores.iter().copied().enumerate().collect();
    ranked.sort_by(|a, b| {
        b.1.total_cmp(&a.1)
            .then_with(|| catalog[a.0].cmp(&catalog[b.0]))
    });
    ranked.truncate(k);
    ranked
}

#[derive(Debug, thiserror::Error)]
pub enum PredictError {
    #[error("Unknown user ID.")]
    UnknownUser,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::assets::Parameters;

    fn wrapper_with(n_users: usize, items: &[&str]) -> ModelWrapper {
        let user_mapping: HashMap<String, usize> = (0..n_users)
            .map(|i| (format!("user-{}", i), i))
            .collect();
        let item_mapping: HashMap<String, usize> = items
            .iter()
            .enumerate()
            .map(|(i, item)| (item.to_string(), i))
            .collect();
        let parameters = Parameters {
            n_users,
            n_items: items.len(),
            factors: 4,
            layer_sizes: vec![8, 4],
            epochs: 1,
            batch_size: 4,
            learning_rate: 0.01,
            seed: 3,
        };
        let network = NeuMf::new(n_users, items.len(), 4, &[8, 4], 3);
        ModelWrapper::from_assets(ModelAssets {
            user_mapping,
            item_mapping,
            parameters,
            network,
        })
        .unwrap()
    }

    #[test]
    fn test_unknown_user() {
        let wrapper = wrapper_with(2, &["A", "B", "C"]);
        assert!(matches!(
            wrapper.predict("nobody", 5),
            Err(PredictError::UnknownUser)
        ));
    }

    #[test]
    fn test_result_count_and_order() {
        let wrapper = wrapper_with(2, &["A", "B", "C", "D", "E"]);
        let preds = wrapper.predict("user-0", 3).unwrap();
        assert_eq!(preds.len(), 3);
        for pair in preds.windows(2) {
            assert!(pair[0].prediction >= pair[1].prediction);
        }
        for p in &preds {
            assert_eq!(p.user, "user-0");
            assert!(["A", "B", "C", "D", "E"].contains(&p.item.as_str()));
        }
    }

    #[test]
    fn test_truncates_to_catalog_size() {
        let wrapper = wrapper_with(1, &["A", "B", "C"]);
        let preds = wrapper.predict("user-0", 10).unwrap();
        assert_eq!(preds.len(), 3);
    }

    #[test]
    fn test_deterministic() {
        let wrapper = wrapper_with(3, &["A", "B", "C", "D"]);
        let a = wrapper.predict("user-1", 4).unwrap();
        let b = wrapper.predict("user-1", 4).unwrap();
        let items_a: Vec<_> = a.iter().map(|p| p.item.clone()).collect();
        let items_b: Vec<_> = b.iter().map(|p| p.item.clone()).collect();
        assert_eq!(items_a, items_b);
    }

    #[test]
    fn test_rank_items_fixed_scores() {
        let catalog: Vec<String> = ["A", "B", "C"].map(String::from).into_iter().collect();
        let ranked = rank_items(&[0.9, 0.2, 0.5], &catalog, 2);
        assert_eq!(ranked.len(), 2);
        assert_eq!(catalog[ranked[0].0], "A");
        assert_eq!(ranked[0].1, 0.9);
        assert_eq!(catalog[ranked[1].0], "C");
        assert_eq!(ranked[1].1, 0.5);
    }

    #[test]
    fn test_rank_items_tie_breaks_by_item_id() {
        let catalog: Vec<String> = ["D", "B", "C", "A"].map(String::from).into_iter().collect();
        let ranked = rank_items(&[0.5, 0.5, 0.7, 0.5], &catalog, 4);
        let order: Vec<&str> = ranked.iter().map(|&(i, _)| catalog[i].as_str()).collect();
        assert_eq!(order, vec!["C", "A", "B", "D"]);
    }

    #[test]
    fn test_duplicate_item_index_rejected() {
        let user_mapping: HashMap<String, usize> = [("u".to_string(), 0)].into();
        let mut item_mapping = HashMap::new();
        item_mapping.insert("A".to_string(), 0);
        item_mapping.insert("B".to_string(), 0);
        let parameters = Parameters {
            n_users: 1,
            n_items: 2,
            factors: 2,
            layer_sizes: vec![4, 2],
            epochs: 1,
            batch_size: 4,
            learning_rate: 0.01,
            seed: 1,
        };
        let network = NeuMf::new(1, 2, 2, &[4, 2], 1);
        let result = ModelWrapper::from_assets(ModelAssets {
            user_mapping,
            item_mapping,
            parameters,
            network,
        });
        assert!(matches!(result, Err(ModelError::BadMapping { .. })));
    }
}
