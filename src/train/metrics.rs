//! Ranking-quality metrics against a held-out split.
//!
//! For every user with test interactions the model ranks all items the
//! user has not seen during training, and the ranking is compared to the
//! held-out positives. MAP@k and NDCG@k are averaged over those users.

use std::collections::HashSet;

use crate::dataset::{Interaction, Interactions};
use crate::model::NeuMf;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RankingScores {
    pub map: f64,
    pub ndcg: f64,
    /// Number of users the averages were computed over.
    pub n_users: usize,
}

pub fn ranking_scores(
    network: &NeuMf,
    train: &[Interaction],
    test: &[Interaction],
    n_items: usize,
    k: usize,
) -> RankingScores {
    let train_positives = Interactions::positives_by_user(train);
    let test_positives = Interactions::positives_by_user(test);

    let mut map_sum = 0.0;
    let mut ndcg_sum = 0.0;
    let mut n_users = 0usize;

    let mut users: Vec<usize> = test_positives.keys().copied().collect();
    users.sort_unstable();

    let empty = HashSet::new();
    for user in users {
        let relevant = &test_positives[&user];
        let seen = train_positives.get(&user).unwrap_or(&empty);

        let candidates: Vec<usize> = (0..n_items).filter(|i| !seen.contains(i)).collect();
        if candidates.is_empty() {
            continue;
        }

        let user_vec = vec![user; candidates.len()];
        let scores = network.score(&user_vec, &candidates);

        let mut ranked: Vec<(usize, f32)> = candidates
            .iter()
            .copied()
            .zip(scores.iter().copied())
            .collect();
        ranked.sort_by(|a, b| b.1.total_cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        ranked.truncate(k);

        map_sum += average_precision(&ranked, relevant, k);
        ndcg_sum += ndcg(&ranked, relevant, k);
        n_users += 1;
    }

    if n_users == 0 {
        return RankingScores {
            map: 0.0,
            ndcg: 0.0,
            n_users: 0,
        };
    }
    RankingScores {
        map: map_sum / n_users as f64,
        ndcg: ndcg_sum / n_users as f64,
        n_users,
    }
}

fn average_precision(ranked: &[(usize, f32)], relevant: &HashSet<usize>, k: usize) -> f64 {
    let mut hits = 0usize;
    let mut precision_sum = 0.0;
    for (rank, (item, _)) in ranked.iter().enumerate() {
        if relevant.contains(item) {
            hits += 1;
            precision_sum += hits as f64 / (rank + 1) as f64;
        }
    }
    let denom = relevant.len().min(k);
    if denom == 0 {
        return 0.0;
    }
    precision_sum / denom as f64
}

fn ndcg(ranked: &[(usize, f32)], relevant: &HashSet<usize>, k: usize) -> f64 {
    let dcg: f64 = ranked
        .iter()
        .enumerate()
        .filter(|(_, (item, _))| relevant.contains(item))
        .map(|(rank, _)| 1.0 / ((rank + 2) as f64).log2())
        .sum();
    let ideal: f64 = (0..relevant.len().min(k))
        .map(|rank| 1.0 / ((rank + 2) as f64).log2())
        .sum();
    if ideal == 0.0 {
        return 0.0;
    }
    dcg / ideal
}

#[cfg(test)]
mod tests {
    use super::*;

    fn relevant(items: &[usize]) -> HashSet<usize> {
        items.iter().copied().collect()
    }

    #[test]
    fn test_average_precision_perfect_ranking() {
        let ranked = vec![(0, 0.9), (1, 0.8), (2, 0.7)];
        let rel = relevant(&[0, 1]);
        assert!((average_precision(&ranked, &rel, 3) - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_average_precision_partial() {
        // relevant item at rank 2 only: AP = (1/2) / 1
        let ranked = vec![(5, 0.9), (0, 0.8), (7, 0.7)];
        let rel = relevant(&[0]);
        assert!((average_precision(&ranked, &rel, 3) - 0.5).abs() < 1e-9);
    }

    #[test]
    fn test_ndcg_perfect_is_one() {
        let ranked = vec![(0, 0.9), (1, 0.8), (2, 0.7)];
        let rel = relevant(&[0, 1, 2]);
        assert!((ndcg(&ranked, &rel, 3) - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_ndcg_worse_ranking_is_lower() {
        let rel = relevant(&[0]);
        let top = ndcg(&[(0, 0.9), (1, 0.8)], &rel, 2);
        let bottom = ndcg(&[(1, 0.9), (0, 0.8)], &rel, 2);
        assert!(top > bottom);
        assert!(bottom > 0.0);
    }

    #[test]
    fn test_scores_over_synthetic_model() {
        let network = NeuMf::new(3, 4, 4, &[8, 4], 9);
        let train = vec![
            Interaction { user: 0, item: 0, rating: 5.0, timestamp: 1 },
            Interaction { user: 1, item: 1, rating: 4.0, timestamp: 1 },
        ];
        let test = vec![
            Interaction { user: 0, item: 2, rating: 5.0, timestamp: 2 },
            Interaction { user: 1, item: 3, rating: 4.0, timestamp: 2 },
        ];
        let scores = ranking_scores(&network, &train, &test, 4, 10);
        assert_eq!(scores.n_users, 2);
        assert!((0.0..=1.0).contains(&scores.map));
        assert!((0.0..=1.0).contains(&scores.ndcg));
    }
}
