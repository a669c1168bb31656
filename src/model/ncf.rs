//! NeuMF (neural matrix factorization) network.
//!
//! Two embedding branches share nothing: a GMF branch whose user and item
//! vectors are combined element-wise, and an MLP branch whose concatenated
//! vectors pass through a stack of ReLU layers. The branch outputs are
//! concatenated and fed to a single sigmoid unit that produces the
//! user-item affinity score.

use ndarray::{concatenate, Array1, Array2, Axis};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

const EPS: f32 = 1e-7;

/// Fully connected layer. Weights are stored `out x in`.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct Dense {
    w: Array2<f32>,
    b: Array1<f32>,
}

impl Dense {
    fn new(in_dim: usize, out_dim: usize, rng: &mut StdRng) -> Self {
        let scale = (1.0 / in_dim as f32).sqrt();
        let w = Array2::from_shape_fn((out_dim, in_dim), |_| rng.gen_range(-scale..scale));
        let b = Array1::zeros(out_dim);
        Self { w, b }
    }

    /// `x` is `batch x in`, result is `batch x out`.
    fn forward(&self, x: &Array2<f32>) -> Array2<f32> {
        x.dot(&self.w.t()) + &self.b
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NeuMf {
    pub n_users: usize,
    pub n_items: usize,
    pub n_factors: usize,
    pub layer_sizes: Vec<usize>,
    gmf_user: Array2<f32>,
    gmf_item: Array2<f32>,
    mlp_user: Array2<f32>,
    mlp_item: Array2<f32>,
    layers: Vec<Dense>,
    out_w: Array1<f32>,
    out_b: f32,
}

impl NeuMf {
    /// Freshly initialized network. `layer_sizes[0]` is the width of the
    /// concatenated MLP embeddings, so it must be even and non-empty.
    pub fn new(
        n_users: usize,
        n_items: usize,
        n_factors: usize,
        layer_sizes: &[usize],
        seed: u64,
    ) -> Self {
        assert!(!layer_sizes.is_empty(), "layer_sizes must not be empty");
        assert!(
            layer_sizes[0] % 2 == 0,
            "first MLP layer size must be even"
        );

        let mut rng = StdRng::seed_from_u64(seed);
        let mlp_dim = layer_sizes[0] / 2;

        let init = |rows: usize, cols: usize, rng: &mut StdRng| {
            Array2::from_shape_fn((rows, cols), |_| rng.gen_range(-0.05..0.05))
        };

        let gmf_user = init(n_users, n_factors, &mut rng);
        let gmf_item = init(n_items, n_factors, &mut rng);
        let mlp_user = init(n_users, mlp_dim, &mut rng);
        let mlp_item = init(n_items, mlp_dim, &mut rng);

        let mut layers = Vec::with_capacity(layer_sizes.len() - 1);
        for win in layer_sizes.windows(2) {
            layers.push(Dense::new(win[0], win[1], &mut rng));
        }

        let out_dim = n_factors + layer_sizes[layer_sizes.len() - 1];
        let scale = (1.0 / out_dim as f32).sqrt();
        let out_w = Array1::from_shape_fn(out_dim, |_| rng.gen_range(-scale..scale));

        Self {
            n_users,
            n_items,
            n_factors,
            layer_sizes: layer_sizes.to_vec(),
            gmf_user,
            gmf_item,
            mlp_user,
            mlp_item,
            layers,
            out_w,
            out_b: 0.0,
        }
    }

    /// Score a batch of (user, item) index pairs in one forward pass.
    /// Returns sigmoid outputs in `[0, 1]`, one per pair.
    pub fn score(&self, users: &[usize], items: &[usize]) -> Array1<f32> {
        let (gmf, mut act, _, _) = self.forward(users, items);
        let mlp_out = act.pop().unwrap_or_else(|| {
            // layer_sizes of length 1 means no dense layers; the MLP
            // embeddings feed the head directly.
            self.mlp_input(users, items)
        });
        let h = concatenate![Axis(1), gmf, mlp_out];
        let logits = h.dot(&self.out_w) + self.out_b;
        logits.mapv(sigmoid)
    }

    /// One SGD step on a batch with binary labels. Returns the mean
    /// binary cross-entropy loss before the update.
    pub fn train_batch(
        &mut self,
        users: &[usize],
        items: &[usize],
        labels: &Array1<f32>,
        lr: f32,
    ) -> f32 {
        let batch = users.len();
        debug_assert_eq!(items.len(), batch);
        debug_assert_eq!(labels.len(), batch);

        let (gmf, acts, zs, x0) = self.forward(users, items);
        let mlp_out = acts
            .last()
            .cloned()
            .unwrap_or_else(|| x0.clone());
        let h = concatenate![Axis(1), gmf.clone(), mlp_out];
        let logits = h.dot(&self.out_w) + self.out_b;
        let preds = logits.mapv(sigmoid);

        let loss = bce_loss(&preds, labels);

        // d(loss)/d(logit), already averaged over the batch
        let dlogit = (&preds - labels) / batch as f32;

        let grad_out_w = h.t().dot(&dlogit);
        let grad_out_b = dlogit.sum();

        // dh[i][j] = dlogit[i] * out_w[j]
        let dh = Array2::from_shape_fn((batch, self.out_w.len()), |(i, j)| {
            dlogit[i] * self.out_w[j]
        });
        let dgmf = dh.slice(ndarray::s![.., ..self.n_factors]).to_owned();
        let mut da = dh.slice(ndarray::s![.., self.n_factors..]).to_owned();

        self.out_w -= &(grad_out_w * lr);
        self.out_b -= lr * grad_out_b;

        // GMF embeddings: gmf = gu * gi elementwise
        let gu = gather(&self.gmf_user, users);
        let gi = gather(&self.gmf_item, items);
        let dgu = &dgmf * &gi;
        let dgi = &dgmf * &gu;
        scatter_update(&mut self.gmf_user, users, &dgu, lr);
        scatter_update(&mut self.gmf_item, items, &dgi, lr);

        // MLP stack, walked back to front
        for l in (0..self.layers.len()).rev() {
            let x_prev = if l == 0 { &x0 } else { &acts[l - 1] };
            let dz = &da * &zs[l].mapv(|v| if v > 0.0 { 1.0 } else { 0.0 });
            let grad_w = dz.t().dot(x_prev);
            let grad_b = dz.sum_axis(Axis(0));
            da = dz.dot(&self.layers[l].w);
            self.layers[l].w -= &(grad_w * lr);
            self.layers[l].b -= &(grad_b * lr);
        }

        // remaining `da` is the gradient of the concatenated MLP embeddings
        let mlp_dim = self.layer_sizes[0] / 2;
        let dmu = da.slice(ndarray::s![.., ..mlp_dim]).to_owned();
        let dmi = da.slice(ndarray::s![.., mlp_dim..]).to_owned();
        scatter_update(&mut self.mlp_user, users, &dmu, lr);
        scatter_update(&mut self.mlp_item, items, &dmi, lr);

        loss
    }

    fn mlp_input(&self, users: &[usize], items: &[usize]) -> Array2<f32> {
        let mu = gather(&self.mlp_user, users);
        let mi = gather(&self.mlp_item, items);
        concatenate![Axis(1), mu, mi]
    }

    /// Shared forward pass. Returns the GMF vector, the post-ReLU
    /// activation of every dense layer, the pre-activations, and the
    /// MLP input.
    #[allow(clippy::type_complexity)]
    fn forward(
        &self,
        users: &[usize],
        items: &[usize],
    ) -> (Array2<f32>, Vec<Array2<f32>>, Vec<Array2<f32>>, Array2<f32>) {
        let gu = gather(&self.gmf_user, users);
        let gi = gather(&self.gmf_item, items);
        let gmf = &gu * &gi;

        let x0 = self.mlp_input(users, items);
        let mut acts = Vec::with_capacity(self.layers.len());
        let mut zs = Vec::with_capacity(self.layers.len());
        let mut x = x0.clone();
        for layer in &self.layers {
            let z = layer.forward(&x);
            x = z.mapv(|v| v.max(0.0));
            zs.push(z);
            acts.push(x.clone());
        }

        (gmf, acts, zs, x0)
    }
}

fn sigmoid(x: f32) -> f32 {
    1.0 / (1.0 + (-x).exp())
}

fn bce_loss(preds: &Array1<f32>, labels: &Array1<f32>) -> f32 {
    let n = preds.len() as f32;
    preds
        .iter()
        .zip(labels.iter())
        .map(|(&p, &y)| {
            let p = p.clamp(EPS, 1.0 - EPS);
            -(y * p.ln() + (1.0 - y) * (1.0 - p).ln())
        })
        .sum::<f32>()
        / n
}

/// Collect embedding rows for a batch of indices.
fn gather(table: &Array2<f32>, idx: &[usize]) -> Array2<f32> {
    Array2::from_shape_fn((idx.len(), table.ncols()), |(r, c)| table[[idx[r], c]])
}

/// Apply per-row SGD updates to an embedding table. Duplicate indices in
/// the batch are applied sequentially.
fn scatter_update(table: &mut Array2<f32>, idx: &[usize], grads: &Array2<f32>, lr: f32) {
    for (r, &i) in idx.iter().enumerate() {
        let mut row = table.row_mut(i);
        row.zip_mut_with(&grads.row(r), |t, &g| *t -= lr * g);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tiny_model() -> NeuMf {
        NeuMf::new(4, 6, 4, &[16, 8, 4], 42)
    }

    #[test]
    fn test_score_shape_and_range() {
        let model = tiny_model();
        let users = vec![0, 1, 2];
        let items = vec![3, 4, 5];
        let scores = model.score(&users, &items);
        assert_eq!(scores.len(), 3);
        for &s in scores.iter() {
            assert!((0.0..=1.0).contains(&s));
        }
    }

    #[test]
    fn test_score_deterministic() {
        let model = tiny_model();
        let users = vec![1, 1, 2];
        let items = vec![0, 5, 3];
        let a = model.score(&users, &items);
        let b = model.score(&users, &items);
        assert_eq!(a, b);
    }

    #[test]
    fn test_same_seed_same_weights() {
        let a = tiny_model();
        let b = tiny_model();
        let users = vec![0, 3];
        let items = vec![2, 1];
        assert_eq!(a.score(&users, &items), b.score(&users, &items));
    }

    #[test]
    fn test_training_reduces_loss() {
        let mut model = tiny_model();
        let users = vec![0, 0, 1, 1, 2, 2, 3, 3];
        let items = vec![0, 1, 2, 3, 4, 5, 0, 2];
        let labels = Array1::from(vec![1.0, 0.0, 1.0, 0.0, 1.0, 0.0, 1.0, 0.0]);

        let first = model.train_batch(&users, &items, &labels, 0.1);
        let mut last = first;
        for _ in 0..200 {
            last = model.train_batch(&users, &items, &labels, 0.1);
        }
        assert!(
            last < first,
            "loss did not decrease: {} -> {}",
            first,
            last
        );
    }

    #[test]
    fn test_roundtrip_through_bincode() {
        let model = tiny_model();
        let bytes = bincode::serialize(&model).unwrap();
        let restored: NeuMf = bincode::deserialize(&bytes).unwrap();
        let users = vec![0, 1];
        let items = vec![4, 5];
        assert_eq!(model.score(&users, &items), restored.score(&users, &items));
    }
}
