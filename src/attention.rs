//! Graph attention layer with an explicit backward pass.
//!
//! For every target node `i` and head `k` the layer computes
//!
//! ```text
//! h        = x W
//! s_ij     = a_src[k] . h_j[k] + a_dst[k] . h_i[k]
//! alpha_ij = softmax_j( leaky_relu(s_ij, 0.2) )      over j in N(i)
//! out_i[k] = sum_j alpha_ij h_j[k]  + bias[k]
//! ```
//!
//! and concatenates the heads. `N(i)` always contains `i` itself, see
//! [`Neighborhoods::with_self_loops`].

use ndarray::{Array1, Array2, ArrayViewD, ArrayViewMutD, Axis};
use rand::Rng;
use rand_pcg::Pcg64Mcg;

use crate::graph_builder::TransactionGraph;

const NEGATIVE_SLOPE: f64 = 0.2;

/// Incoming neighbour lists in compressed form, grouped by target node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Neighborhoods {
    offsets: Vec<usize>,
    sources: Vec<usize>,
}

impl Neighborhoods {
    /// Undirected edges become two directed messages. Self-loops already in
    /// `edges` are dropped and exactly one self-loop is added per node, so an
    /// isolated node attends only to itself.
    pub fn with_self_loops(num_nodes: usize, edges: &[(usize, usize)]) -> Self {
        let mut adjacency: Vec<Vec<usize>> = (0..num_nodes).map(|i| vec![i]).collect();
        for &(a, b) in edges {
            if a == b {
                continue;
            }
            adjacency[a].push(b);
            adjacency[b].push(a);
        }

        let mut offsets = Vec::with_capacity(num_nodes + 1);
        let mut sources = Vec::new();
        offsets.push(0);
        for list in adjacency {
            sources.extend(list);
            offsets.push(sources.len());
        }
        Self { offsets, sources }
    }

    pub fn from_graph(graph: &TransactionGraph) -> Self {
        Self::with_self_loops(graph.node_count(), &graph.edges())
    }

    pub fn num_nodes(&self) -> usize {
        self.offsets.len() - 1
    }

    /// Total number of (target, source) pairs, self-loops included.
    pub fn num_messages(&self) -> usize {
        self.sources.len()
    }

    pub fn sources_of(&self, target: usize) -> &[usize] {
        &self.sources[self.offsets[target]..self.offsets[target + 1]]
    }

    fn range(&self, target: usize) -> std::ops::Range<usize> {
        self.offsets[target]..self.offsets[target + 1]
    }
}

/// Uniform Glorot initialisation over a `(fan_in, fan_out)` shaped tensor.
pub(crate) fn glorot(rows: usize, cols: usize, rng: &mut Pcg64Mcg) -> Array2<f64> {
    let bound = (6.0 / (rows + cols) as f64).sqrt();
    Array2::from_shape_fn((rows, cols), |_| rng.gen_range(-bound..bound))
}

#[derive(Debug, Clone)]
pub struct GatLayer {
    pub in_dim: usize,
    pub out_dim: usize,
    pub heads: usize,
    /// `(in_dim, heads * out_dim)`
    pub weight: Array2<f64>,
    /// `(heads, out_dim)`
    pub att_src: Array2<f64>,
    pub att_dst: Array2<f64>,
    pub bias: Array1<f64>,
}

/// Intermediate values of one forward pass, needed by `backward`.
#[derive(Debug, Clone)]
pub struct GatCache {
    input: Array2<f64>,
    projected: Array2<f64>,
    // Indexed [message * heads + head]
    scores: Vec<f64>,
    attention: Vec<f64>,
}

impl GatCache {
    /// Normalised attention coefficient of message `message` for `head`.
    pub fn attention(&self, message: usize, head: usize, heads: usize) -> f64 {
        self.attention[message * heads + head]
    }
}

#[derive(Debug, Clone)]
pub struct GatGradients {
    pub weight: Array2<f64>,
    pub att_src: Array2<f64>,
    pub att_dst: Array2<f64>,
    pub bias: Array1<f64>,
}

impl GatGradients {
    pub(crate) fn tensors(&self) -> Vec<ArrayViewD<'_, f64>> {
        vec![
            self.weight.view().into_dyn(),
            self.att_src.view().into_dyn(),
            self.att_dst.view().into_dyn(),
            self.bias.view().into_dyn(),
        ]
    }
}

impl GatLayer {
    pub fn new(in_dim: usize, out_dim: usize, heads: usize, rng: &mut Pcg64Mcg) -> Self {
        Self {
            in_dim,
            out_dim,
            heads,
            weight: glorot(in_dim, heads * out_dim, rng),
            att_src: glorot(heads, out_dim, rng),
            att_dst: glorot(heads, out_dim, rng),
            bias: Array1::zeros(heads * out_dim),
        }
    }

    pub fn output_dim(&self) -> usize {
        self.heads * self.out_dim
    }

    pub(crate) fn parameters_mut(&mut self) -> Vec<ArrayViewMutD<'_, f64>> {
        vec![
            self.weight.view_mut().into_dyn(),
            self.att_src.view_mut().into_dyn(),
            self.att_dst.view_mut().into_dyn(),
            self.bias.view_mut().into_dyn(),
        ]
    }

    // Per-node, per-head dot products of projected states with an attention vector
    fn attention_logits(&self, projected: &Array2<f64>, att: &Array2<f64>) -> Array2<f64> {
        let n = projected.nrows();
        let c = self.out_dim;
        Array2::from_shape_fn((n, self.heads), |(node, k)| {
            (0..c)
                .map(|ch| projected[[node, k * c + ch]] * att[[k, ch]])
                .sum()
        })
    }

    pub fn forward(&self, x: &Array2<f64>, nbrs: &Neighborhoods) -> Array2<f64> {
        self.forward_with_cache(x, nbrs).0
    }

    pub fn forward_with_cache(&self, x: &Array2<f64>, nbrs: &Neighborhoods) -> (Array2<f64>, GatCache) {
        let heads = self.heads;
        let c = self.out_dim;
        let n = x.nrows();

        let projected = x.dot(&self.weight);
        let alpha_src = self.attention_logits(&projected, &self.att_src);
        let alpha_dst = self.attention_logits(&projected, &self.att_dst);

        let mut scores = vec![0.0; nbrs.num_messages() * heads];
        let mut attention = vec![0.0; nbrs.num_messages() * heads];
        let mut out = Array2::<f64>::zeros((n, heads * c));

        for target in 0..n {
            let range = nbrs.range(target);
            for k in 0..heads {
                let mut max_logit = f64::NEG_INFINITY;
                for m in range.clone() {
                    let source = nbrs.sources[m];
                    let s = alpha_src[[source, k]] + alpha_dst[[target, k]];
                    scores[m * heads + k] = s;
                    max_logit = max_logit.max(leaky_relu(s));
                }

                let mut denom = 0.0;
                for m in range.clone() {
                    let e = (leaky_relu(scores[m * heads + k]) - max_logit).exp();
                    attention[m * heads + k] = e;
                    denom += e;
                }

                for m in range.clone() {
                    let a = attention[m * heads + k] / denom;
                    attention[m * heads + k] = a;
                    let source = nbrs.sources[m];
                    for ch in 0..c {
                        out[[target, k * c + ch]] += a * projected[[source, k * c + ch]];
                    }
                }
            }
        }

        out += &self.bias;

        let cache = GatCache {
            input: x.clone(),
            projected,
            scores,
            attention,
        };
        (out, cache)
    }

    /// Gradients of the parameters and of the layer input, given the
    /// gradient of the loss with respect to the layer output.
    pub fn backward(
        &self,
        cache: &GatCache,
        grad_out: &Array2<f64>,
        nbrs: &Neighborhoods,
    ) -> (GatGradients, Array2<f64>) {
        let heads = self.heads;
        let c = self.out_dim;
        let n = grad_out.nrows();
        let h = &cache.projected;

        let bias = grad_out.sum_axis(Axis(0));
        let mut grad_h = Array2::<f64>::zeros(h.raw_dim());
        let mut grad_alpha_src = Array2::<f64>::zeros((n, heads));
        let mut grad_alpha_dst = Array2::<f64>::zeros((n, heads));
        let mut grad_att = vec![0.0; nbrs.num_messages()];

        for target in 0..n {
            let range = nbrs.range(target);
            for k in 0..heads {
                // Through the weighted sum
                let mut weighted = 0.0;
                for m in range.clone() {
                    let source = nbrs.sources[m];
                    let a = cache.attention[m * heads + k];
                    let mut g = 0.0;
                    for ch in 0..c {
                        let upstream = grad_out[[target, k * c + ch]];
                        g += upstream * h[[source, k * c + ch]];
                        grad_h[[source, k * c + ch]] += a * upstream;
                    }
                    grad_att[m] = g;
                    weighted += a * g;
                }

                // Through softmax and leaky relu
                for m in range.clone() {
                    let source = nbrs.sources[m];
                    let a = cache.attention[m * heads + k];
                    let grad_logit = a * (grad_att[m] - weighted);
                    let grad_score = grad_logit * leaky_relu_grad(cache.scores[m * heads + k]);
                    grad_alpha_src[[source, k]] += grad_score;
                    grad_alpha_dst[[target, k]] += grad_score;
                }
            }
        }

        let mut att_src = Array2::<f64>::zeros((heads, c));
        let mut att_dst = Array2::<f64>::zeros((heads, c));
        for node in 0..n {
            for k in 0..heads {
                let gs = grad_alpha_src[[node, k]];
                let gd = grad_alpha_dst[[node, k]];
                for ch in 0..c {
                    let col = k * c + ch;
                    grad_h[[node, col]] += gs * self.att_src[[k, ch]] + gd * self.att_dst[[k, ch]];
                    att_src[[k, ch]] += gs * h[[node, col]];
                    att_dst[[k, ch]] += gd * h[[node, col]];
                }
            }
        }

        let weight = cache.input.t().dot(&grad_h);
        let grad_input = grad_h.dot(&self.weight.t());

        (
            GatGradients {
                weight,
                att_src,
                att_dst,
                bias,
            },
            grad_input,
        )
    }
}

fn leaky_relu(x: f64) -> f64 {
    if x > 0.0 {
        x
    } else {
        NEGATIVE_SLOPE * x
    }
}

fn leaky_relu_grad(x: f64) -> f64 {
    if x > 0.0 {
        1.0
    } else {
        NEGATIVE_SLOPE
    }
}
