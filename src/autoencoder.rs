//! Graph attention autoencoder.
//!
//! The encoder stacks a multi-head attention layer (ELU activated) and a
//! single-head attention layer producing the raw node embedding. The decoder
//! is one affine map back to the feature width with no output activation,
//! since standardized features can be negative.

use ndarray::{Array1, Array2, ArrayViewD, ArrayViewMutD, Axis};
use rand::{Rng, SeedableRng};
use rand_pcg::Pcg64Mcg;

use crate::attention::{GatCache, GatGradients, GatLayer, Neighborhoods};
use crate::config::ModelConfig;

#[derive(Debug, Clone)]
pub struct GatEncoder {
    pub conv1: GatLayer,
    pub conv2: GatLayer,
}

struct EncoderCache {
    conv1: GatCache,
    hidden: Array2<f64>,
    conv2: GatCache,
}

impl GatEncoder {
    pub fn new(
        in_channels: usize,
        hidden_channels: usize,
        out_channels: usize,
        heads: usize,
        rng: &mut Pcg64Mcg,
    ) -> Self {
        let conv1 = GatLayer::new(in_channels, hidden_channels, heads, rng);
        let conv2 = GatLayer::new(conv1.output_dim(), out_channels, 1, rng);
        Self { conv1, conv2 }
    }

    pub fn forward(&self, x: &Array2<f64>, nbrs: &Neighborhoods) -> Array2<f64> {
        let hidden = self.conv1.forward(x, nbrs).mapv_into(elu);
        self.conv2.forward(&hidden, nbrs)
    }

    fn forward_with_cache(&self, x: &Array2<f64>, nbrs: &Neighborhoods) -> (Array2<f64>, EncoderCache) {
        let (pre, conv1) = self.conv1.forward_with_cache(x, nbrs);
        let hidden = pre.mapv_into(elu);
        let (z, conv2) = self.conv2.forward_with_cache(&hidden, nbrs);
        (z, EncoderCache { conv1, hidden, conv2 })
    }

    fn backward(
        &self,
        cache: &EncoderCache,
        grad_z: &Array2<f64>,
        nbrs: &Neighborhoods,
    ) -> (GatGradients, GatGradients) {
        let (conv2, grad_hidden) = self.conv2.backward(&cache.conv2, grad_z, nbrs);
        // elu'(x) = elu(x) + 1 for x <= 0
        let mut grad_pre = grad_hidden;
        grad_pre.zip_mut_with(&cache.hidden, |g, &y| {
            if y <= 0.0 {
                *g *= y + 1.0;
            }
        });
        let (conv1, _) = self.conv1.backward(&cache.conv1, &grad_pre, nbrs);
        (conv1, conv2)
    }
}

fn elu(x: f64) -> f64 {
    if x > 0.0 {
        x
    } else {
        x.exp_m1()
    }
}

/// Output of a forward pass.
#[derive(Debug, Clone)]
pub struct Reconstruction {
    /// `(N, F)`
    pub reconstructed: Array2<f64>,
    /// `(N, E)`
    pub embedding: Array2<f64>,
}

#[derive(Debug, Clone)]
pub struct Gradients {
    pub conv1: GatGradients,
    pub conv2: GatGradients,
    pub decoder_weight: Array2<f64>,
    pub decoder_bias: Array1<f64>,
}

impl Gradients {
    /// Gradient tensors in the same order as [`Autoencoder::parameters_mut`].
    pub fn tensors(&self) -> Vec<ArrayViewD<'_, f64>> {
        let mut tensors = self.conv1.tensors();
        tensors.extend(self.conv2.tensors());
        tensors.push(self.decoder_weight.view().into_dyn());
        tensors.push(self.decoder_bias.view().into_dyn());
        tensors
    }
}

#[derive(Debug, Clone)]
pub struct Autoencoder {
    pub encoder: GatEncoder,
    /// `(embedding_dim, in_channels)`
    pub decoder_weight: Array2<f64>,
    pub decoder_bias: Array1<f64>,
}

impl Autoencoder {
    /// Parameters are drawn from a generator seeded with `config.seed`, so two
    /// models built from the same config are identical.
    pub fn new(in_channels: usize, config: &ModelConfig) -> Self {
        let mut rng = Pcg64Mcg::seed_from_u64(config.seed);
        let encoder = GatEncoder::new(
            in_channels,
            config.hidden_channels,
            config.embedding_dim,
            config.heads,
            &mut rng,
        );

        let bound = 1.0 / (config.embedding_dim as f64).sqrt();
        let decoder_weight = Array2::from_shape_fn((config.embedding_dim, in_channels), |_| {
            rng.gen_range(-bound..bound)
        });
        let decoder_bias = Array1::from_shape_fn(in_channels, |_| rng.gen_range(-bound..bound));

        Self {
            encoder,
            decoder_weight,
            decoder_bias,
        }
    }

    pub fn in_channels(&self) -> usize {
        self.decoder_weight.ncols()
    }

    pub fn embedding_dim(&self) -> usize {
        self.decoder_weight.nrows()
    }

    fn decode(&self, z: &Array2<f64>) -> Array2<f64> {
        z.dot(&self.decoder_weight) + &self.decoder_bias
    }

    /// Inference pass; nothing is retained for a backward pass.
    pub fn forward(&self, x: &Array2<f64>, nbrs: &Neighborhoods) -> Reconstruction {
        let embedding = self.encoder.forward(x, nbrs);
        Reconstruction {
            reconstructed: self.decode(&embedding),
            embedding,
        }
    }

    /// Mean squared reconstruction loss over all `N * F` entries, together
    /// with its gradient for every parameter.
    pub fn loss_and_gradients(&self, x: &Array2<f64>, nbrs: &Neighborhoods) -> (f64, Gradients) {
        let (z, cache) = self.encoder.forward_with_cache(x, nbrs);
        let x_hat = self.decode(&z);

        let diff = &x_hat - x;
        let count = diff.len() as f64;
        let loss = diff.mapv(|d| d * d).sum() / count;

        let grad_x_hat = diff * (2.0 / count);
        let decoder_weight = z.t().dot(&grad_x_hat);
        let decoder_bias = grad_x_hat.sum_axis(Axis(0));
        let grad_z = grad_x_hat.dot(&self.decoder_weight.t());

        let (conv1, conv2) = self.encoder.backward(&cache, &grad_z, nbrs);
        (
            loss,
            Gradients {
                conv1,
                conv2,
                decoder_weight,
                decoder_bias,
            },
        )
    }

    pub fn parameters_mut(&mut self) -> Vec<ArrayViewMutD<'_, f64>> {
        let mut params = self.encoder.conv1.parameters_mut();
        params.extend(self.encoder.conv2.parameters_mut());
        params.push(self.decoder_weight.view_mut().into_dyn());
        params.push(self.decoder_bias.view_mut().into_dyn());
        params
    }

    pub fn num_parameters(&self) -> usize {
        let layer = |l: &GatLayer| l.weight.len() + l.att_src.len() + l.att_dst.len() + l.bias.len();
        layer(&self.encoder.conv1)
            + layer(&self.encoder.conv2)
            + self.decoder_weight.len()
            + self.decoder_bias.len()
    }
}

/// Mean squared error per row, i.e. the per-node reconstruction error.
pub fn row_mse(x: &Array2<f64>, x_hat: &Array2<f64>) -> Array1<f64> {
    let sq = (x - x_hat).mapv_into(|d| d * d);
    sq.mean_axis(Axis(1))
        .unwrap_or_else(|| Array1::zeros(x.nrows()))
}
