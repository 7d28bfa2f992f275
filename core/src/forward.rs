//! Forward pass: encoder → latent → decoder, with an activation cache for
//! the backward pass.
//!
//! Each hidden layer is Dense → BatchNorm → ReLU → Dropout. Training mode
//! normalizes with batch statistics (updating the running averages with the
//! configured momentum) and applies inverted dropout; inference mode uses
//! the running averages and no dropout.

use crate::model::{AutoencoderConfig, AutoencoderParams, BatchNormState, DenseParams, MlpParams};
use crate::tensor::{add_bias_f32, matmul_f32, relu_f32, SimpleRng};

/// Intermediates of one hidden layer, kept for backward.
pub struct HiddenCache {
    /// Layer input: [batch, d_in].
    pub input: Vec<f32>,
    /// Batch variance used for normalization: [d_out].
    pub var: Vec<f32>,
    /// Normalized pre-scale activations: [batch, d_out].
    pub x_hat: Vec<f32>,
    /// gamma * x_hat + beta, before ReLU: [batch, d_out].
    pub bn_out: Vec<f32>,
    /// Inverted dropout mask (0 or 1/keep): [batch, d_out].
    pub drop_mask: Vec<f32>,
}

/// Intermediates of one encoder/decoder half.
pub struct HalfCache {
    pub hidden: Vec<HiddenCache>,
    /// Input to the half's output projection: [batch, d].
    pub out_input: Vec<f32>,
}

/// All intermediate activations from a training forward pass.
pub struct ForwardCache {
    pub encoder: HalfCache,
    /// Latent codes: [batch, latent_dim].
    pub latent: Vec<f32>,
    pub decoder: HalfCache,
    /// Reconstructed spectra: [batch, spectrum_dim].
    pub output: Vec<f32>,
    pub batch: usize,
}

fn dense_forward(layer: &DenseParams, x: &[f32], batch: usize) -> Vec<f32> {
    let (d_in, d_out) = (layer.d_in(), layer.d_out());
    let mut z = vec![0.0f32; batch * d_out];
    matmul_f32(x, &layer.w, &mut z, batch, d_in, d_out);
    add_bias_f32(&mut z, &layer.b, batch, d_out);
    z
}

/// One half in training mode: caches every intermediate and updates the
/// running batch-norm statistics in place.
fn half_forward_train(
    mlp: &MlpParams,
    state: &mut [crate::model::RunningStats],
    cfg: &AutoencoderConfig,
    x: &[f32],
    batch: usize,
    rng: &mut SimpleRng,
) -> (HalfCache, Vec<f32>) {
    let mut cur = x.to_vec();
    let mut hidden = Vec::with_capacity(mlp.hidden.len());

    for (layer_idx, layer) in mlp.hidden.iter().enumerate() {
        let d = layer.d_out();
        let z = dense_forward(layer, &cur, batch);

        // Batch statistics (biased variance), then running-average update.
        let mut mean = vec![0.0f32; d];
        let mut var = vec![0.0f32; d];
        for j in 0..d {
            let mut sum = 0.0f32;
            for b in 0..batch {
                sum += z[b * d + j];
            }
            mean[j] = sum / batch as f32;
            let mut v = 0.0f32;
            for b in 0..batch {
                let diff = z[b * d + j] - mean[j];
                v += diff * diff;
            }
            var[j] = v / batch as f32;
        }
        let running = &mut state[layer_idx];
        let m = cfg.bn_momentum;
        for j in 0..d {
            running.mean[j] = m * running.mean[j] + (1.0 - m) * mean[j];
            running.var[j] = m * running.var[j] + (1.0 - m) * var[j];
        }

        let norm = &mlp.norms[layer_idx];
        let mut x_hat = vec![0.0f32; batch * d];
        let mut bn_out = vec![0.0f32; batch * d];
        for j in 0..d {
            let inv_std = 1.0 / (var[j] + cfg.bn_eps).sqrt();
            for b in 0..batch {
                let xh = (z[b * d + j] - mean[j]) * inv_std;
                x_hat[b * d + j] = xh;
                bn_out[b * d + j] = norm.gamma[j] * xh + norm.beta[j];
            }
        }

        // ReLU then inverted dropout.
        let keep = 1.0 - cfg.dropout_rate;
        let mut drop_mask = vec![1.0f32; batch * d];
        let mut act = vec![0.0f32; batch * d];
        for i in 0..batch * d {
            let relu = bn_out[i].max(0.0);
            let mask = if cfg.dropout_rate > 0.0 {
                if rng.uniform01() < cfg.dropout_rate {
                    0.0
                } else {
                    1.0 / keep
                }
            } else {
                1.0
            };
            drop_mask[i] = mask;
            act[i] = relu * mask;
        }

        hidden.push(HiddenCache {
            input: std::mem::take(&mut cur),
            var,
            x_hat,
            bn_out,
            drop_mask,
        });
        cur = act;
    }

    let out_input = cur.clone();
    let out = dense_forward(&mlp.out, &cur, batch);
    (HalfCache { hidden, out_input }, out)
}

/// One half in inference mode: running-average batch norm, no dropout, no
/// caching.
fn half_forward_eval(
    mlp: &MlpParams,
    state: &[crate::model::RunningStats],
    cfg: &AutoencoderConfig,
    x: &[f32],
    batch: usize,
) -> Vec<f32> {
    let mut cur = x.to_vec();
    for (layer_idx, layer) in mlp.hidden.iter().enumerate() {
        let d = layer.d_out();
        let mut z = dense_forward(layer, &cur, batch);
        let running = &state[layer_idx];
        let norm = &mlp.norms[layer_idx];
        for j in 0..d {
            let inv_std = 1.0 / (running.var[j] + cfg.bn_eps).sqrt();
            for b in 0..batch {
                let xh = (z[b * d + j] - running.mean[j]) * inv_std;
                z[b * d + j] = norm.gamma[j] * xh + norm.beta[j];
            }
        }
        relu_f32(&mut z);
        cur = z;
    }
    dense_forward(&mlp.out, &cur, batch)
}

/// Training forward pass. Mutates the running batch-norm statistics and
/// returns every intermediate needed by `backward`.
pub fn forward_train(
    params: &AutoencoderParams,
    cfg: &AutoencoderConfig,
    state: &mut BatchNormState,
    x: &[f32],
    batch: usize,
    rng: &mut SimpleRng,
) -> ForwardCache {
    debug_assert_eq!(x.len(), batch * cfg.spectrum_dim);

    let (enc_cache, latent) =
        half_forward_train(&params.encoder, &mut state.encoder, cfg, x, batch, rng);
    let (dec_cache, output) =
        half_forward_train(&params.decoder, &mut state.decoder, cfg, &latent, batch, rng);

    ForwardCache {
        encoder: enc_cache,
        latent,
        decoder: dec_cache,
        output,
        batch,
    }
}

/// Inference forward pass: reconstructed spectra only.
pub fn forward_eval(
    params: &AutoencoderParams,
    cfg: &AutoencoderConfig,
    state: &BatchNormState,
    x: &[f32],
    batch: usize,
) -> Vec<f32> {
    debug_assert_eq!(x.len(), batch * cfg.spectrum_dim);
    let latent = half_forward_eval(&params.encoder, &state.encoder, cfg, x, batch);
    half_forward_eval(&params.decoder, &state.decoder, cfg, &latent, batch)
}

/// Inference-mode latent codes for a batch of spectra.
pub fn encode(
    params: &AutoencoderParams,
    cfg: &AutoencoderConfig,
    state: &BatchNormState,
    x: &[f32],
    batch: usize,
) -> Vec<f32> {
    debug_assert_eq!(x.len(), batch * cfg.spectrum_dim);
    half_forward_eval(&params.encoder, &state.encoder, cfg, x, batch)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{AutoencoderConfig, AutoencoderParams, BatchNormState};

    fn toy_batch(cfg: &AutoencoderConfig, batch: usize, seed: u64) -> Vec<f32> {
        let mut rng = SimpleRng::new(seed);
        let mut x = vec![0.0f32; batch * cfg.spectrum_dim];
        rng.fill_normal(&mut x, 1.0);
        x
    }

    #[test]
    fn test_forward_shapes() {
        let cfg = AutoencoderConfig::test_config();
        let params = AutoencoderParams::init(&cfg, 42);
        let mut state = BatchNormState::init(&cfg);
        let mut rng = SimpleRng::new(1);
        let batch = 4;
        let x = toy_batch(&cfg, batch, 2);

        let cache = forward_train(&params, &cfg, &mut state, &x, batch, &mut rng);
        assert_eq!(cache.latent.len(), batch * cfg.latent_dim);
        assert_eq!(cache.output.len(), batch * cfg.spectrum_dim);
        assert_eq!(cache.encoder.hidden.len(), cfg.encoder_widths.len());

        let out = forward_eval(&params, &cfg, &state, &x, batch);
        assert_eq!(out.len(), batch * cfg.spectrum_dim);
    }

    #[test]
    fn test_train_updates_running_stats() {
        let cfg = AutoencoderConfig::test_config();
        let params = AutoencoderParams::init(&cfg, 42);
        let mut state = BatchNormState::init(&cfg);
        let mut rng = SimpleRng::new(1);
        let x = toy_batch(&cfg, 4, 2);

        let before = state.encoder[0].mean.clone();
        forward_train(&params, &cfg, &mut state, &x, 4, &mut rng);
        assert_ne!(
            state.encoder[0].mean, before,
            "training forward must update running means"
        );
    }

    #[test]
    fn test_eval_does_not_mutate_state() {
        let cfg = AutoencoderConfig::test_config();
        let params = AutoencoderParams::init(&cfg, 42);
        let state = BatchNormState::init(&cfg);
        let x = toy_batch(&cfg, 4, 2);

        let snapshot = state.encoder[0].mean.clone();
        forward_eval(&params, &cfg, &state, &x, 4);
        assert_eq!(state.encoder[0].mean, snapshot);
    }

    #[test]
    fn test_eval_deterministic() {
        let cfg = AutoencoderConfig::test_config();
        let params = AutoencoderParams::init(&cfg, 42);
        let state = BatchNormState::init(&cfg);
        let x = toy_batch(&cfg, 4, 2);
        let a = forward_eval(&params, &cfg, &state, &x, 4);
        let b = forward_eval(&params, &cfg, &state, &x, 4);
        assert_eq!(a, b, "inference must be deterministic (no dropout)");
    }

    #[test]
    fn test_dropout_masks_only_zero_or_scale() {
        let cfg = AutoencoderConfig::test_config();
        let params = AutoencoderParams::init(&cfg, 42);
        let mut state = BatchNormState::init(&cfg);
        let mut rng = SimpleRng::new(1);
        let x = toy_batch(&cfg, 8, 2);

        let cache = forward_train(&params, &cfg, &mut state, &x, 8, &mut rng);
        let keep = 1.0 / (1.0 - cfg.dropout_rate);
        for h in &cache.encoder.hidden {
            for &m in &h.drop_mask {
                assert!(
                    m == 0.0 || (m - keep).abs() < 1e-6,
                    "dropout mask value {m} is neither 0 nor 1/keep"
                );
            }
        }
    }

    #[test]
    fn test_encode_latent_dim() {
        let cfg = AutoencoderConfig::test_config();
        let params = AutoencoderParams::init(&cfg, 42);
        let state = BatchNormState::init(&cfg);
        let x = toy_batch(&cfg, 2, 5);
        let latent = encode(&params, &cfg, &state, &x, 2);
        assert_eq!(latent.len(), 2 * cfg.latent_dim);
        assert!(latent.iter().all(|v| v.is_finite()));
    }
}
