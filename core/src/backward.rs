//! Reverse-mode gradients for the reconstruction loss.
//!
//! Walks the [`ForwardCache`] from the output back to the input, filling a
//! zero-initialized parameter shadow. The batch-norm backward uses the
//! compact form that folds the mean/variance dependence into per-column
//! sums, so gradients stay exact for batch statistics.

use crate::forward::{ForwardCache, HalfCache};
use crate::model::{AutoencoderConfig, AutoencoderParams, DenseParams, MlpParams};
use crate::tensor::{matmul_f32, transpose_f32};

/// Dense layer backward: fills dW and db, returns dX.
fn dense_backward(
    layer: &DenseParams,
    grad: &mut DenseParams,
    input: &[f32],
    dz: &[f32],
    batch: usize,
) -> Vec<f32> {
    let (d_in, d_out) = (layer.d_in(), layer.d_out());
    debug_assert_eq!(input.len(), batch * d_in);
    debug_assert_eq!(dz.len(), batch * d_out);

    // dW = Xᵀ @ dZ
    let mut x_t = vec![0.0f32; d_in * batch];
    transpose_f32(input, &mut x_t, batch, d_in);
    matmul_f32(&x_t, dz, &mut grad.w, d_in, batch, d_out);

    // db = column sums of dZ
    for j in 0..d_out {
        let mut sum = 0.0f32;
        for b in 0..batch {
            sum += dz[b * d_out + j];
        }
        grad.b[j] = sum;
    }

    // dX = dZ @ Wᵀ
    let mut w_t = vec![0.0f32; d_out * d_in];
    transpose_f32(&layer.w, &mut w_t, d_in, d_out);
    let mut dx = vec![0.0f32; batch * d_in];
    matmul_f32(dz, &w_t, &mut dx, batch, d_out, d_in);
    dx
}

/// One encoder/decoder half in reverse. `d_out` is the gradient at the
/// half's output projection; returns the gradient at the half's input.
fn half_backward(
    mlp: &MlpParams,
    grads: &mut MlpParams,
    cfg: &AutoencoderConfig,
    cache: &HalfCache,
    d_out: &[f32],
    batch: usize,
) -> Vec<f32> {
    let mut d = dense_backward(&mlp.out, &mut grads.out, &cache.out_input, d_out, batch);

    for idx in (0..mlp.hidden.len()).rev() {
        let h = &cache.hidden[idx];
        let layer = &mlp.hidden[idx];
        let norm = &mlp.norms[idx];
        let d_cols = layer.d_out();

        // Back through dropout and ReLU.
        let mut dy = vec![0.0f32; batch * d_cols];
        for i in 0..batch * d_cols {
            if h.bn_out[i] > 0.0 {
                dy[i] = d[i] * h.drop_mask[i];
            }
        }

        // Batch-norm backward, column by column:
        //   dz = gamma * inv_std / B * (B*dy - Σdy - x_hat * Σ(dy*x_hat))
        let ngrad = &mut grads.norms[idx];
        for j in 0..d_cols {
            let mut sum_dy = 0.0f32;
            let mut sum_dy_xhat = 0.0f32;
            for b in 0..batch {
                let i = b * d_cols + j;
                sum_dy += dy[i];
                sum_dy_xhat += dy[i] * h.x_hat[i];
            }
            ngrad.beta[j] = sum_dy;
            ngrad.gamma[j] = sum_dy_xhat;

            let inv_std = 1.0 / (h.var[j] + cfg.bn_eps).sqrt();
            let scale = norm.gamma[j] * inv_std / batch as f32;
            for b in 0..batch {
                let i = b * d_cols + j;
                dy[i] = scale * (batch as f32 * dy[i] - sum_dy - h.x_hat[i] * sum_dy_xhat);
            }
        }

        d = dense_backward(layer, &mut grads.hidden[idx], &h.input, &dy, batch);
    }
    d
}

/// Gradients of the mean-squared reconstruction loss with respect to every
/// parameter. The L2 penalty is added separately by the trainer.
pub fn backward(
    params: &AutoencoderParams,
    cfg: &AutoencoderConfig,
    cache: &ForwardCache,
    target: &[f32],
) -> AutoencoderParams {
    let batch = cache.batch;
    let n = batch * cfg.spectrum_dim;
    debug_assert_eq!(target.len(), n);

    let mut grads = AutoencoderParams::zeros_like(cfg);

    // d(MSE)/d(output) with the mean taken over all B*D elements.
    let mut d_output = vec![0.0f32; n];
    for i in 0..n {
        d_output[i] = 2.0 * (cache.output[i] - target[i]) / n as f32;
    }

    let d_latent = half_backward(
        &params.decoder,
        &mut grads.decoder,
        cfg,
        &cache.decoder,
        &d_output,
        batch,
    );
    half_backward(
        &params.encoder,
        &mut grads.encoder,
        cfg,
        &cache.encoder,
        &d_latent,
        batch,
    );
    grads
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::forward::forward_train;
    use crate::model::{AutoencoderConfig, AutoencoderParams, BatchNormState};
    use crate::tensor::SimpleRng;

    fn no_dropout_config() -> AutoencoderConfig {
        let mut cfg = AutoencoderConfig::test_config();
        cfg.dropout_rate = 0.0;
        cfg
    }

    #[test]
    fn test_grad_shapes_match_params() {
        let cfg = no_dropout_config();
        let params = AutoencoderParams::init(&cfg, 42);
        let mut state = BatchNormState::init(&cfg);
        let mut rng = SimpleRng::new(1);

        let batch = 4;
        let mut x = vec![0.0f32; batch * cfg.spectrum_dim];
        SimpleRng::new(2).fill_normal(&mut x, 1.0);

        let cache = forward_train(&params, &cfg, &mut state, &x, batch, &mut rng);
        let grads = backward(&params, &cfg, &cache, &x);

        let pb = params.buffers();
        let gb = grads.buffers();
        assert_eq!(pb.len(), gb.len());
        for (p, g) in pb.iter().zip(gb.iter()) {
            assert_eq!(p.len(), g.len());
        }
    }

    #[test]
    fn test_gradients_nonzero_and_finite() {
        let cfg = no_dropout_config();
        let params = AutoencoderParams::init(&cfg, 42);
        let mut state = BatchNormState::init(&cfg);
        let mut rng = SimpleRng::new(1);

        let batch = 4;
        let mut x = vec![0.0f32; batch * cfg.spectrum_dim];
        SimpleRng::new(2).fill_normal(&mut x, 1.0);
        let mut target = vec![0.0f32; batch * cfg.spectrum_dim];
        SimpleRng::new(3).fill_normal(&mut target, 1.0);

        let cache = forward_train(&params, &cfg, &mut state, &x, batch, &mut rng);
        let grads = backward(&params, &cfg, &cache, &target);

        let mut any_nonzero = false;
        for buf in grads.buffers() {
            for &g in buf {
                assert!(g.is_finite(), "non-finite gradient {g}");
                if g != 0.0 {
                    any_nonzero = true;
                }
            }
        }
        assert!(any_nonzero, "all gradients zero for a nonzero error");
    }

    #[test]
    fn test_backward_deterministic() {
        let cfg = no_dropout_config();
        let params = AutoencoderParams::init(&cfg, 42);
        let batch = 4;
        let mut x = vec![0.0f32; batch * cfg.spectrum_dim];
        SimpleRng::new(2).fill_normal(&mut x, 1.0);

        let run = || {
            let mut state = BatchNormState::init(&cfg);
            let mut rng = SimpleRng::new(1);
            let cache = forward_train(&params, &cfg, &mut state, &x, batch, &mut rng);
            backward(&params, &cfg, &cache, &x)
        };
        let g1 = run();
        let g2 = run();
        assert_eq!(g1.encoder.hidden[0].w, g2.encoder.hidden[0].w);
        assert_eq!(g1.decoder.out.b, g2.decoder.out.b);
    }
}
