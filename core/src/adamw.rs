//! AdamW optimizer with decoupled weight decay, plus global-norm gradient
//! clipping.
//!
//! Moment buffers are keyed by position in [`AutoencoderParams::buffers`],
//! which guarantees a stable order across steps.

use crate::model::AutoencoderParams;
use crate::tensor::sum_squares_f32;

#[derive(Clone, Copy, Debug)]
pub struct AdamWConfig {
    pub beta1: f32,
    pub beta2: f32,
    pub eps: f32,
    /// Decoupled weight decay applied directly to the parameters.
    pub weight_decay: f32,
}

impl Default for AdamWConfig {
    fn default() -> Self {
        AdamWConfig {
            beta1: 0.9,
            beta2: 0.999,
            eps: 1e-8,
            weight_decay: 1e-4,
        }
    }
}

/// First/second moment estimates for one parameter buffer.
struct MomentBuf {
    m: Vec<f32>,
    v: Vec<f32>,
}

pub struct AdamW {
    config: AdamWConfig,
    bufs: Vec<MomentBuf>,
    step: u64,
}

impl AdamW {
    /// Allocate zeroed moments matching the model's parameter buffers.
    pub fn new(params: &AutoencoderParams, config: AdamWConfig) -> Self {
        let bufs = params
            .buffers()
            .iter()
            .map(|b| MomentBuf {
                m: vec![0.0f32; b.len()],
                v: vec![0.0f32; b.len()],
            })
            .collect();
        AdamW {
            config,
            bufs,
            step: 0,
        }
    }

    pub fn step_count(&self) -> u64 {
        self.step
    }

    /// One optimizer step: bias-corrected Adam update plus decoupled decay.
    pub fn step(&mut self, params: &mut AutoencoderParams, grads: &AutoencoderParams, lr: f32) {
        self.step += 1;
        let t = self.step as f32;
        let c = self.config;
        // Inverses of the bias-correction terms, hoisted out of the loop.
        let bc1_inv = 1.0 / (1.0 - c.beta1.powf(t));
        let bc2_inv = 1.0 / (1.0 - c.beta2.powf(t));

        let param_bufs = params.buffers_mut();
        let grad_bufs = grads.buffers();
        debug_assert_eq!(param_bufs.len(), self.bufs.len());
        debug_assert_eq!(grad_bufs.len(), self.bufs.len());

        for ((p, g), moments) in param_bufs
            .into_iter()
            .zip(grad_bufs.into_iter())
            .zip(self.bufs.iter_mut())
        {
            for i in 0..p.len() {
                let grad = g[i];
                moments.m[i] = c.beta1 * moments.m[i] + (1.0 - c.beta1) * grad;
                moments.v[i] = c.beta2 * moments.v[i] + (1.0 - c.beta2) * grad * grad;
                let m_hat = moments.m[i] * bc1_inv;
                let v_hat = moments.v[i] * bc2_inv;
                p[i] -= lr * (m_hat / (v_hat.sqrt() + c.eps) + c.weight_decay * p[i]);
            }
        }
    }
}

/// Scale gradients in place so their global L2 norm does not exceed
/// `max_norm`. Returns the pre-clip norm.
pub fn clip_global_norm(grads: &mut AutoencoderParams, max_norm: f32) -> f32 {
    let total: f32 = grads.buffers().iter().map(|b| sum_squares_f32(b)).sum();
    let norm = total.sqrt();
    if norm > max_norm && norm > 0.0 {
        let scale = max_norm / norm;
        for buf in grads.buffers_mut() {
            for g in buf.iter_mut() {
                *g *= scale;
            }
        }
    }
    norm
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::AutoencoderConfig;
    use crate::tensor::SimpleRng;

    fn setup() -> (AutoencoderConfig, AutoencoderParams, AutoencoderParams) {
        let cfg = AutoencoderConfig::test_config();
        let params = AutoencoderParams::init(&cfg, 42);
        let mut grads = AutoencoderParams::zeros_like(&cfg);
        let mut rng = SimpleRng::new(7);
        for buf in grads.buffers_mut() {
            rng.fill_normal(buf, 0.1);
        }
        (cfg, params, grads)
    }

    #[test]
    fn test_step_moves_params_against_gradient() {
        let (_, mut params, mut grads) = setup();
        // Constant positive gradient on one weight: AdamW must decrease it.
        for buf in grads.buffers_mut() {
            for g in buf.iter_mut() {
                *g = 1.0;
            }
        }
        let before = params.encoder.hidden[0].w[0];
        let mut opt = AdamW::new(&params, AdamWConfig::default());
        opt.step(&mut params, &grads, 1e-3);
        assert!(params.encoder.hidden[0].w[0] < before);
        assert_eq!(opt.step_count(), 1);
    }

    #[test]
    fn test_weight_decay_shrinks_params_without_gradient() {
        let (cfg, mut params, _) = setup();
        let grads = AutoencoderParams::zeros_like(&cfg);
        let config = AdamWConfig {
            weight_decay: 0.1,
            ..AdamWConfig::default()
        };
        let before = params.encoder.hidden[0].w[0];
        let mut opt = AdamW::new(&params, config);
        opt.step(&mut params, &grads, 1.0);
        let after = params.encoder.hidden[0].w[0];
        assert!(
            after.abs() < before.abs() || before == 0.0,
            "decay should pull weights toward zero: {before} -> {after}"
        );
    }

    #[test]
    fn test_step_first_iteration_magnitude() {
        // With zero moments and bias correction, the first Adam update has
        // magnitude ≈ lr regardless of gradient scale.
        let (_, mut params, mut grads) = setup();
        for buf in grads.buffers_mut() {
            for g in buf.iter_mut() {
                *g = 0.5;
            }
        }
        let config = AdamWConfig {
            weight_decay: 0.0,
            ..AdamWConfig::default()
        };
        let before = params.encoder.hidden[0].w[0];
        let mut opt = AdamW::new(&params, config);
        let lr = 1e-3;
        opt.step(&mut params, &grads, lr);
        let delta = (params.encoder.hidden[0].w[0] - before).abs();
        assert!((delta - lr).abs() < lr * 0.01, "first-step size {delta}, expected ~{lr}");
    }

    #[test]
    fn test_clip_reduces_large_norm() {
        let (_, _, mut grads) = setup();
        let before = clip_global_norm(&mut grads, f32::INFINITY);
        assert!(before > 1.0, "test gradients should start with norm > 1");

        let pre = clip_global_norm(&mut grads, 1.0);
        assert!((pre - before).abs() < 1e-3);
        let after: f32 = grads
            .buffers()
            .iter()
            .map(|b| crate::tensor::sum_squares_f32(b))
            .sum::<f32>()
            .sqrt();
        assert!((after - 1.0).abs() < 1e-3, "clipped norm {after} != 1");
    }

    #[test]
    fn test_clip_leaves_small_norm_untouched() {
        let cfg = AutoencoderConfig::test_config();
        let mut grads = AutoencoderParams::zeros_like(&cfg);
        grads.encoder.hidden[0].w[0] = 0.5;
        let norm = clip_global_norm(&mut grads, 1.0);
        assert!((norm - 0.5).abs() < 1e-6);
        assert_eq!(grads.encoder.hidden[0].w[0], 0.5);
    }
}
