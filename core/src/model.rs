//! Autoencoder configuration and parameters.
//!
//! Symmetric dense encoder/decoder with batch normalization: the encoder
//! narrows through its hidden widths to a low-dimensional latent code, the
//! decoder mirrors the widths back to the spectrum dimension. All weight
//! matrices are flat Vec<f32> in row-major layout.

use crate::tensor::SimpleRng;
use serde::{Deserialize, Serialize};

/// Model configuration — immutable after construction.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AutoencoderConfig {
    /// Number of wavelength bins per spectrum.
    pub spectrum_dim: usize,
    /// Latent code dimension.
    pub latent_dim: usize,
    /// Encoder hidden widths; the decoder uses them reversed.
    pub encoder_widths: Vec<usize>,
    /// Dropout rate applied after each hidden activation during training.
    pub dropout_rate: f32,
    /// Batch-norm running-average momentum.
    pub bn_momentum: f32,
    /// Batch-norm variance epsilon.
    pub bn_eps: f32,
}

impl AutoencoderConfig {
    /// Production configuration: 1024→512→256 hidden widths.
    pub fn new(spectrum_dim: usize, latent_dim: usize) -> Self {
        AutoencoderConfig {
            spectrum_dim,
            latent_dim,
            encoder_widths: vec![1024, 512, 256],
            dropout_rate: 0.2,
            bn_momentum: 0.9,
            bn_eps: 1e-5,
        }
    }

    /// Test configuration: tiny model for fast iteration.
    pub fn test_config() -> Self {
        AutoencoderConfig {
            spectrum_dim: 12,
            latent_dim: 3,
            encoder_widths: vec![8, 6],
            dropout_rate: 0.2,
            bn_momentum: 0.9,
            bn_eps: 1e-5,
        }
    }

    /// Decoder hidden widths: encoder widths reversed.
    pub fn decoder_widths(&self) -> Vec<usize> {
        let mut w = self.encoder_widths.clone();
        w.reverse();
        w
    }
}

/// One dense layer: W[d_in, d_out] row-major plus a bias row.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DenseParams {
    pub w: Vec<f32>,
    pub b: Vec<f32>,
}

impl DenseParams {
    /// He-normal kernel init (std = sqrt(2 / fan_in)), zero bias.
    pub fn init(d_in: usize, d_out: usize, rng: &mut SimpleRng) -> Self {
        let mut w = vec![0.0f32; d_in * d_out];
        rng.fill_normal(&mut w, (2.0 / d_in as f32).sqrt());
        DenseParams {
            w,
            b: vec![0.0f32; d_out],
        }
    }

    pub fn zeros(d_in: usize, d_out: usize) -> Self {
        DenseParams {
            w: vec![0.0f32; d_in * d_out],
            b: vec![0.0f32; d_out],
        }
    }

    pub fn d_out(&self) -> usize {
        self.b.len()
    }

    pub fn d_in(&self) -> usize {
        self.w.len() / self.b.len()
    }
}

/// Batch-norm scale/shift, one pair per feature.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct BatchNormParams {
    pub gamma: Vec<f32>,
    pub beta: Vec<f32>,
}

impl BatchNormParams {
    pub fn init(d: usize) -> Self {
        BatchNormParams {
            gamma: vec![1.0f32; d],
            beta: vec![0.0f32; d],
        }
    }

    pub fn zeros(d: usize) -> Self {
        BatchNormParams {
            gamma: vec![0.0f32; d],
            beta: vec![0.0f32; d],
        }
    }
}

/// One half of the autoencoder: hidden (dense + batch-norm) layers followed
/// by an unnormalized output projection.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct MlpParams {
    pub hidden: Vec<DenseParams>,
    pub norms: Vec<BatchNormParams>,
    pub out: DenseParams,
}

impl MlpParams {
    fn init(d_in: usize, widths: &[usize], d_out: usize, rng: &mut SimpleRng) -> Self {
        let mut hidden = Vec::with_capacity(widths.len());
        let mut norms = Vec::with_capacity(widths.len());
        let mut prev = d_in;
        for &w in widths {
            hidden.push(DenseParams::init(prev, w, rng));
            norms.push(BatchNormParams::init(w));
            prev = w;
        }
        MlpParams {
            hidden,
            norms,
            out: DenseParams::init(prev, d_out, rng),
        }
    }

    fn zeros(d_in: usize, widths: &[usize], d_out: usize) -> Self {
        let mut hidden = Vec::with_capacity(widths.len());
        let mut norms = Vec::with_capacity(widths.len());
        let mut prev = d_in;
        for &w in widths {
            hidden.push(DenseParams::zeros(prev, w));
            norms.push(BatchNormParams::zeros(w));
            prev = w;
        }
        MlpParams {
            hidden,
            norms,
            out: DenseParams::zeros(prev, d_out),
        }
    }

    fn buffers(&self) -> Vec<&Vec<f32>> {
        let mut v = Vec::new();
        for l in &self.hidden {
            v.push(&l.w);
            v.push(&l.b);
        }
        for n in &self.norms {
            v.push(&n.gamma);
            v.push(&n.beta);
        }
        v.push(&self.out.w);
        v.push(&self.out.b);
        v
    }

    fn buffers_mut(&mut self) -> Vec<&mut Vec<f32>> {
        let mut v = Vec::new();
        for l in &mut self.hidden {
            v.push(&mut l.w);
            v.push(&mut l.b);
        }
        for n in &mut self.norms {
            v.push(&mut n.gamma);
            v.push(&mut n.beta);
        }
        v.push(&mut self.out.w);
        v.push(&mut self.out.b);
        v
    }
}

/// All learnable parameters.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AutoencoderParams {
    pub encoder: MlpParams,
    pub decoder: MlpParams,
}

impl AutoencoderParams {
    /// Initialize both halves with He-normal kernels.
    pub fn init(cfg: &AutoencoderConfig, seed: u64) -> Self {
        let mut rng = SimpleRng::new(seed);
        let encoder = MlpParams::init(
            cfg.spectrum_dim,
            &cfg.encoder_widths,
            cfg.latent_dim,
            &mut rng,
        );
        let decoder = MlpParams::init(
            cfg.latent_dim,
            &cfg.decoder_widths(),
            cfg.spectrum_dim,
            &mut rng,
        );
        AutoencoderParams { encoder, decoder }
    }

    /// Create a zero-initialized shadow for gradient accumulation.
    pub fn zeros_like(cfg: &AutoencoderConfig) -> Self {
        AutoencoderParams {
            encoder: MlpParams::zeros(cfg.spectrum_dim, &cfg.encoder_widths, cfg.latent_dim),
            decoder: MlpParams::zeros(cfg.latent_dim, &cfg.decoder_widths(), cfg.spectrum_dim),
        }
    }

    /// Every parameter buffer in a fixed order (encoder first). The AdamW
    /// moment buffers rely on this order being stable.
    pub fn buffers(&self) -> Vec<&Vec<f32>> {
        let mut v = self.encoder.buffers();
        v.extend(self.decoder.buffers());
        v
    }

    pub fn buffers_mut(&mut self) -> Vec<&mut Vec<f32>> {
        let mut v = self.encoder.buffers_mut();
        v.extend(self.decoder.buffers_mut());
        v
    }

    /// Total number of parameters.
    pub fn num_params(&self) -> usize {
        self.buffers().iter().map(|b| b.len()).sum()
    }
}

/// Running mean/variance for one batch-norm layer.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RunningStats {
    pub mean: Vec<f32>,
    pub var: Vec<f32>,
}

impl RunningStats {
    pub fn init(d: usize) -> Self {
        RunningStats {
            mean: vec![0.0f32; d],
            var: vec![1.0f32; d],
        }
    }
}

/// Batch-norm running statistics for the whole model. Mutated by training
/// forward passes, read by inference; checkpointed alongside the params.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct BatchNormState {
    pub encoder: Vec<RunningStats>,
    pub decoder: Vec<RunningStats>,
}

impl BatchNormState {
    pub fn init(cfg: &AutoencoderConfig) -> Self {
        BatchNormState {
            encoder: cfg.encoder_widths.iter().map(|&w| RunningStats::init(w)).collect(),
            decoder: cfg.decoder_widths().iter().map(|&w| RunningStats::init(w)).collect(),
        }
    }
}

// ── Checkpoint Serialization ─────────────────────────────────────────

/// Internal wrapper for the JSON checkpoint format: one training-state
/// snapshot versioned as a unit.
#[derive(Serialize, Deserialize)]
struct TrainCheckpoint {
    config: AutoencoderConfig,
    params: AutoencoderParams,
    batch_stats: BatchNormState,
    step: u64,
}

/// Save the best snapshot (params + batch-norm running stats + step) to a
/// JSON file.
pub fn save_checkpoint(
    path: &std::path::Path,
    params: &AutoencoderParams,
    batch_stats: &BatchNormState,
    config: &AutoencoderConfig,
    step: u64,
) -> std::io::Result<()> {
    let checkpoint = TrainCheckpoint {
        config: config.clone(),
        params: params.clone(),
        batch_stats: batch_stats.clone(),
        step,
    };
    let json = serde_json::to_string(&checkpoint)
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
    std::fs::write(path, json)
}

/// Load a snapshot from a JSON checkpoint file.
pub fn load_checkpoint(
    path: &std::path::Path,
) -> std::io::Result<(AutoencoderParams, BatchNormState, AutoencoderConfig, u64)> {
    let json = std::fs::read_to_string(path)?;
    let checkpoint: TrainCheckpoint = serde_json::from_str(&json)
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
    Ok((
        checkpoint.params,
        checkpoint.batch_stats,
        checkpoint.config,
        checkpoint.step,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_deterministic() {
        let cfg = AutoencoderConfig::test_config();
        let p1 = AutoencoderParams::init(&cfg, 42);
        let p2 = AutoencoderParams::init(&cfg, 42);
        assert_eq!(p1.encoder.hidden[0].w, p2.encoder.hidden[0].w);
        assert_eq!(p1.decoder.out.w, p2.decoder.out.w);
    }

    #[test]
    fn test_param_shapes() {
        let cfg = AutoencoderConfig::test_config();
        let p = AutoencoderParams::init(&cfg, 42);
        assert_eq!(p.encoder.hidden.len(), 2);
        assert_eq!(p.encoder.hidden[0].w.len(), 12 * 8);
        assert_eq!(p.encoder.hidden[1].w.len(), 8 * 6);
        assert_eq!(p.encoder.out.w.len(), 6 * 3);
        // Decoder mirrors: 3 → 6 → 8 → 12
        assert_eq!(p.decoder.hidden[0].w.len(), 3 * 6);
        assert_eq!(p.decoder.hidden[1].w.len(), 6 * 8);
        assert_eq!(p.decoder.out.w.len(), 8 * 12);
        // One norm pair per hidden layer
        assert_eq!(p.encoder.norms.len(), 2);
        assert_eq!(p.encoder.norms[1].gamma.len(), 6);
    }

    #[test]
    fn test_batchnorm_init_values() {
        let cfg = AutoencoderConfig::test_config();
        let p = AutoencoderParams::init(&cfg, 42);
        assert!(p.encoder.norms[0].gamma.iter().all(|&g| g == 1.0));
        assert!(p.encoder.norms[0].beta.iter().all(|&b| b == 0.0));
        let state = BatchNormState::init(&cfg);
        assert!(state.encoder[0].mean.iter().all(|&m| m == 0.0));
        assert!(state.encoder[0].var.iter().all(|&v| v == 1.0));
    }

    #[test]
    fn test_zeros_like() {
        let cfg = AutoencoderConfig::test_config();
        let z = AutoencoderParams::zeros_like(&cfg);
        assert!(z.buffers().iter().all(|b| b.iter().all(|&x| x == 0.0)));
    }

    #[test]
    fn test_buffers_order_matches_num_params() {
        let cfg = AutoencoderConfig::test_config();
        let p = AutoencoderParams::init(&cfg, 42);
        let z = AutoencoderParams::zeros_like(&cfg);
        let pb = p.buffers();
        let zb = z.buffers();
        assert_eq!(pb.len(), zb.len());
        for (a, b) in pb.iter().zip(zb.iter()) {
            assert_eq!(a.len(), b.len(), "buffer order mismatch between init and zeros_like");
        }
        assert_eq!(p.num_params(), pb.iter().map(|b| b.len()).sum::<usize>());
    }

    #[test]
    fn test_he_init_scale() {
        let cfg = AutoencoderConfig::test_config();
        let p = AutoencoderParams::init(&cfg, 42);
        // He std for fan_in=12 is sqrt(2/12) ≈ 0.41; sampled weights should
        // stay well inside a few sigma.
        for &v in &p.encoder.hidden[0].w {
            assert!(v.abs() < 2.5, "weight {v} implausibly large for He init");
        }
    }

    #[test]
    fn test_checkpoint_roundtrip() {
        let cfg = AutoencoderConfig::test_config();
        let p = AutoencoderParams::init(&cfg, 42);
        let state = BatchNormState::init(&cfg);
        let path = std::env::temp_dir().join("specae_model_ckpt_test.json");
        save_checkpoint(&path, &p, &state, &cfg, 17).expect("save");
        let (p2, state2, cfg2, step) = load_checkpoint(&path).expect("load");
        std::fs::remove_file(&path).ok();

        assert_eq!(step, 17);
        assert_eq!(cfg2.spectrum_dim, cfg.spectrum_dim);
        assert_eq!(cfg2.encoder_widths, cfg.encoder_widths);
        assert_eq!(p2.encoder.hidden[0].w, p.encoder.hidden[0].w);
        assert_eq!(state2.decoder[0].var, state.decoder[0].var);
    }

    #[test]
    fn test_load_missing_checkpoint_errors() {
        let path = std::path::Path::new("/nonexistent/specae_ckpt.json");
        assert!(load_checkpoint(path).is_err());
    }
}
