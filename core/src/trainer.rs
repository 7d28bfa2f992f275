//! Training loop: shuffled mini-batches, AdamW with global-norm clipping,
//! plateau learning-rate decay, early stopping, and best-checkpoint
//! persistence.
//!
//! The monitored quantity is the reconstruction MSE on the held-out test
//! split, evaluated in inference mode after every epoch. The checkpoint on
//! disk always corresponds to the best test loss seen so far.

use crate::adamw::{clip_global_norm, AdamW, AdamWConfig};
use crate::backward::backward;
use crate::dataset::SpectralDataset;
use crate::error::SpecAeError;
use crate::forward::{forward_eval, forward_train};
use crate::model::{
    save_checkpoint, AutoencoderConfig, AutoencoderParams, BatchNormState,
};
use crate::tensor::{mse_f32, sum_squares_f32, SimpleRng};
use std::path::PathBuf;

/// Hyperparameters of one training run.
#[derive(Clone, Debug)]
pub struct TrainConfig {
    pub num_epochs: usize,
    pub batch_size: usize,
    /// Initial learning rate; decays on test-loss plateaus.
    pub learning_rate: f32,
    /// Epochs without improvement before stopping.
    pub patience: usize,
    /// Minimum test-loss decrease that counts as improvement.
    pub min_delta: f32,
    /// Epochs without improvement before the learning rate is reduced.
    pub lr_patience: usize,
    pub lr_factor: f32,
    pub min_lr: f32,
    /// L2 penalty coefficient over all parameters.
    pub l2_lambda: f32,
    /// Global gradient-norm clip threshold.
    pub clip_norm: f32,
    pub seed: u64,
    /// Where the best snapshot is written.
    pub checkpoint_path: PathBuf,
}

impl TrainConfig {
    pub fn new(checkpoint_path: PathBuf) -> Self {
        TrainConfig {
            num_epochs: 100,
            batch_size: 32,
            learning_rate: 1e-3,
            patience: 10,
            min_delta: 1e-4,
            lr_patience: 3,
            lr_factor: 0.5,
            min_lr: 1e-7,
            l2_lambda: 1e-4,
            clip_norm: 1.0,
            seed: 0,
            checkpoint_path,
        }
    }
}

/// Loss components averaged over one epoch's batches.
#[derive(Clone, Copy, Debug)]
pub struct EpochLosses {
    pub total: f32,
    pub recon: f32,
    pub l2: f32,
}

/// Per-epoch record of a completed run.
pub struct TrainingHistory {
    pub train_losses: Vec<f32>,
    pub test_losses: Vec<f32>,
    /// Learning rate in effect during each epoch.
    pub lr_history: Vec<f32>,
    pub best_test_loss: f32,
    pub best_epoch: usize,
    pub epochs_run: usize,
    pub stopped_early: bool,
    pub final_lr: f32,
}

/// Shuffled batch indices for one epoch. Full batches only; the remainder
/// is dropped. A dataset smaller than one batch trains as a single batch.
pub fn epoch_batches(n: usize, batch_size: usize, rng: &mut SimpleRng) -> Vec<Vec<usize>> {
    let perm = rng.permutation(n);
    let steps = n / batch_size;
    if steps == 0 {
        return if n == 0 { Vec::new() } else { vec![perm] };
    }
    perm[..steps * batch_size]
        .chunks(batch_size)
        .map(|c| c.to_vec())
        .collect()
}

fn gather_batch(ds: &SpectralDataset, indices: &[usize]) -> Vec<f32> {
    let mut x = Vec::with_capacity(indices.len() * ds.n_wavelength);
    for &i in indices {
        x.extend_from_slice(ds.spectrum(i));
    }
    x
}

/// lambda * 0.5 * sum of squares over every parameter buffer: kernels,
/// biases, and batch-norm scale/shift alike.
fn l2_penalty(params: &AutoencoderParams, lambda: f32) -> f32 {
    let ssq: f32 = params.buffers().iter().map(|b| sum_squares_f32(b)).sum();
    lambda * 0.5 * ssq
}

/// Add the L2 penalty's gradient (lambda * p) to every parameter's grads.
fn add_l2_grads(grads: &mut AutoencoderParams, params: &AutoencoderParams, lambda: f32) {
    if lambda == 0.0 {
        return;
    }
    for (g, p) in grads.buffers_mut().into_iter().zip(params.buffers()) {
        for (gv, pv) in g.iter_mut().zip(p.iter()) {
            *gv += lambda * pv;
        }
    }
}

/// One epoch of shuffled mini-batch updates.
fn train_epoch(
    params: &mut AutoencoderParams,
    state: &mut BatchNormState,
    model_cfg: &AutoencoderConfig,
    ds: &SpectralDataset,
    cfg: &TrainConfig,
    lr: f32,
    opt: &mut AdamW,
    rng: &mut SimpleRng,
) -> EpochLosses {
    let batches = epoch_batches(ds.len(), cfg.batch_size, rng);
    let mut recon_sum = 0.0f32;
    let mut l2_sum = 0.0f32;
    let mut steps = 0usize;

    for indices in &batches {
        let x = gather_batch(ds, indices);
        let cache = forward_train(params, model_cfg, state, &x, indices.len(), rng);
        // Both loss terms are recorded at the pre-update parameters, the
        // same point the gradients are taken at.
        recon_sum += mse_f32(&cache.output, &x);
        l2_sum += l2_penalty(params, cfg.l2_lambda);

        let mut grads = backward(params, model_cfg, &cache, &x);
        add_l2_grads(&mut grads, params, cfg.l2_lambda);
        clip_global_norm(&mut grads, cfg.clip_norm);
        opt.step(params, &grads, lr);
        steps += 1;
    }

    let recon = if steps > 0 { recon_sum / steps as f32 } else { 0.0 };
    let l2 = if steps > 0 { l2_sum / steps as f32 } else { 0.0 };
    EpochLosses {
        total: recon + l2,
        recon,
        l2,
    }
}

/// Reconstruction MSE over a dataset in inference mode. Sequential full
/// batches; a dataset smaller than one batch is evaluated whole.
pub fn eval_model(
    params: &AutoencoderParams,
    model_cfg: &AutoencoderConfig,
    state: &BatchNormState,
    ds: &SpectralDataset,
    batch_size: usize,
) -> f32 {
    let n = ds.len();
    if n == 0 {
        return 0.0;
    }
    let steps = n / batch_size;
    if steps == 0 {
        let indices: Vec<usize> = (0..n).collect();
        let x = gather_batch(ds, &indices);
        let out = forward_eval(params, model_cfg, state, &x, n);
        return mse_f32(&out, &x);
    }

    let mut sum = 0.0f32;
    for s in 0..steps {
        let indices: Vec<usize> = (s * batch_size..(s + 1) * batch_size).collect();
        let x = gather_batch(ds, &indices);
        let out = forward_eval(params, model_cfg, state, &x, batch_size);
        sum += mse_f32(&out, &x);
    }
    sum / steps as f32
}

/// Full training run. Saves the best checkpoint as it goes and returns the
/// per-epoch history.
///
/// # Errors
///
/// [`SpecAeError::Checkpoint`] when the snapshot cannot be written.
pub fn train_and_evaluate(
    model_cfg: &AutoencoderConfig,
    train_ds: &SpectralDataset,
    test_ds: &SpectralDataset,
    cfg: &TrainConfig,
) -> Result<TrainingHistory, SpecAeError> {
    let mut params = AutoencoderParams::init(model_cfg, cfg.seed);
    let mut state = BatchNormState::init(model_cfg);
    let mut opt = AdamW::new(
        &params,
        AdamWConfig {
            weight_decay: cfg.l2_lambda,
            ..AdamWConfig::default()
        },
    );
    // Offset so the shuffling stream differs from the init stream.
    let mut rng = SimpleRng::new(cfg.seed.wrapping_add(0x9e37_79b9_7f4a_7c15));

    if let Some(parent) = cfg.checkpoint_path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent).map_err(|e| {
                SpecAeError::Checkpoint(format!("{}: {e}", parent.display()))
            })?;
        }
    }

    let mut lr = cfg.learning_rate;
    let mut best_test_loss = f32::INFINITY;
    let mut best_epoch = 0usize;
    let mut stale_epochs = 0usize;
    let mut lr_stale_epochs = 0usize;
    let mut stopped_early = false;

    let mut train_losses = Vec::with_capacity(cfg.num_epochs);
    let mut test_losses = Vec::with_capacity(cfg.num_epochs);
    let mut lr_history = Vec::with_capacity(cfg.num_epochs);
    let mut epochs_run = 0usize;

    for epoch in 0..cfg.num_epochs {
        let losses = train_epoch(
            &mut params, &mut state, model_cfg, train_ds, cfg, lr, &mut opt, &mut rng,
        );
        let test_loss = eval_model(&params, model_cfg, &state, test_ds, cfg.batch_size);

        train_losses.push(losses.total);
        test_losses.push(test_loss);
        lr_history.push(lr);
        epochs_run = epoch + 1;

        if test_loss < best_test_loss - cfg.min_delta {
            best_test_loss = test_loss;
            best_epoch = epoch;
            save_checkpoint(
                &cfg.checkpoint_path,
                &params,
                &state,
                model_cfg,
                opt.step_count(),
            )
            .map_err(|e| {
                SpecAeError::Checkpoint(format!("{}: {e}", cfg.checkpoint_path.display()))
            })?;
            stale_epochs = 0;
            lr_stale_epochs = 0;
        } else {
            stale_epochs += 1;
            lr_stale_epochs += 1;
            if lr_stale_epochs >= cfg.lr_patience {
                let reduced = (lr * cfg.lr_factor).max(cfg.min_lr);
                // Counter resets only when the rate actually moved; at the
                // floor it keeps trying, which is a no-op.
                if reduced < lr {
                    lr = reduced;
                    lr_stale_epochs = 0;
                }
            }
            if stale_epochs >= cfg.patience {
                stopped_early = true;
                break;
            }
        }
    }

    Ok(TrainingHistory {
        train_losses,
        test_losses,
        lr_history,
        best_test_loss,
        best_epoch,
        epochs_run,
        stopped_early,
        final_lr: lr,
    })
}
