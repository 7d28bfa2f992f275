//! Train the spectral autoencoder on a sampled synthesis grid.
//!
//! Usage:
//!   train_autoencoder --grid-dir=grids --grid-name=grid.json [options]
//!
//! Options (all --key=value):
//!   --samples=N       grid samples to draw            (default 1000)
//!   --epochs=N        maximum training epochs         (default 100)
//!   --batch=N         mini-batch size                 (default 32)
//!   --latent=N        latent dimension                (default 128)
//!   --seed=N          RNG seed                        (default 0)
//!   --models-dir=P    checkpoint directory            (default models)
//!   --figures-dir=P   plot output directory           (default figures)

use specae_core::dataset::SpectralDataset;
use specae_core::model::AutoencoderConfig;
use specae_core::plot::plot_training_curves;
use specae_core::tensor::SimpleRng;
use specae_core::trainer::{train_and_evaluate, TrainConfig};
use std::path::PathBuf;

struct CliArgs {
    grid_dir: PathBuf,
    grid_name: String,
    samples: usize,
    epochs: usize,
    batch: usize,
    latent: usize,
    seed: u64,
    models_dir: PathBuf,
    figures_dir: PathBuf,
}

impl Default for CliArgs {
    fn default() -> Self {
        CliArgs {
            grid_dir: PathBuf::from("grids"),
            grid_name: String::from("grid.json"),
            samples: 1000,
            epochs: 100,
            batch: 32,
            latent: 128,
            seed: 0,
            models_dir: PathBuf::from("models"),
            figures_dir: PathBuf::from("figures"),
        }
    }
}

fn parse_cli() -> Result<CliArgs, String> {
    let mut args = CliArgs::default();
    for arg in std::env::args().skip(1) {
        let (key, value) = arg
            .split_once('=')
            .ok_or_else(|| format!("expected --key=value, got '{arg}'"))?;
        match key {
            "--grid-dir" => args.grid_dir = PathBuf::from(value),
            "--grid-name" => args.grid_name = value.to_string(),
            "--samples" => args.samples = parse_num(key, value)?,
            "--epochs" => args.epochs = parse_num(key, value)?,
            "--batch" => args.batch = parse_num(key, value)?,
            "--latent" => args.latent = parse_num(key, value)?,
            "--seed" => args.seed = parse_num(key, value)?,
            "--models-dir" => args.models_dir = PathBuf::from(value),
            "--figures-dir" => args.figures_dir = PathBuf::from(value),
            _ => return Err(format!("unknown option '{key}'")),
        }
    }
    Ok(args)
}

fn parse_num<T: std::str::FromStr>(key: &str, value: &str) -> Result<T, String> {
    value
        .parse()
        .map_err(|_| format!("invalid value '{value}' for {key}"))
}

fn run(args: &CliArgs) -> Result<(), Box<dyn std::error::Error>> {
    println!("┌──────────────────────────────────────────────┐");
    println!("│ Spectral autoencoder training                │");
    println!("└──────────────────────────────────────────────┘");
    println!(
        "grid: {} / {}, samples: {}, seed: {}",
        args.grid_dir.display(),
        args.grid_name,
        args.samples,
        args.seed
    );

    let dataset =
        SpectralDataset::from_grid(&args.grid_dir, &args.grid_name, args.samples, args.seed)?;
    println!(
        "dataset: {} spectra x {} wavelength bins",
        dataset.len(),
        dataset.n_wavelength
    );

    let mut split_rng = SimpleRng::new(args.seed);
    let (train_ds, test_ds) = dataset.train_test_split(0.8, &mut split_rng)?;
    println!("split: {} train / {} test", train_ds.len(), test_ds.len());

    let model_cfg = AutoencoderConfig::new(dataset.n_wavelength, args.latent);
    let mut train_cfg = TrainConfig::new(args.models_dir.join("autoencoder_best.json"));
    train_cfg.num_epochs = args.epochs;
    train_cfg.batch_size = args.batch;
    train_cfg.seed = args.seed;

    let history = train_and_evaluate(&model_cfg, &train_ds, &test_ds, &train_cfg)?;

    std::fs::create_dir_all(&args.figures_dir)?;
    let figure = args.figures_dir.join("loss_curves.png");
    if let Err(e) = plot_training_curves(&figure, &history.train_losses, &history.test_losses) {
        eprintln!("warning: could not plot loss curves: {e}");
    } else {
        println!("loss curves written to {}", figure.display());
    }

    println!("┌──────────────────────────────────────────────┐");
    println!("│ Training summary                             │");
    println!("├──────────────────────────────────────────────┤");
    println!("│ epochs run      : {:<26} │", history.epochs_run);
    println!("│ stopped early   : {:<26} │", history.stopped_early);
    println!("│ best epoch      : {:<26} │", history.best_epoch);
    println!("│ best test loss  : {:<26.6} │", history.best_test_loss);
    println!("│ final lr        : {:<26.2e} │", history.final_lr);
    println!("└──────────────────────────────────────────────┘");
    println!(
        "best checkpoint: {}",
        train_cfg.checkpoint_path.display()
    );
    Ok(())
}

fn main() {
    let args = match parse_cli() {
        Ok(a) => a,
        Err(e) => {
            eprintln!("error: {e}");
            eprintln!("run with --key=value options; see the source header for the list");
            std::process::exit(1);
        }
    };
    if let Err(e) = run(&args) {
        eprintln!("error: {e}");
        std::process::exit(1);
    }
}
