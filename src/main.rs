use std::path::PathBuf;

use burn::config::Config;
use clap::Parser;
use mnist_siamese::{logging, ExperimentConfig, ExperimentError};

/// Trains a Siamese network on MNIST digit pairs and reports pair accuracy.
#[derive(Parser, Debug)]
#[command(version, about)]
struct Args {
    /// Experiment configuration to load (JSON); defaults are used when omitted.
    #[arg(short, long)]
    config: Option<PathBuf>,
    #[arg(short, long)]
    num_epochs: Option<usize>,
    #[arg(short, long)]
    batch_size: Option<usize>,
    #[arg(short, long)]
    seed: Option<u64>,
    /// Where the effective configuration and the log file are written.
    #[arg(short, long, default_value = "/tmp/mnist-siamese")]
    artifact_dir: PathBuf,
}

impl Args {
    fn experiment_config(&self) -> Result<ExperimentConfig, ExperimentError> {
        let mut config = match &self.config {
            Some(path) => ExperimentConfig::load(path)?,
            None => ExperimentConfig::new(),
        };

        if let Some(num_epochs) = self.num_epochs {
            config.num_epochs = num_epochs;
        }
        if let Some(batch_size) = self.batch_size {
            config.batch_size = batch_size;
        }
        if let Some(seed) = self.seed {
            config.seed = seed;
        }

        Ok(config)
    }
}

#[cfg(any(feature = "ndarray", feature = "ndarray-blas-openblas"))]
mod ndarray {
    use burn::backend::{
        ndarray::{NdArray, NdArrayDevice},
        Autodiff,
    };
    use mnist_siamese::{run_experiment, ExperimentConfig, Metrics};

    pub fn run(config: &ExperimentConfig) -> Metrics {
        let device = NdArrayDevice::Cpu;
        run_experiment::<Autodiff<NdArray>>(config, device)
    }
}

#[cfg(feature = "tch-gpu")]
mod tch_gpu {
    use burn::backend::{
        libtorch::{LibTorch, LibTorchDevice},
        Autodiff,
    };
    use mnist_siamese::{run_experiment, ExperimentConfig, Metrics};

    pub fn run(config: &ExperimentConfig) -> Metrics {
        #[cfg(not(target_os = "macos"))]
        let device = LibTorchDevice::Cuda(0);
        #[cfg(target_os = "macos")]
        let device = LibTorchDevice::Mps;

        run_experiment::<Autodiff<LibTorch>>(config, device)
    }
}

#[cfg(feature = "tch-cpu")]
mod tch_cpu {
    use burn::backend::{
        libtorch::{LibTorch, LibTorchDevice},
        Autodiff,
    };
    use mnist_siamese::{run_experiment, ExperimentConfig, Metrics};

    pub fn run(config: &ExperimentConfig) -> Metrics {
        let device = LibTorchDevice::Cpu;
        run_experiment::<Autodiff<LibTorch>>(config, device)
    }
}

#[cfg(feature = "wgpu")]
mod wgpu {
    use burn::backend::{
        wgpu::{Wgpu, WgpuDevice},
        Autodiff,
    };
    use mnist_siamese::{run_experiment, ExperimentConfig, Metrics};

    pub fn run(config: &ExperimentConfig) -> Metrics {
        let device = WgpuDevice::default();
        run_experiment::<Autodiff<Wgpu>>(config, device)
    }
}

fn main() -> Result<(), ExperimentError> {
    let args = Args::parse();
    let config = args.experiment_config()?;

    logging::install_file_logger(&args.artifact_dir)?;
    config.save(args.artifact_dir.join("config.json"))?;
    log::info!("Running experiment with {config}");

    #[cfg(any(feature = "ndarray", feature = "ndarray-blas-openblas"))]
    println!("{}", ndarray::run(&config));
    #[cfg(feature = "tch-gpu")]
    println!("{}", tch_gpu::run(&config));
    #[cfg(feature = "tch-cpu")]
    println!("{}", tch_cpu::run(&config));
    #[cfg(feature = "wgpu")]
    println!("{}", wgpu::run(&config));

    Ok(())
}
