#![recursion_limit = "256"]

mod data;
mod training;

use crate::training::train;
use burn::backend::Autodiff;
use burn::backend::wgpu::{Wgpu, WgpuDevice};
use clap::Parser;
use tracing_subscriber::EnvFilter;

// $ cifar_train --data-dir=/data/cifar-10-batches-bin --prefab=resnet56 --num-epochs=160
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Directory holding the extracted ``cifar-10-batches-bin`` files.
    #[arg(long)]
    data_dir: String,

    /// Directory to save the artifacts.
    #[arg(long, default_value = "/tmp/cifar_resnet")]
    artifact_dir: String,

    /// Resnet prefab: resnet20, resnet32, resnet44 or resnet56.
    #[arg(long, default_value = "resnet20")]
    prefab: String,

    /// Use parameter-free zero-padding shortcuts.
    #[arg(long)]
    zero_pad_shortcut: bool,

    /// Random seed for reproducibility.
    #[arg(short, long, default_value = "42")]
    seed: u64,

    /// Batch size for processing
    #[arg(short, long, default_value_t = 128)]
    batch_size: usize,

    /// Number of workers for data loading.
    #[arg(long, default_value = "4")]
    num_workers: usize,

    /// Number of epochs to train the model.
    #[arg(long, default_value = "160")]
    num_epochs: usize,

    /// Initial learning rate.
    #[arg(long, default_value = "0.1")]
    learning_rate: f64,
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let args = Args::parse();
    train::<Autodiff<Wgpu>>(&args, &WgpuDevice::default())
}
