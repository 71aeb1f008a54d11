//! CIFAR-10 binary batches.
//!
//! Each record is one label byte followed by a 32x32 image stored as
//! three row-major planes: red, green, then blue.

use anyhow::{Context, bail};
use burn::data::dataloader::batcher::Batcher;
use burn::data::dataset::InMemDataset;
use burn::prelude::{Backend, Int, Tensor};
use burn::tensor::TensorData;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::path::Path;

pub const IMAGE_SIZE: usize = 32;
pub const IMAGE_CHANNELS: usize = 3;
pub const IMAGE_BYTES: usize = IMAGE_CHANNELS * IMAGE_SIZE * IMAGE_SIZE;
pub const RECORD_BYTES: usize = 1 + IMAGE_BYTES;

pub const CLASSES: [&str; 10] = [
    "airplane",
    "automobile",
    "bird",
    "cat",
    "deer",
    "dog",
    "frog",
    "horse",
    "ship",
    "truck",
];

pub const TRAIN_FILES: [&str; 5] = [
    "data_batch_1.bin",
    "data_batch_2.bin",
    "data_batch_3.bin",
    "data_batch_4.bin",
    "data_batch_5.bin",
];
pub const TEST_FILE: &str = "test_batch.bin";

/// Per-channel statistics of the training split.
pub const CHANNEL_MEAN: [f32; 3] = [0.4914, 0.4822, 0.4465];
pub const CHANNEL_STD: [f32; 3] = [0.2470, 0.2435, 0.2616];

/// Max random translation, in pixels, for training crops.
pub const CROP_PADDING: usize = 4;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CifarItem {
    pub label: u8,
    /// ``[3, 32, 32]`` bytes.
    pub pixels: Vec<u8>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CifarSplit {
    Train,
    Test,
}

impl CifarSplit {
    pub fn files(&self) -> &'static [&'static str] {
        match self {
            CifarSplit::Train => &TRAIN_FILES,
            CifarSplit::Test => &[TEST_FILE],
        }
    }
}

/// Parse the records of one binary batch file.
pub fn parse_records(bytes: &[u8]) -> anyhow::Result<Vec<CifarItem>> {
    if bytes.len() % RECORD_BYTES != 0 {
        bail!(
            "batch size {} is not a multiple of the {RECORD_BYTES} byte record",
            bytes.len()
        );
    }

    bytes
        .chunks_exact(RECORD_BYTES)
        .enumerate()
        .map(|(idx, record)| {
            let label = record[0];
            if label as usize >= CLASSES.len() {
                bail!("record {idx}: label {label} out of range");
            }
            Ok(CifarItem {
                label,
                pixels: record[1..].to_vec(),
            })
        })
        .collect()
}

pub fn read_batch_file(path: &Path) -> anyhow::Result<Vec<CifarItem>> {
    let bytes = std::fs::read(path).with_context(|| format!("reading {}", path.display()))?;
    let items = parse_records(&bytes).with_context(|| format!("parsing {}", path.display()))?;
    tracing::info!(path = %path.display(), records = items.len(), "loaded cifar batch");
    Ok(items)
}

/// Load every batch file of a split from the extracted ``cifar-10-batches-bin`` dir.
pub fn load_split(
    root: &Path,
    split: CifarSplit,
) -> anyhow::Result<InMemDataset<CifarItem>> {
    let mut items = Vec::new();
    for file in split.files() {
        items.extend(read_batch_file(&root.join(file))?);
    }
    Ok(InMemDataset::new(items))
}

/// Translate then optionally mirror a ``[3, 32, 32]`` image.
///
/// Output pixel ``(y, x)`` reads source ``(y + dy, x + dx)``; reads outside
/// the image are zero.
pub fn shift_flip_pixels(
    pixels: &[u8],
    dy: isize,
    dx: isize,
    flip: bool,
) -> Vec<u8> {
    let size = IMAGE_SIZE as isize;
    let mut out = vec![0u8; IMAGE_BYTES];
    for c in 0..IMAGE_CHANNELS {
        let plane = c * IMAGE_SIZE * IMAGE_SIZE;
        for y in 0..size {
            let sy = y + dy;
            if !(0..size).contains(&sy) {
                continue;
            }
            for x in 0..size {
                let tx = if flip { size - 1 - x } else { x };
                let sx = tx + dx;
                if !(0..size).contains(&sx) {
                    continue;
                }
                out[plane + (y * size + x) as usize] = pixels[plane + (sy * size + sx) as usize];
            }
        }
    }
    out
}

#[derive(Clone, Debug)]
pub struct CifarBatch<B: Backend> {
    /// ``[batch, 3, 32, 32]``, normalized.
    pub images: Tensor<B, 4>,
    /// ``[batch]`` class indices.
    pub targets: Tensor<B, 1, Int>,
}

#[derive(Clone, Debug, Default)]
pub struct CifarBatcher {
    /// Apply random crop and horizontal flip.
    pub augment: bool,
}

impl CifarBatcher {
    pub fn training() -> Self {
        Self { augment: true }
    }

    pub fn evaluation() -> Self {
        Self { augment: false }
    }
}

impl<B: Backend> Batcher<B, CifarItem, CifarBatch<B>> for CifarBatcher {
    fn batch(
        &self,
        items: Vec<CifarItem>,
        device: &B::Device,
    ) -> CifarBatch<B> {
        let batch_size = items.len();
        let mut rng = rand::rng();
        let pad = CROP_PADDING as i32;

        let mut pixels: Vec<f32> = Vec::with_capacity(batch_size * IMAGE_BYTES);
        let mut labels: Vec<i64> = Vec::with_capacity(batch_size);
        for item in &items {
            labels.push(item.label as i64);
            if self.augment {
                let dy = rng.random_range(-pad..=pad) as isize;
                let dx = rng.random_range(-pad..=pad) as isize;
                let flip = rng.random_bool(0.5);
                pixels.extend(
                    shift_flip_pixels(&item.pixels, dy, dx, flip)
                        .into_iter()
                        .map(|p| p as f32 / 255.0),
                );
            } else {
                pixels.extend(item.pixels.iter().map(|&p| p as f32 / 255.0));
            }
        }

        let images = Tensor::<B, 4>::from_data(
            TensorData::new(pixels, [batch_size, IMAGE_CHANNELS, IMAGE_SIZE, IMAGE_SIZE]),
            device,
        );
        let mean = Tensor::<B, 1>::from_floats(CHANNEL_MEAN, device).reshape([1, 3, 1, 1]);
        let std = Tensor::<B, 1>::from_floats(CHANNEL_STD, device).reshape([1, 3, 1, 1]);
        let images = (images - mean) / std;

        let targets = Tensor::from_data(labels.as_slice(), device);

        CifarBatch { images, targets }
    }
}
