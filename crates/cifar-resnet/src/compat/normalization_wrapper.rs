//! # Normalization Wrapper
//!
//! Selects the per-channel norm applied after each convolution:
//! [`BatchNorm`] (the `ResNet` default) or [`GroupNorm`], which
//! behaves better with very small batches.
//!
//! Configs are written before the plane counts are known; the
//! feature size is filled in by [`NormalizationConfig::for_features`].

use burn::nn::{BatchNorm, BatchNormConfig, GroupNorm, GroupNormConfig};
use burn::prelude::{Backend, Config, Module, Tensor};

/// [`Normalization`] Configuration.
#[derive(Config, Debug)]
#[non_exhaustive]
pub enum NormalizationConfig {
    /// [`BatchNorm`] Configuration.
    Batch(BatchNormConfig),

    /// [`GroupNorm`] Configuration.
    Group(GroupNormConfig),
}

impl Default for NormalizationConfig {
    fn default() -> Self {
        Self::Batch(BatchNormConfig::new(0))
    }
}

impl From<BatchNormConfig> for NormalizationConfig {
    fn from(config: BatchNormConfig) -> Self {
        Self::Batch(config)
    }
}

impl From<GroupNormConfig> for NormalizationConfig {
    fn from(config: GroupNormConfig) -> Self {
        Self::Group(config)
    }
}

impl NormalizationConfig {
    /// Copy of this config sized for `num_features` channels.
    pub fn for_features(
        &self,
        num_features: usize,
    ) -> Self {
        match self {
            Self::Batch(config) => Self::Batch(BatchNormConfig {
                num_features,
                ..config.clone()
            }),
            Self::Group(config) => Self::Group(GroupNormConfig {
                num_channels: num_features,
                ..config.clone()
            }),
        }
    }

    /// Configured channel count.
    pub fn num_features(&self) -> usize {
        match self {
            Self::Batch(config) => config.num_features,
            Self::Group(config) => config.num_channels,
        }
    }

    /// Initialize a [`Normalization`] layer.
    pub fn init<B: Backend>(
        &self,
        device: &B::Device,
    ) -> Normalization<B> {
        match self {
            Self::Batch(config) => Normalization::Batch(config.init(device)),
            Self::Group(config) => Normalization::Group(config.init(device)),
        }
    }
}

/// Normalization Layer Wrapper.
///
/// Normalizes over dim 1 and preserves the input shape.
#[derive(Module, Debug)]
#[non_exhaustive]
pub enum Normalization<B: Backend> {
    /// ``BatchNorm<2>`` layer.
    Batch(BatchNorm<B, 2>),

    /// [`GroupNorm`] layer.
    Group(GroupNorm<B>),
}

impl<B: Backend> Normalization<B> {
    /// Normalize a ``[batch, channels, ...]`` tensor.
    pub fn forward<const D: usize>(
        &self,
        input: Tensor<B, D>,
    ) -> Tensor<B, D> {
        match self {
            Self::Batch(norm) => norm.forward(input),
            Self::Group(norm) => norm.forward(input),
        }
    }

    /// Channel count of the layer.
    pub fn num_features(&self) -> usize {
        match self {
            Self::Batch(norm) => norm.gamma.dims()[0],
            Self::Group(norm) => norm.num_channels,
        }
    }
}
