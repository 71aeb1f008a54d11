//! # Activation Wrapper
//!
//! The rectifier applied after each conv/norm pair. `ResNet` uses
//! [`Relu`]; [`LeakyRelu`], [`PRelu`] and [`Gelu`] are the drop-in
//! variants that keep the residual sum unbounded above.
//!
//! A channel-wise [`PRelu`] needs one slope per plane. Like the norm
//! configs, that count is filled in by [`ActivationConfig::for_features`]
//! once the preceding conv is known.

use burn::nn::{Gelu, LeakyRelu, LeakyReluConfig, PRelu, PReluConfig, Relu};
use burn::prelude::{Backend, Config, Module, Tensor};

/// [`Activation`] Configuration.
#[derive(Config, Debug)]
#[non_exhaustive]
pub enum ActivationConfig {
    /// [`Relu`].
    Relu,

    /// [`LeakyRelu`] with a fixed negative slope.
    LeakyRelu(LeakyReluConfig),

    /// [`PRelu`] with learned slopes.
    ///
    /// ``num_parameters == 1`` shares one slope across all planes;
    /// any other value is resized to the plane count.
    PRelu(PReluConfig),

    /// [`Gelu`].
    Gelu,
}

impl Default for ActivationConfig {
    fn default() -> Self {
        Self::Relu
    }
}

impl From<LeakyReluConfig> for ActivationConfig {
    fn from(config: LeakyReluConfig) -> Self {
        Self::LeakyRelu(config)
    }
}

impl From<PReluConfig> for ActivationConfig {
    fn from(config: PReluConfig) -> Self {
        Self::PRelu(config)
    }
}

impl ActivationConfig {
    /// Channel-wise [`PRelu`] policy; sized by [`Self::for_features`].
    pub fn channel_prelu() -> Self {
        Self::PRelu(PReluConfig::new().with_num_parameters(0))
    }

    /// Copy of this config for a layer with `num_features` planes.
    pub fn for_features(
        &self,
        num_features: usize,
    ) -> Self {
        match self {
            Self::PRelu(config) if config.num_parameters != 1 => {
                Self::PRelu(config.clone().with_num_parameters(num_features))
            }
            other => other.clone(),
        }
    }

    /// Initialize an [`Activation`].
    pub fn init<B: Backend>(
        &self,
        device: &B::Device,
    ) -> Activation<B> {
        match self {
            Self::Relu => Activation::Relu(Relu),
            Self::LeakyRelu(config) => Activation::LeakyRelu(config.init()),
            Self::PRelu(config) => Activation::PRelu(config.init(device)),
            Self::Gelu => Activation::Gelu(Gelu),
        }
    }
}

/// Activation Layer.
#[derive(Module, Debug)]
#[non_exhaustive]
pub enum Activation<B: Backend> {
    /// [`Relu`].
    Relu(Relu),

    /// [`LeakyRelu`].
    LeakyRelu(LeakyRelu),

    /// [`PRelu`].
    PRelu(PRelu<B>),

    /// [`Gelu`].
    Gelu(Gelu),
}

impl<B: Backend> Activation<B> {
    /// Apply the activation; ``[batch, channels, ...]`` in and out.
    pub fn forward<const D: usize>(
        &self,
        input: Tensor<B, D>,
    ) -> Tensor<B, D> {
        match self {
            Self::Relu(act) => act.forward(input),
            Self::LeakyRelu(act) => act.forward(input),
            Self::PRelu(act) => act.forward(input),
            Self::Gelu(act) => act.forward(input),
        }
    }

    /// Recover the config; learned [`PRelu`] slopes reset to their initial value.
    pub fn to_config(&self) -> ActivationConfig {
        match self {
            Self::Relu(_) => ActivationConfig::Relu,
            Self::LeakyRelu(act) => LeakyReluConfig::new()
                .with_negative_slope(act.negative_slope)
                .into(),
            Self::PRelu(act) => ActivationConfig::PRelu(
                PReluConfig::new()
                    .with_num_parameters(act.alpha.dims()[0])
                    .with_alpha(act.alpha_value),
            ),
            Self::Gelu(_) => ActivationConfig::Gelu,
        }
    }
}
