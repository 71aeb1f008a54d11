//! # `CNA2d` - conv/norm/activation block.
//!
//! A [`CNA2d`] is a [`ConvNorm2d`] followed by an [`Activation`].
//!
//! [`CNA2d::forward_residual`] adds a residual tensor after the norm
//! and before the activation; this is where a `ResNet` v1 block joins
//! its shortcut path.

use crate::compat::activation_wrapper::{Activation, ActivationConfig};
use crate::compat::normalization_wrapper::NormalizationConfig;
use crate::layers::blocks::conv_norm::{ConvNorm2d, ConvNorm2dConfig, ConvNorm2dMeta};
use bimm_contracts::assert_shape_contract_periodically;
use burn::config::Config;
use burn::module::Module;
use burn::nn::conv::Conv2dConfig;
use burn::prelude::{Backend, Tensor};

/// Norm/activation policy shared by every [`CNA2d`] of a network.
///
/// Lifted to a [`CNA2dConfig`] by [`CNA2dPolicy::build_config`].
#[derive(Config, Debug)]
pub struct CNA2dPolicy {
    /// Normalization config; the feature size is matched to the conv.
    #[config(default = "NormalizationConfig::default()")]
    pub norm: NormalizationConfig,

    /// Activation config.
    #[config(default = "ActivationConfig::Relu")]
    pub act: ActivationConfig,
}

impl CNA2dPolicy {
    /// Attach this policy to a conv.
    pub fn build_config(
        &self,
        conv: Conv2dConfig,
    ) -> CNA2dConfig {
        CNA2dConfig {
            conv_norm: ConvNorm2dConfig::new(conv).with_norm(self.norm.clone()),
            act: self.act.clone(),
        }
    }
}

/// [`CNA2d`] Config.
///
/// Implements [`ConvNorm2dMeta`].
#[derive(Config, Debug)]
pub struct CNA2dConfig {
    /// The conv/norm stage.
    pub conv_norm: ConvNorm2dConfig,

    /// The [`Activation`] config.
    #[config(default = "ActivationConfig::Relu")]
    pub act: ActivationConfig,
}

impl From<Conv2dConfig> for CNA2dConfig {
    fn from(conv: Conv2dConfig) -> Self {
        Self::new(conv.into())
    }
}

impl ConvNorm2dMeta for CNA2dConfig {
    fn in_channels(&self) -> usize {
        self.conv_norm.in_channels()
    }

    fn out_channels(&self) -> usize {
        self.conv_norm.out_channels()
    }

    fn stride(&self) -> [usize; 2] {
        self.conv_norm.stride()
    }
}

impl CNA2dConfig {
    /// Initialize a [`CNA2d`].
    pub fn init<B: Backend>(
        self,
        device: &B::Device,
    ) -> CNA2d<B> {
        let act = self.act.for_features(self.out_channels()).init(device);
        CNA2d {
            conv_norm: self.conv_norm.init(device),
            act,
        }
    }
}

/// Conv/norm/activation block.
///
/// Implements [`ConvNorm2dMeta`].
#[derive(Module, Debug)]
pub struct CNA2d<B: Backend> {
    /// Conv and norm layers.
    pub conv_norm: ConvNorm2d<B>,

    /// Activation layer.
    pub act: Activation<B>,
}

impl<B: Backend> ConvNorm2dMeta for CNA2d<B> {
    fn in_channels(&self) -> usize {
        self.conv_norm.in_channels()
    }

    fn out_channels(&self) -> usize {
        self.conv_norm.out_channels()
    }

    fn stride(&self) -> [usize; 2] {
        self.conv_norm.stride()
    }
}

impl<B: Backend> CNA2d<B> {
    /// Forward Pass.
    ///
    /// # Arguments
    ///
    /// - `input`: \
    ///   ``[batch, in_channels, in_height=out_height*stride, in_width=out_width*stride]``.
    ///
    /// # Returns
    ///
    /// ``[batch, out_channels, out_height, out_width]``
    pub fn forward(
        &self,
        input: Tensor<B, 4>,
    ) -> Tensor<B, 4> {
        self.act.forward(self.conv_norm.forward(input))
    }

    /// Forward Pass, joining a residual before the activation.
    ///
    /// ```rust,ignore
    /// act(norm(conv(input)) + residual)
    /// ```
    ///
    /// # Arguments
    ///
    /// - `input`: \
    ///   ``[batch, in_channels, in_height=out_height*stride, in_width=out_width*stride]``.
    /// - `residual`: ``[batch, out_channels, out_height, out_width]``.
    ///
    /// # Returns
    ///
    /// ``[batch, out_channels, out_height, out_width]``
    pub fn forward_residual(
        &self,
        input: Tensor<B, 4>,
        residual: Tensor<B, 4>,
    ) -> Tensor<B, 4> {
        let x = self.conv_norm.forward(input);
        let [batch, out_channels, out_height, out_width] = x.dims();

        assert_shape_contract_periodically!(
            ["batch", "out_channels", "out_height", "out_width"],
            &residual,
            &[
                ("batch", batch),
                ("out_channels", out_channels),
                ("out_height", out_height),
                ("out_width", out_width)
            ]
        );

        self.act.forward(x + residual)
    }
}
