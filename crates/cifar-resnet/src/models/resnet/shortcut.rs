//! # `ResNet` Shortcut Connections
//!
//! The shortcut carries a block's input to the residual sum.
//! When the block preserves both stride and planes, the shortcut is
//! the identity and no module is built; otherwise the input is reshaped
//! by one of the [`ShortcutPolicy`] strategies:
//!
//! * [`ShortcutPolicy::Projection`] - a strided 1x1 conv and norm
//!   (learned, "option B").
//! * [`ShortcutPolicy::ZeroPad`] - strided subsampling with zero-filled
//!   extra channels (parameter-free, "option A").

use crate::compat::normalization_wrapper::NormalizationConfig;
use crate::errors::{ModelError, ModelResult};
use crate::layers::blocks::conv_norm::{ConvNorm2d, ConvNorm2dConfig, ConvNorm2dMeta};
use crate::models::resnet::util::{
    CONV_INTO_RELU_INITIALIZER, scalar_to_array, stride_div_output_resolution,
};
use bimm_contracts::{assert_shape_contract_periodically, unpack_shape_contract};
use burn::nn::conv::Conv2dConfig;
use burn::nn::pool::{AvgPool2d, AvgPool2dConfig};
use burn::nn::PaddingConfig2d;
use burn::prelude::{Backend, Config, Module, Tensor};

/// Strategy for reshaping a shortcut.
#[derive(Config, Debug, PartialEq, Eq)]
pub enum ShortcutPolicy {
    /// Strided 1x1 conv followed by normalization.
    Projection,

    /// Strided subsampling, zero-padding the channel dimension.
    ZeroPad,
}

impl Default for ShortcutPolicy {
    fn default() -> Self {
        Self::Projection
    }
}

/// [`Shortcut`] Meta trait.
pub trait ShortcutMeta {
    /// The size of the in planes dimension.
    fn in_planes(&self) -> usize;

    /// The size of the out planes dimension.
    fn out_planes(&self) -> usize;

    /// The spatial stride.
    fn stride(&self) -> usize;

    /// Get the output resolution for a given input resolution.
    ///
    /// # Arguments
    ///
    /// - `input_resolution`: ``[in_height=out_height*stride, in_width=out_width*stride]``.
    ///
    /// # Returns
    ///
    /// ``[out_height, out_width]``
    ///
    /// # Panics
    ///
    /// If the input resolution is not a multiple of the stride.
    fn output_resolution(
        &self,
        input_resolution: [usize; 2],
    ) -> [usize; 2] {
        stride_div_output_resolution(input_resolution, self.stride())
    }
}

/// [`Shortcut`] Config.
///
/// Implements [`ShortcutMeta`].
#[derive(Config, Debug)]
pub struct ShortcutConfig {
    /// The size of the in planes dimension.
    pub in_planes: usize,

    /// The size of the out planes dimension.
    pub out_planes: usize,

    /// The spatial stride.
    #[config(default = 1)]
    pub stride: usize,

    /// The reshaping strategy.
    #[config(default = "ShortcutPolicy::Projection")]
    pub policy: ShortcutPolicy,

    /// Projection norm config; the feature size will be auto-matched.
    #[config(default = "NormalizationConfig::default()")]
    pub norm: NormalizationConfig,
}

impl ShortcutMeta for ShortcutConfig {
    fn in_planes(&self) -> usize {
        self.in_planes
    }

    fn out_planes(&self) -> usize {
        self.out_planes
    }

    fn stride(&self) -> usize {
        self.stride
    }
}

impl ShortcutConfig {
    /// Is this shortcut a pass-through?
    pub fn is_identity(&self) -> bool {
        self.stride == 1 && self.in_planes == self.out_planes
    }

    /// Returns `None` for identity shortcuts.
    pub fn into_option(self) -> Option<Self> {
        if self.is_identity() { None } else { Some(self) }
    }

    /// Check if the config is valid.
    pub fn try_validate(&self) -> ModelResult<()> {
        if self.stride == 0 {
            return Err(ModelError::InvalidShortcut("stride must be > 0".to_string()));
        }
        if self.policy == ShortcutPolicy::ZeroPad && self.out_planes < self.in_planes {
            return Err(ModelError::InvalidShortcut(format!(
                "zero-pad shortcut cannot reduce planes: {} -> {}",
                self.in_planes, self.out_planes
            )));
        }
        Ok(())
    }

    /// Initialize a [`Shortcut`].
    ///
    /// # Panics
    ///
    /// If the config is invalid.
    pub fn init<B: Backend>(
        &self,
        device: &B::Device,
    ) -> Shortcut<B> {
        if let Err(err) = self.try_validate() {
            panic!("{}", err);
        }

        match self.policy {
            ShortcutPolicy::Projection => {
                let conv_norm: ConvNorm2dConfig =
                    Conv2dConfig::new([self.in_planes, self.out_planes], scalar_to_array(1))
                        .with_stride(scalar_to_array(self.stride))
                        .with_padding(PaddingConfig2d::Explicit(0, 0))
                        .with_initializer(CONV_INTO_RELU_INITIALIZER)
                        .with_bias(false)
                        .into();

                Shortcut::Projection(conv_norm.with_norm(self.norm.clone()).init(device))
            }
            ShortcutPolicy::ZeroPad => {
                let pad = self.out_planes - self.in_planes;
                Shortcut::ZeroPad(ZeroPadShortcut {
                    in_planes: self.in_planes,
                    pad_low: pad / 2,
                    pad_high: pad - pad / 2,
                    stride: self.stride,
                    pool: if self.stride == 1 {
                        None
                    } else {
                        AvgPool2dConfig::new(scalar_to_array(1))
                            .with_strides(scalar_to_array(self.stride))
                            .init()
                            .into()
                    },
                })
            }
        }
    }
}

/// Parameter-free shortcut.
///
/// Keeps every `stride`-th pixel, and places the input planes between
/// ``pad_low`` and ``pad_high`` zero planes.
#[derive(Module, Clone, Debug)]
pub struct ZeroPadShortcut {
    /// Input planes.
    pub in_planes: usize,

    /// Zero planes placed before the input planes.
    pub pad_low: usize,

    /// Zero planes placed after the input planes.
    pub pad_high: usize,

    /// Spatial stride.
    pub stride: usize,

    /// Subsampling pool; a 1x1 kernel with the stride.
    pub pool: Option<AvgPool2d>,
}

impl ZeroPadShortcut {
    /// Forward pass.
    pub fn forward<B: Backend>(
        &self,
        input: Tensor<B, 4>,
    ) -> Tensor<B, 4> {
        let x = match &self.pool {
            Some(pool) => pool.forward(input),
            None => input,
        };

        if self.pad_low == 0 && self.pad_high == 0 {
            return x;
        }

        let [batch, planes, height, width] = x.dims();
        let device = x.device();

        let mut parts = Vec::with_capacity(3);
        if self.pad_low > 0 {
            parts.push(Tensor::zeros([batch, self.pad_low, height, width], &device));
        }
        parts.push(x);
        if self.pad_high > 0 {
            parts.push(Tensor::zeros([batch, self.pad_high, height, width], &device));
        }
        debug_assert_eq!(planes, self.in_planes);

        Tensor::cat(parts, 1)
    }
}

/// Non-identity `ResNet` shortcut.
///
/// Maps ``[batch, in_planes, out_height*stride, out_width*stride]`` to
/// ``[batch, out_planes, out_height, out_width]``.
///
/// Implements [`ShortcutMeta`].
#[derive(Module, Debug)]
pub enum Shortcut<B: Backend> {
    /// Learned 1x1 projection.
    Projection(ConvNorm2d<B>),

    /// Parameter-free zero padding.
    ZeroPad(ZeroPadShortcut),
}

impl<B: Backend> ShortcutMeta for Shortcut<B> {
    fn in_planes(&self) -> usize {
        match self {
            Self::Projection(conv_norm) => conv_norm.in_channels(),
            Self::ZeroPad(zero_pad) => zero_pad.in_planes,
        }
    }

    fn out_planes(&self) -> usize {
        match self {
            Self::Projection(conv_norm) => conv_norm.out_channels(),
            Self::ZeroPad(zero_pad) => {
                zero_pad.pad_low + zero_pad.in_planes + zero_pad.pad_high
            }
        }
    }

    fn stride(&self) -> usize {
        match self {
            Self::Projection(conv_norm) => conv_norm.stride()[0],
            Self::ZeroPad(zero_pad) => zero_pad.stride,
        }
    }
}

impl<B: Backend> Shortcut<B> {
    /// The reshaping strategy of this shortcut.
    pub fn policy(&self) -> ShortcutPolicy {
        match self {
            Self::Projection(_) => ShortcutPolicy::Projection,
            Self::ZeroPad(_) => ShortcutPolicy::ZeroPad,
        }
    }

    /// Forward pass.
    ///
    /// # Arguments
    ///
    /// - `input`: ``[batch, in_planes, in_height=out_height*stride, in_width=out_width*stride]``.
    ///
    /// # Returns
    ///
    /// A ``[batch, out_planes, out_height, out_width]`` tensor.
    pub fn forward(
        &self,
        input: Tensor<B, 4>,
    ) -> Tensor<B, 4> {
        let [batch, out_height, out_width] = unpack_shape_contract!(
            [
                "batch",
                "in_planes",
                "in_height" = "out_height" * "stride",
                "in_width" = "out_width" * "stride"
            ],
            &input,
            &["batch", "out_height", "out_width"],
            &[("in_planes", self.in_planes()), ("stride", self.stride())]
        );

        let out = match self {
            Self::Projection(conv_norm) => conv_norm.forward(input),
            Self::ZeroPad(zero_pad) => zero_pad.forward(input),
        };

        assert_shape_contract_periodically!(
            ["batch", "out_planes", "out_height", "out_width"],
            &out,
            &[
                ("batch", batch),
                ("out_planes", self.out_planes()),
                ("out_height", out_height),
                ("out_width", out_width)
            ]
        );

        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bimm_contracts::assert_shape_contract;
    use burn::backend::NdArray;
    use burn::tensor::Distribution;

    type B = NdArray<f32>;

    #[test]
    fn test_shortcut_config() {
        let config = ShortcutConfig::new(16, 16);
        assert!(config.is_identity());
        assert!(config.clone().into_option().is_none());
        assert_eq!(config.policy, ShortcutPolicy::Projection);

        let config = ShortcutConfig::new(16, 32).with_stride(2);
        assert!(!config.is_identity());
        assert_eq!(config.output_resolution([32, 32]), [16, 16]);
        assert!(config.into_option().is_some());
    }

    #[test]
    fn test_zero_pad_cannot_reduce_planes() {
        let config = ShortcutConfig::new(32, 16).with_policy(ShortcutPolicy::ZeroPad);
        assert!(matches!(
            config.try_validate(),
            Err(ModelError::InvalidShortcut(_))
        ));

        let config = config.with_policy(ShortcutPolicy::Projection);
        assert!(config.try_validate().is_ok());
    }

    #[test]
    #[should_panic(expected = "zero-pad shortcut cannot reduce planes")]
    fn test_zero_pad_init_panic() {
        let device = Default::default();
        let _shortcut: Shortcut<B> = ShortcutConfig::new(32, 16)
            .with_policy(ShortcutPolicy::ZeroPad)
            .init(&device);
    }

    #[test]
    fn test_projection_shortcut() {
        let device = Default::default();

        let shortcut: Shortcut<B> = ShortcutConfig::new(16, 32).with_stride(2).init(&device);
        assert_eq!(shortcut.policy(), ShortcutPolicy::Projection);
        assert_eq!(shortcut.in_planes(), 16);
        assert_eq!(shortcut.out_planes(), 32);
        assert_eq!(shortcut.stride(), 2);

        let input = Tensor::random([2, 16, 8, 8], Distribution::Default, &device);
        let output = shortcut.forward(input);

        assert_shape_contract!(
            ["batch", "out_planes", "out_height", "out_width"],
            &output,
            &[
                ("batch", 2),
                ("out_planes", 32),
                ("out_height", 4),
                ("out_width", 4)
            ],
        );
    }

    #[test]
    fn test_zero_pad_shortcut_values() {
        let device = Default::default();

        let shortcut: Shortcut<B> = ShortcutConfig::new(1, 4)
            .with_stride(2)
            .with_policy(ShortcutPolicy::ZeroPad)
            .init(&device);
        assert_eq!(shortcut.policy(), ShortcutPolicy::ZeroPad);
        assert_eq!(shortcut.out_planes(), 4);
        assert_eq!(shortcut.num_params(), 0);

        let input: Tensor<B, 4> = Tensor::from_data(
            [[[
                [1.0, 2.0, 3.0, 4.0],
                [5.0, 6.0, 7.0, 8.0],
                [9.0, 10.0, 11.0, 12.0],
                [13.0, 14.0, 15.0, 16.0],
            ]]],
            &device,
        );
        let output = shortcut.forward(input);

        let expected: Tensor<B, 4> = Tensor::from_data(
            [[
                [[0.0, 0.0], [0.0, 0.0]],
                [[1.0, 3.0], [9.0, 11.0]],
                [[0.0, 0.0], [0.0, 0.0]],
                [[0.0, 0.0], [0.0, 0.0]],
            ]],
            &device,
        );
        output.to_data().assert_eq(&expected.to_data(), true);
    }

    #[test]
    fn test_zero_pad_shortcut_same_stride() {
        let device = Default::default();

        let shortcut: Shortcut<B> = ShortcutConfig::new(2, 6)
            .with_policy(ShortcutPolicy::ZeroPad)
            .init(&device);

        let input: Tensor<B, 4> = Tensor::ones([3, 2, 4, 4], &device);
        let output = shortcut.forward(input);
        assert_eq!(output.dims(), [3, 6, 4, 4]);

        let plane_sums = output.sum_dim(3).sum_dim(2).sum_dim(0).flatten::<1>(0, 3);
        let expected: Tensor<B, 1> =
            Tensor::from_data([0.0, 0.0, 48.0, 48.0, 0.0, 0.0], &device);
        plane_sums.to_data().assert_eq(&expected.to_data(), true);
    }
}
