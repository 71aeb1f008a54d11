//! # Basic Block for `ResNet`
//!
//! [`BasicBlock`] is the core `ResNet` residual unit:
//!
//! ```text
//! y = act(norm2(conv2(act(norm1(conv1(x))))) + shortcut(x))
//! ```
//!
//! [`BasicBlockMeta`] defines a common meta API for [`BasicBlock`]
//! and [`BasicBlockConfig`].
//!
//! [`BasicBlockConfig`] implements [`Config`], and provides
//! [`BasicBlockConfig::init`] to initialize a [`BasicBlock`].
//!
//! [`BasicBlock`] implements [`Module`], and provides
//! [`BasicBlock::forward`].

use crate::compat::activation_wrapper::ActivationConfig;
use crate::compat::normalization_wrapper::NormalizationConfig;
use crate::layers::blocks::cna::{CNA2d, CNA2dPolicy};
use crate::layers::blocks::conv_norm::ConvNorm2dMeta;
use crate::models::resnet::shortcut::{Shortcut, ShortcutConfig, ShortcutMeta, ShortcutPolicy};
use crate::models::resnet::util::{conv3x3, stride_div_output_resolution};
use bimm_contracts::{assert_shape_contract_periodically, unpack_shape_contract};
use burn::prelude::{Backend, Config, Module, Tensor};

/// [`BasicBlock`] Meta trait.
pub trait BasicBlockMeta {
    /// The size of the in planes dimension.
    fn in_planes(&self) -> usize;

    /// The size of the out planes dimension.
    fn out_planes(&self) -> usize;

    /// The stride of the first convolution.
    ///
    /// Affects shortcut behavior.
    fn stride(&self) -> usize;

    /// Does this block reshape its shortcut?
    fn has_shortcut(&self) -> bool;

    /// Get the output resolution for a given input resolution.
    ///
    /// The input must be a multiple of the stride.
    ///
    /// # Arguments
    ///
    /// - `input_resolution`: \
    ///   ``[in_height=out_height*stride, in_width=out_width*stride]``.
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

/// [`BasicBlock`] Config.
///
/// Implements [`BasicBlockMeta`].
#[derive(Config, Debug)]
pub struct BasicBlockConfig {
    /// The size of the in planes dimension.
    pub in_planes: usize,

    /// The size of the out planes dimension.
    pub planes: usize,

    /// The stride of the first convolution.
    #[config(default = 1)]
    pub stride: usize,

    /// Shortcut policy; used when the block changes stride or planes.
    #[config(default = "ShortcutPolicy::Projection")]
    pub shortcut: ShortcutPolicy,

    /// [`crate::compat::normalization_wrapper::Normalization`] config.
    ///
    /// The feature size of this config will be replaced
    /// with the appropriate feature size for each layer.
    #[config(default = "NormalizationConfig::default()")]
    pub normalization: NormalizationConfig,

    /// [`crate::compat::activation_wrapper::Activation`] config.
    #[config(default = "ActivationConfig::Relu")]
    pub activation: ActivationConfig,
}

impl BasicBlockMeta for BasicBlockConfig {
    fn in_planes(&self) -> usize {
        self.in_planes
    }

    fn out_planes(&self) -> usize {
        self.planes
    }

    fn stride(&self) -> usize {
        self.stride
    }

    fn has_shortcut(&self) -> bool {
        !self.shortcut_config().is_identity()
    }
}

impl BasicBlockConfig {
    /// The [`ShortcutConfig`] implied by this block.
    pub fn shortcut_config(&self) -> ShortcutConfig {
        ShortcutConfig::new(self.in_planes, self.planes)
            .with_stride(self.stride)
            .with_policy(self.shortcut.clone())
            .with_norm(self.normalization.clone())
    }

    /// Initialize a [`BasicBlock`].
    pub fn init<B: Backend>(
        self,
        device: &B::Device,
    ) -> BasicBlock<B> {
        let in_planes = self.in_planes();
        let planes = self.out_planes();
        let stride = self.stride();

        let shortcut = self
            .shortcut_config()
            .into_option()
            .map(|cfg| cfg.init(device));

        let policy = CNA2dPolicy {
            norm: self.normalization,
            act: self.activation,
        };

        BasicBlock {
            shortcut,
            cna1: policy
                .build_config(conv3x3(in_planes, planes, stride))
                .init(device),
            cna2: policy.build_config(conv3x3(planes, planes, 1)).init(device),
        }
    }
}

/// Basic Block for `ResNet`.
///
/// Implements [`BasicBlockMeta`].
#[derive(Module, Debug)]
pub struct BasicBlock<B: Backend> {
    /// Optional shortcut reshaping; `None` is the identity.
    pub shortcut: Option<Shortcut<B>>,

    /// First Conv/Norm/Act Block.
    pub cna1: CNA2d<B>,

    /// Second Conv/Norm/Act Block.
    pub cna2: CNA2d<B>,
}

impl<B: Backend> BasicBlockMeta for BasicBlock<B> {
    fn in_planes(&self) -> usize {
        self.cna1.in_channels()
    }

    fn out_planes(&self) -> usize {
        self.cna2.out_channels()
    }

    fn stride(&self) -> usize {
        self.cna1.stride()[0]
    }

    fn has_shortcut(&self) -> bool {
        self.shortcut.is_some()
    }
}

impl<B: Backend> BasicBlock<B> {
    /// Forward Pass.
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
            &[("in_planes", self.in_planes()), ("stride", self.stride())],
        );

        let identity = match &self.shortcut {
            Some(shortcut) => shortcut.forward(input.clone()),
            None => input.clone(),
        };

        let x = self.cna1.forward(input);
        let x = self.cna2.forward_residual(x, identity);

        assert_shape_contract_periodically!(
            ["batch", "out_planes", "out_height", "out_width"],
            &x,
            &[
                ("batch", batch),
                ("out_planes", self.out_planes()),
                ("out_height", out_height),
                ("out_width", out_width),
            ]
        );

        x
    }

    /// The shortcut policy, if the block reshapes its shortcut.
    pub fn shortcut_policy(&self) -> Option<ShortcutPolicy> {
        self.shortcut.as_ref().map(|shortcut| shortcut.policy())
    }

    /// The shortcut planes; identity shortcuts report the block planes.
    pub fn shortcut_out_planes(&self) -> usize {
        match &self.shortcut {
            Some(shortcut) => shortcut.out_planes(),
            None => self.in_planes(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bimm_contracts::assert_shape_contract;
    use burn::backend::{Autodiff, NdArray};
    use burn::nn::LeakyReluConfig;
    use burn::tensor::Distribution;

    #[test]
    fn test_basic_block_config() {
        let config = BasicBlockConfig::new(16, 32);
        assert_eq!(config.in_planes(), 16);
        assert_eq!(config.out_planes(), 32);
        assert_eq!(config.stride(), 1);
        assert!(config.has_shortcut());
        assert_eq!(config.output_resolution([16, 16]), [16, 16]);
        assert!(matches!(config.activation, ActivationConfig::Relu));

        let config = config
            .with_stride(2)
            .with_activation(LeakyReluConfig::new().into());
        assert_eq!(config.stride(), 2);
        assert_eq!(config.output_resolution([16, 16]), [8, 8]);
        assert!(matches!(config.activation, ActivationConfig::LeakyRelu(_)));

        let config = BasicBlockConfig::new(16, 16);
        assert!(!config.has_shortcut());
    }

    #[test]
    #[should_panic(expected = "7 !~ height_in=(height_out*stride)")]
    fn test_basic_block_config_panic() {
        let config = BasicBlockConfig::new(16, 32).with_stride(2);
        config.output_resolution([7, 7]);
    }

    #[test]
    fn test_basic_block_meta() {
        type B = NdArray<f32>;
        let device = Default::default();

        let block: BasicBlock<B> = BasicBlockConfig::new(16, 16).init(&device);
        assert_eq!(block.in_planes(), 16);
        assert_eq!(block.out_planes(), 16);
        assert_eq!(block.stride(), 1);
        assert!(!block.has_shortcut());
        assert_eq!(block.shortcut_policy(), None);
        assert_eq!(block.shortcut_out_planes(), 16);

        let block: BasicBlock<B> = BasicBlockConfig::new(16, 32)
            .with_stride(2)
            .with_shortcut(ShortcutPolicy::ZeroPad)
            .init(&device);
        assert!(block.has_shortcut());
        assert_eq!(block.shortcut_policy(), Some(ShortcutPolicy::ZeroPad));
        assert_eq!(block.shortcut_out_planes(), 32);
        assert_eq!(block.output_resolution([32, 32]), [16, 16]);
    }

    #[test]
    fn test_basic_block_identity_forward_autodiff() {
        type B = Autodiff<NdArray<f32>>;
        let device = Default::default();

        let block: BasicBlock<B> = BasicBlockConfig::new(4, 4).init(&device);

        let input = Tensor::random([2, 4, 8, 8], Distribution::Default, &device);
        let output = block.forward(input.clone());

        let expected = {
            let x = block.cna1.forward(input.clone());
            let x = block.cna2.conv_norm.forward(x);
            block.cna2.act.forward(x + input)
        };
        output.to_data().assert_eq(&expected.to_data(), true);

        // Post-activation ReLU output is non-negative.
        let min = output.min().into_scalar();
        assert!(min >= 0.0);
    }

    #[test]
    fn test_basic_block_forward_projection_autodiff() {
        type B = Autodiff<NdArray<f32>>;
        let device = Default::default();

        let block: BasicBlock<B> = BasicBlockConfig::new(4, 8).with_stride(2).init(&device);
        assert_eq!(block.shortcut_policy(), Some(ShortcutPolicy::Projection));

        let input = Tensor::ones([2, 4, 8, 8], &device);
        let output = block.forward(input);

        assert_shape_contract!(
            ["batch", "out_planes", "out_height", "out_width"],
            &output,
            &[
                ("batch", 2),
                ("out_planes", 8),
                ("out_height", 4),
                ("out_width", 4)
            ],
        );

        // Gradients reach the projection weights.
        let grads = output.sum().backward();
        let projection = match &block.shortcut {
            Some(Shortcut::Projection(conv_norm)) => conv_norm,
            _ => panic!("expected a projection shortcut"),
        };
        assert!(projection.conv.weight.grad(&grads).is_some());
    }

    #[test]
    fn test_basic_block_forward_zero_pad() {
        type B = NdArray<f32>;
        let device = Default::default();

        let block: BasicBlock<B> = BasicBlockConfig::new(4, 8)
            .with_stride(2)
            .with_shortcut(ShortcutPolicy::ZeroPad)
            .init(&device);

        let input = Tensor::random([3, 4, 16, 16], Distribution::Default, &device);
        let output = block.forward(input);
        assert_eq!(output.dims(), [3, 8, 8, 8]);
    }
}
