//! # `ResNet` Layer Block
//!
//! A [`LayerBlock`] is a stage: a sequence of [`BasicBlock`]s sharing
//! a plane count. The first block applies the stage's stride and
//! plane change; the rest are ``planes -> planes``, stride 1.
//!
//! [`LayerBlockMeta`] defines a common meta API for [`LayerBlock`]
//! and [`LayerBlockConfig`].
//!
//! [`LayerBlockConfig`] implements [`Config`], and provides
//! [`LayerBlockConfig::init`] to initialize a [`LayerBlock`].
//!
//! [`LayerBlock`] implements [`Module`], and provides
//! [`LayerBlock::forward`].

use crate::compat::activation_wrapper::ActivationConfig;
use crate::compat::normalization_wrapper::NormalizationConfig;
use crate::errors::{ModelError, ModelResult};
use crate::models::resnet::basic_block::{BasicBlock, BasicBlockConfig, BasicBlockMeta};
use crate::models::resnet::shortcut::ShortcutPolicy;
use crate::models::resnet::util::stride_div_output_resolution;
use bimm_contracts::{assert_shape_contract_periodically, unpack_shape_contract};
use burn::config::Config;
use burn::prelude::{Backend, Module, Tensor};

/// [`LayerBlock`] Meta API.
pub trait LayerBlockMeta {
    /// The number of blocks.
    fn len(&self) -> usize;

    /// Check if the layer block is empty.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The number of input feature planes.
    fn in_planes(&self) -> usize;

    /// The number of output feature planes.
    fn out_planes(&self) -> usize;

    /// Get the effective stride of the layers.
    fn stride(&self) -> usize;

    /// Get the output resolution for a given input resolution.
    ///
    /// The input must be a multiple of the stride.
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

/// [`LayerBlock`] Configuration.
#[derive(Config, Debug)]
pub struct LayerBlockConfig {
    /// The component blocks.
    pub blocks: Vec<BasicBlockConfig>,
}

impl From<Vec<BasicBlockConfig>> for LayerBlockConfig {
    fn from(blocks: Vec<BasicBlockConfig>) -> Self {
        Self { blocks }
    }
}

impl LayerBlockMeta for LayerBlockConfig {
    fn len(&self) -> usize {
        self.blocks.len()
    }

    fn in_planes(&self) -> usize {
        self.blocks[0].in_planes()
    }

    fn out_planes(&self) -> usize {
        self.blocks[self.blocks.len() - 1].out_planes()
    }

    fn stride(&self) -> usize {
        self.blocks
            .iter()
            .fold(1, |acc, block| acc * block.stride())
    }
}

impl LayerBlockConfig {
    /// Build a stage config.
    ///
    /// # Arguments
    ///
    /// - `num_blocks`: the number of residual blocks.
    /// - `in_planes`: planes entering the first block.
    /// - `planes`: planes of every block output.
    /// - `stride`: stride of the first block.
    pub fn build(
        num_blocks: usize,
        in_planes: usize,
        planes: usize,
        stride: usize,
    ) -> Self {
        let blocks = (0..num_blocks)
            .map(|b| {
                if b == 0 {
                    BasicBlockConfig::new(in_planes, planes).with_stride(stride)
                } else {
                    BasicBlockConfig::new(planes, planes)
                }
            })
            .collect();

        Self { blocks }
    }

    /// Check if the config is valid.
    pub fn try_validate(&self) -> ModelResult<()> {
        if self.is_empty() {
            return Err(ModelError::EmptyStage);
        }

        for idx in 1..self.blocks.len() {
            let prev = &self.blocks[idx - 1];
            let curr = &self.blocks[idx];
            if prev.out_planes() != curr.in_planes() {
                return Err(ModelError::PlaneMismatch {
                    prev: idx - 1,
                    next: idx,
                    out_planes: prev.out_planes(),
                    in_planes: curr.in_planes(),
                });
            }
        }

        for block in &self.blocks {
            block.shortcut_config().try_validate()?;
        }

        Ok(())
    }

    /// Panic if `try_validate` returns an error.
    pub fn expect_valid(&self) {
        if let Err(err) = self.try_validate() {
            panic!("{}\n{:#?}", err, self);
        }
    }

    /// Initialize a new [`LayerBlock`].
    pub fn init<B: Backend>(
        self,
        device: &B::Device,
    ) -> LayerBlock<B> {
        self.expect_valid();

        LayerBlock {
            blocks: self
                .blocks
                .into_iter()
                .map(|block| block.init(device))
                .collect(),
        }
    }

    /// Apply a mapping over the blocks.
    pub fn map_blocks<F>(
        self,
        f: &mut F,
    ) -> Self
    where
        F: FnMut(usize, BasicBlockConfig) -> BasicBlockConfig,
    {
        Self {
            blocks: self
                .blocks
                .into_iter()
                .enumerate()
                .map(|(idx, block)| f(idx, block))
                .collect(),
        }
    }

    /// Update the shortcut policy of every block.
    pub fn with_shortcut(
        self,
        policy: ShortcutPolicy,
    ) -> Self {
        self.map_blocks(&mut |_, block| block.with_shortcut(policy.clone()))
    }

    /// Update the activation of every block.
    pub fn with_activation(
        self,
        activation: ActivationConfig,
    ) -> Self {
        self.map_blocks(&mut |_, block| block.with_activation(activation.clone()))
    }

    /// Update the normalization of every block.
    pub fn with_normalization(
        self,
        normalization: NormalizationConfig,
    ) -> Self {
        self.map_blocks(&mut |_, block| block.with_normalization(normalization.clone()))
    }
}

/// `ResNet` Layer Block.
///
/// Implements [`LayerBlockMeta`].
#[derive(Module, Debug)]
pub struct LayerBlock<B: Backend> {
    /// Internal blocks.
    pub blocks: Vec<BasicBlock<B>>,
}

impl<B: Backend> LayerBlockMeta for LayerBlock<B> {
    fn len(&self) -> usize {
        self.blocks.len()
    }

    fn in_planes(&self) -> usize {
        self.blocks[0].in_planes()
    }

    fn out_planes(&self) -> usize {
        self.blocks[self.blocks.len() - 1].out_planes()
    }

    fn stride(&self) -> usize {
        self.blocks
            .iter()
            .fold(1, |acc, block| acc * block.stride())
    }
}

impl<B: Backend> LayerBlock<B> {
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
            &[("in_planes", self.in_planes()), ("stride", self.stride())]
        );

        let x = self
            .blocks
            .iter()
            .fold(input, |acc, block| block.forward(acc));

        assert_shape_contract_periodically!(
            ["batch", "out_planes", "out_height", "out_width"],
            &x,
            &[
                ("batch", batch),
                ("out_planes", self.out_planes()),
                ("out_height", out_height),
                ("out_width", out_width)
            ]
        );

        x
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bimm_contracts::assert_shape_contract;
    use burn::backend::NdArray;
    use burn::nn::GroupNormConfig;
    use hamcrest::prelude::*;

    #[test]
    fn test_layer_block_build() {
        let config = LayerBlockConfig::build(3, 16, 32, 2);
        assert_eq!(config.len(), 3);
        assert!(!config.is_empty());
        assert_eq!(config.in_planes(), 16);
        assert_eq!(config.out_planes(), 32);
        assert_eq!(config.stride(), 2);
        assert_eq!(config.output_resolution([32, 32]), [16, 16]);

        assert_that!(config.blocks[0].has_shortcut(), equal_to(true));
        assert_that!(config.blocks[1].has_shortcut(), equal_to(false));
        assert_that!(config.blocks[2].stride(), equal_to(1));

        config.expect_valid();
    }

    #[test]
    fn test_layer_block_validate() {
        let empty = LayerBlockConfig::new(vec![]);
        assert!(matches!(empty.try_validate(), Err(ModelError::EmptyStage)));

        let mismatched: LayerBlockConfig = vec![
            BasicBlockConfig::new(16, 32),
            BasicBlockConfig::new(16, 32),
        ]
        .into();
        assert!(matches!(
            mismatched.try_validate(),
            Err(ModelError::PlaneMismatch {
                prev: 0,
                next: 1,
                out_planes: 32,
                in_planes: 16,
            })
        ));

        let shrinking: LayerBlockConfig = vec![BasicBlockConfig::new(32, 16)].into();
        assert!(shrinking.try_validate().is_ok());
        let shrinking = shrinking.with_shortcut(ShortcutPolicy::ZeroPad);
        assert!(matches!(
            shrinking.try_validate(),
            Err(ModelError::InvalidShortcut(_))
        ));
    }

    #[test]
    #[should_panic(expected = "stage has no residual blocks")]
    fn test_layer_block_init_empty_panic() {
        type B = NdArray<f32>;
        let device = Default::default();
        let _block: LayerBlock<B> = LayerBlockConfig::new(vec![]).init(&device);
    }

    #[test]
    fn test_layer_block_policy_updates() {
        let config = LayerBlockConfig::build(2, 16, 32, 2)
            .with_shortcut(ShortcutPolicy::ZeroPad)
            .with_activation(ActivationConfig::Gelu)
            .with_normalization(GroupNormConfig::new(4, 0).into());

        for block in &config.blocks {
            assert_eq!(block.shortcut, ShortcutPolicy::ZeroPad);
            assert!(matches!(block.activation, ActivationConfig::Gelu));
            assert!(matches!(block.normalization, NormalizationConfig::Group(_)));
        }
    }

    #[test]
    fn test_layer_block_forward() {
        type B = NdArray<f32>;
        let device = Default::default();

        let block: LayerBlock<B> = LayerBlockConfig::build(2, 4, 8, 2).init(&device);
        assert_eq!(block.len(), 2);
        assert_eq!(block.in_planes(), 4);
        assert_eq!(block.out_planes(), 8);
        assert_eq!(block.stride(), 2);

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
    }
}
