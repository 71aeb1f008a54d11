//! # `ResNet` Core Model
//!
//! [`ResNet`] is the CIFAR-style residual network:
//!
//! * a 3x3 conv/norm/act stem,
//! * three stages of ``n`` [`BasicBlock`](super::basic_block::BasicBlock)s
//!   with 16, 32 and 64 planes and strides 1, 2, 2,
//! * global average pooling and a dense classifier.
//!
//! The depth is ``6n + 2``: ResNet-20, 32, 44 and 56 use ``n`` of
//! 3, 5, 7 and 9.
//!
//! [`ResNetContractConfig`] implements [`Config`], and provides
//! a high-level configuration interface.
//! It provides [`ResNetContractConfig::to_structure`] to convert
//! to a [`ResNetStructureConfig`].
//!
//! [`ResNetStructureConfig`] implements [`Config`], and provides
//! [`ResNetStructureConfig::init`] to initialize a [`ResNet`].
//!
//! [`ResNet`] implements [`Module`], and provides
//! [`ResNet::forward`].

use crate::compat::activation_wrapper::ActivationConfig;
use crate::compat::normalization_wrapper::NormalizationConfig;
use crate::errors::{ModelError, ModelResult};
use crate::layers::blocks::cna::{CNA2d, CNA2dConfig, CNA2dPolicy};
use crate::layers::blocks::conv_norm::ConvNorm2dMeta;
use crate::models::resnet::layer_block::{LayerBlock, LayerBlockConfig, LayerBlockMeta};
use crate::models::resnet::shortcut::ShortcutPolicy;
use crate::models::resnet::util::{conv3x3, stride_div_output_resolution};
use bimm_contracts::{assert_shape_contract_periodically, unpack_shape_contract};
use burn::module::Module;
use burn::nn::pool::{AdaptiveAvgPool2d, AdaptiveAvgPool2dConfig};
use burn::nn::{Linear, LinearConfig};
use burn::prelude::{Backend, Config, Tensor};
use burn::tensor::activation::softmax;
use serde::{Deserialize, Serialize};

/// Planes multipliers of the three stages, relative to the stem width.
pub const STAGE_PLANE_FACTORS: [usize; 3] = [1, 2, 4];

/// Strides of the three stages.
pub const STAGE_STRIDES: [usize; 3] = [1, 2, 2];

/// Compute the residual blocks per stage for a network depth.
///
/// Each stage holds ``n`` two-conv blocks; the stem conv and the
/// classifier add two more weighted layers: ``depth = 6n + 2``.
pub fn blocks_per_stage_for_depth(depth: usize) -> ModelResult<usize> {
    if depth < 8 || (depth - 2) % 6 != 0 {
        return Err(ModelError::InvalidDepth { depth });
    }
    Ok((depth - 2) / 6)
}

/// High-level `ResNet` model configuration.
#[derive(Config, Debug)]
pub struct ResNetContractConfig {
    /// Network depth; ``6n + 2``.
    pub depth: usize,

    /// Number of classification classes.
    #[config(default = "10")]
    pub num_classes: usize,

    /// Number of input image channels.
    #[config(default = "3")]
    pub in_channels: usize,

    /// Number of channels in the stem convolution and the first stage.
    #[config(default = "16")]
    pub stem_width: usize,

    /// Shortcut policy for blocks which change stride or planes.
    #[config(default = "ShortcutPolicy::Projection")]
    pub shortcut: ShortcutPolicy,

    /// Normalization config; the feature size will be auto-matched.
    #[config(default = "NormalizationConfig::default()")]
    pub normalization: NormalizationConfig,

    /// Activation config.
    #[config(default = "ActivationConfig::Relu")]
    pub activation: ActivationConfig,
}

impl ResNetContractConfig {
    /// The residual blocks in each stage.
    pub fn blocks_per_stage(&self) -> ModelResult<usize> {
        blocks_per_stage_for_depth(self.depth)
    }

    /// Convert to a [`ResNetStructureConfig`].
    pub fn try_to_structure(&self) -> ModelResult<ResNetStructureConfig> {
        let num_blocks = self.blocks_per_stage()?;

        let stem = CNA2dPolicy {
            norm: self.normalization.clone(),
            act: self.activation.clone(),
        }
        .build_config(conv3x3(self.in_channels, self.stem_width, 1));

        let mut in_planes = self.stem_width;
        let layers = STAGE_PLANE_FACTORS
            .iter()
            .zip(STAGE_STRIDES)
            .map(|(factor, stride)| {
                let planes = self.stem_width * factor;
                let layer = LayerBlockConfig::build(num_blocks, in_planes, planes, stride)
                    .with_shortcut(self.shortcut.clone())
                    .with_normalization(self.normalization.clone())
                    .with_activation(self.activation.clone());
                in_planes = planes;
                layer
            })
            .collect();

        let structure = ResNetStructureConfig::new(stem, layers, self.num_classes);
        structure.try_validate()?;

        tracing::debug!(
            depth = self.depth,
            blocks_per_stage = num_blocks,
            num_classes = self.num_classes,
            shortcut = ?self.shortcut,
            "derived resnet structure"
        );

        Ok(structure)
    }

    /// Convert to a [`ResNetStructureConfig`].
    ///
    /// # Panics
    ///
    /// If the depth is not ``6n + 2``.
    pub fn to_structure(&self) -> ResNetStructureConfig {
        match self.try_to_structure() {
            Ok(structure) => structure,
            Err(err) => panic!("{}", err),
        }
    }

    /// Build and initialize a [`ResNet`].
    pub fn init<B: Backend>(
        &self,
        device: &B::Device,
    ) -> ResNet<B> {
        self.to_structure().init(device)
    }
}

/// [`ResNet`] Structure Config.
///
/// This config defines the explicit layer graph of a model.
#[derive(Config, Debug)]
pub struct ResNetStructureConfig {
    /// The stem conv/norm/act block.
    pub stem: CNA2dConfig,

    /// The stage configurations.
    pub layers: Vec<LayerBlockConfig>,

    /// The number of classes.
    pub num_classes: usize,
}

impl ResNetStructureConfig {
    /// Check if the config is valid.
    pub fn try_validate(&self) -> ModelResult<()> {
        if self.layers.is_empty() {
            return Err(ModelError::EmptyStage);
        }

        let mut planes = self.stem.out_channels();
        for (stage, layer) in self.layers.iter().enumerate() {
            layer.try_validate()?;
            if layer.in_planes() != planes {
                return Err(ModelError::StageMismatch {
                    stage,
                    expected: planes,
                    actual: layer.in_planes(),
                });
            }
            planes = layer.out_planes();
        }
        Ok(())
    }

    /// The total number of weighted layers: stem, two per block, classifier.
    pub fn depth(&self) -> usize {
        2 + 2 * self.layers.iter().map(|l| l.len()).sum::<usize>()
    }

    /// Initialize a [`ResNet`] model.
    ///
    /// # Panics
    ///
    /// If the structure is invalid.
    pub fn init<B: Backend>(
        self,
        device: &B::Device,
    ) -> ResNet<B> {
        if let Err(err) = self.try_validate() {
            panic!("{}", err);
        }

        let depth = self.depth();
        let head_planes = self.layers[self.layers.len() - 1].out_planes();

        let model = ResNet {
            stem: self.stem.init(device),
            layers: self
                .layers
                .into_iter()
                .map(|c| c.init(device))
                .collect::<Vec<_>>(),
            output_pool: AdaptiveAvgPool2dConfig::new([1, 1]).init(),
            output_fc: LinearConfig::new(head_planes, self.num_classes).init(device),
        };

        tracing::debug!(
            depth,
            num_classes = self.num_classes,
            num_params = model.num_params(),
            "initialized resnet"
        );

        model
    }
}

/// Serializable description of an initialized [`ResNet`].
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct ResNetSummary {
    /// Number of weighted layers.
    pub depth: usize,

    /// Residual blocks in each stage.
    pub blocks_per_stage: Vec<usize>,

    /// Output planes of each stage.
    pub stage_planes: Vec<usize>,

    /// Number of classification classes.
    pub num_classes: usize,

    /// Number of learnable parameters.
    pub num_params: usize,
}

/// `ResNet` model.
#[derive(Module, Debug)]
pub struct ResNet<B: Backend> {
    /// Stem conv/norm/act.
    pub stem: CNA2d<B>,

    /// Stages.
    pub layers: Vec<LayerBlock<B>>,

    /// Head pooling.
    pub output_pool: AdaptiveAvgPool2d,

    /// Head classifier.
    pub output_fc: Linear<B>,
}

impl<B: Backend> ResNet<B> {
    /// Number of input image channels.
    pub fn in_channels(&self) -> usize {
        self.stem.in_channels()
    }

    /// Number of classification classes.
    pub fn num_classes(&self) -> usize {
        self.output_fc.weight.dims()[1]
    }

    /// Width of the pooled feature vector.
    pub fn num_features(&self) -> usize {
        self.output_fc.weight.dims()[0]
    }

    /// Number of weighted layers.
    pub fn depth(&self) -> usize {
        2 + 2 * self.layers.iter().map(|l| l.len()).sum::<usize>()
    }

    /// Total downsampling factor of the feature extractor.
    pub fn stride(&self) -> usize {
        self.layers
            .iter()
            .fold(self.stem.stride()[0], |acc, layer| acc * layer.stride())
    }

    /// Resolution of the final feature map for a given input resolution.
    ///
    /// # Panics
    ///
    /// If the input resolution is not a multiple of the stride.
    pub fn output_resolution(
        &self,
        input_resolution: [usize; 2],
    ) -> [usize; 2] {
        stride_div_output_resolution(input_resolution, self.stride())
    }

    /// Describe this model.
    pub fn summary(&self) -> ResNetSummary {
        ResNetSummary {
            depth: self.depth(),
            blocks_per_stage: self.layers.iter().map(|l| l.len()).collect(),
            stage_planes: self.layers.iter().map(|l| l.out_planes()).collect(),
            num_classes: self.num_classes(),
            num_params: self.num_params(),
        }
    }

    /// Extract pooled features.
    ///
    /// # Arguments
    ///
    /// - `input`: ``[batch, in_channels, height=out_height*stride, width=out_width*stride]``.
    ///
    /// # Returns
    ///
    /// A ``[batch, num_features]`` tensor.
    pub fn forward_features(
        &self,
        input: Tensor<B, 4>,
    ) -> Tensor<B, 2> {
        let [batch] = unpack_shape_contract!(
            [
                "batch",
                "in_channels",
                "height" = "out_height" * "stride",
                "width" = "out_width" * "stride"
            ],
            &input,
            &["batch"],
            &[
                ("in_channels", self.in_channels()),
                ("stride", self.stride())
            ]
        );

        let x = self.stem.forward(input);
        let x = self.layers.iter().fold(x, |x, layer| layer.forward(x));

        let x = self.output_pool.forward(x);
        // Reshape [B, C, 1, 1] -> [B, C]
        let x: Tensor<B, 2> = x.flatten(1, 3);

        assert_shape_contract_periodically!(
            ["batch", "features"],
            &x,
            &[("batch", batch), ("features", self.num_features())]
        );

        x
    }

    /// `ResNet` forward pass.
    ///
    /// # Arguments
    ///
    /// - `input`: ``[batch, in_channels, height=out_height*stride, width=out_width*stride]``.
    ///
    /// # Returns
    ///
    /// A ``[batch, num_classes]`` tensor of logits.
    pub fn forward(
        &self,
        input: Tensor<B, 4>,
    ) -> Tensor<B, 2> {
        let x = self.forward_features(input);
        self.output_fc.forward(x)
    }

    /// Class-probability forward pass.
    ///
    /// # Returns
    ///
    /// A ``[batch, num_classes]`` tensor; each row sums to 1.
    pub fn forward_probabilities(
        &self,
        input: Tensor<B, 4>,
    ) -> Tensor<B, 2> {
        softmax(self.forward(input), 1)
    }

    /// Re-initialize the classifier with the specified number of output classes.
    pub fn with_classes(
        mut self,
        num_classes: usize,
    ) -> Self {
        let d_input = self.num_features();
        self.output_fc =
            LinearConfig::new(d_input, num_classes).init(&self.output_fc.weight.device());
        self
    }

    /// Apply a mapping over layers.
    pub fn map_layers<F>(
        self,
        f: F,
    ) -> Self
    where
        F: FnOnce(Vec<LayerBlock<B>>) -> Vec<LayerBlock<B>>,
    {
        Self {
            layers: f(self.layers),
            ..self
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::resnet::basic_block::BasicBlockMeta;
    use bimm_contracts::assert_shape_contract;
    use burn::backend::{Autodiff, NdArray};
    use burn::tensor::Distribution;

    #[test]
    fn test_blocks_per_stage_for_depth() {
        assert_eq!(blocks_per_stage_for_depth(20).unwrap(), 3);
        assert_eq!(blocks_per_stage_for_depth(32).unwrap(), 5);
        assert_eq!(blocks_per_stage_for_depth(44).unwrap(), 7);
        assert_eq!(blocks_per_stage_for_depth(56).unwrap(), 9);
        assert_eq!(blocks_per_stage_for_depth(110).unwrap(), 18);
        assert_eq!(blocks_per_stage_for_depth(8).unwrap(), 1);
        assert_eq!(blocks_per_stage_for_depth(50).unwrap(), 8);

        for depth in [0, 2, 7, 18, 21, 49, 51] {
            assert!(matches!(
                blocks_per_stage_for_depth(depth),
                Err(ModelError::InvalidDepth { depth: d }) if d == depth
            ));
        }
    }

    #[test]
    fn test_contract_to_structure() {
        let structure = ResNetContractConfig::new(20).to_structure();

        assert_eq!(structure.depth(), 20);
        assert_eq!(structure.num_classes, 10);
        assert_eq!(structure.stem.in_channels(), 3);
        assert_eq!(structure.stem.out_channels(), 16);
        assert_eq!(structure.layers.len(), 3);

        let planes: Vec<usize> = structure.layers.iter().map(|l| l.out_planes()).collect();
        assert_eq!(planes, vec![16, 32, 64]);

        let strides: Vec<usize> = structure.layers.iter().map(|l| l.stride()).collect();
        assert_eq!(strides, vec![1, 2, 2]);

        for layer in &structure.layers {
            assert_eq!(layer.len(), 3);
        }

        // Only the first block of the downsampling stages reshapes its shortcut.
        let shortcuts: Vec<bool> = structure
            .layers
            .iter()
            .flat_map(|l| l.blocks.iter().map(|b| b.has_shortcut()))
            .collect();
        assert_eq!(
            shortcuts,
            vec![false, false, false, true, false, false, true, false, false]
        );
    }

    #[test]
    fn test_contract_invalid_depth() {
        let config = ResNetContractConfig::new(21);
        assert!(matches!(
            config.try_to_structure(),
            Err(ModelError::InvalidDepth { depth: 21 })
        ));
    }

    #[test]
    #[should_panic(expected = "invalid depth 18")]
    fn test_contract_invalid_depth_panic() {
        ResNetContractConfig::new(18).to_structure();
    }

    #[test]
    fn test_contract_config_json_roundtrip() {
        let config = ResNetContractConfig::new(32)
            .with_num_classes(100)
            .with_shortcut(ShortcutPolicy::ZeroPad);

        let json = config.to_string();
        let loaded = ResNetContractConfig::load_binary(json.as_bytes()).unwrap();

        assert_eq!(loaded.depth, 32);
        assert_eq!(loaded.num_classes, 100);
        assert_eq!(loaded.shortcut, ShortcutPolicy::ZeroPad);
    }

    #[test]
    fn test_structure_validate() {
        let mut structure = ResNetContractConfig::new(20).to_structure();
        structure.layers.swap(0, 1);
        assert!(matches!(
            structure.try_validate(),
            Err(ModelError::StageMismatch {
                stage: 1,
                expected: 32,
                actual: 16,
            })
        ));

        let mut structure = ResNetContractConfig::new(20).to_structure();
        structure.layers.clear();
        assert!(matches!(
            structure.try_validate(),
            Err(ModelError::EmptyStage)
        ));
    }

    #[test]
    fn test_resnet20_forward() {
        type B = NdArray<f32>;
        let device = Default::default();

        let model: ResNet<B> = ResNetContractConfig::new(20).init(&device);
        assert_eq!(model.depth(), 20);
        assert_eq!(model.in_channels(), 3);
        assert_eq!(model.num_classes(), 10);
        assert_eq!(model.num_features(), 64);
        assert_eq!(model.stride(), 4);
        assert_eq!(model.output_resolution([32, 32]), [8, 8]);

        let input = Tensor::random([2, 3, 32, 32], Distribution::Default, &device);
        let output = model.forward(input);

        assert_shape_contract!(
            ["batch", "num_classes"],
            &output,
            &[("batch", 2), ("num_classes", 10)],
        );
    }

    #[test]
    fn test_forward_probabilities_rows_sum_to_one() {
        type B = NdArray<f32>;
        let device = Default::default();

        let model: ResNet<B> = ResNetContractConfig::new(8)
            .with_shortcut(ShortcutPolicy::ZeroPad)
            .init(&device);

        let input = Tensor::random([3, 3, 16, 16], Distribution::Default, &device);
        let probs = model.forward_probabilities(input);
        assert_eq!(probs.dims(), [3, 10]);

        let max_err = (probs.clone().sum_dim(1) - 1.0).abs().max().into_scalar();
        assert!(max_err < 1e-5);

        let min = probs.min().into_scalar();
        assert!(min >= 0.0);
    }

    #[test]
    fn test_forward_autodiff_backward() {
        type B = Autodiff<NdArray<f32>>;
        let device = Default::default();

        let model: ResNet<B> = ResNetContractConfig::new(8).init(&device);

        let input = Tensor::random([2, 3, 8, 8], Distribution::Default, &device);
        let output = model.forward(input);
        let grads = output.sum().backward();

        assert!(model.stem.conv_norm.conv.weight.grad(&grads).is_some());
        assert!(model.output_fc.weight.grad(&grads).is_some());
    }

    #[test]
    #[should_panic]
    fn test_forward_wrong_channels_panic() {
        type B = NdArray<f32>;
        let device = Default::default();

        let model: ResNet<B> = ResNetContractConfig::new(8).init(&device);
        let input = Tensor::ones([1, 1, 8, 8], &device);
        model.forward(input);
    }

    #[test]
    fn test_with_classes() {
        type B = NdArray<f32>;
        let device = Default::default();

        let model: ResNet<B> = ResNetContractConfig::new(8).init(&device).with_classes(100);
        assert_eq!(model.num_classes(), 100);

        let output = model.forward(Tensor::ones([1, 3, 8, 8], &device));
        assert_eq!(output.dims(), [1, 100]);
    }

    #[test]
    fn test_map_layers() {
        type B = NdArray<f32>;
        let device = Default::default();

        let model: ResNet<B> = ResNetContractConfig::new(8).init(&device);
        assert_eq!(model.depth(), 8);

        let model = model.map_layers(|mut layers| {
            layers[2] = LayerBlockConfig::build(2, 32, 64, 2)
                .with_shortcut(ShortcutPolicy::ZeroPad)
                .init(&device);
            layers
        });
        assert_eq!(model.depth(), 10);
        assert_eq!(model.stride(), 4);
        assert_eq!(model.layers[2].len(), 2);

        let policy = model.layers[2].blocks[0]
            .shortcut
            .as_ref()
            .map(|shortcut| shortcut.policy());
        assert_eq!(policy, Some(ShortcutPolicy::ZeroPad));
        assert!(model.layers[2].blocks[1].shortcut.is_none());

        let output = model.forward(Tensor::ones([1, 3, 8, 8], &device));
        assert_eq!(output.dims(), [1, 10]);
    }

    #[test]
    fn test_summary() {
        type B = NdArray<f32>;
        let device = Default::default();

        let model: ResNet<B> = ResNetContractConfig::new(20)
            .with_shortcut(ShortcutPolicy::ZeroPad)
            .init(&device);
        let summary = model.summary();

        assert_eq!(summary.depth, 20);
        assert_eq!(summary.blocks_per_stage, vec![3, 3, 3]);
        assert_eq!(summary.stage_planes, vec![16, 32, 64]);
        assert_eq!(summary.num_classes, 10);
        // Option A ResNet-20: ~0.27M parameters.
        assert!(summary.num_params > 260_000 && summary.num_params < 280_000);

        let json = serde_json::to_string(&summary).unwrap();
        let decoded: ResNetSummary = serde_json::from_str(&json).unwrap();
        assert_eq!(decoded, summary);
    }
}
