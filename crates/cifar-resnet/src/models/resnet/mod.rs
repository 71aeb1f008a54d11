//! # CIFAR `ResNet`
//!
//! The `ResNet` v1 family for 32x32 inputs: a 3x3 stem, three stages of
//! [`basic_block::BasicBlock`]s at 16, 32 and 64 planes, and a pooled
//! linear head. Depth is ``6n + 2``.
//!
//! * [`resnet_model::ResNetContractConfig`] - depth-level description.
//! * [`resnet_model::ResNetStructureConfig`] - the expanded block layout.
//! * [`resnet_model::ResNet`] - the model.
//! * [`prefabs::PREFAB_RESNET_MAP`] - ResNet-20/32/44/56 by name.

pub mod basic_block;
pub mod layer_block;
pub mod prefabs;
pub mod resnet_io;
pub mod resnet_model;
pub mod shortcut;
pub mod util;

pub use resnet_model::{ResNet, ResNetContractConfig, ResNetStructureConfig, ResNetSummary};
