//! # `ResNet` Weight Persistence
//!
//! Weights are stored as named message-pack records; the
//! [`ResNetStructureConfig`] is stored alongside as JSON by the caller
//! (see [`burn::config::Config::save`]).

use crate::errors::ModelResult;
use crate::models::resnet::resnet_model::{ResNet, ResNetStructureConfig};
use burn::module::Module;
use burn::prelude::Backend;
use burn::record::{FullPrecisionSettings, NamedMpkFileRecorder};
use std::path::{Path, PathBuf};

/// The recorder used for `ResNet` weights.
pub type ResNetRecorder = NamedMpkFileRecorder<FullPrecisionSettings>;

impl<B: Backend> ResNet<B> {
    /// Save the model weights.
    ///
    /// The recorder appends its own file extension to `path`.
    pub fn save_weights<P: Into<PathBuf>>(
        self,
        path: P,
    ) -> ModelResult<()> {
        let path = path.into();
        tracing::debug!(path = %path.display(), "saving resnet weights");
        self.save_file(path, &ResNetRecorder::new())?;
        Ok(())
    }

    /// Load weights into this model.
    ///
    /// The record must match this model's structure.
    pub fn load_weights<P: Into<PathBuf>>(
        self,
        path: P,
        device: &B::Device,
    ) -> ModelResult<Self> {
        let path = path.into();
        tracing::debug!(path = %path.display(), "loading resnet weights");
        Ok(self.load_file(path, &ResNetRecorder::new(), device)?)
    }
}

impl ResNetStructureConfig {
    /// Initialize a [`ResNet`] and load its weights.
    pub fn init_with_weights<B: Backend>(
        self,
        path: &Path,
        device: &B::Device,
    ) -> ModelResult<ResNet<B>> {
        self.init(device).load_weights(path, device)
    }
}
