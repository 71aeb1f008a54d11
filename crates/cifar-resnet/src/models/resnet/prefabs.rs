//! # `ResNet` Config Prefabs
//!
//! Well-known CIFAR-10 `ResNet` configs, by name.
//!
//! ```rust,ignore
//! let prefab = PREFAB_RESNET_MAP.expect_lookup("resnet20");
//! let model: ResNet<B> = prefab.new_config().init(&device);
//! ```

use crate::errors::{ModelError, ModelResult};
use crate::models::resnet::resnet_model::ResNetContractConfig;
use std::fmt::Debug;

/// ResNet-20 depth; 3 blocks per stage.
pub const RESNET20_DEPTH: usize = 20;
/// ResNet-32 depth; 5 blocks per stage.
pub const RESNET32_DEPTH: usize = 32;
/// ResNet-44 depth; 7 blocks per stage.
pub const RESNET44_DEPTH: usize = 44;
/// ResNet-56 depth; 9 blocks per stage.
pub const RESNET56_DEPTH: usize = 56;

/// Number of CIFAR-10 classes.
pub const CIFAR10_CLASSES: usize = 10;

/// Static builder for a well-known [`ResNetContractConfig`].
pub struct StaticResNetPreFab {
    /// Name of the prefab.
    pub name: &'static str,

    /// Description of the prefab.
    pub description: &'static str,

    /// Builder function for the config.
    pub builder: fn() -> ResNetContractConfig,
}

impl StaticResNetPreFab {
    /// Build a new config.
    pub fn new_config(&self) -> ResNetContractConfig {
        (self.builder)()
    }
}

impl Debug for StaticResNetPreFab {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        let pretty = f.alternate();
        let mut handle = f.debug_struct("StaticResNetPreFab");
        handle
            .field("name", &self.name)
            .field("description", &self.description);
        if pretty {
            handle.field("config", &self.new_config());
        }
        handle.finish()
    }
}

/// A named collection of [`StaticResNetPreFab`]s.
#[derive(Debug)]
pub struct StaticResNetPreFabMap {
    /// Name of the map.
    pub name: &'static str,

    /// Description of the map.
    pub description: &'static str,

    /// The prefabs.
    pub items: &'static [&'static StaticResNetPreFab],
}

impl StaticResNetPreFabMap {
    /// Names of the registered prefabs.
    pub fn names(&self) -> Vec<&'static str> {
        self.items.iter().map(|item| item.name).collect()
    }

    /// Find a prefab by name.
    pub fn lookup(
        &self,
        name: &str,
    ) -> Option<&'static StaticResNetPreFab> {
        self.items.iter().copied().find(|item| item.name == name)
    }

    /// Find a prefab by name, or report the known names.
    pub fn try_lookup(
        &self,
        name: &str,
    ) -> ModelResult<&'static StaticResNetPreFab> {
        self.lookup(name).ok_or_else(|| ModelError::UnknownPrefab {
            name: name.to_string(),
            known: self.names(),
        })
    }

    /// Find a prefab by name.
    ///
    /// # Panics
    ///
    /// If no prefab has the name.
    pub fn expect_lookup(
        &self,
        name: &str,
    ) -> &'static StaticResNetPreFab {
        match self.try_lookup(name) {
            Ok(prefab) => prefab,
            Err(err) => panic!("{}", err),
        }
    }
}

/// Well-known CIFAR-10 [`super::ResNet`] configs.
pub static PREFAB_RESNET_MAP: StaticResNetPreFabMap = StaticResNetPreFabMap {
    name: "resnet",
    description: "Well-known CIFAR-10 ResNet configs",
    items: &[
        &StaticResNetPreFab {
            name: "resnet20",
            description: "ResNet-20 [3, 3, 3] BasicBlocks",
            builder: || ResNetContractConfig::new(RESNET20_DEPTH).with_num_classes(CIFAR10_CLASSES),
        },
        &StaticResNetPreFab {
            name: "resnet32",
            description: "ResNet-32 [5, 5, 5] BasicBlocks",
            builder: || ResNetContractConfig::new(RESNET32_DEPTH).with_num_classes(CIFAR10_CLASSES),
        },
        &StaticResNetPreFab {
            name: "resnet44",
            description: "ResNet-44 [7, 7, 7] BasicBlocks",
            builder: || ResNetContractConfig::new(RESNET44_DEPTH).with_num_classes(CIFAR10_CLASSES),
        },
        &StaticResNetPreFab {
            name: "resnet56",
            description: "ResNet-56 [9, 9, 9] BasicBlocks",
            builder: || ResNetContractConfig::new(RESNET56_DEPTH).with_num_classes(CIFAR10_CLASSES),
        },
    ],
};
