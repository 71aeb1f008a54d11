//! # Model Construction Errors

use thiserror::Error;

/// Result alias for model construction.
pub type ModelResult<T> = Result<T, ModelError>;

/// Errors raised while building or persisting a model.
#[derive(Error, Debug)]
pub enum ModelError {
    /// The requested depth is not of the form ``6n + 2`` with ``n >= 1``.
    #[error("invalid depth {depth}: expected 6n + 2 for n >= 1 (20, 32, 44, 56, ...)")]
    InvalidDepth {
        /// The rejected depth.
        depth: usize,
    },

    /// A stage was configured without any residual blocks.
    #[error("stage has no residual blocks")]
    EmptyStage,

    /// Adjacent blocks disagree on the plane count.
    #[error("block[{prev}].out_planes({out_planes}) != block[{next}].in_planes({in_planes})")]
    PlaneMismatch {
        /// Index of the upstream block.
        prev: usize,
        /// Index of the downstream block.
        next: usize,
        /// Output planes of the upstream block.
        out_planes: usize,
        /// Input planes of the downstream block.
        in_planes: usize,
    },

    /// A stage's input planes disagree with the preceding output planes.
    #[error("stage[{stage}].in_planes({actual}) != {expected} planes entering the stage")]
    StageMismatch {
        /// Index of the stage.
        stage: usize,
        /// Planes produced upstream.
        expected: usize,
        /// Planes the stage accepts.
        actual: usize,
    },

    /// The shortcut policy cannot map ``in_planes`` to ``out_planes``.
    #[error("invalid shortcut: {0}")]
    InvalidShortcut(String),

    /// No prefab with the given name.
    #[error("unknown prefab \"{name}\"; known: {known:?}")]
    UnknownPrefab {
        /// The requested name.
        name: String,
        /// Names of the registered prefabs.
        known: Vec<&'static str>,
    },

    /// Failure loading or saving a module record.
    #[error("record error: {0}")]
    Record(#[from] burn::record::RecorderError),
}
