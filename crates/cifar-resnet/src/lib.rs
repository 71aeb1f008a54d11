#![warn(missing_docs)]
//!# cifar-resnet - CIFAR-10 Residual Networks
//!
//! ## Notable Components
//!
//! * [`compat`] - layer abstraction wrappers.
//!   * [`compat::activation_wrapper::Activation`] - activation layer abstraction wrapper.
//!   * [`compat::normalization_wrapper::Normalization`] - norm layer abstraction wrapper.
//! * [`errors`] - model construction errors.
//! * [`layers`] - reusable neural network modules.
//!   * [`layers::blocks`] - miscellaneous blocks.
//!     * [`layers::blocks::conv_norm`] - ``Conv2d + Normalization`` block.
//!     * [`layers::blocks::cna`] - ``Conv2d + Normalization + Activation`` block.
//! * [`models`] - complete model families.
//!   * [`models::resnet`] - CIFAR `ResNet` (20, 32, 44, 56, ...).

/// Test-only macro import.
#[cfg(test)]
#[allow(unused_imports)]
#[macro_use]
extern crate hamcrest;

pub mod compat;
pub mod errors;
pub mod layers;
pub mod models;
