//! # Compat Layers
//!
//! Config-selectable wrappers over built-in ``burn::nn`` layer families.
pub mod activation_wrapper;
pub mod normalization_wrapper;
