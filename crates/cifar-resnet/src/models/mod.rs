//! # Complete Models

pub mod resnet;
