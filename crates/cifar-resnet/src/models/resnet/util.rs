//! # `ResNet` Utilities
use bimm_contracts::unpack_shape_contract;
use burn::nn::conv::Conv2dConfig;
use burn::nn::{Initializer, PaddingConfig2d};

/// Kaiming-normal (fan-out) initializer for convolutions feeding a `ReLU`.
pub const CONV_INTO_RELU_INITIALIZER: Initializer = Initializer::KaimingNormal {
    gain: std::f64::consts::SQRT_2,
    fan_out_only: true,
};

/// A bias-free 3x3 conv with unit padding.
///
/// Spatial size is preserved at stride 1 and divided by `stride` otherwise.
pub fn conv3x3(
    in_planes: usize,
    out_planes: usize,
    stride: usize,
) -> Conv2dConfig {
    Conv2dConfig::new([in_planes, out_planes], scalar_to_array(3))
        .with_stride(scalar_to_array(stride))
        .with_padding(PaddingConfig2d::Explicit(1, 1))
        .with_initializer(CONV_INTO_RELU_INITIALIZER)
        .with_bias(false)
}

/// Broadcast a scalar to a square array.
#[inline(always)]
pub fn scalar_to_array<const D: usize, T: Copy>(value: T) -> [T; D] {
    [value; D]
}

/// Get the output resolution for a given input resolution.
///
/// The input must be a multiple of the stride.
///
/// # Arguments
///
/// - `input_resolution`: ``[height_in=height_out*stride, width_in=width_out*stride]``.
///
/// # Returns
///
/// ``[height_out, width_out]``
///
/// # Panics
///
/// If the input resolution is not a multiple of the stride.
#[inline(always)]
pub fn stride_div_output_resolution(
    input_resolution: [usize; 2],
    stride: usize,
) -> [usize; 2] {
    unpack_shape_contract!(
        [
            "height_in" = "height_out" * "stride",
            "width_in" = "width_out" * "stride"
        ],
        &input_resolution,
        &["height_out", "width_out"],
        &[("stride", stride)]
    )
}
