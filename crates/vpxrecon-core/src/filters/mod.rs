//! CPU reference kernels.
//!
//! These are the authoritative numerics. The device kernels in
//! `gpu/shaders` reproduce them bit for bit, and every GPU failure falls
//! back to them.

pub mod bilinear;
pub mod idct;
pub mod loop_filter;
pub mod sixtap;
pub mod taps;

pub use bilinear::{bilinear_first_pass, bilinear_predict, bilinear_second_pass};
pub use idct::{
    dc_only_idct_add, dequant_idct_add, dequantize_block, idct4x4_add, inverse_walsh4x4,
    inverse_walsh4x4_dc_only, BLOCK_COEFFS,
};
pub use loop_filter::{
    filter_edges, loop_filter_line, mb_loop_filter_line, simple_loop_filter_line, EdgeLaunch,
};
pub use sixtap::{sixtap_first_pass, sixtap_predict, sixtap_second_pass};
pub use taps::{
    bilinear_taps, sixtap_taps, BILINEAR_FILTERS, FILTER_ROUNDING, FILTER_SHIFT, FILTER_WEIGHT,
    SUBPEL_FILTERS,
};

#[cfg(test)]
mod tests;
