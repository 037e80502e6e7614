//! Two-tap bilinear sub-pixel interpolation.

use super::taps::{normalize, BILINEAR_FILTERS, BILINEAR_LEN};

/// Largest intermediate buffer: 16 columns by 16 + 1 rows.
pub const BILINEAR_INTERMEDIATE_LEN: usize = 16 * 17;

/// Horizontal (first) pass producing 16-bit intermediates.
///
/// Output `(r, c)` reads `src[r * src_stride + c]` and the sample one
/// `pixel_step` further.
pub fn bilinear_first_pass(
    src: &[u8],
    output: &mut [u16],
    src_stride: usize,
    pixel_step: usize,
    output_height: usize,
    output_width: usize,
    taps: &[i32; BILINEAR_LEN],
) {
    for row in 0..output_height {
        for col in 0..output_width {
            let base = row * src_stride + col;
            let sum = src[base] as i32 * taps[0] + src[base + pixel_step] as i32 * taps[1];
            output[row * output_width + col] = normalize(sum) as u16;
        }
    }
}

/// Vertical (second) pass writing 8-bit pixels at `output_pitch`.
#[allow(clippy::too_many_arguments)]
pub fn bilinear_second_pass(
    src: &[u16],
    output: &mut [u8],
    output_pitch: usize,
    src_stride: usize,
    pixel_step: usize,
    output_height: usize,
    output_width: usize,
    taps: &[i32; BILINEAR_LEN],
) {
    for row in 0..output_height {
        for col in 0..output_width {
            let base = row * src_stride + col;
            let sum = src[base] as i32 * taps[0] + src[base + pixel_step] as i32 * taps[1];
            output[row * output_pitch + col] = normalize(sum) as u8;
        }
    }
}

/// Predict a `width x height` block with the bilinear filter.
///
/// The source must provide one extra column and one extra row after the
/// block.
///
/// # Panics
///
/// Panics if the phases exceed 7 or the regions fall outside the slices.
#[allow(clippy::too_many_arguments)]
pub fn bilinear_predict(
    src: &[u8],
    src_origin: usize,
    src_stride: usize,
    x_phase: usize,
    y_phase: usize,
    dst: &mut [u8],
    dst_origin: usize,
    dst_pitch: usize,
    width: usize,
    height: usize,
) {
    let mut intermediate = [0u16; BILINEAR_INTERMEDIATE_LEN];

    bilinear_first_pass(
        &src[src_origin..],
        &mut intermediate,
        src_stride,
        1,
        height + 1,
        width,
        &BILINEAR_FILTERS[x_phase],
    );

    bilinear_second_pass(
        &intermediate,
        &mut dst[dst_origin..],
        dst_pitch,
        width,
        width,
        height,
        width,
        &BILINEAR_FILTERS[y_phase],
    );
}
