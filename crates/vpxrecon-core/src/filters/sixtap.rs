//! Six-tap separable sub-pixel interpolation.

use super::taps::{normalize, SIXTAP_LEN, SUBPEL_FILTERS};

/// Rows needed above the block by the vertical pass.
pub const SIXTAP_ROWS_BEFORE: usize = 2;
/// Rows needed below the block by the vertical pass.
pub const SIXTAP_ROWS_AFTER: usize = 3;
/// Extra intermediate rows produced by the horizontal pass.
pub const SIXTAP_EXTRA_ROWS: usize = SIXTAP_ROWS_BEFORE + SIXTAP_ROWS_AFTER;

/// Largest intermediate buffer: 16 columns by 16 + 5 rows.
pub const SIXTAP_INTERMEDIATE_LEN: usize = 16 * (16 + SIXTAP_EXTRA_ROWS);

/// Horizontal (first) pass.
///
/// `src[0]` is the sample under tap 0 of output `(0, 0)`; output `(r, c)`
/// reads `src[r * src_stride + c + k * pixel_step]` for `k` in `0..6`.
/// Results are clamped to the 8-bit range but kept as `i32`.
pub fn sixtap_first_pass(
    src: &[u8],
    output: &mut [i32],
    src_stride: usize,
    pixel_step: usize,
    output_height: usize,
    output_width: usize,
    taps: &[i32; SIXTAP_LEN],
) {
    for row in 0..output_height {
        let src_row = row * src_stride;
        let out_row = row * output_width;
        for col in 0..output_width {
            let base = src_row + col;
            let sum: i32 = taps
                .iter()
                .enumerate()
                .map(|(k, &tap)| src[base + k * pixel_step] as i32 * tap)
                .sum();
            output[out_row + col] = normalize(sum).clamp(0, 255);
        }
    }
}

/// Vertical (second) pass, writing 8-bit pixels at `output_pitch`.
///
/// Same addressing as [`sixtap_first_pass`] with an `i32` source.
#[allow(clippy::too_many_arguments)]
pub fn sixtap_second_pass(
    src: &[i32],
    output: &mut [u8],
    output_pitch: usize,
    src_stride: usize,
    pixel_step: usize,
    output_height: usize,
    output_width: usize,
    taps: &[i32; SIXTAP_LEN],
) {
    for row in 0..output_height {
        let src_row = row * src_stride;
        let out_row = row * output_pitch;
        for col in 0..output_width {
            let base = src_row + col;
            let sum: i32 = taps
                .iter()
                .enumerate()
                .map(|(k, &tap)| src[base + k * pixel_step] * tap)
                .sum();
            output[out_row + col] = normalize(sum).clamp(0, 255) as u8;
        }
    }
}

/// Predict a `width x height` block with the six-tap filter.
///
/// `src_origin` indexes the block's top-left source pixel; the source must
/// provide two rows/columns before and three after the block.
///
/// # Panics
///
/// Panics if the phases exceed 7 or the regions fall outside the slices.
/// Callers validate geometry before reaching the reference kernels.
#[allow(clippy::too_many_arguments)]
pub fn sixtap_predict(
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
    let mut intermediate = [0i32; SIXTAP_INTERMEDIATE_LEN];
    let region_start = src_origin - SIXTAP_ROWS_BEFORE * src_stride - SIXTAP_ROWS_BEFORE;
    let rows = height + SIXTAP_EXTRA_ROWS;

    sixtap_first_pass(
        &src[region_start..],
        &mut intermediate,
        src_stride,
        1,
        rows,
        width,
        &SUBPEL_FILTERS[x_phase],
    );

    sixtap_second_pass(
        &intermediate,
        &mut dst[dst_origin..],
        dst_pitch,
        width,
        width,
        height,
        width,
        &SUBPEL_FILTERS[y_phase],
    );
}
