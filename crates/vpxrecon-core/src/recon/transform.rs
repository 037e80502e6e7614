//! Inverse transform and add for luma and chroma block groups.
//!
//! Always runs on the CPU reference kernels. Consumed coefficients are
//! cleared so the macroblock buffer is ready for the next one.

use crate::error::ReconError;
use crate::filters::idct::{
    dc_only_idct_add, dequant_idct_add, dequantize_block, inverse_walsh4x4,
    inverse_walsh4x4_dc_only, BLOCK_COEFFS,
};
use crate::models::{DequantFactors, MacroblockCoeffs, PlaneMut, U_BLOCK, V_BLOCK, Y2_BLOCK};

/// Offset of 4x4 block `index` in a grid `per_row` blocks wide.
fn block_origin(origin: usize, stride: usize, index: usize, per_row: usize) -> usize {
    origin + (index / per_row) * 4 * stride + (index % per_row) * 4
}

/// Reconstruct one block by its end-of-block count.
///
/// EOB 0 leaves the prediction untouched, EOB 1 takes the DC-only path
/// and anything larger runs the full transform.
fn reconstruct_block(
    coeffs: &mut [i16; BLOCK_COEFFS],
    eob: u8,
    factors: &[i16; BLOCK_COEFFS],
    dst: &mut [u8],
    origin: usize,
    stride: usize,
) {
    match eob {
        0 => {}
        1 => {
            let dc = coeffs[0].wrapping_mul(factors[0]);
            dc_only_idct_add(dc, dst, origin, stride);
            coeffs[0] = 0;
        }
        _ => dequant_idct_add(coeffs, factors, dst, origin, stride),
    }
}

/// Run the second-order transform and scatter its output into the DC of
/// the 16 luma blocks.
fn apply_second_order(coeffs: &mut MacroblockCoeffs, dq: &DequantFactors) {
    let mut y2 = coeffs.blocks[Y2_BLOCK];
    dequantize_block(&mut y2, &dq.y2);
    let dcs = if coeffs.eobs[Y2_BLOCK] > 1 {
        inverse_walsh4x4(&y2)
    } else {
        inverse_walsh4x4_dc_only(y2[0])
    };

    for (block, dc) in coeffs.blocks[..16].iter_mut().zip(dcs) {
        block[0] = dc;
    }
    coeffs.blocks[Y2_BLOCK] = [0; BLOCK_COEFFS];
}

/// Inverse-transform the 16 luma blocks of a macroblock and add them to
/// the 16x16 prediction at `dst`.
pub fn reconstruct_luma_block_group(
    coeffs: &mut MacroblockCoeffs,
    dq: &DequantFactors,
    has_second_order: bool,
    dst: &mut PlaneMut<'_>,
) -> Result<(), ReconError> {
    dst.check_block(16, 16)?;

    let factors = if has_second_order {
        apply_second_order(coeffs, dq);
        dq.y1_passthrough_dc()
    } else {
        dq.y1
    };

    for i in 0..16 {
        let mut eob = coeffs.eobs[i];
        // The DC may have arrived from the second-order block.
        if has_second_order && eob == 0 && coeffs.blocks[i][0] != 0 {
            eob = 1;
        }
        let origin = block_origin(dst.origin, dst.stride, i, 4);
        reconstruct_block(&mut coeffs.blocks[i], eob, &factors, dst.data, origin, dst.stride);
    }
    Ok(())
}

/// Reconstruct one 2x2 chroma block grid starting at block `first`.
fn reconstruct_chroma_plane(
    coeffs: &mut MacroblockCoeffs,
    first: usize,
    factors: &[i16; BLOCK_COEFFS],
    dst: &mut PlaneMut<'_>,
) {
    for j in 0..4 {
        let i = first + j;
        let origin = block_origin(dst.origin, dst.stride, j, 2);
        reconstruct_block(
            &mut coeffs.blocks[i],
            coeffs.eobs[i],
            factors,
            dst.data,
            origin,
            dst.stride,
        );
    }
}

/// Inverse-transform the 2x2 U and V block grids and add them to the 8x8
/// predictions at `dst_u` and `dst_v`.
pub fn reconstruct_chroma_block_group(
    coeffs: &mut MacroblockCoeffs,
    dq: &DequantFactors,
    dst_u: &mut PlaneMut<'_>,
    dst_v: &mut PlaneMut<'_>,
) -> Result<(), ReconError> {
    dst_u.check_block(8, 8)?;
    dst_v.check_block(8, 8)?;

    reconstruct_chroma_plane(coeffs, U_BLOCK, &dq.uv, dst_u);
    reconstruct_chroma_plane(coeffs, V_BLOCK, &dq.uv, dst_v);
    Ok(())
}
