//! Dequantization and inverse transforms.
//!
//! Arithmetic mirrors a 16-bit coefficient pipeline: products are formed in
//! `i32` and narrowed back to `i16` wherever the coefficient storage is
//! 16 bits wide, so overflow wraps exactly as it does on the device.

/// `cos(pi/8) * sqrt(2) - 1` in Q16.
const COSPI8_SQRT2_MINUS1: i32 = 20091;
/// `sin(pi/8) * sqrt(2)` in Q16.
const SINPI8_SQRT2: i32 = 35468;

/// Coefficients per 4x4 block.
pub const BLOCK_COEFFS: usize = 16;

#[inline]
fn clamp_pixel(v: i32) -> u8 {
    v.clamp(0, 255) as u8
}

/// Multiply each coefficient by its dequantization factor in place.
pub fn dequantize_block(coeffs: &mut [i16; BLOCK_COEFFS], factors: &[i16; BLOCK_COEFFS]) {
    for (c, &f) in coeffs.iter_mut().zip(factors.iter()) {
        *c = c.wrapping_mul(f);
    }
}

/// Inverse 4x4 DCT of `input`, added to the prediction at `dst[origin..]`.
pub fn idct4x4_add(input: &[i16; BLOCK_COEFFS], dst: &mut [u8], origin: usize, stride: usize) {
    let mut tmp = [0i16; BLOCK_COEFFS];

    for i in 0..4 {
        let ip = |r: usize| input[r * 4 + i] as i32;
        let a1 = ip(0) + ip(2);
        let b1 = ip(0) - ip(2);

        let temp1 = (ip(1) * SINPI8_SQRT2) >> 16;
        let temp2 = ip(3) + ((ip(3) * COSPI8_SQRT2_MINUS1) >> 16);
        let c1 = temp1 - temp2;

        let temp1 = ip(1) + ((ip(1) * COSPI8_SQRT2_MINUS1) >> 16);
        let temp2 = (ip(3) * SINPI8_SQRT2) >> 16;
        let d1 = temp1 + temp2;

        tmp[i] = (a1 + d1) as i16;
        tmp[12 + i] = (a1 - d1) as i16;
        tmp[4 + i] = (b1 + c1) as i16;
        tmp[8 + i] = (b1 - c1) as i16;
    }

    for row in 0..4 {
        let ip = |c: usize| tmp[row * 4 + c] as i32;
        let a1 = ip(0) + ip(2);
        let b1 = ip(0) - ip(2);

        let temp1 = (ip(1) * SINPI8_SQRT2) >> 16;
        let temp2 = ip(3) + ((ip(3) * COSPI8_SQRT2_MINUS1) >> 16);
        let c1 = temp1 - temp2;

        let temp1 = ip(1) + ((ip(1) * COSPI8_SQRT2_MINUS1) >> 16);
        let temp2 = (ip(3) * SINPI8_SQRT2) >> 16;
        let d1 = temp1 + temp2;

        let residual = [
            ((a1 + d1 + 4) >> 3) as i16,
            ((b1 + c1 + 4) >> 3) as i16,
            ((b1 - c1 + 4) >> 3) as i16,
            ((a1 - d1 + 4) >> 3) as i16,
        ];

        let line = origin + row * stride;
        for (col, r) in residual.iter().enumerate() {
            let px = &mut dst[line + col];
            *px = clamp_pixel(*r as i32 + *px as i32);
        }
    }
}

/// Add the DC-only reconstruction `(dc + 4) >> 3` to all 16 pixels.
pub fn dc_only_idct_add(dc: i16, dst: &mut [u8], origin: usize, stride: usize) {
    let a1 = (dc as i32 + 4) >> 3;
    for row in 0..4 {
        let line = origin + row * stride;
        for px in &mut dst[line..line + 4] {
            *px = clamp_pixel(*px as i32 + a1);
        }
    }
}

/// Dequantize, inverse transform and add; clears the consumed block.
pub fn dequant_idct_add(
    coeffs: &mut [i16; BLOCK_COEFFS],
    factors: &[i16; BLOCK_COEFFS],
    dst: &mut [u8],
    origin: usize,
    stride: usize,
) {
    dequantize_block(coeffs, factors);
    idct4x4_add(coeffs, dst, origin, stride);
    *coeffs = [0; BLOCK_COEFFS];
}

/// Inverse Walsh-Hadamard transform of the second-order block.
///
/// Returns the 16 DC values, one per luma block in raster order.
pub fn inverse_walsh4x4(input: &[i16; BLOCK_COEFFS]) -> [i16; BLOCK_COEFFS] {
    let mut tmp = [0i16; BLOCK_COEFFS];

    for i in 0..4 {
        let ip = |r: usize| input[r * 4 + i] as i32;
        let a1 = ip(0) + ip(3);
        let b1 = ip(1) + ip(2);
        let c1 = ip(1) - ip(2);
        let d1 = ip(0) - ip(3);

        tmp[i] = (a1 + b1) as i16;
        tmp[4 + i] = (c1 + d1) as i16;
        tmp[8 + i] = (a1 - b1) as i16;
        tmp[12 + i] = (d1 - c1) as i16;
    }

    let mut out = [0i16; BLOCK_COEFFS];
    for row in 0..4 {
        let ip = |c: usize| tmp[row * 4 + c] as i32;
        let a1 = ip(0) + ip(3);
        let b1 = ip(1) + ip(2);
        let c1 = ip(1) - ip(2);
        let d1 = ip(0) - ip(3);

        let a2 = a1 + b1;
        let b2 = c1 + d1;
        let c2 = a1 - b1;
        let d2 = d1 - c1;

        out[row * 4] = ((a2 + 3) >> 3) as i16;
        out[row * 4 + 1] = ((b2 + 3) >> 3) as i16;
        out[row * 4 + 2] = ((c2 + 3) >> 3) as i16;
        out[row * 4 + 3] = ((d2 + 3) >> 3) as i16;
    }
    out
}

/// Reduced-precision second-order transform when only the DC is set.
pub fn inverse_walsh4x4_dc_only(dc: i16) -> [i16; BLOCK_COEFFS] {
    [((dc as i32 + 3) >> 3) as i16; BLOCK_COEFFS]
}
