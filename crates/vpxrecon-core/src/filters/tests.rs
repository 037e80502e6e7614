//! Tests for the CPU reference kernels

use super::*;
use crate::models::{EdgeKind, EdgeLimits, LoopFilterType};

const STRIDE: usize = 32;

fn gradient_frame(rows: usize) -> Vec<u8> {
    (0..rows * STRIDE)
        .map(|i| ((i % STRIDE) * 7 + (i / STRIDE) * 3) as u8)
        .collect()
}

#[test]
fn test_sixtap_flat_input_is_preserved_for_every_phase() {
    let src = vec![100u8; 32 * STRIDE];
    for x in 0..8 {
        for y in 0..8 {
            let mut dst = vec![0u8; 16 * 16];
            sixtap_predict(&src, 2 * STRIDE + 2, STRIDE, x, y, &mut dst, 0, 16, 16, 16);
            assert!(dst.iter().all(|&p| p == 100), "phase ({}, {})", x, y);
        }
    }
}

#[test]
fn test_bilinear_flat_input_is_preserved_for_every_phase() {
    let src = vec![37u8; 32 * STRIDE];
    for x in 0..8 {
        for y in 0..8 {
            let mut dst = vec![0u8; 16 * 16];
            bilinear_predict(&src, 0, STRIDE, x, y, &mut dst, 0, 16, 16, 16);
            assert!(dst.iter().all(|&p| p == 37), "phase ({}, {})", x, y);
        }
    }
}

#[test]
fn test_zero_phase_copies_block() {
    let src = gradient_frame(24);
    let origin = 2 * STRIDE + 2;

    let mut six = vec![0u8; 16 * 16];
    sixtap_predict(&src, origin, STRIDE, 0, 0, &mut six, 0, 16, 16, 16);
    let mut bil = vec![0u8; 16 * 16];
    bilinear_predict(&src, origin, STRIDE, 0, 0, &mut bil, 0, 16, 16, 16);

    for r in 0..16 {
        for c in 0..16 {
            let expected = src[origin + r * STRIDE + c];
            assert_eq!(six[r * 16 + c], expected);
            assert_eq!(bil[r * 16 + c], expected);
        }
    }
}

#[test]
fn test_bilinear_half_pel_averages_neighbours() {
    let src = gradient_frame(8);
    let mut dst = vec![0u8; 4 * 4];
    bilinear_predict(&src, 0, STRIDE, 4, 0, &mut dst, 0, 4, 4, 4);

    for r in 0..4 {
        for c in 0..4 {
            let a = src[r * STRIDE + c] as u32;
            let b = src[r * STRIDE + c + 1] as u32;
            assert_eq!(dst[r * 4 + c] as u32, (a + b + 1) / 2);
        }
    }
}

#[test]
fn test_sixtap_first_pass_clamps_overshoot() {
    // A narrow peak rings past 255 with the half-pel taps.
    let src = [0u8, 0, 255, 255, 0, 0];
    let mut out = [0i32; 1];
    sixtap_first_pass(&src, &mut out, 6, 1, 1, 1, &SUBPEL_FILTERS[4]);
    assert_eq!(out[0], 255);

    let src = [255u8, 255, 0, 0, 255, 255];
    sixtap_first_pass(&src, &mut out, 6, 1, 1, 1, &SUBPEL_FILTERS[4]);
    assert_eq!(out[0], 0);
}

#[test]
fn test_prediction_respects_destination_pitch() {
    let src = gradient_frame(24);
    let mut dst = vec![0xAAu8; 8 * 20];
    sixtap_predict(&src, 2 * STRIDE + 2, STRIDE, 3, 5, &mut dst, 1, 20, 8, 4);

    for r in 0..4 {
        assert_eq!(dst[r * 20], 0xAA, "byte before the block in row {}", r);
        assert_eq!(dst[r * 20 + 9], 0xAA, "byte after the block in row {}", r);
    }
    assert!(dst[4 * 20..].iter().all(|&p| p == 0xAA));
}

#[test]
fn test_dc_only_add_is_uniform_and_clamped() {
    let mut dst = vec![10u8; 4 * 8];
    dst[1] = 250;
    dc_only_idct_add(100, &mut dst, 0, 8);

    // (100 + 4) >> 3 == 13
    assert_eq!(dst[0], 23);
    assert_eq!(dst[1], 255);
    assert_eq!(dst[8 * 3 + 3], 23);
    assert_eq!(dst[4], 10, "column outside the block untouched");

    let mut dst = vec![5u8; 16];
    dc_only_idct_add(-100, &mut dst, 0, 4);
    assert!(dst.iter().all(|&p| p == 0));
}

#[test]
fn test_full_idct_with_dc_matches_dc_only() {
    for dc in [-2048i16, -17, 0, 1, 9, 300, 2047] {
        let mut input = [0i16; BLOCK_COEFFS];
        input[0] = dc;

        let mut full = vec![128u8; 16];
        idct4x4_add(&input, &mut full, 0, 4);
        let mut shortcut = vec![128u8; 16];
        dc_only_idct_add(dc, &mut shortcut, 0, 4);

        assert_eq!(full, shortcut, "dc {}", dc);
    }
}

#[test]
fn test_idct_ac_coefficient_varies_across_row() {
    let mut input = [0i16; BLOCK_COEFFS];
    input[1] = 64;
    let mut dst = vec![128u8; 16];
    idct4x4_add(&input, &mut dst, 0, 4);

    // A horizontal AC term is constant down columns and decreasing across.
    for c in 0..4 {
        assert_eq!(dst[c], dst[12 + c]);
    }
    assert!(dst[0] > dst[3]);
}

#[test]
fn test_dequant_idct_add_clears_coefficients() {
    let mut coeffs = [0i16; BLOCK_COEFFS];
    coeffs[0] = 3;
    coeffs[5] = -2;
    let factors = [4i16; BLOCK_COEFFS];
    let mut dst = vec![100u8; 16];

    dequant_idct_add(&mut coeffs, &factors, &mut dst, 0, 4);
    assert_eq!(coeffs, [0i16; BLOCK_COEFFS]);
    assert!(dst.iter().any(|&p| p != 100));
}

#[test]
fn test_dequantize_block_multiplies_elementwise() {
    let mut coeffs = [1i16; BLOCK_COEFFS];
    coeffs[3] = -7;
    let mut factors = [2i16; BLOCK_COEFFS];
    factors[0] = 9;
    dequantize_block(&mut coeffs, &factors);
    assert_eq!(coeffs[0], 9);
    assert_eq!(coeffs[1], 2);
    assert_eq!(coeffs[3], -14);
}

#[test]
fn test_walsh_dc_only_matches_full_transform() {
    for dc in [-1000i16, -3, 0, 5, 77, 1023] {
        let mut input = [0i16; BLOCK_COEFFS];
        input[0] = dc;
        assert_eq!(inverse_walsh4x4(&input), inverse_walsh4x4_dc_only(dc));
    }
}

#[test]
fn test_walsh_spreads_first_row_terms() {
    let mut input = [0i16; BLOCK_COEFFS];
    input[0] = 80;
    input[1] = 16;
    let out = inverse_walsh4x4(&input);

    // Horizontal term adds to the left half and subtracts on the right half.
    assert_eq!(out[0], (80 + 16 + 3) >> 3);
    assert_eq!(out[3], (80 - 16 + 3) >> 3);
    assert_eq!(out[0], out[12]);
}

#[test]
fn test_simple_filter_smooths_small_step() {
    let mut line = [100u8, 100, 100, 100, 110, 110, 110, 110];
    simple_loop_filter_line(&mut line, 4, 1, 40);
    assert_eq!(&line[..], &[100, 100, 100, 102, 107, 110, 110, 110]);
}

#[test]
fn test_simple_filter_keeps_strong_edge() {
    let mut line = [20u8, 20, 20, 20, 200, 200, 200, 200];
    let before = line;
    simple_loop_filter_line(&mut line, 4, 1, 40);
    assert_eq!(line, before);
}

#[test]
fn test_simple_filter_limit_is_inclusive_and_needs_two_lines() {
    // |p0 - q0| * 2 + |p1 - q1| / 2 = 25, with only two pixels before the edge.
    let mut line = [100u8, 100, 110, 110];
    simple_loop_filter_line(&mut line, 2, 1, 24);
    assert_eq!(line, [100, 100, 110, 110]);

    simple_loop_filter_line(&mut line, 2, 1, 25);
    assert_eq!(line, [100, 102, 107, 110]);
}

#[test]
fn test_inner_filter_mask_rejects_texture() {
    // Interior differences above the limit disable the filter.
    let mut line = [0u8, 40, 0, 100, 110, 160, 110, 160];
    let before = line;
    loop_filter_line(&mut line, 4, 1, 60, 10, 4);
    assert_eq!(line, before);
}

#[test]
fn test_mb_filter_touches_three_pixels_each_side() {
    let mut line = [100u8, 100, 100, 100, 112, 112, 112, 112];
    mb_loop_filter_line(&mut line, 4, 1, 60, 20, 40);

    assert_eq!(line[0], 100);
    assert_eq!(line[7], 112);
    assert!(line[1] > 100 && line[6] < 112);
    assert!(line[3] <= line[4], "filter must not invert the edge");
}

#[test]
fn test_horizontal_edge_uses_pitch_as_step() {
    let pitch = 4usize;
    let mut column = vec![0u8; 8 * pitch];
    for r in 0..8 {
        column[r * pitch] = if r < 4 { 100 } else { 110 };
    }
    simple_loop_filter_line(&mut column, 4 * pitch, pitch, 40);
    assert_eq!(column[3 * pitch], 102);
    assert_eq!(column[4 * pitch], 107);
    assert_eq!(column[3 * pitch + 1], 0);
}

fn step_frame(pitch: usize, rows: usize, edge_row: usize) -> Vec<u8> {
    (0..pitch * rows)
        .map(|i| if i / pitch < edge_row { 90 } else { 100 })
        .collect()
}

#[test]
fn test_filter_edges_horizontal_luma_edge() {
    let pitch = 24;
    let mut frame = step_frame(pitch, 12, 8);
    let limits = [EdgeLimits {
        mblim: 60,
        blim: 40,
        lim: 20,
        hev_thresh: 40,
    }];

    filter_edges(EdgeLaunch {
        kind: EdgeKind::MbLoopFilterHorizontal,
        frame: &mut frame,
        block_offsets: &[(8 * pitch + 4) as i32],
        pitches: &[pitch as i32],
        limits: &limits,
        levels: &[10],
        use_mbflim: true,
        filter_type: LoopFilterType::Normal,
        cur_iter: 0,
        plane_count: 1,
        block_count: 1,
        max_threads: 16,
    });

    for c in 4..20 {
        assert!(frame[7 * pitch + c] > 90, "column {} filtered", c);
        assert!(frame[8 * pitch + c] < 100, "column {} filtered", c);
    }
    assert_eq!(frame[7 * pitch + 3], 90);
    assert_eq!(frame[7 * pitch + 20], 90);
}

#[test]
fn test_filter_edges_skips_zero_level_and_simple_chroma() {
    let pitch = 24;
    let original = step_frame(pitch, 24, 8);
    let limits = [EdgeLimits {
        mblim: 60,
        blim: 60,
        lim: 20,
        hev_thresh: 40,
    }; 2];

    let mut frame = original.clone();
    filter_edges(EdgeLaunch {
        kind: EdgeKind::SimpleHorizontal,
        frame: &mut frame,
        block_offsets: &[(8 * pitch) as i32],
        pitches: &[pitch as i32],
        limits: &limits[..1],
        levels: &[0],
        use_mbflim: false,
        filter_type: LoopFilterType::Simple,
        cur_iter: 0,
        plane_count: 1,
        block_count: 1,
        max_threads: 16,
    });
    assert_eq!(frame, original, "level zero is a no-op");

    // Plane 1 would filter row 8 too, but the simple filter is luma-only.
    let mut frame = original.clone();
    filter_edges(EdgeLaunch {
        kind: EdgeKind::SimpleHorizontal,
        frame: &mut frame,
        block_offsets: &[(20 * pitch) as i32, (8 * pitch) as i32],
        pitches: &[pitch as i32, pitch as i32],
        limits: &limits[..1],
        levels: &[5],
        use_mbflim: false,
        filter_type: LoopFilterType::Simple,
        cur_iter: 0,
        plane_count: 2,
        block_count: 1,
        max_threads: 16,
    });
    assert_eq!(frame, original);
}

#[test]
fn test_filter_edges_cur_iter_moves_across_edge() {
    let pitch = 16;
    let mut frame: Vec<u8> = (0..pitch * 8)
        .map(|i| if i % pitch < 8 { 90 } else { 100 })
        .collect();
    let limits = [EdgeLimits {
        mblim: 60,
        blim: 60,
        lim: 20,
        hev_thresh: 40,
    }];

    filter_edges(EdgeLaunch {
        kind: EdgeKind::LoopFilterVertical,
        frame: &mut frame,
        block_offsets: &[4, 4],
        pitches: &[pitch as i32, pitch as i32],
        limits: &limits,
        levels: &[3],
        use_mbflim: false,
        filter_type: LoopFilterType::Normal,
        cur_iter: 1,
        plane_count: 2,
        block_count: 1,
        max_threads: 8,
    });

    // Edge sits at column 4 + 4 = 8; chroma plane covers the same 8 rows.
    assert!(frame[7] > 90);
    assert!(frame[8] < 100);
    assert_eq!(frame[3], 90);
}
