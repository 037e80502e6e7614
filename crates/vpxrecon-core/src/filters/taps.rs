//! Sub-pixel filter tap tables.
//!
//! Both filter families are indexed by the eighth-pel phase (0..=7). Every
//! row sums to [`FILTER_WEIGHT`], so a flat input passes through unchanged
//! after the `(sum + FILTER_ROUNDING) >> FILTER_SHIFT` normalization.

/// Sum of the taps of every phase.
pub const FILTER_WEIGHT: i32 = 128;

/// Normalization shift applied after each filter pass.
pub const FILTER_SHIFT: u32 = 7;

/// Rounding offset added before the shift (`FILTER_WEIGHT / 2`).
pub const FILTER_ROUNDING: i32 = FILTER_WEIGHT / 2;

/// Number of selectable phases per axis.
pub const PHASE_COUNT: usize = 8;

/// Taps of the six-tap filter.
pub const SIXTAP_LEN: usize = 6;

/// Taps of the bilinear filter.
pub const BILINEAR_LEN: usize = 2;

/// Six-tap sub-pixel filters. Taps apply to samples at offsets -2..=3.
pub const SUBPEL_FILTERS: [[i32; SIXTAP_LEN]; PHASE_COUNT] = [
    [0, 0, 128, 0, 0, 0],
    [0, -6, 123, 12, -1, 0],
    [2, -11, 108, 36, -8, 1],
    [0, -9, 93, 50, -6, 0],
    [3, -16, 77, 77, -16, 3],
    [0, -6, 50, 93, -9, 0],
    [1, -8, 36, 108, -11, 2],
    [0, -1, 12, 123, -6, 0],
];

/// Bilinear filters. Taps apply to samples at offsets 0 and 1.
pub const BILINEAR_FILTERS: [[i32; BILINEAR_LEN]; PHASE_COUNT] = [
    [128, 0],
    [112, 16],
    [96, 32],
    [80, 48],
    [64, 64],
    [48, 80],
    [32, 96],
    [16, 112],
];

/// Six-tap taps for `phase`, or `None` when the phase is out of range.
pub fn sixtap_taps(phase: usize) -> Option<&'static [i32; SIXTAP_LEN]> {
    SUBPEL_FILTERS.get(phase)
}

/// Bilinear taps for `phase`, or `None` when the phase is out of range.
pub fn bilinear_taps(phase: usize) -> Option<&'static [i32; BILINEAR_LEN]> {
    BILINEAR_FILTERS.get(phase)
}

/// Round and normalize an accumulated filter sum.
#[inline]
pub(crate) fn normalize(sum: i32) -> i32 {
    (sum + FILTER_ROUNDING) >> FILTER_SHIFT
}
