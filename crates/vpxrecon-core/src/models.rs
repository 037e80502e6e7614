//! Data models for block reconstruction
//!
//! Block geometry, plane views, coefficient storage and loop-filter
//! descriptors shared by the CPU kernels and the GPU path.

use bytemuck::{Pod, Zeroable};
use serde::{Deserialize, Serialize};

use crate::error::ReconError;

/// Supported prediction block sizes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BlockSize {
    B4x4,
    B8x4,
    B8x8,
    B16x16,
}

impl BlockSize {
    pub const ALL: [BlockSize; 4] = [
        BlockSize::B4x4,
        BlockSize::B8x4,
        BlockSize::B8x8,
        BlockSize::B16x16,
    ];

    pub fn width(self) -> usize {
        match self {
            BlockSize::B4x4 => 4,
            BlockSize::B8x4 | BlockSize::B8x8 => 8,
            BlockSize::B16x16 => 16,
        }
    }

    pub fn height(self) -> usize {
        match self {
            BlockSize::B4x4 | BlockSize::B8x4 => 4,
            BlockSize::B8x8 => 8,
            BlockSize::B16x16 => 16,
        }
    }
}

/// Sub-pixel interpolation filter family
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SubpelFilter {
    SixTap,
    Bilinear,
}

impl SubpelFilter {
    /// Source rows/columns needed before the block.
    pub fn border_before(self) -> usize {
        match self {
            SubpelFilter::SixTap => 2,
            SubpelFilter::Bilinear => 0,
        }
    }

    /// Source rows/columns needed after the block.
    pub fn border_after(self) -> usize {
        match self {
            SubpelFilter::SixTap => 3,
            SubpelFilter::Bilinear => 1,
        }
    }
}

/// Read-only view of a strided 8-bit plane.
///
/// `origin` indexes the block's top-left pixel inside `data`.
#[derive(Debug, Clone, Copy)]
pub struct Plane<'a> {
    pub data: &'a [u8],
    pub origin: usize,
    pub stride: usize,
}

impl<'a> Plane<'a> {
    pub fn new(data: &'a [u8], origin: usize, stride: usize) -> Self {
        Self {
            data,
            origin,
            stride,
        }
    }

    /// Index of the first byte of an extended region `before` pixels up and
    /// left of the origin, with its last byte `after` pixels past a
    /// `width x height` block.
    ///
    /// Returns `(start, len)` or an error when the region leaves the slice.
    pub fn region(
        &self,
        width: usize,
        height: usize,
        before: usize,
        after: usize,
    ) -> Result<(usize, usize), ReconError> {
        let back = before * self.stride + before;
        let start = self
            .origin
            .checked_sub(back)
            .ok_or(ReconError::SourceOutOfBounds)?;
        // Last byte read: row (height - 1 + after), column (width - 1 + after).
        let last = self.origin + (height - 1 + after) * self.stride + (width - 1 + after);
        if last >= self.data.len() {
            return Err(ReconError::SourceOutOfBounds);
        }
        Ok((start, last + 1 - start))
    }
}

/// Mutable view of a strided 8-bit plane.
#[derive(Debug)]
pub struct PlaneMut<'a> {
    pub data: &'a mut [u8],
    pub origin: usize,
    pub stride: usize,
}

impl<'a> PlaneMut<'a> {
    pub fn new(data: &'a mut [u8], origin: usize, stride: usize) -> Self {
        Self {
            data,
            origin,
            stride,
        }
    }

    /// Check that a `width x height` block fits at the origin.
    pub fn check_block(&self, width: usize, height: usize) -> Result<(), ReconError> {
        if height == 0 || width == 0 {
            return Ok(());
        }
        if width > self.stride && height > 1 {
            return Err(ReconError::InvalidGeometry(format!(
                "destination stride {} narrower than block width {}",
                self.stride, width
            )));
        }
        let last = self.origin + (height - 1) * self.stride + width - 1;
        if last >= self.data.len() {
            return Err(ReconError::DestinationOutOfBounds);
        }
        Ok(())
    }

    /// Reborrow as a view with a different origin.
    pub fn at(&mut self, origin: usize) -> PlaneMut<'_> {
        PlaneMut {
            data: &mut *self.data,
            origin,
            stride: self.stride,
        }
    }
}

/// Number of 4x4 blocks per macroblock, second-order block included.
pub const MACROBLOCK_BLOCKS: usize = 25;
/// Index of the second-order block.
pub const Y2_BLOCK: usize = 24;
/// First U block.
pub const U_BLOCK: usize = 16;
/// First V block.
pub const V_BLOCK: usize = 20;

/// Quantized coefficients of one macroblock.
///
/// Blocks 0-15 are luma in raster order, 16-19 U, 20-23 V and 24 the
/// second-order block. `eobs[i]` counts the coefficients of block `i` up to
/// and including the last non-zero one in scan order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MacroblockCoeffs {
    pub blocks: [[i16; 16]; MACROBLOCK_BLOCKS],
    pub eobs: [u8; MACROBLOCK_BLOCKS],
}

impl Default for MacroblockCoeffs {
    fn default() -> Self {
        Self {
            blocks: [[0; 16]; MACROBLOCK_BLOCKS],
            eobs: [0; MACROBLOCK_BLOCKS],
        }
    }
}

impl MacroblockCoeffs {
    pub fn is_cleared(&self) -> bool {
        self.blocks.iter().all(|b| b.iter().all(|&c| c == 0))
    }
}

/// Dequantization factors for one macroblock.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DequantFactors {
    /// Luma blocks
    pub y1: [i16; 16],
    /// Second-order block
    pub y2: [i16; 16],
    /// Chroma blocks
    pub uv: [i16; 16],
}

impl DequantFactors {
    /// Factors with one DC and one AC step per table.
    pub fn from_steps(y1: (i16, i16), y2: (i16, i16), uv: (i16, i16)) -> Self {
        fn table((dc, ac): (i16, i16)) -> [i16; 16] {
            let mut t = [ac; 16];
            t[0] = dc;
            t
        }
        Self {
            y1: table(y1),
            y2: table(y2),
            uv: table(uv),
        }
    }

    /// Luma table with the DC factor forced to 1, used when the DC values
    /// come from the second-order transform already dequantized.
    pub fn y1_passthrough_dc(&self) -> [i16; 16] {
        let mut t = self.y1;
        t[0] = 1;
        t
    }
}

/// The six loop-filter edge kernels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EdgeKind {
    LoopFilterHorizontal,
    LoopFilterVertical,
    MbLoopFilterHorizontal,
    MbLoopFilterVertical,
    SimpleHorizontal,
    SimpleVertical,
}

impl EdgeKind {
    pub const ALL: [EdgeKind; 6] = [
        EdgeKind::LoopFilterHorizontal,
        EdgeKind::LoopFilterVertical,
        EdgeKind::MbLoopFilterHorizontal,
        EdgeKind::MbLoopFilterVertical,
        EdgeKind::SimpleHorizontal,
        EdgeKind::SimpleVertical,
    ];

    /// Horizontal edges are filtered down columns.
    pub fn is_horizontal(self) -> bool {
        matches!(
            self,
            EdgeKind::LoopFilterHorizontal
                | EdgeKind::MbLoopFilterHorizontal
                | EdgeKind::SimpleHorizontal
        )
    }
}

/// Loop-filter type of the frame
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[repr(i32)]
pub enum LoopFilterType {
    #[default]
    Normal = 0,
    Simple = 1,
}

/// Per-block thresholds, laid out for direct upload.
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Pod, Zeroable)]
pub struct EdgeLimits {
    pub mblim: u32,
    pub blim: u32,
    pub lim: u32,
    pub hev_thresh: u32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_block_dimensions() {
        let dims: Vec<_> = BlockSize::ALL.iter().map(|b| (b.width(), b.height())).collect();
        assert_eq!(dims, vec![(4, 4), (8, 4), (8, 8), (16, 16)]);
    }

    #[test]
    fn test_sixtap_region_needs_borders() {
        let data = vec![0u8; 32 * 32];
        let plane = Plane::new(&data, 2 * 32 + 2, 32);
        let (start, len) = plane.region(16, 16, 2, 3).unwrap();
        assert_eq!(start, 0);
        assert_eq!(len, 20 * 32 + 21);

        let tight = Plane::new(&data, 32 + 2, 32);
        assert!(matches!(
            tight.region(16, 16, 2, 3),
            Err(ReconError::SourceOutOfBounds)
        ));

        let bottom = Plane::new(&data, 28 * 32 + 2, 32);
        assert!(bottom.region(4, 4, 2, 3).is_err());
    }

    #[test]
    fn test_destination_bounds() {
        let mut data = vec![0u8; 8 * 8];
        let dst = PlaneMut::new(&mut data, 4 * 8 + 4, 8);
        assert!(dst.check_block(4, 4).is_ok());
        assert!(matches!(
            dst.check_block(8, 8),
            Err(ReconError::DestinationOutOfBounds)
        ));
    }

    #[test]
    fn test_passthrough_dc_table() {
        let dq = DequantFactors::from_steps((10, 20), (30, 40), (5, 6));
        let t = dq.y1_passthrough_dc();
        assert_eq!(t[0], 1);
        assert_eq!(t[1], 20);
        assert_eq!(dq.y2[0], 30);
    }

    #[test]
    fn test_edge_limits_layout() {
        assert_eq!(std::mem::size_of::<EdgeLimits>(), 16);
        let l = EdgeLimits {
            mblim: 1,
            blim: 2,
            lim: 3,
            hev_thresh: 4,
        };
        let words: &[u32] = bytemuck::cast_slice(std::slice::from_ref(&l));
        assert_eq!(words, &[1, 2, 3, 4]);
    }
}
