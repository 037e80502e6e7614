//! Device buffer sets for interpolation and edge filtering.

use super::backend::{ArgValue, BufferId, ComputeBackend};
use super::context::GpuError;
use crate::filters::sixtap::SIXTAP_INTERMEDIATE_LEN;
use crate::filters::taps::SIXTAP_LEN;
use crate::models::{EdgeLimits, LoopFilterType};

/// Largest interpolated block, in bytes.
pub const RESULT_LEN: usize = 16 * 16;

/// Byte size rounded up to whole 32-bit words; never zero.
pub fn word_aligned(len: usize) -> usize {
    len.max(1).div_ceil(4) * 4
}

/// Create buffers in order, releasing the ones already created if a later
/// allocation fails.
fn create_all<const N: usize>(
    backend: &mut dyn ComputeBackend,
    specs: [(&str, usize); N],
) -> Result<[BufferId; N], GpuError> {
    let mut ids = [BufferId(0); N];
    for (i, (label, size)) in specs.iter().enumerate() {
        match backend.create_buffer(label, word_aligned(*size)) {
            Ok(id) => ids[i] = id,
            Err(err) => {
                for id in &ids[..i] {
                    backend.release_buffer(*id);
                }
                return Err(err);
            }
        }
    }
    Ok(ids)
}

/// Interpolation buffers sized for a 16x16 block, allocated once and reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InterpBuffers {
    pub intermediate: BufferId,
    pub result: BufferId,
    pub horizontal_taps: BufferId,
    pub vertical_taps: BufferId,
}

impl InterpBuffers {
    pub fn create(backend: &mut dyn ComputeBackend) -> Result<Self, GpuError> {
        let taps = SIXTAP_LEN * std::mem::size_of::<i32>();
        let [intermediate, result, horizontal_taps, vertical_taps] = create_all(
            backend,
            [
                ("interp_intermediate", SIXTAP_INTERMEDIATE_LEN * std::mem::size_of::<i32>()),
                ("interp_result", RESULT_LEN),
                ("interp_htaps", taps),
                ("interp_vtaps", taps),
            ],
        )?;
        Ok(Self {
            intermediate,
            result,
            horizontal_taps,
            vertical_taps,
        })
    }

    pub fn release(self, backend: &mut dyn ComputeBackend) {
        backend.release_buffer(self.intermediate);
        backend.release_buffer(self.result);
        backend.release_buffer(self.horizontal_taps);
        backend.release_buffer(self.vertical_taps);
    }
}

/// Upload taps widened to 32-bit words, padded to the six-tap length.
pub fn write_taps(
    backend: &mut dyn ComputeBackend,
    buffer: BufferId,
    taps: &[i32],
) -> Result<(), GpuError> {
    let mut padded = [0i32; SIXTAP_LEN];
    padded[..taps.len()].copy_from_slice(taps);
    backend.write_buffer(buffer, 0, bytemuck::cast_slice(&padded))
}

/// Host arrays staged for one edge-filter pass.
#[derive(Debug, Clone, Copy)]
pub struct EdgeFilterInputs<'a> {
    pub frame: &'a [u8],
    pub block_offsets: &'a [i32],
    pub pitches: &'a [i32],
    pub limits: &'a [EdgeLimits],
    pub levels: &'a [u32],
}

/// Device copies of an edge-filter pass's inputs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EdgeFilterBuffers {
    pub frame: BufferId,
    pub block_offsets: BufferId,
    pub pitches: BufferId,
    pub limits: BufferId,
    pub levels: BufferId,
    pub frame_len: usize,
}

impl EdgeFilterBuffers {
    pub fn create(
        backend: &mut dyn ComputeBackend,
        inputs: &EdgeFilterInputs<'_>,
    ) -> Result<Self, GpuError> {
        let [frame, block_offsets, pitches, limits, levels] = create_all(
            backend,
            [
                ("edge_frame", inputs.frame.len()),
                ("edge_offsets", std::mem::size_of_val(inputs.block_offsets)),
                ("edge_pitches", std::mem::size_of_val(inputs.pitches)),
                ("edge_limits", std::mem::size_of_val(inputs.limits)),
                ("edge_levels", std::mem::size_of_val(inputs.levels)),
            ],
        )?;
        let buffers = Self {
            frame,
            block_offsets,
            pitches,
            limits,
            levels,
            frame_len: inputs.frame.len(),
        };

        let upload = |backend: &mut dyn ComputeBackend| -> Result<(), GpuError> {
            backend.write_buffer(frame, 0, inputs.frame)?;
            backend.write_buffer(block_offsets, 0, bytemuck::cast_slice(inputs.block_offsets))?;
            backend.write_buffer(pitches, 0, bytemuck::cast_slice(inputs.pitches))?;
            backend.write_buffer(limits, 0, bytemuck::cast_slice(inputs.limits))?;
            backend.write_buffer(levels, 0, bytemuck::cast_slice(inputs.levels))
        };
        if let Err(err) = upload(backend) {
            buffers.release(backend);
            return Err(err);
        }
        Ok(buffers)
    }

    pub fn release(self, backend: &mut dyn ComputeBackend) {
        backend.release_buffer(self.frame);
        backend.release_buffer(self.block_offsets);
        backend.release_buffer(self.pitches);
        backend.release_buffer(self.limits);
        backend.release_buffer(self.levels);
    }
}

/// Positional arguments of every edge-filter kernel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EdgeFilterArgs {
    pub frame: BufferId,
    pub block_offsets: BufferId,
    pub pitches: BufferId,
    pub limits: BufferId,
    pub levels: BufferId,
    pub use_mbflim: bool,
    pub filter_type: LoopFilterType,
    pub cur_iter: i32,
}

impl EdgeFilterArgs {
    pub fn new(
        buffers: &EdgeFilterBuffers,
        use_mbflim: bool,
        filter_type: LoopFilterType,
        cur_iter: i32,
    ) -> Self {
        Self {
            frame: buffers.frame,
            block_offsets: buffers.block_offsets,
            pitches: buffers.pitches,
            limits: buffers.limits,
            levels: buffers.levels,
            use_mbflim,
            filter_type,
            cur_iter,
        }
    }

    pub fn to_args(&self) -> [ArgValue; 8] {
        [
            ArgValue::Buffer(self.frame),
            ArgValue::Buffer(self.block_offsets),
            ArgValue::Buffer(self.pitches),
            ArgValue::Buffer(self.limits),
            ArgValue::Buffer(self.levels),
            ArgValue::Int(self.use_mbflim as i32),
            ArgValue::Int(self.filter_type as i32),
            ArgValue::Int(self.cur_iter),
        ]
    }
}
