//! Two-pass sub-pixel interpolation on the device.

use crate::filters::sixtap::{SIXTAP_EXTRA_ROWS, SIXTAP_ROWS_BEFORE};
use crate::filters::taps::{bilinear_taps, sixtap_taps};
use crate::gpu::backend::{ArgValue, LaunchGeometry};
use crate::gpu::buffers::{write_taps, RESULT_LEN};
use crate::gpu::context::GpuError;
use crate::gpu::programs::KernelName;
use crate::gpu::service::GpuSession;
use crate::models::SubpelFilter;

/// One interpolation request.
///
/// `region` starts at the first byte the horizontal pass reads (two rows
/// and columns before the block for six-tap, the block origin for
/// bilinear) and has row pitch `stride`.
#[derive(Debug, Clone, Copy)]
pub struct InterpCall<'a> {
    pub filter: SubpelFilter,
    pub region: &'a [u8],
    pub stride: usize,
    pub x_phase: usize,
    pub y_phase: usize,
    pub width: usize,
    pub height: usize,
}

impl InterpCall<'_> {
    fn kernels(&self) -> (KernelName, KernelName) {
        match self.filter {
            SubpelFilter::SixTap => (KernelName::SixtapFirstPass, KernelName::SixtapSecondPass),
            SubpelFilter::Bilinear => {
                (KernelName::BilinearFirstPass, KernelName::BilinearSecondPass)
            }
        }
    }

    /// Rows produced by the horizontal pass.
    fn first_pass_rows(&self) -> usize {
        match self.filter {
            SubpelFilter::SixTap => self.height + SIXTAP_EXTRA_ROWS,
            SubpelFilter::Bilinear => self.height + 1,
        }
    }

    /// Intermediate index of the first row the vertical pass centres on.
    fn second_pass_offset(&self) -> usize {
        match self.filter {
            SubpelFilter::SixTap => SIXTAP_ROWS_BEFORE * self.width,
            SubpelFilter::Bilinear => 0,
        }
    }

    fn taps(&self, phase: usize) -> Result<&'static [i32], GpuError> {
        let taps: Option<&'static [i32]> = match self.filter {
            SubpelFilter::SixTap => sixtap_taps(phase).map(|t| &t[..]),
            SubpelFilter::Bilinear => bilinear_taps(phase).map(|t| &t[..]),
        };
        taps.ok_or_else(|| GpuError::Argument(format!("phase {} out of range", phase)))
    }
}

/// Run both passes and read the block back into `out` (dense,
/// `width * height` bytes).
///
/// The per-call source buffer is always released; on error the queue is
/// drained first so nothing in flight still references it.
pub fn interpolate(
    session: &mut GpuSession<'_>,
    call: &InterpCall<'_>,
    out: &mut [u8],
) -> Result<(), GpuError> {
    let pixels = call.width * call.height;
    if pixels > RESULT_LEN || out.len() < pixels {
        return Err(GpuError::Argument(format!(
            "{}x{} block does not fit the result buffer",
            call.width, call.height
        )));
    }

    let (first, second) = call.kernels();
    session.kernel(first)?;
    session.kernel(second)?;
    let buffers = session.interp_buffers()?;

    let src = session.create_buffer("interp_src", call.region.len())?;
    let result = (|| -> Result<(), GpuError> {
        session.write_buffer(src, call.region)?;
        let backend = session.backend()?;
        write_taps(backend, buffers.horizontal_taps, call.taps(call.x_phase)?)?;
        write_taps(backend, buffers.vertical_taps, call.taps(call.y_phase)?)?;

        let rows = call.first_pass_rows();
        session.bind(
            first,
            &[
                ArgValue::Buffer(src),
                ArgValue::Buffer(buffers.intermediate),
                ArgValue::Uint(call.stride as u32),
                ArgValue::Uint(1),
                ArgValue::Uint(rows as u32),
                ArgValue::Uint(call.width as u32),
                ArgValue::Buffer(buffers.horizontal_taps),
            ],
        )?;
        session.enqueue(first, LaunchGeometry::linear((call.width * rows) as u32))?;

        let width = call.width as u32;
        session.bind(
            second,
            &[
                ArgValue::Buffer(buffers.intermediate),
                ArgValue::Int(call.second_pass_offset() as i32),
                ArgValue::Buffer(buffers.result),
                ArgValue::Int(width as i32),
                ArgValue::Uint(width),
                ArgValue::Uint(width),
                ArgValue::Uint(call.height as u32),
                ArgValue::Uint(width),
                ArgValue::Buffer(buffers.vertical_taps),
            ],
        )?;
        session.enqueue(second, LaunchGeometry::linear(pixels as u32))?;

        session.read_buffer(buffers.result, &mut out[..pixels])
    })();

    if result.is_err() {
        session.drain();
    }
    session.release_buffer(src);
    result
}
