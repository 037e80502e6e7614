//! Block reconstruction entry points.
//!
//! [`Reconstructor`] is what a decoder calls: sub-pixel prediction for the
//! four block sizes (GPU with CPU fallback), inverse transform and add for
//! luma and chroma block groups (CPU), and loop-filter edges (GPU only).

mod transform;

use std::sync::Arc;

use tracing::debug;

use crate::dispatch::{DispatchStats, Dispatcher, PredictRequest};
use crate::error::ReconError;
use crate::gpu::{EdgeFilterArgs, EdgeFilterInputs, GpuError, GpuService};
use crate::models::{
    BlockSize, DequantFactors, EdgeKind, EdgeLimits, LoopFilterType, MacroblockCoeffs, Plane,
    PlaneMut, SubpelFilter,
};

pub use transform::{reconstruct_chroma_block_group, reconstruct_luma_block_group};

/// One loop-filter pass over a frame.
///
/// `block_offsets` holds `plane_count * block_count` edge origins (plane
/// major); `limits` and `levels` are per block; `pitches` per plane.
#[derive(Debug, Clone, Copy)]
pub struct EdgeFilterJob<'a> {
    pub block_offsets: &'a [i32],
    pub pitches: &'a [i32],
    pub limits: &'a [EdgeLimits],
    pub levels: &'a [u32],
    pub use_mbflim: bool,
    pub filter_type: LoopFilterType,
    pub cur_iter: i32,
    pub plane_count: usize,
    pub block_count: usize,
    pub max_threads: usize,
}

impl EdgeFilterJob<'_> {
    fn validate(&self) -> Result<(), ReconError> {
        let too_short = |what: &str, len: usize, need: usize| {
            ReconError::InvalidGeometry(format!("{} has {} entries, launch needs {}", what, len, need))
        };
        let offsets = self.plane_count * self.block_count;
        if self.block_offsets.len() < offsets {
            return Err(too_short("block_offsets", self.block_offsets.len(), offsets));
        }
        if self.pitches.len() < self.plane_count {
            return Err(too_short("pitches", self.pitches.len(), self.plane_count));
        }
        if self.limits.len() < self.block_count {
            return Err(too_short("limits", self.limits.len(), self.block_count));
        }
        if self.levels.len() < self.block_count {
            return Err(too_short("levels", self.levels.len(), self.block_count));
        }
        Ok(())
    }
}

/// One block of a batch: the request and where it lands.
#[derive(Debug)]
pub struct PredictJob<'a> {
    pub request: PredictRequest<'a>,
    pub dst: PlaneMut<'a>,
}

macro_rules! predict_fns {
    ($($name:ident => $filter:ident, $size:ident;)*) => {
        $(
            pub fn $name(
                &self,
                src: &Plane<'_>,
                x_phase: usize,
                y_phase: usize,
                dst: &mut PlaneMut<'_>,
            ) -> Result<(), ReconError> {
                self.predict(BlockSize::$size, SubpelFilter::$filter, src, x_phase, y_phase, dst)
            }
        )*
    };
}

pub struct Reconstructor {
    dispatcher: Dispatcher,
}

impl Default for Reconstructor {
    fn default() -> Self {
        Self::global()
    }
}

impl Reconstructor {
    pub fn new(service: Arc<GpuService>) -> Self {
        Self::with_dispatcher(Dispatcher::new(service))
    }

    /// Reconstructor over the process-wide GPU service.
    pub fn global() -> Self {
        Self::with_dispatcher(Dispatcher::global())
    }

    pub fn cpu_only() -> Self {
        Self::with_dispatcher(Dispatcher::cpu_only())
    }

    pub fn with_dispatcher(dispatcher: Dispatcher) -> Self {
        Self { dispatcher }
    }

    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    /// Warm up: open the device and compile every kernel family.
    pub fn prepare(&self) -> Result<(), GpuError> {
        self.dispatcher.prepare()
    }

    pub fn stats(&self) -> DispatchStats {
        self.dispatcher.stats()
    }

    /// Predict a block with the given filter.
    pub fn predict(
        &self,
        size: BlockSize,
        filter: SubpelFilter,
        src: &Plane<'_>,
        x_phase: usize,
        y_phase: usize,
        dst: &mut PlaneMut<'_>,
    ) -> Result<(), ReconError> {
        let request = PredictRequest {
            filter,
            size,
            src: *src,
            x_phase,
            y_phase,
        };
        self.dispatcher.predict(&request, dst)
    }

    predict_fns! {
        sixtap_predict4x4 => SixTap, B4x4;
        sixtap_predict8x4 => SixTap, B8x4;
        sixtap_predict8x8 => SixTap, B8x8;
        sixtap_predict16x16 => SixTap, B16x16;
        bilinear_predict4x4 => Bilinear, B4x4;
        bilinear_predict8x4 => Bilinear, B8x4;
        bilinear_predict8x8 => Bilinear, B8x8;
        bilinear_predict16x16 => Bilinear, B16x16;
    }

    /// Predict independent blocks on the rayon pool. Results are in job
    /// order.
    #[cfg(feature = "multithread")]
    pub fn predict_batch(&self, jobs: &mut [PredictJob<'_>]) -> Vec<Result<(), ReconError>> {
        use rayon::prelude::*;

        jobs.par_iter_mut()
            .map(|job| self.dispatcher.predict(&job.request, &mut job.dst))
            .collect()
    }

    /// Sequential equivalent of the batched path.
    #[cfg(not(feature = "multithread"))]
    pub fn predict_batch(&self, jobs: &mut [PredictJob<'_>]) -> Vec<Result<(), ReconError>> {
        jobs.iter_mut()
            .map(|job| self.dispatcher.predict(&job.request, &mut job.dst))
            .collect()
    }

    pub fn reconstruct_luma_block_group(
        &self,
        coeffs: &mut MacroblockCoeffs,
        dq: &DequantFactors,
        has_second_order: bool,
        dst: &mut PlaneMut<'_>,
    ) -> Result<(), ReconError> {
        reconstruct_luma_block_group(coeffs, dq, has_second_order, dst)
    }

    pub fn reconstruct_chroma_block_group(
        &self,
        coeffs: &mut MacroblockCoeffs,
        dq: &DequantFactors,
        dst_u: &mut PlaneMut<'_>,
        dst_v: &mut PlaneMut<'_>,
    ) -> Result<(), ReconError> {
        reconstruct_chroma_block_group(coeffs, dq, dst_u, dst_v)
    }

    /// Filter one edge kind across `frame` in place on the device.
    ///
    /// There is no software fallback: any device failure is returned, and
    /// the GPU path is marked failed for the rest of the process.
    pub fn run_edge_filter(
        &self,
        kind: EdgeKind,
        frame: &mut [u8],
        job: &EdgeFilterJob<'_>,
    ) -> Result<(), ReconError> {
        job.validate()?;
        let service = self
            .dispatcher
            .service()
            .ok_or(ReconError::EdgeFilter(GpuError::Unavailable))?;

        let buffers = service.create_edge_buffers(&EdgeFilterInputs {
            frame: &*frame,
            block_offsets: job.block_offsets,
            pitches: job.pitches,
            limits: job.limits,
            levels: job.levels,
        })?;
        let args = EdgeFilterArgs::new(&buffers, job.use_mbflim, job.filter_type, job.cur_iter);

        let result = service
            .run_edge_filter(kind, &args, job.plane_count, job.block_count, job.max_threads)
            .and_then(|()| service.read_edge_frame(&buffers, frame));
        service.release_edge_buffers(buffers);

        debug!(?kind, ok = result.is_ok(), "edge filter pass");
        result.map_err(ReconError::from)
    }
}
