//! Per-call choice between the GPU and CPU interpolation paths.
//!
//! The GPU path is tried while the service is not `Failed`. Any GPU error
//! has already torn the device down by the time it reaches the dispatcher,
//! which then reruns the call on the CPU reference kernels. Callers only
//! ever see geometry errors.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tracing::debug;

use crate::error::ReconError;
use crate::filters::taps::PHASE_COUNT;
use crate::filters::{bilinear_predict, sixtap_predict};
use crate::gpu::buffers::RESULT_LEN;
use crate::gpu::pipeline::{interpolate, InterpCall};
use crate::gpu::{GpuError, GpuService, Readiness};
use crate::models::{BlockSize, Plane, PlaneMut, SubpelFilter};

/// One block to predict.
#[derive(Debug, Clone, Copy)]
pub struct PredictRequest<'a> {
    pub filter: SubpelFilter,
    pub size: BlockSize,
    pub src: Plane<'a>,
    pub x_phase: usize,
    pub y_phase: usize,
}

impl PredictRequest<'_> {
    /// Check phases and both block footprints.
    pub fn validate(&self, dst: &PlaneMut<'_>) -> Result<(usize, usize), ReconError> {
        for phase in [self.x_phase, self.y_phase] {
            if phase >= PHASE_COUNT {
                return Err(ReconError::InvalidPhase(phase));
            }
        }
        let (width, height) = (self.size.width(), self.size.height());
        dst.check_block(width, height)?;
        self.src.region(
            width,
            height,
            self.filter.border_before(),
            self.filter.border_after(),
        )
    }
}

/// Strategy that executes a validated request.
pub trait InterpolationBackend: Send + Sync {
    fn name(&self) -> &'static str;

    /// Whether the backend should be tried at all.
    fn is_usable(&self) -> bool;

    fn predict(&self, request: &PredictRequest<'_>, dst: &mut PlaneMut<'_>) -> Result<(), GpuError>;
}

/// The CPU reference kernels. Always usable and never fails.
#[derive(Debug, Clone, Copy, Default)]
pub struct CpuBackend;

impl CpuBackend {
    /// Run a validated request on the reference kernels.
    pub fn run(&self, request: &PredictRequest<'_>, dst: &mut PlaneMut<'_>) {
        let predict = match request.filter {
            SubpelFilter::SixTap => sixtap_predict,
            SubpelFilter::Bilinear => bilinear_predict,
        };
        predict(
            request.src.data,
            request.src.origin,
            request.src.stride,
            request.x_phase,
            request.y_phase,
            dst.data,
            dst.origin,
            dst.stride,
            request.size.width(),
            request.size.height(),
        );
    }
}

impl InterpolationBackend for CpuBackend {
    fn name(&self) -> &'static str {
        "cpu"
    }

    fn is_usable(&self) -> bool {
        true
    }

    fn predict(&self, request: &PredictRequest<'_>, dst: &mut PlaneMut<'_>) -> Result<(), GpuError> {
        self.run(request, dst);
        Ok(())
    }
}

/// Interpolation through the shared [`GpuService`].
#[derive(Clone)]
pub struct GpuBackend {
    service: Arc<GpuService>,
}

impl GpuBackend {
    pub fn new(service: Arc<GpuService>) -> Self {
        Self { service }
    }

    pub fn service(&self) -> &Arc<GpuService> {
        &self.service
    }
}

impl InterpolationBackend for GpuBackend {
    fn name(&self) -> &'static str {
        "gpu"
    }

    fn is_usable(&self) -> bool {
        self.service.readiness() != Readiness::Failed
    }

    fn predict(&self, request: &PredictRequest<'_>, dst: &mut PlaneMut<'_>) -> Result<(), GpuError> {
        let (width, height) = (request.size.width(), request.size.height());
        let (start, len) = request
            .src
            .region(
                width,
                height,
                request.filter.border_before(),
                request.filter.border_after(),
            )
            .map_err(|err| GpuError::Argument(err.to_string()))?;
        let call = InterpCall {
            filter: request.filter,
            region: &request.src.data[start..start + len],
            stride: request.src.stride,
            x_phase: request.x_phase,
            y_phase: request.y_phase,
            width,
            height,
        };

        let mut block = [0u8; RESULT_LEN];
        {
            let mut session = self.service.session();
            session.ensure_ready()?;
            if let Err(err) = interpolate(&mut session, &call, &mut block) {
                session.fail(&err);
                return Err(err);
            }
        }

        for (row, pixels) in block[..width * height].chunks_exact(width).enumerate() {
            let at = dst.origin + row * dst.stride;
            dst.data[at..at + width].copy_from_slice(pixels);
        }
        Ok(())
    }
}

/// Counters for the dispatch side channel.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchStats {
    pub gpu_calls: u64,
    pub cpu_calls: u64,
    /// GPU attempts that were rerun on the CPU.
    pub fallbacks: u64,
    pub binds: u64,
    pub bind_skips: u64,
}

#[derive(Default)]
struct Counters {
    gpu_calls: AtomicU64,
    cpu_calls: AtomicU64,
    fallbacks: AtomicU64,
}

pub struct Dispatcher {
    gpu: Option<GpuBackend>,
    cpu: CpuBackend,
    counters: Counters,
}

impl Dispatcher {
    pub fn new(service: Arc<GpuService>) -> Self {
        Self {
            gpu: Some(GpuBackend::new(service)),
            cpu: CpuBackend,
            counters: Counters::default(),
        }
    }

    /// Dispatcher that never touches a device.
    pub fn cpu_only() -> Self {
        Self {
            gpu: None,
            cpu: CpuBackend,
            counters: Counters::default(),
        }
    }

    /// Dispatcher over the process-wide service.
    pub fn global() -> Self {
        Self::new(GpuService::global())
    }

    pub fn service(&self) -> Option<&Arc<GpuService>> {
        self.gpu.as_ref().map(GpuBackend::service)
    }

    /// Predict one block into `dst`.
    pub fn predict(&self, request: &PredictRequest<'_>, dst: &mut PlaneMut<'_>) -> Result<(), ReconError> {
        request.validate(dst)?;

        if let Some(gpu) = self.gpu.as_ref().filter(|gpu| gpu.is_usable()) {
            match gpu.predict(request, dst) {
                Ok(()) => {
                    self.counters.gpu_calls.fetch_add(1, Ordering::Relaxed);
                    return Ok(());
                }
                Err(err) => {
                    debug!(error = %err, backend = self.cpu.name(), "rerunning block on fallback path");
                    self.counters.fallbacks.fetch_add(1, Ordering::Relaxed);
                }
            }
        }

        self.cpu.run(request, dst);
        self.counters.cpu_calls.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    /// Initialize the device and compile every kernel family now instead
    /// of on first use.
    pub fn prepare(&self) -> Result<(), GpuError> {
        match &self.gpu {
            Some(gpu) => gpu.service().prepare(),
            None => Err(GpuError::Unavailable),
        }
    }

    pub fn stats(&self) -> DispatchStats {
        let binds = self
            .service()
            .map(|service| service.bind_counts())
            .unwrap_or_default();
        DispatchStats {
            gpu_calls: self.counters.gpu_calls.load(Ordering::Relaxed),
            cpu_calls: self.counters.cpu_calls.load(Ordering::Relaxed),
            fallbacks: self.counters.fallbacks.load(Ordering::Relaxed),
            binds: binds.bound,
            bind_skips: binds.skipped,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(src: &[u8], origin: usize, x_phase: usize) -> PredictRequest<'_> {
        PredictRequest {
            filter: SubpelFilter::SixTap,
            size: BlockSize::B4x4,
            src: Plane::new(src, origin, 16),
            x_phase,
            y_phase: 0,
        }
    }

    #[test]
    fn test_phase_out_of_range() {
        let src = vec![0u8; 16 * 16];
        let mut dst = vec![0u8; 16];
        let mut plane = PlaneMut::new(&mut dst, 0, 4);
        let result = Dispatcher::cpu_only().predict(&request(&src, 2 * 16 + 2, 8), &mut plane);
        assert!(matches!(result, Err(ReconError::InvalidPhase(8))));
    }

    #[test]
    fn test_source_too_close_to_edge() {
        let src = vec![0u8; 16 * 16];
        let mut dst = vec![0u8; 16];
        let mut plane = PlaneMut::new(&mut dst, 0, 4);
        let result = Dispatcher::cpu_only().predict(&request(&src, 1, 0), &mut plane);
        assert!(matches!(result, Err(ReconError::SourceOutOfBounds)));
    }

    #[test]
    fn test_destination_too_small() {
        let src = vec![0u8; 16 * 16];
        let mut dst = vec![0u8; 15];
        let mut plane = PlaneMut::new(&mut dst, 0, 4);
        let result = Dispatcher::cpu_only().predict(&request(&src, 2 * 16 + 2, 0), &mut plane);
        assert!(matches!(result, Err(ReconError::DestinationOutOfBounds)));
    }

    #[test]
    fn test_cpu_strategy_matches_dispatcher() {
        let src: Vec<u8> = (0..16 * 16).map(|i| (i * 37 % 251) as u8).collect();
        let req = request(&src, 2 * 16 + 2, 5);

        let mut via_trait = vec![0u8; 16];
        let backend: &dyn InterpolationBackend = &CpuBackend;
        backend
            .predict(&req, &mut PlaneMut::new(&mut via_trait, 0, 4))
            .unwrap();

        let mut via_dispatch = vec![0u8; 16];
        Dispatcher::cpu_only()
            .predict(&req, &mut PlaneMut::new(&mut via_dispatch, 0, 4))
            .unwrap();
        assert_eq!(via_trait, via_dispatch);
        assert!(via_trait.iter().any(|&p| p != 0));
    }

    #[test]
    fn test_cpu_only_counts() {
        let src = vec![9u8; 16 * 16];
        let mut dst = vec![0u8; 16];
        let dispatcher = Dispatcher::cpu_only();
        dispatcher
            .predict(&request(&src, 2 * 16 + 2, 3), &mut PlaneMut::new(&mut dst, 0, 4))
            .unwrap();
        assert!(dst.iter().all(|&p| p == 9));
        let stats = dispatcher.stats();
        assert_eq!(stats.cpu_calls, 1);
        assert_eq!(stats.gpu_calls + stats.fallbacks + stats.binds, 0);
        assert!(matches!(dispatcher.prepare(), Err(GpuError::Unavailable)));
    }
}
