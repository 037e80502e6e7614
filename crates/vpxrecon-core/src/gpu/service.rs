//! The process-wide GPU service.
//!
//! One mutex guards the readiness flag, the backend, compiled programs,
//! kernel slots with their argument shadows, and the persistent buffers.
//! Every multi-step device interaction runs inside a single `GpuSession`
//! (the held lock), so first use is single-flight and slots are only ever
//! observed fully built.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, OnceLock};

use parking_lot::{Mutex, MutexGuard};
use tracing::{debug, error, info, warn};

use super::args::{self, ArgShadow, BindCount};
use super::backend::{ArgValue, BufferId, ComputeBackend, KernelId, LaunchGeometry, ProgramId};
use super::buffers::{EdgeFilterArgs, EdgeFilterBuffers, EdgeFilterInputs, InterpBuffers};
use super::context::{DevicePreferences, DeviceSummary, GpuError, Readiness};
use super::programs::{KernelFamily, KernelName, SourceLocator};
use crate::config::{self, ReconConfig};
use crate::models::EdgeKind;

/// Creates a fresh, unopened backend for each initialization attempt.
pub type BackendFactory =
    Box<dyn Fn() -> Result<Box<dyn ComputeBackend>, GpuError> + Send + Sync + 'static>;

/// Settings the service needs from the runtime config.
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    pub enabled: bool,
    pub kernel_dir: PathBuf,
    pub prefs: DevicePreferences,
}

impl From<&ReconConfig> for ServiceConfig {
    fn from(config: &ReconConfig) -> Self {
        Self {
            enabled: config.use_gpu,
            kernel_dir: config.kernel_dir.clone(),
            prefs: DevicePreferences {
                power: config.power_preference,
                allow_software: config.allow_software_adapter,
            },
        }
    }
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self::from(&ReconConfig::default())
    }
}

struct KernelSlot {
    kernel: KernelId,
    shadow: ArgShadow,
}

#[derive(Default)]
struct ServiceState {
    readiness: Readiness,
    backend: Option<Box<dyn ComputeBackend>>,
    device: Option<DeviceSummary>,
    programs: HashMap<KernelFamily, ProgramId>,
    slots: HashMap<KernelName, KernelSlot>,
    interp: Option<InterpBuffers>,
    binds: BindCount,
    init_attempts: u64,
}

pub struct GpuService {
    config: ServiceConfig,
    locator: SourceLocator,
    factory: BackendFactory,
    state: Mutex<ServiceState>,
}

static GLOBAL_SERVICE: OnceLock<Arc<GpuService>> = OnceLock::new();

fn default_factory() -> BackendFactory {
    #[cfg(feature = "gpu")]
    {
        Box::new(|| Ok(Box::new(super::wgpu_backend::WgpuBackend::new()) as Box<dyn ComputeBackend>))
    }
    #[cfg(not(feature = "gpu"))]
    {
        Box::new(|| Err(GpuError::Unavailable))
    }
}

impl GpuService {
    pub fn new(config: ServiceConfig, factory: BackendFactory) -> Self {
        let locator = SourceLocator::new(config.kernel_dir.clone());
        Self {
            config,
            locator,
            factory,
            state: Mutex::new(ServiceState::default()),
        }
    }

    /// The lazily created process-wide service, configured from
    /// [`config::recon_config_handle`].
    pub fn global() -> Arc<GpuService> {
        GLOBAL_SERVICE
            .get_or_init(|| {
                config::log_config_usage();
                let config = ServiceConfig::from(&config::recon_config_handle().config);
                Arc::new(GpuService::new(config, default_factory()))
            })
            .clone()
    }

    pub fn config(&self) -> &ServiceConfig {
        &self.config
    }

    /// Enter the service's lock.
    pub fn session(&self) -> GpuSession<'_> {
        GpuSession {
            service: self,
            state: self.state.lock(),
        }
    }

    pub fn readiness(&self) -> Readiness {
        self.state.lock().readiness
    }

    /// Initialize on first use. Never touches the backend once failed.
    pub fn acquire(&self) -> Readiness {
        self.session().acquire()
    }

    pub fn device(&self) -> Option<DeviceSummary> {
        self.state.lock().device.clone()
    }

    /// Cumulative argument binds and skips across all slots.
    pub fn bind_counts(&self) -> BindCount {
        self.state.lock().binds
    }

    /// Number of times a backend was created and opened.
    pub fn init_attempts(&self) -> u64 {
        self.state.lock().init_attempts
    }

    /// Compile every kernel family up front.
    pub fn prepare(&self) -> Result<(), GpuError> {
        let mut session = self.session();
        for family in KernelFamily::ALL {
            session.ensure_family(family)?;
        }
        Ok(())
    }

    /// Drain the queue and free the context. Ready returns to
    /// Uninitialized; a failed service stays failed.
    pub fn release(&self) {
        let mut session = self.session();
        if session.state.readiness == Readiness::Ready {
            session.teardown();
            session.state.readiness = Readiness::Uninitialized;
            info!("released GPU context");
        }
    }

    /// Tear down and clear a sticky failure.
    pub fn reset(&self) {
        let mut session = self.session();
        session.teardown();
        session.state.readiness = Readiness::Uninitialized;
        debug!("GPU service reset");
    }

    /// Stage the inputs of an edge-filter pass on the device.
    pub fn create_edge_buffers(
        &self,
        inputs: &EdgeFilterInputs<'_>,
    ) -> Result<EdgeFilterBuffers, GpuError> {
        let mut session = self.session();
        session.ensure_ready()?;
        let result = match session.backend() {
            Ok(backend) => EdgeFilterBuffers::create(backend, inputs),
            Err(err) => Err(err),
        };
        result.inspect_err(|err| session.fail(err))
    }

    /// Read the filtered frame back.
    pub fn read_edge_frame(
        &self,
        buffers: &EdgeFilterBuffers,
        frame: &mut [u8],
    ) -> Result<(), GpuError> {
        let mut session = self.session();
        session.ensure_ready()?;
        let len = buffers.frame_len.min(frame.len());
        let result = session.read_buffer(buffers.frame, &mut frame[..len]);
        result.inspect_err(|err| session.fail(err))
    }

    /// Free an edge-filter buffer set. A no-op after teardown.
    pub fn release_edge_buffers(&self, buffers: EdgeFilterBuffers) {
        let mut session = self.session();
        if let Ok(backend) = session.backend() {
            buffers.release(backend);
        }
    }

    /// Launch one edge filter. Failure tears the device down and is
    /// returned to the caller; there is no CPU fallback.
    pub fn run_edge_filter(
        &self,
        kind: EdgeKind,
        args: &EdgeFilterArgs,
        plane_count: usize,
        block_count: usize,
        max_threads: usize,
    ) -> Result<(), GpuError> {
        let mut session = self.session();
        let result = super::pipeline::edge::run_edge_filter(
            &mut session,
            kind,
            args,
            plane_count,
            block_count,
            max_threads,
        );
        if let Err(err) = &result {
            error!(?kind, error = %err, "edge filter failed");
            session.fail(err);
        }
        result
    }
}

/// The held service lock.
pub struct GpuSession<'a> {
    service: &'a GpuService,
    state: MutexGuard<'a, ServiceState>,
}

impl GpuSession<'_> {
    pub fn readiness(&self) -> Readiness {
        self.state.readiness
    }

    pub fn acquire(&mut self) -> Readiness {
        if self.state.readiness != Readiness::Uninitialized {
            return self.state.readiness;
        }

        if !self.service.config.enabled {
            info!("GPU path disabled by configuration");
            self.state.readiness = Readiness::Failed;
            return Readiness::Failed;
        }

        self.state.init_attempts += 1;
        let mut backend = match (self.service.factory)() {
            Ok(backend) => backend,
            Err(err) => {
                warn!(error = %err, "no GPU backend; using software path");
                self.state.readiness = Readiness::Failed;
                return Readiness::Failed;
            }
        };

        match backend.open(&self.service.config.prefs) {
            Ok(summary) => {
                info!(device = %summary, "GPU path ready");
                self.state.device = Some(summary);
                self.state.backend = Some(backend);
                self.state.readiness = Readiness::Ready;
            }
            Err(err) => {
                warn!(error = %err, "GPU initialization failed; using software path");
                backend.close();
                self.state.readiness = Readiness::Failed;
            }
        }
        self.state.readiness
    }

    pub fn ensure_ready(&mut self) -> Result<(), GpuError> {
        match self.acquire() {
            Readiness::Ready => Ok(()),
            _ => Err(GpuError::Unavailable),
        }
    }

    pub(crate) fn backend(&mut self) -> Result<&mut dyn ComputeBackend, GpuError> {
        match self.state.backend.as_deref_mut() {
            Some(backend) => Ok(backend),
            None => Err(GpuError::NotReady),
        }
    }

    /// Compile a family and publish its slots. A build failure fails the
    /// whole device.
    pub fn ensure_family(&mut self, family: KernelFamily) -> Result<(), GpuError> {
        self.ensure_ready()?;
        if self.state.programs.contains_key(&family) {
            return Ok(());
        }
        let result = self.load_family(family);
        if let Err(err) = &result {
            if let GpuError::Build { log, .. } = err {
                error!(%family, "kernel build log:\n{}", log);
            }
            self.fail(err);
        }
        result
    }

    fn load_family(&mut self, family: KernelFamily) -> Result<(), GpuError> {
        let source = self.service.locator.load(family)?;
        let state = &mut *self.state;
        let backend = state.backend.as_deref_mut().ok_or(GpuError::NotReady)?;

        let program = backend.build_program(family, &source)?;
        let mut built = Vec::with_capacity(family.kernels().len());
        for &name in family.kernels() {
            match backend.create_kernel(program, name) {
                Ok(kernel) => built.push((name, kernel)),
                Err(err) => {
                    for (_, kernel) in built {
                        backend.release_kernel(kernel);
                    }
                    backend.release_program(program);
                    return Err(err);
                }
            }
        }

        for (name, kernel) in built {
            state.slots.insert(
                name,
                KernelSlot {
                    kernel,
                    shadow: ArgShadow::new(),
                },
            );
        }
        state.programs.insert(family, program);
        debug!(%family, "compiled kernel family");
        Ok(())
    }

    /// Kernel handle for a slot, compiling its family on first request.
    pub fn kernel(&mut self, name: KernelName) -> Result<KernelId, GpuError> {
        if let Some(slot) = self.state.slots.get(&name) {
            return Ok(slot.kernel);
        }
        self.ensure_family(name.family())?;
        self.state
            .slots
            .get(&name)
            .map(|slot| slot.kernel)
            .ok_or_else(|| GpuError::KernelCreation(name.entry_point().to_string()))
    }

    /// Diff-bind `args` to a slot.
    pub fn bind(&mut self, name: KernelName, args: &[ArgValue]) -> Result<BindCount, GpuError> {
        let state = &mut *self.state;
        let backend = state.backend.as_deref_mut().ok_or(GpuError::NotReady)?;
        let slot = state
            .slots
            .get_mut(&name)
            .ok_or_else(|| GpuError::Argument(format!("{} not compiled", name.entry_point())))?;
        let count = args::bind(backend, slot.kernel, &mut slot.shadow, args)?;
        state.binds += count;
        Ok(count)
    }

    /// Last values bound to a slot.
    pub fn shadow(&self, name: KernelName) -> Option<&ArgShadow> {
        self.state.slots.get(&name).map(|slot| &slot.shadow)
    }

    pub fn work_group_size(&mut self, name: KernelName) -> Result<u32, GpuError> {
        let kernel = self.kernel(name)?;
        self.backend()?.work_group_size(kernel)
    }

    pub fn enqueue(&mut self, name: KernelName, geometry: LaunchGeometry) -> Result<(), GpuError> {
        let kernel = self.kernel(name)?;
        tracing::trace!(kernel = name.entry_point(), ?geometry, "enqueue");
        self.backend()?.enqueue(kernel, geometry)
    }

    /// Persistent interpolation buffers, allocated on first use.
    pub fn interp_buffers(&mut self) -> Result<InterpBuffers, GpuError> {
        if let Some(buffers) = self.state.interp {
            return Ok(buffers);
        }
        let buffers = InterpBuffers::create(self.backend()?)?;
        self.state.interp = Some(buffers);
        Ok(buffers)
    }

    pub fn create_buffer(&mut self, label: &str, size: usize) -> Result<BufferId, GpuError> {
        self.backend()?
            .create_buffer(label, super::buffers::word_aligned(size))
    }

    pub fn write_buffer(&mut self, buffer: BufferId, data: &[u8]) -> Result<(), GpuError> {
        self.backend()?.write_buffer(buffer, 0, data)
    }

    pub fn read_buffer(&mut self, buffer: BufferId, out: &mut [u8]) -> Result<(), GpuError> {
        self.backend()?.read_buffer(buffer, 0, out)
    }

    pub fn release_buffer(&mut self, buffer: BufferId) {
        if let Ok(backend) = self.backend() {
            backend.release_buffer(buffer);
        }
    }

    /// Wait for queued work, ignoring errors. Used before releasing
    /// per-call buffers on an error path.
    pub fn drain(&mut self) {
        if let Ok(backend) = self.backend() {
            if let Err(err) = backend.finish() {
                debug!(error = %err, "queue drain failed");
            }
        }
    }

    /// Release everything and mark the path failed.
    pub fn fail(&mut self, err: &GpuError) {
        if self.state.readiness != Readiness::Failed {
            warn!(error = %err, "GPU path failed; switching to software path for this process");
        }
        self.teardown();
        self.state.readiness = Readiness::Failed;
    }

    /// Drain the queue, then release buffers, kernels, programs and
    /// finally the context.
    fn teardown(&mut self) {
        let state = &mut *self.state;
        if let Some(mut backend) = state.backend.take() {
            if let Err(err) = backend.finish() {
                debug!(error = %err, "queue drain during teardown failed");
            }
            if let Some(buffers) = state.interp.take() {
                buffers.release(backend.as_mut());
            }
            for (_, slot) in state.slots.drain() {
                backend.release_kernel(slot.kernel);
            }
            for (_, program) in state.programs.drain() {
                backend.release_program(program);
            }
            backend.close();
        }
        state.interp = None;
        state.slots.clear();
        state.programs.clear();
        state.device = None;
    }
}
