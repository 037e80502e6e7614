//! Device state shared by every GPU code path: errors, readiness and the
//! wgpu device/queue pair.

#[cfg(feature = "gpu")]
pub(crate) mod init;
#[cfg(feature = "gpu")]
pub(crate) mod pipelines;

use thiserror::Error;

use crate::config::PowerPreference;
use crate::gpu::programs::KernelFamily;

/// Errors that can occur during GPU operations.
#[derive(Debug, Clone, Error)]
pub enum GpuError {
    #[error("no suitable compute adapter found")]
    NoAdapter,

    #[error("adapter {0} lacks byte-addressable storage writes")]
    MissingCapability(String),

    #[error("failed to request device: {0}")]
    DeviceRequest(String),

    #[error("kernel source {file} not found (searched {searched})")]
    SourceNotFound { file: String, searched: String },

    #[error("failed to build {family} program:\n{log}")]
    Build { family: KernelFamily, log: String },

    #[error("failed to create kernel: {0}")]
    KernelCreation(String),

    #[error("buffer operation failed: {0}")]
    Buffer(String),

    #[error("failed to set kernel argument: {0}")]
    Argument(String),

    #[error("kernel launch failed: {0}")]
    Launch(String),

    #[error("readback failed: {0}")]
    Readback(String),

    /// The GPU path has failed earlier in this process, or is disabled.
    #[error("GPU path unavailable")]
    Unavailable,

    #[error("GPU context not initialized")]
    NotReady,
}

/// Tri-state readiness of the GPU path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Readiness {
    #[default]
    Uninitialized,
    Ready,
    /// Sticky until an explicit reset.
    Failed,
}

/// Coarse device class used for adapter preference.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceClass {
    Gpu,
    Software,
    Other,
}

/// What was opened, for logging and `gpu_info()`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceSummary {
    pub name: String,
    pub class: DeviceClass,
    pub backend: String,
}

impl std::fmt::Display for DeviceSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({:?}, {})", self.name, self.class, self.backend)
    }
}

/// Device selection knobs taken from the runtime config.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DevicePreferences {
    pub power: PowerPreference,
    pub allow_software: bool,
}

impl Default for DevicePreferences {
    fn default() -> Self {
        Self {
            power: PowerPreference::HighPerformance,
            allow_software: true,
        }
    }
}

/// wgpu device, queue and the adapter they were opened on.
#[cfg(feature = "gpu")]
pub struct GpuContext {
    pub(crate) device: wgpu::Device,
    pub(crate) queue: wgpu::Queue,
    summary: DeviceSummary,
}

#[cfg(feature = "gpu")]
impl GpuContext {
    /// Check if a compliant adapter exists without opening a device.
    pub fn is_available(prefs: &DevicePreferences) -> bool {
        init::is_available(prefs)
    }

    /// Describe the adapter that would be selected.
    pub fn device_info(prefs: &DevicePreferences) -> Option<String> {
        init::device_info(prefs)
    }

    /// Select an adapter and open its device.
    pub fn new(prefs: &DevicePreferences) -> Result<Self, GpuError> {
        pollster::block_on(Self::new_async(prefs))
    }

    pub async fn new_async(prefs: &DevicePreferences) -> Result<Self, GpuError> {
        let (device, queue, summary) = init::initialize_device(prefs).await?;
        Ok(Self {
            device,
            queue,
            summary,
        })
    }

    pub fn summary(&self) -> &DeviceSummary {
        &self.summary
    }

    /// Block until all submitted work has completed.
    pub fn wait_idle(&self) {
        self.device.poll(wgpu::Maintain::Wait);
    }
}
