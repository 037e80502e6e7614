//! GPU acceleration for the reconstruction kernels.
//!
//! The compute backend is wgpu (WebGPU), enabled with the `gpu` feature.
//! It supports Metal on macOS, Vulkan on Linux/Windows, and DX12 on
//! Windows. Without the feature the service still exists but never becomes
//! ready, so every call takes the software path.
//!
//! [`GpuService`] owns the device, the compiled kernels and their argument
//! shadows behind one lock; [`pipeline`] holds the per-call GPU work.

pub mod args;
pub mod backend;
pub mod buffers;
mod context;
pub mod pipeline;
pub mod programs;
pub mod service;
mod shaders;
#[cfg(feature = "gpu")]
pub mod wgpu_backend;

#[cfg(test)]
pub(crate) mod sim;

pub use args::BindCount;
pub use backend::{ArgValue, BufferId, ComputeBackend, KernelId, LaunchGeometry, ProgramId};
pub use buffers::{EdgeFilterArgs, EdgeFilterBuffers, EdgeFilterInputs};
#[cfg(feature = "gpu")]
pub use context::GpuContext;
pub use context::{DeviceClass, DevicePreferences, DeviceSummary, GpuError, Readiness};
pub use programs::{KernelFamily, KernelName};
pub use service::{BackendFactory, GpuService, GpuSession, ServiceConfig};
pub use shaders::Shaders;

/// Check if GPU acceleration is available on this system.
pub fn is_gpu_available() -> bool {
    #[cfg(feature = "gpu")]
    {
        let config = &crate::config::recon_config_handle().config;
        config.use_gpu && GpuContext::is_available(&ServiceConfig::from(config).prefs)
    }
    #[cfg(not(feature = "gpu"))]
    {
        false
    }
}

/// Get information about the available GPU device.
pub fn gpu_info() -> Option<String> {
    #[cfg(feature = "gpu")]
    {
        let config = &crate::config::recon_config_handle().config;
        GpuContext::device_info(&ServiceConfig::from(config).prefs)
    }
    #[cfg(not(feature = "gpu"))]
    {
        None
    }
}
