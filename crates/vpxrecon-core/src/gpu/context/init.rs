//! Adapter discovery and device initialization.

use tracing::{debug, info};

use super::{DeviceClass, DevicePreferences, DeviceSummary, GpuError};
use crate::config::PowerPreference;

/// Storage buffers bound by the widest kernel (edge filters plus params).
pub(crate) const MIN_STORAGE_BUFFERS: u32 = 6;

fn create_instance() -> wgpu::Instance {
    wgpu::Instance::new(wgpu::InstanceDescriptor {
        backends: wgpu::Backends::all(),
        ..Default::default()
    })
}

fn classify(info: &wgpu::AdapterInfo) -> DeviceClass {
    match info.device_type {
        wgpu::DeviceType::DiscreteGpu
        | wgpu::DeviceType::IntegratedGpu
        | wgpu::DeviceType::VirtualGpu => DeviceClass::Gpu,
        wgpu::DeviceType::Cpu => DeviceClass::Software,
        wgpu::DeviceType::Other => DeviceClass::Other,
    }
}

fn summarize(info: &wgpu::AdapterInfo) -> DeviceSummary {
    DeviceSummary {
        name: info.name.clone(),
        class: classify(info),
        backend: format!("{:?}", info.backend),
    }
}

/// Kernels write 8-bit pixels through atomic read-modify-write on storage
/// words; that needs compute shaders and enough storage bindings per stage.
pub(crate) fn supports_byte_stores(adapter: &wgpu::Adapter) -> bool {
    let caps = adapter.get_downlevel_capabilities();
    caps.flags.contains(wgpu::DownlevelFlags::COMPUTE_SHADERS)
        && adapter.limits().max_storage_buffers_per_shader_stage >= MIN_STORAGE_BUFFERS
}

fn preferred_type(power: PowerPreference) -> wgpu::DeviceType {
    match power {
        PowerPreference::HighPerformance => wgpu::DeviceType::DiscreteGpu,
        PowerPreference::LowPower => wgpu::DeviceType::IntegratedGpu,
    }
}

/// Pick a GPU-class adapter, else the first compliant non-GPU adapter.
fn select_adapter(
    instance: &wgpu::Instance,
    prefs: &DevicePreferences,
) -> Result<wgpu::Adapter, GpuError> {
    let adapters = instance.enumerate_adapters(wgpu::Backends::all());
    if adapters.is_empty() {
        return Err(GpuError::NoAdapter);
    }

    let wanted = preferred_type(prefs.power);
    let mut gpu: Option<wgpu::Adapter> = None;
    let mut fallback: Option<wgpu::Adapter> = None;
    let mut rejected = Vec::new();

    for adapter in adapters {
        let info = adapter.get_info();
        if !supports_byte_stores(&adapter) {
            debug!(adapter = %info.name, "rejecting adapter without byte-addressable stores");
            rejected.push(info.name);
            continue;
        }

        match classify(&info) {
            DeviceClass::Gpu => {
                let better = match &gpu {
                    None => true,
                    Some(current) => {
                        current.get_info().device_type != wanted && info.device_type == wanted
                    }
                };
                if better {
                    gpu = Some(adapter);
                }
            }
            _ => {
                if fallback.is_none() {
                    fallback = Some(adapter);
                }
            }
        }
    }

    if let Some(adapter) = gpu {
        return Ok(adapter);
    }
    match fallback {
        Some(adapter) if prefs.allow_software => Ok(adapter),
        Some(adapter) => Err(GpuError::DeviceRequest(format!(
            "only non-GPU adapter {} available and software adapters are disabled",
            adapter.get_info().name
        ))),
        None => Err(GpuError::MissingCapability(rejected.join(", "))),
    }
}

/// Check if a compliant adapter exists without opening a device.
pub fn is_available(prefs: &DevicePreferences) -> bool {
    select_adapter(&create_instance(), prefs).is_ok()
}

/// Get information about the adapter that would be selected.
pub fn device_info(prefs: &DevicePreferences) -> Option<String> {
    select_adapter(&create_instance(), prefs)
        .ok()
        .map(|adapter| summarize(&adapter.get_info()).to_string())
}

/// Initialize the wgpu device and queue on the selected adapter.
pub async fn initialize_device(
    prefs: &DevicePreferences,
) -> Result<(wgpu::Device, wgpu::Queue, DeviceSummary), GpuError> {
    let instance = create_instance();
    let adapter = select_adapter(&instance, prefs)?;
    let summary = summarize(&adapter.get_info());

    let adapter_limits = adapter.limits();
    let limits = wgpu::Limits {
        max_storage_buffers_per_shader_stage: MIN_STORAGE_BUFFERS,
        max_storage_buffer_binding_size: adapter_limits.max_storage_buffer_binding_size,
        max_buffer_size: adapter_limits.max_buffer_size,
        ..wgpu::Limits::downlevel_defaults()
    };

    let (device, queue) = adapter
        .request_device(
            &wgpu::DeviceDescriptor {
                label: Some("vpxrecon-gpu"),
                required_features: wgpu::Features::empty(),
                required_limits: limits,
                memory_hints: wgpu::MemoryHints::Performance,
            },
            None,
        )
        .await
        .map_err(|e| GpuError::DeviceRequest(e.to_string()))?;

    info!(device = %summary, "opened compute device");
    Ok((device, queue, summary))
}
