//! Shader module and compute pipeline creation.
//!
//! Every object is created inside a validation error scope so a bad kernel
//! source or an unsupported entry point turns into a `GpuError` instead of
//! reaching the device's uncaptured-error handler.

use super::GpuError;
use crate::gpu::programs::KernelFamily;

fn pop_scope(device: &wgpu::Device) -> Option<wgpu::Error> {
    pollster::block_on(device.pop_error_scope())
}

/// Compile a WGSL module and collect its build log.
pub fn create_shader_module(
    device: &wgpu::Device,
    family: KernelFamily,
    source: &str,
) -> Result<wgpu::ShaderModule, GpuError> {
    device.push_error_scope(wgpu::ErrorFilter::Validation);
    let module = device.create_shader_module(wgpu::ShaderModuleDescriptor {
        label: Some(family.label()),
        source: wgpu::ShaderSource::Wgsl(source.into()),
    });

    let info = pollster::block_on(module.get_compilation_info());
    let mut log: Vec<String> = info
        .messages
        .iter()
        .filter(|m| matches!(m.message_type, wgpu::CompilationMessageType::Error))
        .map(|m| match &m.location {
            Some(loc) => format!("{}:{}: {}", loc.line_number, loc.line_position, m.message),
            None => m.message.clone(),
        })
        .collect();

    if let Some(err) = pop_scope(device) {
        log.push(err.to_string());
    }

    if log.is_empty() {
        Ok(module)
    } else {
        Err(GpuError::Build {
            family,
            log: log.join("\n"),
        })
    }
}

/// Create a compute pipeline with an automatic layout.
///
/// Returns the pipeline and its group-0 bind group layout.
pub fn create_compute_pipeline(
    device: &wgpu::Device,
    label: &str,
    module: &wgpu::ShaderModule,
    entry_point: &str,
) -> Result<(wgpu::ComputePipeline, wgpu::BindGroupLayout), GpuError> {
    device.push_error_scope(wgpu::ErrorFilter::Validation);
    let pipeline = device.create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
        label: Some(label),
        layout: None,
        module,
        entry_point: Some(entry_point),
        compilation_options: Default::default(),
        cache: None,
    });
    let layout = pipeline.get_bind_group_layout(0);

    match pop_scope(device) {
        Some(err) => Err(GpuError::KernelCreation(format!("{}: {}", entry_point, err))),
        None => Ok((pipeline, layout)),
    }
}

/// Create a storage buffer usable as a copy source and destination.
pub fn create_storage_buffer(
    device: &wgpu::Device,
    label: &str,
    size: u64,
) -> Result<wgpu::Buffer, GpuError> {
    device.push_error_scope(wgpu::ErrorFilter::OutOfMemory);
    device.push_error_scope(wgpu::ErrorFilter::Validation);
    let buffer = device.create_buffer(&wgpu::BufferDescriptor {
        label: Some(label),
        size,
        usage: wgpu::BufferUsages::STORAGE
            | wgpu::BufferUsages::COPY_SRC
            | wgpu::BufferUsages::COPY_DST,
        mapped_at_creation: false,
    });
    let validation = pop_scope(device);
    let oom = pop_scope(device);

    match validation.or(oom) {
        Some(err) => Err(GpuError::Buffer(format!("{} ({} bytes): {}", label, size, err))),
        None => Ok(buffer),
    }
}

/// Run `f` in a validation scope, mapping any error with `wrap`.
pub fn scoped<T>(
    device: &wgpu::Device,
    wrap: fn(String) -> GpuError,
    f: impl FnOnce() -> T,
) -> Result<T, GpuError> {
    device.push_error_scope(wgpu::ErrorFilter::Validation);
    let value = f();
    match pop_scope(device) {
        Some(err) => Err(wrap(err.to_string())),
        None => Ok(value),
    }
}
