//! `ComputeBackend` on wgpu.
//!
//! Kernel arguments are positional. Buffer arguments map to fixed bindings
//! of group 0 (see [`KernelName::signature`]); scalar arguments and the
//! global launch size are packed into a per-kernel params buffer at
//! binding 15 laid out as `[gx, gy, gz, 0, arg0, arg1, ...]`.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::debug;

use super::backend::{ArgValue, BufferId, ComputeBackend, KernelId, LaunchGeometry, ProgramId};
use super::buffers::word_aligned;
use super::context::pipelines::{
    create_compute_pipeline, create_shader_module, create_storage_buffer, scoped,
};
use super::context::{DevicePreferences, DeviceSummary, GpuContext, GpuError};
use super::pipeline::{workgroup_counts, WORKGROUP_SIZE};
use super::programs::{ArgSlot, KernelFamily, KernelName, PARAMS_BINDING};

const PARAMS_HEADER: usize = 4;

struct DeviceBuffer {
    buffer: wgpu::Buffer,
    size: u64,
}

struct Kernel {
    name: KernelName,
    pipeline: wgpu::ComputePipeline,
    layout: wgpu::BindGroupLayout,
    args: Vec<Option<ArgValue>>,
    params: wgpu::Buffer,
}

pub struct WgpuBackend {
    ctx: Option<GpuContext>,
    /// Last error reported outside an error scope.
    device_error: Arc<Mutex<Option<String>>>,
    next_id: u64,
    buffers: HashMap<BufferId, DeviceBuffer>,
    programs: HashMap<ProgramId, wgpu::ShaderModule>,
    kernels: HashMap<KernelId, Kernel>,
}

impl Default for WgpuBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl WgpuBackend {
    pub fn new() -> Self {
        Self {
            ctx: None,
            device_error: Arc::new(Mutex::new(None)),
            next_id: 1,
            buffers: HashMap::new(),
            programs: HashMap::new(),
            kernels: HashMap::new(),
        }
    }

    fn ctx(&self) -> Result<&GpuContext, GpuError> {
        self.ctx.as_ref().ok_or(GpuError::NotReady)
    }

    fn next_id(&mut self) -> u64 {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    fn check_device_error(&self, wrap: fn(String) -> GpuError) -> Result<(), GpuError> {
        match self.device_error.lock().take() {
            Some(message) => Err(wrap(message)),
            None => Ok(()),
        }
    }

    fn buffer(&self, id: BufferId) -> Result<&DeviceBuffer, GpuError> {
        self.buffers
            .get(&id)
            .ok_or_else(|| GpuError::Buffer(format!("unknown buffer {:?}", id)))
    }

    fn bind_group(&self, kernel: &Kernel) -> Result<wgpu::BindGroup, GpuError> {
        let ctx = self.ctx()?;
        let mut entries = Vec::with_capacity(kernel.args.len() + 1);
        for (index, slot) in kernel.name.signature().iter().enumerate() {
            let ArgSlot::Buffer(binding) = *slot else {
                continue;
            };
            let id = match kernel.args[index] {
                Some(ArgValue::Buffer(id)) => id,
                _ => {
                    return Err(GpuError::Argument(format!(
                        "argument {} of {} not bound",
                        index,
                        kernel.name.entry_point()
                    )))
                }
            };
            entries.push(wgpu::BindGroupEntry {
                binding,
                resource: self.buffer(id)?.buffer.as_entire_binding(),
            });
        }
        entries.push(wgpu::BindGroupEntry {
            binding: PARAMS_BINDING,
            resource: kernel.params.as_entire_binding(),
        });

        scoped(&ctx.device, GpuError::Argument, || {
            ctx.device.create_bind_group(&wgpu::BindGroupDescriptor {
                label: Some(kernel.name.entry_point()),
                layout: &kernel.layout,
                entries: &entries,
            })
        })
    }
}

impl ComputeBackend for WgpuBackend {
    fn open(&mut self, prefs: &DevicePreferences) -> Result<DeviceSummary, GpuError> {
        let ctx = GpuContext::new(prefs)?;
        let slot = Arc::clone(&self.device_error);
        ctx.device.on_uncaptured_error(Box::new(move |err| {
            *slot.lock() = Some(err.to_string());
        }));
        let summary = ctx.summary().clone();
        self.ctx = Some(ctx);
        Ok(summary)
    }

    fn build_program(&mut self, family: KernelFamily, source: &str) -> Result<ProgramId, GpuError> {
        let module = create_shader_module(&self.ctx()?.device, family, source)?;
        let id = ProgramId(self.next_id());
        self.programs.insert(id, module);
        Ok(id)
    }

    fn create_kernel(&mut self, program: ProgramId, name: KernelName) -> Result<KernelId, GpuError> {
        let ctx = self.ctx()?;
        let module = self
            .programs
            .get(&program)
            .ok_or_else(|| GpuError::KernelCreation(format!("unknown program {:?}", program)))?;
        let (pipeline, layout) =
            create_compute_pipeline(&ctx.device, name.entry_point(), module, name.entry_point())?;

        let arg_count = name.signature().len();
        let params_size = ((PARAMS_HEADER + arg_count) * std::mem::size_of::<u32>()) as u64;
        let params = create_storage_buffer(&ctx.device, name.entry_point(), params_size)?;

        let id = KernelId(self.next_id());
        self.kernels.insert(
            id,
            Kernel {
                name,
                pipeline,
                layout,
                args: vec![None; arg_count],
                params,
            },
        );
        Ok(id)
    }

    fn work_group_size(&self, kernel: KernelId) -> Result<u32, GpuError> {
        if self.kernels.contains_key(&kernel) {
            Ok(WORKGROUP_SIZE)
        } else {
            Err(GpuError::KernelCreation(format!("unknown kernel {:?}", kernel)))
        }
    }

    fn create_buffer(&mut self, label: &str, size: usize) -> Result<BufferId, GpuError> {
        let size = word_aligned(size) as u64;
        let buffer = create_storage_buffer(&self.ctx()?.device, label, size)?;
        let id = BufferId(self.next_id());
        self.buffers.insert(id, DeviceBuffer { buffer, size });
        Ok(id)
    }

    fn write_buffer(&mut self, buffer: BufferId, offset: usize, data: &[u8]) -> Result<(), GpuError> {
        let ctx = self.ctx()?;
        let target = self.buffer(buffer)?;
        if data.is_empty() {
            return Ok(());
        }

        // Copies must be whole words; the tail pad lands inside the
        // word-aligned allocation.
        let padded_len = word_aligned(data.len());
        if offset % 4 != 0 || (offset + padded_len) as u64 > target.size {
            return Err(GpuError::Buffer(format!(
                "write of {} bytes at {} exceeds buffer of {} bytes",
                data.len(),
                offset,
                target.size
            )));
        }

        let mut padded;
        let bytes = if padded_len == data.len() {
            data
        } else {
            padded = data.to_vec();
            padded.resize(padded_len, 0);
            &padded[..]
        };
        scoped(&ctx.device, GpuError::Buffer, || {
            ctx.queue.write_buffer(&target.buffer, offset as u64, bytes)
        })
    }

    fn read_buffer(&mut self, buffer: BufferId, offset: usize, out: &mut [u8]) -> Result<(), GpuError> {
        let ctx = self.ctx()?;
        let source = self.buffer(buffer)?;
        if out.is_empty() {
            return Ok(());
        }

        let size = word_aligned(out.len()) as u64;
        if offset % 4 != 0 || offset as u64 + size > source.size {
            return Err(GpuError::Readback(format!(
                "read of {} bytes at {} exceeds buffer of {} bytes",
                out.len(),
                offset,
                source.size
            )));
        }

        let staging = ctx.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("readback_staging"),
            size,
            usage: wgpu::BufferUsages::MAP_READ | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        let mut encoder = ctx
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("readback_encoder"),
            });
        encoder.copy_buffer_to_buffer(&source.buffer, offset as u64, &staging, 0, size);
        ctx.queue.submit(std::iter::once(encoder.finish()));

        let buffer_slice = staging.slice(..);
        let (tx, rx) = std::sync::mpsc::channel();
        buffer_slice.map_async(wgpu::MapMode::Read, move |result| {
            let _ = tx.send(result);
        });
        ctx.device.poll(wgpu::Maintain::Wait);

        rx.recv()
            .map_err(|e| GpuError::Readback(e.to_string()))?
            .map_err(|e| GpuError::Readback(e.to_string()))?;

        {
            let data = buffer_slice.get_mapped_range();
            out.copy_from_slice(&data[..out.len()]);
        }
        staging.unmap();

        self.check_device_error(GpuError::Readback)
    }

    fn release_buffer(&mut self, buffer: BufferId) {
        if let Some(released) = self.buffers.remove(&buffer) {
            released.buffer.destroy();
        }
    }

    fn set_arg(&mut self, kernel: KernelId, index: u32, value: ArgValue) -> Result<(), GpuError> {
        if let ArgValue::Buffer(id) = value {
            self.buffer(id)
                .map_err(|_| GpuError::Argument(format!("argument {} names unknown buffer {:?}", index, id)))?;
        }
        let target = self
            .kernels
            .get_mut(&kernel)
            .ok_or_else(|| GpuError::Argument(format!("unknown kernel {:?}", kernel)))?;
        let index = index as usize;
        let slot = target.name.signature().get(index).copied().ok_or_else(|| {
            GpuError::Argument(format!(
                "{} takes {} arguments, got index {}",
                target.name.entry_point(),
                target.args.len(),
                index
            ))
        })?;

        match (slot, value) {
            (ArgSlot::Buffer(_), ArgValue::Buffer(_)) | (ArgSlot::Scalar, ArgValue::Int(_) | ArgValue::Uint(_)) => {
                target.args[index] = Some(value);
                Ok(())
            }
            _ => Err(GpuError::Argument(format!(
                "argument {} of {} has the wrong kind: {:?}",
                index,
                target.name.entry_point(),
                value
            ))),
        }
    }

    fn enqueue(&mut self, kernel: KernelId, geometry: LaunchGeometry) -> Result<(), GpuError> {
        let target = self
            .kernels
            .get(&kernel)
            .ok_or_else(|| GpuError::Launch(format!("unknown kernel {:?}", kernel)))?;
        let counts = workgroup_counts(&geometry)?;
        if counts.contains(&0) {
            return Ok(());
        }

        let mut params = Vec::with_capacity(PARAMS_HEADER + target.args.len());
        params.extend_from_slice(&geometry.global);
        params.push(0);
        for (index, value) in target.args.iter().enumerate() {
            match value {
                Some(v) => params.push(v.scalar_bits().unwrap_or(0)),
                None => {
                    return Err(GpuError::Argument(format!(
                        "argument {} of {} not bound",
                        index,
                        target.name.entry_point()
                    )))
                }
            }
        }

        let bind_group = self.bind_group(target)?;
        let ctx = self.ctx()?;
        ctx.queue
            .write_buffer(&target.params, 0, bytemuck::cast_slice(&params));

        let mut encoder = ctx
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some(target.name.entry_point()),
            });
        {
            let mut pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
                label: Some(target.name.entry_point()),
                timestamp_writes: None,
            });
            pass.set_pipeline(&target.pipeline);
            pass.set_bind_group(0, &bind_group, &[]);
            pass.dispatch_workgroups(counts[0], counts[1], counts[2]);
        }
        ctx.queue.submit(std::iter::once(encoder.finish()));

        debug!(kernel = target.name.entry_point(), ?counts, "dispatched");
        self.check_device_error(GpuError::Launch)
    }

    fn finish(&mut self) -> Result<(), GpuError> {
        self.ctx()?.wait_idle();
        self.check_device_error(GpuError::Launch)
    }

    fn release_kernel(&mut self, kernel: KernelId) {
        if let Some(released) = self.kernels.remove(&kernel) {
            released.params.destroy();
        }
    }

    fn release_program(&mut self, program: ProgramId) {
        self.programs.remove(&program);
    }

    fn close(&mut self) {
        for (_, buffer) in self.buffers.drain() {
            buffer.buffer.destroy();
        }
        self.kernels.clear();
        self.programs.clear();
        if let Some(ctx) = self.ctx.take() {
            ctx.wait_idle();
        }
        self.device_error.lock().take();
    }
}
