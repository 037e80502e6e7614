//! The compute backend seam.
//!
//! `ComputeBackend` is a handle-based device API: the service owns the
//! policy (readiness, caching, argument diffing, teardown order) and a
//! backend only executes. The production implementation sits on wgpu; tests
//! substitute a simulated device.

use super::context::{DevicePreferences, DeviceSummary, GpuError};
use super::programs::{KernelFamily, KernelName};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BufferId(pub u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct KernelId(pub u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ProgramId(pub u64);

/// A bound kernel argument, compared by value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArgValue {
    Buffer(BufferId),
    Int(i32),
    Uint(u32),
}

impl ArgValue {
    /// Raw bits for scalar packing.
    pub fn scalar_bits(self) -> Option<u32> {
        match self {
            ArgValue::Buffer(_) => None,
            ArgValue::Int(v) => Some(v as u32),
            ArgValue::Uint(v) => Some(v),
        }
    }
}

/// Global work size and optional fixed local size.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LaunchGeometry {
    pub global: [u32; 3],
    pub local: Option<[u32; 3]>,
}

impl LaunchGeometry {
    pub fn linear(items: u32) -> Self {
        Self {
            global: [items, 1, 1],
            local: None,
        }
    }

    pub fn total_items(&self) -> u64 {
        self.global.iter().map(|&g| g as u64).product()
    }
}

/// Device operations used by the service.
///
/// Buffers are byte-addressed. Releasing an unknown handle is a no-op.
pub trait ComputeBackend: Send {
    /// Select a device and create its context and queue.
    fn open(&mut self, prefs: &DevicePreferences) -> Result<DeviceSummary, GpuError>;

    /// Compile a program; on failure the error carries the build log.
    fn build_program(&mut self, family: KernelFamily, source: &str) -> Result<ProgramId, GpuError>;

    fn create_kernel(&mut self, program: ProgramId, name: KernelName) -> Result<KernelId, GpuError>;

    /// Preferred work-group size of a kernel.
    fn work_group_size(&self, kernel: KernelId) -> Result<u32, GpuError>;

    fn create_buffer(&mut self, label: &str, size: usize) -> Result<BufferId, GpuError>;

    fn write_buffer(&mut self, buffer: BufferId, offset: usize, data: &[u8]) -> Result<(), GpuError>;

    /// Blocking read; all previously enqueued work is visible.
    fn read_buffer(&mut self, buffer: BufferId, offset: usize, out: &mut [u8]) -> Result<(), GpuError>;

    fn release_buffer(&mut self, buffer: BufferId);

    fn set_arg(&mut self, kernel: KernelId, index: u32, value: ArgValue) -> Result<(), GpuError>;

    fn enqueue(&mut self, kernel: KernelId, geometry: LaunchGeometry) -> Result<(), GpuError>;

    /// Drain the queue.
    fn finish(&mut self) -> Result<(), GpuError>;

    fn release_kernel(&mut self, kernel: KernelId);

    fn release_program(&mut self, program: ProgramId);

    /// Release the queue and context. Called last during teardown.
    fn close(&mut self);
}
