//! Simulated compute device for tests.
//!
//! Executes launches with the CPU reference kernels against byte-addressed
//! buffers, counts every backend call and can be told to fail at a chosen
//! step. All backends produced by one [`SimDevice`] share its state, so
//! counters survive teardown and re-initialization.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::{Mutex, MutexGuard};

use super::backend::{ArgValue, BufferId, ComputeBackend, KernelId, LaunchGeometry, ProgramId};
use super::buffers::word_aligned;
use super::context::{DeviceClass, DevicePreferences, DeviceSummary, GpuError};
use super::programs::{ArgSlot, KernelFamily, KernelName};
use super::service::BackendFactory;
use crate::filters::loop_filter::{filter_edges, EdgeLaunch};
use crate::filters::{bilinear, sixtap};
use crate::models::{EdgeLimits, LoopFilterType};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailPoint {
    Open,
    Build(KernelFamily),
    CreateKernel,
    CreateBuffer,
    Write,
    SetArg,
    Enqueue,
    Read,
}

#[derive(Debug)]
struct SimKernel {
    name: KernelName,
    args: Vec<Option<ArgValue>>,
}

#[derive(Debug, Default)]
pub struct SimState {
    pub opens: u64,
    pub closes: u64,
    pub builds: u64,
    pub kernels_created: u64,
    pub set_args: u64,
    pub enqueues: u64,
    pub writes: u64,
    pub reads: u64,
    pub finishes: u64,
    pub launches: Vec<(KernelName, LaunchGeometry)>,
    pub fail: Option<FailPoint>,
    next_id: u64,
    buffers: HashMap<BufferId, Vec<u8>>,
    programs: HashMap<ProgramId, KernelFamily>,
    kernels: HashMap<KernelId, SimKernel>,
}

impl SimState {
    pub fn live_buffers(&self) -> usize {
        self.buffers.len()
    }

    pub fn live_kernels(&self) -> usize {
        self.kernels.len()
    }

    pub fn live_programs(&self) -> usize {
        self.programs.len()
    }

    /// Arguments currently held by the live kernel for `name`.
    pub fn kernel_args(&self, name: KernelName) -> Option<Vec<Option<ArgValue>>> {
        self.kernels
            .values()
            .find(|k| k.name == name)
            .map(|k| k.args.clone())
    }

    fn next_id(&mut self) -> u64 {
        self.next_id += 1;
        self.next_id
    }

    fn check(&self, point: FailPoint) -> Result<(), GpuError> {
        if self.fail != Some(point) {
            return Ok(());
        }
        Err(match point {
            FailPoint::Open => GpuError::NoAdapter,
            FailPoint::Build(family) => GpuError::Build {
                family,
                log: "simulated build failure".into(),
            },
            FailPoint::CreateKernel => GpuError::KernelCreation("simulated".into()),
            FailPoint::CreateBuffer => GpuError::Buffer("simulated out of memory".into()),
            FailPoint::Write => GpuError::Buffer("simulated write failure".into()),
            FailPoint::SetArg => GpuError::Argument("simulated".into()),
            FailPoint::Enqueue => GpuError::Launch("simulated".into()),
            FailPoint::Read => GpuError::Readback("simulated".into()),
        })
    }

    fn bytes(&self, id: BufferId) -> Result<&Vec<u8>, GpuError> {
        self.buffers
            .get(&id)
            .ok_or_else(|| GpuError::Buffer(format!("unknown buffer {:?}", id)))
    }

    fn bytes_mut(&mut self, id: BufferId) -> Result<&mut Vec<u8>, GpuError> {
        self.buffers
            .get_mut(&id)
            .ok_or_else(|| GpuError::Buffer(format!("unknown buffer {:?}", id)))
    }

    fn words(&self, id: BufferId) -> Result<Vec<i32>, GpuError> {
        Ok(self
            .bytes(id)?
            .chunks_exact(4)
            .map(|w| i32::from_le_bytes([w[0], w[1], w[2], w[3]]))
            .collect())
    }

    fn store_words(&mut self, id: BufferId, words: &[i32]) -> Result<(), GpuError> {
        let bytes = self.bytes_mut(id)?;
        for (chunk, word) in bytes.chunks_exact_mut(4).zip(words) {
            chunk.copy_from_slice(&word.to_le_bytes());
        }
        Ok(())
    }

    fn taps<const N: usize>(&self, id: BufferId) -> Result<[i32; N], GpuError> {
        let words = self.words(id)?;
        let mut taps = [0i32; N];
        taps.copy_from_slice(&words[..N]);
        Ok(taps)
    }

    fn execute(&mut self, name: KernelName, args: &[ArgValue], geometry: LaunchGeometry) -> Result<(), GpuError> {
        let buffer = |i: usize| match args[i] {
            ArgValue::Buffer(id) => id,
            _ => BufferId(0),
        };
        let scalar = |i: usize| args[i].scalar_bits().unwrap_or(0) as i32 as usize;

        match name {
            KernelName::SixtapFirstPass => {
                let src = self.bytes(buffer(0))?.clone();
                let mut out = self.words(buffer(1))?;
                let taps = self.taps::<6>(buffer(6))?;
                sixtap::sixtap_first_pass(&src, &mut out, scalar(2), scalar(3), scalar(4), scalar(5), &taps);
                self.store_words(buffer(1), &out)
            }
            KernelName::BilinearFirstPass => {
                let src = self.bytes(buffer(0))?.clone();
                let (rows, width) = (scalar(4), scalar(5));
                let mut out = vec![0u16; rows * width];
                let taps = self.taps::<2>(buffer(6))?;
                bilinear::bilinear_first_pass(&src, &mut out, scalar(2), scalar(3), rows, width, &taps);
                let widened: Vec<i32> = out.iter().map(|&v| v as i32).collect();
                self.store_words(buffer(1), &widened)
            }
            KernelName::SixtapSecondPass | KernelName::BilinearSecondPass => {
                let inter = self.words(buffer(0))?;
                let offset = args[1].scalar_bits().unwrap_or(0) as i32;
                let taps = self.taps::<6>(buffer(8))?;
                let (pitch, stride, step, height, width) =
                    (scalar(3), scalar(4), scalar(5), scalar(6), scalar(7));
                let mut out = self.bytes(buffer(2))?.clone();
                if name == KernelName::SixtapSecondPass {
                    let start = (offset - 2 * step as i32) as usize;
                    sixtap::sixtap_second_pass(&inter[start..], &mut out, pitch, stride, step, height, width, &taps);
                } else {
                    let narrow: Vec<u16> = inter[offset as usize..].iter().map(|&v| v as u16).collect();
                    let taps = [taps[0], taps[1]];
                    bilinear::bilinear_second_pass(&narrow, &mut out, pitch, stride, step, height, width, &taps);
                }
                *self.bytes_mut(buffer(2))? = out;
                Ok(())
            }
            KernelName::Edge(kind) => {
                let mut frame = self.bytes(buffer(0))?.clone();
                let block_offsets = self.words(buffer(1))?;
                let pitches = self.words(buffer(2))?;
                let limits: Vec<EdgeLimits> = self
                    .words(buffer(3))?
                    .chunks_exact(4)
                    .map(|l| EdgeLimits {
                        mblim: l[0] as u32,
                        blim: l[1] as u32,
                        lim: l[2] as u32,
                        hev_thresh: l[3] as u32,
                    })
                    .collect();
                let levels: Vec<u32> = self.words(buffer(4))?.iter().map(|&v| v as u32).collect();
                let filter_type = if scalar(6) == LoopFilterType::Simple as usize {
                    LoopFilterType::Simple
                } else {
                    LoopFilterType::Normal
                };
                let [threads, planes, blocks] = geometry.global;
                filter_edges(EdgeLaunch {
                    kind,
                    frame: &mut frame,
                    block_offsets: &block_offsets,
                    pitches: &pitches,
                    limits: &limits,
                    levels: &levels,
                    use_mbflim: scalar(5) != 0,
                    filter_type,
                    cur_iter: args[7].scalar_bits().unwrap_or(0) as i32,
                    plane_count: planes as usize,
                    block_count: blocks as usize,
                    max_threads: threads as usize,
                });
                *self.bytes_mut(buffer(0))? = frame;
                Ok(())
            }
            KernelName::DequantIdctAdd | KernelName::DcOnlyIdctAdd | KernelName::InverseWalsh => {
                Err(GpuError::Launch(format!("{} is not simulated", name.entry_point())))
            }
        }
    }
}

/// Shared handle to a simulated device.
#[derive(Clone, Default)]
pub struct SimDevice {
    state: Arc<Mutex<SimState>>,
}

impl SimDevice {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> MutexGuard<'_, SimState> {
        self.state.lock()
    }

    pub fn fail_at(&self, point: FailPoint) {
        self.state.lock().fail = Some(point);
    }

    pub fn clear_failure(&self) {
        self.state.lock().fail = None;
    }

    pub fn backend(&self) -> SimBackend {
        SimBackend {
            state: Arc::clone(&self.state),
        }
    }

    pub fn factory(&self) -> BackendFactory {
        let device = self.clone();
        Box::new(move || Ok(Box::new(device.backend()) as Box<dyn ComputeBackend>))
    }
}

pub struct SimBackend {
    state: Arc<Mutex<SimState>>,
}

impl ComputeBackend for SimBackend {
    fn open(&mut self, _prefs: &DevicePreferences) -> Result<DeviceSummary, GpuError> {
        let mut state = self.state.lock();
        state.opens += 1;
        state.check(FailPoint::Open)?;
        Ok(DeviceSummary {
            name: "simulated".into(),
            class: DeviceClass::Gpu,
            backend: "sim".into(),
        })
    }

    fn build_program(&mut self, family: KernelFamily, source: &str) -> Result<ProgramId, GpuError> {
        let mut state = self.state.lock();
        state.builds += 1;
        state.check(FailPoint::Build(family))?;
        for kernel in family.kernels() {
            if !source.contains(&format!("fn {}(", kernel.entry_point())) {
                return Err(GpuError::Build {
                    family,
                    log: format!("entry point {} not found", kernel.entry_point()),
                });
            }
        }
        let id = ProgramId(state.next_id());
        state.programs.insert(id, family);
        Ok(id)
    }

    fn create_kernel(&mut self, program: ProgramId, name: KernelName) -> Result<KernelId, GpuError> {
        let mut state = self.state.lock();
        state.check(FailPoint::CreateKernel)?;
        if state.programs.get(&program) != Some(&name.family()) {
            return Err(GpuError::KernelCreation(name.entry_point().into()));
        }
        state.kernels_created += 1;
        let id = KernelId(state.next_id());
        state.kernels.insert(
            id,
            SimKernel {
                name,
                args: vec![None; name.signature().len()],
            },
        );
        Ok(id)
    }

    fn work_group_size(&self, kernel: KernelId) -> Result<u32, GpuError> {
        let state = self.state.lock();
        if state.kernels.contains_key(&kernel) {
            Ok(64)
        } else {
            Err(GpuError::KernelCreation(format!("unknown kernel {:?}", kernel)))
        }
    }

    fn create_buffer(&mut self, _label: &str, size: usize) -> Result<BufferId, GpuError> {
        let mut state = self.state.lock();
        state.check(FailPoint::CreateBuffer)?;
        let id = BufferId(state.next_id());
        state.buffers.insert(id, vec![0; word_aligned(size)]);
        Ok(id)
    }

    fn write_buffer(&mut self, buffer: BufferId, offset: usize, data: &[u8]) -> Result<(), GpuError> {
        let mut state = self.state.lock();
        state.writes += 1;
        state.check(FailPoint::Write)?;
        let bytes = state.bytes_mut(buffer)?;
        let end = offset + data.len();
        if end > bytes.len() {
            return Err(GpuError::Buffer(format!("write past end of {:?}", buffer)));
        }
        bytes[offset..end].copy_from_slice(data);
        Ok(())
    }

    fn read_buffer(&mut self, buffer: BufferId, offset: usize, out: &mut [u8]) -> Result<(), GpuError> {
        let mut state = self.state.lock();
        state.reads += 1;
        state.check(FailPoint::Read)?;
        let bytes = state.bytes(buffer)?;
        let end = offset + out.len();
        if end > bytes.len() {
            return Err(GpuError::Readback(format!("read past end of {:?}", buffer)));
        }
        out.copy_from_slice(&bytes[offset..end]);
        Ok(())
    }

    fn release_buffer(&mut self, buffer: BufferId) {
        self.state.lock().buffers.remove(&buffer);
    }

    fn set_arg(&mut self, kernel: KernelId, index: u32, value: ArgValue) -> Result<(), GpuError> {
        let mut state = self.state.lock();
        state.set_args += 1;
        state.check(FailPoint::SetArg)?;
        if let ArgValue::Buffer(id) = value {
            state.bytes(id)?;
        }
        let target = state
            .kernels
            .get_mut(&kernel)
            .ok_or_else(|| GpuError::Argument(format!("unknown kernel {:?}", kernel)))?;
        let index = index as usize;
        match (target.name.signature().get(index), value) {
            (Some(ArgSlot::Buffer(_)), ArgValue::Buffer(_))
            | (Some(ArgSlot::Scalar), ArgValue::Int(_) | ArgValue::Uint(_)) => {
                target.args[index] = Some(value);
                Ok(())
            }
            _ => Err(GpuError::Argument(format!(
                "bad argument {} for {}",
                index,
                target.name.entry_point()
            ))),
        }
    }

    fn enqueue(&mut self, kernel: KernelId, geometry: LaunchGeometry) -> Result<(), GpuError> {
        let mut state = self.state.lock();
        state.enqueues += 1;
        state.check(FailPoint::Enqueue)?;
        let target = state
            .kernels
            .get(&kernel)
            .ok_or_else(|| GpuError::Launch(format!("unknown kernel {:?}", kernel)))?;
        let name = target.name;
        let args = target
            .args
            .iter()
            .map(|a| a.ok_or_else(|| GpuError::Argument(format!("{} has unbound arguments", name.entry_point()))))
            .collect::<Result<Vec<_>, _>>()?;
        state.launches.push((name, geometry));
        state.execute(name, &args, geometry)
    }

    fn finish(&mut self) -> Result<(), GpuError> {
        self.state.lock().finishes += 1;
        Ok(())
    }

    fn release_kernel(&mut self, kernel: KernelId) {
        self.state.lock().kernels.remove(&kernel);
    }

    fn release_program(&mut self, program: ProgramId) {
        self.state.lock().programs.remove(&program);
    }

    fn close(&mut self) {
        let mut state = self.state.lock();
        state.closes += 1;
        state.buffers.clear();
        state.kernels.clear();
        state.programs.clear();
    }
}
