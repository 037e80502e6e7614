//! Argument snapshots and diff binding.
//!
//! Each kernel slot remembers the values it last handed to the backend and
//! only rebinds positions whose value changed. After `bind` returns `Ok`
//! the backend's view of the kernel's arguments equals the requested list.

use super::backend::{ArgValue, ComputeBackend, KernelId};
use super::context::GpuError;

/// Last values bound to one kernel. `None` means never bound.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ArgShadow {
    values: Vec<Option<ArgValue>>,
}

impl ArgShadow {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, index: usize) -> Option<ArgValue> {
        self.values.get(index).copied().flatten()
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// Outcome of a diff bind.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BindCount {
    pub bound: u64,
    pub skipped: u64,
}

impl std::ops::AddAssign for BindCount {
    fn add_assign(&mut self, rhs: Self) {
        self.bound += rhs.bound;
        self.skipped += rhs.skipped;
    }
}

/// Bind `args` positionally, skipping values equal to the shadow.
///
/// On error the shadow keeps the values that were bound successfully, so
/// it never claims more than the backend holds.
pub fn bind(
    backend: &mut dyn ComputeBackend,
    kernel: KernelId,
    shadow: &mut ArgShadow,
    args: &[ArgValue],
) -> Result<BindCount, GpuError> {
    if shadow.values.len() < args.len() {
        shadow.values.resize(args.len(), None);
    }

    let mut count = BindCount::default();
    for (index, &value) in args.iter().enumerate() {
        if shadow.values[index] == Some(value) {
            count.skipped += 1;
            continue;
        }
        backend.set_arg(kernel, index as u32, value)?;
        shadow.values[index] = Some(value);
        count.bound += 1;
    }
    Ok(count)
}
