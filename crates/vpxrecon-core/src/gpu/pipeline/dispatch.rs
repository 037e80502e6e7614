//! Launch geometry to workgroup counts.

use super::{MAX_WORKGROUPS_PER_DIM, WORKGROUP_SIZE};
use crate::gpu::backend::LaunchGeometry;
use crate::gpu::context::GpuError;

/// Workgroups to dispatch for `geometry`.
///
/// Kernels are declared with a `WORKGROUP_SIZE x 1 x 1` group, so only the
/// first dimension is divided; the kernels bounds-check against the global
/// size passed in the params block. A requested local size is a hint and
/// never changes the result.
pub fn workgroup_counts(geometry: &LaunchGeometry) -> Result<[u32; 3], GpuError> {
    let [gx, gy, gz] = geometry.global;
    let counts = [gx.div_ceil(WORKGROUP_SIZE), gy, gz];

    if let Some(dim) = counts.iter().position(|&c| c > MAX_WORKGROUPS_PER_DIM) {
        return Err(GpuError::Launch(format!(
            "global size {:?} needs {} workgroups in dimension {}, max supported is {}",
            geometry.global, counts[dim], dim, MAX_WORKGROUPS_PER_DIM
        )));
    }
    Ok(counts)
}
