//! Loop-filter edge launches.

use crate::gpu::backend::LaunchGeometry;
use crate::gpu::buffers::EdgeFilterArgs;
use crate::gpu::context::GpuError;
use crate::gpu::programs::KernelName;
use crate::gpu::service::GpuSession;
use crate::models::EdgeKind;

/// 3-D launch over `(max_threads, plane_count, block_count)`.
///
/// When the kernel's preferred work-group size is smaller than the item
/// count the runtime picks the local size; otherwise one group covers the
/// whole launch.
pub fn edge_geometry(
    preferred: u32,
    max_threads: usize,
    plane_count: usize,
    block_count: usize,
) -> LaunchGeometry {
    let global = [max_threads as u32, plane_count as u32, block_count as u32];
    let total = global.iter().map(|&g| g as u64).product::<u64>();
    let local = if (preferred as u64) < total {
        None
    } else {
        Some(global)
    };
    LaunchGeometry { global, local }
}

/// Bind and launch one edge-filter kernel and wait for it.
///
/// Errors propagate unchanged; the caller decides how to tear down.
pub fn run_edge_filter(
    session: &mut GpuSession<'_>,
    kind: EdgeKind,
    args: &EdgeFilterArgs,
    plane_count: usize,
    block_count: usize,
    max_threads: usize,
) -> Result<(), GpuError> {
    session.ensure_ready()?;
    let name = KernelName::Edge(kind);
    session.kernel(name)?;
    session.bind(name, &args.to_args())?;

    if plane_count == 0 || block_count == 0 || max_threads == 0 {
        tracing::debug!(?kind, "empty edge launch skipped");
        return Ok(());
    }

    let preferred = session.work_group_size(name)?;
    let geometry = edge_geometry(preferred, max_threads, plane_count, block_count);
    session.enqueue(name, geometry)?;
    session.backend()?.finish()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_small_launch_uses_one_group() {
        let geometry = edge_geometry(64, 16, 1, 2);
        assert_eq!(geometry.global, [16, 1, 2]);
        assert_eq!(geometry.local, Some([16, 1, 2]));
    }

    #[test]
    fn test_large_launch_leaves_local_to_runtime() {
        let geometry = edge_geometry(64, 16, 3, 40);
        assert_eq!(geometry.total_items(), 16 * 3 * 40);
        assert_eq!(geometry.local, None);
    }

    #[test]
    fn test_preferred_equal_to_total_is_fixed() {
        assert_eq!(edge_geometry(64, 16, 2, 2).local, Some([16, 2, 2]));
    }
}
