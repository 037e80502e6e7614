//! GPU-side orchestration of the reconstruction kernels.
//!
//! Everything here runs inside a [`GpuSession`](super::service::GpuSession),
//! so each call sees a consistent device and kernel cache.

pub(crate) mod dispatch;
pub mod edge;
pub mod interp;

pub use dispatch::workgroup_counts;
pub use edge::edge_geometry;
pub use interp::{interpolate, InterpCall};

/// Workgroup size declared by every kernel entry point.
pub const WORKGROUP_SIZE: u32 = 64;

/// Maximum workgroups per dimension (GPU limit)
pub const MAX_WORKGROUPS_PER_DIM: u32 = 65535;
