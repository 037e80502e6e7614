//! vpxrecon Core Library
//!
//! Macroblock reconstruction for a VP8-style decoder: sub-pixel prediction,
//! inverse transforms and loop-filter edges, offloaded to a compute device
//! when one is available and falling back to the CPU reference kernels.

pub mod config;
pub mod dispatch;
pub mod error;
pub mod filters;
pub mod gpu;
pub mod models;
pub mod recon;

// Re-export commonly used types
pub use dispatch::{DispatchStats, Dispatcher, PredictRequest};
pub use error::ReconError;
pub use models::{
    BlockSize, DequantFactors, EdgeKind, EdgeLimits, LoopFilterType, MacroblockCoeffs, Plane,
    PlaneMut, SubpelFilter,
};
pub use recon::{EdgeFilterJob, PredictJob, Reconstructor};

pub use gpu::{gpu_info, is_gpu_available, GpuError, GpuService};
