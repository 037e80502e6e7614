//! Errors returned to callers of the reconstruction entry points.

use thiserror::Error;

use crate::gpu::GpuError;

#[derive(Debug, Error)]
pub enum ReconError {
    #[error("sub-pixel phase {0} out of range 0..=7")]
    InvalidPhase(usize),

    #[error("invalid block geometry: {0}")]
    InvalidGeometry(String),

    #[error("source region needed by the filter lies outside the source buffer")]
    SourceOutOfBounds,

    #[error("destination block lies outside the destination buffer")]
    DestinationOutOfBounds,

    /// Edge filtering has no CPU fallback; device failures surface here.
    #[error("edge filter failed: {0}")]
    EdgeFilter(#[from] GpuError),
}
