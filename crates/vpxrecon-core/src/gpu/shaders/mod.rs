//! WGSL kernel sources.
//!
//! The sources are read from disk at first use rather than embedded, so a
//! deployment can ship patched kernels next to the binary. This directory is
//! the default resource directory searched after the working directory.

/// File names of the kernel sources.
pub struct Shaders;

impl Shaders {
    /// Six-tap and bilinear two-pass interpolation.
    pub const FILTER: &'static str = "filter.wgsl";

    /// Dequantize + inverse 4x4 transform, DC-only variant.
    pub const IDCT: &'static str = "idct.wgsl";

    /// Inverse second-order transform; appended to `IDCT`.
    pub const WALSH: &'static str = "walsh.wgsl";

    /// The six loop-filter edge kernels.
    pub const LOOP_FILTER: &'static str = "loop_filter.wgsl";
}
