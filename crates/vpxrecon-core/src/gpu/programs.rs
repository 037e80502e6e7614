//! Kernel families, entry points and source lookup.

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use super::context::GpuError;
use super::shaders::Shaders;
use crate::models::EdgeKind;

/// A group of kernels compiled together from one set of source files.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KernelFamily {
    Interpolation,
    Transform,
    EdgeFilter,
}

impl KernelFamily {
    pub const ALL: [KernelFamily; 3] = [
        KernelFamily::Interpolation,
        KernelFamily::Transform,
        KernelFamily::EdgeFilter,
    ];

    pub fn label(self) -> &'static str {
        match self {
            KernelFamily::Interpolation => "interpolation",
            KernelFamily::Transform => "transform",
            KernelFamily::EdgeFilter => "edge_filter",
        }
    }

    /// Source files concatenated into the family's program.
    pub fn source_files(self) -> &'static [&'static str] {
        match self {
            KernelFamily::Interpolation => &[Shaders::FILTER],
            #[cfg(feature = "gpu-walsh")]
            KernelFamily::Transform => &[Shaders::IDCT, Shaders::WALSH],
            #[cfg(not(feature = "gpu-walsh"))]
            KernelFamily::Transform => &[Shaders::IDCT],
            KernelFamily::EdgeFilter => &[Shaders::LOOP_FILTER],
        }
    }

    /// Entry points extracted from the family's program.
    pub fn kernels(self) -> &'static [KernelName] {
        match self {
            KernelFamily::Interpolation => &[
                KernelName::SixtapFirstPass,
                KernelName::SixtapSecondPass,
                KernelName::BilinearFirstPass,
                KernelName::BilinearSecondPass,
            ],
            #[cfg(feature = "gpu-walsh")]
            KernelFamily::Transform => &[
                KernelName::DequantIdctAdd,
                KernelName::DcOnlyIdctAdd,
                KernelName::InverseWalsh,
            ],
            #[cfg(not(feature = "gpu-walsh"))]
            KernelFamily::Transform => &[KernelName::DequantIdctAdd, KernelName::DcOnlyIdctAdd],
            KernelFamily::EdgeFilter => &[
                KernelName::Edge(EdgeKind::LoopFilterHorizontal),
                KernelName::Edge(EdgeKind::LoopFilterVertical),
                KernelName::Edge(EdgeKind::MbLoopFilterHorizontal),
                KernelName::Edge(EdgeKind::MbLoopFilterVertical),
                KernelName::Edge(EdgeKind::SimpleHorizontal),
                KernelName::Edge(EdgeKind::SimpleVertical),
            ],
        }
    }
}

impl fmt::Display for KernelFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// One kernel slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KernelName {
    SixtapFirstPass,
    SixtapSecondPass,
    BilinearFirstPass,
    BilinearSecondPass,
    DequantIdctAdd,
    DcOnlyIdctAdd,
    InverseWalsh,
    Edge(EdgeKind),
}

/// Binding of the params buffer holding launch size and scalar arguments.
pub const PARAMS_BINDING: u32 = 15;

/// How a positional kernel argument reaches the shader.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArgSlot {
    /// Storage buffer at this binding of group 0.
    Buffer(u32),
    /// 32-bit scalar packed into the params buffer.
    Scalar,
}

use ArgSlot::{Buffer, Scalar};

const FIRST_PASS_ARGS: &[ArgSlot] = &[
    Buffer(0), // src
    Buffer(1), // intermediate
    Scalar,    // src_stride
    Scalar,    // pixel_step
    Scalar,    // output_height
    Scalar,    // output_width
    Buffer(2), // taps
];

const SECOND_PASS_ARGS: &[ArgSlot] = &[
    Buffer(3), // intermediate
    Scalar,    // offset
    Buffer(4), // output
    Scalar,    // output_pitch
    Scalar,    // src_stride
    Scalar,    // pixel_step
    Scalar,    // output_height
    Scalar,    // output_width
    Buffer(2), // taps
];

const IDCT_ARGS: &[ArgSlot] = &[
    Buffer(0), // coefficients
    Buffer(1), // dequant factors
    Buffer(2), // destination
    Scalar,    // destination origin
    Scalar,    // destination stride
    Scalar,    // blocks per row
];

const WALSH_ARGS: &[ArgSlot] = &[
    Buffer(3), // second-order block
    Buffer(4), // dc output
];

const EDGE_ARGS: &[ArgSlot] = &[
    Buffer(0), // frame
    Buffer(1), // block offsets
    Buffer(2), // pitches
    Buffer(3), // limits
    Buffer(4), // levels
    Scalar,    // use_mbflim
    Scalar,    // filter_type
    Scalar,    // cur_iter
];

impl KernelName {
    pub fn family(self) -> KernelFamily {
        match self {
            KernelName::SixtapFirstPass
            | KernelName::SixtapSecondPass
            | KernelName::BilinearFirstPass
            | KernelName::BilinearSecondPass => KernelFamily::Interpolation,
            KernelName::DequantIdctAdd | KernelName::DcOnlyIdctAdd | KernelName::InverseWalsh => {
                KernelFamily::Transform
            }
            KernelName::Edge(_) => KernelFamily::EdgeFilter,
        }
    }

    pub fn entry_point(self) -> &'static str {
        match self {
            KernelName::SixtapFirstPass => "sixtap_first_pass",
            KernelName::SixtapSecondPass => "sixtap_second_pass",
            KernelName::BilinearFirstPass => "bilinear_first_pass",
            KernelName::BilinearSecondPass => "bilinear_second_pass",
            KernelName::DequantIdctAdd => "dequant_idct_add",
            KernelName::DcOnlyIdctAdd => "dc_only_idct_add",
            KernelName::InverseWalsh => "inverse_walsh",
            KernelName::Edge(kind) => match kind {
                EdgeKind::LoopFilterHorizontal => "loop_filter_horizontal_edge",
                EdgeKind::LoopFilterVertical => "loop_filter_vertical_edge",
                EdgeKind::MbLoopFilterHorizontal => "mbloop_filter_horizontal_edge",
                EdgeKind::MbLoopFilterVertical => "mbloop_filter_vertical_edge",
                EdgeKind::SimpleHorizontal => "loop_filter_simple_horizontal_edge",
                EdgeKind::SimpleVertical => "loop_filter_simple_vertical_edge",
            },
        }
    }

    /// Positional argument layout.
    pub fn signature(self) -> &'static [ArgSlot] {
        match self {
            KernelName::SixtapFirstPass | KernelName::BilinearFirstPass => FIRST_PASS_ARGS,
            KernelName::SixtapSecondPass | KernelName::BilinearSecondPass => SECOND_PASS_ARGS,
            KernelName::DequantIdctAdd | KernelName::DcOnlyIdctAdd => IDCT_ARGS,
            KernelName::InverseWalsh => WALSH_ARGS,
            KernelName::Edge(_) => EDGE_ARGS,
        }
    }
}

/// Finds kernel source files: working directory first, then the
/// configured resource directory.
#[derive(Debug, Clone)]
pub struct SourceLocator {
    kernel_dir: PathBuf,
}

impl SourceLocator {
    pub fn new(kernel_dir: impl Into<PathBuf>) -> Self {
        Self {
            kernel_dir: kernel_dir.into(),
        }
    }

    pub fn kernel_dir(&self) -> &Path {
        &self.kernel_dir
    }

    fn candidates(&self, file: &str) -> Vec<PathBuf> {
        let mut paths = Vec::with_capacity(2);
        if let Ok(cwd) = std::env::current_dir() {
            paths.push(cwd.join(file));
        }
        paths.push(self.kernel_dir.join(file));
        paths
    }

    /// Read one source file from the first location that has it.
    pub fn read(&self, file: &str) -> Result<String, GpuError> {
        let candidates = self.candidates(file);
        for path in &candidates {
            match fs::read_to_string(path) {
                Ok(source) => {
                    debug!(path = %path.display(), "loaded kernel source");
                    return Ok(source);
                }
                Err(err) if err.kind() == std::io::ErrorKind::NotFound => continue,
                Err(err) => {
                    warn!(path = %path.display(), error = %err, "unreadable kernel source");
                }
            }
        }

        let searched = candidates
            .iter()
            .map(|p| p.display().to_string())
            .collect::<Vec<_>>()
            .join(", ");
        warn!(file, searched = %searched, "kernel source not found; using software path");
        Err(GpuError::SourceNotFound {
            file: file.to_string(),
            searched,
        })
    }

    /// Full program source for a family.
    pub fn load(&self, family: KernelFamily) -> Result<String, GpuError> {
        let mut source = String::new();
        for file in family.source_files() {
            source.push_str(&self.read(file)?);
            source.push('\n');
        }
        Ok(source)
    }
}
