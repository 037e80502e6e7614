//! Runtime configuration management.
//!
//! This module loads the YAML recon config (GPU switch, kernel source
//! directory, adapter preferences) and holds the process-wide handle.

use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Once, OnceLock};

/// Canonical list of candidate config file names we search for on disk.
const CONFIG_FILENAMES: &[&str] = &["vpxrecon.yml", "vpxrecon.yaml"];

/// Environment variable naming an explicit config file.
pub const CONFIG_ENV: &str = "VPXRECON_CONFIG";

/// Environment variable overriding the kernel source directory.
pub const KERNEL_DIR_ENV: &str = "VPXRECON_KERNEL_DIR";

/// Kernel sources shipped with the crate.
pub const BUNDLED_KERNEL_DIR: &str = concat!(env!("CARGO_MANIFEST_DIR"), "/src/gpu/shaders");

/// Public handle that stores the loaded configuration, its source path, and warnings.
pub struct ReconConfigHandle {
    pub config: ReconConfig,
    pub source: Option<PathBuf>,
    pub warnings: Vec<String>,
}

impl ReconConfigHandle {
    fn with_config(config: ReconConfig, source: Option<PathBuf>, warnings: Vec<String>) -> Self {
        Self {
            config,
            source,
            warnings,
        }
    }
}

/// Adapter power preference used when picking among GPU-class devices.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PowerPreference {
    #[default]
    HighPerformance,
    LowPower,
}

/// Runtime configuration for the reconstruction engine.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ReconConfig {
    /// Try the GPU path at all. `false` pins every call to the CPU kernels.
    pub use_gpu: bool,
    /// Resource directory searched for kernel sources after the working directory.
    pub kernel_dir: PathBuf,
    /// Accept a non-GPU compute device (software rasterizer, CPU driver)
    /// when no GPU-class device passes the capability check.
    pub allow_software_adapter: bool,
    pub power_preference: PowerPreference,
}

impl Default for ReconConfig {
    fn default() -> Self {
        Self {
            use_gpu: true,
            kernel_dir: default_kernel_dir(),
            allow_software_adapter: true,
            power_preference: PowerPreference::HighPerformance,
        }
    }
}

impl ReconConfig {
    /// Configuration that never touches a device.
    pub fn cpu_only() -> Self {
        Self {
            use_gpu: false,
            ..Self::default()
        }
    }

    fn sanitize(mut self, warnings: &mut Vec<String>) -> Self {
        if self.kernel_dir.as_os_str().is_empty() {
            warnings.push("kernel_dir is empty; using the bundled kernel directory".to_string());
            self.kernel_dir = default_kernel_dir();
        } else if !self.kernel_dir.is_dir() {
            warnings.push(format!(
                "kernel_dir {} is not a directory; GPU kernels will only be found in the working directory",
                self.kernel_dir.display()
            ));
        }
        self
    }
}

fn default_kernel_dir() -> PathBuf {
    match std::env::var_os(KERNEL_DIR_ENV) {
        Some(dir) if !dir.is_empty() => PathBuf::from(dir),
        _ => PathBuf::from(BUNDLED_KERNEL_DIR),
    }
}

pub fn load_recon_config(custom_path: Option<&Path>) -> ReconConfigHandle {
    let mut warnings = Vec::new();
    let candidates = get_config_candidates(custom_path);

    for candidate in candidates {
        if !candidate.exists() || !candidate.is_file() {
            continue;
        }

        match fs::read_to_string(&candidate) {
            Ok(contents) => match serde_yaml::from_str::<ReconConfig>(&contents) {
                Ok(config) => {
                    let sanitized = config.sanitize(&mut warnings);
                    let source = fs::canonicalize(&candidate).unwrap_or(candidate);
                    return ReconConfigHandle::with_config(sanitized, Some(source), warnings);
                }
                Err(err) => warnings.push(format!(
                    "Failed to parse recon config {}: {}",
                    candidate.display(),
                    err
                )),
            },
            Err(err) => warnings.push(format!(
                "Failed to read recon config {}: {}",
                candidate.display(),
                err
            )),
        }
    }

    warnings.push("No recon config found; using built-in defaults.".to_string());
    ReconConfigHandle::with_config(ReconConfig::default(), None, warnings)
}

fn get_config_candidates(custom_path: Option<&Path>) -> Vec<PathBuf> {
    let mut candidates = Vec::new();

    if let Some(path) = custom_path {
        candidates.push(path.to_path_buf());
    }

    if let Ok(env_path) = std::env::var(CONFIG_ENV) {
        candidates.push(PathBuf::from(env_path));
    }

    if let Ok(cwd) = std::env::current_dir() {
        for name in CONFIG_FILENAMES {
            candidates.push(cwd.join("config").join(name));
            candidates.push(cwd.join(name));
        }
    }

    if let Some(home_dir) = dirs::home_dir() {
        for name in CONFIG_FILENAMES {
            candidates.push(home_dir.join("vpxrecon").join(name));
        }
    }

    candidates
}

static RECON_CONFIG_HANDLE: OnceLock<ReconConfigHandle> = OnceLock::new();
static PRINT_CONFIG_ONCE: Once = Once::new();

pub fn recon_config_handle() -> &'static ReconConfigHandle {
    RECON_CONFIG_HANDLE.get_or_init(|| load_recon_config(None))
}

pub fn log_config_usage() {
    PRINT_CONFIG_ONCE.call_once(|| {
        let handle = recon_config_handle();
        if let Some(source) = &handle.source {
            tracing::info!(path = %source.display(), "loaded recon config");
        } else {
            tracing::debug!("using built-in recon defaults");
        }

        for warning in &handle.warnings {
            tracing::warn!("config warning: {}", warning);
        }
    });
}
