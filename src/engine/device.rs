//! Compute-device detection for conversion engines.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;

/// Compute device, ordered from highest to lowest capability.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AcceleratorDevice {
    /// NVIDIA GPU through CUDA.
    Cuda,
    /// Apple-silicon GPU through Metal Performance Shaders.
    Mps,
    /// Baseline device, always available.
    Cpu,
}

impl AcceleratorDevice {
    /// Pick the highest-capability device available right now.
    ///
    /// CUDA is assumed when the NVIDIA kernel driver is loaded; MPS on
    /// Apple-silicon macOS; CPU otherwise.
    pub fn detect() -> Self {
        if cuda_driver_present() {
            AcceleratorDevice::Cuda
        } else if cfg!(all(target_os = "macos", target_arch = "aarch64")) {
            AcceleratorDevice::Mps
        } else {
            AcceleratorDevice::Cpu
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            AcceleratorDevice::Cuda => "cuda",
            AcceleratorDevice::Mps => "mps",
            AcceleratorDevice::Cpu => "cpu",
        }
    }
}

impl fmt::Display for AcceleratorDevice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

fn cuda_driver_present() -> bool {
    // CUDA_VISIBLE_DEVICES="" (or "-1") hides every GPU from the process.
    if let Ok(visible) = std::env::var("CUDA_VISIBLE_DEVICES") {
        let visible = visible.trim();
        if visible.is_empty() || visible == "-1" {
            return false;
        }
    }
    Path::new("/proc/driver/nvidia/version").exists() || Path::new("/dev/nvidiactl").exists()
}
