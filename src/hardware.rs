//! Accelerator detection.
//!
//! Informational only: the model is always chosen explicitly by profile and inference
//! runs wherever the compiled-in backend runs.

use std::path::Path;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Accelerator {
    Cuda,
    AppleMps,
    Cpu,
}

impl Accelerator {
    /// Probe the host.
    pub fn detect() -> Self {
        let accelerator = Self::classify(
            nvidia_driver_present(),
            std::env::consts::OS,
            std::env::consts::ARCH,
        );
        log::info!("{}", accelerator.message());
        accelerator
    }

    pub fn classify(nvidia_driver: bool, os: &str, arch: &str) -> Self {
        if nvidia_driver {
            Accelerator::Cuda
        } else if os == "macos" && arch == "aarch64" {
            Accelerator::AppleMps
        } else {
            Accelerator::Cpu
        }
    }

    pub fn message(self) -> &'static str {
        match self {
            Accelerator::Cuda => "GPU Detected (CUDA)",
            Accelerator::AppleMps => "Apple MPS Detected",
            Accelerator::Cpu => "Running on CPU",
        }
    }
}

fn nvidia_driver_present() -> bool {
    ["/proc/driver/nvidia/version", "/dev/nvidia0"]
        .iter()
        .any(|path| Path::new(path).exists())
}
