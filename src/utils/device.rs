//! Device and data type utilities.

use std::fmt;
use std::sync::OnceLock;

use candle_core::{Device as CandleDevice, DType as CandleDType};

/// Re-export candle Device for convenience
pub type Device = CandleDevice;

/// Re-export candle DType for convenience
pub type DType = CandleDType;

static BEST_DEVICE: OnceLock<Device> = OnceLock::new();

/// Broad family of a compute device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DeviceKind {
    Cuda,
    /// Apple GPU through Metal
    Mps,
    Cpu,
}

impl DeviceKind {
    /// Classify a candle device
    pub fn of(device: &Device) -> Self {
        match device {
            Device::Cuda(_) => DeviceKind::Cuda,
            Device::Metal(_) => DeviceKind::Mps,
            Device::Cpu => DeviceKind::Cpu,
        }
    }
}

impl fmt::Display for DeviceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeviceKind::Cuda => write!(f, "cuda"),
            DeviceKind::Mps => write!(f, "mps:0"),
            DeviceKind::Cpu => write!(f, "cpu"),
        }
    }
}

/// Get the best available device (CUDA > Metal > CPU).
///
/// Detection runs once; later calls return a clone of the same device.
pub fn get_device() -> crate::Result<Device> {
    Ok(BEST_DEVICE.get_or_init(detect_device).clone())
}

fn detect_device() -> Device {
    #[cfg(feature = "cuda")]
    {
        match CandleDevice::new_cuda(0) {
            Ok(device) => {
                tracing::info!("Using CUDA device 0");
                return device;
            }
            Err(e) => {
                tracing::warn!("CUDA not available: {}", e);
            }
        }
    }

    #[cfg(feature = "metal")]
    {
        match CandleDevice::new_metal(0) {
            Ok(device) => {
                tracing::info!("Using Metal device");
                return device;
            }
            Err(e) => {
                tracing::warn!("Metal not available: {}", e);
            }
        }
    }

    tracing::info!("Using CPU device");
    CandleDevice::Cpu
}

/// Human readable name of the device behind `kind`.
///
/// candle exposes no adapter names, so CUDA is always the fixed label
/// `"CUDA GPU 0"` (the ordinal [`get_device`] picks), not the card's model.
/// Metal and CPU report the host processor: the `/proc/cpuinfo` model name on
/// Linux, else the target architecture.
pub fn get_device_name(kind: DeviceKind) -> &'static str {
    static CUDA_NAME: OnceLock<String> = OnceLock::new();
    static MPS_NAME: OnceLock<String> = OnceLock::new();
    static CPU_NAME: OnceLock<String> = OnceLock::new();

    let cell = match kind {
        DeviceKind::Cuda => &CUDA_NAME,
        DeviceKind::Mps => &MPS_NAME,
        DeviceKind::Cpu => &CPU_NAME,
    };

    cell.get_or_init(|| match kind {
        DeviceKind::Cuda => "CUDA GPU 0".to_string(),
        DeviceKind::Mps | DeviceKind::Cpu => processor_name(),
    })
}

fn processor_name() -> String {
    #[cfg(target_os = "linux")]
    {
        if let Ok(cpuinfo) = std::fs::read_to_string("/proc/cpuinfo") {
            let model = cpuinfo
                .lines()
                .find(|line| line.starts_with("model name"))
                .and_then(|line| line.split_once(':'))
                .map(|(_, name)| name.trim().to_string());
            if let Some(model) = model.filter(|m| !m.is_empty()) {
                return model;
            }
        }
    }

    std::env::consts::ARCH.to_string()
}

/// Parse an explicit device request such as `cpu`, `cuda:1` or `mps`
pub fn parse_device(requested: &str) -> crate::Result<Device> {
    let requested = requested.trim().to_lowercase();
    let (name, ordinal) = match requested.split_once(':') {
        Some((name, idx)) => {
            let idx = idx.parse::<usize>().map_err(|_| {
                crate::ImaginairyError::DeviceError(format!(
                    "Invalid device ordinal in '{}'",
                    requested
                ))
            })?;
            (name, idx)
        }
        None => (requested.as_str(), 0),
    };

    match name {
        "cpu" => Ok(CandleDevice::Cpu),
        "cuda" | "gpu" => Ok(CandleDevice::new_cuda(ordinal)?),
        "mps" | "metal" => Ok(CandleDevice::new_metal(ordinal)?),
        other => Err(crate::ImaginairyError::DeviceError(format!(
            "Unknown device '{}'",
            other
        ))),
    }
}

/// Parse dtype string to candle DType
pub fn parse_dtype(dtype_str: &str) -> CandleDType {
    match dtype_str.to_lowercase().as_str() {
        "f32" | "float32" | "float" => CandleDType::F32,
        "f16" | "float16" | "half" => CandleDType::F16,
        "bf16" | "bfloat16" => CandleDType::BF16,
        _ => {
            tracing::warn!("Unknown dtype '{}', defaulting to F32", dtype_str);
            CandleDType::F32
        }
    }
}
