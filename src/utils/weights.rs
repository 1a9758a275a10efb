//! Loading downloaded weight files.

use std::collections::HashMap;
use std::path::Path;

use candle_core::{DType, Device, Tensor};
use safetensors::SafeTensors;

/// Memory-map a safetensors file and load every tensor onto `device` as `dtype`.
///
/// Non-float tensors keep their stored dtype.
pub fn load_safetensors(
    path: impl AsRef<Path>,
    device: &Device,
    dtype: DType,
) -> crate::Result<HashMap<String, Tensor>> {
    let path = path.as_ref();
    tracing::debug!("Loading weights file: {:?}", path);

    let file = std::fs::File::open(path)?;
    let mmap = unsafe { memmap2::Mmap::map(&file)? };

    let safetensors = SafeTensors::deserialize(&mmap)
        .map_err(|e| crate::ImaginairyError::WeightsError(format!("{:?}: {}", path, e)))?;

    let mut tensors = HashMap::new();
    for (name, view) in safetensors.tensors() {
        let stored = convert_safetensor_dtype(view.dtype()).ok_or_else(|| {
            crate::ImaginairyError::WeightsError(format!(
                "Tensor {} has unsupported dtype {:?}",
                name,
                view.dtype()
            ))
        })?;

        let tensor = Tensor::from_raw_buffer(view.data(), stored, view.shape(), &Device::Cpu)?;
        let tensor = if stored.is_float() {
            tensor.to_dtype(dtype)?
        } else {
            tensor
        };
        tensors.insert(name, tensor.to_device(device)?);
    }

    Ok(tensors)
}

/// Total number of parameters across `tensors`
pub fn count_params<'a>(tensors: impl IntoIterator<Item = &'a Tensor>) -> usize {
    tensors.into_iter().map(Tensor::elem_count).sum()
}

/// Log the parameter count of a named model at debug level
pub fn log_params<'a>(name: &str, tensors: impl IntoIterator<Item = &'a Tensor>) -> usize {
    let total = count_params(tensors);
    tracing::debug!("{} has {:.2} M params.", name, total as f64 * 1e-6);
    total
}

/// Convert safetensor dtype to candle dtype
fn convert_safetensor_dtype(dtype: safetensors::Dtype) -> Option<DType> {
    match dtype {
        safetensors::Dtype::F16 => Some(DType::F16),
        safetensors::Dtype::BF16 => Some(DType::BF16),
        safetensors::Dtype::F32 => Some(DType::F32),
        safetensors::Dtype::F64 => Some(DType::F64),
        safetensors::Dtype::I64 => Some(DType::I64),
        safetensors::Dtype::U8 => Some(DType::U8),
        safetensors::Dtype::U32 => Some(DType::U32),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dtype_conversion() {
        assert_eq!(convert_safetensor_dtype(safetensors::Dtype::F16), Some(DType::F16));
        assert_eq!(convert_safetensor_dtype(safetensors::Dtype::BF16), Some(DType::BF16));
        assert_eq!(convert_safetensor_dtype(safetensors::Dtype::U8), Some(DType::U8));
        assert_eq!(convert_safetensor_dtype(safetensors::Dtype::I16), None);
    }

    #[test]
    fn test_load_safetensors_and_count() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tiny.safetensors");

        let mut tensors = HashMap::new();
        tensors.insert(
            "conv.weight".to_string(),
            Tensor::ones((4, 3, 3, 3), DType::F32, &Device::Cpu).unwrap(),
        );
        tensors.insert(
            "conv.bias".to_string(),
            Tensor::zeros(4, DType::F32, &Device::Cpu).unwrap(),
        );
        tensors.insert(
            "steps".to_string(),
            Tensor::new(&[1u32, 2, 3], &Device::Cpu).unwrap(),
        );
        candle_core::safetensors::save(&tensors, &path).unwrap();

        let loaded = load_safetensors(&path, &Device::Cpu, DType::F16).unwrap();
        assert_eq!(loaded.len(), 3);
        assert_eq!(loaded["conv.weight"].dims(), &[4, 3, 3, 3]);
        assert_eq!(loaded["conv.weight"].dtype(), DType::F16);
        assert_eq!(loaded["steps"].dtype(), DType::U32);

        assert_eq!(count_params(loaded.values()), 108 + 4 + 3);
        assert_eq!(log_params("Tiny", loaded.values()), 115);
    }

    #[test]
    fn test_load_rejects_garbage() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.safetensors");
        std::fs::write(&path, b"not a safetensors file").unwrap();

        let err = load_safetensors(&path, &Device::Cpu, DType::F32).unwrap_err();
        assert!(matches!(err, crate::ImaginairyError::WeightsError(_)));
    }
}
