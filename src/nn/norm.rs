//! Group and layer normalization.

use candle_core::{DType, Module, Tensor};
use candle_nn::VarBuilder;

/// Default epsilon for both norms
pub const DEFAULT_EPS: f64 = 1e-5;

/// Group normalization over `[N, C, ...]` inputs.
///
/// `weight` and `bias` are cast to the input dtype when they differ, so f32
/// parameters can be used with half precision activations. Statistics are
/// computed in f32 and the result comes back in the input dtype.
pub fn group_norm(
    input: &Tensor,
    num_groups: usize,
    weight: Option<&Tensor>,
    bias: Option<&Tensor>,
    eps: f64,
) -> crate::Result<Tensor> {
    let dims = input.dims().to_vec();
    if dims.len() < 2 {
        return Err(crate::ImaginairyError::ShapeError(format!(
            "group_norm expects at least 2 dims, got {:?}",
            dims
        )));
    }
    let (batch, channels) = (dims[0], dims[1]);
    if num_groups == 0 || channels % num_groups != 0 {
        return Err(crate::ImaginairyError::ShapeError(format!(
            "{} channels cannot be split into {} groups",
            channels, num_groups
        )));
    }

    if input.elem_count() == 0 {
        return Ok(input.clone());
    }

    let in_dtype = input.dtype();
    let group_len = input.elem_count() / (batch * num_groups);

    let x = input
        .to_dtype(DType::F32)?
        .reshape((batch, num_groups, group_len))?;
    let normed = normalize_last_dim(&x, eps)?
        .reshape(dims.as_slice())?
        .to_dtype(in_dtype)?;

    // [C] -> [1, C, 1, ...] so parameters broadcast over the spatial dims
    let mut param_shape = vec![1usize; dims.len()];
    param_shape[1] = channels;

    let mut out = normed;
    if let Some(weight) = weight {
        let weight = match_dtype(weight, in_dtype)?.reshape(param_shape.as_slice())?;
        out = out.broadcast_mul(&weight)?;
    }
    if let Some(bias) = bias {
        let bias = match_dtype(bias, in_dtype)?.reshape(param_shape.as_slice())?;
        out = out.broadcast_add(&bias)?;
    }
    Ok(out)
}

/// Layer normalization over the trailing `normalized_shape` dims.
///
/// The input is made contiguous first; transposed or narrowed views are fine.
pub fn layer_norm(
    input: &Tensor,
    normalized_shape: &[usize],
    weight: Option<&Tensor>,
    bias: Option<&Tensor>,
    eps: f64,
) -> crate::Result<Tensor> {
    let dims = input.dims().to_vec();
    if normalized_shape.is_empty()
        || normalized_shape.len() > dims.len()
        || dims[dims.len() - normalized_shape.len()..] != *normalized_shape
    {
        return Err(crate::ImaginairyError::ShapeError(format!(
            "normalized_shape {:?} does not match trailing dims of {:?}",
            normalized_shape, dims
        )));
    }

    if input.elem_count() == 0 {
        return Ok(input.clone());
    }

    let in_dtype = input.dtype();
    let norm_len: usize = normalized_shape.iter().product();
    let lead = input.elem_count() / norm_len;

    let x = input
        .contiguous()?
        .to_dtype(DType::F32)?
        .reshape((lead, norm_len))?;
    let mut out = normalize_last_dim(&x, eps)?
        .reshape(dims.as_slice())?
        .to_dtype(in_dtype)?;

    if let Some(weight) = weight {
        out = out.broadcast_mul(&match_dtype(weight, in_dtype)?)?;
    }
    if let Some(bias) = bias {
        out = out.broadcast_add(&match_dtype(bias, in_dtype)?)?;
    }
    Ok(out)
}

fn normalize_last_dim(x: &Tensor, eps: f64) -> candle_core::Result<Tensor> {
    let last = x.rank() - 1;
    let mean = x.mean_keepdim(last)?;
    let centered = x.broadcast_sub(&mean)?;
    let var = centered.sqr()?.mean_keepdim(last)?;
    centered.broadcast_div(&(var + eps)?.sqrt()?)
}

fn match_dtype(param: &Tensor, dtype: DType) -> candle_core::Result<Tensor> {
    if param.dtype() == dtype {
        Ok(param.clone())
    } else {
        param.to_dtype(dtype)
    }
}

/// Group norm layer with optional affine parameters
#[derive(Debug, Clone)]
pub struct GroupNorm {
    weight: Option<Tensor>,
    bias: Option<Tensor>,
    num_groups: usize,
    eps: f64,
}

impl GroupNorm {
    pub fn new(weight: Option<Tensor>, bias: Option<Tensor>, num_groups: usize, eps: f64) -> Self {
        Self {
            weight,
            bias,
            num_groups,
            eps,
        }
    }

    /// Load `weight` and `bias` of shape `[num_channels]` from a var builder
    pub fn load(
        vb: VarBuilder,
        num_channels: usize,
        num_groups: usize,
        eps: f64,
    ) -> crate::Result<Self> {
        let weight = vb.get(num_channels, "weight")?;
        let bias = vb.get(num_channels, "bias")?;
        Ok(Self::new(Some(weight), Some(bias), num_groups, eps))
    }

    pub fn num_groups(&self) -> usize {
        self.num_groups
    }
}

impl Module for GroupNorm {
    fn forward(&self, xs: &Tensor) -> candle_core::Result<Tensor> {
        group_norm(
            xs,
            self.num_groups,
            self.weight.as_ref(),
            self.bias.as_ref(),
            self.eps,
        )
        .map_err(|e| candle_core::Error::Msg(e.to_string()))
    }
}

/// Layer norm layer with optional affine parameters
#[derive(Debug, Clone)]
pub struct LayerNorm {
    weight: Option<Tensor>,
    bias: Option<Tensor>,
    normalized_shape: Vec<usize>,
    eps: f64,
}

impl LayerNorm {
    pub fn new(
        weight: Option<Tensor>,
        bias: Option<Tensor>,
        normalized_shape: Vec<usize>,
        eps: f64,
    ) -> Self {
        Self {
            weight,
            bias,
            normalized_shape,
            eps,
        }
    }

    /// Load `weight` and `bias` of shape `[hidden]` from a var builder
    pub fn load(vb: VarBuilder, hidden: usize, eps: f64) -> crate::Result<Self> {
        let weight = vb.get(hidden, "weight")?;
        let bias = vb.get(hidden, "bias")?;
        Ok(Self::new(Some(weight), Some(bias), vec![hidden], eps))
    }
}

impl Module for LayerNorm {
    fn forward(&self, xs: &Tensor) -> candle_core::Result<Tensor> {
        layer_norm(
            xs,
            &self.normalized_shape,
            self.weight.as_ref(),
            self.bias.as_ref(),
            self.eps,
        )
        .map_err(|e| candle_core::Error::Msg(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use candle_core::Device;
    use std::collections::HashMap;

    fn ramp(shape: &[usize]) -> Tensor {
        let n: usize = shape.iter().product();
        let data: Vec<f32> = (0..n)
            .map(|i| (i as f32 * 0.37).sin() * 3.0 + i as f32 * 0.1)
            .collect();
        Tensor::from_vec(data, shape, &Device::Cpu).unwrap()
    }

    #[test]
    fn test_group_norm_normalizes_each_group() {
        let x = ramp(&[2, 4, 3, 3]);
        let out = group_norm(&x, 2, None, None, DEFAULT_EPS).unwrap();
        assert_eq!(out.dims(), &[2, 4, 3, 3]);

        let grouped = out.reshape((2, 2, 18)).unwrap();
        let means: Vec<Vec<f32>> = grouped.mean(2).unwrap().to_vec2().unwrap();
        let vars: Vec<Vec<f32>> = grouped.sqr().unwrap().mean(2).unwrap().to_vec2().unwrap();
        for (m, v) in means.iter().flatten().zip(vars.iter().flatten()) {
            assert!(m.abs() < 1e-4, "mean {}", m);
            assert!((v - 1.0).abs() < 1e-3, "var {}", v);
        }
    }

    #[test]
    fn test_group_norm_casts_params_to_input_dtype() {
        let x = ramp(&[1, 4, 2, 2]).to_dtype(DType::F16).unwrap();
        let weight = Tensor::new(&[1.0f32, 2.0, 1.0, 2.0], &Device::Cpu).unwrap();
        let bias = Tensor::new(&[0.0f32, 0.5, 0.0, 0.5], &Device::Cpu).unwrap();

        let out = group_norm(&x, 2, Some(&weight), Some(&bias), DEFAULT_EPS).unwrap();
        assert_eq!(out.dtype(), DType::F16);
        assert_eq!(out.dims(), &[1, 4, 2, 2]);
    }

    #[test]
    fn test_group_norm_rejects_uneven_groups() {
        let x = ramp(&[1, 6, 2, 2]);
        assert!(group_norm(&x, 4, None, None, DEFAULT_EPS).is_err());
        assert!(group_norm(&x, 0, None, None, DEFAULT_EPS).is_err());
    }

    #[test]
    fn test_group_norm_empty_input() {
        let x = Tensor::zeros((0, 4, 2, 2), DType::F32, &Device::Cpu).unwrap();
        let weight = Tensor::ones(4, DType::F32, &Device::Cpu).unwrap();
        let out = group_norm(&x, 2, Some(&weight), None, DEFAULT_EPS).unwrap();
        assert_eq!(out.dims(), &[0, 4, 2, 2]);

        let spatial = Tensor::zeros((1, 4, 0, 3), DType::F16, &Device::Cpu).unwrap();
        let out = group_norm(&spatial, 4, None, None, DEFAULT_EPS).unwrap();
        assert_eq!(out.dims(), &[1, 4, 0, 3]);
        assert_eq!(out.dtype(), DType::F16);
    }

    #[test]
    fn test_layer_norm_empty_input() {
        let x = Tensor::zeros((2, 0), DType::F32, &Device::Cpu).unwrap();
        let out = layer_norm(&x, &[0], None, None, DEFAULT_EPS).unwrap();
        assert_eq!(out.dims(), &[2, 0]);

        let no_rows = Tensor::zeros((0, 4), DType::F32, &Device::Cpu).unwrap();
        let out = layer_norm(&no_rows, &[4], None, None, DEFAULT_EPS).unwrap();
        assert_eq!(out.dims(), &[0, 4]);
    }

    #[test]
    fn test_layer_norm_handles_strided_input() {
        let x = ramp(&[3, 5]);
        let strided = x.t().unwrap();
        assert!(!strided.is_contiguous());

        let from_view = layer_norm(&strided, &[3], None, None, DEFAULT_EPS).unwrap();
        let copy = strided.contiguous().unwrap();
        let from_copy = layer_norm(&copy, &[3], None, None, DEFAULT_EPS).unwrap();

        let a: Vec<Vec<f32>> = from_view.to_vec2().unwrap();
        let b: Vec<Vec<f32>> = from_copy.to_vec2().unwrap();
        assert_eq!(a, b);
        for row in &a {
            let mean: f32 = row.iter().sum::<f32>() / row.len() as f32;
            assert!(mean.abs() < 1e-4);
        }
    }

    #[test]
    fn test_layer_norm_affine() {
        let x = ramp(&[2, 4]);
        let weight = Tensor::new(&[2.0f32; 4], &Device::Cpu).unwrap();
        let bias = Tensor::new(&[1.0f32; 4], &Device::Cpu).unwrap();

        let plain: Vec<Vec<f32>> = layer_norm(&x, &[4], None, None, DEFAULT_EPS)
            .unwrap()
            .to_vec2()
            .unwrap();
        let affine: Vec<Vec<f32>> = layer_norm(&x, &[4], Some(&weight), Some(&bias), DEFAULT_EPS)
            .unwrap()
            .to_vec2()
            .unwrap();

        for (p, a) in plain.iter().flatten().zip(affine.iter().flatten()) {
            assert!((p * 2.0 + 1.0 - a).abs() < 1e-5);
        }
    }

    #[test]
    fn test_layer_norm_shape_mismatch() {
        let x = ramp(&[2, 4]);
        assert!(layer_norm(&x, &[3], None, None, DEFAULT_EPS).is_err());
        assert!(layer_norm(&x, &[], None, None, DEFAULT_EPS).is_err());
    }

    #[test]
    fn test_modules_load_from_var_builder() {
        let ones = Tensor::ones(4, DType::F32, &Device::Cpu).unwrap();
        let zeros = Tensor::zeros(4, DType::F32, &Device::Cpu).unwrap();
        let mut tensors = HashMap::new();
        tensors.insert("gn.weight".to_string(), ones.clone());
        tensors.insert("gn.bias".to_string(), zeros.clone());
        tensors.insert("ln.weight".to_string(), ones);
        tensors.insert("ln.bias".to_string(), zeros);
        let vb = VarBuilder::from_tensors(tensors, DType::F32, &Device::Cpu);

        let gn = GroupNorm::load(vb.pp("gn"), 4, 2, DEFAULT_EPS).unwrap();
        assert_eq!(gn.num_groups(), 2);
        let out = gn.forward(&ramp(&[1, 4, 2, 2])).unwrap();
        assert_eq!(out.dims(), &[1, 4, 2, 2]);

        let ln = LayerNorm::load(vb.pp("ln"), 4, DEFAULT_EPS).unwrap();
        let out = ln.forward(&ramp(&[3, 4])).unwrap();
        assert_eq!(out.dims(), &[3, 4]);
    }
}
