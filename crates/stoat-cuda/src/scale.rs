use cudarc::driver::LaunchAsync;

use stoat_core::error::{Error, Result};
use stoat_core::DType;

use crate::{launch_cfg, CudaDevice, CudaStorage, CudaTensor};

// MixedPrecisionScale — Elementwise scale with independent precisions
//
// out[i] = cast<Dst>(scalar * cast<f32>(inp[i])) for every element. The
// scalar operand is a single-element F32 tensor that stays in device
// memory; the kernel dereferences it there, whatever the input and output
// element types are. Input and output may independently be F16 or F32.
//
// One lane per element, disjoint output slots, no synchronization. An
// empty input launches nothing and succeeds.

/// Elementwise mixed-precision scale operator.
///
/// The output dtype is operator configuration (the target precision),
/// independent of the input's.
#[derive(Debug, Clone)]
pub struct MixedPrecisionScale {
    output_dtype: DType,
}

impl MixedPrecisionScale {
    /// Create a scale operator producing `output_dtype` values.
    pub fn new(output_dtype: DType) -> Self {
        MixedPrecisionScale { output_dtype }
    }

    /// Scale `input` by the single F32 value held in `scale`.
    ///
    /// Writes exactly `input.elem_count()` elements into a fresh output
    /// tensor of the same shape; no other memory is touched.
    pub fn compute(&self, input: &CudaTensor, scale: &CudaTensor) -> Result<CudaTensor> {
        let device = input.device();

        if scale.elem_count() != 1 {
            return Err(Error::ElementCountMismatch {
                shape: scale.shape().clone(),
                expected: 1,
                got: scale.elem_count(),
            });
        }
        // The scalar always lives in device memory as a single f32.
        let scale_slice = match scale.storage() {
            CudaStorage::F32(s) => s,
            other => {
                return Err(Error::DTypeMismatch {
                    expected: DType::F32,
                    got: other.dtype(),
                })
            }
        };

        let n = input.elem_count();
        let cfg = launch_cfg(n);
        let shape = input.shape().clone();

        match (input.storage(), self.output_dtype) {
            (CudaStorage::F32(inp), DType::F32) => {
                let mut out = device.pool_alloc_zeros_f32(n.max(1))?;
                if n > 0 {
                    let func = device.get_func("scale_f32_f32")?;
                    unsafe { func.launch(cfg, (inp, scale_slice, &mut out, n as u32)) }
                        .map_err(|e| Error::msg(format!("scale_f32_f32: {e}")))?;
                }
                Ok(CudaTensor::from_storage(
                    CudaStorage::F32(out),
                    shape,
                    device,
                ))
            }
            (CudaStorage::F32(inp), DType::F16) => {
                let mut out = device.pool_alloc_zeros_u16(n.max(1))?;
                if n > 0 {
                    let func = device.get_func("scale_f32_f16")?;
                    unsafe { func.launch(cfg, (inp, scale_slice, &mut out, n as u32)) }
                        .map_err(|e| Error::msg(format!("scale_f32_f16: {e}")))?;
                }
                Ok(CudaTensor::from_storage(
                    CudaStorage::F16(out),
                    shape,
                    device,
                ))
            }
            (CudaStorage::F16(inp), DType::F32) => {
                let mut out = device.pool_alloc_zeros_f32(n.max(1))?;
                if n > 0 {
                    let func = device.get_func("scale_f16_f32")?;
                    unsafe { func.launch(cfg, (inp, scale_slice, &mut out, n as u32)) }
                        .map_err(|e| Error::msg(format!("scale_f16_f32: {e}")))?;
                }
                Ok(CudaTensor::from_storage(
                    CudaStorage::F32(out),
                    shape,
                    device,
                ))
            }
            (CudaStorage::F16(inp), DType::F16) => {
                let mut out = device.pool_alloc_zeros_u16(n.max(1))?;
                if n > 0 {
                    let func = device.get_func("scale_f16_f16")?;
                    unsafe { func.launch(cfg, (inp, scale_slice, &mut out, n as u32)) }
                        .map_err(|e| Error::msg(format!("scale_f16_f16: {e}")))?;
                }
                Ok(CudaTensor::from_storage(
                    CudaStorage::F16(out),
                    shape,
                    device,
                ))
            }
            (inp, out_dtype) => {
                stoat_core::bail!("scale: unsupported precision pair {} → {}", inp.dtype(), out_dtype)
            }
        }
    }
}
