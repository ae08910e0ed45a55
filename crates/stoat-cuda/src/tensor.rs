use half::f16;

use stoat_core::error::{Error, Result};
use stoat_core::{DType, Shape};

use crate::{CudaDevice, CudaStorage};

// CudaTensor — A contiguous row-major device array
//
// Tensors own their device buffer; operators borrow them for the duration
// of one call and allocate fresh storage for their outputs. There are no
// views or strides — every tensor is contiguous, which keeps the kernels
// at flat indexing and lets cuBLAS consume the buffers directly.
//
// Empty tensors (any zero dimension) are backed by a 1-element buffer
// because the driver rejects zero-byte allocations; the logical element
// count always comes from the shape.

/// An n-dimensional array on a CUDA device.
#[derive(Debug, Clone)]
pub struct CudaTensor {
    storage: CudaStorage,
    shape: Shape,
    device: CudaDevice,
}

impl CudaTensor {
    /// Build a tensor from already-allocated storage. The storage must hold
    /// at least `shape.elem_count()` elements.
    pub(crate) fn from_storage(storage: CudaStorage, shape: Shape, device: &CudaDevice) -> Self {
        CudaTensor {
            storage,
            shape,
            device: device.clone(),
        }
    }

    /// Create a zero-filled tensor of the given shape and dtype.
    pub fn zeros(shape: impl Into<Shape>, dtype: DType, device: &CudaDevice) -> Result<Self> {
        let shape = shape.into();
        // cuMemAlloc rejects zero-byte requests; keep one element for
        // empty tensors and report length from the shape.
        let n = shape.elem_count().max(1);
        let storage = match dtype {
            DType::F16 => CudaStorage::F16(device.pool_alloc_zeros_u16(n)?),
            DType::F32 => CudaStorage::F32(device.pool_alloc_zeros_f32(n)?),
            DType::F64 => CudaStorage::F64(device.pool_alloc_zeros_f64(n)?),
        };
        Ok(Self::from_storage(storage, shape, device))
    }

    /// Create a tensor from host data, converting each value to `dtype`.
    pub fn from_f64_slice(
        data: &[f64],
        shape: impl Into<Shape>,
        dtype: DType,
        device: &CudaDevice,
    ) -> Result<Self> {
        let shape = shape.into();
        let n = shape.elem_count();
        if data.len() != n {
            return Err(Error::ElementCountMismatch {
                shape,
                expected: n,
                got: data.len(),
            });
        }
        if n == 0 {
            return Self::zeros(shape, dtype, device);
        }
        let storage = match dtype {
            DType::F16 => {
                let host: Vec<u16> = data.iter().map(|&v| f16::from_f64(v).to_bits()).collect();
                let s = device
                    .cuda()
                    .htod_copy(host)
                    .map_err(|e| Error::msg(format!("htod f16: {e}")))?;
                CudaStorage::F16(s)
            }
            DType::F32 => {
                let host: Vec<f32> = data.iter().map(|&v| v as f32).collect();
                let s = device
                    .cuda()
                    .htod_copy(host)
                    .map_err(|e| Error::msg(format!("htod f32: {e}")))?;
                CudaStorage::F32(s)
            }
            DType::F64 => {
                let s = device
                    .cuda()
                    .htod_copy(data.to_vec())
                    .map_err(|e| Error::msg(format!("htod f64: {e}")))?;
                CudaStorage::F64(s)
            }
        };
        Ok(Self::from_storage(storage, shape, device))
    }

    /// Create a single-element F32 tensor (the form the scale operator's
    /// scalar operand takes).
    pub fn scalar_f32(value: f32, device: &CudaDevice) -> Result<Self> {
        Self::from_f64_slice(&[value as f64], 1, DType::F32, device)
    }

    pub fn shape(&self) -> &Shape {
        &self.shape
    }

    pub fn dims(&self) -> &[usize] {
        self.shape.dims()
    }

    pub fn dtype(&self) -> DType {
        self.storage.dtype()
    }

    pub fn elem_count(&self) -> usize {
        self.shape.elem_count()
    }

    pub fn device(&self) -> &CudaDevice {
        &self.device
    }

    pub(crate) fn storage(&self) -> &CudaStorage {
        &self.storage
    }

    /// Copy the tensor back to host memory as f64 values.
    pub fn to_f64_vec(&self) -> Result<Vec<f64>> {
        let n = self.elem_count();
        let mut host = match &self.storage {
            CudaStorage::F16(s) => {
                let bits = self
                    .device
                    .cuda()
                    .dtoh_sync_copy(s)
                    .map_err(|e| Error::msg(format!("dtoh f16: {e}")))?;
                bits.iter()
                    .map(|&b| f16::from_bits(b).to_f64())
                    .collect::<Vec<f64>>()
            }
            CudaStorage::F32(s) => {
                let vals = self
                    .device
                    .cuda()
                    .dtoh_sync_copy(s)
                    .map_err(|e| Error::msg(format!("dtoh f32: {e}")))?;
                vals.iter().map(|&v| v as f64).collect()
            }
            CudaStorage::F64(s) => self
                .device
                .cuda()
                .dtoh_sync_copy(s)
                .map_err(|e| Error::msg(format!("dtoh f64: {e}")))?,
        };
        // The backing buffer of an empty tensor holds one element.
        host.truncate(n);
        Ok(host)
    }
}
