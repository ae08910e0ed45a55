use cudarc::cublas::sys as cublas_sys;
use cudarc::cublas::{Gemm, GemmConfig, StridedBatchedConfig};
use cudarc::driver::{CudaSlice, DevicePtr, LaunchAsync};

use stoat_core::error::{Error, Result};
use stoat_core::{GemmPlan, GemmStrategy, MatmulDims};

use crate::{launch_cfg, CudaDevice, CudaStorage, CudaTensor};

// MatMul — Batched matrix multiply dispatched onto cuBLAS
//
// One dispatch is: shape analysis (stoat-core) → empty-output early exit →
// call-shape triage (stoat-core) → exactly one cuBLAS invocation. The
// three call shapes are:
//
//   Single         → cublas<T>gemm
//   StridedBatched → cublas<T>gemmStridedBatched
//   PointerBatched → cublas<T>gemmBatched over staged device pointer arrays
//
// Tensor storage is row-major while cuBLAS is column-major, so every call
// swaps the two operands and their transpose flags: left×right is issued
// as right×left with m/n swapped. This is a fixed convention, not an
// optimization.
//
// F32 and F64 run natively. F16 operands are promoted to F32 on device,
// run through the identical triage, and the result is demoted back.

/// Batched matrix multiply operator.
///
/// Transpose flags apply to the trailing two dimensions of each operand
/// (and are ignored for 1-D operands). `alpha` scales the product; the
/// output always accumulates onto zero.
#[derive(Debug, Clone)]
pub struct MatMul {
    trans_a: bool,
    trans_b: bool,
    alpha: f32,
}

impl MatMul {
    /// Plain `left @ right` with `alpha = 1`.
    pub fn new() -> Self {
        MatMul {
            trans_a: false,
            trans_b: false,
            alpha: 1.0,
        }
    }

    /// Set the operand transpose flags.
    pub fn with_transpose(mut self, trans_a: bool, trans_b: bool) -> Self {
        self.trans_a = trans_a;
        self.trans_b = trans_b;
        self
    }

    /// Set the scalar the product is scaled by.
    pub fn with_alpha(mut self, alpha: f32) -> Self {
        self.alpha = alpha;
        self
    }

    /// Multiply `left` by `right` into a freshly allocated output tensor.
    pub fn compute(&self, left: &CudaTensor, right: &CudaTensor) -> Result<CudaTensor> {
        let device = left.device();

        if left.dtype() != right.dtype() {
            return Err(Error::DTypeMismatch {
                expected: left.dtype(),
                got: right.dtype(),
            });
        }

        let dims = MatmulDims::compute(left.shape(), right.shape(), self.trans_a, self.trans_b)?;
        let out_shape = dims.output_shape().clone();

        // Bail out early if the output is going to be empty
        if out_shape.elem_count() == 0 {
            return CudaTensor::zeros(out_shape, left.dtype(), device);
        }

        let plan = GemmPlan::choose(left.shape(), right.shape(), &dims);
        log::debug!(
            "matmul {} @ {} → {:?} (m={} n={} k={})",
            left.shape(),
            right.shape(),
            plan.strategy,
            plan.m,
            plan.n,
            plan.k
        );

        let n_out = out_shape.elem_count();
        match (left.storage(), right.storage()) {
            (CudaStorage::F32(a), CudaStorage::F32(b)) => {
                let mut out = device.pool_alloc_zeros_f32(n_out)?;
                dispatch_f32(device, &plan, &dims, a, b, &mut out, self.alpha)?;
                Ok(CudaTensor::from_storage(
                    CudaStorage::F32(out),
                    out_shape,
                    device,
                ))
            }
            (CudaStorage::F64(a), CudaStorage::F64(b)) => {
                let mut out = device.pool_alloc_zeros_f64(n_out)?;
                dispatch_f64(device, &plan, &dims, a, b, &mut out, self.alpha as f64)?;
                Ok(CudaTensor::from_storage(
                    CudaStorage::F64(out),
                    out_shape,
                    device,
                ))
            }
            (CudaStorage::F16(a), CudaStorage::F16(b)) => {
                // Promote F16 → F32, run the identical triage, demote back.
                let n_a = left.elem_count();
                let n_b = right.elem_count();

                let mut a_f32 = device.pool_alloc_f32(n_a.max(1))?;
                if n_a > 0 {
                    let func = device.get_func("cast_f16_to_f32")?;
                    unsafe { func.launch(launch_cfg(n_a), (a, &mut a_f32, n_a as u32)) }
                        .map_err(|e| Error::msg(format!("cast_f16_to_f32: {e}")))?;
                }
                let mut b_f32 = device.pool_alloc_f32(n_b.max(1))?;
                if n_b > 0 {
                    let func = device.get_func("cast_f16_to_f32")?;
                    unsafe { func.launch(launch_cfg(n_b), (b, &mut b_f32, n_b as u32)) }
                        .map_err(|e| Error::msg(format!("cast_f16_to_f32: {e}")))?;
                }

                let mut out_f32 = device.pool_alloc_zeros_f32(n_out)?;
                dispatch_f32(device, &plan, &dims, &a_f32, &b_f32, &mut out_f32, self.alpha)?;

                let mut out = device.pool_alloc_zeros_u16(n_out)?;
                let func = device.get_func("cast_f32_to_f16")?;
                unsafe { func.launch(launch_cfg(n_out), (&out_f32, &mut out, n_out as u32)) }
                    .map_err(|e| Error::msg(format!("cast_f32_to_f16: {e}")))?;

                // Scratch is stream-ordered behind the kernels that read it,
                // so it can go straight back to the pool.
                device.pool().reclaim_f32(a_f32);
                device.pool().reclaim_f32(b_f32);
                device.pool().reclaim_f32(out_f32);

                Ok(CudaTensor::from_storage(
                    CudaStorage::F16(out),
                    out_shape,
                    device,
                ))
            }
            _ => stoat_core::bail!(
                "matmul: unsupported dtype pair {} @ {}",
                left.dtype(),
                right.dtype()
            ),
        }
    }
}

impl Default for MatMul {
    fn default() -> Self {
        Self::new()
    }
}

fn cu_op(trans: bool) -> cublas_sys::cublasOperation_t {
    if trans {
        cublas_sys::cublasOperation_t::CUBLAS_OP_T
    } else {
        cublas_sys::cublasOperation_t::CUBLAS_OP_N
    }
}

fn cublas_check(status: cublas_sys::cublasStatus_t, what: &str) -> Result<()> {
    if status == cublas_sys::cublasStatus_t::CUBLAS_STATUS_SUCCESS {
        Ok(())
    } else {
        Err(Error::msg(format!("cuBLAS {what} failed: {status:?}")))
    }
}

/// Device addresses of each batch slice: base pointer + element offset.
fn slice_pointers<T>(slice: &CudaSlice<T>, offsets: &[usize]) -> Vec<u64> {
    let base = *slice.device_ptr();
    let elem = std::mem::size_of::<T>() as u64;
    offsets.iter().map(|&o| base + o as u64 * elem).collect()
}

fn dispatch_f32(
    device: &CudaDevice,
    plan: &GemmPlan,
    dims: &MatmulDims,
    a: &CudaSlice<f32>,
    b: &CudaSlice<f32>,
    out: &mut CudaSlice<f32>,
    alpha: f32,
) -> Result<()> {
    // Row-major storage, column-major cuBLAS: the right operand becomes
    // cuBLAS's A, the left becomes its B, and m/n swap.
    let gemm = GemmConfig {
        transa: cu_op(plan.trans_b),
        transb: cu_op(plan.trans_a),
        m: plan.n as i32,
        n: plan.m as i32,
        k: plan.k as i32,
        alpha,
        lda: plan.ldb,
        ldb: plan.lda,
        beta: 0.0f32,
        ldc: plan.ldc,
    };

    match plan.strategy {
        GemmStrategy::Single => unsafe { device.blas().gemm(gemm, b, a, out) }
            .map_err(|e| Error::msg(format!("cuBLAS sgemm: {e}"))),
        GemmStrategy::StridedBatched {
            batch,
            stride_a,
            stride_b,
            stride_c,
        } => {
            let cfg = StridedBatchedConfig {
                gemm,
                batch_size: batch as i32,
                // The operand swap applies to the strides as well.
                stride_a: stride_b as i64,
                stride_b: stride_a as i64,
                stride_c: stride_c as i64,
            };
            unsafe { device.blas().gemm_strided_batched(cfg, b, a, out) }
                .map_err(|e| Error::msg(format!("cuBLAS sgemm strided batched: {e}")))
        }
        GemmStrategy::PointerBatched { batch } => {
            // Stage per-slice pointer arrays in device memory. cuBLAS runs
            // on the same stream as the copies, so the staging completes
            // before the batched call reads it; the staged buffers are
            // dropped when this dispatch returns.
            let a_dev = device
                .cuda()
                .htod_copy(slice_pointers(a, dims.left_offsets()))
                .map_err(|e| Error::msg(format!("htod left pointer array: {e}")))?;
            let b_dev = device
                .cuda()
                .htod_copy(slice_pointers(b, dims.right_offsets()))
                .map_err(|e| Error::msg(format!("htod right pointer array: {e}")))?;
            let c_dev = device
                .cuda()
                .htod_copy(slice_pointers(out, dims.output_offsets()))
                .map_err(|e| Error::msg(format!("htod output pointer array: {e}")))?;

            let beta = 0.0f32;
            let status = unsafe {
                cublas_sys::lib().cublasSgemmBatched(
                    *device.blas().handle(),
                    cu_op(plan.trans_b),
                    cu_op(plan.trans_a),
                    plan.n as i32,
                    plan.m as i32,
                    plan.k as i32,
                    &alpha as *const f32,
                    *b_dev.device_ptr() as *const *const f32,
                    plan.ldb,
                    *a_dev.device_ptr() as *const *const f32,
                    plan.lda,
                    &beta as *const f32,
                    *c_dev.device_ptr() as *const *mut f32,
                    plan.ldc,
                    batch as i32,
                )
            };
            cublas_check(status, "sgemm batched")
        }
    }
}

fn dispatch_f64(
    device: &CudaDevice,
    plan: &GemmPlan,
    dims: &MatmulDims,
    a: &CudaSlice<f64>,
    b: &CudaSlice<f64>,
    out: &mut CudaSlice<f64>,
    alpha: f64,
) -> Result<()> {
    let gemm = GemmConfig {
        transa: cu_op(plan.trans_b),
        transb: cu_op(plan.trans_a),
        m: plan.n as i32,
        n: plan.m as i32,
        k: plan.k as i32,
        alpha,
        lda: plan.ldb,
        ldb: plan.lda,
        beta: 0.0f64,
        ldc: plan.ldc,
    };

    match plan.strategy {
        GemmStrategy::Single => unsafe { device.blas().gemm(gemm, b, a, out) }
            .map_err(|e| Error::msg(format!("cuBLAS dgemm: {e}"))),
        GemmStrategy::StridedBatched {
            batch,
            stride_a,
            stride_b,
            stride_c,
        } => {
            let cfg = StridedBatchedConfig {
                gemm,
                batch_size: batch as i32,
                stride_a: stride_b as i64,
                stride_b: stride_a as i64,
                stride_c: stride_c as i64,
            };
            unsafe { device.blas().gemm_strided_batched(cfg, b, a, out) }
                .map_err(|e| Error::msg(format!("cuBLAS dgemm strided batched: {e}")))
        }
        GemmStrategy::PointerBatched { batch } => {
            let a_dev = device
                .cuda()
                .htod_copy(slice_pointers(a, dims.left_offsets()))
                .map_err(|e| Error::msg(format!("htod left pointer array: {e}")))?;
            let b_dev = device
                .cuda()
                .htod_copy(slice_pointers(b, dims.right_offsets()))
                .map_err(|e| Error::msg(format!("htod right pointer array: {e}")))?;
            let c_dev = device
                .cuda()
                .htod_copy(slice_pointers(out, dims.output_offsets()))
                .map_err(|e| Error::msg(format!("htod output pointer array: {e}")))?;

            let beta = 0.0f64;
            let status = unsafe {
                cublas_sys::lib().cublasDgemmBatched(
                    *device.blas().handle(),
                    cu_op(plan.trans_b),
                    cu_op(plan.trans_a),
                    plan.n as i32,
                    plan.m as i32,
                    plan.k as i32,
                    &alpha as *const f64,
                    *b_dev.device_ptr() as *const *const f64,
                    plan.ldb,
                    *a_dev.device_ptr() as *const *const f64,
                    plan.lda,
                    &beta as *const f64,
                    *c_dev.device_ptr() as *const *mut f64,
                    plan.ldc,
                    batch as i32,
                )
            };
            cublas_check(status, "dgemm batched")
        }
    }
}
