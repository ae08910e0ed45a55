// CUDA Execution Layer — GPU kernels for Stoat via cudarc
//
// This crate executes the two operators the library exists for: the
// mixed-precision elementwise scale and the batched matrix multiply
// dispatched onto cuBLAS. Shape analysis and call-shape planning live in
// stoat-core; everything here is device bring-up, memory, and the actual
// launches.
//
// ARCHITECTURE:
// - CudaDevice wraps cudarc's device handle + cuBLAS handle + memory pool
// - CudaStorage is an enum over CudaSlice<T> for each supported dtype
// - All tensors are contiguous row-major; kernels use flat indexing
// - Custom kernels are compiled at device creation via NVRTC; cuBLAS
//   handles the matrix multiplies
// - F16 is stored as CudaSlice<u16> and computed via promote-to-F32
//   kernels (portable across all GPU architectures)
//
// USAGE:
//   let device = CudaDevice::new(0)?;  // GPU ordinal 0
//   let x = CudaTensor::from_f64_slice(&vals, (2, 3), DType::F32, &device)?;
//   let y = MatMul::new().compute(&x, &w)?;

mod kernels;
mod matmul;
pub mod pool;
mod scale;
mod tensor;

use cudarc::cublas::CudaBlas;
use cudarc::driver::{CudaSlice, LaunchConfig};
use cudarc::nvrtc::{compile_ptx_with_opts, CompileOptions};
use pool::CudaMemPool;
use std::fmt;
use std::sync::Arc;

use stoat_core::error::{Error, Result};
use stoat_core::DType;

pub use matmul::MatMul;
pub use scale::MixedPrecisionScale;
pub use tensor::CudaTensor;

// CudaDevice — Wraps a cudarc CUDA device + cuBLAS handle

/// A CUDA device handle. Contains the cudarc device, a cuBLAS handle for
/// matrix multiplication, and a caching memory pool. Clonable (uses Arc
/// internally).
pub struct CudaDevice {
    dev: Arc<cudarc::driver::CudaDevice>,
    blas: Arc<CudaBlas>,
    pool: Arc<CudaMemPool>,
    ordinal: usize,
}

impl CudaDevice {
    /// Create a new CUDA device for the given GPU ordinal (0, 1, ...).
    /// Compiles all Stoat CUDA kernels on first creation.
    pub fn new(ordinal: usize) -> Result<Self> {
        let dev = cudarc::driver::CudaDevice::new(ordinal)
            .map_err(|e| Error::msg(format!("CUDA device creation failed: {e}")))?;

        let blas = CudaBlas::new(dev.clone())
            .map_err(|e| Error::msg(format!("cuBLAS init failed: {e}")))?;

        // Compile and load all kernels.
        // Query the device compute capability and target it with NVRTC.
        // Use sm_XX (native SASS) instead of compute_XX (PTX) to avoid
        // PTX version mismatches between toolkit and driver versions.
        let major = dev
            .attribute(cudarc::driver::sys::CUdevice_attribute_enum::CU_DEVICE_ATTRIBUTE_COMPUTE_CAPABILITY_MAJOR)
            .unwrap_or(8);
        let minor = dev
            .attribute(cudarc::driver::sys::CUdevice_attribute_enum::CU_DEVICE_ATTRIBUTE_COMPUTE_CAPABILITY_MINOR)
            .unwrap_or(9);
        let arch_str: &'static str = Box::leak(format!("sm_{major}{minor}").into_boxed_str());
        let opts = CompileOptions {
            arch: Some(arch_str),
            ..Default::default()
        };
        let ptx = compile_ptx_with_opts(kernels::KERNEL_SOURCE, opts)
            .map_err(|e| Error::msg(format!("NVRTC compilation failed: {e}")))?;
        dev.load_ptx(ptx, kernels::MODULE_NAME, kernels::KERNEL_NAMES)
            .map_err(|e| Error::msg(format!("PTX load failed: {e}")))?;

        log::debug!("cuda:{ordinal} ready (sm_{major}{minor}, {} kernels)", kernels::KERNEL_NAMES.len());

        Ok(CudaDevice {
            dev,
            blas: Arc::new(blas),
            pool: Arc::new(CudaMemPool::new()),
            ordinal,
        })
    }

    /// The underlying cudarc device.
    pub fn cuda(&self) -> &Arc<cudarc::driver::CudaDevice> {
        &self.dev
    }

    /// The cuBLAS handle for this device.
    pub fn blas(&self) -> &CudaBlas {
        &self.blas
    }

    /// Get a compiled kernel function by name.
    pub(crate) fn get_func(&self, name: &str) -> Result<cudarc::driver::CudaFunction> {
        self.dev
            .get_func(kernels::MODULE_NAME, name)
            .ok_or_else(|| Error::msg(format!("CUDA kernel '{name}' not found")))
    }

    // ── Memory pool helpers ──────────────────────────────────────────────

    /// Get the memory pool.
    pub fn pool(&self) -> &CudaMemPool {
        &self.pool
    }

    /// Release all cached GPU memory back to the CUDA driver.
    pub fn empty_cache(&self) {
        self.pool.empty_cache();
    }

    /// Return pool statistics (cached bytes, hits, misses, etc.).
    pub fn pool_stats(&self) -> pool::PoolStats {
        self.pool.stats()
    }

    /// Reclaim a CudaStorage buffer into the pool for future reuse.
    pub fn reclaim(&self, storage: CudaStorage) {
        self.pool.reclaim_storage(storage);
    }

    // ── Pool-aware allocation helpers ────────────────────────────────────

    /// Allocate `n` elements from the pool (content undefined).
    pub fn pool_alloc_f32(&self, n: usize) -> Result<CudaSlice<f32>> {
        self.pool
            .alloc_f32(&self.dev, n)
            .map_err(|e| Error::msg(format!("pool alloc f32: {e}")))
    }
    pub fn pool_alloc_f64(&self, n: usize) -> Result<CudaSlice<f64>> {
        self.pool
            .alloc_f64(&self.dev, n)
            .map_err(|e| Error::msg(format!("pool alloc f64: {e}")))
    }
    pub fn pool_alloc_u16(&self, n: usize) -> Result<CudaSlice<u16>> {
        self.pool
            .alloc_u16(&self.dev, n)
            .map_err(|e| Error::msg(format!("pool alloc u16: {e}")))
    }

    /// Allocate `n` elements from the pool, zeroed.
    pub fn pool_alloc_zeros_f32(&self, n: usize) -> Result<CudaSlice<f32>> {
        self.pool
            .alloc_zeros_f32(&self.dev, n)
            .map_err(|e| Error::msg(format!("pool alloc zeros f32: {e}")))
    }
    pub fn pool_alloc_zeros_f64(&self, n: usize) -> Result<CudaSlice<f64>> {
        self.pool
            .alloc_zeros_f64(&self.dev, n)
            .map_err(|e| Error::msg(format!("pool alloc zeros f64: {e}")))
    }
    pub fn pool_alloc_zeros_u16(&self, n: usize) -> Result<CudaSlice<u16>> {
        self.pool
            .alloc_zeros_u16(&self.dev, n)
            .map_err(|e| Error::msg(format!("pool alloc zeros u16: {e}")))
    }
}

impl Clone for CudaDevice {
    fn clone(&self) -> Self {
        CudaDevice {
            dev: self.dev.clone(),
            blas: self.blas.clone(),
            pool: self.pool.clone(),
            ordinal: self.ordinal,
        }
    }
}

impl fmt::Debug for CudaDevice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "CudaDevice(cuda:{})", self.ordinal)
    }
}

// Safety: cudarc's device is thread-safe (CUDA runtime is thread-safe)
unsafe impl Send for CudaDevice {}
unsafe impl Sync for CudaDevice {}

// CudaStorage — Device memory for each supported dtype

/// GPU-side storage. Each variant wraps a cudarc CudaSlice for the
/// corresponding dtype. F16 is stored as CudaSlice<u16> (bit-level
/// representation).
pub enum CudaStorage {
    F16(CudaSlice<u16>),
    F32(CudaSlice<f32>),
    F64(CudaSlice<f64>),
}

impl CudaStorage {
    /// The data type of the elements in this storage.
    pub fn dtype(&self) -> DType {
        match self {
            CudaStorage::F16(_) => DType::F16,
            CudaStorage::F32(_) => DType::F32,
            CudaStorage::F64(_) => DType::F64,
        }
    }
}

impl Clone for CudaStorage {
    fn clone(&self) -> Self {
        match self {
            CudaStorage::F16(s) => CudaStorage::F16(s.clone()),
            CudaStorage::F32(s) => CudaStorage::F32(s.clone()),
            CudaStorage::F64(s) => CudaStorage::F64(s.clone()),
        }
    }
}

impl fmt::Debug for CudaStorage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        use cudarc::driver::DeviceSlice;
        match self {
            CudaStorage::F16(s) => write!(f, "CudaStorage::F16(len={})", s.len()),
            CudaStorage::F32(s) => write!(f, "CudaStorage::F32(len={})", s.len()),
            CudaStorage::F64(s) => write!(f, "CudaStorage::F64(len={})", s.len()),
        }
    }
}

unsafe impl Send for CudaStorage {}
unsafe impl Sync for CudaStorage {}

// Helpers

/// Standard CUDA launch configuration for N elements.
pub(crate) fn launch_cfg(n: usize) -> LaunchConfig {
    const BLOCK: u32 = 256;
    let grid = (n as u32).div_ceil(BLOCK);
    LaunchConfig {
        block_dim: (BLOCK, 1, 1),
        grid_dim: (grid.max(1), 1, 1),
        shared_mem_bytes: 0,
    }
}
