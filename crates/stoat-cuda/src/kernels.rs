// CUDA Kernel Source Code — Compiled to PTX at runtime via NVRTC
//
// All CUDA kernels for the Stoat execution layer live here as one string
// constant. They are compiled once when a CudaDevice is created, and
// cached in the device.
//
// DESIGN DECISIONS:
// - All data is contiguous; every kernel uses flat indexing with one
//   bounds guard per thread
// - cuBLAS handles matmul (not a custom kernel); the cast kernels feed its
//   half-precision promote/demote path
// - The scale kernels read their scalar through a device pointer — the
//   scalar always lives in device memory as a single f32, whatever the
//   input/output element types are
// - F16 conversions use inline PTX assembly; F16 data is stored as
//   unsigned short (u16) on device

/// All kernel source code in one compilation unit.
/// Scale kernels are suffixed by input and output dtype (_f16_f32 reads
/// f16 and writes f32); cast kernels by source and target dtype.
pub const KERNEL_SOURCE: &str = r#"

//  F16 CONVERSION HELPERS
//
// F16 ↔ F32: Uses inline PTX assembly (cvt.f32.f16 / cvt.rn.f16.f32).
// All F16 data is stored as unsigned short (u16) on device.

__device__ __forceinline__ float f16_to_f32(unsigned short h) {
    float f;
    asm("{ cvt.f32.f16 %0, %1; }" : "=f"(f) : "h"(h));
    return f;
}

__device__ __forceinline__ unsigned short f32_to_f16(float f) {
    unsigned short h;
    asm("{ cvt.rn.f16.f32 %0, %1; }" : "=h"(h) : "f"(f));
    return h;
}

//  MIXED-PRECISION SCALE
//
// out[i] = cast<Dst>(*scale * cast<float>(inp[i]))
// The scalar is dereferenced on device; arithmetic is always f32.

extern "C" __global__ void scale_f32_f32(const float* inp, const float* scale, float* out, unsigned int n) {
    unsigned int idx = blockIdx.x * blockDim.x + threadIdx.x;
    if (idx < n) out[idx] = *scale * inp[idx];
}

extern "C" __global__ void scale_f32_f16(const float* inp, const float* scale, unsigned short* out, unsigned int n) {
    unsigned int idx = blockIdx.x * blockDim.x + threadIdx.x;
    if (idx < n) out[idx] = f32_to_f16(*scale * inp[idx]);
}

extern "C" __global__ void scale_f16_f32(const unsigned short* inp, const float* scale, float* out, unsigned int n) {
    unsigned int idx = blockIdx.x * blockDim.x + threadIdx.x;
    if (idx < n) out[idx] = *scale * f16_to_f32(inp[idx]);
}

extern "C" __global__ void scale_f16_f16(const unsigned short* inp, const float* scale, unsigned short* out, unsigned int n) {
    unsigned int idx = blockIdx.x * blockDim.x + threadIdx.x;
    if (idx < n) out[idx] = f32_to_f16(*scale * f16_to_f32(inp[idx]));
}

//  CAST
//
// Promote/demote between F16 storage and F32 compute buffers. The matmul
// half-precision path promotes both operands, runs the F32 GEMM, and
// demotes the result.

extern "C" __global__ void cast_f16_to_f32(const unsigned short* inp, float* out, unsigned int n) {
    unsigned int idx = blockIdx.x * blockDim.x + threadIdx.x;
    if (idx < n) out[idx] = f16_to_f32(inp[idx]);
}

extern "C" __global__ void cast_f32_to_f16(const float* inp, unsigned short* out, unsigned int n) {
    unsigned int idx = blockIdx.x * blockDim.x + threadIdx.x;
    if (idx < n) out[idx] = f32_to_f16(inp[idx]);
}
"#;

/// Names of all kernels in KERNEL_SOURCE (needed for PTX loading).
pub const KERNEL_NAMES: &[&str] = &[
    // scale
    "scale_f32_f32",
    "scale_f32_f16",
    "scale_f16_f32",
    "scale_f16_f16",
    // cast
    "cast_f16_to_f32",
    "cast_f32_to_f16",
];

/// Module name used in cudarc's PTX loading.
pub const MODULE_NAME: &str = "stoat_kernels";
