// Quick tour of the Stoat operators: scale a tensor across precisions,
// then run a matmul through each of the three cuBLAS call shapes.
//
// Run with: `cargo run -p stoat-cuda --example gemm_demo`
// Set RUST_LOG=debug to see which call shape each dispatch picks.

use stoat_core::DType;
use stoat_cuda::{CudaDevice, CudaTensor, MatMul, MixedPrecisionScale};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let dev = CudaDevice::new(0)?;

    // Mixed-precision scale: f32 input, f16 output, scalar in device memory.
    let x = CudaTensor::from_f64_slice(&[1.0, 2.0, 3.0, 4.0, 5.0, 6.0], (2, 3), DType::F32, &dev)?;
    let s = CudaTensor::scalar_f32(0.5, &dev)?;
    let scaled = MixedPrecisionScale::new(DType::F16).compute(&x, &s)?;
    println!("scale 0.5 → f16: {:?}", scaled.to_f64_vec()?);

    // Single GEMM: one output slice.
    let a = CudaTensor::from_f64_slice(&[1.0, 2.0, 3.0, 4.0], (2, 2), DType::F32, &dev)?;
    let b = CudaTensor::from_f64_slice(&[5.0, 6.0, 7.0, 8.0], (2, 2), DType::F32, &dev)?;
    let y = MatMul::new().compute(&a, &b)?;
    println!("single gemm: {:?}", y.to_f64_vec()?);

    // Strided-batched: [P, m, k] · [k, n], the right matrix broadcast with
    // stride 0 across all batches.
    let a = CudaTensor::from_f64_slice(&(0..12).map(f64::from).collect::<Vec<_>>(), (3, 2, 2), DType::F32, &dev)?;
    let b = CudaTensor::from_f64_slice(&[1.0, 0.0, 0.0, 1.0], (2, 2), DType::F32, &dev)?;
    let y = MatMul::new().compute(&a, &b)?;
    println!("strided batched (B broadcast): {:?}", y.to_f64_vec()?);

    // Ragged broadcast: batch dims [2, 1] vs [3] force the pointer-array
    // batched form.
    let a = CudaTensor::from_f64_slice(
        &(0..12).map(f64::from).collect::<Vec<_>>(),
        (2, 1, 2, 3),
        DType::F32,
        &dev,
    )?;
    let b = CudaTensor::from_f64_slice(
        &(0..18).map(f64::from).collect::<Vec<_>>(),
        (3, 3, 2),
        DType::F32,
        &dev,
    )?;
    let y = MatMul::new().compute(&a, &b)?;
    println!("pointer batched ({}): {:?}", y.shape(), y.to_f64_vec()?);

    Ok(())
}
