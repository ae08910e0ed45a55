// MatMul Dispatcher Tests — all three cuBLAS call shapes vs. a host reference
//
// Run with: `cargo test -p stoat-cuda`
// Tests skip (and say so) when no CUDA device is available.

#[cfg(test)]
mod tests {
    use stoat_core::{DType, MatmulDims, Shape};
    use stoat_cuda::{CudaDevice, CudaTensor, MatMul};

    fn gpu() -> Option<CudaDevice> {
        match CudaDevice::new(0) {
            Ok(dev) => Some(dev),
            Err(e) => {
                eprintln!("skipping: CUDA device 0 not available ({e})");
                None
            }
        }
    }

    fn assert_approx_vec(actual: &[f64], expected: &[f64], tol: f64) {
        assert_eq!(
            actual.len(),
            expected.len(),
            "length mismatch: {} vs {}",
            actual.len(),
            expected.len()
        );
        for (i, (a, e)) in actual.iter().zip(expected.iter()).enumerate() {
            assert!((a - e).abs() < tol, "index {i}: {a} != {e} (tol={tol})");
        }
    }

    /// Host GEMM for one slice: a is [m,k] (or [k,m] when trans_a), b is
    /// [k,n] (or [n,k] when trans_b), out is [m,n] row-major.
    fn reference_gemm(
        a: &[f64],
        b: &[f64],
        m: usize,
        n: usize,
        k: usize,
        trans_a: bool,
        trans_b: bool,
        alpha: f64,
        out: &mut [f64],
    ) {
        for i in 0..m {
            for j in 0..n {
                let mut acc = 0.0;
                for p in 0..k {
                    let av = if trans_a { a[p * m + i] } else { a[i * k + p] };
                    let bv = if trans_b { b[j * k + p] } else { b[p * n + j] };
                    acc += av * bv;
                }
                out[i * n + j] = alpha * acc;
            }
        }
    }

    /// Batched host reference: runs the same shape analysis as the
    /// dispatcher and applies `reference_gemm` to every batch slice.
    fn reference_matmul(
        a: &[f64],
        b: &[f64],
        left: &Shape,
        right: &Shape,
        trans_a: bool,
        trans_b: bool,
        alpha: f64,
    ) -> Vec<f64> {
        let dims = MatmulDims::compute(left, right, trans_a, trans_b).unwrap();
        let (m, n, k) = (dims.m(), dims.n(), dims.k());
        let mut out = vec![0.0; dims.output_shape().elem_count()];
        for p in 0..dims.output_offsets().len() {
            let a_off = dims.left_offsets()[p];
            let b_off = dims.right_offsets()[p];
            let c_off = dims.output_offsets()[p];
            reference_gemm(
                &a[a_off..a_off + m * k],
                &b[b_off..b_off + k * n],
                m,
                n,
                k,
                dims.trans_a(),
                dims.trans_b(),
                alpha,
                &mut out[c_off..c_off + m * n],
            );
        }
        out
    }

    /// Deterministic, mildly irregular test data.
    fn host_data(n: usize) -> Vec<f64> {
        (0..n).map(|i| ((i * 7 % 11) as f64) * 0.5 - 2.0).collect()
    }

    /// Upload, multiply on device, and compare against the host reference.
    fn check_matmul(
        dev: &CudaDevice,
        left_dims: &[usize],
        right_dims: &[usize],
        trans_a: bool,
        trans_b: bool,
        alpha: f32,
        dtype: DType,
        tol: f64,
    ) {
        let left = Shape::from(left_dims);
        let right = Shape::from(right_dims);
        let a = host_data(left.elem_count());
        let b = host_data(right.elem_count());

        let ta = CudaTensor::from_f64_slice(&a, left.clone(), dtype, dev).unwrap();
        let tb = CudaTensor::from_f64_slice(&b, right.clone(), dtype, dev).unwrap();
        let y = MatMul::new()
            .with_transpose(trans_a, trans_b)
            .with_alpha(alpha)
            .compute(&ta, &tb)
            .unwrap();

        let expected = reference_matmul(&a, &b, &left, &right, trans_a, trans_b, alpha as f64);
        let dims = MatmulDims::compute(&left, &right, trans_a, trans_b).unwrap();
        assert_eq!(y.shape(), dims.output_shape());
        assert_approx_vec(&y.to_f64_vec().unwrap(), &expected, tol);
    }

    // ─────────────────────────────────────────────────────────────────────
    // Single GEMM
    // ─────────────────────────────────────────────────────────────────────

    #[test]
    fn test_single_gemm_known_values() {
        let Some(dev) = gpu() else { return };
        let a = CudaTensor::from_f64_slice(&[1.0, 2.0, 3.0, 4.0], (2, 2), DType::F32, &dev)
            .unwrap();
        let b = CudaTensor::from_f64_slice(&[5.0, 6.0, 7.0, 8.0], (2, 2), DType::F32, &dev)
            .unwrap();
        let y = MatMul::new().compute(&a, &b).unwrap();
        assert_approx_vec(&y.to_f64_vec().unwrap(), &[19.0, 22.0, 43.0, 50.0], 1e-5);
    }

    #[test]
    fn test_single_gemm_shapes() {
        let Some(dev) = gpu() else { return };
        // Three representative 2-D shapes.
        check_matmul(&dev, &[4, 8], &[8, 6], false, false, 1.0, DType::F32, 1e-5);
        check_matmul(&dev, &[1, 5], &[5, 1], false, false, 1.0, DType::F32, 1e-5);
        check_matmul(&dev, &[9, 3], &[3, 7], false, false, 1.0, DType::F32, 1e-5);
    }

    #[test]
    fn test_single_gemm_f64() {
        let Some(dev) = gpu() else { return };
        check_matmul(&dev, &[4, 8], &[8, 6], false, false, 1.0, DType::F64, 1e-10);
    }

    #[test]
    fn test_single_gemm_transposes() {
        let Some(dev) = gpu() else { return };
        check_matmul(&dev, &[8, 4], &[8, 6], true, false, 1.0, DType::F32, 1e-5);
        check_matmul(&dev, &[4, 8], &[6, 8], false, true, 1.0, DType::F32, 1e-5);
        check_matmul(&dev, &[8, 4], &[6, 8], true, true, 1.0, DType::F32, 1e-5);
    }

    #[test]
    fn test_alpha_scaling() {
        let Some(dev) = gpu() else { return };
        check_matmul(&dev, &[3, 4], &[4, 5], false, false, 0.5, DType::F32, 1e-5);
        check_matmul(&dev, &[3, 4], &[4, 5], false, false, -2.0, DType::F64, 1e-10);
    }

    // ─────────────────────────────────────────────────────────────────────
    // Strided-batched GEMM
    // ─────────────────────────────────────────────────────────────────────

    #[test]
    fn test_strided_broadcast_right() {
        let Some(dev) = gpu() else { return };
        // [P, m, k] · [k, n]: every batch reuses the same right matrix
        // (stride 0).
        check_matmul(&dev, &[5, 3, 4], &[4, 6], false, false, 1.0, DType::F32, 1e-5);
    }

    #[test]
    fn test_strided_batched_both() {
        let Some(dev) = gpu() else { return };
        check_matmul(
            &dev,
            &[5, 3, 4],
            &[5, 4, 6],
            false,
            false,
            1.0,
            DType::F32,
            1e-5,
        );
        check_matmul(
            &dev,
            &[2, 3, 3, 4],
            &[2, 3, 4, 2],
            false,
            false,
            1.0,
            DType::F64,
            1e-10,
        );
    }

    #[test]
    fn test_strided_batched_transposed() {
        let Some(dev) = gpu() else { return };
        check_matmul(
            &dev,
            &[4, 5, 3],
            &[4, 6, 5],
            true,
            true,
            1.0,
            DType::F32,
            1e-5,
        );
    }

    // ─────────────────────────────────────────────────────────────────────
    // Pointer-array batched GEMM (ragged broadcast)
    // ─────────────────────────────────────────────────────────────────────

    #[test]
    fn test_pointer_batched_ragged() {
        let Some(dev) = gpu() else { return };
        // Batch dims [2, 1] vs [3]: slice products differ, the strided
        // regularity test fails, and the dispatcher must fall back to the
        // pointer-array form — while still matching the reference slice by
        // slice.
        check_matmul(
            &dev,
            &[2, 1, 2, 3],
            &[3, 3, 2],
            false,
            false,
            1.0,
            DType::F32,
            1e-5,
        );
    }

    #[test]
    fn test_pointer_batched_batchless_left() {
        let Some(dev) = gpu() else { return };
        // Rank-2 left against a batched right has no left batch dimension,
        // so it cannot be strided either.
        check_matmul(&dev, &[3, 4], &[6, 4, 5], false, false, 1.0, DType::F32, 1e-5);
        check_matmul(&dev, &[3, 4], &[6, 4, 5], false, false, 1.0, DType::F64, 1e-10);
    }

    // ─────────────────────────────────────────────────────────────────────
    // Vectors, empty outputs, half precision, errors
    // ─────────────────────────────────────────────────────────────────────

    #[test]
    fn test_vector_operands() {
        let Some(dev) = gpu() else { return };
        // [k] · [k] → scalar
        check_matmul(&dev, &[6], &[6], false, false, 1.0, DType::F32, 1e-5);
        // [m, k] · [k] → [m]
        check_matmul(&dev, &[4, 6], &[6], false, false, 1.0, DType::F32, 1e-5);
        // [k] · [k, n] → [n]
        check_matmul(&dev, &[6], &[6, 4], false, false, 1.0, DType::F32, 1e-5);
    }

    #[test]
    fn test_vector_transpose_has_no_effect() {
        let Some(dev) = gpu() else { return };
        let v = host_data(5);
        let m = host_data(15);
        let tv = CudaTensor::from_f64_slice(&v, 5, DType::F32, &dev).unwrap();
        let tm = CudaTensor::from_f64_slice(&m, (5, 3), DType::F32, &dev).unwrap();
        let plain = MatMul::new().compute(&tv, &tm).unwrap();
        let flagged = MatMul::new()
            .with_transpose(true, false)
            .compute(&tv, &tm)
            .unwrap();
        assert_eq!(plain.dims(), flagged.dims());
        assert_approx_vec(
            &flagged.to_f64_vec().unwrap(),
            &plain.to_f64_vec().unwrap(),
            1e-7,
        );
    }

    #[test]
    fn test_empty_output_short_circuits() {
        let Some(dev) = gpu() else { return };
        let a = CudaTensor::from_f64_slice(&[], (0, 2, 3), DType::F32, &dev).unwrap();
        let b = CudaTensor::from_f64_slice(&host_data(12), (3, 4), DType::F32, &dev).unwrap();
        let y = MatMul::new().compute(&a, &b).unwrap();
        assert_eq!(y.dims(), &[0, 2, 4]);
        assert!(y.to_f64_vec().unwrap().is_empty());
    }

    #[test]
    fn test_matmul_f16() {
        let Some(dev) = gpu() else { return };
        // Small integers stay exact through f16.
        let a = CudaTensor::from_f64_slice(&[1.0, 2.0, 3.0, 4.0], (2, 2), DType::F16, &dev)
            .unwrap();
        let b = CudaTensor::from_f64_slice(&[5.0, 6.0, 7.0, 8.0], (2, 2), DType::F16, &dev)
            .unwrap();
        let y = MatMul::new().compute(&a, &b).unwrap();
        assert_eq!(y.dtype(), DType::F16);
        assert_approx_vec(&y.to_f64_vec().unwrap(), &[19.0, 22.0, 43.0, 50.0], 1e-2);
    }

    #[test]
    fn test_matmul_f16_batched() {
        let Some(dev) = gpu() else { return };
        check_matmul(&dev, &[3, 2, 4], &[4, 5], false, false, 1.0, DType::F16, 0.2);
    }

    #[test]
    fn test_dtype_mismatch_rejected() {
        let Some(dev) = gpu() else { return };
        let a = CudaTensor::from_f64_slice(&host_data(6), (2, 3), DType::F32, &dev).unwrap();
        let b = CudaTensor::from_f64_slice(&host_data(6), (3, 2), DType::F64, &dev).unwrap();
        assert!(MatMul::new().compute(&a, &b).is_err());
    }

    #[test]
    fn test_shape_mismatch_rejected() {
        let Some(dev) = gpu() else { return };
        let a = CudaTensor::from_f64_slice(&host_data(6), (2, 3), DType::F32, &dev).unwrap();
        let b = CudaTensor::from_f64_slice(&host_data(8), (4, 2), DType::F32, &dev).unwrap();
        assert!(MatMul::new().compute(&a, &b).is_err());
    }
}
