use crate::error::{Error, Result};
use crate::shape::Shape;

// MatmulDims — Broadcasting shape inference for (batched) matrix multiply
//
// Given the shapes of the two operands and their transpose flags, this
// helper works out everything the execution layer needs before it touches
// device memory:
//
//   1. The GEMM extents m/n/k (after transposes).
//   2. The output shape, with NumPy-style broadcasting over the batch
//      dimensions (all but the trailing two).
//   3. One element offset per batch slice for the left operand, the right
//      operand, and the output. A broadcast operand repeats its slice, so
//      its offset list revisits the same offsets.
//
// 1-D operands follow the usual convention: a left [k] acts as [1, k], a
// right [k] acts as [k, 1], and the unit dimension is omitted from the
// output shape. Transposing a vector changes nothing, so the transpose
// flag of a 1-D operand is ignored.
//
// This is shape analysis only — it validates operand compatibility but
// performs no arithmetic and allocates nothing on device.

/// Shape analysis for one matmul call: GEMM extents, output shape, and
/// per-batch-slice element offsets for both operands and the output.
#[derive(Debug, Clone)]
pub struct MatmulDims {
    m: usize,
    n: usize,
    k: usize,
    trans_a: bool,
    trans_b: bool,
    output_shape: Shape,
    left_offsets: Vec<usize>,
    right_offsets: Vec<usize>,
    output_offsets: Vec<usize>,
}

impl MatmulDims {
    /// Analyze one matmul call.
    ///
    /// `trans_a`/`trans_b` apply to the trailing two dimensions of the
    /// corresponding operand and are ignored for 1-D operands.
    pub fn compute(left: &Shape, right: &Shape, trans_a: bool, trans_b: bool) -> Result<Self> {
        if left.rank() == 0 || right.rank() == 0 {
            crate::bail!(
                "matmul: operands must have at least 1 dimension, got {} and {}",
                left,
                right
            );
        }

        // numpy.transpose on a vector does not change anything
        let trans_a = trans_a && left.rank() > 1;
        let trans_b = trans_b && right.rank() > 1;

        // Promote vectors: a left [k] acts as [1, k], a right [k] as [k, 1].
        let left_promoted = left.rank() == 1;
        let right_promoted = right.rank() == 1;
        let ldims: Vec<usize> = if left_promoted {
            vec![1, left.dims()[0]]
        } else {
            left.dims().to_vec()
        };
        let rdims: Vec<usize> = if right_promoted {
            vec![right.dims()[0], 1]
        } else {
            right.dims().to_vec()
        };

        let lrank = ldims.len();
        let rrank = rdims.len();
        let m = if trans_a { ldims[lrank - 1] } else { ldims[lrank - 2] };
        let k_left = if trans_a { ldims[lrank - 2] } else { ldims[lrank - 1] };
        let k_right = if trans_b { rdims[rrank - 1] } else { rdims[rrank - 2] };
        let n = if trans_b { rdims[rrank - 2] } else { rdims[rrank - 1] };
        if k_left != k_right {
            return Err(Error::MatmulShapeMismatch {
                m,
                k1: k_left,
                k2: k_right,
                n,
            });
        }
        let k = k_left;

        // Broadcast the batch dimensions (everything but the trailing two).
        let left_batch = Shape::new(ldims[..lrank - 2].to_vec());
        let right_batch = Shape::new(rdims[..rrank - 2].to_vec());
        let batch_shape = Shape::broadcast_shape(&left_batch, &right_batch)?;
        let batch_count = batch_shape.elem_count();

        let mut out_dims = batch_shape.dims().to_vec();
        if !left_promoted {
            out_dims.push(m);
        }
        if !right_promoted {
            out_dims.push(n);
        }
        let output_shape = Shape::new(out_dims);

        // Per-slice element offsets. Walking the broadcast batch space with
        // each operand's broadcast strides maps every output slice back to
        // the operand slice it reads; stride-0 axes revisit the same slice.
        let left_strides = left_batch.broadcast_strides(&batch_shape);
        let right_strides = right_batch.broadcast_strides(&batch_shape);
        let batch_strides = batch_shape.stride_contiguous();
        let batch_dims = batch_shape.dims();

        let mut left_offsets = Vec::with_capacity(batch_count);
        let mut right_offsets = Vec::with_capacity(batch_count);
        let mut output_offsets = Vec::with_capacity(batch_count);
        for p in 0..batch_count {
            let mut left_index = 0usize;
            let mut right_index = 0usize;
            for axis in 0..batch_dims.len() {
                let idx = (p / batch_strides[axis]) % batch_dims[axis];
                left_index += idx * left_strides[axis];
                right_index += idx * right_strides[axis];
            }
            left_offsets.push(left_index * m * k);
            right_offsets.push(right_index * k * n);
            output_offsets.push(p * m * n);
        }

        Ok(MatmulDims {
            m,
            n,
            k,
            trans_a,
            trans_b,
            output_shape,
            left_offsets,
            right_offsets,
            output_offsets,
        })
    }

    /// Output rows (after transposes).
    pub fn m(&self) -> usize {
        self.m
    }

    /// Output columns (after transposes).
    pub fn n(&self) -> usize {
        self.n
    }

    /// Shared contraction dimension.
    pub fn k(&self) -> usize {
        self.k
    }

    /// Effective left transpose flag (suppressed for 1-D operands).
    pub fn trans_a(&self) -> bool {
        self.trans_a
    }

    /// Effective right transpose flag (suppressed for 1-D operands).
    pub fn trans_b(&self) -> bool {
        self.trans_b
    }

    /// The broadcast output shape.
    pub fn output_shape(&self) -> &Shape {
        &self.output_shape
    }

    /// Element offset of each batch slice of the left operand.
    pub fn left_offsets(&self) -> &[usize] {
        &self.left_offsets
    }

    /// Element offset of each batch slice of the right operand.
    pub fn right_offsets(&self) -> &[usize] {
        &self.right_offsets
    }

    /// Element offset of each batch slice of the output.
    pub fn output_offsets(&self) -> &[usize] {
        &self.output_offsets
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_2d_basic() {
        let dims = MatmulDims::compute(&Shape::from((4, 8)), &Shape::from((8, 6)), false, false)
            .unwrap();
        assert_eq!((dims.m(), dims.n(), dims.k()), (4, 6, 8));
        assert_eq!(dims.output_shape(), &Shape::from((4, 6)));
        assert_eq!(dims.left_offsets(), &[0]);
        assert_eq!(dims.right_offsets(), &[0]);
        assert_eq!(dims.output_offsets(), &[0]);
    }

    #[test]
    fn test_2d_transposed() {
        // left [8, 4] transposed acts as [4, 8]
        let dims =
            MatmulDims::compute(&Shape::from((8, 4)), &Shape::from((8, 6)), true, false).unwrap();
        assert_eq!((dims.m(), dims.n(), dims.k()), (4, 6, 8));
        assert!(dims.trans_a());
        assert!(!dims.trans_b());
    }

    #[test]
    fn test_k_mismatch() {
        let err = MatmulDims::compute(&Shape::from((4, 8)), &Shape::from((7, 6)), false, false);
        assert!(matches!(err, Err(Error::MatmulShapeMismatch { .. })));
    }

    #[test]
    fn test_vector_vector() {
        // [5] · [5] → scalar
        let dims = MatmulDims::compute(&Shape::from(5), &Shape::from(5), false, false).unwrap();
        assert_eq!((dims.m(), dims.n(), dims.k()), (1, 1, 5));
        assert_eq!(dims.output_shape(), &Shape::from(()));
        assert_eq!(dims.output_shape().elem_count(), 1);
    }

    #[test]
    fn test_vector_transpose_ignored() {
        let with_flag =
            MatmulDims::compute(&Shape::from(5), &Shape::from((5, 3)), true, false).unwrap();
        let without =
            MatmulDims::compute(&Shape::from(5), &Shape::from((5, 3)), false, false).unwrap();
        assert!(!with_flag.trans_a());
        assert_eq!(with_flag.output_shape(), without.output_shape());
        assert_eq!(with_flag.output_shape(), &Shape::from(3));
        assert_eq!((with_flag.m(), with_flag.n(), with_flag.k()), (1, 3, 5));
    }

    #[test]
    fn test_batched_3d() {
        let dims = MatmulDims::compute(
            &Shape::from((2, 3, 4)),
            &Shape::from((2, 4, 5)),
            false,
            false,
        )
        .unwrap();
        assert_eq!((dims.m(), dims.n(), dims.k()), (3, 5, 4));
        assert_eq!(dims.output_shape(), &Shape::from((2, 3, 5)));
        assert_eq!(dims.left_offsets(), &[0, 12]);
        assert_eq!(dims.right_offsets(), &[0, 20]);
        assert_eq!(dims.output_offsets(), &[0, 15]);
    }

    #[test]
    fn test_right_broadcast() {
        // Batchless right operand: every batch slice reads the same matrix.
        let dims = MatmulDims::compute(
            &Shape::from((3, 4, 5)),
            &Shape::from((5, 6)),
            false,
            false,
        )
        .unwrap();
        assert_eq!(dims.output_shape(), &Shape::from((3, 4, 6)));
        assert_eq!(dims.left_offsets(), &[0, 20, 40]);
        assert_eq!(dims.right_offsets(), &[0, 0, 0]);
        assert_eq!(dims.output_offsets(), &[0, 24, 48]);
    }

    #[test]
    fn test_ragged_broadcast_offsets() {
        // [2, 1] and [3] batch dims broadcast to [2, 3]: neither operand's
        // offsets advance by a fixed stride.
        let dims = MatmulDims::compute(
            &Shape::from((2, 1, 2, 3)),
            &Shape::from((3, 3, 2)),
            false,
            false,
        )
        .unwrap();
        assert_eq!((dims.m(), dims.n(), dims.k()), (2, 2, 3));
        assert_eq!(dims.output_shape(), &Shape::from((2, 3, 2, 2)));
        assert_eq!(dims.left_offsets(), &[0, 0, 0, 6, 6, 6]);
        assert_eq!(dims.right_offsets(), &[0, 6, 12, 0, 6, 12]);
        assert_eq!(dims.output_offsets(), &[0, 4, 8, 12, 16, 20]);
    }

    #[test]
    fn test_empty_output() {
        let dims = MatmulDims::compute(
            &Shape::from((0, 2, 3)),
            &Shape::from((3, 4)),
            false,
            false,
        )
        .unwrap();
        assert_eq!(dims.output_shape(), &Shape::from((0, 2, 4)));
        assert_eq!(dims.output_shape().elem_count(), 0);
        assert!(dims.output_offsets().is_empty());
    }

    #[test]
    fn test_incompatible_batch_dims() {
        // Batch dims [2] vs [3] cannot broadcast.
        let err = MatmulDims::compute(
            &Shape::from((2, 4, 5)),
            &Shape::from((3, 5, 6)),
            false,
            false,
        );
        assert!(err.is_err());
    }
}
