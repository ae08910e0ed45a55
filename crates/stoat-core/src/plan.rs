use crate::matmul::MatmulDims;
use crate::shape::Shape;

// GemmPlan — Output-shape triage for the matmul dispatcher
//
// Every matmul dispatch maps onto exactly one of three BLAS call shapes,
// chosen from the operand shapes alone:
//
//   Single         — one output slice; a plain GEMM.
//   StridedBatched — many slices whose addresses advance by a fixed
//                    per-operand stride; one strided-batched GEMM call.
//   PointerBatched — anything else (ragged broadcast patterns); one
//                    pointer-array batched GEMM call fed by explicit
//                    per-slice device pointers.
//
// Planning is a pure function over shapes: it performs no allocation and
// no device work, so the whole decision table is unit-testable without a
// GPU. Shape pairs that cannot multiply at all never reach the planner —
// they are rejected by [`MatmulDims::compute`]. A shape pair that merely
// fails the strided regularity test is not an error; the planner falls
// back to the pointer-array form.

/// Which BLAS call shape a matmul dispatch uses. Strides and offsets are
/// in elements.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GemmStrategy {
    /// One GEMM, no batch dimension at all.
    Single,
    /// One strided-batched GEMM. `stride_b == 0` broadcasts the right
    /// operand's single slice across every batch.
    StridedBatched {
        batch: usize,
        stride_a: usize,
        stride_b: usize,
        stride_c: usize,
    },
    /// One pointer-array batched GEMM over explicit per-slice pointers.
    PointerBatched { batch: usize },
}

/// Everything one BLAS invocation needs, derived per call and never stored.
///
/// Leading dimensions follow the row-major storage convention:
/// `lda = trans_a ? m : k`, `ldb = trans_b ? k : n`, `ldc = n`.
#[derive(Debug, Clone)]
pub struct GemmPlan {
    pub strategy: GemmStrategy,
    pub m: usize,
    pub n: usize,
    pub k: usize,
    pub lda: i32,
    pub ldb: i32,
    pub ldc: i32,
    pub trans_a: bool,
    pub trans_b: bool,
}

impl GemmPlan {
    /// Choose the call shape for one dispatch.
    ///
    /// `left`/`right` are the raw operand shapes (before vector
    /// promotion); `dims` is the completed shape analysis for the call.
    pub fn choose(left: &Shape, right: &Shape, dims: &MatmulDims) -> GemmPlan {
        let (m, n, k) = (dims.m(), dims.n(), dims.k());
        let trans_a = dims.trans_a();
        let trans_b = dims.trans_b();

        let strategy = if dims.output_offsets().len() == 1 {
            GemmStrategy::Single
        } else if let Some(strided) = strided_batch_params(left, right, trans_a, trans_b) {
            strided
        } else {
            GemmStrategy::PointerBatched {
                batch: dims.output_offsets().len(),
            }
        };

        GemmPlan {
            strategy,
            m,
            n,
            k,
            lda: if trans_a { m } else { k } as i32,
            ldb: if trans_b { k } else { n } as i32,
            ldc: n as i32,
            trans_a,
            trans_b,
        }
    }
}

/// Regularity test for the strided-batched form.
///
/// StridedBatched covers C[p,m,n] = A[p,m,k]·B[k,n] (right operand
/// broadcast, stride 0) and C[p,m,n] = A[p,m,k]·B[p,k,n]: the left operand
/// must carry a batch dimension, and a batched right operand must carry
/// exactly as many slices as the left.
fn strided_batch_params(
    left: &Shape,
    right: &Shape,
    trans_a: bool,
    trans_b: bool,
) -> Option<GemmStrategy> {
    let lrank = left.rank();
    let rrank = right.rank();

    if !(lrank >= 3 && rrank >= 2) {
        return None;
    }

    let left_batch = left.size_to_dim(lrank - 2);
    let left_k = if trans_a {
        left.dims()[lrank - 2]
    } else {
        left.dims()[lrank - 1]
    };

    if rrank >= 3 {
        let right_batch = right.size_to_dim(rrank - 2);
        if left_batch != right_batch {
            return None;
        }
    }

    let right_k = if trans_b {
        right.dims()[rrank - 1]
    } else {
        right.dims()[rrank - 2]
    };
    if left_k != right_k {
        return None;
    }

    let m = if trans_a {
        left.dims()[lrank - 1]
    } else {
        left.dims()[lrank - 2]
    };
    let n = if trans_b {
        right.dims()[rrank - 2]
    } else {
        right.dims()[rrank - 1]
    };

    Some(GemmStrategy::StridedBatched {
        batch: left_batch,
        stride_a: m * left_k,
        stride_b: if rrank == 2 { 0 } else { right_k * n },
        stride_c: m * n,
    })
}
