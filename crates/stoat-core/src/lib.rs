//! # stoat-core
//!
//! Device-independent primitives for the Stoat CUDA operator library.
//!
//! This crate provides:
//! - [`Shape`] — n-dimensional shape with broadcasting helpers
//! - [`DType`] — supported element types (F16, F32, F64)
//! - [`MatmulDims`] — broadcasting shape inference for batched matmul
//! - [`GemmPlan`] / [`GemmStrategy`] — pure BLAS call-shape selection
//! - [`Error`] / [`Result`] — the workspace-wide error type
//!
//! Everything here is pure shape/metadata work: planning a matmul is a
//! side-effect-free function over shapes, so the entire decision table is
//! testable without a GPU. The `stoat-cuda` crate executes the plans.

pub mod dtype;
pub mod error;
pub mod matmul;
pub mod plan;
pub mod shape;

pub use dtype::DType;
pub use error::{Error, Result};
pub use matmul::MatmulDims;
pub use plan::{GemmPlan, GemmStrategy};
pub use shape::Shape;
