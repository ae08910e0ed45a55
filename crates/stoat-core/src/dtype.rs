use std::fmt;

// DType — Supported numeric data types
//
// Every tensor has a DType that determines its element size and numeric
// behavior. We support the floating-point types the execution kernels
// operate on:
//
//   F16 — 16-bit IEEE half float, for mixed-precision inference
//   F32 — 32-bit float, the default workhorse
//   F64 — 64-bit float, for high-precision work

/// Enum of all supported element data types.
///
/// This is stored inside every tensor so we can dispatch operations
/// to the correct typed implementation at runtime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DType {
    F16,
    F32,
    F64,
}

impl DType {
    /// Size of one element in bytes.
    pub fn size_in_bytes(&self) -> usize {
        match self {
            DType::F16 => 2,
            DType::F32 => 4,
            DType::F64 => 8,
        }
    }

    /// Whether this is a half-precision type.
    pub fn is_half(&self) -> bool {
        matches!(self, DType::F16)
    }
}

impl fmt::Display for DType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            DType::F16 => "f16",
            DType::F32 => "f32",
            DType::F64 => "f64",
        };
        write!(f, "{}", s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dtype_size() {
        assert_eq!(DType::F16.size_in_bytes(), 2);
        assert_eq!(DType::F32.size_in_bytes(), 4);
        assert_eq!(DType::F64.size_in_bytes(), 8);
    }

    #[test]
    fn test_dtype_is_half() {
        assert!(DType::F16.is_half());
        assert!(!DType::F32.is_half());
        assert!(!DType::F64.is_half());
    }

    #[test]
    fn test_display() {
        assert_eq!(format!("{}", DType::F16), "f16");
        assert_eq!(format!("{}", DType::F64), "f64");
    }
}
