//! Shared test utilities for the tseries workspace.
//!
//! This crate provides common testing infrastructure including:
//! - An in-memory [`tseries_common::ArrayEngine`] with write fault injection
//! - Synthetic history file generators
//! - Temporary directory helpers
//!
//! # Usage
//!
//! Add to your crate's `Cargo.toml`:
//!
//! ```toml
//! [dev-dependencies]
//! test-utils = { path = "../test-utils" }
//! ```
//!
//! Then import in your tests:
//!
//! ```ignore
//! use test_utils::{HistoryFileSpec, MemoryEngine};
//! ```

pub mod generators;
pub mod memory;
pub mod paths;

// Re-export commonly used items at the crate root
pub use generators::*;
pub use memory::*;
pub use paths::*;

/// Assert that two floating point values are approximately equal.
///
/// # Usage
///
/// ```
/// use test_utils::assert_approx_eq;
///
/// assert_approx_eq!(1.0_f64, 1.0000001_f64, 0.001);
/// ```
#[macro_export]
macro_rules! assert_approx_eq {
    ($left:expr, $right:expr) => {
        $crate::assert_approx_eq!($left, $right, 1e-6)
    };
    ($left:expr, $right:expr, $epsilon:expr) => {{
        let left = $left;
        let right = $right;
        let diff = (left - right).abs();
        assert!(
            diff < $epsilon,
            "assertion failed: `(left ≈ right)`\n  left: `{:?}`\n right: `{:?}`\n  diff: `{:?}` (epsilon: {:?})",
            left,
            right,
            diff,
            $epsilon
        );
    }};
}

/// Assert that a slice of values read back from an output matches `expected`.
///
/// # Usage
///
/// ```
/// use test_utils::assert_values_approx_eq;
///
/// assert_values_approx_eq!(&[30.0, 60.0], &[30.0, 60.0]);
/// ```
#[macro_export]
macro_rules! assert_values_approx_eq {
    ($actual:expr, $expected:expr) => {{
        let actual: &[f64] = $actual;
        let expected: &[f64] = $expected;
        assert_eq!(
            actual.len(),
            expected.len(),
            "length mismatch: {:?} vs {:?}",
            actual,
            expected
        );
        for (a, e) in actual.iter().zip(expected.iter()) {
            $crate::assert_approx_eq!(*a, *e);
        }
    }};
}
