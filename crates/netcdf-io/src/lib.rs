//! NetCDF-4 array engine.
//!
//! Implements [`tseries_common::ArrayEngine`] on top of the `netcdf` crate
//! (libnetcdf + HDF5). Every call opens its own file handle, so the engine
//! can be shared freely across worker threads.
//!
//! # Type Mapping
//!
//! | NetCDF            | ArrayValues  |
//! |-------------------|--------------|
//! | byte / ubyte      | I8 / U8      |
//! | short / ushort    | I16 / I32    |
//! | int / uint        | I32 / I64    |
//! | int64 / uint64    | I64          |
//! | float / double    | F32 / F64    |
//! | char              | Char         |
//!
//! Only zlib (deflate) compression is available through libnetcdf here;
//! other codecs are rejected with `UnsupportedCompression`.

mod attributes;
mod engine;
pub mod error;
mod writer;

use std::sync::Once;

pub use engine::NetcdfEngine;
pub use error::{NetCdfError, NetCdfResult};

/// Silence HDF5's automatic error printing to stderr.
///
/// The HDF5 C library prints verbose error messages to stderr even when errors
/// are handled gracefully by the Rust code (e.g., when probing an existing
/// output for the completion attribute). This function disables that output
/// by calling H5Eset_auto2 with null handlers. It only needs to be called once
/// per process, but is safe to call multiple times.
pub fn silence_hdf5_errors() {
    static INIT: Once = Once::new();

    INIT.call_once(|| {
        // SAFETY: H5Eset_auto2 is thread-safe and we're passing null pointers
        // to disable error output, which is a documented valid use.
        unsafe {
            hdf5_metno_sys::h5e::H5Eset_auto2(
                hdf5_metno_sys::h5e::H5E_DEFAULT,
                None,
                std::ptr::null_mut(),
            );
        }
    });
}
