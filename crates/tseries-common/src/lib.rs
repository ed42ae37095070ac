//! Common types shared by the time series generation crates.
//!
//! - [`calendar`]: CF calendars, time units and calendar-aware dates
//! - [`array`]: in-memory variable, attribute and header model
//! - [`engine`]: the array I/O collaborator traits and compression settings

pub mod array;
pub mod calendar;
pub mod engine;
pub mod error;

pub use array::{ArrayValues, AttrValue, DatasetHeader, VariableData, VariableHeader};
pub use calendar::{Calendar, CalendarDate, TimeUnit, TimeUnits};
pub use engine::{ArrayEngine, Compression, CompressionAlgorithm, DatasetWriter};
pub use error::{CommonError, CommonResult};
