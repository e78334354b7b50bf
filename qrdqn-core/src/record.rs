//! Key-value records returned by environment and optimization steps.
//!
//! ```rust
//! use qrdqn_core::record::{Record, RecordValue};
//!
//! let mut record = Record::from_scalar("loss", 0.5);
//! record.insert("td_error_mean", RecordValue::Scalar(0.1));
//! assert_eq!(record.get_scalar("loss").unwrap(), 0.5);
//! ```
mod base;

pub use base::{Record, RecordValue};
