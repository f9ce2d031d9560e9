//! Shared primitives: the crate error type, timestamp sources and
//! filesystem publishing helpers.

pub mod clock;
pub mod error;
pub mod fsutil;

pub use clock::{Clock, ManualClock, QuantaClock, SystemClock};
pub use error::{Error, Result};
