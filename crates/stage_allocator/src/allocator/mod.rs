//! Stage position allocation
//!
//! A [`StageAllocator`] hands out non-overlapping positions to stages and
//! keeps track of which stage occupies which position.

mod registry;

pub(crate) use registry::Registry;
pub use registry::{AllocatorError, StageAllocator};
