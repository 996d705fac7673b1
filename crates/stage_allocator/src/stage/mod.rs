//! Stage lifecycle management
//!
//! A [`Stage`] owns one allocated position plus the list of host objects
//! placed there, and tears them all down together when it ends.

mod lifecycle;

pub use lifecycle::{Stage, StageError, StageState};
