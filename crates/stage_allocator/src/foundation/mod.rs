//! Foundation module - Core utilities and types
//!
//! This module provides fundamental utilities used throughout the crate:
//! - Math types and the hashable coordinate key
//! - Clocks for stage timestamps
//! - Identifier sources for stage ids
//! - Logging utilities

pub mod math;
pub mod time;
pub mod ids;
pub mod logging;
