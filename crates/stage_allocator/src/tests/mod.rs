//! Cross-module behaviour tests
//!
//! Exercise the allocator and stages together the way a host game would.
