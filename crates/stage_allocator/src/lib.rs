//! # Stage Allocator
//!
//! Hands out non-overlapping "stage" regions in a 3D scene and tracks the
//! host objects placed in each stage so they can be torn down together.
//!
//! ## Features
//!
//! - **Linear Probing**: Stages are placed along `origin + k * gap`, reusing
//!   freed positions first
//! - **Explicit Context**: Each [`StageAllocator`] is an independent world
//! - **Object Tracking**: Stages reposition, reparent and destroy the host
//!   objects added to them
//! - **Ordered Teardown**: End callbacks run before any tracked object is
//!   destroyed
//!
//! ## Quick Start
//!
//! ```rust
//! use stage_allocator::prelude::*;
//! use std::cell::RefCell;
//! use std::rc::Rc;
//!
//! fn main() -> Result<(), StageError> {
//!     let allocator = StageAllocator::default();
//!     allocator.initialize(
//!         Some(Vec3::new(0.0, 0.0, 1000.0)),
//!         Some(Vec3::new(10000.0, 10000.0, 10000.0)),
//!     );
//!
//!     let stage = Stage::new(&allocator)?;
//!     let part = Rc::new(RefCell::new(Part::new("crate")));
//!     stage.add(part.clone(), Some(Vec3::new(10.0, 20.0, 30.0)))?;
//!     assert_eq!(part.borrow().position(), Vec3::new(10010.0, 10020.0, 10030.0));
//!
//!     stage.on_ended(|| println!("stage ended"));
//!     stage.end()?;
//!     assert!(part.borrow().is_destroyed());
//!     assert!(allocator.stages().is_empty());
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all, clippy::pedantic, clippy::nursery)]
#![allow(clippy::module_name_repetitions, clippy::similar_names, clippy::too_many_arguments)]

pub mod foundation;
pub mod config;
pub mod scene;
pub mod allocator;
pub mod stage;

#[cfg(test)]
mod tests;

pub use allocator::{AllocatorError, StageAllocator};
pub use stage::{Stage, StageError, StageState};

/// Common imports for crate users
pub mod prelude {
    pub use crate::{
        allocator::{AllocatorError, StageAllocator},
        config::{AllocatorConfig, Config, ConfigError},
        foundation::{
            ids::{IdSource, SequentialIds, UuidIds},
            math::{Coordinate, Vec3},
            time::{Clock, MonotonicClock, SteppedClock},
        },
        scene::{
            share, same_object, Capability, CompositePlaceable, Folder, Model, Part,
            PointPlaceable, SceneError, SceneObject, SharedObject,
        },
        stage::{Stage, StageError, StageState},
    };
}
