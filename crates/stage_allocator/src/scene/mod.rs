//! Host scene graph capabilities
//!
//! Stages never own the objects they track; the host scene graph does.
//! This module describes what a stage needs from a host object (move,
//! reparent, destroy) and ships small reference objects implementing it.

mod object;
mod parts;

pub use object::{
    share, same_object, Capability, CompositePlaceable, PointPlaceable, SceneError, SceneObject,
    SharedObject,
};
pub use parts::{Folder, Model, Part};
