//! Host object capabilities
//!
//! The host scene graph owns its objects. Stages only keep a shared
//! reference to each tracked object, enough to move, reparent and destroy
//! it. Positioning is resolved through the object's declared
//! [`Capability`] instead of probing its concrete type.

use std::cell::RefCell;
use std::rc::Rc;

use thiserror::Error;

use crate::foundation::math::Vec3;

/// Shared reference to a host object
pub type SharedObject = Rc<RefCell<dyn SceneObject>>;

/// Wrap a host object for tracking
pub fn share<T: SceneObject + 'static>(object: T) -> SharedObject {
    Rc::new(RefCell::new(object))
}

/// Reference identity of two host objects
///
/// Compares allocation addresses only, so two distinct objects with equal
/// contents are never confused with each other.
pub fn same_object(a: &SharedObject, b: &SharedObject) -> bool {
    std::ptr::eq(
        Rc::as_ptr(a).cast::<()>(),
        Rc::as_ptr(b).cast::<()>(),
    )
}

/// Failures reported by the host scene graph
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SceneError {
    /// The object has already been destroyed
    #[error("object '{name}' has been destroyed")]
    Destroyed {
        /// Name of the destroyed object
        name: String,
    },

    /// The host refused to change the object's parent
    #[error("parent of '{name}' is locked")]
    ParentLocked {
        /// Name of the locked object
        name: String,
    },

    /// Any other host failure
    #[error("host error: {0}")]
    Host(String),
}

/// Objects occupying a single point in space
pub trait PointPlaceable {
    /// Move the object so that it sits at `position`
    fn set_position(&mut self, position: Vec3);
}

/// Rigid groupings positioned through a reference point
pub trait CompositePlaceable {
    /// Move the whole grouping so that its pivot lands at `point`
    fn pivot_to(&mut self, point: Vec3);
}

/// Positioning capability declared by a host object
pub enum Capability<'a> {
    /// Single-point spatial object
    Point(&'a mut dyn PointPlaceable),
    /// Multi-part rigid grouping
    Composite(&'a mut dyn CompositePlaceable),
    /// Not positionable; tracked but never moved
    Fixed,
}

impl Capability<'_> {
    /// Move the object to `point`, returning whether it was positionable
    pub fn move_to(self, point: Vec3) -> bool {
        match self {
            Capability::Point(object) => {
                object.set_position(point);
                true
            }
            Capability::Composite(object) => {
                object.pivot_to(point);
                true
            }
            Capability::Fixed => false,
        }
    }
}

/// An object living in the host scene graph
pub trait SceneObject {
    /// Human-readable name, used in logs and errors
    fn name(&self) -> &str;

    /// How this object can be positioned
    fn capability(&mut self) -> Capability<'_> {
        Capability::Fixed
    }

    /// Attach this object under `parent`
    fn set_parent(&mut self, parent: &SharedObject) -> Result<(), SceneError>;

    /// Release the object's host resources
    fn destroy(&mut self) -> Result<(), SceneError>;
}
