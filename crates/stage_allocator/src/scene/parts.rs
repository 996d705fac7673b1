//! Reference host objects
//!
//! Minimal scene-graph objects covering the three positioning
//! capabilities: [`Part`] (single point), [`Model`] (pivoted grouping) and
//! [`Folder`] (non-positionable container).

use std::rc::{Rc, Weak};
use std::cell::RefCell;

use super::object::{Capability, CompositePlaceable, PointPlaceable, SceneError, SceneObject, SharedObject};
use crate::foundation::math::Vec3;

/// Parent link and destruction flag shared by every reference object
#[derive(Debug)]
struct Node {
    name: String,
    parent: Option<Weak<RefCell<dyn SceneObject>>>,
    destroyed: bool,
}

impl Node {
    fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            parent: None,
            destroyed: false,
        }
    }

    fn set_parent(&mut self, parent: &SharedObject) -> Result<(), SceneError> {
        if self.destroyed {
            return Err(SceneError::Destroyed { name: self.name.clone() });
        }
        self.parent = Some(Rc::downgrade(parent));
        Ok(())
    }

    fn parent(&self) -> Option<SharedObject> {
        self.parent.as_ref().and_then(Weak::upgrade)
    }

    // Destroying twice is allowed; the second call changes nothing.
    fn destroy(&mut self) {
        if !self.destroyed {
            log::trace!("Destroying '{}'", self.name);
        }
        self.destroyed = true;
        self.parent = None;
    }
}

/// A single-point object such as a primitive part
#[derive(Debug)]
pub struct Part {
    node: Node,
    position: Vec3,
}

impl Part {
    /// Create a part at the world origin
    pub fn new(name: impl Into<String>) -> Self {
        Self::at(name, Vec3::zeros())
    }

    /// Create a part at `position`
    pub fn at(name: impl Into<String>, position: Vec3) -> Self {
        Self {
            node: Node::new(name),
            position,
        }
    }

    /// Current world position
    pub fn position(&self) -> Vec3 {
        self.position
    }

    /// Current parent, if it is still alive
    pub fn parent(&self) -> Option<SharedObject> {
        self.node.parent()
    }

    /// Whether [`SceneObject::destroy`] has run
    pub fn is_destroyed(&self) -> bool {
        self.node.destroyed
    }
}

impl PointPlaceable for Part {
    fn set_position(&mut self, position: Vec3) {
        self.position = position;
    }
}

impl SceneObject for Part {
    fn name(&self) -> &str {
        &self.node.name
    }

    fn capability(&mut self) -> Capability<'_> {
        Capability::Point(self)
    }

    fn set_parent(&mut self, parent: &SharedObject) -> Result<(), SceneError> {
        self.node.set_parent(parent)
    }

    fn destroy(&mut self) -> Result<(), SceneError> {
        self.node.destroy();
        Ok(())
    }
}

/// A rigid grouping of members placed relative to a pivot
#[derive(Debug)]
pub struct Model {
    node: Node,
    pivot: Vec3,
    members: Vec<(String, Vec3)>,
}

impl Model {
    /// Create an empty model pivoted at the world origin
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            node: Node::new(name),
            pivot: Vec3::zeros(),
            members: Vec::new(),
        }
    }

    /// Builder pattern: Add a member at `offset` from the pivot
    pub fn with_member(mut self, name: impl Into<String>, offset: Vec3) -> Self {
        self.members.push((name.into(), offset));
        self
    }

    /// Current pivot position
    pub fn pivot(&self) -> Vec3 {
        self.pivot
    }

    /// World position of the named member
    pub fn member_position(&self, name: &str) -> Option<Vec3> {
        self.members
            .iter()
            .find(|(member, _)| member == name)
            .map(|(_, offset)| self.pivot + offset)
    }

    /// Current parent, if it is still alive
    pub fn parent(&self) -> Option<SharedObject> {
        self.node.parent()
    }

    /// Whether [`SceneObject::destroy`] has run
    pub fn is_destroyed(&self) -> bool {
        self.node.destroyed
    }
}

impl CompositePlaceable for Model {
    fn pivot_to(&mut self, point: Vec3) {
        self.pivot = point;
    }
}

impl SceneObject for Model {
    fn name(&self) -> &str {
        &self.node.name
    }

    fn capability(&mut self) -> Capability<'_> {
        Capability::Composite(self)
    }

    fn set_parent(&mut self, parent: &SharedObject) -> Result<(), SceneError> {
        self.node.set_parent(parent)
    }

    fn destroy(&mut self) -> Result<(), SceneError> {
        self.node.destroy();
        self.members.clear();
        Ok(())
    }
}

/// A container with no spatial extent
#[derive(Debug)]
pub struct Folder {
    node: Node,
}

impl Folder {
    /// Create an empty folder
    pub fn new(name: impl Into<String>) -> Self {
        Self { node: Node::new(name) }
    }

    /// Current parent, if it is still alive
    pub fn parent(&self) -> Option<SharedObject> {
        self.node.parent()
    }

    /// Whether [`SceneObject::destroy`] has run
    pub fn is_destroyed(&self) -> bool {
        self.node.destroyed
    }
}

impl SceneObject for Folder {
    fn name(&self) -> &str {
        &self.node.name
    }

    fn set_parent(&mut self, parent: &SharedObject) -> Result<(), SceneError> {
        self.node.set_parent(parent)
    }

    fn destroy(&mut self) -> Result<(), SceneError> {
        self.node.destroy();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scene::{same_object, share};
    use approx::assert_relative_eq;

    #[test]
    fn test_part_moves_to_point() {
        let mut part = Part::new("crate");
        assert!(part.capability().move_to(Vec3::new(4.0, 5.0, 6.0)));
        assert_eq!(part.position(), Vec3::new(4.0, 5.0, 6.0));
    }

    #[test]
    fn test_model_pivots_members() {
        let mut model = Model::new("ship")
            .with_member("hull", Vec3::zeros())
            .with_member("turret", Vec3::new(0.0, 2.0, -1.0));

        assert!(model.capability().move_to(Vec3::new(100.0, 0.0, 50.0)));
        assert_relative_eq!(model.pivot(), Vec3::new(100.0, 0.0, 50.0));
        assert_relative_eq!(
            model.member_position("turret").unwrap(),
            Vec3::new(100.0, 2.0, 49.0)
        );
        assert!(model.member_position("missing").is_none());
    }

    #[test]
    fn test_folder_is_fixed() {
        let mut folder = Folder::new("props");
        assert!(!folder.capability().move_to(Vec3::new(1.0, 1.0, 1.0)));
    }

    #[test]
    fn test_reparent_and_destroy() {
        let folder = share(Folder::new("workspace"));
        let mut part = Part::new("crate");

        part.set_parent(&folder).unwrap();
        assert!(same_object(&part.parent().unwrap(), &folder));

        part.destroy().unwrap();
        assert!(part.is_destroyed());
        assert!(part.parent().is_none());

        // Second destroy is harmless
        part.destroy().unwrap();

        let err = part.set_parent(&folder).unwrap_err();
        assert_eq!(err, SceneError::Destroyed { name: "crate".into() });
    }

    #[test]
    fn test_parent_link_is_weak() {
        let mut part = Part::new("orphan");
        {
            let folder = share(Folder::new("temporary"));
            part.set_parent(&folder).unwrap();
            assert!(part.parent().is_some());
        }
        assert!(part.parent().is_none());
    }
}
