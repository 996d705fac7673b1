//! Stage handle and lifecycle
//!
//! A stage is Active from construction until [`Stage::end`] finishes, then
//! Ended for good. Ending runs the end callbacks, destroys every tracked
//! object and gives the stage's position back to its allocator, in that
//! order.

use std::cell::{Cell, RefCell, RefMut};
use std::collections::VecDeque;
use std::fmt;
use std::rc::{Rc, Weak};

use log::{debug, info, warn};
use thiserror::Error;

use crate::allocator::{AllocatorError, Registry, StageAllocator};
use crate::foundation::math::{Coordinate, Vec3};
use crate::scene::{same_object, SceneError, SceneObject, SharedObject};

/// Stage operation failures
#[derive(Error, Debug, Clone, PartialEq)]
pub enum StageError {
    /// No position could be allocated
    #[error("stage allocation failed: {0}")]
    Allocation(#[from] AllocatorError),

    /// The host scene graph rejected an operation
    #[error(transparent)]
    Scene(#[from] SceneError),

    /// Objects cannot be added once a stage has ended
    #[error("stage '{id}' has already ended")]
    Ended {
        /// Id of the ended stage
        id: String,
    },
}

/// Lifecycle state of a stage
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StageState {
    /// Accepting objects
    Active,
    /// Teardown in progress
    Ending,
    /// Torn down; the position has been released
    Ended,
}

type EndCallback = Box<dyn FnOnce()>;

struct StageInner {
    id: String,
    created_at: f64,
    world_position: Vec3,
    state: Cell<StageState>,
    objects: RefCell<VecDeque<SharedObject>>,
    end_callbacks: RefCell<Vec<EndCallback>>,
    registry: Weak<RefCell<Registry>>,
}

/// Handle to an allocated stage region and the host objects tracked in it
///
/// Clones refer to the same stage; equality is identity.
///
/// End callbacks that capture a clone of their own stage keep it alive
/// until [`Stage::end`] consumes them.
#[derive(Clone)]
pub struct Stage {
    inner: Rc<StageInner>,
}

impl PartialEq for Stage {
    fn eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }
}

impl Eq for Stage {}

impl fmt::Debug for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Stage")
            .field("id", &self.inner.id)
            .field("world_position", &Coordinate::from(self.inner.world_position))
            .field("state", &self.inner.state.get())
            .field("objects", &self.object_count())
            .finish_non_exhaustive()
    }
}

impl Stage {
    /// Allocate a position from `allocator` and open a stage there
    pub fn new(allocator: &StageAllocator) -> Result<Self, StageError> {
        allocator.create_stage()
    }

    pub(crate) fn from_parts(
        id: String,
        created_at: f64,
        world_position: Vec3,
        registry: Weak<RefCell<Registry>>,
    ) -> Self {
        Self {
            inner: Rc::new(StageInner {
                id,
                created_at,
                world_position,
                state: Cell::new(StageState::Active),
                objects: RefCell::new(VecDeque::new()),
                end_callbacks: RefCell::new(Vec::new()),
                registry,
            }),
        }
    }

    /// Unique identifier assigned at construction
    pub fn id(&self) -> &str {
        &self.inner.id
    }

    /// Timestamp captured at construction
    pub fn created_at(&self) -> f64 {
        self.inner.created_at
    }

    /// Position assigned by the allocator
    pub fn world_position(&self) -> Vec3 {
        self.inner.world_position
    }

    /// Current lifecycle state
    pub fn state(&self) -> StageState {
        self.inner.state.get()
    }

    /// Whether [`Stage::end`] has not yet completed
    pub fn is_active(&self) -> bool {
        self.state() != StageState::Ended
    }

    /// Number of tracked entries, counting duplicates
    pub fn object_count(&self) -> usize {
        self.inner.objects.borrow().len()
    }

    /// Whether `object` is tracked by this stage
    pub fn contains(&self, object: &SharedObject) -> bool {
        self.inner
            .objects
            .borrow()
            .iter()
            .any(|tracked| same_object(tracked, object))
    }

    /// Track `object`, optionally moving it to `world_position + relative`
    ///
    /// Point objects are moved to the target; composite objects are pivoted
    /// onto it. Objects with neither capability are tracked where they are.
    /// Adding the same object twice tracks it twice.
    pub fn add(&self, object: SharedObject, relative: Option<Vec3>) -> Result<(), StageError> {
        if self.state() == StageState::Ended {
            return Err(StageError::Ended { id: self.inner.id.clone() });
        }

        if let Some(offset) = relative {
            self.place(&object, self.inner.world_position + offset)?;
        }

        self.inner.objects.borrow_mut().push_back(object);
        Ok(())
    }

    /// Stop tracking the first occurrence of `object`
    ///
    /// The object is neither destroyed nor reparented. Returns whether an
    /// entry was removed.
    pub fn remove(&self, object: &SharedObject) -> bool {
        let mut objects = self.inner.objects.borrow_mut();
        match objects.iter().position(|tracked| same_object(tracked, object)) {
            Some(index) => {
                objects.remove(index);
                true
            }
            None => false,
        }
    }

    /// Reparent every tracked object under `parent`, in tracking order
    pub fn set_parent(&self, parent: &SharedObject) -> Result<(), StageError> {
        for object in self.objects() {
            host_mut(&object)?.set_parent(parent)?;
        }
        Ok(())
    }

    /// Snapshot of the tracked objects, in tracking order
    pub fn objects(&self) -> Vec<SharedObject> {
        self.inner.objects.borrow().iter().cloned().collect()
    }

    /// Destroy and untrack every object; the stage stays active
    ///
    /// On a host failure the failing object stays tracked at the front and
    /// the error is returned.
    pub fn clear(&self) -> Result<(), StageError> {
        loop {
            let Some(object) = self.inner.objects.borrow_mut().pop_front() else {
                return Ok(());
            };

            let destroyed = host_mut(&object).and_then(|mut host| host.destroy());
            if let Err(err) = destroyed {
                self.inner.objects.borrow_mut().push_front(object);
                return Err(err.into());
            }
        }
    }

    /// Register `callback` to run when the stage ends
    ///
    /// Callbacks run in registration order, before any tracked object is
    /// destroyed. Registering on an ended stage drops the callback.
    pub fn on_ended(&self, callback: impl FnOnce() + 'static) {
        if self.state() == StageState::Ended {
            debug!("Stage {} already ended; dropping end callback", self.inner.id);
            return;
        }
        self.inner.end_callbacks.borrow_mut().push(Box::new(callback));
    }

    /// Tear the stage down
    ///
    /// Runs the end callbacks, destroys the tracked objects, releases the
    /// position and marks the stage ended. Calling it again afterwards, or
    /// from inside an end callback, does nothing.
    ///
    /// If the host fails to destroy an object the stage returns to Active
    /// with that object and the rest still tracked, and keeps its position;
    /// callbacks that already ran do not run again.
    pub fn end(&self) -> Result<(), StageError> {
        match self.state() {
            StageState::Ended => {
                warn!("Stage {} ended more than once", self.inner.id);
                return Ok(());
            }
            StageState::Ending => return Ok(()),
            StageState::Active => {}
        }

        self.inner.state.set(StageState::Ending);
        self.run_end_callbacks();

        if let Err(err) = self.clear() {
            self.inner.state.set(StageState::Active);
            return Err(err);
        }

        if let Some(registry) = self.inner.registry.upgrade() {
            registry
                .borrow_mut()
                .release_stage(Coordinate::from(self.inner.world_position), self);
        }

        self.inner.state.set(StageState::Ended);
        info!("Ended stage {}", self.inner.id);
        Ok(())
    }

    /// Alias for [`Stage::end`]
    pub fn destroy(&self) -> Result<(), StageError> {
        self.end()
    }

    fn place(&self, object: &SharedObject, target: Vec3) -> Result<(), SceneError> {
        let mut host = host_mut(object)?;
        let name = host.name().to_owned();
        if host.capability().move_to(target) {
            debug!("Stage {} placed '{}' at {}", self.inner.id, name, Coordinate::from(target));
        } else {
            debug!("Stage {} tracking fixed object '{}' without moving it", self.inner.id, name);
        }
        Ok(())
    }

    // Callbacks may register further callbacks; those run in the same pass.
    fn run_end_callbacks(&self) {
        loop {
            let batch = std::mem::take(&mut *self.inner.end_callbacks.borrow_mut());
            if batch.is_empty() {
                break;
            }
            for callback in batch {
                callback();
            }
        }
    }
}

fn host_mut(object: &SharedObject) -> Result<RefMut<'_, dyn SceneObject + 'static>, SceneError> {
    object
        .try_borrow_mut()
        .map_err(|_| SceneError::Host("object is already borrowed".to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AllocatorConfig;
    use crate::scene::{share, Folder, Model, Part};
    use approx::assert_relative_eq;
    use std::rc::Rc;

    fn allocator() -> StageAllocator {
        StageAllocator::new(AllocatorConfig::new(
            Vec3::new(0.0, 0.0, 1000.0),
            Vec3::new(10000.0, 10000.0, 10000.0),
        ))
    }

    fn part(name: &str) -> Rc<RefCell<Part>> {
        Rc::new(RefCell::new(Part::new(name)))
    }

    /// Host object whose destruction can be made to fail
    struct Fragile {
        fail: bool,
        destroyed: Rc<Cell<u32>>,
    }

    impl SceneObject for Fragile {
        fn name(&self) -> &str {
            "fragile"
        }

        fn set_parent(&mut self, _parent: &SharedObject) -> Result<(), SceneError> {
            Ok(())
        }

        fn destroy(&mut self) -> Result<(), SceneError> {
            if self.fail {
                return Err(SceneError::Host("destroy refused".into()));
            }
            self.destroyed.set(self.destroyed.get() + 1);
            Ok(())
        }
    }

    #[test]
    fn test_new_stage_is_active() {
        let allocator = allocator();
        let stage = Stage::new(&allocator).unwrap();

        assert!(stage.is_active());
        assert_eq!(stage.state(), StageState::Active);
        assert_eq!(stage.world_position(), Vec3::new(10000.0, 10000.0, 10000.0));
        assert!(!stage.id().is_empty());
        assert_eq!(stage.object_count(), 0);
        assert_eq!(allocator.stage_at(stage.world_position()), Some(stage));
    }

    #[test]
    fn test_add_point_object_with_offset() {
        let stage = Stage::new(&allocator()).unwrap();
        let part = part("crate");

        stage.add(part.clone(), Some(Vec3::new(10.0, 20.0, 30.0))).unwrap();
        assert_relative_eq!(part.borrow().position(), stage.world_position() + Vec3::new(10.0, 20.0, 30.0));
    }

    #[test]
    fn test_add_composite_object_pivots() {
        let stage = Stage::new(&allocator()).unwrap();
        let model = Rc::new(RefCell::new(
            Model::new("ship").with_member("wing", Vec3::new(3.0, 0.0, 0.0)),
        ));

        stage.add(model.clone(), Some(Vec3::new(0.0, 5.0, 0.0))).unwrap();
        let pivot = stage.world_position() + Vec3::new(0.0, 5.0, 0.0);
        assert_relative_eq!(model.borrow().pivot(), pivot);
        assert_relative_eq!(model.borrow().member_position("wing").unwrap(), pivot + Vec3::new(3.0, 0.0, 0.0));
    }

    #[test]
    fn test_add_without_offset_leaves_object_in_place() {
        let stage = Stage::new(&allocator()).unwrap();
        let part = Rc::new(RefCell::new(Part::at("still", Vec3::new(1.0, 1.0, 1.0))));

        stage.add(part.clone(), None).unwrap();
        assert_eq!(part.borrow().position(), Vec3::new(1.0, 1.0, 1.0));
        assert_eq!(stage.object_count(), 1);
    }

    #[test]
    fn test_add_fixed_object_is_tracked() {
        let stage = Stage::new(&allocator()).unwrap();
        let folder = share(Folder::new("props"));

        stage.add(folder.clone(), Some(Vec3::new(1.0, 2.0, 3.0))).unwrap();
        assert!(stage.contains(&folder));
    }

    #[test]
    fn test_duplicate_add_and_first_occurrence_remove() {
        let stage = Stage::new(&allocator()).unwrap();
        let a: SharedObject = part("a");
        let b: SharedObject = part("b");

        stage.add(a.clone(), None).unwrap();
        stage.add(b.clone(), None).unwrap();
        stage.add(a.clone(), None).unwrap();
        assert_eq!(stage.object_count(), 3);

        assert!(stage.remove(&a));
        let objects = stage.objects();
        assert_eq!(objects.len(), 2);
        assert!(same_object(&objects[0], &b));
        assert!(same_object(&objects[1], &a));
    }

    #[test]
    fn test_remove_uses_identity_not_contents() {
        let stage = Stage::new(&allocator()).unwrap();
        let tracked: SharedObject = part("twin");
        let lookalike: SharedObject = part("twin");

        stage.add(tracked.clone(), None).unwrap();
        assert!(!stage.remove(&lookalike));
        assert!(stage.contains(&tracked));
    }

    #[test]
    fn test_removed_object_is_not_destroyed() {
        let stage = Stage::new(&allocator()).unwrap();
        let part = part("kept");
        let shared: SharedObject = part.clone();

        stage.add(shared.clone(), None).unwrap();
        stage.remove(&shared);
        stage.end().unwrap();
        assert!(!part.borrow().is_destroyed());
    }

    #[test]
    fn test_set_parent_reparents_all() {
        let stage = Stage::new(&allocator()).unwrap();
        let parent = share(Folder::new("workspace"));
        let a = part("a");
        let b = part("b");

        stage.add(a.clone(), None).unwrap();
        stage.add(b.clone(), None).unwrap();
        stage.set_parent(&parent).unwrap();

        assert!(same_object(&a.borrow().parent().unwrap(), &parent));
        assert!(same_object(&b.borrow().parent().unwrap(), &parent));
    }

    #[test]
    fn test_set_parent_on_empty_stage() {
        let stage = Stage::new(&allocator()).unwrap();
        stage.set_parent(&share(Folder::new("workspace"))).unwrap();
    }

    #[test]
    fn test_set_parent_propagates_host_error() {
        let stage = Stage::new(&allocator()).unwrap();
        let dead = part("dead");
        dead.borrow_mut().destroy().unwrap();
        stage.add(dead, None).unwrap();

        let err = stage.set_parent(&share(Folder::new("workspace"))).unwrap_err();
        assert_eq!(err, StageError::Scene(SceneError::Destroyed { name: "dead".into() }));
    }

    #[test]
    fn test_clear_keeps_stage_active() {
        let stage = Stage::new(&allocator()).unwrap();
        let a = part("a");
        stage.add(a.clone(), None).unwrap();

        stage.clear().unwrap();
        assert!(a.borrow().is_destroyed());
        assert_eq!(stage.object_count(), 0);
        assert!(stage.is_active());

        stage.add(part("b"), None).unwrap();
        assert_eq!(stage.object_count(), 1);
    }

    #[test]
    fn test_clear_failure_keeps_object_tracked() {
        let stage = Stage::new(&allocator()).unwrap();
        let count = Rc::new(Cell::new(0));
        let ok = share(Fragile { fail: false, destroyed: count.clone() });
        let bad = share(Fragile { fail: true, destroyed: count.clone() });

        stage.add(ok, None).unwrap();
        stage.add(bad.clone(), None).unwrap();

        let err = stage.clear().unwrap_err();
        assert_eq!(err.to_string(), "host error: destroy refused");
        assert_eq!(count.get(), 1);
        assert_eq!(stage.object_count(), 1);
        assert!(stage.contains(&bad));
    }

    #[test]
    fn test_end_callbacks_run_in_order_before_destruction() {
        let stage = Stage::new(&allocator()).unwrap();
        let part = part("observed");
        stage.add(part.clone(), None).unwrap();

        let log = Rc::new(RefCell::new(Vec::new()));
        for n in 1..=3 {
            let log = log.clone();
            let part = part.clone();
            stage.on_ended(move || {
                assert!(!part.borrow().is_destroyed());
                log.borrow_mut().push(n);
            });
        }

        stage.end().unwrap();
        assert_eq!(*log.borrow(), vec![1, 2, 3]);
        assert!(part.borrow().is_destroyed());
    }

    #[test]
    fn test_callback_can_inspect_stage() {
        let stage = Stage::new(&allocator()).unwrap();
        stage.add(part("a"), None).unwrap();
        stage.add(part("b"), None).unwrap();

        let seen = Rc::new(Cell::new(0));
        let observer = stage.clone();
        let seen_in_callback = seen.clone();
        stage.on_ended(move || {
            seen_in_callback.set(observer.objects().len());
            // Nested end is ignored while teardown is running
            observer.end().unwrap();
        });

        stage.end().unwrap();
        assert_eq!(seen.get(), 2);
        assert!(!stage.is_active());
    }

    #[test]
    fn test_callbacks_registered_while_ending_still_run() {
        let stage = Stage::new(&allocator()).unwrap();
        let log = Rc::new(RefCell::new(Vec::new()));

        let inner_stage = stage.clone();
        let inner_log = log.clone();
        stage.on_ended(move || {
            inner_log.borrow_mut().push("outer");
            let late_log = inner_log.clone();
            inner_stage.on_ended(move || late_log.borrow_mut().push("late"));
        });

        stage.end().unwrap();
        assert_eq!(*log.borrow(), vec!["outer", "late"]);
    }

    #[test]
    fn test_end_releases_position() {
        let allocator = allocator();
        let stage = Stage::new(&allocator).unwrap();
        let position = stage.world_position();

        stage.end().unwrap();
        assert!(!stage.is_active());
        assert!(!allocator.is_occupied(position));
        assert!(allocator.stages().is_empty());
    }

    #[test]
    fn test_end_is_idempotent() {
        let stage = Stage::new(&allocator()).unwrap();
        let calls = Rc::new(Cell::new(0));
        let counter = calls.clone();
        stage.on_ended(move || counter.set(counter.get() + 1));

        stage.end().unwrap();
        stage.end().unwrap();
        stage.destroy().unwrap();
        assert_eq!(calls.get(), 1);
    }

    #[test]
    fn test_add_after_end_is_rejected() {
        let stage = Stage::new(&allocator()).unwrap();
        stage.end().unwrap();

        let err = stage.add(part("late"), None).unwrap_err();
        assert_eq!(err, StageError::Ended { id: stage.id().to_string() });
    }

    #[test]
    fn test_failed_end_can_be_retried() {
        let allocator = allocator();
        let stage = Stage::new(&allocator).unwrap();
        let count = Rc::new(Cell::new(0));
        let fragile = Rc::new(RefCell::new(Fragile { fail: true, destroyed: count.clone() }));
        stage.add(fragile.clone(), None).unwrap();

        let calls = Rc::new(Cell::new(0));
        let counter = calls.clone();
        stage.on_ended(move || counter.set(counter.get() + 1));

        assert!(stage.end().is_err());
        assert_eq!(stage.state(), StageState::Active);
        assert!(allocator.is_occupied(stage.world_position()));

        fragile.borrow_mut().fail = false;
        stage.end().unwrap();
        assert_eq!(count.get(), 1);
        assert_eq!(calls.get(), 1);
        assert!(!allocator.is_occupied(stage.world_position()));
    }

    #[test]
    fn test_borrowed_object_reports_error() {
        let stage = Stage::new(&allocator()).unwrap();
        let part = part("busy");
        let _guard = part.borrow_mut();

        let err = stage.add(part.clone(), Some(Vec3::zeros())).unwrap_err();
        assert!(matches!(err, StageError::Scene(SceneError::Host(_))));
        assert_eq!(stage.object_count(), 0);
    }
}
