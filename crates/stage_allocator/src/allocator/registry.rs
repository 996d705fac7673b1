//! Stage registry and position allocation
//!
//! The registry maps each occupied [`Coordinate`] to the stage holding it.
//! Allocation walks `origin, origin + gap, origin + 2 * gap, ...` and takes
//! the first position nobody occupies, giving up after
//! [`AllocatorConfig::max_attempts`] probes.

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use indexmap::IndexMap;
use log::{debug, info, trace, warn};
use thiserror::Error;

use crate::config::{AllocatorConfig, Config, ConfigError};
use crate::foundation::ids::{IdSource, UuidIds};
use crate::foundation::math::{Coordinate, Vec3};
use crate::foundation::time::{Clock, MonotonicClock};
use crate::stage::{Stage, StageError};

/// Allocation failures
#[derive(Error, Debug, Clone, PartialEq)]
pub enum AllocatorError {
    /// Every probed position was occupied
    #[error(
        "no free stage position within {attempts} probes from ({}, {}, {}) stepping by ({}, {}, {})",
        .origin.x, .origin.y, .origin.z, .gap.x, .gap.y, .gap.z
    )]
    Exhausted {
        /// First probed position
        origin: Vec3,
        /// Probe step
        gap: Vec3,
        /// Number of positions tested
        attempts: u32,
    },
}

/// Shared state behind a [`StageAllocator`]
pub(crate) struct Registry {
    config: AllocatorConfig,
    occupied: IndexMap<Coordinate, Stage>,
    clock: Box<dyn Clock>,
    ids: Box<dyn IdSource>,
}

impl Registry {
    fn new(config: AllocatorConfig) -> Self {
        Self {
            config,
            occupied: IndexMap::new(),
            clock: Box::new(MonotonicClock::new()),
            ids: Box::new(UuidIds),
        }
    }

    /// Find the first free position along the configured probe line
    fn probe(&self) -> Result<Vec3, AllocatorError> {
        let AllocatorConfig { gap, origin, max_attempts } = self.config;

        for attempt in 0..max_attempts {
            #[allow(clippy::cast_precision_loss)]
            let candidate = origin + gap * attempt as f32;
            let key = Coordinate::from(candidate);

            if !self.occupied.contains_key(&key) {
                trace!("Probe {} found free position {}", attempt, key);
                return Ok(candidate);
            }
            trace!("Probe {} hit occupied position {}", attempt, key);

            if self.config.is_degenerate() {
                warn!("Zero gap configured; no position other than {} can be probed", key);
                return Err(AllocatorError::Exhausted { origin, gap, attempts: attempt + 1 });
            }
        }

        Err(AllocatorError::Exhausted { origin, gap, attempts: max_attempts })
    }

    /// Remove the entry for `key` only if `stage` still holds it
    pub(crate) fn release_stage(&mut self, key: Coordinate, stage: &Stage) {
        if self.occupied.get(&key).is_some_and(|holder| holder == stage) {
            self.occupied.shift_remove(&key);
            debug!("Released position {} from stage {}", key, stage.id());
        }
    }
}

/// Owner of the stage registry and probing configuration
///
/// Cloning produces another handle to the same registry. Independent
/// allocators never see each other's stages. The handle is single-threaded
/// (`!Send`); each thread or world should build its own.
#[derive(Clone)]
pub struct StageAllocator {
    registry: Rc<RefCell<Registry>>,
}

impl Default for StageAllocator {
    fn default() -> Self {
        Self::new(AllocatorConfig::default())
    }
}

impl fmt::Debug for StageAllocator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let registry = self.registry.borrow();
        f.debug_struct("StageAllocator")
            .field("config", &registry.config)
            .field("stages", &registry.occupied.len())
            .finish_non_exhaustive()
    }
}

impl StageAllocator {
    /// Create an allocator with the given configuration
    pub fn new(config: AllocatorConfig) -> Self {
        if config.is_degenerate() {
            warn!("Stage allocator created with a zero gap");
        }
        Self {
            registry: Rc::new(RefCell::new(Registry::new(config))),
        }
    }

    /// Create an allocator from a TOML or RON configuration file
    pub fn from_config_file(path: &str) -> Result<Self, ConfigError> {
        let config = AllocatorConfig::load_from_file(path)?;
        info!("Loaded allocator configuration from {}", path);
        Ok(Self::new(config))
    }

    /// Builder pattern: Replace the timestamp source
    pub fn with_clock(self, clock: impl Clock + 'static) -> Self {
        self.registry.borrow_mut().clock = Box::new(clock);
        self
    }

    /// Builder pattern: Replace the stage id source
    pub fn with_id_source(self, ids: impl IdSource + 'static) -> Self {
        self.registry.borrow_mut().ids = Box::new(ids);
        self
    }

    /// Update the probe step and start point
    ///
    /// `None` leaves the corresponding value unchanged. Existing stages
    /// keep their positions; only later allocations are affected.
    pub fn initialize(&self, gap: Option<Vec3>, origin: Option<Vec3>) {
        let mut registry = self.registry.borrow_mut();
        if let Some(gap) = gap {
            registry.config.gap = gap;
        }
        if let Some(origin) = origin {
            registry.config.origin = origin;
        }
        if registry.config.is_degenerate() {
            warn!("Stage allocator configured with a zero gap");
        }
        debug!(
            "Allocator configured: gap {}, origin {}",
            Coordinate::from(registry.config.gap),
            Coordinate::from(registry.config.origin)
        );
    }

    /// Change the bound on probe steps per allocation
    pub fn set_max_attempts(&self, max_attempts: u32) {
        self.registry.borrow_mut().config.max_attempts = max_attempts;
    }

    /// Snapshot of the current configuration
    pub fn config(&self) -> AllocatorConfig {
        self.registry.borrow().config.clone()
    }

    /// Current timestamp from the allocator's clock
    pub fn now(&self) -> f64 {
        self.registry.borrow().clock.now()
    }

    /// Allocate a position and register a new active stage there
    pub fn create_stage(&self) -> Result<Stage, StageError> {
        let handle = Rc::downgrade(&self.registry);
        let mut registry = self.registry.borrow_mut();

        let position = registry.probe()?;
        let id = registry.ids.next_id();
        let created_at = registry.clock.now();
        let stage = Stage::from_parts(id, created_at, position, handle);

        let key = Coordinate::from(position);
        registry.occupied.insert(key, stage.clone());
        info!("Created stage {} at {}", stage.id(), key);

        Ok(stage)
    }

    /// Free `position`, returning the stage that held it
    ///
    /// Releasing a free position does nothing. The released stage itself
    /// is left untouched.
    pub fn release(&self, position: Vec3) -> Option<Stage> {
        let key = Coordinate::from(position);
        let released = self.registry.borrow_mut().occupied.shift_remove(&key);
        if let Some(stage) = &released {
            debug!("Released position {} from stage {}", key, stage.id());
        }
        released
    }

    /// All registered stages, in creation order
    pub fn stages(&self) -> Vec<Stage> {
        self.registry.borrow().occupied.values().cloned().collect()
    }

    /// The stage occupying `position`, if any
    pub fn stage_at(&self, position: Vec3) -> Option<Stage> {
        self.registry
            .borrow()
            .occupied
            .get(&Coordinate::from(position))
            .cloned()
    }

    /// Whether a stage occupies `position`
    pub fn is_occupied(&self, position: Vec3) -> bool {
        self.registry
            .borrow()
            .occupied
            .contains_key(&Coordinate::from(position))
    }

    /// Number of registered stages
    pub fn len(&self) -> usize {
        self.registry.borrow().occupied.len()
    }

    /// Whether no stage is registered
    pub fn is_empty(&self) -> bool {
        self.registry.borrow().occupied.is_empty()
    }

    /// End every registered stage, then clear the registry
    ///
    /// Works from a snapshot, so stages removing themselves while ending
    /// are neither skipped nor processed twice. A host failure stops the
    /// sweep and leaves the remaining stages registered.
    pub fn end_stages(&self) -> Result<(), StageError> {
        let snapshot = self.stages();
        info!("Ending {} stage(s)", snapshot.len());

        for stage in &snapshot {
            stage.end()?;
        }

        let leftover = std::mem::take(&mut self.registry.borrow_mut().occupied);
        if !leftover.is_empty() {
            debug!("Dropping {} stage(s) registered during teardown", leftover.len());
        }
        drop(leftover);
        Ok(())
    }
}
