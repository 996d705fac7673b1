//! Stage allocation demo
//!
//! Opens a few arenas, fills them with props, recycles one of them and
//! finally tears every arena down.
//!
//! Usage: `stage_demo [config.toml|config.ron]`

use std::cell::RefCell;
use std::rc::Rc;

use stage_allocator::foundation::logging;
use stage_allocator::prelude::*;
use thiserror::Error;

// Arena layout
const NUM_ARENAS: usize = 3;
const PROPS_PER_ARENA: usize = 4;
const PROP_SPACING: f32 = 25.0;
const DEFAULT_CONFIG_PATH: &str = "stage_demo/stages.toml";

#[derive(Error, Debug)]
enum DemoError {
    #[error("configuration: {0}")]
    Config(#[from] ConfigError),

    #[error("stage: {0}")]
    Stage(#[from] StageError),
}

struct Arena {
    stage: Stage,
    // Keeps the parent alive for the tracked objects' weak links
    _root: SharedObject,
    props: Vec<Rc<RefCell<Part>>>,
}

fn load_allocator() -> Result<StageAllocator, DemoError> {
    match std::env::args().nth(1) {
        Some(path) => Ok(StageAllocator::from_config_file(&path)?),
        None if std::path::Path::new(DEFAULT_CONFIG_PATH).exists() => {
            Ok(StageAllocator::from_config_file(DEFAULT_CONFIG_PATH)?)
        }
        None => {
            log::info!("No configuration file found, using defaults");
            Ok(StageAllocator::default())
        }
    }
}

fn open_arena(allocator: &StageAllocator, name: &str) -> Result<Arena, DemoError> {
    let stage = Stage::new(allocator)?;
    let root = share(Folder::new(format!("{name}_root")));

    let mut props = Vec::with_capacity(PROPS_PER_ARENA);
    for i in 0..PROPS_PER_ARENA {
        let prop = Rc::new(RefCell::new(Part::new(format!("{name}_prop_{i}"))));
        #[allow(clippy::cast_precision_loss)]
        let offset = Vec3::new(i as f32 * PROP_SPACING, 0.0, 0.0);
        stage.add(prop.clone(), Some(offset))?;
        props.push(prop);
    }

    let centerpiece = share(
        Model::new(format!("{name}_tower"))
            .with_member("base", Vec3::zeros())
            .with_member("top", Vec3::new(0.0, 40.0, 0.0)),
    );
    stage.add(centerpiece, Some(Vec3::new(0.0, 0.0, -50.0)))?;
    stage.set_parent(&root)?;

    let id = stage.id().to_string();
    let prop_count = props.len();
    stage.on_ended(move || log::info!("Arena {} closing with {} props", id, prop_count));

    log::info!(
        "Opened {} at ({}, {}, {}) with {} objects",
        name,
        stage.world_position().x,
        stage.world_position().y,
        stage.world_position().z,
        stage.object_count()
    );
    Ok(Arena { stage, _root: root, props })
}

fn run() -> Result<(), DemoError> {
    let allocator = load_allocator()?;
    log::info!("Allocator configuration: {:?}", allocator.config());

    let mut arenas = Vec::with_capacity(NUM_ARENAS);
    for i in 0..NUM_ARENAS {
        arenas.push(open_arena(&allocator, &format!("arena_{i}"))?);
    }

    // Recycle the middle arena; the replacement takes over its slot
    let recycled = arenas.remove(NUM_ARENAS / 2);
    let freed = recycled.stage.world_position();
    recycled.stage.end()?;
    let destroyed = recycled.props.iter().filter(|p| p.borrow().is_destroyed()).count();
    log::info!("Recycled arena destroyed {} props", destroyed);

    let replacement = open_arena(&allocator, "arena_replacement")?;
    if replacement.stage.world_position() == freed {
        log::info!("Replacement arena reused the freed slot");
    }
    arenas.push(replacement);

    log::info!("{} arenas active", allocator.len());
    allocator.end_stages()?;
    log::info!(
        "All arenas ended; {} props left standing",
        arenas
            .iter()
            .flat_map(|arena| &arena.props)
            .filter(|p| !p.borrow().is_destroyed())
            .count()
    );
    Ok(())
}

fn main() {
    logging::init();
    log::info!("Starting stage allocation demo");

    if let Err(err) = run() {
        log::error!("Demo failed: {}", err);
        std::process::exit(1);
    }
}
