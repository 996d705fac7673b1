//! Stage identifier generation

use uuid::Uuid;

/// Generator of globally unique stage identifiers
///
/// Uniqueness is the generator's responsibility; the allocator never
/// checks ids against each other.
pub trait IdSource {
    /// Produce the next identifier
    fn next_id(&mut self) -> String;
}

/// Random UUID (v4) identifiers, the default source
#[derive(Debug, Default, Clone, Copy)]
pub struct UuidIds;

impl IdSource for UuidIds {
    fn next_id(&mut self) -> String {
        Uuid::new_v4().to_string()
    }
}

/// Counter-based identifiers such as `stage-0`, `stage-1`, ...
#[derive(Debug, Clone)]
pub struct SequentialIds {
    prefix: String,
    next: u64,
}

impl SequentialIds {
    /// Create a source that numbers ids from zero under `prefix`
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            next: 0,
        }
    }
}

impl IdSource for SequentialIds {
    fn next_id(&mut self) -> String {
        let id = format!("{}-{}", self.prefix, self.next);
        self.next += 1;
        id
    }
}
