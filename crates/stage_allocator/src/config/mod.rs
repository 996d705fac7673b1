//! Configuration system
//!
//! [`AllocatorConfig`] holds the probing parameters used when a stage asks
//! for a position. It can be built in code or loaded from TOML / RON files
//! through the [`Config`] trait.

pub use serde::{Serialize, Deserialize};

use crate::foundation::math::Vec3;

/// Configuration trait
pub trait Config: Serialize + for<'de> Deserialize<'de> + Default {
    /// Load configuration from file
    fn load_from_file(path: &str) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)
            .map_err(ConfigError::Io)?;

        // Try different formats
        if path.ends_with(".toml") {
            toml::from_str(&contents).map_err(|e| ConfigError::Parse(e.to_string()))
        } else if path.ends_with(".ron") {
            ron::from_str(&contents).map_err(|e| ConfigError::Parse(e.to_string()))
        } else {
            Err(ConfigError::UnsupportedFormat(path.to_string()))
        }
    }

    /// Save configuration to file
    fn save_to_file(&self, path: &str) -> Result<(), ConfigError> {
        let contents = if path.ends_with(".toml") {
            toml::to_string_pretty(self).map_err(|e| ConfigError::Serialize(e.to_string()))?
        } else if path.ends_with(".ron") {
            ron::ser::to_string_pretty(self, ron::ser::PrettyConfig::default())
                .map_err(|e| ConfigError::Serialize(e.to_string()))?
        } else {
            return Err(ConfigError::UnsupportedFormat(path.to_string()));
        };

        std::fs::write(path, contents).map_err(ConfigError::Io)
    }
}

/// Configuration errors
#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Parse error
    #[error("Parse error: {0}")]
    Parse(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialize(String),

    /// Unsupported format
    #[error("Unsupported format: {0}")]
    UnsupportedFormat(String),
}

/// Default probe step between neighbouring stages
pub const DEFAULT_GAP: [f32; 3] = [0.0, 0.0, 1000.0];

/// Default first probe position
pub const DEFAULT_ORIGIN: [f32; 3] = [10000.0, 10000.0, 10000.0];

/// Default bound on probe steps per allocation
pub const DEFAULT_MAX_ATTEMPTS: u32 = 65_536;

/// # Allocator Configuration
///
/// Probing starts at `origin` and advances by `gap` until a free position
/// is found or `max_attempts` positions have been tested.
///
/// A zero `gap` is accepted but degenerate: once `origin` is taken every
/// further allocation exhausts its attempts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AllocatorConfig {
    /// Step added to the candidate position after each occupied probe
    pub gap: Vec3,
    /// First candidate position
    pub origin: Vec3,
    /// Maximum number of positions tested per allocation
    pub max_attempts: u32,
}

impl Default for AllocatorConfig {
    fn default() -> Self {
        Self {
            gap: Vec3::from(DEFAULT_GAP),
            origin: Vec3::from(DEFAULT_ORIGIN),
            max_attempts: DEFAULT_MAX_ATTEMPTS,
        }
    }
}

impl Config for AllocatorConfig {}

impl AllocatorConfig {
    /// Create a configuration with the given gap and origin
    pub fn new(gap: Vec3, origin: Vec3) -> Self {
        Self {
            gap,
            origin,
            ..Default::default()
        }
    }

    /// Builder pattern: Set the probe bound
    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    /// Whether probing can ever leave `origin`
    pub fn is_degenerate(&self) -> bool {
        self.gap == Vec3::zeros()
    }
}
