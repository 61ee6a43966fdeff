//! Subsystem configuration
//!
//! Loaded from TOML. Every field has a default, so an empty document is a
//! valid configuration.
//!
//! ```toml
//! world_kind = "editor"     # editor, editor_preview, game
//! load_on_register = true
//! max_hierarchy_depth = 64
//! max_passes_per_tick = 16
//! max_blocking_ticks = 1024
//! log_tick_summary = true
//! ```

use std::fmt;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Kind of world the subsystem serves
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorldKind {
    /// Authoring world; edit sessions are allowed
    Editor,
    /// Preview world inside a tool
    EditorPreview,
    /// Running game world
    Game,
}

impl Default for WorldKind {
    fn default() -> Self {
        Self::Editor
    }
}

impl WorldKind {
    /// Whether edit sessions may be opened in this world
    pub fn allows_editing(self) -> bool {
        matches!(self, Self::Editor)
    }
}

impl fmt::Display for WorldKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Editor => write!(f, "editor"),
            Self::EditorPreview => write!(f, "editor preview"),
            Self::Game => write!(f, "game"),
        }
    }
}

/// Configuration for [`Foundation`](crate::Foundation)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FoundationConfig {
    /// World this subsystem belongs to
    pub world_kind: WorldKind,
    /// Request a load as soon as a node with content registers
    pub load_on_register: bool,
    /// Longest ancestor chain walked before giving up
    pub max_hierarchy_depth: usize,
    /// Passes per tick spent loading content discovered inside new instances
    pub max_passes_per_tick: u32,
    /// Ticks a blocking load may spend waiting for the queue to drain
    pub max_blocking_ticks: u32,
    /// Log a summary line after each tick that did work
    pub log_tick_summary: bool,
}

impl Default for FoundationConfig {
    fn default() -> Self {
        Self {
            world_kind: WorldKind::Editor,
            load_on_register: true,
            max_hierarchy_depth: 64,
            max_passes_per_tick: 16,
            max_blocking_ticks: 1024,
            log_tick_summary: true,
        }
    }
}

impl FoundationConfig {
    /// Config for a running game world
    pub fn game() -> Self {
        Self {
            world_kind: WorldKind::Game,
            ..Default::default()
        }
    }

    /// Parse from a TOML document
    pub fn from_toml_str(source: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(source)?;
        config.validate()?;
        Ok(config)
    }

    /// Load from a TOML file
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let source = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&source)
    }

    /// Reject limits that would stall the scheduler
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_hierarchy_depth == 0 {
            return Err(ConfigError::Validation("max_hierarchy_depth must be > 0".into()));
        }
        if self.max_passes_per_tick == 0 {
            return Err(ConfigError::Validation("max_passes_per_tick must be > 0".into()));
        }
        if self.max_blocking_ticks == 0 {
            return Err(ConfigError::Validation("max_blocking_ticks must be > 0".into()));
        }
        Ok(())
    }
}
