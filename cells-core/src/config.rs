//! Runtime Configuration
//!
//! A handful of knobs that change how strict the engine is. Every field has
//! a default, so an empty JSON object is a valid configuration.

use serde::{Deserialize, Deserializer, Serialize};

use crate::graph::Tick;

/// Configuration for a [`Runtime`](crate::reactive::Runtime).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    /// The tick a fresh or reset runtime starts at. Must be at least 1;
    /// tick 0 is what a cell that never ran reports.
    #[serde(deserialize_with = "positive_tick")]
    pub initial_tick: Tick,

    /// Fail a `set()` on a cell that is notifying its dependents. When
    /// false, such a write is deferred like any other mid-propagation write.
    pub reject_reentrant_writes: bool,

    /// Upper bound on deferred writes applied by one drain. `None` means
    /// unbounded.
    pub max_drain_rounds: Option<usize>,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            initial_tick: 1,
            reject_reentrant_writes: true,
            max_drain_rounds: None,
        }
    }
}

fn positive_tick<'de, D>(deserializer: D) -> Result<Tick, D::Error>
where
    D: Deserializer<'de>,
{
    let tick = Tick::deserialize(deserializer)?;
    if tick == 0 {
        return Err(serde::de::Error::custom("initial_tick must be at least 1"));
    }
    Ok(tick)
}

impl RuntimeConfig {
    /// Parse a configuration from JSON.
    pub fn from_json(json: &str) -> serde_json::Result<Self> {
        serde_json::from_str(json)
    }
}
