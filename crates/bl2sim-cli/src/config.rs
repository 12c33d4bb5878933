//! TOML configuration deserialisation for simulation jobs.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use anyhow::Context;
use bl2sim_core::actions::OutputSettings;
use bl2sim_core::correlator::CorrelatorConfig;
use serde::Deserialize;

/// Top-level job configuration.
#[derive(Debug, Deserialize)]
pub struct JobConfig {
    pub run: RunConfig,
    #[serde(default)]
    pub world: WorldConfig,
    #[serde(default, rename = "module")]
    pub modules: Vec<ModuleConfig>,
    #[serde(default)]
    pub output: OutputSettings,
    #[serde(default)]
    pub correlator: CorrelatorConfig,
}

/// Event source and scheduling.
#[derive(Debug, Deserialize)]
pub struct RunConfig {
    /// JSON-lines file of recorded events. Relative paths are resolved
    /// against the job file's directory.
    pub events: PathBuf,
    #[serde(default = "default_threads")]
    pub threads: usize,
    /// Events to run when no macro or session is given. Default: every
    /// recorded event.
    #[serde(default)]
    pub beam_on: Option<u64>,
}

fn default_threads() -> usize {
    1
}

/// The world volume.
#[derive(Debug, Deserialize)]
pub struct WorldConfig {
    #[serde(default = "default_world_half_length")]
    pub half_length_mm: f64,
    #[serde(default = "default_world_material")]
    pub material: String,
}

impl Default for WorldConfig {
    fn default() -> Self {
        Self {
            half_length_mm: default_world_half_length(),
            material: default_world_material(),
        }
    }
}

fn default_world_half_length() -> f64 {
    2000.0
}
fn default_world_material() -> String {
    "G4_Galactic".into()
}

/// One geometry module, in registration order.
#[derive(Debug, Deserialize)]
pub struct ModuleConfig {
    pub name: String,
    #[serde(default)]
    pub mother: Option<String>,
    /// Options applied through `configure` before construction.
    #[serde(default)]
    pub options: BTreeMap<String, String>,
}

/// Load and parse a TOML job configuration file.
pub fn load_config(path: &Path) -> anyhow::Result<JobConfig> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read job file '{}'", path.display()))?;
    let mut config: JobConfig = toml::from_str(&content)
        .with_context(|| format!("Failed to parse job file '{}'", path.display()))?;

    if config.run.events.is_relative() {
        if let Some(dir) = path.parent() {
            config.run.events = dir.join(&config.run.events);
        }
    }
    if config.modules.is_empty() {
        log::warn!("job '{}' declares no geometry modules", path.display());
    }
    Ok(config)
}
