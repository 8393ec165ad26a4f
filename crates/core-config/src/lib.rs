//! Scene/job configuration: `ConfigData` plus the TOML loader that produces it.
//!
//! `ConfigData` is read-shared input: created once at job start by
//! [`load_scene`], never mutated after dispatch. `rank`/`proc_count` are not
//! part of the on-disk file — the runtime stamps them onto a per-rank clone
//! just before a rank starts (see `core-runtime`).

use serde::Deserialize;
use std::{fs, path::Path};
use thiserror::Error;

/// The five partitioning disciplines this core coordinates between, plus an
/// `Unsupported` catch-all so an unrecognized mode string is a configuration
/// error the coordinator can report, not a parse failure.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum PartitioningMode {
    None,
    StaticStripsVertical,
    StaticBlocks,
    StaticCyclesHorizontal,
    Dynamic,
    Unsupported(String),
}

impl std::fmt::Display for PartitioningMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            PartitioningMode::None => "NONE",
            PartitioningMode::StaticStripsVertical => "STATIC_STRIPS_VERTICAL",
            PartitioningMode::StaticBlocks => "STATIC_BLOCKS",
            PartitioningMode::StaticCyclesHorizontal => "STATIC_CYCLES_HORIZONTAL",
            PartitioningMode::Dynamic => "DYNAMIC",
            PartitioningMode::Unsupported(raw) => return write!(f, "{raw}"),
        };
        f.write_str(s)
    }
}

impl<'de> Deserialize<'de> for PartitioningMode {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        Ok(match raw.as_str() {
            "none" => PartitioningMode::None,
            "static_strips_vertical" => PartitioningMode::StaticStripsVertical,
            "static_blocks" => PartitioningMode::StaticBlocks,
            "static_cycles_horizontal" => PartitioningMode::StaticCyclesHorizontal,
            "dynamic" => PartitioningMode::Dynamic,
            other => PartitioningMode::Unsupported(other.to_string()),
        })
    }
}

/// Input-only, read-shared job configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct ConfigData {
    pub scene_id: String,
    pub width: u32,
    pub height: u32,
    pub partitioning_mode: PartitioningMode,
    pub dynamic_block_width: u32,
    pub dynamic_block_height: u32,
    pub cycle_size: u32,
    pub rank: u32,
    pub proc_count: u32,
    /// Scene-loader passthrough; the core never reads these keys itself.
    pub extra: toml::value::Table,
}

impl ConfigData {
    /// Returns a copy stamped with this run's `rank`/`proc_count`, as handed
    /// to each rank thread at dispatch.
    pub fn for_rank(&self, rank: u32, proc_count: u32) -> Self {
        Self {
            rank,
            proc_count,
            ..self.clone()
        }
    }
}

#[derive(Debug, Deserialize, Default)]
struct DynamicBlockFile {
    #[serde(default = "default_block_dim")]
    width: u32,
    #[serde(default = "default_block_dim")]
    height: u32,
}

const fn default_block_dim() -> u32 {
    32
}

const fn default_cycle_size() -> u32 {
    1
}

#[derive(Debug, Deserialize)]
struct SceneFile {
    scene_id: String,
    width: u32,
    height: u32,
    partitioning_mode: PartitioningMode,
    #[serde(default)]
    dynamic_block: DynamicBlockFile,
    #[serde(default = "default_cycle_size")]
    cycle_size: u32,
    #[serde(flatten)]
    extra: toml::value::Table,
}

/// Errors raised while loading a scene configuration file.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not read scene file {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("could not parse scene file {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: toml::de::Error,
    },
    #[error("width and height must be positive, got {width}x{height}")]
    NonPositiveDimensions { width: u32, height: u32 },
    #[error("dynamicBlockWidth/Height must be positive for DYNAMIC mode")]
    NonPositiveBlockSize,
    #[error("cycleSize must be positive for STATIC_CYCLES_HORIZONTAL mode")]
    NonPositiveCycleSize,
}

/// Loads a scene configuration from a TOML file.
///
/// Produced `ConfigData` has `rank = 0`, `proc_count = 1`; callers stamp the
/// real values per-rank via [`ConfigData::for_rank`].
pub fn load_scene(path: impl AsRef<Path>) -> Result<ConfigData, ConfigError> {
    let path = path.as_ref();
    let content = fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.display().to_string(),
        source,
    })?;
    parse_scene(&content, &path.display().to_string())
}

fn parse_scene(content: &str, path_label: &str) -> Result<ConfigData, ConfigError> {
    let file: SceneFile = toml::from_str(content).map_err(|source| ConfigError::Parse {
        path: path_label.to_string(),
        source,
    })?;

    if file.width == 0 || file.height == 0 {
        return Err(ConfigError::NonPositiveDimensions {
            width: file.width,
            height: file.height,
        });
    }
    if file.partitioning_mode == PartitioningMode::Dynamic
        && (file.dynamic_block.width == 0 || file.dynamic_block.height == 0)
    {
        return Err(ConfigError::NonPositiveBlockSize);
    }
    if file.partitioning_mode == PartitioningMode::StaticCyclesHorizontal && file.cycle_size == 0 {
        return Err(ConfigError::NonPositiveCycleSize);
    }

    tracing::info!(
        target: "config",
        scene_id = %file.scene_id,
        width = file.width,
        height = file.height,
        mode = %file.partitioning_mode,
        "scene_loaded"
    );

    Ok(ConfigData {
        scene_id: file.scene_id,
        width: file.width,
        height: file.height,
        partitioning_mode: file.partitioning_mode,
        dynamic_block_width: file.dynamic_block.width,
        dynamic_block_height: file.dynamic_block.height,
        cycle_size: file.cycle_size,
        rank: 0,
        proc_count: 1,
        extra: file.extra,
    })
}
