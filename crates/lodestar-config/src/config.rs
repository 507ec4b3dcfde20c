//! Configuration structs with sensible defaults and RON persistence.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Top-level configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Config {
    /// Frame-loop scheduler settings.
    pub scheduler: SchedulerConfig,
    /// Merge-group templates, matched against entity grouping keys in order.
    pub combiners: Vec<CombinerPrototype>,
    /// Debug/development settings.
    pub debug: DebugConfig,
    /// Settings for the simulated demo scene.
    pub demo: DemoConfig,
}

/// Scheduler configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Ceiling on budgeted bake time per frame, in milliseconds.
    pub frame_budget_ms: f64,
    /// Each entity is re-evaluated once every this many frames.
    pub check_interval_frames: u32,
    /// Combiners reclaim memory after this many completed bakes.
    pub reclaim_interval_bakes: u32,
    /// A combiner deferred for longer than this is baked unconditionally.
    pub max_deferred_frames: u32,
    /// Re-validate entity invariants after every mutating operation.
    pub integrity_checks: bool,
    /// Field of view used for switch distances until an observer provides one.
    pub default_fov_degrees: f32,
}

/// A merge-group template. Entities whose material set and lightmap match
/// (and whose label matches, when they carry one) share a combiner.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct CombinerPrototype {
    /// Optional label used to disambiguate prototypes with the same key.
    pub label: Option<String>,
    /// Material ids, compared as a set.
    pub materials: Vec<u32>,
    /// Lightmap index shared by the group (-1 = none).
    pub lightmap_index: i32,
    /// Maximum vertices a single merged output may hold.
    pub max_vertices: u32,
    /// Spatial cell size of the group in world units.
    pub cell_size: f32,
    /// Time a single bake of this group may take, in milliseconds.
    pub time_budget_ms: f32,
}

/// Debug/development configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct DebugConfig {
    /// Log level override (e.g., "debug", "info", "warn").
    pub log_level: String,
    /// Write JSON logs in release builds too (debug builds always do).
    pub log_to_file: bool,
}

/// Simulated scene used by the demo binary.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct DemoConfig {
    /// Number of entities scattered across the scene.
    pub entity_count: u32,
    /// Half-width of the square area entities are scattered in.
    pub spread: f32,
    /// Number of frames to simulate.
    pub frames: u32,
    /// Observer speed in world units per frame.
    pub observer_speed: f32,
    /// Seed for the entity placement generator.
    pub seed: u64,
}

// --- Default implementations ---

impl Default for Config {
    fn default() -> Self {
        Self {
            scheduler: SchedulerConfig::default(),
            combiners: vec![CombinerPrototype::default()],
            debug: DebugConfig::default(),
            demo: DemoConfig::default(),
        }
    }
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            frame_budget_ms: 2.0,
            check_interval_frames: 4,
            reclaim_interval_bakes: 64,
            max_deferred_frames: 30,
            integrity_checks: false,
            default_fov_degrees: 60.0,
        }
    }
}

impl Default for CombinerPrototype {
    fn default() -> Self {
        Self {
            label: None,
            materials: vec![0],
            lightmap_index: -1,
            max_vertices: 65_535,
            cell_size: 64.0,
            time_budget_ms: 1.0,
        }
    }
}

impl Default for DebugConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_to_file: false,
        }
    }
}

impl Default for DemoConfig {
    fn default() -> Self {
        Self {
            entity_count: 200,
            spread: 400.0,
            frames: 600,
            observer_speed: 1.5,
            seed: 42,
        }
    }
}

impl CombinerPrototype {
    /// Whether `materials` holds the same set of ids as this prototype.
    #[must_use]
    pub fn matches_materials(&self, materials: &[u32]) -> bool {
        let mut ours = self.materials.clone();
        let mut theirs = materials.to_vec();
        ours.sort_unstable();
        ours.dedup();
        theirs.sort_unstable();
        theirs.dedup();
        ours == theirs
    }
}

const CONFIG_FILE: &str = "config.ron";

/// Platform config directory for Lodestar (e.g. `~/.config/lodestar`).
#[must_use]
pub fn default_config_dir() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("lodestar")
}

// --- Load / Save / Reload ---

impl Config {
    /// Load config from the given directory, or create a default config file.
    pub fn load_or_create(config_dir: &Path) -> Result<Self, ConfigError> {
        let config_path = config_dir.join(CONFIG_FILE);

        if config_path.exists() {
            let config = Self::read(&config_path)?;
            log::info!("Loaded config from {}", config_path.display());
            Ok(config)
        } else {
            let config = Config::default();
            config.save(config_dir)?;
            log::info!("Created default config at {}", config_path.display());
            Ok(config)
        }
    }

    /// Save config to the given directory as `config.ron`.
    pub fn save(&self, config_dir: &Path) -> Result<(), ConfigError> {
        std::fs::create_dir_all(config_dir).map_err(|source| ConfigError::Write {
            path: config_dir.to_path_buf(),
            source,
        })?;

        let pretty = ron::ser::PrettyConfig::new()
            .depth_limit(3)
            .separate_tuple_members(true)
            .enumerate_arrays(false);
        let serialized =
            ron::ser::to_string_pretty(self, pretty).map_err(ConfigError::Serialize)?;

        let config_path = config_dir.join(CONFIG_FILE);
        std::fs::write(&config_path, serialized).map_err(|source| ConfigError::Write {
            path: config_path,
            source,
        })
    }

    /// Re-read the file; `Some` only when its contents differ from `self`.
    pub fn reload(&self, config_dir: &Path) -> Result<Option<Self>, ConfigError> {
        let new_config = Self::read(&config_dir.join(CONFIG_FILE))?;
        if &new_config == self {
            return Ok(None);
        }
        log::info!("Config reloaded with changes");
        Ok(Some(new_config))
    }

    /// Reject values the scheduler cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let scheduler = &self.scheduler;
        if !(scheduler.frame_budget_ms.is_finite() && scheduler.frame_budget_ms > 0.0) {
            return Err(ConfigError::Invalid {
                field: "scheduler.frame_budget_ms",
                reason: "must be a positive number",
            });
        }
        if scheduler.check_interval_frames == 0 {
            return Err(ConfigError::Invalid {
                field: "scheduler.check_interval_frames",
                reason: "must be at least 1",
            });
        }
        if scheduler.reclaim_interval_bakes == 0 {
            return Err(ConfigError::Invalid {
                field: "scheduler.reclaim_interval_bakes",
                reason: "must be at least 1",
            });
        }
        if !(scheduler.default_fov_degrees > 0.0 && scheduler.default_fov_degrees < 180.0) {
            return Err(ConfigError::Invalid {
                field: "scheduler.default_fov_degrees",
                reason: "must lie strictly between 0 and 180",
            });
        }
        Ok(())
    }

    fn read(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let config: Config = ron::from_str(&contents).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        config.validate()?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_serializes() {
        let config = Config::default();
        let ron_str =
            ron::ser::to_string_pretty(&config, ron::ser::PrettyConfig::new().depth_limit(3))
                .unwrap();
        assert!(!ron_str.is_empty());
        assert!(ron_str.contains("frame_budget_ms: 2.0"));
        assert!(ron_str.contains("max_vertices: 65535"));
    }

    #[test]
    fn test_config_roundtrip() {
        let mut config = Config::default();
        config.combiners.push(CombinerPrototype {
            label: Some("foliage".to_string()),
            materials: vec![3, 4],
            ..CombinerPrototype::default()
        });
        let ron_str = ron::to_string(&config).unwrap();
        let deserialized: Config = ron::from_str(&ron_str).unwrap();
        assert_eq!(config, deserialized);
    }

    #[test]
    fn test_missing_field_uses_default() {
        // Config missing the `demo` section entirely
        let ron_str = "(scheduler: (frame_budget_ms: 4.0), debug: ())";
        let config: Config = ron::from_str(ron_str).unwrap();
        assert_eq!(config.demo, DemoConfig::default());
        assert_eq!(config.scheduler.frame_budget_ms, 4.0);
        assert_eq!(config.scheduler.check_interval_frames, 4);
    }

    #[test]
    fn test_extra_field_ignored() {
        let ron_str = "(future_setting: true)";
        let result: Result<Config, _> = ron::from_str(ron_str);
        assert!(result.is_ok());
    }

    /// Material sets compare without regard to order or duplicates.
    #[test]
    fn test_material_set_matching() {
        let prototype = CombinerPrototype {
            materials: vec![2, 1, 7],
            ..CombinerPrototype::default()
        };
        assert!(prototype.matches_materials(&[7, 2, 1]));
        assert!(prototype.matches_materials(&[1, 1, 2, 7]));
        assert!(!prototype.matches_materials(&[1, 2]));
        assert!(!prototype.matches_materials(&[1, 2, 7, 8]));
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = Config::default();
        config.scheduler.frame_budget_ms = 5.0;
        config.debug.log_level = "debug".to_string();

        config.save(dir.path()).unwrap();
        let loaded = Config::load_or_create(dir.path()).unwrap();
        assert_eq!(config, loaded);
    }

    #[test]
    fn test_load_creates_default_file() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::load_or_create(dir.path()).unwrap();
        assert_eq!(config, Config::default());
        assert!(dir.path().join("config.ron").exists());
    }

    #[test]
    fn test_reload_detects_changes() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::default();
        config.save(dir.path()).unwrap();

        let mut modified = config.clone();
        modified.scheduler.integrity_checks = true;
        modified.save(dir.path()).unwrap();

        let result = config.reload(dir.path()).unwrap();
        assert!(result.is_some());
        assert!(result.unwrap().scheduler.integrity_checks);
    }

    #[test]
    fn test_reload_no_changes() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::default();
        config.save(dir.path()).unwrap();

        let result = config.reload(dir.path()).unwrap();
        assert!(result.is_none());
    }

    #[test]
    fn test_invalid_ron_produces_error() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("config.ron"), "{{not valid}}").unwrap();
        let err = Config::load_or_create(dir.path()).unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
        assert!(err.to_string().contains("config.ron"));
    }

    /// A zero check interval would stall every entity, so loading refuses it.
    #[test]
    fn test_out_of_range_values_rejected() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("config.ron"),
            "(scheduler: (check_interval_frames: 0))",
        )
        .unwrap();
        let err = Config::load_or_create(dir.path()).unwrap_err();
        assert!(matches!(
            err,
            ConfigError::Invalid {
                field: "scheduler.check_interval_frames",
                ..
            }
        ));

        let mut config = Config::default();
        config.scheduler.default_fov_degrees = 180.0;
        assert!(config.validate().is_err());
        config.scheduler.default_fov_degrees = 75.0;
        config.scheduler.frame_budget_ms = f64::NAN;
        assert!(config.validate().is_err());
        config.scheduler.frame_budget_ms = 0.0;
        assert!(config.validate().is_err());
        config.scheduler.frame_budget_ms = 0.25;
        assert!(config.validate().is_ok());
    }
}
