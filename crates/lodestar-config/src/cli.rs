//! Command-line argument parsing for Lodestar.

use std::path::PathBuf;

use clap::Parser;

use crate::Config;

/// Lodestar command-line arguments.
///
/// CLI values override settings loaded from `config.ron`.
#[derive(Parser, Debug)]
#[command(name = "lodestar", about = "Frame-budgeted LOD scheduler demo")]
pub struct CliArgs {
    /// Bake budget per frame in milliseconds.
    #[arg(long)]
    pub frame_budget_ms: Option<f64>,

    /// Re-evaluate each entity once every N frames.
    #[arg(long)]
    pub check_interval: Option<u32>,

    /// Validate entity invariants after every mutation.
    #[arg(long)]
    pub integrity_checks: Option<bool>,

    /// Number of frames to simulate.
    #[arg(long)]
    pub frames: Option<u32>,

    /// Number of entities in the simulated scene.
    #[arg(long)]
    pub entities: Option<u32>,

    /// Log level (error, warn, info, debug, trace).
    #[arg(long)]
    pub log_level: Option<String>,

    /// Path to config directory (overrides default location).
    #[arg(long)]
    pub config: Option<PathBuf>,
}

impl Config {
    /// Apply CLI overrides to a loaded config.
    pub fn apply_cli_overrides(&mut self, args: &CliArgs) {
        if let Some(budget) = args.frame_budget_ms {
            self.scheduler.frame_budget_ms = budget;
        }
        if let Some(interval) = args.check_interval {
            self.scheduler.check_interval_frames = interval;
        }
        if let Some(checks) = args.integrity_checks {
            self.scheduler.integrity_checks = checks;
        }
        if let Some(frames) = args.frames {
            self.demo.frames = frames;
        }
        if let Some(count) = args.entities {
            self.demo.entity_count = count;
        }
        if let Some(ref level) = args.log_level {
            self.debug.log_level = level.clone();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn empty_args() -> CliArgs {
        CliArgs {
            frame_budget_ms: None,
            check_interval: None,
            integrity_checks: None,
            frames: None,
            entities: None,
            log_level: None,
            config: None,
        }
    }

    #[test]
    fn test_cli_override() {
        let mut config = Config::default();
        let args = CliArgs {
            frame_budget_ms: Some(0.5),
            log_level: Some("trace".to_string()),
            ..empty_args()
        };
        config.apply_cli_overrides(&args);
        assert_eq!(config.scheduler.frame_budget_ms, 0.5);
        assert_eq!(config.debug.log_level, "trace");
        // Non-overridden fields retain defaults
        assert_eq!(config.scheduler.check_interval_frames, 4);
        assert_eq!(config.demo.frames, 600);
    }

    #[test]
    fn test_cli_no_override() {
        let original = Config::default();
        let mut config = Config::default();
        config.apply_cli_overrides(&empty_args());
        assert_eq!(config, original);
    }

    #[test]
    fn test_cli_parses_flags() {
        let args = CliArgs::parse_from([
            "lodestar",
            "--frames",
            "10",
            "--entities",
            "3",
            "--integrity-checks",
            "true",
        ]);
        assert_eq!(args.frames, Some(10));
        assert_eq!(args.entities, Some(3));
        assert_eq!(args.integrity_checks, Some(true));
        assert!(args.config.is_none());
    }
}
