//! Configuration system for the Lodestar LOD scheduler.
//!
//! Provides runtime-configurable scheduler settings and combiner prototypes
//! that persist to disk as RON files. Supports CLI overrides via clap,
//! hot-reload detection, and forward/backward compatible serialization.

mod cli;
mod config;
mod error;

pub use cli::CliArgs;
pub use config::{
    CombinerPrototype, Config, DebugConfig, DemoConfig, SchedulerConfig, default_config_dir,
};
pub use error::ConfigError;
