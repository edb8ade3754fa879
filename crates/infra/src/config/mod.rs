//! Configuration loading
//!
//! Opt-in helpers for applications that keep client settings in the
//! environment or in a file. The client itself never reads either.

pub mod loader;

pub use loader::{load, load_from_env, load_from_file, probe_config_paths, ConfigFile};
