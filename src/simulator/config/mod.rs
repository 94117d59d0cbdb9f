pub mod config;

pub use config::{apply_cli_overrides, load_config, AppConfig, SimulationSection};
