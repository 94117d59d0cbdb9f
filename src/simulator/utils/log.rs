/// Logging setup for the simulator binary and integration tests
use log::LevelFilter;

/// Install the `env_logger` backend. `RUST_LOG` wins over the `info` default.
/// Safe to call more than once; later calls are no-ops.
pub fn init_log() {
  let _ = env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
    .format_timestamp(None)
    .try_init();
}

/// Quiet mode keeps warnings and errors only.
pub fn set_quiet(quiet: bool) {
  if quiet {
    log::set_max_level(LevelFilter::Warn);
  }
}
