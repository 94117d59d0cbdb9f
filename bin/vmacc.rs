use clap::Parser;
use log::error;
use std::path::PathBuf;
use std::process::ExitCode;

use vmacc::simulator::config::{apply_cli_overrides, load_config};
use vmacc::simulator::utils::log::init_log;
use vmacc::simulator::{Simulator, Workload};

/// vmacc - cycle-level simulator of a vector/matrix MAC accelerator
#[derive(Parser, Debug)]
#[command(name = "vmacc")]
#[command(version = "0.1.0")]
#[command(about = "Lock-step simulator of a fixed-function vector/matrix MAC compute core", long_about = None)]
struct Args {
  /// Workload file (JSON)
  #[arg(short, long, value_name = "FILE")]
  workload: PathBuf,

  /// Configuration file (TOML), layered over the built-in defaults
  #[arg(short, long, value_name = "FILE")]
  config: Option<PathBuf>,

  /// Enable step mode (interactive stepping)
  #[arg(short, long)]
  step: bool,

  /// Quiet mode (suppress log messages)
  #[arg(short, long)]
  quiet: bool,

  /// Output trace file path
  #[arg(long, value_name = "FILE")]
  trace_file: Option<String>,

  /// Give up when the accelerator has not drained after this many cycles
  #[arg(long, value_name = "N")]
  max_cycles: Option<u64>,
}

fn run(args: Args) -> vmacc::Result<()> {
  let mut config = load_config(args.config.as_deref())?;
  apply_cli_overrides(&mut config, args.quiet, args.step, args.trace_file.as_deref(), args.max_cycles);

  let workload = Workload::load(&args.workload)?;
  let mut simulator = Simulator::new(config, workload)?;
  let report = simulator.run()?;

  for (addr, word) in &report.read_back {
    println!("output[{}] = {:#010x}", addr, word);
  }
  println!(
    "cycles: {} (preload {}){}",
    report.cycles,
    report.preload_cycles,
    if report.completed { "" } else { ", stopped early" }
  );
  Ok(())
}

fn main() -> ExitCode {
  init_log();

  match run(Args::parse()) {
    Ok(()) => ExitCode::SUCCESS,
    Err(e) => {
      error!("{}", e);
      ExitCode::FAILURE
    },
  }
}
