mod command;
mod runner;

pub use command::Command;
pub use runner::{BenchReport, OutputMode, StressReport, bench, run, run_with_format, stress};
