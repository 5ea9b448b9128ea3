//! Reporting of command execution, for display to the user.

use std::time::Duration;

use crate::graph::CompileCommand;
use crate::process::ProcessResult;

/// Receives execution events from the executor.  Workers call this
/// concurrently, so implementations take `&self` and must be Sync.
pub trait Progress: Sync {
    /// Called when a command is dispatched to a worker.
    fn task_started(&self, cmd: &CompileCommand);

    /// Called when a command's child process has exited and its output has
    /// been drained.
    fn task_finished(&self, cmd: &CompileCommand, result: &ProcessResult, took: Duration);

    /// A line outside any one task, e.g. the final timing summary.
    fn log(&self, msg: &str);
}

/// Prints one line per event.  Each println locks stdout, so lines from
/// concurrent workers interleave but never tear.
#[derive(Default)]
pub struct ConsoleProgress;

impl Progress for ConsoleProgress {
    fn task_started(&self, cmd: &CompileCommand) {
        println!("Running: {}", cmd);
    }

    fn task_finished(&self, _cmd: &CompileCommand, result: &ProcessResult, took: Duration) {
        if result.exit_code != 0 {
            println!("Exit code: {}", result.exit_code);
        }
        if !result.stdout.is_empty() {
            print!("{}", result.stdout);
        }
        if !result.stderr.is_empty() {
            eprint!("{}", result.stderr);
        }
        println!("Took: {}", format_duration(took));
    }

    fn log(&self, msg: &str) {
        println!("{}", msg);
    }
}

/// Formats a duration using the largest unit that keeps the value at or
/// above 1.0, with two decimals: hours down to nanoseconds.
pub fn format_duration(duration: Duration) -> String {
    let secs = duration.as_secs_f64();
    let units = [
        (secs / 3600.0, "h"),
        (secs / 60.0, "m"),
        (secs, "s"),
        (secs * 1e3, "ms"),
        (secs * 1e6, "us"),
        (secs * 1e9, "ns"),
    ];
    for (value, suffix) in units {
        if value >= 1.0 {
            return format!("{:.2}{}", value, suffix);
        }
    }
    format!("{:.2}ns", secs * 1e9)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn duration_rendering() {
        assert_eq!(format_duration(Duration::from_secs(7200)), "2.00h");
        assert_eq!(format_duration(Duration::from_secs(90)), "1.50m");
        assert_eq!(format_duration(Duration::from_millis(1500)), "1.50s");
        assert_eq!(format_duration(Duration::from_millis(25)), "25.00ms");
        assert_eq!(format_duration(Duration::from_micros(250)), "250.00us");
        assert_eq!(format_duration(Duration::from_nanos(17)), "17.00ns");
        assert_eq!(format_duration(Duration::ZERO), "0.00ns");
    }
}
