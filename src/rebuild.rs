//! Self-rebuild bootstrap for build drivers compiled from a single source
//! file.
//!
//! Called first thing in a driver's main: when the driver's source (or one
//! of its listed dependencies) is newer than the running binary, the driver
//! recompiles itself, then replaces its own process image with the fresh
//! binary.  A marker argument tells the restarted run that it was
//! self-triggered, which upgrades it to a full rebuild of the user project.

use std::os::unix::process::CommandExt;
use std::path::{Path, PathBuf};
use std::process::Command;

use anyhow::{bail, Context};

use crate::fs::{self, MTime};
use crate::process;

/// Inserted as the first argument when re-executing after a self-rebuild.
/// The command-line dispatcher consumes it silently.
pub const REBUILD_MARKER: &str = "nob_rebuild";

/// The compiler invocation used to rebuild a driver.
pub struct DriverCompiler {
    pub compiler: String,
    pub flags: Vec<String>,
}

impl Default for DriverCompiler {
    fn default() -> Self {
        DriverCompiler {
            compiler: "c++".to_string(),
            flags: ["-std=c++20", "-Wall", "-Wextra", "-Wpedantic", "-O3"]
                .map(String::from)
                .to_vec(),
        }
    }
}

fn needs_recompile(bin: MTime, source: MTime, deps: &[MTime]) -> bool {
    if bin == MTime::Missing {
        return true;
    }
    source.newer_than(&bin) || deps.iter().any(|dep| dep.newer_than(&bin))
}

/// The argument vector handed to the restarted image: the marker first,
/// then the original arguments.
fn restart_args(original: &[String]) -> Vec<String> {
    let mut args = Vec::with_capacity(original.len() + 1);
    args.push(REBUILD_MARKER.to_string());
    args.extend(original.iter().cloned());
    args
}

/// Compiles `source` to a temporary next to `bin`, then renames it into
/// place so the running binary is swapped atomically.  A failing compile
/// terminates the process with the compiler's exit code.
fn recompile(source: &Path, bin: &Path, compiler: &DriverCompiler) -> anyhow::Result<()> {
    let temp = PathBuf::from(format!("{}.new", bin.display()));
    let mut args = compiler.flags.clone();
    args.push("-o".to_string());
    args.push(temp.display().to_string());
    args.push(source.display().to_string());

    let result = process::run_process(&compiler.compiler, &args)?;
    if result.exit_code != 0 {
        print!("{}", result.stdout);
        eprint!("{}", result.stderr);
        eprintln!("Compilation failed (exit = {})", result.exit_code);
        std::process::exit(if result.exit_code > 0 { result.exit_code } else { 1 });
    }
    std::fs::rename(&temp, bin)
        .with_context(|| format!("rename {} -> {}", temp.display(), bin.display()))?;
    Ok(())
}

/// Checks the running binary against `source_filename` and `deps`,
/// recompiling and re-executing when stale.  Returns normally only when the
/// binary is already fresh; otherwise the process image is replaced (or an
/// error is returned, which callers should treat as fatal).
pub fn rebuild_self(source_filename: &str, deps: &[&str]) -> anyhow::Result<()> {
    rebuild_self_with(source_filename, deps, &DriverCompiler::default())
}

pub fn rebuild_self_with(
    source_filename: &str,
    deps: &[&str],
    compiler: &DriverCompiler,
) -> anyhow::Result<()> {
    let args: Vec<String> = std::env::args().collect();
    let source = std::fs::canonicalize(source_filename)
        .with_context(|| format!("canonicalize {}", source_filename))?;
    let bin = std::fs::canonicalize(&args[0])
        .with_context(|| format!("canonicalize {}", args[0]))?;

    let bin_mtime = fs::mtime(&bin)?;
    let source_mtime = fs::mtime(&source)?;
    let mut dep_mtimes = Vec::with_capacity(deps.len());
    for dep in deps {
        dep_mtimes.push(fs::mtime(Path::new(dep))?);
    }

    if !needs_recompile(bin_mtime, source_mtime, &dep_mtimes) {
        println!("nothing todo!");
        return Ok(());
    }

    println!("Rebuilding: {}...", bin.display());
    recompile(&source, &bin, compiler)?;

    let err = Command::new(&bin).args(restart_args(&args[1..])).exec();
    // exec only returns on failure.
    bail!("exec {}: {}", bin.display(), err);
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::{Duration, SystemTime};

    fn stamp(secs: u64) -> MTime {
        MTime::Stamp(SystemTime::UNIX_EPOCH + Duration::from_secs(secs))
    }

    #[test]
    fn fresh_binary_stays_put() {
        assert!(!needs_recompile(stamp(100), stamp(50), &[]));
        assert!(!needs_recompile(stamp(100), stamp(50), &[stamp(10), stamp(99)]));
    }

    #[test]
    fn newer_source_triggers() {
        assert!(needs_recompile(stamp(100), stamp(150), &[]));
    }

    #[test]
    fn newer_dep_triggers() {
        assert!(needs_recompile(stamp(100), stamp(50), &[stamp(10), stamp(150)]));
    }

    #[test]
    fn missing_binary_or_dep_triggers() {
        assert!(needs_recompile(MTime::Missing, stamp(50), &[]));
        assert!(needs_recompile(stamp(100), stamp(50), &[MTime::Missing]));
    }

    #[test]
    fn marker_leads_the_restart_arguments() {
        let original = vec!["build".to_string(), "asan".to_string()];
        assert_eq!(
            restart_args(&original),
            vec!["nob_rebuild".to_string(), "build".to_string(), "asan".to_string()]
        );
        assert_eq!(restart_args(&[]), vec!["nob_rebuild".to_string()]);
    }

    #[test]
    fn default_driver_compiler_line() {
        let compiler = DriverCompiler::default();
        assert_eq!(compiler.compiler, "c++");
        assert_eq!(
            compiler.flags,
            vec!["-std=c++20", "-Wall", "-Wextra", "-Wpedantic", "-O3"]
        );
    }
}
