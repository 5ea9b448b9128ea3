//! Command-line surface: argument normalization, sub-command dispatch, and
//! the generic driver entry point.

use std::collections::HashMap;
use std::path::Path;

use anyhow::anyhow;

use crate::db;
use crate::graph::Plan;
use crate::load;
use crate::process;
use crate::progress::ConsoleProgress;
use crate::rebuild::REBUILD_MARKER;
use crate::unit::{Profile, Unit};
use crate::work;

/// Strips the self-rebuild marker from the raw arguments.  A marker without
/// an explicit `rebuild` upgrades the run to a full rebuild, so a freshly
/// re-executed driver also rebuilds the user project.
pub fn normalize_args(args: &[String]) -> Vec<String> {
    let mut commands: Vec<String> = Vec::with_capacity(args.len());
    let mut marker_present = false;
    let mut rebuild_present = false;
    for arg in args {
        if arg == REBUILD_MARKER {
            marker_present = true;
            continue;
        }
        if arg == "rebuild" {
            rebuild_present = true;
        }
        commands.push(arg.clone());
    }
    if marker_present && !rebuild_present {
        commands.insert(0, "rebuild".to_string());
    }
    commands
}

fn execute_plan(plan: &Plan, parallelism: usize, progress: &ConsoleProgress) -> bool {
    let failures = work::execute(plan, parallelism, progress);
    if failures != 0 {
        eprintln!("One or more commands failed.");
    }
    failures == 0
}

/// Applies sub-commands and profile names from the command line, in order,
/// to the top unit.  Returns the process exit code.
pub fn dispatch(
    unit: &mut Unit,
    args: &[String],
    profiles: &HashMap<String, Profile>,
    parallelism: usize,
) -> anyhow::Result<i32> {
    let progress = ConsoleProgress;
    let commands = normalize_args(args);
    if commands.is_empty() {
        println!("No flags specified!");
        return Ok(0);
    }

    for command in &commands {
        match command.as_str() {
            "build" => {
                println!("build");
                let plan = unit.compile(false)?;
                if !execute_plan(&plan, parallelism, &progress) {
                    return Ok(1);
                }
                db::write_compile_db(&plan)?;
            }
            "rebuild" => {
                println!("rebuild");
                let plan = unit.compile(true)?;
                print!("{}", plan);
                if !execute_plan(&plan, parallelism, &progress) {
                    return Ok(1);
                }
                db::write_compile_db(&plan)?;
            }
            "clean" => {
                println!("clean");
                let plan = unit.clean(false);
                print!("{}", plan);
                if !execute_plan(&plan, parallelism, &progress) {
                    return Ok(1);
                }
            }
            "cleanall" => {
                println!("clean all");
                let plan = unit.clean(true);
                print!("{}", plan);
                if !execute_plan(&plan, parallelism, &progress) {
                    return Ok(1);
                }
            }
            "run" => {
                let target = unit
                    .target()
                    .ok_or_else(|| anyhow!("top unit has no target to run"))?;
                println!("Running: {}", target);
                let result = process::run_process(target, &[])?;
                print!("{}", result.stdout);
                eprint!("{}", result.stderr);
                if result.exit_code != 0 {
                    return Ok(result.exit_code);
                }
            }
            name => {
                if let Some(profile) = profiles.get(name) {
                    unit.apply_profile(name, profile);
                } else {
                    println!("Flag: {} unknown!", name);
                }
            }
        }
    }
    Ok(0)
}

/// Profiles available to the generic driver.
pub fn default_profiles() -> HashMap<String, Profile> {
    HashMap::from([
        ("debug".to_string(), Profile::new(&["-g", "-O0"], &[])),
        ("release".to_string(), Profile::new(&["-O3"], &[])),
        (
            "asan".to_string(),
            Profile::new(&["-fsanitize=address"], &["-fsanitize=address"]),
        ),
        (
            "tsan".to_string(),
            Profile::new(&["-fsanitize=thread"], &["-fsanitize=thread"]),
        ),
        (
            "ubsan".to_string(),
            Profile::new(&["-fsanitize=undefined"], &["-fsanitize=undefined"]),
        ),
    ])
}

#[derive(argh::FromArgs)]
/// A small parallel build orchestrator for C++ source trees.
struct Opts {
    /// chdir before running
    #[argh(option, short = 'C')]
    chdir: Option<String>,

    /// directory scanned for .cpp files [default=src]
    #[argh(option, default = "\"src\".into()")]
    source_dir: String,

    /// path of the final artifact [default=build/out]
    #[argh(option, default = "\"build/out\".into()")]
    target: String,

    /// compiler for compile and link commands [default=c++]
    #[argh(option)]
    compiler: Option<String>,

    /// parallelism [default uses system thread count]
    #[argh(option, short = 'j')]
    parallelism: Option<usize>,

    /// sub-commands and profile names, applied in order
    #[argh(positional)]
    commands: Vec<String>,
}

pub fn run() -> anyhow::Result<i32> {
    let opts: Opts = argh::from_env();

    if let Some(dir) = &opts.chdir {
        std::env::set_current_dir(dir).map_err(|err| anyhow!("chdir {:?}: {}", dir, err))?;
    }

    let mut unit = load::build_tree_from_cpp_files(Path::new(&opts.source_dir), &opts.target)?;
    if let Some(compiler) = &opts.compiler {
        unit.set_compiler(compiler);
    }
    let parallelism = match opts.parallelism {
        Some(p) => p,
        None => work::default_parallelism(),
    };

    dispatch(&mut unit, &opts.commands, &default_profiles(), parallelism)
}
