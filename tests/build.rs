//! Library-level integration: plan small trees against a real temp
//! directory and execute them with a stand-in compiler.

use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use nob::graph::{CompileCommand, Plan};
use nob::process::ProcessResult;
use nob::progress::Progress;
use nob::unit::Unit;
use nob::work;

/// Implementation of Progress that prints nothing.
struct NoProgress;
impl Progress for NoProgress {
    fn task_started(&self, _cmd: &CompileCommand) {}
    fn task_finished(&self, _cmd: &CompileCommand, _result: &ProcessResult, _took: Duration) {}
    fn log(&self, _msg: &str) {}
}

/// Shell stand-in for a compiler and linker: touches whatever -o names.
fn write_fake_compiler(dir: &Path) -> PathBuf {
    let path = dir.join("fakecc");
    std::fs::write(
        &path,
        "#!/bin/sh\nwhile [ $# -gt 0 ] && [ \"$1\" != \"-o\" ]; do shift; done\ntouch \"$2\"\n",
    )
    .unwrap();
    let mut perm = std::fs::metadata(&path).unwrap().permissions();
    perm.set_mode(0o755);
    std::fs::set_permissions(&path, perm).unwrap();
    path
}

fn stamp(secs: u64) -> SystemTime {
    SystemTime::UNIX_EPOCH + Duration::from_secs(1_500_000_000 + secs)
}

fn set_mtime(path: &Path, mtime: SystemTime) {
    let file = std::fs::OpenOptions::new().write(true).open(path).unwrap();
    file.set_modified(mtime).unwrap();
}

/// One executable from one source, everything under `dir`.
fn single_exe_tree(dir: &Path) -> (Unit, PathBuf, PathBuf, PathBuf) {
    let source = dir.join("main.cpp");
    let object = dir.join("build/main.o");
    let out = dir.join("build/out");
    std::fs::write(&source, "int main() { return 0; }\n").unwrap();
    set_mtime(&source, stamp(0));

    let mut root = Unit::from_target(out.display().to_string());
    root.add_dep(Unit::from_files(
        source.display().to_string(),
        object.display().to_string(),
    ));
    root.set_compiler(&write_fake_compiler(dir).display().to_string());
    (root, source, object, out)
}

#[test]
fn build_then_up_to_date() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let (root, _source, object, out) = single_exe_tree(dir.path());

    let plan = root.compile(false)?;
    assert_eq!(plan.len(), 2);
    assert!(plan.cmds().iter().all(|cmd| cmd.enabled));
    assert_eq!(work::execute(&plan, 2, &NoProgress), 0);
    assert!(object.exists());
    assert!(out.exists());

    // Everything is fresh now; re-planning disables every node and
    // re-execution runs nothing.
    let plan = root.compile(false)?;
    assert!(plan.cmds().iter().all(|cmd| !cmd.enabled));
    assert_eq!(work::execute(&plan, 2, &NoProgress), 0);
    Ok(())
}

#[test]
fn touched_source_rebuilds() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let (root, source, _object, _out) = single_exe_tree(dir.path());
    assert_eq!(work::execute(&root.compile(false)?, 2, &NoProgress), 0);

    set_mtime(&source, SystemTime::now() + Duration::from_secs(5));
    let plan = root.compile(false)?;
    assert!(plan.cmds().iter().all(|cmd| cmd.enabled));
    assert_eq!(work::execute(&plan, 2, &NoProgress), 0);
    Ok(())
}

#[test]
fn touched_header_rebuilds() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let source = dir.path().join("main.cpp");
    let header = dir.path().join("a.hpp");
    std::fs::write(&source, "int main() { return 0; }\n")?;
    std::fs::write(&header, "")?;
    set_mtime(&source, stamp(0));
    set_mtime(&header, stamp(0));

    let mut child = Unit::from_files(
        source.display().to_string(),
        dir.path().join("build/main.o").display().to_string(),
    );
    child.add_dep(Unit::from_source(header.display().to_string()));
    let mut root = Unit::from_target(dir.path().join("build/out").display().to_string());
    root.add_dep(child);
    root.set_compiler(&write_fake_compiler(dir.path()).display().to_string());

    assert_eq!(work::execute(&root.compile(false)?, 2, &NoProgress), 0);
    assert!(root.compile(false)?.cmds().iter().all(|cmd| !cmd.enabled));

    set_mtime(&header, SystemTime::now() + Duration::from_secs(5));
    let plan = root.compile(false)?;
    assert!(plan.cmds().iter().all(|cmd| cmd.enabled));
    Ok(())
}

#[test]
fn failing_command_stops_the_build() {
    let dir = tempfile::tempdir().unwrap();
    let marker = dir.path().join("marker");
    let mut plan = Plan::new();
    plan.add_cmd(CompileCommand::new(
        "sh",
        vec!["-c".to_string(), "exit 2".to_string()],
        true,
        false,
    ));
    plan.add_cmd(CompileCommand::new(
        "touch",
        vec![marker.display().to_string()],
        true,
        false,
    ));

    assert_eq!(work::execute(&plan, 1, &NoProgress), 1);
    assert!(!marker.exists());
}

#[test]
fn compilation_database_matches_compile_nodes() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let (root, source, ..) = single_exe_tree(dir.path());
    let plan = root.compile(false)?;

    let db_path = dir.path().join("compile_commands.json");
    nob::db::write(&plan, &db_path)?;

    let entries: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(&db_path)?)?;
    let entries = entries.as_array().unwrap();
    let compile_count = plan.cmds().iter().filter(|cmd| cmd.is_compile).count();
    assert_eq!(entries.len(), compile_count);
    assert_eq!(entries[0]["directory"], ".");
    let file = entries[0]["file"].as_str().unwrap();
    assert!(Path::new(file).is_absolute());
    assert!(file.ends_with(source.file_name().unwrap().to_str().unwrap()));
    Ok(())
}
