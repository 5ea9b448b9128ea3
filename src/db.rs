//! Emits the clangd-style compilation database for a Plan's compile
//! commands.

use std::fs::File;
use std::io::BufWriter;
use std::path::Path;

use anyhow::Context;
use serde::Serialize;

use crate::graph::Plan;

pub const COMPILE_DB_PATH: &str = "compile_commands.json";

/// One compile_commands.json entry.
#[derive(Serialize)]
struct Entry {
    directory: String,
    command: String,
    file: String,
}

/// Writes an entry for every compile command in `plan` to `path`,
/// overwriting any previous database.
pub fn write(plan: &Plan, path: &Path) -> anyhow::Result<()> {
    let mut entries = Vec::new();
    for cmd in plan.cmds() {
        if !cmd.is_compile {
            continue;
        }
        let source = cmd.source_arg().unwrap_or_default();
        let file = std::path::absolute(source)
            .with_context(|| format!("absolute path of {}", source))?;
        entries.push(Entry {
            directory: ".".to_string(),
            command: cmd.to_string(),
            file: file.display().to_string(),
        });
    }
    let out = BufWriter::new(
        File::create(path).with_context(|| format!("create {}", path.display()))?,
    );
    serde_json::to_writer_pretty(out, &entries)
        .with_context(|| format!("write {}", path.display()))?;
    Ok(())
}

/// Writes the database to ./compile_commands.json.
pub fn write_compile_db(plan: &Plan) -> anyhow::Result<()> {
    write(plan, Path::new(COMPILE_DB_PATH))
}
