//! Build-tree construction from an on-disk layout: sources under src/
//! compile to objects under build/, with header dependencies read back from
//! compiler-emitted .d files.

use std::path::{Path, PathBuf};

use anyhow::Context;
use walkdir::WalkDir;

use crate::depfile;
use crate::unit::{Unit, BUILD_DIR};

/// Maps src/<rel>/<name>.cpp to build/<rel>/<name>.o.  Paths outside src/
/// keep their shape under the build root.
pub fn to_object_path(source: &Path) -> PathBuf {
    let rel = source.strip_prefix("src").unwrap_or(source);
    Path::new(BUILD_DIR).join(rel).with_extension("o")
}

/// Scans `root_dir` recursively for .cpp files and assembles a link unit
/// for `target` with one compile unit per source found.  A sibling .d file
/// left behind by a previous compilation contributes header dependencies.
pub fn build_tree_from_cpp_files(root_dir: &Path, target: &str) -> anyhow::Result<Unit> {
    let mut root = Unit::from_target(target);
    for entry in WalkDir::new(root_dir).sort_by_file_name() {
        let entry = entry.with_context(|| format!("walk {}", root_dir.display()))?;
        if !entry.file_type().is_file() {
            continue;
        }
        let source = entry.path();
        if source.extension().and_then(|ext| ext.to_str()) != Some("cpp") {
            continue;
        }
        let object = to_object_path(source);
        let mut child = Unit::from_files(
            source.display().to_string(),
            object.display().to_string(),
        );
        let dfile = object.with_extension("d");
        if dfile.exists() {
            for header in depfile::read(&dfile)? {
                child.add_dep(Unit::from_source(header));
            }
        }
        root.add_dep(child);
    }
    Ok(root)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn object_path_mirrors_source_layout() {
        assert_eq!(
            to_object_path(Path::new("src/main.cpp")),
            Path::new("build/main.o")
        );
        assert_eq!(
            to_object_path(Path::new("src/net/socket.cpp")),
            Path::new("build/net/socket.o")
        );
    }

    #[test]
    fn object_path_outside_src() {
        assert_eq!(
            to_object_path(Path::new("vendor/x.cpp")),
            Path::new("build/vendor/x.o")
        );
    }

    // The src/ -> build/ mapping is relative to the working directory, so
    // this is the one test that chdirs; nothing else in the crate's test
    // suite depends on the working directory.
    #[test]
    fn tree_from_cpp_files() {
        let dir = tempfile::tempdir().unwrap();
        let old_cwd = std::env::current_dir().unwrap();
        std::env::set_current_dir(dir.path()).unwrap();

        let result = (|| -> anyhow::Result<()> {
            std::fs::create_dir_all("src/net")?;
            std::fs::write("src/main.cpp", "")?;
            std::fs::write("src/net/socket.cpp", "")?;
            std::fs::write("src/net/socket.hpp", "")?;
            std::fs::create_dir_all("build/net")?;
            std::fs::write(
                "build/net/socket.d",
                "build/net/socket.o: src/net/socket.cpp src/net/socket.hpp\n",
            )?;

            let root = build_tree_from_cpp_files(Path::new("src"), "build/out")?;
            assert_eq!(root.target(), Some("build/out"));
            assert_eq!(root.deps().len(), 2);

            let main = &root.deps()[0];
            assert_eq!(main.source(), Some("src/main.cpp"));
            assert_eq!(main.target(), Some("build/main.o"));
            assert!(main.deps().is_empty());

            let socket = &root.deps()[1];
            assert_eq!(socket.source(), Some("src/net/socket.cpp"));
            assert_eq!(socket.target(), Some("build/net/socket.o"));
            assert_eq!(socket.deps().len(), 1);
            assert_eq!(socket.deps()[0].source(), Some("src/net/socket.hpp"));
            assert_eq!(socket.deps()[0].target(), None);
            Ok(())
        })();

        std::env::set_current_dir(old_cwd).unwrap();
        result.unwrap();
    }

    #[test]
    fn missing_root_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("no-such-dir");
        let err = build_tree_from_cpp_files(&missing, "build/out").unwrap_err();
        assert!(err.to_string().contains("walk"));
    }
}
