//! The user-facing build tree and its planner.
//!
//! A Unit describes one node of a project: a source to compile, a target to
//! link or archive, or a bare aggregation of children.  The planner walks
//! the tree depth-first and flattens it into a Plan of external commands,
//! deciding per node whether on-disk artifacts are already up to date.

use std::collections::BTreeSet;
use std::path::Path;

use anyhow::{bail, Context};

use crate::fs::{self, MTime};
use crate::graph::{CmdId, CompileCommand, Plan};

/// Root of the build output layout; `cleanall` removes it wholesale.
pub const BUILD_DIR: &str = "build";

pub const DEFAULT_COMPILER: &str = "c++";

/// What a target path denotes, chosen from its extension.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum TargetKind {
    Executable,
    StaticLib,
    DynamicLib,
    Object,
    None,
}

impl TargetKind {
    fn of(target: &str) -> TargetKind {
        match Path::new(target).extension().and_then(|ext| ext.to_str()) {
            Some("a") => TargetKind::StaticLib,
            Some("so") => TargetKind::DynamicLib,
            Some("o") => TargetKind::Object,
            Some("exe") | None => TargetKind::Executable,
            Some(_) => TargetKind::None,
        }
    }

    /// Kinds whose units consume their children's outputs.
    fn is_link(self) -> bool {
        matches!(
            self,
            TargetKind::Executable | TargetKind::StaticLib | TargetKind::DynamicLib
        )
    }
}

/// Compile and link flags activated together under a name.
#[derive(Clone, Default)]
pub struct Profile {
    pub compile_flags: Vec<String>,
    pub link_flags: Vec<String>,
}

impl Profile {
    pub fn new(compile_flags: &[&str], link_flags: &[&str]) -> Profile {
        Profile {
            compile_flags: compile_flags.iter().map(|f| f.to_string()).collect(),
            link_flags: link_flags.iter().map(|f| f.to_string()).collect(),
        }
    }
}

/// A node in the build tree.  Each child is owned by exactly one parent; the
/// same source appearing twice in a project is two distinct Units.
#[derive(Debug)]
pub struct Unit {
    deps: Vec<Unit>,
    source: Option<String>,
    target: Option<String>,
    compile_flags: Vec<String>,
    link_flags: Vec<String>,
    active_profiles: BTreeSet<String>,
    kind: TargetKind,
    compiler: String,
}

impl Unit {
    pub fn new(source: Option<String>, target: Option<String>) -> Unit {
        let kind = target.as_deref().map_or(TargetKind::None, TargetKind::of);
        Unit {
            deps: Vec::new(),
            source,
            target,
            compile_flags: Vec::new(),
            link_flags: Vec::new(),
            active_profiles: BTreeSet::new(),
            kind,
            compiler: DEFAULT_COMPILER.to_string(),
        }
    }

    /// A header dependency: contributes its mtime to the parent's rebuild
    /// decision but is never compiled itself.
    pub fn from_source(source: impl Into<String>) -> Unit {
        Unit::new(Some(source.into()), None)
    }

    /// A link or archive target whose inputs come from its children.
    pub fn from_target(target: impl Into<String>) -> Unit {
        Unit::new(None, Some(target.into()))
    }

    /// A compile unit: one source producing one artifact.
    pub fn from_files(source: impl Into<String>, target: impl Into<String>) -> Unit {
        Unit::new(Some(source.into()), Some(target.into()))
    }

    pub fn add_dep(&mut self, unit: Unit) {
        self.deps.push(unit);
    }

    pub fn add_compile_flag(&mut self, flag: impl Into<String>) {
        self.compile_flags.push(flag.into());
    }

    pub fn add_compile_flags<S: Into<String>>(&mut self, flags: impl IntoIterator<Item = S>) {
        self.compile_flags.extend(flags.into_iter().map(S::into));
    }

    pub fn add_link_flag(&mut self, flag: impl Into<String>) {
        self.link_flags.push(flag.into());
    }

    pub fn add_link_flags<S: Into<String>>(&mut self, flags: impl IntoIterator<Item = S>) {
        self.link_flags.extend(flags.into_iter().map(S::into));
    }

    /// Sets the compiler on this unit and all its descendants.
    pub fn set_compiler(&mut self, compiler: &str) {
        self.compiler = compiler.to_string();
        for dep in &mut self.deps {
            dep.set_compiler(compiler);
        }
    }

    pub fn apply_profile(&mut self, name: &str, profile: &Profile) {
        self.active_profiles.insert(name.to_string());
        self.add_compile_flags(profile.compile_flags.iter().cloned());
        self.add_link_flags(profile.link_flags.iter().cloned());
    }

    pub fn active_profiles(&self) -> impl Iterator<Item = &str> {
        self.active_profiles.iter().map(String::as_str)
    }

    pub fn source(&self) -> Option<&str> {
        self.source.as_deref()
    }

    pub fn target(&self) -> Option<&str> {
        self.target.as_deref()
    }

    pub fn deps(&self) -> &[Unit] {
        &self.deps
    }

    pub fn kind(&self) -> TargetKind {
        self.kind
    }

    /// Post-order dump of the tree, indented by depth.
    pub fn print_depth(&self) {
        self.print_depth_impl(0);
    }

    fn print_depth_impl(&self, depth: usize) {
        for dep in &self.deps {
            dep.print_depth_impl(depth + 1);
        }
        let mut line = "  ".repeat(depth);
        line.push_str(match (&self.source, &self.target) {
            (Some(_), Some(_)) => "Compilation unit: ",
            (Some(_), None) => "Header dep: ",
            (None, Some(_)) => "Target: ",
            (None, None) => "",
        });
        if let Some(source) = &self.source {
            line.push_str(source);
        }
        if let Some(target) = &self.target {
            line.push_str(" -> ");
            line.push_str(target);
        }
        println!("{}", line);
    }

    /// Flattens the tree into a Plan.  With `full_rebuild` every emitted
    /// command is enabled regardless of on-disk state.
    pub fn compile(&self, full_rebuild: bool) -> anyhow::Result<Plan> {
        let mut plan = Plan::new();
        self.compile_impl(&mut plan, self.kind, full_rebuild, &[])?;
        Ok(plan)
    }

    /// Returns this node's rebuild flag and the id of the command it
    /// emitted, so the parent can OR staleness upward and wire edges.
    fn compile_impl(
        &self,
        plan: &mut Plan,
        ancestor_kind: TargetKind,
        full_rebuild: bool,
        inherited_flags: &[String],
    ) -> anyhow::Result<(bool, Option<CmdId>)> {
        let mut local_flags = inherited_flags.to_vec();
        local_flags.extend(self.compile_flags.iter().cloned());

        let ancestor_kind = if self.kind.is_link() {
            self.kind
        } else {
            ancestor_kind
        };

        let mut dep_objects = Vec::new();
        let mut header_deps = Vec::new();
        let mut dep_nodes = Vec::new();
        let mut child_rebuild = false;
        for dep in &self.deps {
            if let Some(target) = &dep.target {
                dep_objects.push(target.clone());
            } else if let Some(source) = &dep.source {
                header_deps.push(source.clone());
            }
            let (rebuild, node) =
                dep.compile_impl(plan, ancestor_kind, full_rebuild, &local_flags)?;
            child_rebuild |= rebuild;
            if let Some(node) = node {
                dep_nodes.push(node);
            }
        }

        let Some(target) = &self.target else {
            return Ok((false, None));
        };

        if let Some(parent) = Path::new(target).parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)
                    .with_context(|| format!("create {}", parent.display()))?;
            }
        }

        let target_mtime = fs::mtime(Path::new(target))?;
        let mut rebuild = child_rebuild || target_mtime == MTime::Missing;
        for header in &header_deps {
            rebuild = rebuild || fs::mtime(Path::new(header))?.newer_than(&target_mtime);
        }

        if let Some(source) = &self.source {
            // Source to object.
            let source_mtime = fs::mtime(Path::new(source))?;
            if source_mtime == MTime::Missing {
                bail!("missing source file: {}", source);
            }
            rebuild = rebuild || source_mtime.newer_than(&target_mtime);

            let mut args = Vec::new();
            if ancestor_kind == TargetKind::DynamicLib {
                args.push("-fPIC".to_string());
            }
            args.extend(local_flags);
            args.extend(["-MMD", "-c", "-o"].map(String::from));
            args.push(target.clone());
            args.push(source.clone());
            let node = plan.add_cmd(CompileCommand::new(
                &self.compiler,
                args,
                rebuild || full_rebuild,
                true,
            ));
            return Ok((rebuild, Some(node)));
        }

        // Objects to executable, archive, or shared library.
        let mut command = self.compiler.as_str();
        let mut args: Vec<String> = Vec::new();
        match self.kind {
            TargetKind::StaticLib => {
                command = "ar";
                args.push("rcs".to_string());
            }
            TargetKind::DynamicLib => {
                args.push("-shared".to_string());
                args.extend(self.link_flags.iter().cloned());
                args.push("-o".to_string());
            }
            TargetKind::Executable => {
                args.extend(self.link_flags.iter().cloned());
                args.push("-o".to_string());
            }
            TargetKind::Object | TargetKind::None => {
                args.push("-o".to_string());
            }
        }
        args.push(target.clone());
        for object in &dep_objects {
            rebuild = rebuild || fs::mtime(Path::new(object))?.newer_than(&target_mtime);
            args.push(object.clone());
        }

        let node = plan.add_cmd(CompileCommand::new(
            command,
            args,
            rebuild || full_rebuild,
            false,
        ));
        for dep_node in dep_nodes {
            plan.add_edge(dep_node, node);
        }
        Ok((rebuild, Some(node)))
    }

    /// A Plan that deletes every target (and the object kind's `.d` files),
    /// or the whole build directory when `remove_dir` is set.
    pub fn clean(&self, remove_dir: bool) -> Plan {
        let mut plan = Plan::new();
        if remove_dir {
            plan.add_cmd(CompileCommand::new(
                "rm",
                vec!["-r".to_string(), BUILD_DIR.to_string()],
                Path::new(BUILD_DIR).exists(),
                false,
            ));
        } else {
            self.clean_impl(&mut plan);
        }
        plan
    }

    fn clean_impl(&self, plan: &mut Plan) {
        for dep in &self.deps {
            dep.clean_impl(plan);
        }
        if let Some(target) = &self.target {
            plan.add_cmd(CompileCommand::new(
                "rm",
                vec![target.clone()],
                Path::new(target).exists(),
                false,
            ));
            if self.kind == TargetKind::Object {
                let dfile = Path::new(target).with_extension("d");
                plan.add_cmd(CompileCommand::new(
                    "rm",
                    vec![dfile.display().to_string()],
                    dfile.exists(),
                    false,
                ));
            }
        }
    }
}
