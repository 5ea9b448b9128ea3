//! Command records and the plan: a flat, append-only DAG of external
//! invocations produced by the planner and consumed by the executor.

use std::fmt;

/// Identifies a command within a Plan.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct CmdId(usize);

impl CmdId {
    pub fn index(&self) -> usize {
        self.0
    }
}

impl From<usize> for CmdId {
    fn from(index: usize) -> CmdId {
        CmdId(index)
    }
}

/// One external invocation.  Immutable once added to a Plan.
#[derive(Debug, Clone)]
pub struct CompileCommand {
    /// Executable name, resolved against PATH at launch time.
    pub command: String,
    pub args: Vec<String>,
    /// A disabled command is already up to date: the executor skips it but
    /// still unblocks its dependents.
    pub enabled: bool,
    /// Source-to-object compilations, the ones recorded in the compilation
    /// database.
    pub is_compile: bool,
}

impl CompileCommand {
    pub fn new(
        command: impl Into<String>,
        args: Vec<String>,
        enabled: bool,
        is_compile: bool,
    ) -> CompileCommand {
        CompileCommand {
            command: command.into(),
            args,
            enabled,
            is_compile,
        }
    }

    /// The last positional argument; for compile commands, the source file.
    pub fn source_arg(&self) -> Option<&str> {
        self.args.last().map(String::as_str)
    }
}

impl fmt::Display for CompileCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.command)?;
        for arg in &self.args {
            write!(f, " {}", arg)?;
        }
        Ok(())
    }
}

/// An append-only DAG of commands: nodes first, then edges.  Edges run from
/// compile nodes to the link/archive node consuming their outputs.
#[derive(Default, Debug)]
pub struct Plan {
    cmds: Vec<CompileCommand>,
    /// Out-edges per node.
    outs: Vec<Vec<CmdId>>,
    /// In-edge count per node, consumed directly by the executor.
    in_degree: Vec<usize>,
}

impl Plan {
    pub fn new() -> Plan {
        Plan::default()
    }

    /// Appends a node and returns its zero-based id.
    pub fn add_cmd(&mut self, cmd: CompileCommand) -> CmdId {
        let id = CmdId(self.cmds.len());
        self.cmds.push(cmd);
        self.outs.push(Vec::new());
        self.in_degree.push(0);
        id
    }

    /// Appends an out-edge and bumps the destination's in-degree.  Returns
    /// false when either endpoint is not a known node.  Duplicate edges are
    /// not detected; they inflate the out list and in-degree symmetrically,
    /// which the executor tolerates.
    pub fn add_edge(&mut self, src: CmdId, dst: CmdId) -> bool {
        if src.0 >= self.cmds.len() || dst.0 >= self.cmds.len() {
            return false;
        }
        self.outs[src.0].push(dst);
        self.in_degree[dst.0] += 1;
        true
    }

    pub fn len(&self) -> usize {
        self.cmds.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cmds.is_empty()
    }

    pub fn cmd(&self, id: CmdId) -> &CompileCommand {
        &self.cmds[id.0]
    }

    pub fn cmds(&self) -> &[CompileCommand] {
        &self.cmds
    }

    pub fn outs(&self, id: CmdId) -> &[CmdId] {
        &self.outs[id.0]
    }

    pub fn in_degree(&self, id: CmdId) -> usize {
        self.in_degree[id.0]
    }

    pub fn ids(&self) -> impl Iterator<Item = CmdId> {
        (0..self.cmds.len()).map(CmdId)
    }
}

impl fmt::Display for Plan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, cmd) in self.cmds.iter().enumerate() {
            writeln!(f, "#{} {} enabled: {}", i, cmd, cmd.enabled)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cmd(name: &str) -> CompileCommand {
        CompileCommand::new(name, vec!["-o".to_string(), "out".to_string()], true, false)
    }

    #[test]
    fn ids_are_sequential() {
        let mut plan = Plan::new();
        assert_eq!(plan.add_cmd(cmd("a")).index(), 0);
        assert_eq!(plan.add_cmd(cmd("b")).index(), 1);
        assert_eq!(plan.len(), 2);
    }

    #[test]
    fn edges_update_in_degree() {
        let mut plan = Plan::new();
        let a = plan.add_cmd(cmd("a"));
        let b = plan.add_cmd(cmd("b"));
        assert!(plan.add_edge(a, b));
        assert_eq!(plan.outs(a), &[b]);
        assert_eq!(plan.in_degree(b), 1);
        assert_eq!(plan.in_degree(a), 0);
    }

    #[test]
    fn duplicate_edges_accumulate() {
        let mut plan = Plan::new();
        let a = plan.add_cmd(cmd("a"));
        let b = plan.add_cmd(cmd("b"));
        assert!(plan.add_edge(a, b));
        assert!(plan.add_edge(a, b));
        assert_eq!(plan.outs(a).len(), 2);
        assert_eq!(plan.in_degree(b), 2);
    }

    #[test]
    fn invalid_edge_endpoints() {
        let mut plan = Plan::new();
        let a = plan.add_cmd(cmd("a"));
        assert!(!plan.add_edge(a, CmdId::from(7)));
        assert!(!plan.add_edge(CmdId::from(7), a));
        assert_eq!(plan.in_degree(a), 0);
    }

    #[test]
    fn display_joins_args() {
        let c = cmd("cc");
        assert_eq!(c.to_string(), "cc -o out");
        let mut plan = Plan::new();
        plan.add_cmd(c);
        assert_eq!(plan.to_string(), "#0 cc -o out enabled: true\n");
    }
}
