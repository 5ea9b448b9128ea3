//! Parallel execution of a Plan: a topological runner over the command DAG.
//!
//! Workers pull ready commands off a shared queue and run one child process
//! at a time.  Finishing a command decrements the in-degree of its
//! dependents; a command that was planned as already up to date never runs
//! but unblocks its dependents during seeding.  The first failure stops
//! dispatch while in-flight children drain.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Condvar, Mutex};
use std::time::{Duration, Instant};

use crate::graph::{CmdId, Plan};
use crate::process::{self, ProcessResult};
use crate::progress::{format_duration, Progress};

/// Ready-to-run command ids, shared between workers.
struct ReadyQueue {
    queue: Mutex<VecDeque<CmdId>>,
    cond: Condvar,
}

impl ReadyQueue {
    fn new() -> ReadyQueue {
        ReadyQueue {
            queue: Mutex::new(VecDeque::new()),
            cond: Condvar::new(),
        }
    }

    fn push(&self, id: CmdId) {
        let mut queue = self.queue.lock().unwrap();
        queue.push_back(id);
        self.cond.notify_one();
    }

    /// Wakes every waiting worker.  Taken with the queue lock held so a
    /// worker between its predicate check and its wait cannot miss it.
    fn notify_all(&self) {
        let _queue = self.queue.lock().unwrap();
        self.cond.notify_all();
    }

    /// Blocks until a command is ready, all work is done, or the stop flag
    /// is raised; None in the latter two cases.
    fn pop(&self, remaining: &AtomicUsize, stop: &AtomicBool) -> Option<CmdId> {
        let mut queue = self.queue.lock().unwrap();
        loop {
            if let Some(id) = queue.pop_front() {
                return Some(id);
            }
            if remaining.load(Ordering::Acquire) == 0 || stop.load(Ordering::Relaxed) {
                return None;
            }
            queue = self.cond.wait(queue).unwrap();
        }
    }
}

pub fn default_parallelism() -> usize {
    std::thread::available_parallelism()
        .map(usize::from)
        .unwrap_or(1)
}

/// Runs every enabled command in dependency order, at most `parallelism` at
/// a time.  Returns the number of failed commands; after the first failure
/// no further commands are dispatched, but in-flight ones run to
/// completion.
pub fn execute(plan: &Plan, parallelism: usize, progress: &dyn Progress) -> usize {
    let parallelism = parallelism.max(1);
    if plan.is_empty() {
        progress.log(&format!(
            "Compilation finished in: {}",
            format_duration(Duration::ZERO)
        ));
        return 0;
    }

    // Working in-degrees; a disabled command counts as already complete.
    let indeg: Vec<AtomicUsize> = plan
        .ids()
        .map(|id| {
            AtomicUsize::new(if plan.cmd(id).enabled {
                plan.in_degree(id)
            } else {
                0
            })
        })
        .collect();

    let ready = ReadyQueue::new();
    let remaining = AtomicUsize::new(plan.ids().filter(|&id| plan.cmd(id).enabled).count());

    // Disabled commands unblock their dependents immediately.
    for id in plan.ids() {
        if !plan.cmd(id).enabled {
            for &out in plan.outs(id) {
                indeg[out.index()].fetch_sub(1, Ordering::AcqRel);
            }
        }
    }
    // Seed the queue with every enabled command that has nothing left to
    // wait on.  This runs after the propagation pass so a command whose
    // predecessors are all disabled is enqueued exactly once.
    for id in plan.ids() {
        if plan.cmd(id).enabled && indeg[id.index()].load(Ordering::Relaxed) == 0 {
            ready.push(id);
        }
    }

    let stop = AtomicBool::new(false);
    let failures = AtomicUsize::new(0);
    let timer = Instant::now();

    std::thread::scope(|scope| {
        for _ in 0..parallelism {
            scope.spawn(|| {
                worker(plan, &indeg, &ready, &remaining, &stop, &failures, progress)
            });
        }
    });

    progress.log(&format!(
        "Compilation finished in: {}",
        format_duration(timer.elapsed())
    ));
    failures.load(Ordering::Relaxed)
}

fn worker(
    plan: &Plan,
    indeg: &[AtomicUsize],
    ready: &ReadyQueue,
    remaining: &AtomicUsize,
    stop: &AtomicBool,
    failures: &AtomicUsize,
    progress: &dyn Progress,
) {
    loop {
        if stop.load(Ordering::Relaxed) {
            break;
        }
        let id = match ready.pop(remaining, stop) {
            Some(id) => id,
            None => break,
        };

        let cmd = plan.cmd(id);
        progress.task_started(cmd);
        let start = Instant::now();
        let result = process::run_process(&cmd.command, &cmd.args).unwrap_or_else(|err| {
            ProcessResult {
                stdout: String::new(),
                stderr: err.to_string(),
                exit_code: -1,
            }
        });
        progress.task_finished(cmd, &result, start.elapsed());

        if result.exit_code != 0 {
            failures.fetch_add(1, Ordering::AcqRel);
            stop.store(true, Ordering::Release);
            ready.notify_all();
        }

        for &out in plan.outs(id) {
            if indeg[out.index()].fetch_sub(1, Ordering::AcqRel) == 1 && plan.cmd(out).enabled {
                ready.push(out);
            }
        }

        if remaining.fetch_sub(1, Ordering::AcqRel) == 1 {
            // Everything has run; wake waiting workers so they can observe
            // termination.
            ready.notify_all();
        }
    }
}
