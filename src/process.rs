//! Child process execution using posix_spawn.
//!
//! Commands run with a minimal environment (only PATH crosses over) and
//! with stdout and stderr captured into separate pipes, drained with
//! select() until both close.

use std::ffi::CString;
use std::os::unix::process::ExitStatusExt;
use std::process::ExitStatus;

use anyhow::bail;

/// Captured result of one child process.
#[derive(Debug)]
pub struct ProcessResult {
    pub stdout: String,
    pub stderr: String,
    /// -1 when the child terminated abnormally.
    pub exit_code: i32,
}

/// Compilers that understand -fdiagnostics-color.  With output captured
/// into a pipe they would otherwise drop coloring entirely.
const COLOR_DIAG_COMPILERS: &[&str] = &["gcc", "g++", "c++", "clang", "clang++"];

fn check_posix(func: &str, ret: libc::c_int) -> anyhow::Result<()> {
    if ret < 0 {
        bail!("{}: {}", func, std::io::Error::last_os_error());
    }
    Ok(())
}

/// Wraps libc::posix_spawn_file_actions_t, in particular to implement Drop.
struct PosixSpawnFileActions(libc::posix_spawn_file_actions_t);

impl PosixSpawnFileActions {
    fn new() -> anyhow::Result<Self> {
        unsafe {
            let mut actions: libc::posix_spawn_file_actions_t = std::mem::zeroed();
            check_posix(
                "posix_spawn_file_actions_init",
                libc::posix_spawn_file_actions_init(&mut actions),
            )?;
            Ok(Self(actions))
        }
    }

    fn as_ptr(&mut self) -> *mut libc::posix_spawn_file_actions_t {
        &mut self.0
    }

    fn adddup2(&mut self, fd: i32, newfd: i32) -> anyhow::Result<()> {
        unsafe {
            check_posix(
                "posix_spawn_file_actions_adddup2",
                libc::posix_spawn_file_actions_adddup2(&mut self.0, fd, newfd),
            )
        }
    }

    fn addclose(&mut self, fd: i32) -> anyhow::Result<()> {
        unsafe {
            check_posix(
                "posix_spawn_file_actions_addclose",
                libc::posix_spawn_file_actions_addclose(&mut self.0, fd),
            )
        }
    }
}

impl Drop for PosixSpawnFileActions {
    fn drop(&mut self) {
        unsafe { libc::posix_spawn_file_actions_destroy(&mut self.0) };
    }
}

/// Drain both pipes until they close, keeping the streams separate.
fn read_both(out_fd: libc::c_int, err_fd: libc::c_int) -> anyhow::Result<(String, String)> {
    let mut out = Vec::new();
    let mut err = Vec::new();
    let mut out_open = true;
    let mut err_open = true;
    let mut buf = [0u8; 4096];

    while out_open || err_open {
        unsafe {
            let mut fds: libc::fd_set = std::mem::zeroed();
            libc::FD_ZERO(&mut fds);
            if out_open {
                libc::FD_SET(out_fd, &mut fds);
            }
            if err_open {
                libc::FD_SET(err_fd, &mut fds);
            }
            let maxfd = out_fd.max(err_fd);
            let ready = libc::select(
                maxfd + 1,
                &mut fds,
                std::ptr::null_mut(),
                std::ptr::null_mut(),
                std::ptr::null_mut(),
            );
            if ready < 0 {
                let io_err = std::io::Error::last_os_error();
                if io_err.kind() == std::io::ErrorKind::Interrupted {
                    continue;
                }
                libc::close(out_fd);
                libc::close(err_fd);
                bail!("select: {}", io_err);
            }
            if out_open && libc::FD_ISSET(out_fd, &fds) {
                let n = libc::read(out_fd, buf.as_mut_ptr() as *mut libc::c_void, buf.len());
                if n > 0 {
                    out.extend_from_slice(&buf[..n as usize]);
                } else {
                    out_open = false;
                }
            }
            if err_open && libc::FD_ISSET(err_fd, &fds) {
                let n = libc::read(err_fd, buf.as_mut_ptr() as *mut libc::c_void, buf.len());
                if n > 0 {
                    err.extend_from_slice(&buf[..n as usize]);
                } else {
                    err_open = false;
                }
            }
        }
    }
    unsafe {
        libc::close(out_fd);
        libc::close(err_fd);
    }
    Ok((
        String::from_utf8_lossy(&out).into_owned(),
        String::from_utf8_lossy(&err).into_owned(),
    ))
}

/// Launches `command` with `args`, searching PATH, and blocks until it
/// exits and both output pipes are drained.
pub fn run_process(command: &str, args: &[String]) -> anyhow::Result<ProcessResult> {
    let mut argv_strs: Vec<CString> = Vec::with_capacity(args.len() + 2);
    argv_strs.push(CString::new(command)?);
    for arg in args {
        argv_strs.push(CString::new(arg.as_str())?);
    }
    if COLOR_DIAG_COMPILERS.contains(&command) {
        argv_strs.push(CString::new("-fdiagnostics-color=always")?);
    }
    let mut argv: Vec<*mut libc::c_char> = argv_strs
        .iter()
        .map(|arg| arg.as_ptr() as *mut libc::c_char)
        .collect();
    argv.push(std::ptr::null_mut());

    // Only PATH crosses into the child.
    let path_var = match std::env::var("PATH") {
        Ok(path) => format!("PATH={}", path),
        Err(_) => "PATH=/usr/bin:/bin".to_string(),
    };
    let path_var = CString::new(path_var)?;
    let envp: Vec<*mut libc::c_char> =
        vec![path_var.as_ptr() as *mut libc::c_char, std::ptr::null_mut()];

    let (pid, out_read, err_read) = unsafe {
        let mut out_pipe: [libc::c_int; 2] = [0; 2];
        let mut err_pipe: [libc::c_int; 2] = [0; 2];
        check_posix("pipe", libc::pipe(out_pipe.as_mut_ptr()))?;
        check_posix("pipe", libc::pipe(err_pipe.as_mut_ptr()))?;

        let mut actions = PosixSpawnFileActions::new()?;
        // stdout/stderr => their pipes; no pipe fd leaks into the child.
        actions.adddup2(out_pipe[1], 1)?;
        actions.adddup2(err_pipe[1], 2)?;
        for fd in [out_pipe[0], out_pipe[1], err_pipe[0], err_pipe[1]] {
            actions.addclose(fd)?;
        }

        let mut pid: libc::pid_t = 0;
        let ret = libc::posix_spawnp(
            &mut pid,
            argv_strs[0].as_ptr(),
            actions.as_ptr(),
            std::ptr::null(),
            argv.as_ptr(),
            envp.as_ptr(),
        );
        if ret != 0 {
            for fd in [out_pipe[0], out_pipe[1], err_pipe[0], err_pipe[1]] {
                libc::close(fd);
            }
            bail!(
                "posix_spawnp {}: {}",
                command,
                std::io::Error::from_raw_os_error(ret)
            );
        }
        check_posix("close", libc::close(out_pipe[1]))?;
        check_posix("close", libc::close(err_pipe[1]))?;
        (pid, out_pipe[0], err_pipe[0])
    };

    let (stdout, stderr) = read_both(out_read, err_read)?;

    let status = unsafe {
        let mut status: libc::c_int = 0;
        check_posix("waitpid", libc::waitpid(pid, &mut status, 0))?;
        ExitStatus::from_raw(status)
    };
    let exit_code = status.code().unwrap_or(-1);

    Ok(ProcessResult {
        stdout,
        stderr,
        exit_code,
    })
}
