//! Command wrapper that mirrors subprocess output into the active log.
//!
//! `run_logged` resolves the command, logs a header block describing the
//! invocation, tees the child's stdout and stderr line-by-line into the
//! terminal and the log file, and returns the child's real exit code. The
//! end-of-run sweep (rotation plus the session's final entry) runs exactly
//! once, even when the wrapper errors mid-flight.

use std::env;
use std::io::{BufRead, BufReader, Read};
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::thread::{self, JoinHandle};

use anyhow::{bail, Context, Result};

use crate::logging::{rotate, Level, LogSession};

/// Run `command` with `args`, capturing its combined output into the log.
///
/// Returns the child's exit status verbatim; a non-zero child is not an
/// error of the wrapper itself.
pub fn run_logged(session: &LogSession, command: &str, args: &[String]) -> Result<i32> {
    let mut guard = CleanupGuard::new(session.clone());

    let program = match resolve_command(command) {
        Ok(program) => program,
        Err(err) => {
            session.set_exit_code(1);
            return Err(err);
        }
    };

    log_header(session, &program, args);

    let mut child = match Command::new(&program)
        .args(args)
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
    {
        Ok(child) => child,
        Err(err) => {
            session.set_exit_code(1);
            return Err(err)
                .with_context(|| format!("failed to spawn {}", program.display()));
        }
    };

    let stdout = child.stdout.take().context("child stdout not captured")?;
    let stderr = child.stderr.take().context("child stderr not captured")?;
    let out_reader = tee_lines(session.clone(), stdout);
    let err_reader = tee_lines(session.clone(), stderr);

    let status = child.wait().context("failed to wait for child")?;
    let _ = out_reader.join();
    let _ = err_reader.join();

    let code = exit_code(&status);
    if status.success() {
        session.info("command exited with status 0");
    } else {
        session.error(&format!("command exited with status {code}"));
    }
    session.set_exit_code(code);

    guard.complete();
    Ok(code)
}

/// Resolve a command name to an absolute path.
///
/// Anything containing a path separator is canonicalized; bare names are
/// searched on `PATH`.
pub fn resolve_command(command: &str) -> Result<PathBuf> {
    let path = Path::new(command);
    if path.is_absolute() || path.components().count() > 1 {
        return std::fs::canonicalize(path)
            .with_context(|| format!("cannot resolve command path {command}"));
    }

    let path_var = env::var_os("PATH").unwrap_or_default();
    for dir in env::split_paths(&path_var) {
        let candidate = dir.join(command);
        if candidate.is_file() {
            return Ok(candidate);
        }
    }
    bail!("command not found: {command}")
}

/// Default log file prefix for a command: its base name without extension.
pub fn default_prefix(command: &str) -> String {
    Path::new(command)
        .file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_else(|| "run".to_string())
}

fn log_header(session: &LogSession, program: &Path, args: &[String]) {
    let mut cmdline = program.display().to_string();
    for arg in args {
        cmdline.push(' ');
        cmdline.push_str(arg);
    }
    session.info(&format!("running: {cmdline}"));
    if let Ok(cwd) = env::current_dir() {
        session.info(&format!("working directory: {}", cwd.display()));
    }
    session.info(&format!("host: {}", hostname()));
    session.info(&format!("user: {}", username()));
    session.log(Level::Debug, "environment:");
    for (key, value) in env::vars() {
        session.log(Level::Debug, &format!("  {key}={value}"));
    }
}

/// Mirror one child stream into the session, line by line.
///
/// Each stream gets its own thread; ordering between the two streams is not
/// defined, but each stream's own line order is preserved.
fn tee_lines<R: Read + Send + 'static>(session: LogSession, stream: R) -> JoinHandle<()> {
    thread::spawn(move || {
        for line in BufReader::new(stream).lines() {
            match line {
                Ok(line) => session.child_line(&line),
                Err(_) => break,
            }
        }
    })
}

fn exit_code(status: &std::process::ExitStatus) -> i32 {
    if let Some(code) = status.code() {
        return code;
    }
    // Killed by a signal: report the shell convention 128 + signal.
    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        if let Some(signal) = status.signal() {
            return 128 + signal;
        }
    }
    1
}

fn username() -> String {
    env::var("SUDO_USER")
        .or_else(|_| env::var("USER"))
        .or_else(|_| env::var("LOGNAME"))
        .unwrap_or_else(|_| "unknown".to_string())
}

#[cfg(unix)]
fn hostname() -> String {
    let mut buf = [0u8; 256];
    let rc = unsafe { libc::gethostname(buf.as_mut_ptr() as *mut libc::c_char, buf.len()) };
    if rc == 0 {
        let end = buf.iter().position(|&b| b == 0).unwrap_or(buf.len());
        if let Ok(name) = std::str::from_utf8(&buf[..end]) {
            return name.to_string();
        }
    }
    "unknown".to_string()
}

#[cfg(not(unix))]
fn hostname() -> String {
    env::var("COMPUTERNAME").unwrap_or_else(|_| "unknown".to_string())
}

/// Runs the end-of-run sweep at most once.
///
/// The happy path calls [`complete`](Self::complete), which waits for backup
/// compression; the drop path fires on early error returns and leaves
/// compression running in the background.
struct CleanupGuard {
    session: Option<LogSession>,
}

impl CleanupGuard {
    fn new(session: LogSession) -> Self {
        Self {
            session: Some(session),
        }
    }

    fn complete(&mut self) {
        self.cleanup(true);
    }

    fn cleanup(&mut self, wait: bool) {
        let Some(session) = self.session.take() else {
            return;
        };
        let sweep = rotate(
            &session,
            session.log_dir(),
            session.max_size_mb(),
            session.max_backups(),
        );
        if wait {
            sweep.wait();
        }
        session.finish();
    }
}

impl Drop for CleanupGuard {
    fn drop(&mut self) {
        self.cleanup(false);
    }
}
