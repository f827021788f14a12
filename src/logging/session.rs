//! Log session lifecycle: setup, leveled writes, and exit accounting.
//!
//! A [`LogSession`] owns one log file for the lifetime of the process and
//! mirrors every entry to the console. Cloning is cheap (shared inner state),
//! which is how rotation workers and subprocess reader threads report through
//! the same session.

use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::process;
use std::sync::atomic::{AtomicBool, AtomicI32, Ordering};
use std::sync::{Arc, Mutex};

use chrono::Local;
use crossterm::style::{style, Stylize};
use crossterm::tty::IsTty;

use super::level::Level;

/// Timestamp layout for log entries (millisecond precision with UTC offset).
const ENTRY_TIMESTAMP: &str = "%Y-%m-%dT%H:%M:%S%.3f%:z";

/// Timestamp layout embedded in log file and backup names.
pub(crate) const FILE_TIMESTAMP: &str = "%Y%m%d_%H%M%S";

/// Errors raised while creating or securing the log destination.
///
/// These are fatal to the caller: there is no silent fallback to an unlogged
/// state inside the facility itself.
#[derive(Debug, thiserror::Error)]
pub enum SetupError {
    #[error("failed to create log directory {path}: {source}")]
    CreateDir { path: PathBuf, source: io::Error },

    #[error("failed to secure {path}: {source}")]
    Secure { path: PathBuf, source: io::Error },

    #[error("failed to create log file {path}: {source}")]
    CreateFile { path: PathBuf, source: io::Error },
}

/// Configuration for [`LogSession::setup`].
#[derive(Debug, Clone)]
pub struct SessionOptions {
    /// Directory that receives the log file and its backups.
    pub log_dir: PathBuf,
    /// Base name for the log file; the creation timestamp is appended.
    pub name_prefix: String,
    /// Rotation threshold in whole megabytes.
    pub max_size_mb: u64,
    /// Compressed backups to retain after pruning.
    pub max_backups: usize,
    /// Entries below this severity are dropped entirely.
    pub min_level: Level,
}

impl SessionOptions {
    pub fn new(log_dir: impl Into<PathBuf>, name_prefix: impl Into<String>) -> Self {
        Self {
            log_dir: log_dir.into(),
            name_prefix: name_prefix.into(),
            max_size_mb: 5,
            max_backups: 10,
            min_level: Level::Info,
        }
    }

    pub fn max_size_mb(mut self, mb: u64) -> Self {
        self.max_size_mb = mb;
        self
    }

    pub fn max_backups(mut self, count: usize) -> Self {
        self.max_backups = count;
        self
    }

    pub fn min_level(mut self, level: Level) -> Self {
        self.min_level = level;
        self
    }
}

struct SessionInner {
    file: Mutex<Option<File>>,
    path: PathBuf,
    log_dir: PathBuf,
    max_size_mb: u64,
    max_backups: usize,
    min_level: Level,
    color: bool,
    finished: AtomicBool,
    exit_code: AtomicI32,
}

/// A live logging session writing to the console and one log file.
#[derive(Clone)]
pub struct LogSession {
    inner: Arc<SessionInner>,
}

impl LogSession {
    /// Open a new session in `options.log_dir`.
    ///
    /// Ensures the directory exists with mode `0744` (owned by the invoking
    /// user even under `sudo`), then creates
    /// `<name_prefix>_<YYYYMMDD_HHMMSS>.log` with mode `0600`.
    pub fn setup(options: SessionOptions) -> Result<Self, SetupError> {
        let file_name = format!(
            "{}_{}.log",
            options.name_prefix,
            Local::now().format(FILE_TIMESTAMP)
        );
        let path = options.log_dir.join(file_name);
        Self::setup_at(path, options)
    }

    /// Open a new session at an explicit log file path.
    ///
    /// Used when the caller overrides the derived file name; the parent
    /// directory is still ensured and secured.
    pub fn setup_at(path: PathBuf, options: SessionOptions) -> Result<Self, SetupError> {
        // A bare file name lands in the configured log directory, so the
        // directory that gets secured and swept is the one holding the file.
        let bare = path.parent().map_or(true, |p| p.as_os_str().is_empty());
        let path = if bare {
            options.log_dir.join(path)
        } else {
            path
        };
        let log_dir = path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."));

        fs::create_dir_all(&log_dir).map_err(|source| SetupError::CreateDir {
            path: log_dir.clone(),
            source,
        })?;
        secure_path(&log_dir, 0o744)?;

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(|source| SetupError::CreateFile {
                path: path.clone(),
                source,
            })?;
        secure_path(&path, 0o600)?;

        Ok(Self {
            inner: Arc::new(SessionInner {
                file: Mutex::new(Some(file)),
                path,
                log_dir,
                max_size_mb: options.max_size_mb,
                max_backups: options.max_backups,
                min_level: options.min_level,
                color: io::stderr().is_tty(),
                finished: AtomicBool::new(false),
                exit_code: AtomicI32::new(0),
            }),
        })
    }

    /// Path of the active log file.
    pub fn path(&self) -> &Path {
        &self.inner.path
    }

    /// Directory holding the active log file and its backups.
    pub fn log_dir(&self) -> &Path {
        &self.inner.log_dir
    }

    pub fn max_size_mb(&self) -> u64 {
        self.inner.max_size_mb
    }

    pub fn max_backups(&self) -> usize {
        self.inner.max_backups
    }

    /// Write one leveled entry to both sinks.
    ///
    /// Entries below the configured minimum produce no output at all, not
    /// even a file write. `Fatal` terminates the process with status 1
    /// immediately after the entry is written.
    pub fn log(&self, level: Level, message: &str) {
        if !level.passes(self.inner.min_level) {
            return;
        }
        let line = format!(
            "[{}] [{}] {}",
            Local::now().format(ENTRY_TIMESTAMP),
            level.as_str(),
            message
        );
        self.inner.write_console(&line, level);
        self.inner.append_file(&line);

        if level == Level::Fatal {
            self.inner.exit_code.store(1, Ordering::SeqCst);
            self.inner.finish();
            process::exit(1);
        }
    }

    pub fn debug(&self, message: &str) {
        self.log(Level::Debug, message);
    }

    pub fn info(&self, message: &str) {
        self.log(Level::Info, message);
    }

    pub fn success(&self, message: &str) {
        self.log(Level::Success, message);
    }

    pub fn warning(&self, message: &str) {
        self.log(Level::Warning, message);
    }

    pub fn error(&self, message: &str) {
        self.log(Level::Error, message);
    }

    /// Log at `Fatal` and terminate the process.
    pub fn fatal(&self, message: &str) -> ! {
        self.log(Level::Fatal, message);
        // log() exits for Fatal; this is unreachable but keeps the signature honest
        process::exit(1);
    }

    /// Mirror one raw line of subprocess output to the terminal and the log
    /// file, bypassing the level filter.
    pub fn child_line(&self, line: &str) {
        let mut out = io::stdout();
        let _ = writeln!(out, "{line}");
        self.inner.append_file(line);
    }

    /// Record the status the process intends to exit with.
    ///
    /// Picked up by [`finish`](Self::finish) when the final entry is written.
    pub fn set_exit_code(&self, code: i32) {
        self.inner.exit_code.store(code, Ordering::SeqCst);
    }

    /// Write the final status entry and close the file sink.
    ///
    /// Best-effort and idempotent: at most one final line is written even if
    /// called explicitly and again when the session drops, and write failures
    /// are swallowed.
    pub fn finish(&self) {
        self.inner.finish();
    }
}

impl SessionInner {
    fn write_console(&self, line: &str, level: Level) {
        let mut err = io::stderr();
        if self.color {
            let _ = writeln!(err, "{}", style(line).with(level.color()));
        } else {
            let _ = writeln!(err, "{line}");
        }
    }

    fn append_file(&self, line: &str) {
        // Post-setup file failures degrade to console-only, never an error.
        if let Ok(mut guard) = self.file.lock() {
            if let Some(file) = guard.as_mut() {
                let _ = writeln!(file, "{line}");
                let _ = file.flush();
            }
        }
    }

    fn finish(&self) {
        if self.finished.swap(true, Ordering::SeqCst) {
            return;
        }
        let code = self.exit_code.load(Ordering::SeqCst);
        // Bypasses the level filter: the final entry is always attempted.
        let line = format!(
            "[{}] [{}] exiting with status {}",
            Local::now().format(ENTRY_TIMESTAMP),
            Level::Info.as_str(),
            code
        );
        self.write_console(&line, Level::Info);
        if let Ok(mut guard) = self.file.lock() {
            if let Some(mut file) = guard.take() {
                let _ = writeln!(file, "{line}");
                let _ = file.flush();
            }
        }
    }
}

impl Drop for SessionInner {
    fn drop(&mut self) {
        self.finish();
    }
}

/// Apply the requested mode and, under `sudo`, hand ownership back to the
/// invoking user.
#[cfg(unix)]
pub(crate) fn secure_path(path: &Path, mode: u32) -> Result<(), SetupError> {
    use std::os::unix::fs::PermissionsExt;

    fs::set_permissions(path, fs::Permissions::from_mode(mode)).map_err(|source| {
        SetupError::Secure {
            path: path.to_path_buf(),
            source,
        }
    })?;
    chown_invoking_user(path).map_err(|source| SetupError::Secure {
        path: path.to_path_buf(),
        source,
    })
}

#[cfg(not(unix))]
pub(crate) fn secure_path(_path: &Path, _mode: u32) -> Result<(), SetupError> {
    Ok(())
}

/// Chown `path` to the pre-elevation user recorded by `sudo`, if any.
#[cfg(unix)]
fn chown_invoking_user(path: &Path) -> io::Result<()> {
    use std::ffi::CString;
    use std::os::unix::ffi::OsStrExt;

    let Some(uid) = invoking_id("SUDO_UID") else {
        return Ok(());
    };
    // u32::MAX tells chown to leave the group unchanged
    let gid = invoking_id("SUDO_GID").unwrap_or(u32::MAX);

    let c_path = CString::new(path.as_os_str().as_bytes())
        .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "path contains NUL"))?;
    let rc = unsafe { libc::chown(c_path.as_ptr(), uid, gid) };
    if rc == 0 {
        Ok(())
    } else {
        Err(io::Error::last_os_error())
    }
}

#[cfg(unix)]
fn invoking_id(var: &str) -> Option<u32> {
    std::env::var(var).ok()?.parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn read_log(session: &LogSession) -> String {
        fs::read_to_string(session.path()).unwrap()
    }

    #[test]
    fn test_setup_creates_timestamped_file() {
        let temp_dir = TempDir::new().unwrap();
        let session =
            LogSession::setup(SessionOptions::new(temp_dir.path(), "setup")).unwrap();

        let name = session.path().file_name().unwrap().to_string_lossy();
        assert!(name.starts_with("setup_"));
        assert!(name.ends_with(".log"));
        assert!(session.path().exists());
    }

    #[cfg(unix)]
    #[test]
    fn test_setup_applies_restrictive_modes() {
        use std::os::unix::fs::PermissionsExt;

        let temp_dir = TempDir::new().unwrap();
        let log_dir = temp_dir.path().join("logs");
        let session = LogSession::setup(SessionOptions::new(&log_dir, "perm")).unwrap();

        let dir_mode = fs::metadata(&log_dir).unwrap().permissions().mode() & 0o777;
        let file_mode = fs::metadata(session.path()).unwrap().permissions().mode() & 0o777;
        assert_eq!(dir_mode, 0o744);
        assert_eq!(file_mode, 0o600);
    }

    #[test]
    fn test_setup_at_bare_name_lands_in_log_dir() {
        let temp_dir = TempDir::new().unwrap();
        let options = SessionOptions::new(temp_dir.path(), "bare");
        let session = LogSession::setup_at(PathBuf::from("bare.log"), options).unwrap();

        assert_eq!(session.path(), temp_dir.path().join("bare.log"));
        assert_eq!(session.log_dir(), temp_dir.path());
        assert!(session.path().exists());
    }

    #[test]
    fn test_setup_at_explicit_path_uses_its_parent() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("nested").join("run.log");
        let options = SessionOptions::new(temp_dir.path().join("elsewhere"), "run");
        let session = LogSession::setup_at(path.clone(), options).unwrap();

        assert_eq!(session.log_dir(), path.parent().unwrap());
        assert!(path.exists());
    }

    #[test]
    fn test_entry_format() {
        let temp_dir = TempDir::new().unwrap();
        let session = LogSession::setup(SessionOptions::new(temp_dir.path(), "fmt")).unwrap();

        session.info("hello world");

        let content = read_log(&session);
        let line = content.lines().next().unwrap();
        assert!(line.starts_with('['), "line: {line}");
        assert!(line.contains("] [INFO] hello world"), "line: {line}");
        // millisecond precision with a UTC offset, e.g. [2026-08-30T10:15:02.123+02:00]
        let stamp = &line[1..line.find(']').unwrap()];
        assert!(stamp.contains('.'), "stamp: {stamp}");
        assert!(stamp.contains('+') || stamp.contains('-'), "stamp: {stamp}");
    }

    #[test]
    fn test_below_minimum_writes_nothing() {
        let temp_dir = TempDir::new().unwrap();
        let session = LogSession::setup(
            SessionOptions::new(temp_dir.path(), "filter").min_level(Level::Warning),
        )
        .unwrap();

        session.debug("quiet debug");
        session.info("quiet info");
        session.success("quiet success");
        assert_eq!(read_log(&session), "");

        session.warning("loud warning");
        assert!(read_log(&session).contains("] [WARNING] loud warning"));
    }

    #[test]
    fn test_child_line_bypasses_filter() {
        let temp_dir = TempDir::new().unwrap();
        let session = LogSession::setup(
            SessionOptions::new(temp_dir.path(), "child").min_level(Level::Error),
        )
        .unwrap();

        session.child_line("raw subprocess output");
        assert_eq!(read_log(&session), "raw subprocess output\n");
    }

    #[test]
    fn test_finish_is_idempotent() {
        let temp_dir = TempDir::new().unwrap();
        let session = LogSession::setup(SessionOptions::new(temp_dir.path(), "exit")).unwrap();

        session.set_exit_code(3);
        session.finish();
        session.finish();
        drop(session.clone());

        let content = read_log(&session);
        let finals = content
            .lines()
            .filter(|l| l.contains("exiting with status"))
            .count();
        assert_eq!(finals, 1);
        assert!(content.contains("exiting with status 3"));
    }

    #[test]
    fn test_drop_writes_final_entry() {
        let temp_dir = TempDir::new().unwrap();
        let session = LogSession::setup(SessionOptions::new(temp_dir.path(), "drop")).unwrap();
        let path = session.path().to_path_buf();

        drop(session);

        let content = fs::read_to_string(path).unwrap();
        assert!(content.contains("exiting with status 0"));
    }

    #[test]
    fn test_logging_after_finish_skips_file() {
        let temp_dir = TempDir::new().unwrap();
        let session = LogSession::setup(SessionOptions::new(temp_dir.path(), "closed")).unwrap();

        session.finish();
        session.info("too late");

        assert!(!read_log(&session).contains("too late"));
    }
}
