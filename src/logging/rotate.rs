//! Size-based log rotation, out-of-band compression, and backup pruning.
//!
//! Rotation renames oversized logs to timestamp-suffixed backups and gzips
//! each backup on a background thread. Every failure in here degrades to a
//! warning through the session; nothing propagates.

use std::fs::{self, File};
use std::io::{self, BufReader, BufWriter};
use std::path::{Path, PathBuf};
use std::thread::{self, JoinHandle};
use std::time::SystemTime;

use chrono::Local;
use flate2::write::GzEncoder;
use flate2::Compression;

use super::session::{secure_path, LogSession, FILE_TIMESTAMP};

/// Suffix appended to compressed backups.
pub const COMPRESSED_SUFFIX: &str = ".gz";

const BYTES_PER_MB: u64 = 1024 * 1024;

/// Handle for one rotation sweep.
///
/// Compression runs on background threads. Callers that need the "backup is
/// compressed" guarantee call [`wait`](Rotation::wait); everyone else drops
/// the handle and lets compression finish on its own.
pub struct Rotation {
    /// Backups created by this sweep, before compression.
    pub rotated: Vec<PathBuf>,
    tasks: Vec<JoinHandle<()>>,
}

impl Rotation {
    /// Block until every compression task spawned by this sweep has finished.
    pub fn wait(self) {
        for task in self.tasks {
            let _ = task.join();
        }
    }
}

/// Sweep `log_dir` for oversized log files, rotating and compressing each.
///
/// A file rotates when its size in whole megabytes is at least `max_size_mb`.
/// The session's own active file is left alone. After rotation the compressed
/// backups are pruned down to `max_backups`.
pub fn rotate(
    session: &LogSession,
    log_dir: &Path,
    max_size_mb: u64,
    max_backups: usize,
) -> Rotation {
    let mut rotated = Vec::new();
    let mut tasks = Vec::new();

    let entries = match fs::read_dir(log_dir) {
        Ok(entries) => entries,
        Err(err) => {
            session.warning(&format!(
                "rotation skipped, cannot read {}: {err}",
                log_dir.display()
            ));
            return Rotation { rotated, tasks };
        }
    };

    for entry in entries.flatten() {
        let path = entry.path();
        if !is_active_log(&path) || path == session.path() {
            continue;
        }
        let size = match entry.metadata() {
            Ok(metadata) => metadata.len(),
            Err(err) => {
                session.warning(&format!("cannot stat {}: {err}", path.display()));
                continue;
            }
        };
        if size / BYTES_PER_MB < max_size_mb {
            continue;
        }

        let backup = backup_path(&path);
        if let Err(err) = fs::rename(&path, &backup) {
            session.warning(&format!(
                "failed to rotate {}: {err}",
                path.display()
            ));
            continue;
        }
        rotated.push(backup.clone());
        recreate_log(session, &path);

        let worker = session.clone();
        tasks.push(thread::spawn(move || {
            if let Err(err) = compress(&backup) {
                worker.warning(&format!(
                    "failed to compress {}: {err}",
                    backup.display()
                ));
            }
        }));
    }

    prune_backups(session, log_dir, max_backups);
    Rotation { rotated, tasks }
}

/// Delete the oldest compressed backups until at most `max_backups` remain.
///
/// Oldest means earliest modification time; equal timestamps are broken by
/// lexicographic file name, smallest first. Deletion failures are warnings.
pub fn prune_backups(session: &LogSession, log_dir: &Path, max_backups: usize) {
    let entries = match fs::read_dir(log_dir) {
        Ok(entries) => entries,
        Err(err) => {
            session.warning(&format!(
                "prune skipped, cannot read {}: {err}",
                log_dir.display()
            ));
            return;
        }
    };

    let mut backups: Vec<(SystemTime, PathBuf)> = entries
        .flatten()
        .filter(|entry| is_compressed_backup(&entry.path()))
        .filter_map(|entry| {
            let modified = entry.metadata().ok()?.modified().ok()?;
            Some((modified, entry.path()))
        })
        .collect();

    if backups.len() <= max_backups {
        return;
    }

    backups.sort_by(|a, b| a.0.cmp(&b.0).then_with(|| a.1.cmp(&b.1)));
    let excess = backups.len() - max_backups;
    for (_, path) in backups.into_iter().take(excess) {
        if let Err(err) = fs::remove_file(&path) {
            session.warning(&format!(
                "failed to prune backup {}: {err}",
                path.display()
            ));
        }
    }
}

/// Leave a fresh empty log (mode `0600`) at the rotated path, so the original
/// path always exists again after a sweep. Failures degrade to warnings.
fn recreate_log(session: &LogSession, path: &Path) {
    match File::create(path) {
        Ok(_) => {
            if let Err(err) = secure_path(path, 0o600) {
                session.warning(&err.to_string());
            }
        }
        Err(err) => session.warning(&format!(
            "failed to recreate {}: {err}",
            path.display()
        )),
    }
}

/// An uncompressed log file eligible for rotation.
fn is_active_log(path: &Path) -> bool {
    path.is_file() && path.extension().is_some_and(|ext| ext == "log")
}

/// A rotated backup that has already been compressed.
fn is_compressed_backup(path: &Path) -> bool {
    path.file_name()
        .and_then(|name| name.to_str())
        .is_some_and(|name| name.contains(".log.") && name.ends_with(COMPRESSED_SUFFIX))
}

/// Backup name for a rotated log: the original name plus a timestamp suffix.
fn backup_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().unwrap_or_default().to_os_string();
    name.push(format!(".{}", Local::now().format(FILE_TIMESTAMP)));
    path.with_file_name(name)
}

/// Gzip `path` in place, removing the uncompressed original on success.
fn compress(path: &Path) -> io::Result<PathBuf> {
    let mut target = path.as_os_str().to_os_string();
    target.push(COMPRESSED_SUFFIX);
    let target = PathBuf::from(target);

    let mut reader = BufReader::new(File::open(path)?);
    let writer = BufWriter::new(File::create(&target)?);
    let mut encoder = GzEncoder::new(writer, Compression::default());
    io::copy(&mut reader, &mut encoder)?;
    encoder.finish()?;

    fs::remove_file(path)?;
    Ok(target)
}
