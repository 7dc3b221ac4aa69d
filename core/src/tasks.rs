//! Background worker tasks
//!
//! Long-running operations (project file transfer, waiting for the local
//! server to come up) run on worker threads and report progress over an
//! mpsc channel so the caller can keep its event loop responsive and offer
//! a cancel affordance.

use crate::server::try_connect;
use crate::Result;
use log::{info, warn};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::Sender;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

/// Interval between connection attempts while waiting for a server
const WAIT_POLL_INTERVAL: Duration = Duration::from_millis(500);

/// Shared cancellation flag for background tasks
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation; workers observe it between work items
    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

/// Progress events emitted by background tasks
#[derive(Debug)]
pub enum TaskEvent {
    /// A file finished transferring
    FileProcessed(PathBuf),
    /// A file failed to transfer; the task keeps going
    FileError { path: PathBuf, message: String },
    /// Still waiting for the server endpoint to accept connections
    WaitingForConnection { attempt: u32 },
    /// The task is done
    Finished,
}

/// Whether a transfer copies files or moves them
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferKind {
    Copy,
    Move,
}

/// Outcome of a file tree transfer
#[derive(Debug, Default)]
pub struct TransferReport {
    /// Number of files transferred
    pub processed: usize,
    /// Human-readable description of each file that failed
    pub errors: Vec<String>,
    /// True when the task stopped because of cancellation
    pub cancelled: bool,
}

impl TransferReport {
    pub fn is_clean(&self) -> bool {
        self.errors.is_empty() && !self.cancelled
    }
}

/// Create every subdirectory of `source` under `dest`, without touching file
/// contents. Pre-existing directories are tolerated.
pub fn mirror_directory_tree(source: &Path, dest: &Path) -> Result<()> {
    if !source.is_dir() {
        return Ok(());
    }
    for entry in fs::read_dir(source)? {
        let entry = entry?;
        let path = entry.path();
        if path.is_dir() {
            let target = dest.join(entry.file_name());
            match fs::create_dir(&target) {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {}
                Err(e) => return Err(e.into()),
            }
            mirror_directory_tree(&path, &target)?;
        }
    }
    Ok(())
}

/// Transfer the file contents of `source` into `dest` on the calling thread.
///
/// Errors on individual files are collected, not fatal; cancellation is
/// observed between files and leaves already-transferred files in place.
pub fn transfer_tree(
    source: &Path,
    dest: &Path,
    kind: TransferKind,
    token: &CancelToken,
    events: Option<&Sender<TaskEvent>>,
) -> TransferReport {
    let mut report = TransferReport::default();
    transfer_dir(source, dest, kind, token, events, &mut report);
    if let Some(tx) = events {
        let _ = tx.send(TaskEvent::Finished);
    }
    report
}

fn transfer_dir(
    source: &Path,
    dest: &Path,
    kind: TransferKind,
    token: &CancelToken,
    events: Option<&Sender<TaskEvent>>,
    report: &mut TransferReport,
) {
    let entries = match fs::read_dir(source) {
        Ok(entries) => entries,
        Err(e) => {
            report
                .errors
                .push(format!("{}: {}", source.display(), e));
            return;
        }
    };

    for entry in entries {
        if token.is_cancelled() {
            warn!("transfer cancelled, leaving {} partially populated", dest.display());
            report.cancelled = true;
            return;
        }

        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                report
                    .errors
                    .push(format!("{}: {}", source.display(), e));
                continue;
            }
        };

        let source_path = entry.path();
        let dest_path = dest.join(entry.file_name());

        if source_path.is_dir() {
            if !dest_path.is_dir() {
                if let Err(e) = fs::create_dir(&dest_path) {
                    report
                        .errors
                        .push(format!("{}: {}", dest_path.display(), e));
                    continue;
                }
            }
            transfer_dir(&source_path, &dest_path, kind, token, events, report);
            if report.cancelled {
                return;
            }
        } else {
            match fs::copy(&source_path, &dest_path) {
                Ok(_) => {
                    if kind == TransferKind::Move {
                        if let Err(e) = fs::remove_file(&source_path) {
                            report
                                .errors
                                .push(format!("{}: {}", source_path.display(), e));
                        }
                    }
                    report.processed += 1;
                    if let Some(tx) = events {
                        let _ = tx.send(TaskEvent::FileProcessed(source_path));
                    }
                }
                Err(e) => {
                    report
                        .errors
                        .push(format!("{}: {}", source_path.display(), e));
                    if let Some(tx) = events {
                        let _ = tx.send(TaskEvent::FileError {
                            path: source_path,
                            message: e.to_string(),
                        });
                    }
                }
            }
        }
    }
}

/// Run a file tree transfer on a worker thread
pub fn spawn_transfer(
    source: PathBuf,
    dest: PathBuf,
    kind: TransferKind,
    token: CancelToken,
    events: Option<Sender<TaskEvent>>,
) -> JoinHandle<TransferReport> {
    thread::spawn(move || transfer_tree(&source, &dest, kind, &token, events.as_ref()))
}

/// How a wait-for-connection attempt ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitOutcome {
    Connected,
    Cancelled,
    TimedOut,
}

/// Poll `host:port` until it accepts a TCP connection, the caller cancels,
/// or `wait_timeout` elapses.
pub fn wait_for_connection(
    host: &str,
    port: u16,
    connect_timeout: Duration,
    wait_timeout: Duration,
    token: &CancelToken,
    events: Option<&Sender<TaskEvent>>,
) -> WaitOutcome {
    let deadline = Instant::now() + wait_timeout;
    let mut attempt: u32 = 0;

    loop {
        if token.is_cancelled() {
            return WaitOutcome::Cancelled;
        }
        if Instant::now() >= deadline {
            warn!("timed out waiting for {}:{}", host, port);
            return WaitOutcome::TimedOut;
        }

        attempt += 1;
        if let Some(tx) = events {
            let _ = tx.send(TaskEvent::WaitingForConnection { attempt });
        }

        if try_connect(host, port, connect_timeout).is_ok() {
            info!("{}:{} became reachable after {} attempts", host, port, attempt);
            return WaitOutcome::Connected;
        }

        thread::sleep(WAIT_POLL_INTERVAL);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::TcpListener;
    use std::sync::mpsc::channel;
    use tempfile::tempdir;

    fn write_file(path: &Path, content: &str) {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::write(path, content).unwrap();
    }

    #[test]
    fn test_mirror_directory_tree() {
        let dir = tempdir().unwrap();
        let source = dir.path().join("src");
        let dest = dir.path().join("dst");
        fs::create_dir_all(source.join("a/b")).unwrap();
        fs::create_dir_all(source.join("c")).unwrap();
        write_file(&source.join("a/file.cfg"), "data");
        fs::create_dir(&dest).unwrap();

        mirror_directory_tree(&source, &dest).unwrap();

        assert!(dest.join("a/b").is_dir());
        assert!(dest.join("c").is_dir());
        // Only directories are mirrored
        assert!(!dest.join("a/file.cfg").exists());

        // Mirroring again tolerates pre-existing directories
        mirror_directory_tree(&source, &dest).unwrap();
    }

    #[test]
    fn test_transfer_copy_keeps_source() {
        let dir = tempdir().unwrap();
        let source = dir.path().join("src");
        let dest = dir.path().join("dst");
        write_file(&source.join("r1/startup.cfg"), "hostname R1");
        write_file(&source.join("top.txt"), "x");
        fs::create_dir(&dest).unwrap();

        let token = CancelToken::new();
        let report = transfer_tree(&source, &dest, TransferKind::Copy, &token, None);

        assert!(report.is_clean());
        assert_eq!(report.processed, 2);
        assert!(source.join("r1/startup.cfg").exists());
        assert_eq!(
            fs::read_to_string(dest.join("r1/startup.cfg")).unwrap(),
            "hostname R1"
        );
    }

    #[test]
    fn test_transfer_move_removes_source_files() {
        let dir = tempdir().unwrap();
        let source = dir.path().join("src");
        let dest = dir.path().join("dst");
        write_file(&source.join("r1/startup.cfg"), "hostname R1");
        fs::create_dir(&dest).unwrap();

        let token = CancelToken::new();
        let report = transfer_tree(&source, &dest, TransferKind::Move, &token, None);

        assert!(report.is_clean());
        assert!(!source.join("r1/startup.cfg").exists());
        assert!(dest.join("r1/startup.cfg").exists());
    }

    #[test]
    fn test_transfer_cancellation_leaves_partial_state() {
        let dir = tempdir().unwrap();
        let source = dir.path().join("src");
        let dest = dir.path().join("dst");
        write_file(&source.join("a.txt"), "a");
        write_file(&source.join("b.txt"), "b");
        fs::create_dir(&dest).unwrap();

        let token = CancelToken::new();
        token.cancel();
        let report = transfer_tree(&source, &dest, TransferKind::Copy, &token, None);

        assert!(report.cancelled);
        assert_eq!(report.processed, 0);
        // Source untouched
        assert!(source.join("a.txt").exists());
        assert!(source.join("b.txt").exists());
    }

    #[test]
    fn test_spawn_transfer_reports_events() {
        let dir = tempdir().unwrap();
        let source = dir.path().join("src");
        let dest = dir.path().join("dst");
        write_file(&source.join("a.txt"), "a");
        fs::create_dir(&dest).unwrap();

        let (tx, rx) = channel();
        let handle = spawn_transfer(
            source,
            dest,
            TransferKind::Copy,
            CancelToken::new(),
            Some(tx),
        );
        let report = handle.join().unwrap();
        assert!(report.is_clean());

        let events: Vec<TaskEvent> = rx.iter().collect();
        assert!(matches!(events.last(), Some(TaskEvent::Finished)));
        assert!(events
            .iter()
            .any(|e| matches!(e, TaskEvent::FileProcessed(_))));
    }

    #[test]
    fn test_wait_for_connection_success() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();

        let outcome = wait_for_connection(
            "127.0.0.1",
            port,
            Duration::from_secs(1),
            Duration::from_secs(5),
            &CancelToken::new(),
            None,
        );
        assert_eq!(outcome, WaitOutcome::Connected);
    }

    #[test]
    fn test_wait_for_connection_cancelled() {
        let token = CancelToken::new();
        token.cancel();
        let outcome = wait_for_connection(
            "127.0.0.1",
            1,
            Duration::from_millis(100),
            Duration::from_secs(5),
            &token,
            None,
        );
        assert_eq!(outcome, WaitOutcome::Cancelled);
    }

    #[test]
    fn test_wait_for_connection_times_out() {
        let outcome = wait_for_connection(
            "127.0.0.1",
            1,
            Duration::from_millis(50),
            Duration::from_millis(100),
            &CancelToken::new(),
            None,
        );
        assert_eq!(outcome, WaitOutcome::TimedOut);
    }
}
