//! In-memory process layer for exercising runtimes without docker or podman.

use crate::process::{LaunchSpec, Process, ProcessLauncher, Sleeper, SIGKILL};
use std::io;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
}

/// Records every launch request and hands out [`MockProcess`] handles.
#[derive(Debug, Default)]
pub struct MockLauncher {
    launches: Mutex<Vec<LaunchSpec>>,
    processes: Mutex<Vec<Arc<MockProcess>>>,
    failure: Mutex<Option<io::ErrorKind>>,
    touch_on_launch: Mutex<Option<PathBuf>>,
    exit_code: Mutex<i32>,
    next_pid: AtomicU32,
}

impl MockLauncher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every launch fails with `kind`, as if the binary could not be started.
    pub fn failing(kind: io::ErrorKind) -> Self {
        let launcher = Self::default();
        *lock(&launcher.failure) = Some(kind);
        launcher
    }

    /// Create `path` when a launch succeeds, e.g. a socket a service would bind.
    #[must_use]
    pub fn touching(self, path: impl Into<PathBuf>) -> Self {
        *lock(&self.touch_on_launch) = Some(path.into());
        self
    }

    #[must_use]
    pub fn exiting_with(self, code: i32) -> Self {
        *lock(&self.exit_code) = code;
        self
    }

    pub fn launch_count(&self) -> usize {
        lock(&self.launches).len()
    }

    pub fn launches(&self) -> Vec<LaunchSpec> {
        lock(&self.launches).clone()
    }

    pub fn processes(&self) -> Vec<Arc<MockProcess>> {
        lock(&self.processes).clone()
    }
}

impl ProcessLauncher for MockLauncher {
    fn launch(&self, spec: &LaunchSpec) -> io::Result<Arc<dyn Process>> {
        lock(&self.launches).push(spec.clone());
        if let Some(kind) = *lock(&self.failure) {
            return Err(io::Error::new(kind, format!("{}: mock launch failure", spec.program)));
        }
        if let Some(path) = lock(&self.touch_on_launch).as_ref() {
            std::fs::write(path, b"")?;
        }
        let pid = 40_000 + self.next_pid.fetch_add(1, Ordering::SeqCst);
        let process = Arc::new(MockProcess::new(pid, *lock(&self.exit_code)));
        lock(&self.processes).push(Arc::clone(&process));
        Ok(process)
    }
}

/// A process that never ran; it only counts what was done to it.
#[derive(Debug)]
pub struct MockProcess {
    pid: u32,
    exit_code: i32,
    signals: Mutex<Vec<i32>>,
    waits: AtomicUsize,
}

impl MockProcess {
    pub fn new(pid: u32, exit_code: i32) -> Self {
        Self {
            pid,
            exit_code,
            signals: Mutex::new(Vec::new()),
            waits: AtomicUsize::new(0),
        }
    }

    pub fn signals(&self) -> Vec<i32> {
        lock(&self.signals).clone()
    }

    pub fn kill_count(&self) -> usize {
        lock(&self.signals).iter().filter(|s| **s == SIGKILL).count()
    }

    pub fn wait_count(&self) -> usize {
        self.waits.load(Ordering::SeqCst)
    }
}

impl Process for MockProcess {
    fn id(&self) -> u32 {
        self.pid
    }

    fn signal(&self, signal: i32) -> io::Result<()> {
        lock(&self.signals).push(signal);
        Ok(())
    }

    fn wait(&self) -> io::Result<i32> {
        self.waits.fetch_add(1, Ordering::SeqCst);
        Ok(self.exit_code)
    }
}

/// Returns immediately and counts how often it was asked to sleep.
#[derive(Debug, Default)]
pub struct MockSleeper {
    calls: AtomicUsize,
    appear: Mutex<Option<(usize, PathBuf)>>,
}

impl MockSleeper {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create `path` during the `n`th sleep.
    #[must_use]
    pub fn creating_after(self, n: usize, path: impl Into<PathBuf>) -> Self {
        *lock(&self.appear) = Some((n, path.into()));
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl Sleeper for MockSleeper {
    fn sleep(&self, _duration: Duration) {
        let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        if let Some((at, path)) = lock(&self.appear).as_ref() {
            if n == *at {
                let _ = std::fs::write(path, b"");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::process::SIGTERM;

    #[test]
    fn launcher_records_specs() {
        let launcher = MockLauncher::new().exiting_with(7);
        let spec = LaunchSpec::detached("podman", ["stop"]);
        let handle = launcher.launch(&spec).unwrap();
        assert_eq!(launcher.launch_count(), 1);
        assert_eq!(launcher.launches()[0], spec);
        assert_eq!(handle.wait().unwrap(), 7);
        assert_eq!(launcher.processes()[0].wait_count(), 1);
    }

    #[test]
    fn failing_launcher_still_records() {
        let launcher = MockLauncher::failing(io::ErrorKind::NotFound);
        let err = launcher
            .launch(&LaunchSpec::detached("docker", ["stop"]))
            .unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::NotFound);
        assert_eq!(launcher.launch_count(), 1);
        assert!(launcher.processes().is_empty());
    }

    #[test]
    fn process_counts_signals() {
        let p = MockProcess::new(1, 0);
        p.signal(SIGTERM).unwrap();
        p.kill().unwrap();
        assert_eq!(p.signals(), vec![SIGTERM, SIGKILL]);
        assert_eq!(p.kill_count(), 1);
    }

    #[test]
    fn sleeper_creates_file_on_schedule() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ready");
        let sleeper = MockSleeper::new().creating_after(2, &path);
        sleeper.sleep(Duration::from_secs(1));
        assert!(!path.exists());
        sleeper.sleep(Duration::from_secs(1));
        assert!(path.exists());
        assert_eq!(sleeper.calls(), 2);
    }
}
