use std::fmt;
use std::io;
use std::os::unix::process::{CommandExt, ExitStatusExt};
use std::process::{Child, Command, ExitStatus, Stdio};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::debug;

pub const SIGTERM: i32 = libc::SIGTERM;
pub const SIGKILL: i32 = libc::SIGKILL;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StdioMode {
    /// Share the caller's stdin/stdout/stderr.
    Inherit,
    /// Discard all standard streams.
    Null,
}

/// Everything needed to start one external process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchSpec {
    pub program: String,
    pub args: Vec<String>,
    pub stdio: StdioMode,
    /// Start in its own process group so terminal signals aimed at the
    /// caller do not reach it.
    pub detached: bool,
}

impl LaunchSpec {
    /// Foreground process with inherited streams from a full argument vector.
    pub fn foreground(argv: &[String]) -> io::Result<Self> {
        let (program, args) = argv.split_first().ok_or_else(|| {
            io::Error::new(io::ErrorKind::InvalidInput, "empty command line")
        })?;
        Ok(Self {
            program: program.clone(),
            args: args.to_vec(),
            stdio: StdioMode::Inherit,
            detached: false,
        })
    }

    /// Background helper with discarded streams in a new process group.
    pub fn detached<I, S>(program: &str, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            program: program.to_owned(),
            args: args.into_iter().map(Into::into).collect(),
            stdio: StdioMode::Null,
            detached: true,
        }
    }

    pub fn argv(&self) -> Vec<&str> {
        std::iter::once(self.program.as_str())
            .chain(self.args.iter().map(String::as_str))
            .collect()
    }
}

/// Handle on a spawned process.
///
/// Every method takes `&self`: one thread may block in [`Process::wait`]
/// while another delivers a signal.
pub trait Process: Send + Sync + fmt::Debug {
    fn id(&self) -> u32;

    /// Deliver `signal`. A process that already exited is not an error.
    fn signal(&self, signal: i32) -> io::Result<()>;

    fn kill(&self) -> io::Result<()> {
        self.signal(SIGKILL)
    }

    /// Block until the process exits and return its code. A process killed
    /// by a signal reports the negated signal number.
    fn wait(&self) -> io::Result<i32>;
}

pub trait ProcessLauncher: Send + Sync {
    fn launch(&self, spec: &LaunchSpec) -> io::Result<Arc<dyn Process>>;
}

/// Delay source for polling loops.
pub trait Sleeper: Send + Sync {
    fn sleep(&self, duration: Duration);
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ThreadSleeper;

impl Sleeper for ThreadSleeper {
    fn sleep(&self, duration: Duration) {
        std::thread::sleep(duration);
    }
}

/// Launches real processes through `std::process::Command`.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemLauncher;

impl ProcessLauncher for SystemLauncher {
    fn launch(&self, spec: &LaunchSpec) -> io::Result<Arc<dyn Process>> {
        let mut cmd = Command::new(&spec.program);
        cmd.args(&spec.args);
        match spec.stdio {
            StdioMode::Inherit => {
                cmd.stdin(Stdio::inherit())
                    .stdout(Stdio::inherit())
                    .stderr(Stdio::inherit());
            }
            StdioMode::Null => {
                cmd.stdin(Stdio::null())
                    .stdout(Stdio::null())
                    .stderr(Stdio::null());
            }
        }
        if spec.detached {
            cmd.process_group(0);
        }

        let child = cmd.spawn()?;
        debug!("spawned {} (pid {})", spec.program, child.id());
        Ok(Arc::new(SystemProcess::new(child)))
    }
}

#[derive(Debug)]
pub struct SystemProcess {
    pid: u32,
    child: Mutex<Child>,
    reaped: AtomicBool,
}

impl SystemProcess {
    pub fn new(child: Child) -> Self {
        Self {
            pid: child.id(),
            child: Mutex::new(child),
            reaped: AtomicBool::new(false),
        }
    }
}

impl Process for SystemProcess {
    fn id(&self) -> u32 {
        self.pid
    }

    fn signal(&self, signal: i32) -> io::Result<()> {
        // Once reaped the pid may belong to somebody else.
        if self.reaped.load(Ordering::SeqCst) {
            return Ok(());
        }
        let pid = i32::try_from(self.pid).map_err(|_| {
            io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("invalid pid {}: exceeds i32 range", self.pid),
            )
        })?;
        // SAFETY: kill() with a valid pid and signal is safe; pid validated via i32::try_from above.
        #[allow(unsafe_code)]
        let ret = unsafe { libc::kill(pid, signal) };
        if ret != 0 {
            let errno = io::Error::last_os_error();
            if errno.raw_os_error() == Some(libc::ESRCH) {
                debug!("pid {pid} already exited before signal {signal}");
                return Ok(());
            }
            return Err(errno);
        }
        Ok(())
    }

    fn wait(&self) -> io::Result<i32> {
        let mut child = self
            .child
            .lock()
            .map_err(|e| io::Error::other(format!("mutex poisoned: {e}")))?;
        let status = child.wait()?;
        self.reaped.store(true, Ordering::SeqCst);
        Ok(exit_code(status))
    }
}

pub(crate) fn exit_code(status: ExitStatus) -> i32 {
    status
        .code()
        .or_else(|| status.signal().map(|s| -s))
        .unwrap_or(1)
}
