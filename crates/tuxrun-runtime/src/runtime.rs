use crate::backend::Backend;
use crate::binding::{Binding, BindingSet};
use crate::command::{build_command, CommandOptions};
use crate::host::HostProbe;
use crate::process::{
    LaunchSpec, Process, ProcessLauncher, Sleeper, SystemLauncher, ThreadSleeper, SIGTERM,
};
use crate::RuntimeError;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::{debug, info, warn};

/// Grace period handed to `<engine> stop`.
pub const STOP_TIMEOUT_SECS: u32 = 60;

#[derive(Debug, Default)]
pub(crate) struct ProcessState {
    pub(crate) primary: Option<Arc<dyn Process>>,
    pub(crate) returncode: Option<i32>,
    /// Fire-and-forget helpers such as `<engine> stop`.
    pub(crate) side: Vec<Arc<dyn Process>>,
    /// Long-lived helper started by `pre_run`.
    pub(crate) service: Option<Arc<dyn Process>>,
}

/// One job's execution environment on a given backend.
///
/// Configuration (`name`, `image`, `bind`, toggles, `pre_run`) needs
/// `&mut self` and must be finished before `run`. `run`, `kill` and
/// `post_run` take `&self`, so a shared runtime can be killed from another
/// thread or a signal handler while `run` waits on the process.
pub struct Runtime {
    backend: Backend,
    directory: PathBuf,
    name: Option<String>,
    image: Option<String>,
    bindings: BindingSet,
    host_network: bool,
    skip_http_server: bool,
    pub(crate) launcher: Arc<dyn ProcessLauncher>,
    pub(crate) sleeper: Arc<dyn Sleeper>,
    state: Mutex<ProcessState>,
}

impl Runtime {
    pub fn new(backend: Backend, directory: impl Into<PathBuf>) -> Self {
        Self {
            backend,
            directory: directory.into(),
            name: None,
            image: None,
            bindings: BindingSet::new(),
            host_network: false,
            skip_http_server: false,
            launcher: Arc::new(SystemLauncher),
            sleeper: Arc::new(ThreadSleeper),
            state: Mutex::new(ProcessState::default()),
        }
    }

    #[must_use]
    pub fn with_launcher(mut self, launcher: Arc<dyn ProcessLauncher>) -> Self {
        self.launcher = launcher;
        self
    }

    #[must_use]
    pub fn with_sleeper(mut self, sleeper: Arc<dyn Sleeper>) -> Self {
        self.sleeper = sleeper;
        self
    }

    pub fn name(&mut self, value: impl Into<String>) -> &mut Self {
        self.name = Some(value.into());
        self
    }

    pub fn image(&mut self, value: impl Into<String>) -> &mut Self {
        self.image = Some(value.into());
        self
    }

    /// Append a binding. Destination clashes surface when the command is built.
    pub fn bind(&mut self, binding: Binding) -> &mut Self {
        self.bindings.push(binding);
        self
    }

    pub fn use_host_network(&mut self) -> &mut Self {
        self.host_network = true;
        self
    }

    pub fn skip_http_server(&mut self) -> &mut Self {
        self.skip_http_server = true;
        self
    }

    pub fn backend(&self) -> Backend {
        self.backend
    }

    pub fn directory(&self) -> &Path {
        &self.directory
    }

    pub fn instance_name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn image_ref(&self) -> Option<&str> {
        self.image.as_deref()
    }

    pub fn bindings(&self) -> &BindingSet {
        &self.bindings
    }

    pub fn host_network(&self) -> bool {
        self.host_network
    }

    pub fn http_server_skipped(&self) -> bool {
        self.skip_http_server
    }

    /// Live primary process, only present while a [`RunScope`] is open.
    pub fn primary(&self) -> Option<Arc<dyn Process>> {
        self.state().primary.clone()
    }

    /// Exit code of the last finished run.
    pub fn returncode(&self) -> Option<i32> {
        self.state().returncode
    }

    pub fn side_processes(&self) -> Vec<Arc<dyn Process>> {
        self.state().side.clone()
    }

    pub fn service_process(&self) -> Option<Arc<dyn Process>> {
        self.state().service.clone()
    }

    pub(crate) fn state(&self) -> MutexGuard<'_, ProcessState> {
        // kill() must keep working after a panic elsewhere.
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn options(&self) -> CommandOptions<'_> {
        CommandOptions {
            backend: self.backend,
            name: self.name.as_deref(),
            image: self.image.as_deref(),
            bindings: &self.bindings,
            host_network: self.host_network,
            skip_http_server: self.skip_http_server,
        }
    }

    /// Full command line for `args`, probing the host now.
    pub fn cmd(&self, args: &[String]) -> Result<Vec<String>, RuntimeError> {
        self.cmd_with_probe(args, &HostProbe::detect())
    }

    pub fn cmd_with_probe(
        &self,
        args: &[String],
        probe: &HostProbe,
    ) -> Result<Vec<String>, RuntimeError> {
        build_command(&self.options(), probe, args)
    }

    /// Start the primary process. The returned scope waits for it when
    /// dropped or when [`RunScope::wait`] is called.
    ///
    /// Nothing is spawned when a mount destination is duplicated; spawn
    /// failures are returned as [`RuntimeError::Spawn`] with the original
    /// io error.
    pub fn run(&self, args: &[String]) -> Result<RunScope<'_>, RuntimeError> {
        self.run_with_probe(args, &HostProbe::detect())
    }

    pub fn run_with_probe(
        &self,
        args: &[String],
        probe: &HostProbe,
    ) -> Result<RunScope<'_>, RuntimeError> {
        self.bindings.validate()?;
        let argv = self.cmd_with_probe(args, probe)?;
        let spec = LaunchSpec::foreground(&argv)?;

        info!("running with {} runtime: {}", self.backend, argv.join(" "));
        let process = self.launcher.launch(&spec)?;
        debug!("primary process started (pid {})", process.id());

        let mut state = self.state();
        state.primary = Some(Arc::clone(&process));
        state.returncode = None;
        drop(state);

        Ok(RunScope {
            runtime: self,
            process,
            released: false,
        })
    }

    /// Ask the backend to stop the job. Never fails; problems are logged.
    ///
    /// The null backend sends SIGTERM to the primary process. Engine
    /// backends launch a detached `<engine> stop --time 60 <name>`, which is
    /// recorded as a side process and reaped by `post_run`. Without an
    /// instance name the engine assigned a random one that `stop` cannot
    /// address, so nothing is launched.
    pub fn kill(&self) {
        let Some(engine) = self.backend.engine() else {
            let primary = self.state().primary.clone();
            if let Some(process) = primary {
                debug!("sending SIGTERM to pid {}", process.id());
                if let Err(e) = process.signal(SIGTERM) {
                    debug!("unable to signal pid {}: {e}", process.id());
                }
            }
            return;
        };

        let Some(name) = self.name.as_deref() else {
            debug!("no {engine} container name set, nothing to stop");
            return;
        };
        let timeout = STOP_TIMEOUT_SECS.to_string();
        let spec = LaunchSpec::detached(engine, ["stop", "--time", timeout.as_str(), name]);
        match self.launcher.launch(&spec) {
            Ok(process) => {
                info!("stopping {engine} container {name}");
                self.state().side.push(process);
            }
            Err(e) => warn!("unable to run {engine} stop for {name}: {e}"),
        }
    }
}

/// The span during which the primary process is live.
///
/// Dropping the scope waits for the process and records its exit code, so
/// the wait also happens when the scope body returns early or panics.
pub struct RunScope<'a> {
    runtime: &'a Runtime,
    process: Arc<dyn Process>,
    released: bool,
}

impl RunScope<'_> {
    pub fn process(&self) -> &Arc<dyn Process> {
        &self.process
    }

    pub fn pid(&self) -> u32 {
        self.process.id()
    }

    /// Always `None` while the scope is open.
    pub fn returncode(&self) -> Option<i32> {
        self.runtime.returncode()
    }

    /// Close the scope, returning the exit code.
    pub fn wait(mut self) -> Result<i32, RuntimeError> {
        Ok(self.release()?)
    }

    fn release(&mut self) -> std::io::Result<i32> {
        self.released = true;
        let result = self.process.wait();

        let mut state = self.runtime.state();
        state.primary = None;
        match &result {
            Ok(code) => {
                debug!("primary process {} exited with {code}", self.process.id());
                state.returncode = Some(*code);
            }
            Err(e) => warn!("failed to wait for pid {}: {e}", self.process.id()),
        }
        result
    }
}

impl Drop for RunScope<'_> {
    fn drop(&mut self) {
        if !self.released {
            let _ = self.release();
        }
    }
}
