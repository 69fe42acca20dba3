//! Engine-specific work around the primary process: exposing the engine
//! control socket to the guest before `run`, and reaping helpers after it.

use crate::backend::Backend;
use crate::binding::Binding;
use crate::process::LaunchSpec;
use crate::runtime::Runtime;
use crate::RuntimeError;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info, warn};

pub const DOCKER_SOCKET: &str = "/var/run/docker.sock";
pub const PODMAN_SOCKET_NAME: &str = "podman.sock";
pub const PODMAN_GUEST_SOCKET: &str = "/run/podman/podman.sock";

pub const SOCKET_WAIT_RETRIES: usize = 60;
pub const SOCKET_WAIT_INTERVAL: Duration = Duration::from_secs(1);

impl Runtime {
    /// Binding `pre_run` adds so the guest can reach the host engine's
    /// control socket. `directory` is where the podman API socket lives,
    /// defaulting to the runtime directory.
    pub fn socket_binding(&self, directory: Option<&Path>) -> Option<Binding> {
        match self.backend() {
            Backend::Null => None,
            Backend::Docker => Some(Binding::new(DOCKER_SOCKET).implicit()),
            Backend::Podman => {
                let directory = directory.unwrap_or_else(|| self.directory());
                Some(
                    Binding::new(directory.join(PODMAN_SOCKET_NAME))
                        .to(PODMAN_GUEST_SOCKET)
                        .implicit(),
                )
            }
        }
    }

    /// Prepare backend side effects needed by nested engine use in the guest.
    ///
    /// `directory` hosts the podman API socket; when absent the runtime
    /// directory is used. Null and docker ignore it.
    pub fn pre_run(&mut self, directory: Option<&Path>) -> Result<(), RuntimeError> {
        let Some(binding) = self.socket_binding(directory) else {
            return Ok(());
        };
        if self.backend() == Backend::Podman {
            self.start_podman_service(&binding.source)?;
        }
        self.bind(binding);
        Ok(())
    }

    fn start_podman_service(&self, socket: &Path) -> Result<(), RuntimeError> {
        let address = format!("unix://{}", socket.display());
        let spec = LaunchSpec::detached(
            "podman",
            ["system", "service", "--time", "0", address.as_str()],
        );

        let service = self.launcher.launch(&spec)?;
        debug!("podman service started (pid {})", service.id());
        // Recorded before waiting so post_run can reap it on failure too.
        self.state().service = Some(service);

        wait_for_socket(self, socket)?;
        info!("podman socket ready at {}", socket.display());
        Ok(())
    }

    /// Undo `pre_run` and reap the `stop` helpers started by `kill`. Safe to
    /// call at any time and more than once.
    pub fn post_run(&self) {
        if self.backend() == Backend::Podman {
            self.stop_podman_service();
        }
        for process in self.side_processes() {
            // Waiting again on a reaped helper returns its cached status.
            match process.wait() {
                Ok(code) => debug!("side process {} exited with {code}", process.id()),
                Err(e) => warn!("failed to reap side process {}: {e}", process.id()),
            }
        }
    }

    fn stop_podman_service(&self) {
        let Some(service) = self.state().service.take() else {
            return;
        };
        debug!("terminating podman service (pid {})", service.id());
        if let Err(e) = service.kill() {
            warn!("failed to kill podman service (pid {}): {e}", service.id());
        }
        if let Err(e) = service.wait() {
            warn!("failed to reap podman service (pid {}): {e}", service.id());
        }
    }
}

fn wait_for_socket(runtime: &Runtime, socket: &Path) -> Result<(), RuntimeError> {
    for attempt in 0..SOCKET_WAIT_RETRIES {
        if socket.exists() {
            return Ok(());
        }
        debug!(
            "waiting for {} ({}/{SOCKET_WAIT_RETRIES})",
            socket.display(),
            attempt + 1
        );
        runtime.sleeper.sleep(SOCKET_WAIT_INTERVAL);
    }
    Err(RuntimeError::SocketTimeout {
        engine: "podman".to_owned(),
        path: PathBuf::from(socket),
    })
}
