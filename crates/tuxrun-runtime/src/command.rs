use crate::backend::Backend;
use crate::binding::{Binding, BindingSet, DestinationSet};
use crate::host::{HostProbe, GUESTFS_GUEST_CACHE, KVM_DEVICE};
use crate::RuntimeError;

pub const HOSTNAME: &str = "tuxrun";
/// Launcher installed in the job images, used as entrypoint override.
pub const LAUNCHER: &str = "/usr/bin/lava-run";
pub const LAUNCHER_NAME: &str = "lava-run";

/// Read-only host kernel trees every container gets.
const KERNEL_MOUNTS: [&str; 2] = ["/boot", "/lib/modules"];

/// Snapshot of the runtime configuration consumed by [`build_command`].
#[derive(Debug, Clone, Copy)]
pub struct CommandOptions<'a> {
    pub backend: Backend,
    pub name: Option<&'a str>,
    pub image: Option<&'a str>,
    pub bindings: &'a BindingSet,
    pub host_network: bool,
    pub skip_http_server: bool,
}

/// Build the full argument vector (program first) for `args`.
///
/// The null backend returns `args` untouched. Container backends produce,
/// in this exact order: `<engine> run`, fixed flags, host probe flags,
/// configured bindings, `--name`, `--network host`, `--entrypoint`, the
/// image and finally the forwarded arguments.
pub fn build_command(
    opts: &CommandOptions<'_>,
    probe: &HostProbe,
    args: &[String],
) -> Result<Vec<String>, RuntimeError> {
    let Some(engine) = opts.backend.engine() else {
        return Ok(args.to_vec());
    };

    let mut destinations = DestinationSet::default();
    let mut cmd: Vec<String> = vec![
        engine.to_owned(),
        "run".to_owned(),
        "--log-driver=none".to_owned(),
        "--rm".to_owned(),
        "--hostname".to_owned(),
        HOSTNAME.to_owned(),
    ];

    for path in KERNEL_MOUNTS {
        push_volume(
            &mut cmd,
            &mut destinations,
            &Binding::new(path).read_only().implicit(),
        )?;
    }

    if probe.kvm {
        cmd.push("--device".to_owned());
        cmd.push(format!("{KVM_DEVICE}:{KVM_DEVICE}:rw"));
    }
    if let Some(cache) = &probe.guestfs_cache {
        push_volume(
            &mut cmd,
            &mut destinations,
            &Binding::new(cache).to(GUESTFS_GUEST_CACHE).implicit(),
        )?;
    }

    for binding in opts.bindings {
        push_volume(&mut cmd, &mut destinations, binding)?;
    }

    if let Some(name) = opts.name {
        cmd.push("--name".to_owned());
        cmd.push(name.to_owned());
    }
    if opts.host_network {
        cmd.push("--network".to_owned());
        cmd.push("host".to_owned());
    }
    if opts.skip_http_server {
        cmd.push("--entrypoint".to_owned());
        cmd.push(LAUNCHER.to_owned());
    }

    let image = opts
        .image
        .ok_or_else(|| RuntimeError::Config(format!("no image set for the {engine} runtime")))?;
    cmd.push(image.to_owned());

    // The entrypoint already is the launcher: do not pass its name twice.
    let forwarded = match args.split_first() {
        Some((first, rest)) if opts.skip_http_server && first == LAUNCHER_NAME => rest,
        _ => args,
    };
    cmd.extend(forwarded.iter().cloned());

    Ok(cmd)
}

fn push_volume(
    cmd: &mut Vec<String>,
    destinations: &mut DestinationSet,
    binding: &Binding,
) -> Result<(), RuntimeError> {
    destinations.claim(&binding.destination)?;
    cmd.push("-v".to_owned());
    cmd.push(binding.volume_spec());
    Ok(())
}
