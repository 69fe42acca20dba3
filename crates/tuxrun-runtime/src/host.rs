use std::path::{Path, PathBuf};

pub const KVM_DEVICE: &str = "/dev/kvm";
/// Where the guest-filesystem appliance cache of root lives inside the guest.
pub const GUESTFS_GUEST_CACHE: &str = "/var/tmp/.guestfs-0";

/// Host capabilities sampled when a command is built.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HostProbe {
    pub kvm: bool,
    /// Host appliance cache directory of the current user, when present.
    pub guestfs_cache: Option<PathBuf>,
}

impl HostProbe {
    pub fn detect() -> Self {
        let cache = guestfs_cache_dir(current_uid());
        Self {
            kvm: Path::new(KVM_DEVICE).exists(),
            guestfs_cache: cache.exists().then_some(cache),
        }
    }

    /// A host with neither KVM nor an appliance cache.
    pub fn bare() -> Self {
        Self::default()
    }
}

pub fn guestfs_cache_dir(uid: u32) -> PathBuf {
    PathBuf::from(format!("/var/tmp/.guestfs-{uid}"))
}

/// Safe wrapper around libc::getuid().
#[allow(unsafe_code)]
pub fn current_uid() -> u32 {
    // SAFETY: getuid() is always safe: no arguments, no side effects, cannot fail.
    unsafe { libc::getuid() }
}
