use crate::backend::{select, Backend};
use crate::binding::Binding;
use crate::runtime::Runtime;
use crate::RuntimeError;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Runtime description as written in a TOML file.
///
/// ```toml
/// runtime = "podman"
/// image = "docker.io/lavasoftware/lava-dispatcher:latest"
/// name = "tuxrun-job-42"
/// host_network = true
///
/// [[bindings]]
/// source = "/srv/artefacts"
/// destination = "/artefacts"
/// writable = false
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct RuntimeConfig {
    #[serde(default = "default_runtime")]
    pub runtime: String,
    #[serde(default)]
    pub image: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub host_network: bool,
    #[serde(default)]
    pub skip_http_server: bool,
    #[serde(default)]
    pub bindings: Vec<BindingConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct BindingConfig {
    pub source: PathBuf,
    #[serde(default)]
    pub destination: Option<PathBuf>,
    #[serde(default = "default_writable")]
    pub writable: bool,
}

fn default_runtime() -> String {
    Backend::Podman.as_str().to_owned()
}

fn default_writable() -> bool {
    true
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            runtime: default_runtime(),
            image: None,
            name: None,
            host_network: false,
            skip_http_server: false,
            bindings: Vec::new(),
        }
    }
}

impl From<&BindingConfig> for Binding {
    fn from(cfg: &BindingConfig) -> Self {
        let mut binding = Binding::new(&cfg.source);
        if let Some(dest) = &cfg.destination {
            binding = binding.to(dest);
        }
        binding.writable = cfg.writable;
        binding
    }
}

impl RuntimeConfig {
    pub fn load(path: &Path) -> Result<Self, RuntimeError> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            RuntimeError::Config(format!("failed to read {}: {e}", path.display()))
        })?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> Result<Self, RuntimeError> {
        toml::from_str(content).map_err(|e| RuntimeError::Config(format!("invalid TOML: {e}")))
    }

    pub fn to_toml_string(&self) -> Result<String, RuntimeError> {
        toml::to_string_pretty(self)
            .map_err(|e| RuntimeError::Config(format!("failed to serialize config: {e}")))
    }

    pub fn backend(&self) -> Result<Backend, RuntimeError> {
        select(&self.runtime)
    }

    /// Select the backend and apply every setting to a fresh runtime.
    pub fn build_runtime(&self, directory: impl Into<PathBuf>) -> Result<Runtime, RuntimeError> {
        let mut runtime = self.backend()?.runtime(directory);
        self.apply(&mut runtime);
        Ok(runtime)
    }

    pub fn apply(&self, runtime: &mut Runtime) {
        if let Some(name) = &self.name {
            runtime.name(name.as_str());
        }
        if let Some(image) = &self.image {
            runtime.image(image.as_str());
        }
        if self.host_network {
            runtime.use_host_network();
        }
        if self.skip_http_server {
            runtime.skip_http_server();
        }
        for binding in &self.bindings {
            runtime.bind(Binding::from(binding));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_config_defaults_to_podman() {
        let cfg = RuntimeConfig::from_toml_str("").unwrap();
        assert_eq!(cfg, RuntimeConfig::default());
        assert_eq!(cfg.backend().unwrap(), Backend::Podman);
    }

    #[test]
    fn full_config_applies_to_runtime() {
        let cfg = RuntimeConfig::from_toml_str(
            r#"
runtime = "docker"
image = "image"
name = "job"
host_network = true
skip_http_server = true

[[bindings]]
source = "/srv/a"

[[bindings]]
source = "/srv/b"
destination = "/b"
writable = false
"#,
        )
        .unwrap();

        let dir = tempfile::tempdir().unwrap();
        let runtime = cfg.build_runtime(dir.path()).unwrap();
        assert_eq!(runtime.backend(), Backend::Docker);
        assert_eq!(runtime.instance_name(), Some("job"));
        assert_eq!(runtime.image_ref(), Some("image"));
        assert!(runtime.host_network());
        assert!(runtime.http_server_skipped());

        let specs: Vec<_> = runtime.bindings().iter().map(Binding::volume_spec).collect();
        assert_eq!(specs, vec!["/srv/a:/srv/a:rw", "/srv/b:/b:ro"]);
    }

    #[test]
    fn unknown_runtime_is_rejected() {
        let cfg = RuntimeConfig::from_toml_str(r#"runtime = "lxc""#).unwrap();
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            cfg.build_runtime(dir.path()),
            Err(RuntimeError::UnknownRuntime(_))
        ));
    }

    #[test]
    fn unknown_field_is_a_config_error() {
        let err = RuntimeConfig::from_toml_str("imgae = \"typo\"").unwrap_err();
        assert!(matches!(err, RuntimeError::Config(_)));
    }

    #[test]
    fn load_missing_file_fails() {
        let dir = tempfile::tempdir().unwrap();
        let err = RuntimeConfig::load(&dir.path().join("absent.toml")).unwrap_err();
        assert!(err.to_string().contains("absent.toml"));
    }

    #[test]
    fn config_roundtrip_through_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("runtime.toml");
        let cfg = RuntimeConfig {
            runtime: "null".to_owned(),
            name: Some("job".to_owned()),
            bindings: vec![BindingConfig {
                source: PathBuf::from("/data"),
                destination: None,
                writable: true,
            }],
            ..RuntimeConfig::default()
        };
        std::fs::write(&path, cfg.to_toml_string().unwrap()).unwrap();
        assert_eq!(RuntimeConfig::load(&path).unwrap(), cfg);
    }
}
