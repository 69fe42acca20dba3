use crate::Cli;
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, warn};
use tuxrun_runtime::{RunScope, Runtime, RuntimeConfig};

#[derive(Debug, Serialize)]
struct JobReport<'a> {
    runtime: &'a str,
    name: Option<&'a str>,
    image: Option<&'a str>,
    returncode: i32,
}

fn json_pretty(value: &impl Serialize) -> Result<String, String> {
    serde_json::to_string_pretty(value).map_err(|e| format!("JSON serialization failed: {e}"))
}

fn load_config(cli: &Cli) -> Result<RuntimeConfig, String> {
    let mut config = match &cli.config {
        Some(path) => RuntimeConfig::load(path).map_err(|e| e.to_string())?,
        None => RuntimeConfig::default(),
    };
    if let Some(runtime) = &cli.runtime {
        config.runtime.clone_from(runtime);
    }
    if cli.image.is_some() {
        config.image.clone_from(&cli.image);
    }
    if cli.name.is_some() {
        config.name.clone_from(&cli.name);
    }
    config.host_network |= cli.host_network;
    config.skip_http_server |= cli.skip_http_server;
    config.bindings.extend(cli.bindings.iter().cloned());
    Ok(config)
}

/// Map a child return code onto a process exit status; signals follow the
/// shell convention of 128 + signal.
fn exit_status(code: i32) -> u8 {
    let code = if code < 0 { 128 - code } else { code };
    u8::try_from(code).unwrap_or(crate::EXIT_FAILURE)
}

pub fn execute(cli: &Cli) -> Result<u8, String> {
    let config = load_config(cli)?;

    let scratch;
    let dir: PathBuf = if let Some(dir) = &cli.dir {
        std::fs::create_dir_all(dir)
            .map_err(|e| format!("failed to create {}: {e}", dir.display()))?;
        dir.clone()
    } else {
        scratch = tempfile::Builder::new()
            .prefix("tuxrun-")
            .tempdir()
            .map_err(|e| format!("failed to create temp dir: {e}"))?;
        scratch.path().to_path_buf()
    };

    let mut runtime = config.build_runtime(&dir).map_err(|e| e.to_string())?;

    if cli.print_command {
        if let Some(binding) = runtime.socket_binding(Some(&dir)) {
            runtime.bind(binding);
        }
        let argv = runtime.cmd(&cli.command).map_err(|e| e.to_string())?;
        if cli.json {
            println!("{}", json_pretty(&argv)?);
        } else {
            println!("{}", argv.join(" "));
        }
        return Ok(0);
    }

    if let Err(e) = runtime.pre_run(Some(&dir)) {
        runtime.post_run();
        return Err(e.to_string());
    }
    let runtime = Arc::new(runtime);
    let code = run_job(&runtime, &cli.command)?;

    if cli.json {
        let report = JobReport {
            runtime: runtime.backend().as_str(),
            name: runtime.instance_name(),
            image: runtime.image_ref(),
            returncode: code,
        };
        println!("{}", json_pretty(&report)?);
    }
    Ok(exit_status(code))
}

fn run_job(runtime: &Arc<Runtime>, command: &[String]) -> Result<i32, String> {
    let handler_runtime = Arc::clone(runtime);
    if let Err(e) = ctrlc::set_handler(move || {
        eprintln!("\ninterrupted, stopping job...");
        handler_runtime.kill();
    }) {
        warn!("unable to install Ctrl-C handler: {e}");
    }

    let result = runtime.run(command).and_then(RunScope::wait);
    runtime.post_run();
    debug!("job finished: {result:?}");
    result.map_err(|e| e.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[test]
    fn exit_status_mapping() {
        assert_eq!(exit_status(0), 0);
        assert_eq!(exit_status(3), 3);
        assert_eq!(exit_status(-15), 143);
        assert_eq!(exit_status(1000), crate::EXIT_FAILURE);
    }

    #[test]
    fn flags_override_config_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("runtime.toml");
        std::fs::write(
            &path,
            "runtime = \"docker\"\nimage = \"old\"\n\n[[bindings]]\nsource = \"/a\"\n",
        )
        .unwrap();
        let cli = Cli::try_parse_from([
            "tuxrun-exec",
            "--config",
            path.to_str().unwrap(),
            "--image",
            "new",
            "--bind",
            "/b",
            "--host-network",
        ])
        .unwrap();

        let config = load_config(&cli).unwrap();
        assert_eq!(config.runtime, "docker");
        assert_eq!(config.image.as_deref(), Some("new"));
        assert!(config.host_network);
        assert!(!config.skip_http_server);
        assert_eq!(config.bindings.len(), 2);
    }
}
