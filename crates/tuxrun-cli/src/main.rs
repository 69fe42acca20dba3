mod job;

use clap::Parser;
use std::path::PathBuf;
use std::process::ExitCode;
use tuxrun_runtime::config::BindingConfig;

pub const EXIT_FAILURE: u8 = 1;
pub const EXIT_CONFIG_ERROR: u8 = 2;

#[derive(Debug, Parser)]
#[command(
    name = "tuxrun-exec",
    version,
    about = "Run one command through a null, docker or podman runtime"
)]
pub struct Cli {
    /// TOML runtime description; flags below override its values.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Backend to use: null, docker or podman.
    #[arg(long)]
    runtime: Option<String>,

    /// Container image reference.
    #[arg(long)]
    image: Option<String>,

    /// Container instance name.
    #[arg(long)]
    name: Option<String>,

    /// Bind mount as SOURCE[:DESTINATION[:ro|rw]], may be repeated.
    #[arg(long = "bind", value_parser = parse_bind)]
    bindings: Vec<BindingConfig>,

    /// Share the host network namespace with the container.
    #[arg(long, default_value_t = false)]
    host_network: bool,

    /// Start the launcher directly instead of the image entrypoint.
    #[arg(long, default_value_t = false)]
    skip_http_server: bool,

    /// Working directory for runtime state (engine sockets). A temporary
    /// directory is used when omitted.
    #[arg(long)]
    dir: Option<PathBuf>,

    /// Print the command line that would be run, including the engine
    /// socket binding, and exit without starting anything.
    #[arg(long, default_value_t = false)]
    print_command: bool,

    /// Output results as structured JSON.
    #[arg(long, default_value_t = false)]
    json: bool,

    /// Enable verbose (debug) logging output.
    #[arg(short, long, default_value_t = false)]
    verbose: bool,

    /// Enable trace-level logging (more detailed than --verbose).
    #[arg(long, default_value_t = false)]
    trace: bool,

    /// Command to run in the guest (after --).
    #[arg(last = true)]
    command: Vec<String>,
}

fn parse_bind(value: &str) -> Result<BindingConfig, String> {
    let mut parts = value.splitn(3, ':');
    let source = parts
        .next()
        .filter(|s| !s.is_empty())
        .ok_or_else(|| format!("empty bind source in '{value}'"))?;
    let destination = parts.next().filter(|d| !d.is_empty()).map(PathBuf::from);
    let writable = match parts.next() {
        None | Some("rw") => true,
        Some("ro") => false,
        Some(other) => return Err(format!("invalid bind mode '{other}' (expected ro or rw)")),
    };
    Ok(BindingConfig {
        source: PathBuf::from(source),
        destination,
        writable,
    })
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let default_level = if cli.trace {
        "trace"
    } else if cli.verbose {
        "debug"
    } else {
        "warn"
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_env("TUXRUN_LOG")
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level)),
        )
        .with_writer(std::io::stderr)
        .with_target(false)
        .without_time()
        .init();

    match job::execute(&cli) {
        Ok(code) => ExitCode::from(code),
        Err(msg) => {
            eprintln!("error: {msg}");
            let code = if msg.starts_with("unknown runtime")
                || msg.starts_with("invalid runtime configuration")
            {
                EXIT_CONFIG_ERROR
            } else {
                EXIT_FAILURE
            };
            ExitCode::from(code)
        }
    }
}
