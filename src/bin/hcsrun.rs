//! hcsrun - single container runner
//!
//! Runs one container on top of a base layer, waits for its process and
//! releases everything it acquired.
//!
//! ## Usage
//!
//! ```sh
//! hcsrun <base-layer-id>
//! ```
//!
//! Layers are read from `driver.home_dir` of the configuration. Compute and
//! network calls go to the in-process simulated host configured by the
//! `simulation` section.
//!
//! ## Exit Status
//!
//! - `0`: the process exited with code 0
//! - `1..=255`: the process exit code (clamped)
//! - `1`: the run failed before the process exited
//! - `2`: usage error

use hcsrun::{DirectoryDriver, Error, OrchestratorConfig, SimulatedHost, short_id};
use std::process::ExitCode;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

// =============================================================================
// CLI Parsing
// =============================================================================

#[derive(Debug)]
enum Command {
    Run { base_layer: String },
    Version,
    Help,
}

fn parse_args(args: &[String]) -> Result<Command, Error> {
    let mut positional = Vec::new();
    for arg in args {
        match arg.as_str() {
            "-h" | "--help" => return Ok(Command::Help),
            "-V" | "--version" => return Ok(Command::Version),
            flag if flag.starts_with('-') && flag.len() > 1 => {
                return Err(Error::Usage(format!("unknown option '{flag}'")));
            }
            value => positional.push(value.to_string()),
        }
    }

    match positional.len() {
        1 => Ok(Command::Run {
            base_layer: positional.remove(0),
        }),
        0 => Err(Error::Usage("missing <base-layer-id>".to_string())),
        n => Err(Error::Usage(format!("expected 1 argument, got {n}"))),
    }
}

fn cmd_version() {
    println!("hcsrun version {}", env!("CARGO_PKG_VERSION"));
}

fn cmd_help() {
    println!(
        r#"hcsrun - run a container on a base layer

USAGE:
    hcsrun <base-layer-id>

OPTIONS:
    -h, --help       Show this help
    -V, --version    Show version info

ENVIRONMENT:
    HCSRUN_CONFIG    Configuration file (JSON)
    HCSRUN_HOME      Layer storage home directory
    HCSRUN_NETWORK   Virtual network name
    HCSRUN_COMMAND   Command line run in the container
    RUST_LOG         Log filter (default: info)
"#
    );
}

// =============================================================================
// Run
// =============================================================================

/// Maps a process exit code onto the CLI exit status.
fn exit_status(code: i32) -> u8 {
    if code == 0 {
        0
    } else {
        u8::try_from(code.clamp(1, 255)).unwrap_or(1)
    }
}

async fn cmd_run(base_layer: String) -> Result<i32, Error> {
    let config = OrchestratorConfig::from_env()?;
    config.validate()?;

    let storage = Arc::new(DirectoryDriver::new(config.driver.clone())?);
    let host = SimulatedHost::from_config(&config);
    let orchestrator = host.orchestrator_with_storage(config, storage)?;

    let report = orchestrator.run(&base_layer).await;
    let id = report.container_id.clone();
    if !report.teardown.is_clean() {
        eprintln!(
            "Container {} cleaned up with {} warning(s)",
            short_id(&id),
            report.teardown.len()
        );
    }

    let code = report.into_result()?;
    eprintln!("Container {} exited with code {}", short_id(&id), code);
    Ok(code)
}

// =============================================================================
// Main
// =============================================================================

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args: Vec<String> = std::env::args().skip(1).collect();
    match parse_args(&args) {
        Ok(Command::Help) => {
            cmd_help();
            ExitCode::SUCCESS
        }
        Ok(Command::Version) => {
            cmd_version();
            ExitCode::SUCCESS
        }
        Ok(Command::Run { base_layer }) => match cmd_run(base_layer).await {
            Ok(code) => ExitCode::from(exit_status(code)),
            Err(e) => {
                eprintln!("error: {}", e);
                ExitCode::FAILURE
            }
        },
        Err(e) => {
            eprintln!("error: {}", e);
            cmd_help();
            ExitCode::from(2)
        }
    }
}
