//! vtgrab - take over a Linux virtual terminal for a compositor
//!
//! vtgrab allocates a free VT, switches to it and prepares it for direct
//! rendering: raw line discipline, kernel keyboard translation off, graphics
//! console mode and process-managed VT switching. After holding the VT for a
//! while it restores everything and switches back.
//!
//! # Quick Start
//!
//! ```text
//! vtgrab                 # Hold a fresh VT for 2 seconds
//! vtgrab -t 10           # Hold it for 10 seconds
//! vtgrab -s SIGUSR2      # Ask for SIGUSR2 on VT switch requests
//! ```

mod config;
#[cfg(target_os = "linux")]
mod core;

use std::env;
use std::path::PathBuf;
use std::sync::Mutex;

use anyhow::Context;
use tracing::info;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use crate::config::Config;

/// Command line arguments
#[derive(Debug, Default, PartialEq)]
struct CliArgs {
    /// Explicit config file
    config_path: Option<PathBuf>,
    /// Hold time override
    hold_secs: Option<u64>,
    /// Switch signal override
    signal: Option<String>,
}

/// What the command line asked for
#[derive(Debug, PartialEq)]
enum Command {
    Run(CliArgs),
    Help,
    Version,
}

/// Version string from Cargo.toml
const VERSION: &str = env!("CARGO_PKG_VERSION");

fn print_version() {
    eprintln!("vtgrab {}", VERSION);
}

fn print_help() {
    eprintln!("vtgrab {} - take over a Linux virtual terminal", VERSION);
    eprintln!();
    eprintln!("Usage: vtgrab [OPTIONS]");
    eprintln!();
    eprintln!("Options:");
    eprintln!("  -c, --config <PATH>   Config file (default: ~/.vtgrab/config.toml)");
    eprintln!("  -t, --hold <SECS>     Seconds to hold the terminal (default: 2)");
    eprintln!("  -s, --signal <NAME>   VT switch signal (default: SIGUSR1)");
    eprintln!("  -v, --version         Show version");
    eprintln!("  -h, --help            Show this help");
    eprintln!();
    eprintln!("Logging: RUST_LOG overrides the configured log_level");
}

fn parse_args<I>(args: I) -> Result<Command, String>
where
    I: IntoIterator<Item = String>,
{
    let mut cli = CliArgs::default();
    let mut args = args.into_iter();

    while let Some(arg) = args.next() {
        match arg.as_str() {
            "-h" | "--help" => return Ok(Command::Help),
            "-v" | "--version" => return Ok(Command::Version),
            "-c" | "--config" => {
                let path = args.next().ok_or("Missing config path")?;
                cli.config_path = Some(PathBuf::from(path));
            }
            "-t" | "--hold" => {
                let secs = args.next().ok_or("Missing hold time")?;
                let secs = secs
                    .parse()
                    .map_err(|_| format!("Invalid hold time: {}", secs))?;
                cli.hold_secs = Some(secs);
            }
            "-s" | "--signal" => {
                let name = args.next().ok_or("Missing signal name")?;
                cli.signal = Some(name);
            }
            other => return Err(format!("Unknown option: {}", other)),
        }
    }

    Ok(Command::Run(cli))
}

/// Route tracing output to the configured log file, or stderr
fn init_logging(config: &Config) -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.log_level));

    match &config.log_file {
        Some(path) => {
            if let Some(parent) = path.parent() {
                let _ = std::fs::create_dir_all(parent);
            }
            let file = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("Failed to open log file {}", path.display()))?;
            let subscriber = FmtSubscriber::builder()
                .with_env_filter(filter)
                .with_writer(Mutex::new(file))
                .with_ansi(false)
                .finish();
            let _ = tracing::subscriber::set_global_default(subscriber);
        }
        None => {
            let subscriber = FmtSubscriber::builder()
                .with_env_filter(filter)
                .with_writer(std::io::stderr)
                .finish();
            let _ = tracing::subscriber::set_global_default(subscriber);
        }
    }

    Ok(())
}

fn main() -> anyhow::Result<()> {
    let cli = match parse_args(env::args().skip(1)) {
        Ok(Command::Run(cli)) => cli,
        Ok(Command::Help) => {
            print_help();
            return Ok(());
        }
        Ok(Command::Version) => {
            print_version();
            return Ok(());
        }
        Err(e) => {
            eprintln!("Error: {}", e);
            eprintln!("Use --help for usage information");
            std::process::exit(1);
        }
    };

    let mut config = match &cli.config_path {
        Some(path) => Config::load_from(path)?,
        None => Config::load(),
    };

    // Command line overrides the config file
    if let Some(secs) = cli.hold_secs {
        config.hold_secs = secs;
    }
    if let Some(signal) = cli.signal {
        config.signal = signal;
    }

    init_logging(&config)?;
    info!("vtgrab {} starting...", VERSION);

    run(&config)
}

/// Acquire a VT, hold it, then hand it back
#[cfg(target_os = "linux")]
fn run(config: &Config) -> anyhow::Result<()> {
    use std::time::Duration;

    use tracing::{debug, error, warn};

    use crate::core::linux::LinuxConsole;
    use crate::core::tty::{SessionOptions, TerminalSession};

    let options = SessionOptions {
        switch_signal: parse_signal(&config.signal)?,
        keyboard_fallback: config.keyboard_fallback,
    };

    let session = match TerminalSession::acquire(&LinuxConsole::new(), &options) {
        Ok(session) => session,
        Err(e) => {
            error!("Failed to acquire vt: {}", e);
            return Err(e).context("Failed to acquire a virtual terminal");
        }
    };

    info!(
        "Holding vt {} (started on vt {}) for {}s",
        session.vt(),
        session.starting_vt(),
        config.hold_secs
    );
    debug!("Completed stages: {:?}", session.stages());
    std::thread::sleep(Duration::from_secs(config.hold_secs));

    let report = session.release();
    if !report.is_clean() {
        warn!(
            "{} restoration step(s) failed, terminal may need a reset",
            report.failures().len()
        );
    }

    Ok(())
}

#[cfg(not(target_os = "linux"))]
fn run(_config: &Config) -> anyhow::Result<()> {
    anyhow::bail!("vtgrab only supports Linux virtual terminals")
}

/// Accept both "SIGUSR1" and "USR1"
#[cfg(target_os = "linux")]
fn parse_signal(name: &str) -> anyhow::Result<nix::sys::signal::Signal> {
    use std::str::FromStr;

    let upper = name.trim().to_uppercase();
    let full = if upper.starts_with("SIG") {
        upper
    } else {
        format!("SIG{}", upper)
    };
    nix::sys::signal::Signal::from_str(&full)
        .with_context(|| format!("Unknown signal: {}", name))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_no_args() {
        assert_eq!(parse_args(args(&[])), Ok(Command::Run(CliArgs::default())));
    }

    #[test]
    fn test_options() {
        let parsed = parse_args(args(&["-t", "5", "--signal", "USR2", "-c", "/etc/vtgrab.toml"]));
        assert_eq!(
            parsed,
            Ok(Command::Run(CliArgs {
                config_path: Some(PathBuf::from("/etc/vtgrab.toml")),
                hold_secs: Some(5),
                signal: Some("USR2".to_string()),
            }))
        );
    }

    #[test]
    fn test_help_and_version() {
        assert_eq!(parse_args(args(&["--help"])), Ok(Command::Help));
        assert_eq!(parse_args(args(&["-t", "1", "-v"])), Ok(Command::Version));
    }

    #[test]
    fn test_bad_args() {
        assert!(parse_args(args(&["--hold"])).is_err());
        assert!(parse_args(args(&["--hold", "soon"])).is_err());
        assert!(parse_args(args(&["--bogus"])).is_err());
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn test_parse_signal() {
        use nix::sys::signal::Signal;

        assert_eq!(parse_signal("SIGUSR1").unwrap(), Signal::SIGUSR1);
        assert_eq!(parse_signal("usr2").unwrap(), Signal::SIGUSR2);
        assert!(parse_signal("SIGNOPE").is_err());
    }
}
