mod client;
mod config;
mod logging;
mod model;
mod orchestrator;
mod pacing;
mod response;

use crate::client::ApiClient;
use crate::config::{EffectiveConfig, Overrides};
use crate::logging::{LogConfig, Logger};
use crate::orchestrator::{Mode, Orchestrator};
use crate::pacing::{Pacer, SystemClock};
use anyhow::{Context, Result};
use clap::error::ErrorKind;
use clap::{CommandFactory, Parser};
use std::path::PathBuf;
use std::time::Instant;
use tracing::{error, info};

const READ_ME: &str = "\
PREREQUISITES
  Assign the network tag \"ap_reboot\" to every network whose access points
  should be rebooted, and create a Dashboard API key with write access.

DESCRIPTION
  Iterates through the organization's networks tagged \"ap_reboot\" and
  reboots every access point (model MR*) in them, one device at a time with
  a short pause between calls. In commit mode the \"ap_reboot\" tag is removed
  from a network once all of its access points were rebooted successfully.

MODES
  simulate  (default) only log which devices would be rebooted
  commit    issue the reboot calls and remove the tag

CONFIGURATION
  Optional YAML files: ./.ap-reboot.yaml overrides
  <config dir>/ap-reboot/config.yaml (or $AP_REBOOT_CONFIG_DIR/config.yaml).
  Keys: base_url, interval_ms, log_dir, log_level, reboot_tag, model_match,
  remove_tag.

EXAMPLE
  ap-reboot -k <api_key> -o <org_id> -m commit";

#[derive(Parser, Debug)]
#[command(
    name = "ap-reboot",
    version,
    about = "Reboot the access points of Meraki networks tagged `ap_reboot`",
    after_help = READ_ME
)]
struct Cli {
    #[arg(short = 'k', value_name = "API_KEY", help = "Dashboard API key")]
    api_key: String,

    #[arg(short = 'o', value_name = "ORG_ID", help = "Organization ID")]
    org_id: String,

    #[arg(
        short = 'm',
        value_name = "MODE",
        help = "`commit` to reboot for real; anything else simulates"
    )]
    mode: Option<String>,

    #[arg(
        long,
        value_name = "URL",
        help = "Base URL for the API (defaults to https://api.meraki.com/api/v0)"
    )]
    base_url: Option<String>,

    #[arg(
        long,
        value_name = "MS",
        help = "Minimum pause between reboot calls in milliseconds (default 200)"
    )]
    interval_ms: Option<u64>,

    #[arg(long, value_name = "DIR", help = "Directory for the run's log file")]
    log_dir: Option<PathBuf>,

    #[arg(long, short = 'q', help = "Do not print per-call results to stdout")]
    quiet: bool,
}

fn main() -> Result<()> {
    let cli = parse_args();
    let cwd = std::env::current_dir().context("reading current directory")?;
    let effective = config::resolve(
        &cwd,
        Overrides {
            base_url: cli.base_url.clone(),
            interval_ms: cli.interval_ms,
            log_dir: cli.log_dir.clone(),
        },
    )?;

    let logger = Logger::init(&LogConfig {
        dir: effective.log_dir.clone(),
        level: effective.log_level.clone(),
    })?;
    let result = logger.in_scope(|| execute(&cli, &effective, &logger));
    logger.flush().context("flushing log file")?;
    result
}

/// Usage errors print the full help and exit with status 2.
fn parse_args() -> Cli {
    match Cli::try_parse() {
        Ok(cli) => cli,
        Err(err) => match err.kind() {
            ErrorKind::DisplayHelp | ErrorKind::DisplayVersion => err.exit(),
            _ => {
                let _ = Cli::command().print_help();
                eprintln!();
                eprintln!("{err}");
                std::process::exit(2);
            }
        },
    }
}

fn execute(cli: &Cli, effective: &EffectiveConfig, logger: &Logger) -> Result<()> {
    let started = Instant::now();
    info!("Started run at {}", logger.now());
    let args: Vec<String> = std::env::args().skip(1).collect();
    info!("Input parameters: {:?}", redact_key(&args, &cli.api_key));

    let mode = Mode::from_arg(cli.mode.as_deref());
    if mode == Mode::Simulate {
        info!("simulate mode: no reboot calls will be made, pass `-m commit` to apply");
    }

    let client = ApiClient::new(&effective.base_url, &cli.api_key)?;
    let pacer = Pacer::new(SystemClock::new(), effective.interval);
    let outcome = Orchestrator::new(&client, pacer, mode, effective.selection.clone())
        .remove_tag(effective.remove_tag)
        .suppress_print(cli.quiet)
        .run(&cli.org_id);

    if let Err(err) = &outcome {
        error!("run aborted: {err:#}");
    }
    info!("Ended run at {}", logger.now());
    info!("Total run time = {:?}", started.elapsed());
    outcome.map(|_| ())
}

/// Drops every argument carrying the parsed API key, plus the flag (or
/// short-flag group such as `-qk`) right before a bare key value.
fn redact_key(args: &[String], api_key: &str) -> Vec<String> {
    let mut out: Vec<String> = Vec::with_capacity(args.len());
    for arg in args {
        if api_key.is_empty() || !arg.contains(api_key) {
            out.push(arg.clone());
            continue;
        }
        let flag_before = out.last().is_some_and(|prev| {
            prev.starts_with('-') && !prev.starts_with("--") && prev.ends_with('k')
        });
        if arg == api_key && flag_before {
            out.pop();
        }
    }
    out
}
