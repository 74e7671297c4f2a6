//! l2simd entry point.
//!
//! Starts the switch with its four port tasks, then reads operator commands
//! from stdin until `exit`, end of input or Ctrl-C.

use std::io::Write;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::signal;
use tracing::{error, info};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use l2sim_common::{Fabric, FabricOptions, SimConfig, DEFAULT_CONFIG_PATH};
use l2sim_switchd::{Switch, SwitchOptions};
use l2simd::{Command, Console, HELP};

/// Layer-2 switch simulator
#[derive(Parser, Debug)]
#[command(name = "l2simd")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Configuration file
    #[arg(short = 'c', long, default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    /// Log level (trace, debug, info, warn, error); RUST_LOG wins
    #[arg(short = 'l', long)]
    log_level: Option<String>,

    /// Directory for port and station log files
    #[arg(long)]
    log_dir: Option<PathBuf>,

    /// Do not write port and station log files
    #[arg(long)]
    no_port_files: bool,
}

impl Args {
    fn apply(&self, config: &mut SimConfig) {
        if let Some(level) = &self.log_level {
            config.logging.level = level.clone();
        }
        if let Some(dir) = &self.log_dir {
            config.logging.dir = dir.clone();
        }
        if self.no_port_files {
            config.logging.port_files = false;
        }
    }
}

/// Initialize tracing/logging.
fn init_logging(level: &str) -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(level))
        .with_context(|| format!("Invalid log level '{}'", level))?;

    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .with_writer(std::io::stderr)
        .finish();

    tracing::subscriber::set_global_default(subscriber)
        .context("Failed to set tracing subscriber")
}

fn prompt() {
    print!("l2sim> ");
    let _ = std::io::stdout().flush();
}

async fn run(args: Args) -> anyhow::Result<()> {
    let mut config = SimConfig::load_or_default(&args.config)
        .with_context(|| format!("Failed to load {}", args.config.display()))?;
    args.apply(&mut config);
    config.validate()?;

    init_logging(&config.logging.level)?;
    info!("--- Starting l2simd ---");

    let fabric = Fabric::bootstrap(FabricOptions::from_config(&config))
        .context("Failed to set up ports")?;
    let switch = Switch::start(Arc::clone(&fabric), SwitchOptions::from_config(&config))
        .context("Failed to start switch")?;
    let mut console = Console::new(fabric, switch);

    println!("{}", HELP);
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        prompt();
        let line = tokio::select! {
            _ = signal::ctrl_c() => {
                println!("\nTERMINATING SWITCH.....");
                console.shutdown().await;
                break;
            }
            line = lines.next_line() => line.context("Failed to read console input")?,
        };

        let Some(line) = line else {
            info!("Console input closed");
            console.shutdown().await;
            break;
        };
        if line.trim().is_empty() {
            continue;
        }

        let reply = match line.parse::<Command>() {
            Ok(command) => console.execute(command).await,
            Err(e) => Err(e),
        };
        match reply {
            Ok(reply) => {
                for text in &reply.lines {
                    println!("{}", text);
                }
                if reply.exit {
                    break;
                }
            }
            Err(e) => println!("Error: {}", e),
        }
    }

    info!("--- l2simd stopped ---");
    Ok(())
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();

    match run(args).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("l2simd failed: {:#}", e);
            eprintln!("l2simd: {:#}", e);
            ExitCode::FAILURE
        }
    }
}
