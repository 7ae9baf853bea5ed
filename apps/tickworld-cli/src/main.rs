mod config;

use std::path::PathBuf;

use anyhow::{Context, bail};
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;
use tickworld_kernel::clock::{DEFAULT_FIXED_STEP, DEFAULT_MAX_STEPS_PER_FRAME};
use tickworld_kernel::{GroupId, World};
use tickworld_sample::Session;

use crate::config::AppConfig;

#[derive(Parser)]
#[command(name = "tickworld-cli", about = "Headless driver for the tickworld client/server scheduler")]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print crate versions and clock constants
    Info,
    /// Print each world's execution order
    Routes {
        /// Number of client worlds
        #[arg(short, long)]
        clients: Option<usize>,
        /// YAML config file
        #[arg(long)]
        config: Option<PathBuf>,
    },
    /// Run the sample for a number of host frames
    Run {
        /// Host frames to run
        #[arg(short, long, default_value = "120")]
        frames: u64,
        /// Host frame rate; each frame advances 1/fps seconds
        #[arg(long, default_value = "60")]
        fps: f64,
        /// Number of client worlds
        #[arg(short, long)]
        clients: Option<usize>,
        /// Frame index that stalls
        #[arg(long)]
        stall_frame: Option<u64>,
        /// Length of the stall in seconds
        #[arg(long, default_value = "10")]
        stall_secs: f64,
        /// YAML config file
        #[arg(long)]
        config: Option<PathBuf>,
    },
}

fn load_config(path: Option<PathBuf>, clients: Option<usize>) -> anyhow::Result<AppConfig> {
    let mut config = match path {
        Some(path) => {
            AppConfig::load(&path).with_context(|| format!("loading {}", path.display()))?
        }
        None => AppConfig::default(),
    };
    if let Some(clients) = clients {
        config.clients = clients;
    }
    Ok(config)
}

fn launch(config: &AppConfig) -> anyhow::Result<Session> {
    let session = Session::launch(
        config.scheduler.clone(),
        config.game.clone(),
        config.clients,
        config.port,
    )
    .context("starting sample session")?;
    Ok(session)
}

fn print_group(world: &World, group: &GroupId) {
    println!("  {group}:");
    for unit in world.execution_order(group, true) {
        println!("    {unit}");
    }
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(filter))
        .init();

    match cli.command {
        Commands::Info => {
            println!("tickworld-cli v{}", env!("CARGO_PKG_VERSION"));
            println!("ecs: {}", tickworld_ecs::crate_info());
            println!("sample: {}", tickworld_sample::crate_info());
            println!(
                "clock: fixed_step={DEFAULT_FIXED_STEP:.6}s max_steps_per_frame={DEFAULT_MAX_STEPS_PER_FRAME}"
            );
        }
        Commands::Routes { clients, config } => {
            let config = load_config(config, clients)?;
            let session = launch(&config)?;
            for world in session.orchestrator().worlds() {
                println!("{}", world.name());
                for root in world.roots() {
                    print_group(world, root);
                }
                if world.has_group(&GroupId::GhostSpawn) {
                    print_group(world, &GroupId::GhostSpawn);
                }
            }
        }
        Commands::Run {
            frames,
            fps,
            clients,
            stall_frame,
            stall_secs,
            config,
        } => {
            if !(fps.is_finite() && fps > 0.0) {
                bail!("--fps must be positive, got {fps}");
            }
            let config = load_config(config, clients)?;
            let mut session = launch(&config)?;
            let delta = 1.0 / fps;
            println!(
                "Running {frames} frames at {fps} fps with {} client(s)",
                config.clients
            );

            for frame in 0..frames {
                let delta = if Some(frame) == stall_frame {
                    tracing::info!(frame, stall_secs, "simulating host stall");
                    stall_secs
                } else {
                    delta
                };
                session
                    .frame(delta)
                    .with_context(|| format!("frame {frame}"))?;
            }

            println!("Host time: {:.3}s", session.orchestrator().elapsed());
            for report in session.reports() {
                println!("{report}");
            }
        }
    }

    Ok(())
}
