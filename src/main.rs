use anyhow::{Context, Result};
use clap::Parser;
use log::info;
use std::path::PathBuf;

use intersection_sim::simulation::{Command, LogSubscriber, SimConfig, SimWorld};

#[derive(Parser)]
#[command(name = "intersection_sim")]
#[command(about = "Four-way signalized intersection with emergency preemption")]
struct Cli {
    /// JSON configuration file; defaults are used when omitted
    #[arg(long)]
    config: Option<PathBuf>,

    /// Number of simulation ticks to run
    #[arg(long, default_value = "3000")]
    ticks: u64,

    /// RNG seed, overrides the configuration file
    #[arg(long)]
    seed: Option<u64>,

    /// Speed multiplier applied to vehicle motion and spawning
    #[arg(long, default_value = "1.0")]
    speed: f32,

    /// Print a state summary every N ticks (0 disables)
    #[arg(long, default_value = "500")]
    report_every: u64,

    /// Spawn rate for every lane in vehicles per second
    #[arg(long)]
    spawn_rate: Option<f64>,

    /// Log every simulation event
    #[arg(long)]
    log_events: bool,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(
        env_logger::Env::default().default_filter_or("warn,intersection_sim=info"),
    )
    .init();

    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => SimConfig::load(path)?,
        None => SimConfig::default(),
    };
    if let Some(seed) = cli.seed {
        config.seed = Some(seed);
    }
    if let Some(rate) = cli.spawn_rate {
        config.spawn_rate_per_lane = rate;
    }

    let mut world = SimWorld::new(config).context("Invalid simulation configuration")?;
    if cli.log_events {
        world.subscribe(Box::new(LogSubscriber));
    }

    run_headless(&mut world, &cli)?;
    log_completion(&world);
    Ok(())
}

/// Run the simulation in headless mode (no graphics)
fn run_headless(world: &mut SimWorld, cli: &Cli) -> Result<()> {
    println!("Running intersection simulation in headless mode...");
    println!(
        "Ticks: {}, speed x{}, seed {}",
        cli.ticks,
        cli.speed,
        world.seed()
    );
    println!();

    world.submit(Command::SetSpeedMultiplier(cli.speed))?;
    world.submit(Command::Start)?;

    println!("Initial state:");
    world.print_summary();
    println!();

    while world.tick() < cli.ticks {
        world.advance();

        let tick = world.tick();
        if cli.report_every > 0 && tick % cli.report_every == 0 && tick < cli.ticks {
            println!("--- After tick {} ---", tick);
            world.print_summary();
            println!();
        }
    }

    println!("=== Final State ===");
    world.print_summary();
    Ok(())
}

fn log_completion(world: &SimWorld) {
    let stats = world.stats();
    info!("=== SIMULATION COMPLETE ===");
    info!("Ticks run: {}", world.tick());
    info!("Total vehicles spawned: {}", stats.vehicles_spawned);
    info!("Total vehicles departed: {}", stats.vehicles_departed);
    info!("Active vehicles: {}", world.vehicle_count());
    info!(
        "Emergency vehicles served: {} ({} ambulances, {} firetrucks)",
        stats.emergency_vehicles_served(),
        stats.ambulances_served,
        stats.firetrucks_served
    );
    info!("Preemptions requested: {}", stats.preemptions_requested);
    info!("Preemptions timed out: {}", stats.preemptions_timed_out);
    info!("Collisions avoided: {}", stats.collisions_avoided);
    info!("Invariant violations: {}", stats.invariant_violations);
    info!("Throughput: {:.1}%", stats.throughput_percent());
}
