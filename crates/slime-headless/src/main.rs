mod metrics;
mod run;
mod snapshots;

use std::path::PathBuf;
use std::time::Instant;

use clap::{Parser, ValueEnum};
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use slime_core::sim::cpu::CpuSimulation;
use slime_core::{
    Agent, AgentPopulation, AgentStats, GpuDevice, OffscreenTarget, SimulationDriver, TrailField,
};

use metrics::MetricsWriter;
use run::RunConfig;
use snapshots::SnapshotWriter;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum BackendKind {
    Gpu,
    /// Host reference kernels; slow, but needs no adapter
    Cpu,
}

#[derive(Parser)]
#[command(name = "slime-headless")]
#[command(about = "Headless CLI runner for slimeworks trail experiments")]
struct Cli {
    /// Run file (YAML); defaults are used when omitted
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Output directory for results
    #[arg(short, long, value_name = "DIR")]
    out: PathBuf,

    #[arg(long)]
    steps: Option<u32>,

    #[arg(long)]
    seed: Option<u64>,

    #[arg(long)]
    agents: Option<u32>,

    /// Square field edge length, texels
    #[arg(long)]
    size: Option<u32>,

    /// 0 disables snapshots
    #[arg(long)]
    snapshot_every: Option<u32>,

    #[arg(long, value_enum, default_value_t = BackendKind::Gpu)]
    backend: BackendKind,

    /// Start from a randomized config drawn from the seed
    #[arg(long)]
    randomize: bool,
}

/// One of the two step implementations behind a common surface
enum Backend {
    Gpu {
        driver: SimulationDriver,
        target: OffscreenTarget,
    },
    Cpu(CpuSimulation),
}

impl Backend {
    fn step(&mut self) -> anyhow::Result<()> {
        match self {
            Backend::Gpu { driver, target } => {
                driver.step(&target.view)?;
            }
            Backend::Cpu(sim) => sim.step(),
        }
        Ok(())
    }

    fn field(&self) -> anyhow::Result<TrailField> {
        Ok(match self {
            Backend::Gpu { driver, .. } => driver.download_field()?,
            Backend::Cpu(sim) => sim.field().clone(),
        })
    }

    fn frame(&self) -> anyhow::Result<Vec<u8>> {
        Ok(match self {
            Backend::Gpu { driver, target } => {
                let gpu = driver.gpu().ok_or(slime_core::SimError::NotInitialized)?;
                target.read_pixels(gpu)?
            }
            Backend::Cpu(sim) => sim.render().into_iter().flatten().collect(),
        })
    }

    fn agents(&self) -> &[Agent] {
        match self {
            Backend::Gpu { driver, .. } => driver.agents(),
            Backend::Cpu(sim) => &sim.population.agents,
        }
    }

    fn agent_stats(&mut self) -> AgentStats {
        match self {
            Backend::Gpu { driver, .. } => driver.agent_stats().clone(),
            Backend::Cpu(sim) => {
                sim.population.update_stats();
                sim.population.stats.clone()
            }
        }
    }
}

fn apply_overrides(run: &mut RunConfig, cli: &Cli) {
    if let Some(steps) = cli.steps {
        run.steps = steps;
    }
    if let Some(seed) = cli.seed {
        run.settings.seed = seed;
    }
    if let Some(agents) = cli.agents {
        run.settings.agent_count = agents;
    }
    if let Some(size) = cli.size {
        run.settings.field_size = [size, size];
    }
    if let Some(every) = cli.snapshot_every {
        run.snapshot_every = every;
    }
    if cli.randomize {
        let mut rng = ChaCha8Rng::seed_from_u64(run.settings.seed);
        run.config = run.config.randomized(&mut rng);
    }
}

fn build_backend(kind: BackendKind, run: &RunConfig) -> anyhow::Result<Backend> {
    let settings = run.settings.clone();
    Ok(match kind {
        BackendKind::Gpu => {
            log::info!("Initializing GPU...");
            let gpu = pollster::block_on(GpuDevice::headless())?;
            let size = settings.field_size;
            let mut driver = SimulationDriver::new(settings, run.config);
            driver.initialize_with(gpu, OffscreenTarget::FORMAT)?;
            let gpu = driver.gpu().ok_or(slime_core::SimError::NotInitialized)?;
            let target = OffscreenTarget::new(gpu, size);
            Backend::Gpu { driver, target }
        }
        BackendKind::Cpu => {
            let population = AgentPopulation::new(settings.agent_count, settings.initial_speed, settings.seed);
            Backend::Cpu(CpuSimulation::new(settings.field_size, population, run.config, settings.trail))
        }
    })
}

fn main() -> anyhow::Result<()> {
    env_logger::init();
    let cli = Cli::parse();

    let mut run = match &cli.config {
        Some(path) => {
            log::info!("Loading run file {}", path.display());
            RunConfig::load(path)?
        }
        None => RunConfig::default(),
    };
    apply_overrides(&mut run, &cli);
    run.validate()?;

    std::fs::create_dir_all(&cli.out)?;
    std::fs::write(cli.out.join("run.yaml"), serde_yaml::to_string(&run)?)?;

    let mut backend = build_backend(cli.backend, &run)?;
    let mut metrics_writer = MetricsWriter::new(&cli.out)?;
    let snapshot_writer = SnapshotWriter::new(&cli.out)?;
    let size = run.settings.field_size;

    log::info!(
        "Running {} steps on {:?}: {}x{} field, {} agents, seed {}",
        run.steps,
        cli.backend,
        size[0],
        size[1],
        run.settings.agent_count,
        run.settings.seed
    );
    let start_time = Instant::now();

    for step in 1..=run.steps as u64 {
        let step_start = Instant::now();
        backend.step()?;
        let step_time = step_start.elapsed();

        if run.metrics_every > 0 && step % run.metrics_every as u64 == 0 {
            let field_stats = backend.field()?.stats();
            let agent_stats = backend.agent_stats();
            metrics_writer.write_step(step, &field_stats, &agent_stats, step_time)?;

            log::info!(
                "Step {}: trail=({:.3}, {:.3}, {:.3}) coverage={:.3} alignment={:.3} time={:?}",
                step,
                field_stats.mean[0],
                field_stats.mean[1],
                field_stats.mean[2],
                field_stats.coverage,
                agent_stats.heading_alignment,
                step_time
            );
        }

        if run.snapshot_every > 0 && (step % run.snapshot_every as u64 == 0 || step == run.steps as u64) {
            snapshot_writer.write_frame(step, size, backend.frame()?)?;
            snapshot_writer.write_trail_channels(step, &backend.field()?)?;
            snapshot_writer.write_agents(step, backend.agents())?;
            log::info!("Snapshot written for step {}", step);
        }
    }

    log::info!(
        "Simulation completed in {:?}; {} metric rows written to {}",
        start_time.elapsed(),
        metrics_writer.rows(),
        cli.out.display()
    );
    Ok(())
}
