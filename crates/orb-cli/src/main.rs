mod run;

use std::collections::BTreeMap;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use orb_core::{Mode, OrbConfig, OrbController, Pattern, StimulusGenerator};
use orb_store::{Store, TraceLog, config};
use rand::SeedableRng;
use rand::rngs::SmallRng;

#[derive(Parser)]
#[command(name = "orb", about = "Cursor orb spatial field and mode arbiter")]
struct Cli {
    /// TOML config file (defaults to $ORB_CONFIG, then built-in defaults)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose debug output
    #[arg(long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Read JSON stimuli from stdin and write one JSON pulse per line
    Run {
        /// Compute every pulse instead of replaying crystallized ones
        #[arg(long)]
        no_cache: bool,
    },

    /// Drive the controller with a synthetic cursor pattern
    Simulate {
        /// linear, oscillate, random-walk, quadrant-loop or mirror-jump
        #[arg(long, default_value = "quadrant-loop")]
        pattern: Pattern,

        /// Number of stimuli to generate
        #[arg(long, default_value_t = 200)]
        steps: usize,

        #[arg(long, default_value_t = 42)]
        seed: u64,

        /// Print every pulse as a JSON line instead of a summary
        #[arg(long)]
        json: bool,

        /// Append the run to the trace log in the data directory
        #[arg(long)]
        record: bool,
    },

    /// Show persisted field, cache and trace statistics
    Stats {
        #[arg(long)]
        json: bool,
    },

    /// Print the effective configuration as TOML
    Config,
}

fn init_tracing(verbose: bool) {
    use tracing_subscriber::EnvFilter;

    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::from_default_env().add_directive(tracing::Level::WARN.into())
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .init();
}

fn load_config(cli: &Cli) -> Result<OrbConfig> {
    let path = cli
        .config
        .clone()
        .or_else(|| std::env::var_os("ORB_CONFIG").map(PathBuf::from));
    match path {
        Some(path) => {
            config::load(&path).with_context(|| format!("failed to load config {}", path.display()))
        }
        None => Ok(OrbConfig::default()),
    }
}

fn database_path() -> Result<PathBuf> {
    let dir = config::data_dir();
    config::database_path(&dir)
        .with_context(|| format!("failed to create data dir {}", dir.display()))
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match &cli.command {
        Commands::Run { no_cache } => {
            let config = load_config(&cli)?;
            run::run(config, &database_path()?, !no_cache).await
        }
        Commands::Simulate {
            pattern,
            steps,
            seed,
            json,
            record,
        } => cmd_simulate(&cli, *pattern, *steps, *seed, *json, *record),
        Commands::Stats { json } => cmd_stats(*json),
        Commands::Config => cmd_config(&cli),
    }
}

fn cmd_simulate(
    cli: &Cli,
    pattern: Pattern,
    steps: usize,
    seed: u64,
    json: bool,
    record: bool,
) -> Result<()> {
    let config = load_config(cli)?;
    let (width, height) = (config.arbiter.screen_width, config.arbiter.screen_height);
    let mut controller = OrbController::new(config).context("invalid configuration")?;
    if record {
        let trace = TraceLog::open(&database_path()?).context("failed to open trace log")?;
        controller = controller.with_trace(trace);
    }
    let mut rng = SmallRng::seed_from_u64(seed);

    let mut modes: BTreeMap<Mode, u64> = Mode::ALL.into_iter().map(|m| (m, 0)).collect();
    let mut confidence_sum = 0.0;
    let mut pulses = 0u64;
    for stimulus in StimulusGenerator::new(pattern, width, height, seed).take(steps) {
        let Some(pulse) = controller
            .tick(&stimulus, &mut rng)
            .context("generated stimulus was rejected")?
        else {
            continue;
        };
        controller.take_events();
        if json {
            println!("{}", serde_json::to_string(&pulse)?);
        }
        *modes.entry(pulse.cognitive_mode).or_default() += 1;
        confidence_sum += pulse.glow_intensity;
        pulses += 1;
    }
    controller.flush_trace();

    if json {
        return Ok(());
    }
    println!("pattern:    {pattern}");
    println!("pulses:     {pulses}");
    for (mode, count) in &modes {
        println!("{:<15} {count}", mode.as_str());
    }
    let mean = if pulses == 0 {
        0.0
    } else {
        confidence_sum / pulses as f64
    };
    println!("confidence: {mean:.3}");
    println!("field:      {}", controller.field().size());
    Ok(())
}

fn cmd_stats(json: bool) -> Result<()> {
    let db = database_path()?;
    let store = Store::open(&db).with_context(|| format!("failed to open {}", db.display()))?;
    let stats = store.stats().context("failed to read store stats")?;

    if json {
        println!("{}", serde_json::to_string_pretty(&stats)?);
        return Ok(());
    }
    println!("snapshot:   {} nodes", stats.snapshot_nodes);
    println!("crystals:   {} ({} hits)", stats.crystals, stats.crystal_hits);
    println!("trace:      {} entries", stats.trace_entries);
    println!("sessions:   {}", stats.sessions);
    for mode in Mode::ALL {
        let count = stats.modes.get(&mode).copied().unwrap_or(0);
        println!("{:<15} {count}", mode.as_str());
    }
    Ok(())
}

fn cmd_config(cli: &Cli) -> Result<()> {
    let effective = load_config(cli)?;
    print!("{}", config::to_toml_string(&effective)?);
    Ok(())
}
