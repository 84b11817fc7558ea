//! `taskflow` command line: validate and run experiment protocols.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use rand::SeedableRng;
use rand::rngs::StdRng;
use tracing::debug;

use taskflow::core::context::Env;
use taskflow::core::task::TaskNode;
use taskflow::core::types::Phase;
use taskflow::exit_codes;
use taskflow::io::config::{EngineConfig, load_config, write_config};
use taskflow::io::data_log::FileLog;
use taskflow::io::hud::ConsoleHud;
use taskflow::io::input::ScriptedInput;
use taskflow::io::protocol_file::load_protocol;
use taskflow::scheduler::{RunStop, Scheduler};

const DEFAULT_CONFIG: &str = "taskflow.toml";

#[derive(Parser)]
#[command(
    name = "taskflow",
    version,
    about = "Hierarchical task execution engine for experimental protocols"
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Write a default `taskflow.toml`.
    Init {
        /// Overwrite an existing config.
        #[arg(short, long)]
        force: bool,
        #[arg(long, default_value = DEFAULT_CONFIG)]
        path: PathBuf,
    },
    /// Check a protocol against the schema and semantic invariants.
    Validate { protocol: PathBuf },
    /// Run a protocol to completion.
    Run {
        protocol: PathBuf,
        #[arg(long, default_value = DEFAULT_CONFIG)]
        config: PathBuf,
        /// JSON array of `{ "at_seconds", "binding" }` input events.
        #[arg(long)]
        events: Option<PathBuf>,
        /// Stop and report a stall after this many ticks (overrides config).
        #[arg(long)]
        max_ticks: Option<u64>,
    },
}

fn main() {
    taskflow::logging::init();
    let cli = Cli::parse();
    let code = match cli.command {
        Command::Init { force, path } => report(cmd_init(&path, force)),
        Command::Validate { protocol } => report(cmd_validate(&protocol)),
        Command::Run {
            protocol,
            config,
            events,
            max_ticks,
        } => cmd_run(&protocol, &config, events.as_deref(), max_ticks),
    };
    std::process::exit(code);
}

fn report(result: Result<()>) -> i32 {
    match result {
        Ok(()) => exit_codes::OK,
        Err(err) => {
            eprintln!("{err:#}");
            exit_codes::INVALID
        }
    }
}

fn cmd_init(path: &Path, force: bool) -> Result<()> {
    if !force && path.exists() {
        bail!("{} already exists (use --force to overwrite)", path.display());
    }
    write_config(path, &EngineConfig::default())?;
    println!("wrote {}", path.display());
    Ok(())
}

fn cmd_validate(protocol: &Path) -> Result<()> {
    let spec = load_protocol(protocol)?;
    let root = spec.build()?;
    println!("{}: ok ({} top-level tasks)", protocol.display(), root.children().len());
    Ok(())
}

struct RunSetup {
    config: EngineConfig,
    root: TaskNode,
    log: FileLog,
    input: ScriptedInput,
}

fn setup_run(protocol: &Path, config: &Path, events: Option<&Path>) -> Result<RunSetup> {
    let config = load_config(config)?;
    let spec = load_protocol(protocol)?;
    let root = spec
        .build()
        .with_context(|| format!("build protocol {}", protocol.display()))?;
    let input = match events {
        Some(path) => ScriptedInput::load(path)?,
        None => ScriptedInput::new(),
    };
    let log = FileLog::open(&config.output_dir, &config.delimiter)?;
    Ok(RunSetup {
        config,
        root,
        log,
        input,
    })
}

fn cmd_run(protocol: &Path, config: &Path, events: Option<&Path>, max_ticks: Option<u64>) -> i32 {
    let RunSetup {
        config,
        mut root,
        mut log,
        mut input,
    } = match setup_run(protocol, config, events) {
        Ok(setup) => setup,
        Err(err) => {
            eprintln!("{err:#}");
            return exit_codes::INVALID;
        }
    };

    let mut hud = ConsoleHud::new();
    let mut rng = StdRng::seed_from_u64(config.seed);
    let scheduler = Scheduler::new(config.tick()).with_max_ticks(max_ticks.or(config.tick_limit()));
    let result = {
        let mut env = Env::new(&config.settings, &mut log, &mut rng)
            .with_input(&mut input)
            .with_hud(&mut hud);
        scheduler.run_with(&mut root, &mut env, |ticks, root| trace_progress(ticks, root))
    };
    let flushed = log.finish();

    let code = match result {
        Ok(outcome) if outcome.stop == RunStop::Complete => {
            println!(
                "{}: complete after {} ticks ({:.3}s)",
                root.name(),
                outcome.ticks,
                outcome.elapsed.as_secs_f64()
            );
            exit_codes::OK
        }
        Ok(outcome) => {
            eprintln!(
                "{}: stalled after {} ticks ({:.3}s)",
                root.name(),
                outcome.ticks,
                outcome.elapsed.as_secs_f64()
            );
            exit_codes::STALLED
        }
        Err(err) => {
            eprintln!("fatal: {err}");
            exit_codes::FATAL
        }
    };
    if let Err(err) = flushed {
        eprintln!("{err:#}");
        return exit_codes::FATAL;
    }
    code
}

/// Emit repeat progress for every repeat on the active path.
fn trace_progress(ticks: u64, node: &TaskNode) {
    if node.phase() != Phase::Subtree {
        return;
    }
    if let Some(progress) = node.repeat_progress() {
        debug!(
            ticks,
            task = node.name(),
            iteration = progress.iteration,
            total = ?progress.total,
            subtask = progress.subtask,
            subtasks = progress.subtasks,
            "repeat progress"
        );
    }
    for child in node.children() {
        trace_progress(ticks, child);
    }
}
