//! RMMIX Simulator - CLI Entry Point
//!
//! Commands:
//! - `rmmix run <object>...` - Run one job per object file
//! - `rmmix asm <source>...` - Assemble JDL source to object text
//! - `rmmix disasm <object>` - Disassemble object text to source

use clap::{Parser, Subcommand};
use rmmix::{assemble, disassemble, ObjectReader, RunReport, SimConfig, Simulator};
use std::fs::File;
use std::path::{Path, PathBuf};
use std::process;
use std::sync::Mutex;
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::prelude::*;
use tracing_subscriber::{fmt, EnvFilter};

/// Exit status for malformed command lines.
const EXIT_USAGE: i32 = -1;
/// Exit status when the machine could not be set up.
const EXIT_SETUP: i32 = -4;

#[derive(Parser)]
#[command(name = "rmmix")]
#[command(version = "0.1.0")]
#[command(about = "A cycle-stepped RMMIX emulator with a multiprogramming OS")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run jobs until the OS exits or the tick budget runs out
    Run {
        /// Object files, one job each
        #[arg(required = true)]
        objects: Vec<PathBuf>,
        /// JSON configuration file
        #[arg(short, long)]
        config: Option<PathBuf>,
        /// Device delay in ticks
        #[arg(short, long)]
        delay: Option<u32>,
        /// Global tick budget
        #[arg(short, long)]
        max_ticks: Option<u64>,
        /// Directory for job output files
        #[arg(short, long)]
        output_dir: Option<PathBuf>,
        /// Log file
        #[arg(short, long)]
        log: Option<PathBuf>,
        /// Write a JSON run report here
        #[arg(short, long)]
        report: Option<PathBuf>,
    },
    /// Assemble JDL source to object text
    Asm {
        /// Source files, assembled in order
        #[arg(required = true)]
        sources: Vec<PathBuf>,
        /// Output object file (stdout if omitted)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Disassemble object text to readable source
    Disasm {
        /// Path to the object file
        object: PathBuf,
    },
}

fn main() {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) => {
            let usage = e.use_stderr();
            // --help and --version print and succeed.
            let _ = e.print();
            process::exit(if usage { EXIT_USAGE } else { 0 });
        }
    };

    match cli.command {
        Commands::Run {
            objects,
            config,
            delay,
            max_ticks,
            output_dir,
            log,
            report,
        } => {
            let mut sim_config = match config {
                Some(path) => SimConfig::load(&path).unwrap_or_else(|e| fail(e)),
                None => SimConfig::default(),
            };
            if let Some(delay) = delay {
                sim_config.device_delay = delay;
            }
            if let Some(max_ticks) = max_ticks {
                sim_config.max_ticks = max_ticks;
            }
            if let Some(dir) = output_dir {
                sim_config.output_dir = dir;
            }
            if let Some(log) = log {
                sim_config.log_path = log;
            }
            if let Err(e) = sim_config.validate() {
                fail(e);
            }
            run_jobs(&objects, sim_config, report.as_deref());
        }
        Commands::Asm { sources, output } => {
            assemble_files(&sources, output.as_deref());
        }
        Commands::Disasm { object } => {
            disassemble_file(&object);
        }
    }
}

fn fail(e: impl std::fmt::Display) -> ! {
    eprintln!("rmmix: {}", e);
    process::exit(EXIT_SETUP);
}

/// File layer at `debug` (or `RUST_LOG`), stderr layer at `warn`.
fn init_logging(path: &Path) -> Result<(), String> {
    let file = File::create(path).map_err(|e| format!("cannot create log {}: {}", path.display(), e))?;
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("debug"));

    let file_layer = fmt::layer()
        .with_ansi(false)
        .with_target(false)
        .with_writer(Mutex::new(file))
        .with_filter(filter);
    let stderr_layer = fmt::layer()
        .with_target(false)
        .without_time()
        .with_writer(std::io::stderr)
        .with_filter(LevelFilter::WARN);

    tracing_subscriber::registry()
        .with(file_layer)
        .with(stderr_layer)
        .try_init()
        .map_err(|e| e.to_string())
}

fn run_jobs(objects: &[PathBuf], config: SimConfig, report_path: Option<&Path>) {
    if let Err(e) = init_logging(&config.log_path) {
        fail(e);
    }
    if let Err(e) = std::fs::create_dir_all(&config.output_dir) {
        fail(format!("cannot create {}: {}", config.output_dir.display(), e));
    }

    tracing::info!(
        jobs = objects.len(),
        delay = config.device_delay,
        max_ticks = config.max_ticks,
        "starting simulation"
    );
    let mut sim = Simulator::from_paths(objects, config);
    if let Err(e) = sim.start() {
        tracing::error!("{}", e);
        process::exit(EXIT_SETUP);
    }

    let report = sim.run();
    print_report(&report);

    if let Some(path) = report_path {
        let written = serde_json::to_string_pretty(&report)
            .map_err(|e| e.to_string())
            .and_then(|json| std::fs::write(path, json).map_err(|e| e.to_string()));
        if let Err(e) = written {
            fail(format!("cannot write report {}: {}", path.display(), e));
        }
    }
    process::exit(report.status);
}

fn print_report(report: &RunReport) {
    println!("━━━ Result ━━━");
    println!("Ticks:            {}", report.ticks);
    println!("Instructions:     {}", report.instructions);
    println!("Idle ticks:       {}", report.idle_ticks);
    println!("Context switches: {}", report.context_switches);
    for job in &report.jobs {
        let outcome = job
            .outcome
            .map(|o| format!("{:?}", o))
            .unwrap_or_else(|| "unfinished".to_owned());
        println!(
            "Job {} ({}): {} segment(s), {}",
            job.index, job.name, job.sub_jobs, outcome
        );
    }
    if report.budget_exhausted {
        println!();
        println!("Reached tick budget. Use --max-ticks to increase.");
    }
    println!("Exit status: {}", report.status);
}

fn assemble_files(sources: &[PathBuf], output: Option<&Path>) {
    let mut object = String::new();
    for path in sources {
        let source = std::fs::read_to_string(path)
            .unwrap_or_else(|e| fail(format!("cannot read {}: {}", path.display(), e)));
        let text = assemble(&source).unwrap_or_else(|e| fail(format!("{}: {}", path.display(), e)));
        object.push_str(&text);
    }

    match output {
        Some(path) => {
            if let Err(e) = std::fs::write(path, &object) {
                fail(format!("cannot write {}: {}", path.display(), e));
            }
        }
        None => print!("{}", object),
    }
}

fn disassemble_file(path: &Path) {
    let mut reader = ObjectReader::open(path).unwrap_or_else(|e| fail(e));
    let listing = disassemble(&mut reader).unwrap_or_else(|e| fail(e));
    print!("{}", listing);
}
