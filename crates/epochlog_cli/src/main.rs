//! Command-line host for `epochlog_core`.
//!
//! # Responsibility
//! - Record a small demonstration experiment into a container file.
//! - Print the stored hierarchy of an existing container.

use chrono::{DateTime, Duration, FixedOffset};
use clap::{Parser, Subcommand};
use epochlog_core::{
    core_version, default_log_level, init_logging, Entity, EpochGroup, EpochPersistor,
    Experiment, Measurement, PersistorError, PersistorOptions, PersistorResult, Source,
};
use log::info;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

#[derive(Parser)]
#[command(name = "epochlog")]
#[command(about = "Record and inspect experiment structure containers.")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// JSON file with persistor options
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Absolute directory for rolling log files; logging is off when omitted
    #[arg(long, global = true)]
    log_dir: Option<PathBuf>,

    /// Log level (trace|debug|info|warn|error)
    #[arg(long, global = true)]
    level: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the core library version
    Version,
    /// Record a demonstration experiment into a container
    Demo {
        /// Container file, created when missing
        file: PathBuf,
    },
    /// Print the hierarchy stored in a container
    Dump {
        /// Container file
        file: PathBuf,
    },
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    if let Some(log_dir) = &cli.log_dir {
        let level = cli.level.as_deref().unwrap_or(default_log_level());
        if let Err(err) = init_logging(level, log_dir) {
            eprintln!("error: {err}");
            return ExitCode::FAILURE;
        }
    }

    let options = match load_options(cli.config.as_deref()) {
        Ok(options) => options,
        Err(err) => {
            eprintln!("error: {err}");
            return ExitCode::FAILURE;
        }
    };

    let result = match &cli.command {
        Commands::Version => {
            println!("epochlog_core version={}", core_version());
            Ok(())
        }
        Commands::Demo { file } => record_demo(file, options),
        Commands::Dump { file } => dump(file, options),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("error: {err}");
            ExitCode::FAILURE
        }
    }
}

fn load_options(path: Option<&Path>) -> Result<PersistorOptions, String> {
    let Some(path) = path else {
        return Ok(PersistorOptions::default());
    };
    let raw = std::fs::read_to_string(path)
        .map_err(|err| format!("failed to read config `{}`: {err}", path.display()))?;
    serde_json::from_str(&raw)
        .map_err(|err| format!("invalid config `{}`: {err}", path.display()))
}

fn record_demo(file: &Path, options: PersistorOptions) -> PersistorResult<()> {
    let start = DateTime::parse_from_rfc3339("2024-05-01T09:00:00-07:00")
        .map_err(|err| PersistorError::InvalidArgument(err.to_string()))?;
    let at = |minutes: i64| start + Duration::minutes(minutes);

    let mut persistor = EpochPersistor::open(file, options)?;
    let prep = persistor.add_source("prep", None)?;
    let cell = persistor.add_source("Cell 1", Some(&prep))?;
    persistor.add_property(&cell, "resistance", Measurement::new(12.5, 6, "Ω"))?;

    let experiment = persistor.begin_experiment("demo recording", at(0))?;
    persistor.add_keyword(&experiment, "demo")?;
    persistor.add_note(&experiment, at(0), "rig warmed up")?;

    let outer = persistor.begin_epoch_group("baseline", &cell, at(1))?;
    persistor.add_property(&outer, "trials", 3_i64)?;
    let inner = persistor.begin_epoch_group("stimulus", &cell, at(2))?;
    persistor.add_note(&inner, at(3), "response looks clean")?;
    persistor.end_epoch_group(at(4))?;
    persistor.end_epoch_group(at(5))?;
    persistor.end_experiment(at(6))?;
    persistor.close()?;

    info!(
        "event=cli_demo module=cli status=ok file={} experiment={}",
        file.display(),
        experiment.id()
    );
    println!("recorded experiment {} into {}", experiment.id(), file.display());
    Ok(())
}

fn dump(file: &Path, options: PersistorOptions) -> PersistorResult<()> {
    let persistor = EpochPersistor::open(file, options)?;
    println!("sources:");
    for source in persistor.sources()? {
        print_source(&persistor, &source, 1)?;
    }
    println!("experiments:");
    for experiment in persistor.experiments()? {
        print_experiment(&persistor, &experiment)?;
    }
    persistor.close()
}

fn print_source(persistor: &EpochPersistor, source: &Source, depth: usize) -> PersistorResult<()> {
    let indent = "  ".repeat(depth);
    println!(
        "{indent}{} `{}` indexed_groups={}",
        source.id(),
        persistor.label(source)?,
        persistor.source_epoch_groups(source)?.len()
    );
    print_metadata(persistor, source, depth + 1)?;
    for child in persistor.child_sources(source)? {
        print_source(persistor, &child, depth + 1)?;
    }
    Ok(())
}

fn print_experiment(persistor: &EpochPersistor, experiment: &Experiment) -> PersistorResult<()> {
    println!(
        "  {} `{}` {}",
        experiment.id(),
        persistor.purpose(experiment)?,
        format_span(
            &persistor.start_time(experiment)?,
            persistor.end_time(experiment)?.as_ref()
        )
    );
    print_metadata(persistor, experiment, 2)?;
    for group in persistor.experiment_epoch_groups(experiment)? {
        print_epoch_group(persistor, &group, 2)?;
    }
    Ok(())
}

fn print_epoch_group(
    persistor: &EpochPersistor,
    group: &EpochGroup,
    depth: usize,
) -> PersistorResult<()> {
    let indent = "  ".repeat(depth);
    println!(
        "{indent}{} `{}` source={} {}",
        group.id(),
        persistor.label(group)?,
        persistor.epoch_group_source(group)?.id(),
        format_span(&persistor.start_time(group)?, persistor.end_time(group)?.as_ref())
    );
    print_metadata(persistor, group, depth + 1)?;
    for child in persistor.child_epoch_groups(group)? {
        print_epoch_group(persistor, &child, depth + 1)?;
    }
    Ok(())
}

fn print_metadata(
    persistor: &EpochPersistor,
    entity: &impl Entity,
    depth: usize,
) -> PersistorResult<()> {
    let indent = "  ".repeat(depth);
    for (key, value) in persistor.properties(entity)? {
        let value = serde_json::to_string(&value)
            .map_err(|err| PersistorError::InvalidArgument(err.to_string()))?;
        println!("{indent}property {key} = {value}");
    }
    let keywords = persistor.keywords(entity)?;
    if !keywords.is_empty() {
        let keywords = keywords.into_iter().collect::<Vec<_>>().join(", ");
        println!("{indent}keywords: {keywords}");
    }
    for note in persistor.notes(entity)? {
        println!("{indent}note [{}] {}", note.timestamp().to_rfc3339(), note.text());
    }
    Ok(())
}

fn format_span(start: &DateTime<FixedOffset>, end: Option<&DateTime<FixedOffset>>) -> String {
    match end {
        Some(end) => format!("{} .. {}", start.to_rfc3339(), end.to_rfc3339()),
        None => format!("{} .. (open)", start.to_rfc3339()),
    }
}
