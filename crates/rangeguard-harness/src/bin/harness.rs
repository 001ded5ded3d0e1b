//! CLI entrypoint for the rangeguard harness.

use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};

use rangeguard_harness::structured_log::{ArtifactIndex, LogEmitter, validate_log_file};
use rangeguard_harness::{decode, render, scenario};
use rangeguard_membrane::GuardConfig;

/// Scenario and log tooling for rangeguard.
#[derive(Debug, Parser)]
#[command(name = "rangeguard-harness")]
#[command(about = "Run guard scenarios and decode exported diagnostic logs")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Run a JSON scenario through one unit of work.
    RunScenario {
        /// Scenario JSON path.
        #[arg(long)]
        input: PathBuf,
        /// Write the exported log dump (little-endian words) here.
        #[arg(long)]
        dump: Option<PathBuf>,
        /// Write structured JSONL diagnostics here.
        #[arg(long)]
        log: Option<PathBuf>,
        /// Write an artifact index (SHA-256 of dump and log) here.
        #[arg(long)]
        artifact_index: Option<PathBuf>,
        /// Run id used in trace ids.
        #[arg(long, default_value = "local")]
        run_id: String,
    },
    /// Decode an exported log dump.
    Decode {
        /// Dump path written by `run-scenario --dump`.
        #[arg(long)]
        input: PathBuf,
        /// Output format: `json` (default) or `plain`.
        #[arg(long, default_value = "json")]
        format: String,
        /// Output file path (if omitted, prints to stdout).
        #[arg(long)]
        output: Option<PathBuf>,
    },
    /// Validate a structured JSONL log against the schema.
    ValidateLog {
        #[arg(long)]
        log: PathBuf,
    },
}

fn write_output(path: Option<&Path>, body: &str) -> std::io::Result<()> {
    match path {
        Some(path) => {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)?;
            }
            std::fs::write(path, body)
        }
        None => {
            print!("{body}");
            Ok(())
        }
    }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    match cli.command {
        Command::RunScenario {
            input,
            dump,
            log,
            artifact_index,
            run_id,
        } => {
            let loaded = scenario::load_scenario(&input)?;
            let outcome = scenario::run_scenario(&loaded, GuardConfig::from_env())?;
            let report = decode::decode_dump(&outcome.dump);
            let mut index = ArtifactIndex::new(&run_id);

            if let Some(path) = &dump {
                let bytes = outcome.dump.to_le_bytes();
                std::fs::write(path, &bytes)?;
                index.add_bytes(path.display().to_string(), "log_dump", &bytes);
            }
            if let Some(path) = &log {
                let mut emitter = LogEmitter::to_file(path, &run_id)?;
                let refs = dump.iter().map(|d| d.display().to_string()).collect();
                scenario::log_outcome(&mut emitter, &outcome, &report, refs)?;
                drop(emitter);
                index.add_file(path, "structured_log")?;
            }
            if let Some(path) = artifact_index {
                write_output(Some(&path), &index.to_json()?)?;
            }

            let summary = serde_json::to_string_pretty(&outcome.summary_json())?;
            println!("{summary}");
            eprintln!(
                "{}: {} accesses, {} invalid, {} record(s) logged",
                if outcome.name.is_empty() { "scenario" } else { outcome.name.as_str() },
                outcome.verdicts.len(),
                outcome.invalid_count(),
                report.records_decoded,
            );
        }
        Command::Decode {
            input,
            format,
            output,
        } => {
            let report = decode::decode_dump_file(&input)?;
            let out = match format.to_ascii_lowercase().as_str() {
                "json" => serde_json::to_string_pretty(&report)?,
                "plain" => render::render_plain(&report),
                other => {
                    return Err(format!("Unsupported format '{other}', expected json|plain").into());
                }
            };
            write_output(output.as_deref(), &out)?;
        }
        Command::ValidateLog { log } => {
            let (lines, errors) = validate_log_file(&log)?;
            for err in &errors {
                eprintln!("{err}");
            }
            println!("{}: {lines} line(s), {} error(s)", log.display(), errors.len());
            if !errors.is_empty() {
                return Err(format!("Structured log validation failed: {} error(s)", errors.len()).into());
            }
        }
    }

    Ok(())
}
