//! restgen CLI - nominal and error test generation for REST APIs

mod storage;

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use tracing::info;
use tracing_subscriber::EnvFilter;

use restgen_core::generation::{ErrorGenerator, GenerationContext, NominalGenerator};
use restgen_core::graph::DependencyGraph;
use restgen_core::operation::Operation;
use restgen_core::report::{GenerationReport, generate_schema};
use restgen_core::{Config, StaticAuthentication};
use restgen_runner::{HttpExecutor, openapi};

#[derive(Parser)]
#[command(name = "restgen")]
#[command(about = "Automatic nominal and error test generation for REST APIs")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Output format
    #[arg(long, global = true, default_value = "terminal")]
    output: OutputFormat,

    /// Verbose output (debug logging)
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Generate and execute nominal and error tests
    Generate {
        /// Config file (default: .restgen.toml)
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Mutants per successful nominal request
        #[arg(long)]
        mutants: Option<u32>,

        /// Seed for a reproducible run
        #[arg(long)]
        seed: Option<u64>,

        /// Nominal generation budget in seconds (0 = unbounded)
        #[arg(long)]
        time_budget: Option<u64>,

        /// Skip error generation
        #[arg(long)]
        no_errors: bool,

        /// Dump all interactions to JSONL files
        #[arg(long)]
        dump: bool,
    },

    /// Print the operation dependency graph in DOT format
    Graph {
        /// Config file (default: .restgen.toml)
        #[arg(short, long)]
        config: Option<PathBuf>,
    },

    /// Initialize config file
    Init,

    /// Export JSON Schema for the report format
    Schema,
}

#[derive(Clone, Copy, ValueEnum, PartialEq, Eq)]
enum OutputFormat {
    Terminal,
    Json,
    Silent,
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match run(cli) {
        Ok(code) => ExitCode::from(code),
        Err(e) => {
            eprintln!("Error: {e:#}");
            ExitCode::from(3)
        }
    }
}

fn init_logging(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn format_pct_display(rate: f64) -> String {
    let pct = rate * 100.0;
    if pct == 0.0 || pct == 100.0 {
        format!("{pct:.0}")
    } else {
        format!("{pct:.1}")
    }
}

fn load_config(path: Option<&Path>) -> Result<Config> {
    let config = match path {
        Some(path) => Config::load(path)?,
        None => Config::load_default()?,
    };
    Ok(config)
}

fn load_graph(config: &Config) -> Result<DependencyGraph> {
    let specs = openapi::load(&config.spec)
        .with_context(|| format!("loading {}", config.spec.display()))?;
    let operations: Vec<Arc<Operation>> = specs
        .into_iter()
        .map(|spec| Arc::new(Operation::from_spec(spec)))
        .collect();
    let graph = DependencyGraph::build(&operations);
    info!(
        operations = graph.len(),
        dependencies = graph.edge_count(),
        "dependency graph built"
    );
    Ok(graph)
}

fn run(cli: Cli) -> Result<u8> {
    match cli.command {
        Commands::Generate {
            config,
            mutants,
            seed,
            time_budget,
            no_errors,
            dump,
        } => {
            let mut cfg = load_config(config.as_deref())?;
            if let Some(mutants) = mutants {
                cfg.generation.number_of_mutants = mutants;
            }
            if no_errors {
                cfg.generation.number_of_mutants = 0;
            }
            if seed.is_some() {
                cfg.generation.seed = seed;
            }
            if let Some(secs) = time_budget {
                cfg.generation.time_budget_secs = secs;
            }
            cfg.validate()?;

            let graph = load_graph(&cfg)?;
            let quiet = cli.output == OutputFormat::Silent;
            if !quiet {
                eprintln!("Config:");
                eprintln!("  spec:       {}", cfg.spec.display());
                eprintln!("  base_url:   {}", cfg.base_url);
                eprintln!("  operations: {} ({} dependencies)", graph.len(), graph.edge_count());
                if !cfg.auth.is_empty() {
                    eprintln!("  auth:       {} parameters", cfg.auth.len());
                }
                eprintln!();
            }

            let mut executor = HttpExecutor::new(cfg.base_url.clone(), cfg.headers.clone())?;
            let mut ctx = GenerationContext::new(
                cfg.generation.clone(),
                Box::new(StaticAuthentication::from_config(&cfg.auth)),
            );
            let started = chrono::Utc::now();

            if !quiet {
                eprintln!("Generating nominal tests...");
            }
            let nominal = NominalGenerator::new(&graph).run(&mut ctx, &mut executor)?;
            let errors = if cfg.generation.number_of_mutants > 0 {
                if !quiet {
                    eprintln!("Generating error tests...");
                }
                Some(ErrorGenerator.run(&mut ctx, &nominal.sequence, &mut executor)?)
            } else {
                None
            };
            let report = GenerationReport::new(&graph, &nominal, errors.as_ref(), started);

            match cli.output {
                OutputFormat::Terminal => print_terminal(&report),
                OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&report)?),
                OutputFormat::Silent => {}
            }

            let mutant_interactions = errors.as_ref().map_or(&[][..], |e| e.mutants.as_slice());
            if dump || cfg.dump {
                let dump_path = cfg.output_dir().join("dumps");
                let all: Vec<_> = nominal
                    .sequence
                    .interactions()
                    .iter()
                    .chain(mutant_interactions)
                    .cloned()
                    .collect();
                match restgen_core::dump::write_dump(&all, &dump_path, true) {
                    Ok(index) if !quiet => {
                        eprintln!("Dump: {} interactions → {}", index.total, dump_path.display());
                    }
                    Ok(_) => {}
                    Err(e) => eprintln!("Warning: failed to write dump: {e}"),
                }
            }

            let data = storage::RunData {
                config: &cfg,
                report: &report,
                graph: &graph,
                nominal: nominal.sequence.interactions(),
                mutants: mutant_interactions,
            };
            match storage::save_run(&data, &cfg.output_dir()) {
                Ok(path) if !quiet => eprintln!("Report saved: {}", path.display()),
                Ok(_) => {}
                Err(e) => eprintln!("Warning: failed to save report: {e}"),
            }

            Ok(if report.is_complete() { 0 } else { 1 })
        }

        Commands::Graph { config } => {
            let cfg = load_config(config.as_deref())?;
            let graph = load_graph(&cfg)?;
            print!("{}", graph.to_dot());
            Ok(0)
        }

        Commands::Init => {
            let config_path = ".restgen.toml";
            if Path::new(config_path).exists() {
                eprintln!("{config_path} already exists");
                return Ok(1);
            }

            std::fs::write(config_path, Config::example())?;
            println!("Created {config_path}");
            println!("\nEdit the file to configure:");
            println!("  - spec: path to your OpenAPI spec");
            println!("  - base_url: server to test");
            println!("  - auth: authentication parameters used verbatim");
            println!("  - generation: budgets, mutants per request, seed");
            Ok(0)
        }

        Commands::Schema => {
            println!("{}", generate_schema());
            Ok(0)
        }
    }
}

fn print_terminal(report: &GenerationReport) {
    let s = &report.summary;
    let icon = if report.is_complete() { "COMPLETE" } else { "PARTIAL" };
    println!(
        "\n{icon}: {}/{} operations covered ({}%)",
        s.covered_operations,
        s.total_operations,
        format_pct_display(s.coverage)
    );
    println!(
        "  Nominal: {} attempts over {} passes ({:?})",
        s.attempts, s.passes, s.termination
    );
    if s.mutants > 0 || s.mutants_skipped > 0 {
        println!(
            "  Errors:  {} mutants, {} rejected by the server, {} skipped",
            s.mutants, s.mutants_rejected, s.mutants_skipped
        );
    }

    println!("\nOperations:");
    for state in &report.operations {
        println!(
            "  {:<40} {:?} ({} attempts)",
            state.operation, state.status, state.attempts
        );
    }

    let accepted: Vec<_> = report.mutants.iter().filter(|m| !m.passed()).collect();
    if !accepted.is_empty() {
        println!("\nMutants not rejected ({}):", accepted.len());
        for m in accepted {
            let summary = m.outcome.as_ref().map_or("", |o| o.summary.as_str());
            println!(
                "  {} - {} ({summary})",
                m.operation,
                m.mutation.as_deref().unwrap_or_default()
            );
        }
    }
}
