//! SSLB simulator - runs the self-stabilizing load balancing protocol on a
//! simulated network
//!
//! - `run` - Run a scenario and record per-cycle load statistics
//! - `topology` - Print a generated network as an edge list
//! - `list` - List predefined scenarios

mod config;
mod event;
mod fault_injection;
mod graph;
mod metrics;
mod scenarios;
mod simulator;

use clap::{Parser, Subcommand, ValueEnum};
use config::{SimConfig, TopologyKind};
use rand::rngs::StdRng;
use rand::SeedableRng;
use scenarios::ScenarioResults;
use simulator::Simulation;
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::PathBuf;
use std::time::{Duration, Instant};
use tracing::info;
use tracing_subscriber::{fmt, EnvFilter};

#[derive(Parser)]
#[command(name = "sslb-sim")]
#[command(about = "Simulator for self-stabilizing load balancing")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a scenario
    Run {
        /// Scenario to run
        #[arg(short, long, default_value = "happy")]
        scenario: String,

        /// JSON configuration file used as the base configuration
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Number of nodes
        #[arg(short, long)]
        nodes: Option<usize>,

        /// Number of cycles
        #[arg(long)]
        cycles: Option<u64>,

        /// Erdős–Rényi edge probability
        #[arg(short, long)]
        probability: Option<f64>,

        /// Random seed
        #[arg(long)]
        seed: Option<u64>,

        /// Write per-cycle statistics as CSV to this file
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Add average, minimum and maximum columns to the CSV
        #[arg(long)]
        debug: bool,

        /// Wall-clock time per cycle in milliseconds
        #[arg(long)]
        period_ms: Option<u64>,

        /// Path to write the JSON summary
        #[arg(long)]
        summary: Option<PathBuf>,

        /// Path to write the full metrics JSON
        #[arg(long)]
        metrics_file: Option<PathBuf>,
    },

    /// Print a generated network as an edge list
    Topology {
        /// Wiring to generate
        #[arg(short, long, value_enum, default_value = "erdos-renyi")]
        kind: GraphKind,

        /// Number of nodes
        #[arg(short, long, default_value = "10")]
        nodes: usize,

        /// Erdős–Rényi edge probability
        #[arg(short, long, default_value = "0.1")]
        probability: f64,

        /// Random seed
        #[arg(long, default_value = "42")]
        seed: u64,

        /// Write to this file instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// List predefined scenarios
    List,
}

#[derive(Clone, Copy, ValueEnum)]
enum GraphKind {
    Complete,
    Ring,
    ErdosRenyi,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };

    fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(io::stderr)
        .init();

    match cli.command {
        Commands::Run {
            scenario,
            config,
            nodes,
            cycles,
            probability,
            seed,
            output,
            debug,
            period_ms,
            summary,
            metrics_file,
        } => {
            let mut base = match config {
                Some(path) => {
                    info!("Loading config from: {}", path.display());
                    SimConfig::from_file(&path)?
                }
                None => SimConfig::default(),
            };
            if let Some(nodes) = nodes {
                base = base.with_nodes(nodes);
            }
            if let Some(cycles) = cycles {
                base = base.with_cycles(cycles);
            }
            if let Some(seed) = seed {
                base = base.with_seed(seed);
            }
            if let Some(p) = probability {
                base = base.with_topology(TopologyKind::ErdosRenyi { p });
            }

            let scenario_config = scenarios::get_scenario(&scenario)?;
            info!(
                "Running scenario: {} ({})",
                scenario_config.name, scenario_config.description
            );

            let results = match period_ms {
                Some(ms) => {
                    let started = Instant::now();
                    let config = scenario_config.apply(base);
                    let cycles = config.cycles;
                    let mut sim = Simulation::new(config)?;
                    sim.run_paced(Duration::from_millis(ms), cycles).await?;
                    ScenarioResults::collect(&scenario_config.name, &mut sim, started)?
                }
                None => scenarios::run_scenario(&scenario_config, base)?,
            };

            match &output {
                Some(path) => {
                    let writer = BufWriter::new(File::create(path)?);
                    results.metrics.write_csv(writer, debug)?;
                    info!("CSV written to: {}", path.display());
                }
                None => {
                    for row in &results.metrics.rows {
                        println!("{}\t{:.6}\t{:.2}", row.cycle, row.mse, row.discrepancy);
                    }
                }
            }

            if let Some(path) = &summary {
                let json = serde_json::json!({
                    "scenario": results.scenario,
                    "timestamp": chrono::Utc::now().to_rfc3339(),
                    "nodes": results.nodes,
                    "edges": results.edges,
                    "cycles": results.cycles,
                    "initial_total": results.initial_total,
                    "final_total": results.final_total,
                    "conserved": results.conserved,
                    "duration_ms": results.duration_ms,
                    "final": results.final_stats,
                    "counters": results.counters,
                });
                std::fs::write(path, serde_json::to_string_pretty(&json)?)?;
                info!("Summary written to: {}", path.display());
            }

            if let Some(path) = &metrics_file {
                std::fs::write(path, results.metrics.export_json(&results.scenario))?;
                info!("Metrics written to: {}", path.display());
            }

            let counters = results.counters;
            eprintln!("\nScenario {}:", results.scenario);
            eprintln!("  Network: {} nodes, {} edges", results.nodes, results.edges);
            if let Some(stats) = results.final_stats {
                eprintln!(
                    "  Final MSE {:.6}, discrepancy {:.2}",
                    stats.mse, stats.discrepancy
                );
            }
            eprintln!(
                "  Messages: {} proposals, {} acks, {} dropped, {} stray",
                counters.proposals, counters.acks, counters.dropped, counters.stray
            );
            eprintln!(
                "  Load: {} -> {} ({})",
                results.initial_total,
                results.final_total,
                if results.conserved { "conserved" } else { "NOT conserved" }
            );

            if results.lossless && !results.conserved {
                std::process::exit(1);
            }
        }

        Commands::Topology {
            kind,
            nodes,
            probability,
            seed,
            output,
        } => {
            let kind = match kind {
                GraphKind::Complete => TopologyKind::Complete,
                GraphKind::Ring => TopologyKind::Ring,
                GraphKind::ErdosRenyi => TopologyKind::ErdosRenyi { p: probability },
            };
            let config = SimConfig::default().with_nodes(nodes).with_topology(kind.clone());
            config.validate()?;

            let graph = kind.build(nodes, &mut StdRng::seed_from_u64(seed));
            info!("Generated {} nodes, {} edges", graph.size(), graph.edge_count());

            match output {
                Some(path) => {
                    graph.write_edge_list(BufWriter::new(File::create(&path)?))?;
                    info!("Edge list written to: {}", path.display());
                }
                None => {
                    let stdout = io::stdout();
                    let mut lock = stdout.lock();
                    graph.write_edge_list(&mut lock)?;
                    lock.flush()?;
                }
            }
        }

        Commands::List => {
            println!("Scenarios:");
            for name in scenarios::list_scenarios() {
                let scenario = scenarios::get_scenario(name)?;
                println!("  {:<12} {}", name, scenario.description);
            }
        }
    }

    Ok(())
}
