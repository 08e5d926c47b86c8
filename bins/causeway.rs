//! Causal discovery → estimation → refutation CLI
//!
//! Usage:
//!   causeway methods --data data.csv --mapping mapping.toml
//!   causeway discover --data data.csv --mapping mapping.toml --knowledge knowledge.json --out state.json
//!   causeway estimate --state state.json
//!   causeway refute --state state.json
//!   causeway render --state state.json --out-dir graphs --layout fdp
//!   causeway run-all --data data.csv --mapping mapping.toml --mock

use anyhow::{Context, Result};
use chrono::Utc;
use clap::{Args, Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use causeway::config::Config;
use causeway::methods::CATALOGUE;
use causeway::pipeline::Pipeline;
use causeway::problem::Problem;
use causeway::report::Layout;
use causeway::scheduler::{EventSender, StageEvent};
use causeway::storage::{
    load_dataset, load_graph, load_knowledge, load_problem, save_problem, write_summary_parquet, DatasetSpec,
};

#[derive(Parser)]
#[command(name = "causeway")]
#[command(about = "Causal discovery, effect estimation and refutation pipeline")]
struct Cli {
    #[arg(long, global = true, default_value = "config/causeway.toml")]
    config: PathBuf,
    /// Use the correlation stand-in instead of the discovery worker
    #[arg(long, global = true)]
    mock: bool,
    /// Override the configured worker count (0 = one per CPU)
    #[arg(long, global = true)]
    workers: Option<usize>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Args)]
struct ProblemArgs {
    #[arg(long)]
    data: PathBuf,
    /// TOML file naming the target and the mapped features
    #[arg(long)]
    mapping: PathBuf,
    #[arg(long)]
    knowledge: Option<PathBuf>,
    /// Ground truth graph, JSON
    #[arg(long)]
    truth: Option<PathBuf>,
    #[arg(long, default_value = "")]
    description: String,
}

#[derive(Subcommand)]
enum Commands {
    /// List discovery methods and whether they apply to a dataset
    Methods {
        #[arg(long)]
        data: Option<PathBuf>,
        #[arg(long)]
        mapping: Option<PathBuf>,
    },
    /// Run every applicable discovery method
    Discover {
        #[command(flatten)]
        problem: ProblemArgs,
        #[arg(long, default_value = "state.json")]
        out: PathBuf,
    },
    /// Estimate effects on every discovered graph
    Estimate {
        #[arg(long)]
        state: PathBuf,
        /// Defaults to overwriting the input state
        #[arg(long)]
        out: Option<PathBuf>,
    },
    /// Refute every estimated effect
    Refute {
        #[arg(long)]
        state: PathBuf,
        #[arg(long)]
        out: Option<PathBuf>,
    },
    /// Write one DOT file per discovery method
    Render {
        #[arg(long)]
        state: PathBuf,
        #[arg(long, default_value = "graphs")]
        out_dir: PathBuf,
        #[arg(long, default_value = "dot")]
        layout: String,
    },
    /// Run all stages and write state, summary and graphs
    RunAll {
        #[command(flatten)]
        problem: ProblemArgs,
        /// Defaults to runs/<timestamp>
        #[arg(long)]
        out_dir: Option<PathBuf>,
        #[arg(long, default_value = "dot")]
        layout: String,
    },
}

fn load_config(cli: &Cli) -> Result<Config> {
    let mut config = if cli.config.exists() {
        Config::load(&cli.config)?
    } else {
        warn!("Config {:?} not found, using defaults", cli.config);
        Config::default()
    };
    if cli.mock {
        config.discovery.mock = true;
    }
    if let Some(workers) = cli.workers {
        config.orchestration.max_workers = workers;
    }
    Ok(config)
}

fn build_problem(args: &ProblemArgs) -> Result<Problem> {
    let spec = DatasetSpec::load(&args.mapping)?;
    let dataset = load_dataset(&args.data, &spec)?;
    let mut problem = Problem::new(dataset).with_description(args.description.clone());
    if let Some(path) = &args.knowledge {
        problem = problem.with_knowledge(load_knowledge(path)?);
    }
    if let Some(path) = &args.truth {
        problem = problem.with_ground_truth(Some(load_graph(path)?));
    }
    Ok(problem)
}

/// Spinner driven by dispatcher events; finished when the sender side drops.
fn progress() -> (EventSender, JoinHandle<()>) {
    let (tx, mut rx) = mpsc::unbounded_channel::<StageEvent>();
    let handle = tokio::spawn(async move {
        let bar = ProgressBar::new_spinner();
        bar.set_style(
            ProgressStyle::with_template("{spinner} [{elapsed_precise}] {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner()),
        );
        bar.enable_steady_tick(Duration::from_millis(120));
        while let Some(event) = rx.recv().await {
            match event {
                StageEvent::TaskStarted { stage, task } => bar.set_message(format!("{}: started {}", stage, task)),
                StageEvent::TaskFinished { stage, task, status } => {
                    bar.println(format!("{} {} {}", stage, task, status))
                }
                StageEvent::KeepAlive {
                    stage,
                    completed,
                    pending,
                } => bar.set_message(format!("{}: {} done, {} pending", stage, completed, pending)),
                StageEvent::StageFinished { stage, completed, total } => {
                    bar.println(format!("{} finished: {}/{} tasks", stage, completed, total))
                }
            }
        }
        bar.finish_and_clear();
    });
    (tx, handle)
}

/// Closes the event stream and waits for the spinner to clear.
async fn finish_progress(events: EventSender, spinner: JoinHandle<()>) {
    drop(events);
    if let Err(e) = spinner.await {
        warn!("Progress display failed: {}", e);
    }
}

async fn discover(pipeline: &Pipeline, config: &Config, problem: &Problem, events: &EventSender) -> Problem {
    let mut options = config.discovery_options();
    options.events = Some(events.clone());
    pipeline.run_discovery(problem, &options).await
}

async fn estimate(pipeline: &Pipeline, config: &Config, problem: &Problem, events: &EventSender) -> Result<Problem> {
    let mut options = config.estimation_options();
    options.events = Some(events.clone());
    Ok(pipeline.run_estimation(problem, &options).await?)
}

async fn refute(pipeline: &Pipeline, config: &Config, problem: &Problem, events: &EventSender) -> Result<Problem> {
    let mut options = config.refutation_options();
    options.events = Some(events.clone());
    Ok(pipeline.run_refutation(problem, &options).await?)
}

fn render(pipeline: &Pipeline, problem: &Problem, out_dir: &Path, layout: &str) -> Result<()> {
    let layout: Layout = layout.parse()?;
    let graphs = pipeline.render(problem, layout)?;
    std::fs::create_dir_all(out_dir).with_context(|| format!("Failed to create directory: {:?}", out_dir))?;
    for (method, dot) in graphs {
        match dot {
            Some(dot) => {
                let path = out_dir.join(format!("{}.dot", method));
                std::fs::write(&path, dot).with_context(|| format!("Failed to write {:?}", path))?;
                info!("Wrote {:?}", path);
            }
            None => info!("No graph for {}", method),
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let config = load_config(&cli)?;
    let pipeline = Pipeline::new(config.registry());

    match &cli.command {
        Commands::Methods { data, mapping } => {
            let problem = match (data, mapping) {
                (Some(data), Some(mapping)) => {
                    let spec = DatasetSpec::load(mapping)?;
                    Some(Problem::new(load_dataset(data, &spec)?))
                }
                _ => None,
            };
            let applicable = problem.as_ref().map(|p| pipeline.applicable_methods(p));
            for spec in CATALOGUE.iter() {
                let status = match &applicable {
                    Some(names) if names.iter().any(|n| n == spec.name) => "applicable",
                    Some(_) => "not applicable",
                    None => "",
                };
                println!(
                    "{:<8} types={:?} gaussian={} linear={} {}",
                    spec.name, spec.accepted_types, spec.gaussian_assumption, spec.linearity_assumption, status
                );
            }
        }
        Commands::Discover { problem, out } => {
            let problem = build_problem(problem)?;
            let (events, spinner) = progress();
            let out_problem = discover(&pipeline, &config, &problem, &events).await;
            finish_progress(events, spinner).await;
            save_problem(&out_problem, out)?;
        }
        Commands::Estimate { state, out } => {
            let problem = load_problem(state)?;
            let (events, spinner) = progress();
            let result = estimate(&pipeline, &config, &problem, &events).await;
            finish_progress(events, spinner).await;
            save_problem(&result?, out.as_ref().unwrap_or(state))?;
        }
        Commands::Refute { state, out } => {
            let problem = load_problem(state)?;
            let (events, spinner) = progress();
            let result = refute(&pipeline, &config, &problem, &events).await;
            finish_progress(events, spinner).await;
            save_problem(&result?, out.as_ref().unwrap_or(state))?;
        }
        Commands::Render { state, out_dir, layout } => {
            let problem = load_problem(state)?;
            render(&pipeline, &problem, out_dir, layout)?;
        }
        Commands::RunAll {
            problem,
            out_dir,
            layout,
        } => {
            let problem = build_problem(problem)?;
            let out_dir = out_dir
                .clone()
                .unwrap_or_else(|| PathBuf::from("runs").join(Utc::now().format("%Y%m%dT%H%M%S").to_string()));
            info!(
                "Running all stages for dataset {} into {:?}",
                problem.dataset().fingerprint(),
                out_dir
            );

            let (events, spinner) = progress();
            let result = async {
                let discovered = discover(&pipeline, &config, &problem, &events).await;
                let estimated = estimate(&pipeline, &config, &discovered, &events).await?;
                refute(&pipeline, &config, &estimated, &events).await
            }
            .await;
            finish_progress(events, spinner).await;
            let finished = result?;

            save_problem(&finished, out_dir.join("state.json"))?;
            write_summary_parquet(&finished, out_dir.join("summary.parquet"))?;
            render(&pipeline, &finished, &out_dir.join("graphs"), layout)?;
        }
    }

    Ok(())
}
