use anyhow::{bail, Context};
use clap::{Args, Parser, Subcommand};
use serde::Serialize;
use serde_json::{Map, Value};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing::{debug, error, trace};
use tracing_subscriber::EnvFilter;

use seqplan::config::{parse_override_value, ConfigLoader, ConfigStore};
use seqplan::plan::{Domain, Plan, PlanStep};
use seqplan::{EngineError, Runtime};

/// Plan and run sequential workflows
#[derive(Parser)]
#[command(name = "seqplan", version)]
#[command(about = "Sequential workflow planning and execution", long_about = None)]
struct Cli {
    /// Enable verbose output (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Configuration file (TOML, YAML or JSON)
    #[arg(short = 'c', long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Args, Default)]
struct ParamArgs {
    /// Planner parameter as key=value; values are parsed as JSON when possible
    #[arg(short = 'p', long = "param", value_name = "KEY=VALUE")]
    params: Vec<String>,

    /// JSON file with an object of planner parameters
    #[arg(long = "params", value_name = "FILE")]
    params_file: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Create a plan for a domain and print it
    Plan {
        /// cicd, data or documentation
        domain: String,

        #[command(flatten)]
        params: ParamArgs,

        /// Write JSON here instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Create a plan for a domain (or load one) and execute it
    Run {
        /// cicd, data or documentation; ignored with --plan
        domain: Option<String>,

        #[command(flatten)]
        params: ParamArgs,

        /// Execute an existing plan document
        #[arg(long, value_name = "FILE", conflicts_with = "domain")]
        plan: Option<PathBuf>,

        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Generate a plan for a natural-language goal
    Goal {
        goal: String,

        /// Number of initial steps
        #[arg(short = 'n', long)]
        steps: Option<usize>,

        /// Execute the plan after generating it
        #[arg(long)]
        execute: bool,

        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Extend a list of steps with the next steps
    Continue {
        /// JSON file with a step array or a plan document
        #[arg(long, value_name = "FILE")]
        steps: PathBuf,

        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Check a plan document for dangling, duplicate or circular dependencies
    Validate { plan: PathBuf },
}

fn init_tracing(verbose: u8, configured: Option<&str>) {
    let filter = match verbose {
        0 => EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(configured.unwrap_or("info"))),
        1 => EnvFilter::new("debug"),
        _ => EnvFilter::new("trace"),
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(verbose >= 2)
        .with_writer(std::io::stderr)
        .init();
}

fn collect_params(args: &ParamArgs) -> anyhow::Result<Map<String, Value>> {
    let mut params = match &args.params_file {
        Some(path) => {
            let content = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read parameters from {}", path.display()))?;
            match serde_json::from_str(&content)
                .with_context(|| format!("Invalid JSON in {}", path.display()))?
            {
                Value::Object(map) => map,
                _ => bail!("Parameter file {} must hold a JSON object", path.display()),
            }
        }
        None => Map::new(),
    };
    for raw in &args.params {
        let Some((key, value)) = raw.split_once('=') else {
            bail!("Invalid parameter '{}': expected KEY=VALUE", raw);
        };
        params.insert(key.trim().to_string(), parse_override_value(value));
    }
    Ok(params)
}

fn emit<T: Serialize>(value: &T, output: Option<&Path>) -> anyhow::Result<()> {
    let json = serde_json::to_string_pretty(value)?;
    match output {
        Some(path) => {
            if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                std::fs::create_dir_all(parent)?;
            }
            std::fs::write(path, json)
                .with_context(|| format!("Failed to write {}", path.display()))?;
            debug!(path = %path.display(), "Wrote output");
        }
        None => println!("{}", json),
    }
    Ok(())
}

/// A step array, or the steps of a plan document
fn read_steps(path: &Path) -> anyhow::Result<Vec<PlanStep>> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    let value: Value = serde_json::from_str(&content)
        .with_context(|| format!("Invalid JSON in {}", path.display()))?;
    let steps = match value {
        Value::Object(mut map) if map.contains_key("steps") => map.remove("steps").unwrap_or_default(),
        other => other,
    };
    serde_json::from_value(steps).with_context(|| format!("No step list in {}", path.display()))
}

async fn run(cli: Cli, store: ConfigStore) -> anyhow::Result<ExitCode> {
    let runtime = Runtime::from_config(store)?;

    match cli.command {
        Commands::Plan {
            domain,
            params,
            output,
        } => {
            let domain: Domain = domain.parse()?;
            let plan = runtime.create_plan(domain, &collect_params(&params)?)?;
            emit(&plan, output.as_deref())?;
        }
        Commands::Run {
            domain,
            params,
            plan,
            output,
        } => {
            let plan = match (plan, domain) {
                (Some(path), _) => Plan::from_json_file(&path).await?,
                (None, Some(domain)) => {
                    runtime.create_plan(domain.parse()?, &collect_params(&params)?)?
                }
                (None, None) => bail!("Either a domain or --plan is required"),
            };
            let report = runtime.execute(plan).await?;
            emit(&report, output.as_deref())?;
            if !report.succeeded() {
                return Ok(ExitCode::FAILURE);
            }
        }
        Commands::Goal {
            goal,
            steps,
            execute,
            output,
        } => {
            let plan = runtime.plan_goal(&goal, steps).await?;
            if execute {
                let report = runtime.execute(plan).await?;
                let summary = runtime.summarize(&report).await;
                eprintln!("{}", summary);
                emit(&report, output.as_deref())?;
                if !report.succeeded() {
                    return Ok(ExitCode::FAILURE);
                }
            } else {
                emit(&plan, output.as_deref())?;
            }
        }
        Commands::Continue { steps, output } => {
            let current = read_steps(&steps)?;
            let next = runtime.continue_planning(&current).await?;
            emit(&next, output.as_deref())?;
        }
        Commands::Validate { plan } => {
            let plan = Plan::from_json_file(&plan).await?;
            println!(
                "Plan '{}' is valid: {} step(s), domain {}",
                plan.name,
                plan.steps.len(),
                plan.domain
            );
        }
    }
    Ok(ExitCode::SUCCESS)
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let cwd = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."));
    let store = match ConfigLoader::load(cli.config.as_deref(), &cwd).await {
        Ok(store) => store,
        Err(e) => {
            eprintln!("Error: {}", e.user_message());
            return ExitCode::from(e.exit_code() as u8);
        }
    };
    init_tracing(cli.verbose, store.engine_settings().log_level.as_deref());
    trace!("Full CLI args: {:?}", std::env::args().collect::<Vec<_>>());

    match run(cli, store).await {
        Ok(code) => code,
        Err(e) => {
            error!("Fatal error: {:#}", e);
            match e.downcast_ref::<EngineError>() {
                Some(engine) => {
                    eprintln!("Error: {}", engine.user_message());
                    ExitCode::from(engine.exit_code() as u8)
                }
                None => {
                    eprintln!("Error: {:#}", e);
                    ExitCode::FAILURE
                }
            }
        }
    }
}
