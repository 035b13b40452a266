use actionflow::app::{handle_fatal_error, init_logging, AppConfig};
use actionflow::{FlowConfig, FlowRunner, FlowService};
use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Run declarative YAML pipelines
#[derive(Parser)]
#[command(name = "actionflow")]
#[command(about = "actionflow - Run declarative YAML pipelines", long_about = None)]
#[command(version)]
struct Cli {
    /// Enable verbose output (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Engine configuration file (TOML)
    #[arg(short = 'c', long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a flow document
    #[command(name = "run")]
    Run {
        /// Flow document to execute
        flow: PathBuf,

        /// Record every snapshot step
        #[arg(long)]
        debug: bool,

        /// Print the run report as JSON on stdout
        #[arg(long)]
        report: bool,
    },

    /// List the built-in action handlers
    #[command(name = "handlers")]
    Handlers,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let app_config = match AppConfig::new(cli.verbose) {
        Ok(config) => config.with_config_file(cli.config.clone()),
        Err(e) => handle_fatal_error(e, cli.verbose),
    };
    init_logging(&app_config);

    if let Err(e) = run(cli.command, &app_config).await {
        handle_fatal_error(e, cli.verbose);
    }
}

async fn run(command: Commands, app_config: &AppConfig) -> Result<()> {
    let config = load_config(app_config.config_file.as_deref()).await?;

    match command {
        Commands::Run {
            flow,
            debug,
            report,
        } => {
            let config = FlowConfig {
                debug: config.debug || debug,
                ..config
            };
            run_flow(&app_config.working_dir.join(flow), config, report).await
        }
        Commands::Handlers => {
            let service = FlowService::new(config)?;
            let registry = service.registry();
            for id in registry.list() {
                let aliases = registry
                    .find(&id)
                    .map(|handler| handler.metadata().aliases.join(", "))
                    .unwrap_or_default();
                println!("{id} [{aliases}]");
            }
            Ok(())
        }
    }
}

async fn load_config(path: Option<&Path>) -> Result<FlowConfig> {
    let config = match path {
        Some(path) => FlowConfig::load(path)
            .await
            .with_context(|| format!("Failed to load config {}", path.display()))?,
        None => FlowConfig::default(),
    };
    Ok(config.with_env_overrides())
}

async fn run_flow(path: &Path, config: FlowConfig, print_report: bool) -> Result<()> {
    debug!("Running {} with {:?}", path.display(), config);
    let runner = FlowRunner::new(FlowService::new(config)?);
    let report = runner.run_file(path, runner.new_context()).await?;

    if print_report {
        println!("{}", serde_json::to_string_pretty(&report)?);
    }

    report.into_result()?;
    Ok(())
}
