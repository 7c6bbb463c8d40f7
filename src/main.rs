//! Valet CLI - ensure, verify and tear down Kubernetes environments

use std::path::{Path, PathBuf};

use clap::{Args, Parser, Subcommand};
use colored::Colorize;
use tokio_util::sync::CancellationToken;
use tracing::warn;

use valet::error::{FixSuggestion, ValetError};
use valet::{loader, EnsureConfig, GlobalConfig, Values, Workflow, WorkflowContext};

#[derive(Parser)]
#[command(name = "valet")]
#[command(about = "Valet - declarative ensure engine for Kubernetes environments")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Ensure the applications and steps of a config file
    Ensure {
        /// Path to the ensure config
        #[arg(short, long)]
        file: PathBuf,

        #[command(flatten)]
        overrides: Overrides,
    },

    /// Tear down what a config file ensured
    Teardown {
        /// Path to the ensure config
        #[arg(short, long)]
        file: PathBuf,

        #[command(flatten)]
        overrides: Overrides,
    },

    /// Print the objects the applications of a config file would apply
    Render {
        /// Path to the ensure config
        #[arg(short, long)]
        file: PathBuf,

        #[command(flatten)]
        overrides: Overrides,
    },

    /// Run a workflow file
    Run {
        /// Path to the workflow file
        file: PathBuf,

        #[command(flatten)]
        overrides: Overrides,
    },

    /// Validate a config or workflow file (parse only)
    Validate {
        /// Path to the file
        file: PathBuf,
    },
}

#[derive(Args)]
struct Overrides {
    /// Value override (KEY=VALUE); wins over values in files
    #[arg(long = "set", value_parser = parse_key_value)]
    set: Vec<(String, String)>,

    /// Kubeconfig passed to kubectl and helm
    #[arg(long)]
    kubeconfig: Option<String>,
}

fn parse_key_value(raw: &str) -> Result<(String, String), String> {
    match raw.split_once('=') {
        Some((key, value)) if !key.is_empty() => Ok((key.to_string(), value.to_string())),
        _ => Err(format!("expected KEY=VALUE, got '{}'", raw)),
    }
}

#[tokio::main]
async fn main() {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Ensure { file, overrides } => ensure(&file, overrides).await,
        Commands::Teardown { file, overrides } => teardown(&file, overrides).await,
        Commands::Render { file, overrides } => render(&file, overrides).await,
        Commands::Run { file, overrides } => run_workflow(&file, overrides).await,
        Commands::Validate { file } => validate(&file).await,
    };

    if let Err(e) = result {
        eprintln!("{} {}", "Error:".red().bold(), e);
        if let Some(suggestion) = e.fix_suggestion() {
            eprintln!("  {} {}", "Fix:".yellow(), suggestion);
        }
        std::process::exit(1);
    }
}

/// Local context with CLI values; cancelled on Ctrl-C
fn context(overrides: Overrides) -> Result<WorkflowContext, ValetError> {
    let global = GlobalConfig::load()?;
    let cancel = CancellationToken::new();
    tokio::spawn({
        let cancel = cancel.clone();
        async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("Interrupted, stopping");
                cancel.cancel();
            }
        }
    });
    let values: Values = overrides.set.into_iter().collect();
    Ok(WorkflowContext::local(&global, overrides.kubeconfig, cancel)?.with_values(values))
}

async fn ensure(file: &Path, overrides: Overrides) -> Result<(), ValetError> {
    let config = EnsureConfig::load(file).await?;
    let ctx = context(overrides)?;
    config.ensure(&ctx).await?;
    println!("{} Ensured '{}'", "✓".green(), file.display());
    Ok(())
}

async fn teardown(file: &Path, overrides: Overrides) -> Result<(), ValetError> {
    let config = EnsureConfig::load(file).await?;
    let ctx = context(overrides)?;
    config.teardown(&ctx).await?;
    println!("{} Tore down '{}'", "✓".green(), file.display());
    Ok(())
}

async fn render(file: &Path, overrides: Overrides) -> Result<(), ValetError> {
    let config = EnsureConfig::load(file).await?;
    let ctx = context(overrides)?;
    let objects = config.render(&ctx).await?;
    print!("{}", loader::to_yaml_stream(&objects)?);
    Ok(())
}

async fn run_workflow(file: &Path, overrides: Overrides) -> Result<(), ValetError> {
    let workflow = Workflow::load(file).await?;
    println!(
        "{} Running {} steps from {}",
        "→".cyan(),
        workflow.steps.len().to_string().cyan().bold(),
        file.display()
    );
    let ctx = context(overrides)?;
    workflow.run(&ctx).await?;
    println!("{} Workflow '{}' passed", "✓".green(), file.display());
    Ok(())
}

async fn validate(file: &Path) -> Result<(), ValetError> {
    let config = EnsureConfig::load(file).await?;

    println!("{} '{}' is valid", "✓".green(), file.display());
    if let Some(cluster) = &config.cluster {
        println!("  Cluster: {}", cluster.cluster_type);
    }
    println!("  Values: {}", config.values.len());
    println!("  Applications: {}", config.applications.len());
    println!("  Steps: {}", config.steps.len());

    Ok(())
}
