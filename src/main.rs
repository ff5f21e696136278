use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, ValueEnum};

use abacus::consts::{DEFAULT_DEADLINE, DEFAULT_MODEL};
use abacus::engine::{AnalysisEngine, Engine, EngineConfig, Request};
use abacus::handlers::acquire::HttpFetcher;
use abacus::handlers::visualize::BitmapRenderer;
use abacus::normalize::UploadedPart;
use abacus::oracle::Oracle;
use abacus::oracle::anthropic::AnthropicOracle;
use abacus::oracle::mock::NullOracle;

#[derive(Debug, Clone, ValueEnum)]
enum Provider {
    Anthropic,
    /// No reasoning collaborator; every task degrades to the echo plan.
    Offline,
}

#[derive(Parser)]
#[command(name = "abacus", version, about = "Counted answers from plain words.")]
struct Cli {
    /// The analysis task, inline
    #[arg(short, long, conflicts_with = "task_file")]
    task: Option<String>,

    /// Read the analysis task from a file
    #[arg(long)]
    task_file: Option<PathBuf>,

    /// Data part as name=path; repeatable
    #[arg(short, long = "data", value_name = "NAME=PATH")]
    data: Vec<String>,

    /// LLM provider
    #[arg(short, long, value_enum, default_value_t = Provider::Anthropic)]
    provider: Provider,

    /// Model name (ignored for offline)
    #[arg(long)]
    model: Option<String>,

    /// Total wall-clock budget in seconds
    #[arg(long, default_value_t = DEFAULT_DEADLINE.as_secs())]
    deadline_secs: u64,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "abacus=info".into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    // a request that cannot even be read gets the fixed error shape
    let (task, parts) = match read_request(&cli) {
        Ok(request) => request,
        Err(e) => {
            println!(
                "{}",
                serde_json::to_string_pretty(&abacus::assemble::Response::error(e.to_string()))?
            );
            std::process::exit(1);
        }
    };

    let oracle: Arc<dyn Oracle> = match cli.provider {
        Provider::Anthropic => {
            if cli.model.is_none() {
                tracing::debug!(model = DEFAULT_MODEL, "using default model");
            }
            Arc::new(AnthropicOracle::new(cli.model)?)
        }
        Provider::Offline => {
            if cli.model.is_some() {
                eprintln!("warning: --model is ignored for offline provider");
            }
            Arc::new(NullOracle)
        }
    };

    let config = EngineConfig {
        deadline: Duration::from_secs(cli.deadline_secs),
        ..EngineConfig::default()
    };

    let engine = AnalysisEngine::new(
        oracle,
        Arc::new(HttpFetcher::new()),
        Arc::new(BitmapRenderer),
        config,
    );

    let response = engine.run(Request { task, parts }).await;
    println!("{}", serde_json::to_string_pretty(&response)?);
    Ok(())
}

fn read_request(cli: &Cli) -> anyhow::Result<(String, Vec<UploadedPart>)> {
    let task = match (&cli.task, &cli.task_file) {
        (Some(task), _) => task.clone(),
        (None, Some(path)) => std::fs::read_to_string(path)?,
        (None, None) => anyhow::bail!("provide a task with --task or --task-file"),
    };

    let mut parts = Vec::new();
    for spec in &cli.data {
        let Some((name, path)) = spec.split_once('=') else {
            anyhow::bail!("--data wants NAME=PATH, got '{spec}'");
        };
        let bytes = std::fs::read(path)?;
        parts.push(UploadedPart::new(name, bytes));
    }
    Ok((task, parts))
}
