//! finrisk - command-line entry point
//!
//! Reads statement lines as a JSON array, runs one analysis profile and
//! writes the analysis output as pretty JSON. Logs go to stderr so stdout
//! stays machine-readable.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use finrisk_common::config::{load_overrides, ClientConfig};
use finrisk_common::StatementLine;
use finrisk_engine::narrative::{HttpInterpreter, NarrativeInterpreter, NarrativeStage, StaticInterpreter};
use finrisk_engine::profiles::DEFAULT_PROFILE;
use finrisk_engine::{ExternalContext, Pipeline};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Command-line arguments for finrisk
#[derive(Parser, Debug)]
#[command(name = "finrisk")]
#[command(about = "Financial statement risk analysis pipeline")]
#[command(version)]
struct Args {
    /// JSON array of statement lines
    input: PathBuf,

    /// TOML file with client overrides
    #[arg(short, long, env = "FINRISK_CONFIG")]
    config: Option<PathBuf>,

    /// Analysis profile to run
    #[arg(short, long, default_value = DEFAULT_PROFILE, env = "FINRISK_PROFILE")]
    profile: String,

    /// JSON file with external context for the narrative stage
    #[arg(long)]
    context: Option<PathBuf>,

    /// Narrative service endpoint (overrides narrative.endpoint)
    #[arg(long, env = "FINRISK_NARRATIVE_ENDPOINT")]
    narrative_endpoint: Option<String>,

    /// Bearer token for the narrative service
    #[arg(long, env = "FINRISK_NARRATIVE_API_KEY", hide_env_values = true)]
    narrative_api_key: Option<String>,

    /// Answer every narrative request with this fixed text (takes precedence over the endpoint)
    #[arg(long)]
    mock_narrative: Option<String>,

    /// Write output here instead of stdout
    #[arg(short, long)]
    output: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "finrisk_engine=info,finrisk_common=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let args = Args::parse();

    let config = match &args.config {
        Some(path) => {
            let overrides = load_overrides(path)
                .with_context(|| format!("Failed to read config overrides {}", path.display()))?;
            ClientConfig::resolve(&overrides).context("Invalid client configuration")?
        }
        None => ClientConfig::default(),
    };
    let config = Arc::new(config);

    let pipeline =
        Pipeline::new(Arc::clone(&config), &args.profile).context("Failed to select analysis profile")?;

    let raw = std::fs::read_to_string(&args.input)
        .with_context(|| format!("Failed to read input {}", args.input.display()))?;
    let lines: Vec<StatementLine> =
        serde_json::from_str(&raw).context("Input must be a JSON array of statement lines")?;

    let context = match &args.context {
        Some(path) => ExternalContext::load(path)
            .with_context(|| format!("Failed to load context {}", path.display()))?,
        None => ExternalContext::default(),
    };

    let interpreter: Option<Arc<dyn NarrativeInterpreter>> = if let Some(text) = &args.mock_narrative {
        Some(Arc::new(StaticInterpreter::new(text.clone())))
    } else if let Some(endpoint) = args
        .narrative_endpoint
        .clone()
        .or_else(|| config.narrative.endpoint.clone())
    {
        let timeout = Duration::from_millis(config.narrative.timeout_ms);
        let client = HttpInterpreter::new(endpoint, args.narrative_api_key.clone(), timeout)
            .context("Failed to create narrative client")?;
        Some(Arc::new(client))
    } else {
        None
    };

    let stage = match interpreter {
        Some(interpreter) => Some(
            NarrativeStage::new(interpreter, &config.narrative)
                .context("Failed to create narrative stage")?,
        ),
        None => None,
    };

    info!(
        profile = %args.profile,
        lines = lines.len(),
        narrative = stage.is_some(),
        "Running analysis"
    );

    let output = pipeline
        .run(&lines, &context, stage.as_ref())
        .await
        .context("Analysis failed")?;

    let json = serde_json::to_string_pretty(&output).context("Failed to serialize output")?;
    match &args.output {
        Some(path) => {
            std::fs::write(path, json)
                .with_context(|| format!("Failed to write output {}", path.display()))?;
            info!(path = %path.display(), "Analysis output written");
        }
        None => println!("{}", json),
    }

    Ok(())
}
