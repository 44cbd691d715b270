//! Ayni CLI - Command-line interface for the reciprocity guard

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context};
use ayni_core::{AyniConfig, AyniGuard, MultiNeutrosophicPrompt};
use ayni_council::ReplayClient;
use clap::Parser;
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "ayni")]
#[command(about = "Ayni - Reciprocity assessment for layered prompts")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(clap::Subcommand)]
enum Commands {
    /// Score a prompt whose layers already carry evaluations
    Score {
        /// Prompt JSON file
        prompt: PathBuf,
        /// Configuration file path
        #[arg(short, long)]
        config: Option<PathBuf>,
    },
    /// Run the Fire Circle over a prompt with a replay script
    Circle {
        /// Prompt JSON file
        prompt: PathBuf,
        /// Replay script JSON file
        #[arg(short, long)]
        script: PathBuf,
        /// Configuration file path
        #[arg(short, long)]
        config: Option<PathBuf>,
        /// Participant ids (defaults to the config, then the script)
        #[arg(short, long, value_delimiter = ',')]
        participants: Vec<String>,
    },
    /// Check configuration validity
    Check {
        /// Configuration file path
        #[arg(short, long, default_value = "config/ayni.toml")]
        config: PathBuf,
    },
}

fn load_config(path: Option<&Path>) -> anyhow::Result<AyniConfig> {
    match path {
        Some(path) => AyniConfig::load(path)
            .with_context(|| format!("loading config {}", path.display())),
        None => Ok(AyniConfig::default()),
    }
}

fn load_prompt(path: &Path) -> anyhow::Result<MultiNeutrosophicPrompt> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("reading prompt {}", path.display()))?;
    serde_json::from_str(&text).with_context(|| format!("parsing prompt {}", path.display()))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Some(Commands::Score { prompt, config }) => {
            let config = load_config(config.as_deref())?;
            let prompt = load_prompt(&prompt)?;
            let metrics = config
                .scoring
                .scorer()
                .score(&prompt)
                .context("scoring prompt")?;
            println!("{}", serde_json::to_string_pretty(&metrics)?);
        }
        Some(Commands::Circle {
            prompt,
            script,
            config,
            participants,
        }) => {
            let config = load_config(config.as_deref())?;
            let mut prompt = load_prompt(&prompt)?;
            let client = ReplayClient::from_file(&script)
                .with_context(|| format!("loading replay script {}", script.display()))?;

            let participants = if !participants.is_empty() {
                participants
            } else if !config.circle.participants.is_empty() {
                config.circle.participants.clone()
            } else {
                client.participants()
            };
            if participants.is_empty() {
                bail!("no participants given and none found in config or script");
            }
            debug!(?participants, "participants resolved");

            let guard = AyniGuard::new(config, Arc::new(client))?;
            let assessment = guard
                .assess(&mut prompt, &participants, None)
                .await
                .context("assessing prompt")?;
            println!("{}", serde_json::to_string_pretty(&assessment)?);
        }
        Some(Commands::Check { config }) => {
            let loaded = AyniConfig::load(&config)
                .with_context(|| format!("checking config {}", config.display()))?;
            info!(path = %config.display(), "configuration valid");
            println!("Config OK: {}", config.display());
            println!(
                "  circle: {} rounds, {} mode, min {} participants, baseline {}",
                loaded.circle.max_rounds,
                loaded.circle.failure_mode,
                loaded.circle.min_viable_participants,
                loaded.circle.baseline_template
            );
            println!(
                "  scoring: negotiation threshold {:.2}",
                loaded.scoring.negotiation_threshold
            );
        }
        None => {
            println!("Ayni v{} - Use --help for commands", env!("CARGO_PKG_VERSION"));
        }
    }

    Ok(())
}
