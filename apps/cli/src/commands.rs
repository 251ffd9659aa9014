//! CLI command definitions, routing, and tracing setup.

use std::sync::Arc;

use clap::{Parser, Subcommand};
use color_eyre::eyre::{Result, eyre};
use indicatif::{ProgressBar, ProgressStyle};
use mediq_capabilities::{GroqClient, HttpEmbedder, PromptStore};
use mediq_core::{PipelineEngine, PipelineObserver, StagePhase};
use mediq_index::PassageStore;
use mediq_shared::{AppConfig, Mode, PipelineState, init_config, load_config};
use tracing::{info, warn};

// ---------------------------------------------------------------------------
// CLI structure
// ---------------------------------------------------------------------------

/// MedIQ — grounded answers about medicines from indexed CMI/PI documents.
#[derive(Parser)]
#[command(
    name = "mediq",
    version,
    about = "Ask questions about medicines, answered from indexed CMI/PI documents.",
    long_about = None,
)]
pub(crate) struct Cli {
    /// Log format: text (default) or json.
    #[arg(long, default_value = "text", global = true)]
    pub log_format: LogFormat,

    /// Verbosity level (-v, -vv, -vvv).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Command,
}

/// Log output format.
#[derive(Clone, Debug, clap::ValueEnum)]
pub(crate) enum LogFormat {
    Text,
    Json,
}

/// Top-level CLI subcommands.
#[derive(Subcommand)]
pub(crate) enum Command {
    /// Ask a question about a medicine.
    Ask {
        /// The question to answer.
        query: String,

        /// Pipeline mode: light or advanced (defaults to config).
        #[arg(short, long)]
        mode: Option<Mode>,

        /// Print the full pipeline state as JSON instead of formatted text.
        #[arg(long)]
        json: bool,
    },

    /// Inspect the passage index.
    Index {
        /// Index subcommand.
        #[command(subcommand)]
        action: IndexAction,
    },

    /// Configuration management.
    Config {
        /// Config subcommand.
        #[command(subcommand)]
        action: ConfigAction,
    },
}

/// Index subcommands.
#[derive(Subcommand)]
pub(crate) enum IndexAction {
    /// Show index location, document count, and vector dimension.
    Stats,
}

/// Config subcommands.
#[derive(Subcommand)]
pub(crate) enum ConfigAction {
    /// Initialize config file with defaults.
    Init,
    /// Show resolved configuration.
    Show,
}

// ---------------------------------------------------------------------------
// Tracing setup
// ---------------------------------------------------------------------------

/// Initialize tracing based on CLI flags.
pub(crate) fn init_tracing(cli: &Cli) {
    use tracing_subscriber::{EnvFilter, fmt};

    let filter = match cli.verbose {
        0 => "mediq=info",
        1 => "mediq=debug",
        _ => "mediq=trace",
    };

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(filter));

    match cli.log_format {
        LogFormat::Text => {
            fmt()
                .with_env_filter(env_filter)
                .with_target(false)
                .init();
        }
        LogFormat::Json => {
            fmt()
                .json()
                .with_env_filter(env_filter)
                .init();
        }
    }
}

// ---------------------------------------------------------------------------
// Command dispatch
// ---------------------------------------------------------------------------

/// Run the CLI command.
pub(crate) async fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Command::Ask { query, mode, json } => cmd_ask(&query, mode, json).await,
        Command::Index { action } => match action {
            IndexAction::Stats => cmd_index_stats().await,
        },
        Command::Config { action } => match action {
            ConfigAction::Init => cmd_config_init().await,
            ConfigAction::Show => cmd_config_show().await,
        },
    }
}

// ---------------------------------------------------------------------------
// ask
// ---------------------------------------------------------------------------

async fn cmd_ask(query: &str, mode: Option<Mode>, json: bool) -> Result<()> {
    let config = load_config()?;

    let mode = match mode {
        Some(mode) => mode,
        None => config
            .defaults
            .mode
            .parse()
            .map_err(|e: String| eyre!("config [defaults].mode: {e}"))?,
    };

    let prompts = PromptStore::new(&config.defaults.prompts_dir);
    let groq = GroqClient::new(&config.groq, &prompts)?;
    let embedder = HttpEmbedder::new(&config.embeddings)?;
    let store = Arc::new(PassageStore::load(&config.retrieval.index_dir)?);
    if !store.is_available() {
        warn!(
            index_dir = %config.retrieval.index_dir,
            "passage index not found; retrieval will return nothing"
        );
    }

    let engine = PipelineEngine::new(
        groq.clone(),
        groq.clone(),
        embedder,
        groq,
        store,
        &prompts,
        &config,
    );

    info!(mode = %mode, "running query");

    let state = if json {
        engine.run(query, mode).await
    } else {
        let observer = SpinnerObserver::new();
        engine.run_with_observer(query, mode, &observer).await
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&state)?);
    } else {
        render(&state);
    }

    Ok(())
}

// ---------------------------------------------------------------------------
// Spinner observer
// ---------------------------------------------------------------------------

/// Maps pipeline stage events onto an indicatif spinner.
struct SpinnerObserver {
    spinner: ProgressBar,
}

impl SpinnerObserver {
    fn new() -> Self {
        let spinner = ProgressBar::new_spinner();
        spinner.set_style(
            ProgressStyle::with_template("{spinner:.cyan} {msg}")
                .unwrap()
                .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"]),
        );
        spinner.enable_steady_tick(std::time::Duration::from_millis(80));
        Self { spinner }
    }
}

fn stage_title(stage: &str) -> &'static str {
    match stage {
        "moderation" => "Checking query safety",
        "drug_detection" => "Detecting medicine names",
        "retrieval" => "Searching indexed documents",
        "summary_writing" => "Writing summary",
        "reflection" => "Reviewing draft",
        "revision" => "Revising summary",
        "response_building" => "Assembling answer",
        _ => "Working",
    }
}

impl PipelineObserver for SpinnerObserver {
    fn stage(&self, stage: &str, phase: StagePhase, label: Option<&str>) {
        if stage == "workflow" {
            if phase == StagePhase::End {
                self.spinner.finish_and_clear();
            }
            return;
        }
        match (phase, label) {
            (StagePhase::Start, _) => self.spinner.set_message(stage_title(stage).to_string()),
            (StagePhase::End, Some(label)) => self
                .spinner
                .set_message(format!("{} ({label})", stage_title(stage))),
            (StagePhase::End, None) => {}
        }
    }
}

// ---------------------------------------------------------------------------
// Rendering
// ---------------------------------------------------------------------------

fn render(state: &PipelineState) {
    let Some(answer) = &state.answer else {
        return;
    };

    println!();
    if let Some(decision) = &state.decision {
        if decision.allow() {
            if let Some(message) = &decision.message {
                println!("  {message}");
                println!();
            }
        }
    }
    if !state.detected_names.is_empty() {
        println!("  Medicines: {}", state.detected_names.join(", "));
        println!();
    }

    if let Some(summary) = &answer.summary_text {
        println!("{summary}");
    }

    // When the advanced pass actually changed the draft, show what it
    // started from.
    if let (Some(revised), Some(draft)) = (&state.revised_summary, &state.draft_summary) {
        if revised != draft {
            println!();
            println!("  Initial draft:");
            println!("{draft}");
        }
    }

    if !answer.bullets.is_empty() {
        println!();
        println!("  Highlights:");
        for bullet in &answer.bullets {
            let mut suffix = format!(" (similarity {:.2}", bullet.score);
            if let Some(drug) = &bullet.drug_name {
                suffix.push_str(&format!("; {drug}"));
            }
            if let Some(ingredients) = &bullet.active_ingredients {
                if !ingredients.is_empty() {
                    suffix.push_str(&format!("; {}", ingredients.join(", ")));
                }
            }
            suffix.push(')');
            println!("  - {}{suffix}", bullet.text);
        }
    }

    let mut seen_urls: Vec<&str> = Vec::new();
    let sources: Vec<String> = answer
        .citations
        .iter()
        .filter(|c| !c.url.is_empty())
        .filter(|c| {
            if seen_urls.contains(&c.url.as_str()) {
                false
            } else {
                seen_urls.push(&c.url);
                true
            }
        })
        .map(|c| {
            if c.section.is_empty() {
                c.url.clone()
            } else {
                format!("{} ({})", c.url, c.section)
            }
        })
        .collect();
    if !sources.is_empty() {
        println!();
        println!("  Sources:");
        for source in sources {
            println!("  - {source}");
        }
    }

    println!();
    println!("  {}", answer.disclaimer);

    if let Some(err) = &state.last_stage_error {
        println!(
            "  Note: the {} stage was degraded ({}); this answer may be incomplete.",
            err.stage,
            err.kind.as_str()
        );
    }

    println!("  ({} mode, {:.1}s)", state.mode, state.elapsed_ms as f64 / 1000.0);
}

// ---------------------------------------------------------------------------
// index / config
// ---------------------------------------------------------------------------

async fn cmd_index_stats() -> Result<()> {
    let config = load_config()?;
    let store = PassageStore::load(&config.retrieval.index_dir)?;

    println!("  Index:      {}", store.index_dir().display());
    if store.is_available() {
        println!("  Documents:  {}", store.len());
        println!("  Dimension:  {}", store.dim());
    } else {
        println!("  Status:     not built (docs.jsonl / vectors.jsonl missing)");
    }
    Ok(())
}

async fn cmd_config_init() -> Result<()> {
    let path = init_config()?;
    println!("Config initialized at: {}", path.display());
    Ok(())
}

async fn cmd_config_show() -> Result<()> {
    let config: AppConfig = load_config()?;
    let toml_str = toml::to_string_pretty(&config)?;
    println!("{toml_str}");
    Ok(())
}
