//! Command-line front end for the promptgate completion gateway.
//!
//! Usage:
//!   promptgate status                 Show configuration and credential coverage
//!   promptgate validate <TEXT>        Run the input guard in reject mode
//!   promptgate sanitize <TEXT>        Run the input guard in redact mode
//!   promptgate check-url <URL>        Classify a URL against the focus session
//!   promptgate motivate --habits F    Stream a motivational summary as SSE
//!   promptgate metadata --list        List URLs with cached page metadata
//!   promptgate prompts check <FILE>   Parse a prompt document without installing it

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use colored::Colorize;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use promptgate::config::{self, GatewayConfig};
use promptgate::error::GatewayError;
use promptgate::features::{
    DeviceType, Gateway, HabitOption, MotivationRequest, SubtaskRequest, Tone, UrlSafetyRequest,
};
use promptgate::guard::InputGuard;
use promptgate::inference::CredentialSource;
use promptgate::telemetry::{Telemetry, TracingTelemetry};
use promptgate::types::*;

const CONFIG_FILE: &str = "promptgate.toml";

// ---------------------------------------------------------------------------
// CLI definition
// ---------------------------------------------------------------------------

#[derive(Parser, Debug)]
#[command(name = "promptgate")]
#[command(version)]
#[command(about = "Prompt-injection-defended completion gateway")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Path to the promptgate home directory (default: ~/.promptgate).
    #[arg(long)]
    home: Option<String>,

    /// Log level (debug, info, warn, error). Overrides the config file.
    #[arg(long)]
    log_level: Option<String>,

    /// Language for verdicts and user-facing error messages.
    #[arg(long, global = true, default_value = "en")]
    lang: String,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Write a default config file if none exists.
    Init,

    /// Show configuration, prompts and credential coverage.
    Status,

    /// Validate text; exits non-zero when rejected.
    Validate {
        text: String,
        #[arg(long)]
        max_length: Option<usize>,
        #[arg(long, default_value = "user_input")]
        context: String,
    },

    /// Redact injection patterns from text.
    Sanitize { text: String },

    /// Classify whether a URL fits the current focus session.
    CheckUrl {
        url: String,
        #[arg(long)]
        title: Option<String>,
        #[arg(long)]
        description: Option<String>,
        #[arg(long)]
        focus_mode: Option<String>,
        #[arg(long)]
        intention: Option<String>,
        #[arg(long)]
        task: Option<String>,
        #[arg(long)]
        justification: Option<String>,
        /// Earlier justifications in this session (repeatable).
        #[arg(long = "previous")]
        previous: Vec<String>,
    },

    /// Check a username for offensive content.
    CheckUsername { username: String },

    /// Break a task into subtasks.
    Subtasks {
        task: String,
        #[arg(long, default_value = "english")]
        language: String,
    },

    /// Convert brain-dump text (or a file with --file) into tasks.
    BrainDump {
        text: Option<String>,
        #[arg(long)]
        file: Option<PathBuf>,
    },

    /// Stream a motivational summary as server-sent events.
    Motivate {
        /// JSON file with an array of habits.
        #[arg(long)]
        habits: PathBuf,
        /// Long-term goal (repeatable).
        #[arg(long = "goal")]
        goals: Vec<String>,
        #[arg(long, value_enum, default_value_t = ToneArg::Default)]
        tone: ToneArg,
        #[arg(long, value_enum, default_value_t = DeviceArg::Mobile)]
        device: DeviceArg,
        #[arg(long, default_value = "English")]
        language: String,
    },

    /// Stream a chat reply to a single message.
    Chat {
        message: String,
        #[arg(long, default_value = "English")]
        language: String,
    },

    /// Inspect or reload prompt templates.
    Prompts {
        #[command(subcommand)]
        action: PromptAction,
    },

    /// Look up page metadata through the cache.
    Metadata {
        url: Option<String>,
        /// Only read the cache; never fetch.
        #[arg(long)]
        cached_only: bool,
        /// List every URL with a cache entry.
        #[arg(long, conflicts_with = "url")]
        list: bool,
    },
}

#[derive(Subcommand, Debug)]
enum PromptAction {
    /// List loaded prompt ids.
    List,
    /// Re-read the prompt document.
    Reload,
    /// Parse a prompt document and show what it defines.
    Check { file: PathBuf },
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum ToneArg {
    Default,
    FutureSelf,
    Factual,
}

impl From<ToneArg> for Tone {
    fn from(arg: ToneArg) -> Self {
        match arg {
            ToneArg::Default => Tone::Default,
            ToneArg::FutureSelf => Tone::FutureSelf,
            ToneArg::Factual => Tone::Factual,
        }
    }
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum DeviceArg {
    Desktop,
    Mobile,
}

impl From<DeviceArg> for DeviceType {
    fn from(arg: DeviceArg) -> Self {
        match arg {
            DeviceArg::Desktop => DeviceType::Desktop,
            DeviceArg::Mobile => DeviceType::Mobile,
        }
    }
}

// ---------------------------------------------------------------------------
// Entry point
// ---------------------------------------------------------------------------

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let home_dir = match &cli.home {
        Some(home) => PathBuf::from(shellexpand::tilde(home).into_owned()),
        None => config::default_home_dir(),
    };
    let config_path = home_dir.join(CONFIG_FILE);
    let cfg = config::load_config(&config_path)
        .with_context(|| format!("Failed to load config from {}", config_path.display()))?;

    let log_level = cli.log_level.clone().unwrap_or_else(|| cfg.log_level.clone());
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&log_level));
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    debug!("Using config {}", config_path.display());
    let telemetry: Arc<dyn Telemetry> = Arc::new(TracingTelemetry);
    let lang = cli.lang.clone();

    match cli.command {
        Commands::Init => cmd_init(&config_path),
        Commands::Status => cmd_status(&config_path, &cfg, telemetry),
        Commands::Validate {
            text,
            max_length,
            context,
        } => cmd_validate(&cfg, telemetry, &text, max_length, &context),
        Commands::Sanitize { text } => {
            println!("{}", InputGuard::new(telemetry).sanitize(&text));
            Ok(())
        }
        Commands::CheckUrl {
            url,
            title,
            description,
            focus_mode,
            intention,
            task,
            justification,
            previous,
        } => {
            let gateway = Gateway::from_config(&cfg, telemetry)?;
            let request = UrlSafetyRequest {
                url,
                meta_description: description,
                tab_title: title,
                focus_mode,
                intention,
                current_task: task,
                justification,
                last_five_justifications: previous.into_iter().rev().take(5).rev().collect(),
            };
            let verdict = gateway.check_url_safety(&request, &lang).await;
            print_json(&verdict)
        }
        Commands::CheckUsername { username } => {
            let gateway = Gateway::from_config(&cfg, telemetry)?;
            let verdict = gateway
                .check_username(&username)
                .await
                .map_err(|e| report(&gateway, &lang, e))?;
            print_json(&verdict)
        }
        Commands::Subtasks { task, language } => {
            let gateway = Gateway::from_config(&cfg, telemetry)?;
            let plan = gateway
                .create_subtasks(&SubtaskRequest { task, language })
                .await
                .map_err(|e| report(&gateway, &lang, e))?;
            print_json(&plan)
        }
        Commands::BrainDump { text, file } => {
            let contents = match (text, file) {
                (_, Some(path)) => std::fs::read_to_string(&path)
                    .with_context(|| format!("Failed to read {}", path.display()))?,
                (Some(text), None) => text,
                (None, None) => anyhow::bail!("Provide brain-dump text or --file"),
            };
            let gateway = Gateway::from_config(&cfg, telemetry)?;
            let tasks = gateway
                .convert_brain_dump(&contents)
                .await
                .map_err(|e| report(&gateway, &lang, e))?;
            print_json(&tasks)
        }
        Commands::Motivate {
            habits,
            goals,
            tone,
            device,
            language,
        } => {
            let raw = std::fs::read_to_string(&habits)
                .with_context(|| format!("Failed to read habits from {}", habits.display()))?;
            let habits: Vec<HabitOption> =
                serde_json::from_str(&raw).context("Habits file must be a JSON array of habits")?;
            let request = MotivationRequest {
                habits,
                long_term_goals: goals,
                language,
                tone: tone.into(),
                device_type: device.into(),
            };
            let gateway = Gateway::from_config(&cfg, telemetry)?;
            stream_to_stdout(&gateway, &lang, |tx, cancel| {
                gateway.motivational_summary(&request, tx, cancel)
            })
            .await
        }
        Commands::Chat { message, language } => {
            let gateway = Gateway::from_config(&cfg, telemetry)?;
            let history = vec![ChatMessage::user(message)];
            stream_to_stdout(&gateway, &lang, |tx, cancel| {
                gateway.chat_reply(&history, &language, tx, cancel)
            })
            .await
        }
        Commands::Prompts { action } => cmd_prompts(&cfg, telemetry, action),
        Commands::Metadata {
            url,
            cached_only,
            list,
        } => {
            let gateway = Gateway::from_config(&cfg, telemetry)?;
            if list {
                for url in gateway.metadata().cached_urls().await? {
                    println!("{}", url);
                }
                return Ok(());
            }
            let Some(url) = url else {
                anyhow::bail!("Provide a URL or --list");
            };
            let url = promptgate::metadata::sanitize_url(&url);
            let metadata = if cached_only {
                gateway.metadata().lookup(&url).await
            } else {
                Some(gateway.metadata().get_metadata(&url).await)
            };
            match metadata {
                Some(m) => print_json(&m),
                None => {
                    println!("{} not cached", url.dimmed());
                    Ok(())
                }
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Command implementations
// ---------------------------------------------------------------------------

fn cmd_init(config_path: &Path) -> Result<()> {
    if config_path.exists() {
        println!("Config already exists at {}", config_path.display());
        return Ok(());
    }
    config::save_config(&GatewayConfig::default(), config_path)?;
    println!(
        "{} Wrote default config to {}",
        ">>>".green().bold(),
        config_path.display()
    );
    Ok(())
}

fn cmd_status(config_path: &Path, cfg: &GatewayConfig, telemetry: Arc<dyn Telemetry>) -> Result<()> {
    let gateway = Gateway::from_config(cfg, telemetry)?;

    println!();
    println!("{}", "=== promptgate status ===".bold());
    println!();
    println!("  {}:  {}", "Config".bold(), config_path.display());
    println!("  {}:   {}", "Cache".bold(), cfg.resolved_cache_dir());
    println!(
        "  {}: {} ({} loaded)",
        "Prompts".bold(),
        cfg.resolved_prompts_path(),
        gateway.prompts().all_prompts().len()
    );
    println!();
    println!("  {}:", "Credentials".bold());
    for (purpose, source) in gateway.registry().coverage() {
        println!("    {:<24} {}", purpose.as_str(), colorize_source(source));
    }
    println!();
    println!("  {}:", "Limits".bold());
    let limits = gateway.limits();
    println!("    default:          {}", limits.default);
    println!("    long_term_goal:   {}", limits.long_term_goal);
    println!("    brain_dump:       {}", limits.brain_dump);
    println!(
        "    metadata:         {} / {}",
        limits.metadata_title, limits.metadata_description
    );
    println!();
    Ok(())
}

fn cmd_validate(
    cfg: &GatewayConfig,
    telemetry: Arc<dyn Telemetry>,
    text: &str,
    max_length: Option<usize>,
    context: &str,
) -> Result<()> {
    let guard = InputGuard::new(telemetry);
    let verdict = guard.validate(text, max_length.unwrap_or(cfg.limits.default), context);
    if verdict.accepted {
        println!("{}", "accepted".green());
        Ok(())
    } else {
        println!(
            "{} {}",
            "rejected:".red().bold(),
            verdict.reason.unwrap_or_default()
        );
        std::process::exit(2);
    }
}

fn cmd_prompts(cfg: &GatewayConfig, telemetry: Arc<dyn Telemetry>, action: PromptAction) -> Result<()> {
    let store = promptgate::prompts::PromptStore::load(cfg.resolved_prompts_path(), telemetry.clone());
    match action {
        PromptAction::List => {
            for prompt in store.all_prompts() {
                let placeholders = promptgate::prompts::template::placeholders(&prompt.raw);
                println!("{}  {}", prompt.id.bold(), placeholders.join(", ").dimmed());
            }
        }
        PromptAction::Reload => {
            let count = store.reload();
            println!("Reloaded {} prompts", count);
        }
        PromptAction::Check { file } => {
            let yaml = std::fs::read_to_string(&file)
                .with_context(|| format!("Failed to read {}", file.display()))?;
            let candidate = promptgate::prompts::PromptStore::from_yaml_str(&yaml, telemetry)
                .with_context(|| format!("{} is not a valid prompt document", file.display()))?;
            let prompts = candidate.all_prompts();
            for prompt in &prompts {
                let placeholders = promptgate::prompts::template::placeholders(&prompt.raw);
                println!("{}  {}", prompt.id.bold(), placeholders.join(", ").dimmed());
            }
            println!("{} {} prompts parsed", ">>>".green().bold(), prompts.len());
        }
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Run a streaming operation, printing SSE frames as they arrive. Ctrl+C
/// cancels the stream.
async fn stream_to_stdout<F, Fut>(gateway: &Gateway, lang: &str, run: F) -> Result<()>
where
    F: FnOnce(mpsc::Sender<StreamFrame>, CancellationToken) -> Fut,
    Fut: std::future::Future<Output = Result<StreamOutcome, GatewayError>>,
{
    let (tx, mut rx) = mpsc::channel::<StreamFrame>(64);
    let cancel = CancellationToken::new();

    let printer = tokio::spawn(async move {
        let mut stdout = std::io::stdout();
        while let Some(frame) = rx.recv().await {
            if write!(stdout, "{}", frame.to_sse()).and_then(|_| stdout.flush()).is_err() {
                break;
            }
        }
    });

    let ctrl_c_cancel = cancel.clone();
    let watcher = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            eprintln!("\n{} Cancelling stream...", "<<<".red().bold());
            ctrl_c_cancel.cancel();
        }
    });

    let outcome = run(tx, cancel).await;
    watcher.abort();
    if let Err(e) = printer.await {
        warn!("Output task join error: {}", e);
    }

    let outcome = outcome.map_err(|e| report(gateway, lang, e))?;
    debug!(
        "Stream ended: {} after {} frames (cancelled: {})",
        outcome.state, outcome.frames_forwarded, outcome.cancelled
    );
    Ok(())
}

fn report(gateway: &Gateway, lang: &str, err: GatewayError) -> anyhow::Error {
    eprintln!("{} {}", "Error:".red().bold(), gateway.user_message(&err, lang));
    anyhow::Error::new(err)
}

fn print_json<T: serde::Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn colorize_source(source: Option<CredentialSource>) -> String {
    match source {
        Some(CredentialSource::Specific) => "specific".green().to_string(),
        Some(CredentialSource::GeneralFallback) => "general fallback".yellow().to_string(),
        None => "missing".red().bold().to_string(),
    }
}
