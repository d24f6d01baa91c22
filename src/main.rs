use std::io::IsTerminal;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use tokio::io::AsyncReadExt;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

use callpilot::backend::Backend;
use callpilot::backend::openai::OpenAiBackend;
use callpilot::config::{self, Config, Overrides, Settings};
use callpilot::consts::{DEFAULT_VOICE, default_db_path};
use callpilot::engine::Engine;
use callpilot::engine::dispatcher::GenerationDispatcher;
use callpilot::engine::job::JobRunner;
use callpilot::error::{ClassifiedError, ErrorKind};
use callpilot::events::EventBus;
use callpilot::model::{DiscoState, GenerationRequest, Mode};
use callpilot::progress::Progress;

#[derive(Parser)]
#[command(
    name = "callpilot",
    version,
    about = "Live sales-call coaching: answers, analysis, DISCO and next steps as JSON."
)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// SQLite database holding stored settings (default: ~/.callpilot/callpilot.db)
    #[arg(short, long, global = true)]
    db: Option<String>,

    /// Chat model for analysis, DISCO and post-call modes
    #[arg(long, global = true)]
    model: Option<String>,

    /// Assistant used by `ask`
    #[arg(long, global = true)]
    assistant_id: Option<String>,

    /// API base URL
    #[arg(long, global = true)]
    base_url: Option<String>,

    /// Milliseconds between run status checks
    #[arg(long, global = true)]
    poll_interval_ms: Option<u64>,

    /// Seconds to wait for an assistant run before giving up
    #[arg(short, long, global = true)]
    timeout: Option<u64>,

    /// Maximum number of run status checks
    #[arg(long, global = true)]
    max_polls: Option<u32>,

    /// Debug logging on stderr
    #[arg(short, long, global = true, default_value_t = false)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Command {
    /// Ask the coaching assistant a question mid-call
    Ask {
        /// The question (words are joined with spaces)
        #[arg(required = true)]
        query: Vec<String>,
    },
    /// Tactical next-step analysis of a conversation
    Analyze {
        /// Transcript file (default: stdin)
        #[arg(short = 'f', long)]
        transcript: Option<PathBuf>,
    },
    /// Update the five-field DISCO summary from a conversation
    Disco {
        /// Transcript file (default: stdin)
        #[arg(short = 'f', long)]
        transcript: Option<PathBuf>,
        /// JSON file with the current DISCO state
        #[arg(short, long)]
        state: Option<PathBuf>,
    },
    /// Post-call action plan in six categories
    PostCall {
        /// Transcript file (default: stdin)
        #[arg(short = 'f', long)]
        transcript: Option<PathBuf>,
    },
    /// Issue an ephemeral key for a realtime voice session
    EphemeralKey {
        #[arg(long, default_value = DEFAULT_VOICE)]
        voice: String,
    },
    /// Read or change stored settings
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Print a stored value
    Get { key: String },
    /// Store a value
    Set { key: String, value: String },
    /// Remove a stored value
    Unset { key: String },
    /// List the accepted keys
    Keys,
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let db_path = match &cli.db {
        Some(path) => path.clone(),
        None => {
            let path = default_db_path()?;
            if let Some(dir) = path.parent() {
                std::fs::create_dir_all(dir)
                    .with_context(|| format!("failed to create {}", dir.display()))?;
            }
            path.to_string_lossy().into_owned()
        }
    };
    let store = Config::open(&db_path)?;

    let overrides = Overrides {
        base_url: cli.base_url.clone(),
        model: cli.model.clone(),
        assistant_id: cli.assistant_id.clone(),
        poll_interval_ms: cli.poll_interval_ms,
        job_timeout_secs: cli.timeout,
        max_polls: cli.max_polls,
    };

    let request = match cli.command {
        Command::Config { action } => {
            handle_config(&store, &action)?;
            return Ok(ExitCode::SUCCESS);
        }
        Command::EphemeralKey { voice } => {
            let (_, backend) = connect(&store, &overrides)?;
            return issue_ephemeral_key(backend.as_ref(), &voice).await;
        }
        Command::Ask { query } => GenerationRequest::DirectAnswer {
            query: query.join(" "),
        },
        Command::Analyze { transcript } => GenerationRequest::ConversationAnalysis {
            transcript: read_transcript(transcript.as_deref()).await?,
        },
        Command::Disco { transcript, state } => GenerationRequest::StructuredExtraction {
            transcript: read_transcript(transcript.as_deref()).await?,
            prior: read_state(state.as_deref())?,
        },
        Command::PostCall { transcript } => GenerationRequest::ActionItemExtraction {
            transcript: read_transcript(transcript.as_deref()).await?,
        },
    };

    let (settings, backend) = connect(&store, &overrides)?;

    let events = EventBus::default();
    let mut dispatcher = GenerationDispatcher::new(Arc::clone(&backend), settings.completion());
    if let Some(assistant_id) = &settings.assistant_id {
        let jobs = JobRunner::new(Arc::clone(&backend), assistant_id, settings.job())
            .with_events(events.clone());
        dispatcher = dispatcher.with_jobs(jobs);
    }

    // Ctrl+C aborts the in-flight call instead of killing the process
    let cancel = CancellationToken::new();
    let on_interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            on_interrupt.cancel();
        }
    });

    let progress = (std::io::stderr().is_terminal() && !cli.verbose).then(|| {
        Progress::start(progress_label(request.mode()), Some(events.subscribe()))
    });

    let outcome = dispatcher.execute(&request, &cancel).await;

    if let Some(progress) = progress {
        progress.stop().await;
    }

    match outcome {
        Ok(result) => {
            println!("{}", serde_json::to_string_pretty(&result)?);
            Ok(ExitCode::SUCCESS)
        }
        Err(e) => {
            report_error(&e);
            Ok(exit_code(e.kind))
        }
    }
}

/// Resolve settings and build the backend they point at.
fn connect(store: &Config, overrides: &Overrides) -> Result<(Settings, Arc<dyn Backend>)> {
    let settings = Settings::resolve(store, overrides)?;
    let backend: Arc<dyn Backend> = Arc::new(OpenAiBackend::new(
        &settings.base_url,
        &settings.api_key,
        &settings.realtime_model,
    )?);
    Ok((settings, backend))
}

fn init_tracing(verbose: bool) {
    let default = if verbose {
        "callpilot=debug"
    } else {
        "callpilot=warn"
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn progress_label(mode: Mode) -> &'static str {
    match mode {
        Mode::DirectAnswer => "asking the assistant",
        Mode::ConversationAnalysis => "analyzing conversation",
        Mode::StructuredExtraction => "extracting DISCO",
        Mode::ActionItemExtraction => "planning next steps",
    }
}

/// Distinct exit status per error kind.
fn exit_code(kind: ErrorKind) -> ExitCode {
    let code: u8 = match kind {
        ErrorKind::BackendUnavailable => 3,
        ErrorKind::JobFailed => 4,
        ErrorKind::JobCancelled => 5,
        ErrorKind::OutputMissing => 6,
        ErrorKind::OutputMalformed => 7,
        ErrorKind::Timeout => 8,
        ErrorKind::Cancelled => 130,
    };
    ExitCode::from(code)
}

fn report_error(e: &ClassifiedError) {
    let body = serde_json::json!({
        "status": "error",
        "kind": e.kind.as_str(),
        "message": e.message,
    });
    eprintln!("{body}");
}

async fn read_transcript(path: Option<&Path>) -> Result<String> {
    let text = match path {
        Some(path) => tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("failed to read transcript {}", path.display()))?,
        None => {
            let mut text = String::new();
            tokio::io::stdin()
                .read_to_string(&mut text)
                .await
                .context("failed to read transcript from stdin")?;
            text
        }
    };
    if text.trim().is_empty() {
        bail!("transcript is empty");
    }
    Ok(text)
}

fn read_state(path: Option<&Path>) -> Result<DiscoState> {
    let Some(path) = path else {
        return Ok(DiscoState::default());
    };
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read DISCO state {}", path.display()))?;
    serde_json::from_str(&raw)
        .with_context(|| format!("invalid DISCO state in {}", path.display()))
}

async fn issue_ephemeral_key(backend: &dyn Backend, voice: &str) -> Result<ExitCode> {
    match backend.create_realtime_session(voice).await {
        Ok(session) => {
            println!("{}", serde_json::to_string_pretty(&session)?);
            Ok(ExitCode::SUCCESS)
        }
        Err(e) => {
            let body = serde_json::json!({
                "status": "error",
                "message": format!("Ephemeral key generation failed: {e:#}"),
            });
            eprintln!("{body}");
            Ok(exit_code(ErrorKind::BackendUnavailable))
        }
    }
}

fn handle_config(store: &Config, action: &ConfigAction) -> Result<()> {
    match action {
        ConfigAction::Get { key } => {
            check_key(key)?;
            match store.get(key)? {
                Some(value) if key == "api_key" => println!("{}", mask(&value)),
                Some(value) => println!("{value}"),
                None => println!("(unset)"),
            }
        }
        ConfigAction::Set { key, value } => {
            check_key(key)?;
            store.set(key, value)?;
            println!("✓ {key} saved");
        }
        ConfigAction::Unset { key } => {
            check_key(key)?;
            store.remove(key)?;
            println!("✓ {key} removed");
        }
        ConfigAction::Keys => {
            for key in config::KEYS {
                println!("{key}");
            }
        }
    }
    Ok(())
}

fn check_key(key: &str) -> Result<()> {
    if !config::is_known_key(key) {
        bail!(
            "unknown config key `{key}` (expected one of: {})",
            config::KEYS.join(", ")
        );
    }
    Ok(())
}

fn mask(secret: &str) -> String {
    let visible: String = secret.chars().take(6).collect();
    format!("{visible}…")
}
