mod console;
mod server;

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use elysium_contracts::events::EventWriter;
use elysium_engine::{load_dotenv, EngineConfig, StoryEngine};
use tokio::io::BufReader;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "elysium", version, about = "Project Elysium: the AI storyteller")]
struct Cli {
    /// Log at debug level unless RUST_LOG says otherwise.
    #[arg(long, global = true)]
    verbose: bool,
    /// Dotenv file to load before reading configuration. Defaults to ./.env.
    #[arg(long, global = true)]
    env_file: Option<PathBuf>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Interactive story in the terminal.
    Play(PlayArgs),
    /// Serve the browser client and the `/ws/game` socket.
    Serve(ServeArgs),
}

#[derive(Debug, Args)]
struct EngineArgs {
    #[arg(long)]
    text_model: Option<String>,
    /// Append session events as JSON lines to this file.
    #[arg(long)]
    events: Option<PathBuf>,
    #[arg(long)]
    context_entries: Option<usize>,
    #[arg(long)]
    image_max_attempts: Option<u32>,
}

#[derive(Debug, Parser)]
struct PlayArgs {
    #[command(flatten)]
    engine: EngineArgs,
    /// Directory for scene_{n}.png files.
    #[arg(long, default_value = ".")]
    out: PathBuf,
}

#[derive(Debug, Parser)]
struct ServeArgs {
    #[command(flatten)]
    engine: EngineArgs,
    #[arg(long, default_value = "127.0.0.1:8000")]
    bind: SocketAddr,
    #[arg(long, default_value = "static")]
    static_dir: PathBuf,
}

fn main() {
    match run() {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            eprintln!("elysium error: {err:#}");
            std::process::exit(1);
        }
    }
}

fn run() -> Result<i32> {
    let cli = Cli::parse();

    let env_file = cli
        .env_file
        .clone()
        .unwrap_or_else(|| PathBuf::from(".env"));
    let applied = load_dotenv(&env_file)?;

    init_tracing(cli.verbose);
    if applied > 0 {
        tracing::debug!(path = %env_file.display(), applied, "loaded dotenv file");
    }

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("failed to start tokio runtime")?;

    runtime.block_on(async move {
        match cli.command {
            Command::Play(args) => run_play(args).await,
            Command::Serve(args) => run_serve(args).await,
        }
    })
}

fn init_tracing(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

async fn run_play(args: PlayArgs) -> Result<i32> {
    let engine = build_engine(&args.engine, "console")?;
    let stdin = BufReader::new(tokio::io::stdin());
    let mut stdout = std::io::stdout();
    let summary = console::run_console(engine, stdin, &mut stdout, &args.out).await?;
    tracing::info!(
        turns = summary.turns,
        illustrations = summary.saved.len(),
        "story finished"
    );
    Ok(0)
}

async fn run_serve(args: ServeArgs) -> Result<i32> {
    let engine = build_engine(&args.engine, "server")?;
    let state = server::AppState::new(engine, args.static_dir.clone());
    server::serve(args.bind, state).await?;
    Ok(0)
}

fn build_engine(args: &EngineArgs, surface: &str) -> Result<Arc<StoryEngine>> {
    let config = apply_overrides(EngineConfig::from_env(), args);
    for warning in config.warnings() {
        tracing::warn!("{warning}");
    }
    tracing::info!(
        surface,
        text_model = %config.text.model,
        image_enabled = config.image_enabled(),
        image_max_attempts = config.retry.max_attempts,
        context_entries = config.context.max_entries,
        "engine configured"
    );

    let mut engine = StoryEngine::from_config(&config);
    if let Some(path) = args.events.as_deref() {
        ensure_parent(path)?;
        engine = engine.with_events(EventWriter::new(path, surface));
    }
    Ok(Arc::new(engine))
}

fn apply_overrides(mut config: EngineConfig, args: &EngineArgs) -> EngineConfig {
    if let Some(model) = args.text_model.as_deref().map(str::trim) {
        if !model.is_empty() {
            config.text.model = model.to_string();
        }
    }
    if let Some(entries) = args.context_entries {
        config.context.max_entries = entries.max(1);
    }
    if let Some(attempts) = args.image_max_attempts {
        config.retry.max_attempts = attempts.clamp(1, 5);
    }
    config
}

fn ensure_parent(path: &Path) -> Result<()> {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => std::fs::create_dir_all(parent)
            .with_context(|| format!("failed to create {}", parent.display())),
        _ => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> EngineConfig {
        EngineConfig::from_lookup(|_| None)
    }

    #[test]
    fn cli_parses_play_and_serve() {
        let cli = Cli::parse_from([
            "elysium",
            "--verbose",
            "play",
            "--out",
            "runs",
            "--text-model",
            "gemini-test",
        ]);
        assert!(cli.verbose);
        match cli.command {
            Command::Play(args) => {
                assert_eq!(args.out, PathBuf::from("runs"));
                assert_eq!(args.engine.text_model.as_deref(), Some("gemini-test"));
            }
            other => panic!("unexpected command {other:?}"),
        }

        let cli = Cli::parse_from(["elysium", "serve", "--bind", "0.0.0.0:9000"]);
        match cli.command {
            Command::Serve(args) => {
                assert_eq!(args.bind, "0.0.0.0:9000".parse::<SocketAddr>().unwrap());
                assert_eq!(args.static_dir, PathBuf::from("static"));
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn overrides_replace_config_values() {
        let args = EngineArgs {
            text_model: Some(" gemini-other ".to_string()),
            events: None,
            context_entries: Some(0),
            image_max_attempts: Some(9),
        };
        let config = apply_overrides(config(), &args);
        assert_eq!(config.text.model, "gemini-other");
        assert_eq!(config.context.max_entries, 1);
        assert_eq!(config.retry.max_attempts, 5);
    }

    #[test]
    fn blank_model_override_is_ignored() {
        let base = config();
        let args = EngineArgs {
            text_model: Some("  ".to_string()),
            events: None,
            context_entries: None,
            image_max_attempts: None,
        };
        assert_eq!(apply_overrides(base.clone(), &args).text.model, base.text.model);
    }
}
