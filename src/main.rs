mod console;

use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use klaude_engine::openai::{DEFAULT_BASE_URL, DEFAULT_MODEL};
use klaude_engine::tools::create_default_registry;
use klaude_engine::{EngineConfig, OpenAiClient, OpenAiConfig, Orchestrator};
use klaude_server::ServerConfig;
use klaude_session::SessionLog;
use klaude_telemetry::{init_telemetry, LogFormat, TelemetryConfig};
use secrecy::SecretString;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{info, Level};

use crate::console::ConsoleHandle;

#[derive(Parser, Debug)]
#[command(name = "klaude", version, about = "Klaude - AI coding assistant")]
struct Cli {
    /// Run a single prompt and exit.
    #[arg(short, long)]
    prompt: Option<String>,

    /// Interactive mode (the default when no prompt is given).
    #[arg(short, long)]
    interactive: bool,

    #[arg(long, default_value = "0.0.0.0")]
    host: String,

    /// Port of the web viewer.
    #[arg(long, default_value_t = 8080)]
    port: u16,

    /// Do not start the web viewer.
    #[arg(long)]
    no_web: bool,

    /// Directory with the web viewer's static files.
    #[arg(long)]
    static_dir: Option<PathBuf>,

    /// Emit logs as JSON lines.
    #[arg(long)]
    log_json: bool,

    #[arg(long, default_value = "warn")]
    log_level: Level,

    #[arg(long, default_value_t = 25)]
    max_turns: u32,

    /// Live-queue bound per observer before it is disconnected.
    #[arg(long, default_value_t = 1024)]
    observer_queue: usize,

    #[arg(long, env = "OPENAI_API_KEY", hide_env_values = true)]
    api_key: Option<String>,

    #[arg(long, env = "OPENAI_BASE_URL", default_value = DEFAULT_BASE_URL)]
    base_url: String,

    #[arg(long, env = "OPENAI_MODEL_NAME", default_value = DEFAULT_MODEL)]
    model: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let _telemetry = init_telemetry(TelemetryConfig {
        log_level: cli.log_level,
        format: if cli.log_json {
            LogFormat::Json
        } else {
            LogFormat::Compact
        },
        ..Default::default()
    });

    let api_key = cli
        .api_key
        .clone()
        .context("OPENAI_API_KEY is not set")?;

    let log = Arc::new(SessionLog::new(cli.observer_queue));
    info!(session_id = %log.session_id(), "session started");

    let server = if cli.no_web {
        None
    } else {
        let config = ServerConfig {
            host: cli.host.clone(),
            port: cli.port,
            static_dir: cli.static_dir.clone(),
            ..Default::default()
        };
        let handle = klaude_server::start(config, Arc::clone(&log))
            .await
            .context("failed to start web viewer")?;
        println!("\nWeb UI available at http://localhost:{}\n", handle.port);
        Some(handle)
    };

    let model = OpenAiClient::new(OpenAiConfig {
        api_key: SecretString::from(api_key),
        base_url: cli.base_url.clone(),
        model: cli.model.clone(),
        temperature: 0.0,
    })?;
    let config = EngineConfig {
        max_turns: cli.max_turns,
        ..Default::default()
    };
    let working_directory = std::env::current_dir().context("cannot read working directory")?;
    let orchestrator = Orchestrator::new(
        Arc::clone(&log),
        Arc::new(model),
        create_default_registry(),
        config,
        working_directory,
    );

    let mut console = console::spawn(Arc::clone(&log));

    match cli.prompt.as_deref() {
        Some(prompt) if !cli.interactive => {
            run_prompt(&orchestrator, &mut console, prompt).await;
        }
        _ => interactive(&orchestrator, &mut console).await?,
    }

    console.stop();
    if let Some(server) = server {
        server.shutdown().await;
    }
    Ok(())
}

/// Run one prompt, aborting on ctrl-c. Returns `false` if interrupted.
async fn run_prompt(orchestrator: &Orchestrator, console: &mut ConsoleHandle, prompt: &str) -> bool {
    let interrupted = tokio::select! {
        result = orchestrator.run(prompt) => {
            if let Err(e) = result {
                eprintln!("Error: {e}");
            }
            false
        }
        _ = tokio::signal::ctrl_c() => {
            orchestrator.abort();
            true
        }
    };
    console.caught_up(orchestrator.log().len() as u64).await;
    !interrupted
}

async fn interactive(orchestrator: &Orchestrator, console: &mut ConsoleHandle) -> Result<()> {
    println!("Klaude - AI Coding Assistant");
    println!("Type 'exit' or 'quit' to end the session.\n");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        print!("You: ");
        std::io::stdout().flush()?;

        let line = tokio::select! {
            line = lines.next_line() => line?,
            _ = tokio::signal::ctrl_c() => {
                println!("\nSession interrupted. Goodbye!");
                return Ok(());
            }
        };
        let Some(line) = line else {
            println!();
            return Ok(());
        };

        let prompt = line.trim();
        if prompt.eq_ignore_ascii_case("exit") || prompt.eq_ignore_ascii_case("quit") {
            println!("Goodbye!");
            return Ok(());
        }
        if prompt.is_empty() {
            continue;
        }

        if !run_prompt(orchestrator, console, prompt).await {
            println!("\nSession interrupted. Goodbye!");
            return Ok(());
        }
        println!();
    }
}
