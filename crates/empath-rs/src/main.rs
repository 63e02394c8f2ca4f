//! Interactive console harness for the study chatbot.
//!
//! Reads the API key from the `OPENAI_API_KEY` environment variable. All
//! other configuration arrives through flags; the runtime itself never
//! touches the environment.
//!
//! # Examples
//!
//! ```sh
//! # Sequentially assigned style, batch replies
//! empath
//!
//! # Force a style and stream fragments as they arrive
//! empath --style emotional --stream
//!
//! # Reconnect a returning participant and load prompts from a directory
//! empath --correlation-id prolific-42 --prompts ./config
//! ```

use clap::Parser;
use empath_rs::api::retry::RetryConfig;
use empath_rs::prelude::*;
use std::io::{BufRead, Write};
use std::path::PathBuf;
use std::process;
use std::sync::Arc;

/// Run a study chatbot session in the terminal.
///
/// Reads the API key from the OPENAI_API_KEY environment variable.
#[derive(Parser)]
#[command(name = "empath")]
struct Cli {
    // ── Assignment ─────────────────────────────────────────────
    /// Force a specific empathy style (cognitive, emotional, motivational,
    /// neutral) instead of sequential assignment
    #[arg(long)]
    style: Option<String>,

    /// Returning-participant correlation id (keeps the assigned style
    /// stable across reconnects)
    #[arg(long)]
    correlation_id: Option<String>,

    // ── Model parameters ───────────────────────────────────────
    /// Model to use
    #[arg(long, default_value = "gpt-4")]
    model: String,

    /// Sampling temperature
    #[arg(long, default_value_t = 0.7)]
    temperature: f32,

    /// Maximum tokens per model response
    #[arg(long, default_value_t = 1024)]
    max_tokens: u32,

    /// Soft word cap per reply
    #[arg(long, default_value_t = 150)]
    max_words: usize,

    /// Retries for transient provider failures
    #[arg(long, default_value_t = 2)]
    retries: u32,

    // ── Session behavior ───────────────────────────────────────
    /// Stream reply fragments as they arrive instead of waiting for the
    /// full response
    #[arg(long)]
    stream: bool,

    /// Number of turns before the session ends
    #[arg(long, default_value_t = 10)]
    max_turns: u32,

    /// Directory holding per-style prompt files, crisis_keywords.txt, and
    /// crisis_response.txt
    #[arg(long, default_value = "config")]
    prompts: PathBuf,

    /// Verbose logging
    #[arg(short, long)]
    verbose: bool,
}

async fn run(cli: &Cli) -> Result<(), String> {
    let api_key =
        std::env::var("OPENAI_API_KEY").map_err(|_| "OPENAI_API_KEY not set".to_string())?;

    let provider = OpenAiClient::new(api_key)
        .map_err(|e| format!("failed to build client: {e}"))?
        .with_retry(RetryConfig::with_retries(cli.retries));

    let config = StudyConfig::new(&cli.model)
        .with_temperature(cli.temperature)
        .with_max_tokens(cli.max_tokens)
        .with_max_words(cli.max_words)
        .with_retries(cli.retries);

    let store = Arc::new(SessionStore::new());
    let harness = StudyHarness::new(
        Arc::new(provider),
        Arc::new(InMemoryRepository::new()),
        CrisisDetector::load(&cli.prompts),
        PromptLibrary::load(&cli.prompts),
        store,
        config,
    );

    let session = harness
        .create_session_with(SessionOptions {
            style_override: cli.style.as_deref(),
            correlation_id: cli.correlation_id.as_deref(),
        })
        .await
        .map_err(|e| e.to_string())?;

    println!("participant: {}", session.participant_id);
    println!("style:       {}", session.style);
    println!("watermark:   {}", session.watermark_condition);
    if cli.verbose {
        let system = harness.prompts().system_prompt(session.style, cli.max_words);
        println!("system prompt:\n{system}");
    }
    println!("type 'quit' to end the session\n");

    let stdin = std::io::stdin();
    let mut turn = 0u32;

    while turn < cli.max_turns {
        print!("you> ");
        std::io::stdout().flush().ok();

        let mut line = String::new();
        if stdin.lock().read_line(&mut line).map_err(|e| e.to_string())? == 0 {
            break; // EOF
        }
        let message = line.trim();
        if message.is_empty() {
            continue;
        }
        if message.eq_ignore_ascii_case("quit") || message.eq_ignore_ascii_case("exit") {
            break;
        }
        turn += 1;

        if cli.stream {
            // Streaming performs no crisis detection; screen first.
            if let Some(hit) = harness.screen_message(message) {
                println!("bot> {}\n", hit.response);
                continue;
            }
            print!("bot> ");
            harness
                .stream_respond(&session.session_id, message, |fragment| {
                    print!("{fragment}");
                    std::io::stdout().flush().ok();
                })
                .await
                .map_err(|e| e.to_string())?;
            println!("\n");
        } else {
            let reply = harness
                .respond(&session.session_id, message, turn)
                .await
                .map_err(|e| e.to_string())?;
            println!("bot> {}\n", reply.reply);
        }
    }

    harness.end_session(&session.session_id);
    println!("session ended.");
    Ok(())
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_max_level(if cli.verbose {
            tracing::Level::DEBUG
        } else {
            tracing::Level::WARN
        })
        .init();

    if let Err(e) = run(&cli).await {
        eprintln!("Error: {e}");
        process::exit(1);
    }
}
