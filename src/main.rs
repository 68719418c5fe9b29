//! Hybrid RAG interactive console
//!
//! Reads questions from stdin and streams grounded answers to stdout.

// Allow pedantic clippy warnings that don't add value for this codebase
#![allow(clippy::map_err_ignore)]
#![allow(clippy::manual_let_else)]

use mimalloc::MiMalloc;

/// Global allocator for improved performance (M-MIMALLOC-APPS).
#[global_allocator]
static GLOBAL: MiMalloc = MiMalloc;

use std::io::Write;

use dotenvy::dotenv;
use futures::StreamExt;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{error, info};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use hybrid_rag::config::{AppConfig, load_llm_settings};
use hybrid_rag::llm::Message;
use hybrid_rag::rag::QueryOrchestrator;

const PROMPT: &str = "Please enter a question about the Art of War:";

#[tokio::main]
async fn main() {
    // Initialize tracing (M-LOG-STRUCTURED)
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(fmt::layer().with_target(true).with_writer(std::io::stderr))
        .with(filter)
        .init();

    // Load .env (if present)
    let _ = dotenv();

    let config = match AppConfig::load() {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Configuration error: {e}");
            std::process::exit(1);
        }
    };

    let settings = match load_llm_settings() {
        Ok(s) => s,
        Err(e) => {
            eprintln!("{e}");
            std::process::exit(1);
        }
    };

    info!(
        name: "llm.config.loaded",
        base_url = %settings.base_url,
        model = %settings.model,
        temperature = settings.temperature,
        "LLM configuration loaded"
    );

    let orchestrator = match QueryOrchestrator::from_config(&config, settings).await {
        Ok(o) => o,
        Err(e) => {
            error!(name: "rag.startup.failed", error = %e, "Startup failed");
            eprintln!("{e}");
            std::process::exit(1);
        }
    };

    let mut history: Vec<Message> = Vec::new();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        println!("{PROMPT}");
        let question = match lines.next_line().await {
            Ok(Some(line)) => line,
            Ok(None) => break,
            Err(e) => {
                error!(error = %e, "Failed to read from stdin");
                break;
            }
        };
        let question = question.trim();
        if question.is_empty() {
            continue;
        }

        let turn = orchestrator.answer(question, history.clone());
        futures::pin_mut!(turn);

        let mut printed = 0;
        while let Some(snapshot) = turn.next().await {
            if let Some(answer) = snapshot.last().map(|m| m.content.as_str()) {
                if let Some(delta) = answer.get(printed..) {
                    print!("{delta}");
                    let _ = std::io::stdout().flush();
                }
                printed = answer.len();
            }
            history = snapshot;
        }
        println!("\n");
    }

    info!(name: "app.shutdown", turns = history.len() / 2, "Goodbye");
}
