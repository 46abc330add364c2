use std::io::Write;
use std::path::Path;
use std::sync::Arc;

use chat_relay::config::{load_config, AppConfig};
use chat_relay::error::ChatError;
use chat_relay::observability::init_tracing;
use chat_relay::session::backend::HttpChatBackend;
use chat_relay::session::documents::{Document, DocumentClient};
use chat_relay::session::{ChatSession, IgnoreReason, Role, SendOutcome, SessionConfig, SessionSnapshot};
use clap::Parser;
use tokio::io::{AsyncBufReadExt, BufReader};

const DEFAULT_CONFIG_PATH: &str = "config.yaml";

#[derive(Parser)]
#[command(name = "chat-cli", version, about = "Terminal chat client for chat-relay")]
struct Cli {
    /// Path to YAML config file; defaults apply when it does not exist
    #[arg(long, default_value = DEFAULT_CONFIG_PATH, value_name = "FILE")]
    config: String,
    /// Relay base URL (defaults to http://127.0.0.1:<server.port>)
    #[arg(long, value_name = "URL")]
    relay: Option<String>,
    /// Ask questions about uploaded documents instead of plain chat
    #[arg(long)]
    rag: bool,
}

type Session = ChatSession<HttpChatBackend>;

/// Prints the assistant reply incrementally as snapshots arrive.
#[derive(Default)]
struct ReplyPrinter {
    message_id: Option<String>,
    printed: usize,
}

impl ReplyPrinter {
    fn render(&mut self, snapshot: &SessionSnapshot) {
        let Some(reply) = snapshot
            .messages
            .last()
            .filter(|message| message.role == Role::Assistant)
        else {
            return;
        };
        if self.message_id.as_deref() != Some(reply.id.as_str()) {
            self.message_id = Some(reply.id.clone());
            self.printed = 0;
        }
        // Replies only grow by appending, so `printed` stays on a char boundary.
        if let Some(fresh) = reply.content.get(self.printed..) {
            if !fresh.is_empty() {
                print!("{fresh}");
                let _ = std::io::stdout().flush();
                self.printed = reply.content.len();
            }
        }
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    let config = if Path::new(&cli.config).exists() {
        load_config(&cli.config).unwrap_or_else(|e| {
            eprintln!("Failed to load configuration from '{}': {e}", cli.config);
            std::process::exit(1);
        })
    } else {
        AppConfig::default()
    };
    init_tracing(&config.features.log_level);

    let relay_url = cli
        .relay
        .clone()
        .unwrap_or_else(|| format!("http://127.0.0.1:{}", config.server.port));
    let client = reqwest::Client::new();
    let documents = DocumentClient::new(
        client.clone(),
        config.upstream.trimmed_base_url(),
        config.documents.clone(),
    );
    let session_config = if cli.rag {
        SessionConfig::rag(&config.session)
    } else {
        SessionConfig::chat(&config.session)
    };
    let session = ChatSession::new(
        HttpChatBackend::new(client, &relay_url),
        session_config,
        config.session.max_results_cap,
    )
    .unwrap_or_else(|e| {
        eprintln!("Invalid session settings: {e}");
        std::process::exit(1);
    });
    let session = Arc::new(session);

    if cli.rag {
        match session.refresh_documents(&documents).await {
            Ok(docs) => println!("{} document(s) registered", docs.len()),
            Err(err) => eprintln!("Could not fetch documents: {err}"),
        }
    }
    println!("Connected to {relay_url}. Commands: /docs /upload <path> /delete <id> /clear /quit");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        print!("> ");
        let _ = std::io::stdout().flush();
        let line = match lines.next_line().await {
            Ok(Some(line)) => line,
            Ok(None) => break,
            Err(err) => {
                eprintln!("Failed to read input: {err}");
                break;
            }
        };
        let line = line.trim();

        match line.split_once(' ').map_or((line, ""), |(cmd, rest)| (cmd, rest.trim())) {
            ("/quit", _) => break,
            ("/clear", _) => {
                session.clear_all();
                println!("Conversation cleared.");
            }
            ("/docs", _) => report_documents(&session, session.refresh_documents(&documents).await),
            ("/upload", path) => {
                let result = match tokio::fs::read(path).await {
                    Ok(contents) => {
                        let file_name = Path::new(path)
                            .file_name()
                            .map_or_else(|| path.to_string(), |name| name.to_string_lossy().into_owned());
                        documents.upload(&file_name, contents).await
                    }
                    Err(err) => Err(ChatError::Validation(format!("Cannot read '{path}': {err}"))),
                };
                report_documents(&session, result);
            }
            ("/delete", id) => match id.parse::<i64>() {
                Ok(id) => report_documents(&session, documents.delete(id).await),
                Err(_) => eprintln!("Usage: /delete <id>"),
            },
            _ => chat(&session, line).await,
        }
    }
}

async fn chat(session: &Session, text: &str) {
    let mut view = session.subscribe();
    let mut printer = ReplyPrinter::default();
    let send = session.send_message(text);
    tokio::pin!(send);

    let outcome = loop {
        tokio::select! {
            outcome = &mut send => {
                printer.render(&session.snapshot());
                break outcome;
            }
            changed = view.changed() => {
                if changed.is_ok() {
                    printer.render(&view.borrow_and_update());
                }
            }
            _ = tokio::signal::ctrl_c() => session.cancel(),
        }
    };

    match outcome {
        Ok(SendOutcome::Completed) => println!(),
        Ok(SendOutcome::Cancelled) => println!(" [cancelled]"),
        Ok(SendOutcome::Ignored(IgnoreReason::NoDocuments)) => {
            println!("Upload a document first (/upload <path>).");
        }
        Ok(SendOutcome::Ignored(_)) => {}
        Err(err) => eprintln!("Error: {err}"),
    }
}

fn report_documents(session: &Session, result: Result<Vec<Document>, ChatError>) {
    match result {
        Ok(docs) => {
            for doc in &docs {
                println!(
                    "  [{}] {} ({}, {} bytes, {})",
                    doc.id, doc.file_name, doc.file_type, doc.file_size, doc.uploaded_at
                );
            }
            println!("{} document(s) registered", docs.len());
            session.set_documents(docs);
        }
        Err(err) => eprintln!("Document request failed: {err}"),
    }
}
