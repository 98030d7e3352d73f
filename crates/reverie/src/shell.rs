// SPDX-FileCopyrightText: 2026 Reverie Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! `reverie shell` command implementation.
//!
//! Launches an interactive REPL with a colored prompt and readline
//! history. Every turn runs through the conversation controller: persist,
//! retrieve, review, reply. Slash commands expose the memory store.

use std::path::PathBuf;
use std::sync::Arc;

use colored::Colorize;
use rustyline::DefaultEditor;
use rustyline::error::ReadlineError;
use tracing::{info, warn};

use reverie_agent::{Conversation, Reflector};
use reverie_agent::persona::ensure_persona;
use reverie_config::model::ReverieConfig;
use reverie_core::ReverieError;
use reverie_core::traits::{CompletionAdapter, EmbeddingAdapter};
use reverie_memory::service::EmbeddingService;
use reverie_memory::{LocalEmbedder, MemoryStore, ModelManager, Retriever};
use reverie_ollama::OllamaProvider;
use reverie_openai::OpenAiProvider;
use reverie_storage::Database;

/// Runs the interactive REPL.
pub async fn run_shell(config: ReverieConfig) -> Result<(), ReverieError> {
    let db = Database::open(&config.memory.database_path).await?;

    let (provider, provider_embedder) = build_provider(&config)?;
    let embeddings = build_embeddings(&config, provider_embedder).await;

    let store = Arc::new(MemoryStore::new(db.clone(), embeddings.clone()));
    let retriever = Retriever::new(store.clone(), embeddings, &config.memory);
    let reflector = Reflector::new(provider, &config.llm, &config.reflection);

    let persona = ensure_persona(&db, &store, &config.persona).await?;
    info!(persona = %persona.name, "agent ready");

    let conversation = Conversation::new(
        store,
        retriever,
        reflector,
        config.persona.clone(),
    );

    let mut rl = DefaultEditor::new()
        .map_err(|e| ReverieError::Internal(format!("failed to initialize readline: {e}")))?;

    println!("{}", format!("reverie shell ({})", persona.name).bold().green());
    println!("Type {} for commands, {} to exit.\n", "/help".yellow(), "/quit".yellow());

    let prompt = format!("{}> ", "you".green());
    loop {
        match rl.readline(&prompt) {
            Ok(line) => {
                let trimmed = line.trim();
                if trimmed.is_empty() {
                    continue;
                }
                if trimmed == "/quit" || trimmed == "/exit" {
                    break;
                }
                let _ = rl.add_history_entry(&line);

                if let Err(e) = dispatch(&conversation, &persona.name, trimmed).await {
                    if e.is_backend_failure() {
                        eprintln!("{}", format!("{e}").yellow());
                    } else {
                        eprintln!("{}: {e}", "error".red());
                    }
                }
            }
            Err(ReadlineError::Interrupted) | Err(ReadlineError::Eof) => break,
            Err(e) => {
                eprintln!("{}: {e}", "error".red());
                break;
            }
        }
    }

    db.close().await?;
    println!("{}", "goodbye".dimmed());
    Ok(())
}

/// Route a line to a slash command or a conversation turn.
async fn dispatch(
    conversation: &Conversation,
    persona_name: &str,
    input: &str,
) -> Result<(), ReverieError> {
    if let Some(rest) = input.strip_prefix('/') {
        let mut parts = rest.splitn(3, ' ');
        match parts.next().unwrap_or_default() {
            "help" => {
                print_help();
                Ok(())
            }
            "memories" => {
                let n = parts
                    .next()
                    .and_then(|s| s.parse::<usize>().ok())
                    .unwrap_or(20);
                show_memories(conversation, n).await
            }
            "edit" => {
                let id = parts.next().and_then(|s| s.parse::<i64>().ok());
                let content = parts.next().map(str::trim).filter(|s| !s.is_empty());
                match (id, content) {
                    (Some(id), Some(content)) => {
                        conversation.edit_message(id, content).await?;
                        println!("{}", format!("memory {id} updated").dimmed());
                        Ok(())
                    }
                    _ => {
                        eprintln!("usage: /edit <id> <new text>");
                        Ok(())
                    }
                }
            }
            "reset" => {
                conversation.reset().await?;
                println!("{}", "all memories cleared".dimmed());
                Ok(())
            }
            other => {
                eprintln!("unknown command: /{other} (try /help)");
                Ok(())
            }
        }
    } else {
        let outcome = conversation.handle_turn(input).await?;
        println!("{} {}", format!("{persona_name}>").cyan(), outcome.reply);
        if let Some(follow_up) = &outcome.follow_up {
            println!("{}", format!("({follow_up})").dimmed());
        }
        Ok(())
    }
}

fn print_help() {
    println!("/memories [n]      show the n most recent memories (default 20)");
    println!("/edit <id> <text>  rewrite a stored message in place");
    println!("/reset             delete every memory");
    println!("/quit              exit the shell");
}

async fn show_memories(conversation: &Conversation, n: usize) -> Result<(), ReverieError> {
    let records = conversation.memories(n).await?;
    if records.is_empty() {
        println!("{}", "no memories yet".dimmed());
        return Ok(());
    }
    for record in records {
        let stale = if record.flag("stale") { " [stale]" } else { "" };
        let mut content = record.content.replace('\n', " ");
        if content.len() > 96 {
            content.truncate(96);
            content.push_str("...");
        }
        println!(
            "{:>5} {} {}{}",
            record.id,
            format!("[{}]", record.role.as_str()).dimmed(),
            content,
            stale.yellow(),
        );
    }
    Ok(())
}

/// Build the configured LLM backend as completion and embedding handles.
fn build_provider(
    config: &ReverieConfig,
) -> Result<(Arc<dyn CompletionAdapter>, Arc<dyn EmbeddingAdapter>), ReverieError> {
    match config.llm.provider.as_str() {
        "openai" => {
            let provider = Arc::new(OpenAiProvider::new(
                &config.llm,
                &config.memory.fallback_embedding_model,
                config.memory.embedding_dim,
            )?);
            Ok((provider.clone(), provider))
        }
        "ollama" => {
            let provider = Arc::new(OllamaProvider::new(
                &config.llm,
                &config.memory.fallback_embedding_model,
            )?);
            Ok((provider.clone(), provider))
        }
        other => Err(ReverieError::Config(format!(
            "unknown llm.provider '{other}' (expected openai or ollama)"
        ))),
    }
}

/// Set up embedding with the local ONNX model as primary and the provider
/// as fallback. If the local model cannot be readied the provider becomes
/// the only backend; memory writes still never block on it.
async fn build_embeddings(
    config: &ReverieConfig,
    provider_embedder: Arc<dyn EmbeddingAdapter>,
) -> Arc<EmbeddingService> {
    let db_path = PathBuf::from(&config.memory.database_path);
    let data_dir = db_path
        .parent()
        .map(|p| p.to_path_buf())
        .unwrap_or_else(|| PathBuf::from("."));

    let manager = ModelManager::new(data_dir, &config.memory.embedding_model);
    let local = match manager.ensure().await {
        Ok(paths) => LocalEmbedder::from_files(&paths.model, &paths.tokenizer),
        Err(e) => Err(e),
    };

    match local {
        Ok(embedder) => Arc::new(EmbeddingService::new(
            Arc::new(embedder),
            Some(provider_embedder),
            config.memory.embedding_dim,
        )),
        Err(e) => {
            warn!(error = %e, "local embedding model unavailable, using provider only");
            Arc::new(EmbeddingService::new(
                provider_embedder,
                None,
                config.memory.embedding_dim,
            ))
        }
    }
}
