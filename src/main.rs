// Copyright (c) 2025-2026 The agentichat authors
//
// SPDX-License-Identifier: Apache-2.0
mod app;
mod cli;
mod gate;
mod spinner;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tracing_subscriber::{filter::EnvFilter, fmt, prelude::*};

use agentichat_backend::Backend;
use agentichat_config::Config;
use agentichat_core::{AgentLoop, GuidelinesManager, ModeCell};
use agentichat_store::{load_transcript, ModelMetadataStore, SessionStore};
use agentichat_tools::{register_builtin, Sandbox, ToolRegistry};

use app::App;
use cli::{Cli, Commands};
use gate::TerminalGate;
use spinner::Spinner;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let workspace = match &cli.workspace {
        Some(dir) => dir.clone(),
        None => std::env::current_dir().context("cannot determine working directory")?,
    };
    let config = agentichat_config::load(cli.config.as_deref())?;
    let data_dir = config
        .data_dir
        .clone()
        .unwrap_or_else(|| workspace.join(".agentichat"));
    std::fs::create_dir_all(&data_dir)
        .with_context(|| format!("cannot create {}", data_dir.display()))?;

    init_logging(&data_dir, cli.verbose);

    // Subcommands run against the store/config and exit.
    if let Some(command) = &cli.command {
        return run_subcommand(command, &cli, &config, &workspace, &data_dir).await;
    }

    run_chat(cli, config, workspace, data_dir).await
}

async fn run_chat(
    cli: Cli,
    config: Config,
    workspace: PathBuf,
    data_dir: PathBuf,
) -> anyhow::Result<()> {
    let (backend_name, backend) = build_backend(&config, &cli)?;
    let context_max_tokens = config
        .backend(Some(&backend_name))
        .and_then(|(_, b)| b.context_max_tokens);

    // Learned per-model constraints override static configuration.
    let home_dir = dirs::home_dir()
        .map(|h| h.join(".agentichat"))
        .unwrap_or_else(|| data_dir.clone());
    let metadata = ModelMetadataStore::load(&home_dir);
    if let Some(cap) = metadata.max_parallel_tools(&backend.model()) {
        backend.set_max_parallel_tools(Some(cap));
    }

    let sandbox = Arc::new(Sandbox::new(&workspace, &config.sandbox));
    let mut registry = ToolRegistry::new();
    register_builtin(&mut registry, Arc::clone(&sandbox), data_dir.clone());
    let registry = Arc::new(registry);

    let mode = ModeCell::default();
    let spinner = Spinner::new();
    let gate = Arc::new(TerminalGate::new(mode.clone(), spinner.clone()));

    let agent = AgentLoop::new(
        Arc::clone(&backend),
        Arc::clone(&registry),
        gate,
        config.max_iterations,
    );

    let store = SessionStore::new(data_dir.join("agentichat.db"));
    store.initialize()?;
    let session_id = store.create_session(&backend_name, &backend.model())?;

    let history = if cli.resume {
        match load_transcript(&data_dir.join("conversation.json")) {
            Ok(saved) => {
                println!("resumed {} message(s) from the previous run", saved.messages.len());
                saved.messages
            }
            Err(e) => {
                println!("cannot resume previous conversation: {e}");
                Vec::new()
            }
        }
    } else {
        Vec::new()
    };

    let guidelines = GuidelinesManager::new(&workspace, &data_dir);

    let mut app = App::new(
        config,
        backend_name,
        backend,
        agent,
        guidelines,
        store,
        metadata,
        session_id,
        mode,
        spinner,
        history,
        data_dir,
        context_max_tokens,
    );
    app.run().await
}

async fn run_subcommand(
    command: &Commands,
    cli: &Cli,
    config: &Config,
    workspace: &std::path::Path,
    data_dir: &std::path::Path,
) -> anyhow::Result<()> {
    let store = SessionStore::new(data_dir.join("agentichat.db"));
    store.initialize()?;

    match command {
        Commands::Sessions { limit } => {
            for s in store.list_sessions(*limit)? {
                println!("{}  {}/{}  {} message(s)", s.id, s.backend, s.model, s.message_count);
            }
        }
        Commands::Stats { session } => {
            let target = match session {
                Some(id) => Some(id.clone()),
                None => store.list_sessions(1)?.first().map(|s| s.id.clone()),
            };
            let Some(id) = target else {
                println!("no sessions yet");
                return Ok(());
            };
            match store.session_stats(&id)? {
                Some(stats) => println!(
                    "session {}\n  backend: {}/{}\n  messages: {} ({} user, {} assistant)\n  \
                     tokens: {}\n  compressions: {}",
                    stats.session_id,
                    stats.backend,
                    stats.model,
                    stats.message_count,
                    stats.user_messages,
                    stats.assistant_messages,
                    stats.total_tokens,
                    stats.compression_count
                ),
                None => println!("unknown session {id}"),
            }
        }
        Commands::DeleteSession { session } => {
            store.delete_session(session)?;
            println!("deleted session {session}");
        }
        Commands::CompileGuidelines => {
            let (_, backend) = build_backend(config, cli)?;
            let guidelines = GuidelinesManager::new(workspace, data_dir);
            let compiled = guidelines.compile(backend.as_ref()).await?;
            println!("{compiled}");
        }
        Commands::ListModels => {
            let (_, backend) = build_backend(config, cli)?;
            for model in backend.list_models().await? {
                println!("{model}");
            }
        }
        Commands::ShowConfig => {
            println!("{}", serde_yaml::to_string(config).unwrap_or_default());
        }
    }
    Ok(())
}

/// Resolve the backend selection (CLI override > default) and construct the
/// adapter, applying the optional model override.
fn build_backend(
    config: &Config,
    cli: &Cli,
) -> anyhow::Result<(String, Arc<dyn agentichat_backend::Backend>)> {
    let (name, backend_config) = config
        .backend(cli.backend.as_deref())
        .with_context(|| {
            format!(
                "backend '{}' is not configured; define it under 'backends' in config.yaml",
                cli.backend.as_deref().unwrap_or(&config.default_backend)
            )
        })?;
    let backend = agentichat_backend::from_config(name, backend_config)?;
    if let Some(model) = &cli.model {
        backend.set_model(model.clone());
    }
    Ok((name.to_string(), backend))
}

/// Logging goes to `<data_dir>/agentichat.log`; `--verbose` adds stderr.
/// Spinner repaints and log lines on the same terminal do not mix well, so
/// stderr logging stays opt-in.
fn init_logging(data_dir: &std::path::Path, verbose: bool) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(if verbose { "debug" } else { "info" }));

    let file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(data_dir.join("agentichat.log"));

    match file {
        Ok(file) => {
            let file_layer = fmt::layer()
                .with_target(true)
                .with_ansi(false)
                .with_writer(std::sync::Mutex::new(file));
            if verbose {
                let _ = tracing_subscriber::registry()
                    .with(file_layer)
                    .with(fmt::layer().with_target(false).with_writer(std::io::stderr))
                    .with(filter)
                    .try_init();
            } else {
                let _ = tracing_subscriber::registry()
                    .with(file_layer)
                    .with(filter)
                    .try_init();
            }
        }
        Err(_) => {
            let _ = tracing_subscriber::registry()
                .with(fmt::layer().with_target(false).with_writer(std::io::stderr))
                .with(filter)
                .try_init();
        }
    }
}
