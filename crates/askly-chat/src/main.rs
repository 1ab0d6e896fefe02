use std::io::{self, Write};
use std::sync::Arc;

use clap::{Parser, Subcommand};
use colored::Colorize;
use tokio::sync::mpsc::UnboundedReceiver;
use tracing_subscriber::EnvFilter;

use askly_chat::{ChatEngine, ChatEvent, EngineError};
use askly_core::{ConversationSession, Memory, MemoryKind};
use askly_llm::{GatewayConfig, HttpGateway};
use askly_store::{default_storage_path, JsonStorage, Repository};

#[derive(Parser)]
#[command(name = "askly")]
#[command(about = "Context-aware chat assistant with persistent memory")]
#[command(version)]
struct Cli {
    /// Chat-completions endpoint base URL
    #[arg(long, env = "ASKLY_BASE_URL", default_value = "https://api.openai.com/v1")]
    base_url: String,

    /// API key for the model endpoint
    #[arg(long, env = "ASKLY_API_KEY")]
    api_key: Option<String>,

    /// Model name
    #[arg(long, env = "ASKLY_MODEL", default_value = "gpt-4o-mini")]
    model: String,

    /// Data directory for sessions and memories
    #[arg(long, env = "ASKLY_DATA_DIR")]
    data_dir: Option<String>,

    /// Enable debug logging
    #[arg(long, short, default_value = "false")]
    debug: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Interactive chat (default)
    Chat,
    /// List sessions by recency
    Sessions,
    /// List learned memories grouped by kind
    Memories,
    /// Clear all memories
    Forget,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let mut cli = Cli::parse();

    let filter = if cli.debug { "debug" } else { "warn" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(io::stderr)
        .init();

    let data_dir = cli
        .data_dir
        .clone()
        .unwrap_or_else(|| default_storage_path().to_string_lossy().into_owned());
    let storage = Arc::new(JsonStorage::new(data_dir).await?);
    let repo = Arc::new(Repository::load(storage).await?);

    match cli.command.take().unwrap_or(Commands::Chat) {
        Commands::Chat => run_chat(&cli, repo).await,
        Commands::Sessions => {
            print_sessions(&repo.sessions_by_recency());
            Ok(())
        }
        Commands::Memories => {
            print_memories(&repo.memories());
            Ok(())
        }
        Commands::Forget => {
            repo.clear_memories().await?;
            println!("{}", "All memories cleared.".yellow());
            Ok(())
        }
    }
}

async fn run_chat(cli: &Cli, repo: Arc<Repository>) -> anyhow::Result<()> {
    let mut config = GatewayConfig::default()
        .with_base_url(cli.base_url.clone())
        .with_model(cli.model.clone());
    if let Some(key) = &cli.api_key {
        config = config.with_api_key(key.clone());
    }
    let gateway = Arc::new(HttpGateway::new(config)?);

    let (engine, events) = ChatEngine::new(repo.clone(), gateway);
    spawn_event_printer(events);

    // Resume the freshest session, or start the first one
    let mut active = match repo.most_recent() {
        Some(session) => session,
        None => repo.create_session().await?,
    };

    println!("{}", "Askly".green().bold());
    println!("Session: {}", active.title.cyan());
    for message in &active.messages {
        print_message(message);
    }
    println!("{}", "Type a message, or /help for commands.".dimmed());

    let stdin = io::stdin();
    loop {
        print!("{} ", ">".green());
        io::stdout().flush()?;

        let mut line = String::new();
        if stdin.read_line(&mut line)? == 0 {
            break;
        }
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        if let Some(command) = line.strip_prefix('/') {
            match handle_command(command, &repo, &mut active).await? {
                ReplFlow::Continue => continue,
                ReplFlow::Quit => break,
            }
        }

        match engine.send_message(&active.id, line).await {
            Ok(outcome) => {
                // The stream is echoed by the event printer; just close the line
                println!();
                if let Some(background) = outcome.background {
                    let _ = background.await;
                }
                if let Some(session) = repo.session(&active.id) {
                    active = session;
                }
            }
            Err(EngineError::Busy { .. }) => {
                println!("{}", "Still thinking, hold on.".yellow());
            }
            Err(EngineError::EmptyMessage) => continue,
            Err(e) => return Err(e.into()),
        }
    }

    println!("{}", "Bye.".dimmed());
    Ok(())
}

enum ReplFlow {
    Continue,
    Quit,
}

async fn handle_command(
    command: &str,
    repo: &Arc<Repository>,
    active: &mut ConversationSession,
) -> anyhow::Result<ReplFlow> {
    let mut parts = command.split_whitespace();
    match parts.next().unwrap_or_default() {
        "new" => {
            *active = repo.create_session().await?;
            println!("Started {}", active.title.cyan());
            for message in &active.messages {
                print_message(message);
            }
        }
        "sessions" => print_sessions(&repo.sessions_by_recency()),
        "switch" => match parts.next().and_then(|n| n.parse::<usize>().ok()) {
            Some(n) => {
                let sessions = repo.sessions_by_recency();
                match sessions.into_iter().nth(n.saturating_sub(1)) {
                    Some(session) => {
                        *active = session;
                        println!("Switched to {}", active.title.cyan());
                        for message in &active.messages {
                            print_message(message);
                        }
                    }
                    None => println!("{}", "No such session.".red()),
                }
            }
            None => println!("Usage: /switch <n>"),
        },
        "delete" => match parts.next().and_then(|n| n.parse::<usize>().ok()) {
            Some(n) => {
                let sessions = repo.sessions_by_recency();
                match sessions.into_iter().nth(n.saturating_sub(1)) {
                    Some(session) => {
                        repo.delete_session(&session.id).await?;
                        println!("Deleted {}", session.title.cyan());
                        if session.id == active.id {
                            *active = match repo.most_recent() {
                                Some(s) => s,
                                None => repo.create_session().await?,
                            };
                            println!("Now on {}", active.title.cyan());
                        }
                    }
                    None => println!("{}", "No such session.".red()),
                }
            }
            None => println!("Usage: /delete <n>"),
        },
        "memories" => print_memories(&repo.memories()),
        "forget" => {
            repo.clear_memories().await?;
            println!("{}", "All memories cleared.".yellow());
        }
        "help" => {
            println!("/new /sessions /switch <n> /delete <n> /memories /forget /quit");
        }
        "quit" | "exit" => return Ok(ReplFlow::Quit),
        other => println!("Unknown command: /{}", other),
    }
    Ok(ReplFlow::Continue)
}

fn spawn_event_printer(mut events: UnboundedReceiver<ChatEvent>) {
    tokio::spawn(async move {
        while let Some(event) = events.recv().await {
            match event {
                ChatEvent::Fragment { content, .. } => {
                    print!("{}", content);
                    let _ = io::stdout().flush();
                }
                ChatEvent::Fallback { .. } => {
                    println!("{}", askly_chat::FALLBACK_REPLY.red());
                }
                ChatEvent::TopicChanged { topic, .. } => {
                    eprintln!("{}", format!("[topic: {}]", topic).dimmed());
                }
                ChatEvent::TitleGenerated { title, .. } => {
                    eprintln!("{}", format!("[title: {}]", title).dimmed());
                }
                ChatEvent::MemoriesUpdated { count } => {
                    eprintln!(
                        "{}",
                        format!("[remembered {} new thing(s)]", count).dimmed()
                    );
                }
                ChatEvent::Completed { .. } | ChatEvent::SessionUpdated { .. } => {}
            }
        }
    });
}

fn print_message(message: &askly_core::Message) {
    match message.role {
        askly_core::Role::User => println!("{} {}", ">".green(), message.content),
        askly_core::Role::Model => println!("{}", message.content),
    }
}

fn print_sessions(sessions: &[ConversationSession]) {
    if sessions.is_empty() {
        println!("{}", "No sessions yet.".dimmed());
        return;
    }
    for (i, session) in sessions.iter().enumerate() {
        let topic = session
            .topic
            .as_deref()
            .map(|t| format!(" [{}]", t))
            .unwrap_or_default();
        println!(
            "{:>3}. {}{} {}",
            i + 1,
            session.title.cyan(),
            topic.dimmed(),
            session
                .last_updated
                .format("%Y-%m-%d %H:%M")
                .to_string()
                .dimmed()
        );
    }
}

fn print_memories(memories: &[Memory]) {
    if memories.is_empty() {
        println!("{}", "No memories yet.".dimmed());
        return;
    }
    for kind in MemoryKind::ALL {
        let group: Vec<&Memory> = memories.iter().filter(|m| m.kind == kind).collect();
        if group.is_empty() {
            continue;
        }
        println!("{}", kind.label().bold());
        for memory in group {
            let dots = "•".repeat(memory.importance_dots());
            println!("  {} {}", dots.yellow(), memory.content);
        }
    }
}
