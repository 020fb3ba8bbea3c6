use std::io::{self, Write};
use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, Subcommand};
use docchat::ingest::{self, extract_blocking, UploadedDocument};
use docchat::llm_client::build_llm_client_from_env;
use docchat::{
    ChatConfig, ChunkingConfig, IncomingAction, Orchestrator, OutgoingKind, OutgoingMessage,
    SessionId,
};
use tracing::{error, info};

#[derive(Parser, Debug)]
#[command(
    name = "docchat",
    about = "Chat with a hosted LLM and fold uploaded documents (PDF, PowerPoint, CSV, text) into the conversation"
)]
struct Cli {
    /// Optional one-shot prompt; if omitted (and nothing is attached) the CLI enters interactive mode.
    #[arg(short, long)]
    prompt: Option<String>,

    /// Document to summarize before the prompt is sent. Repeat for several files.
    #[arg(short, long = "attach", value_name = "PATH")]
    attach: Vec<PathBuf>,

    /// Answer with the offline echo client instead of the hosted API.
    #[arg(long, default_value_t = false)]
    offline: bool,

    /// Conversation identity; a fresh one is generated when omitted.
    #[arg(long)]
    session: Option<String>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Extract and print the plain text of a document without calling the LLM.
    Extract {
        /// Path to the document.
        path: PathBuf,
    },
    /// Show how a document would be chunked for summarization.
    Chunks {
        /// Path to the document.
        path: PathBuf,
        /// Override the configured chunk size (chars).
        #[arg(long)]
        chunk_size: Option<usize>,
        /// Override the configured overlap (chars).
        #[arg(long)]
        overlap: Option<usize>,
    },
}

/// One line typed into the interactive prompt.
#[derive(Debug, Clone, PartialEq, Eq)]
enum ReplInput {
    Exit,
    Empty,
    History,
    Reset,
    Upload(Vec<PathBuf>),
    Message(String),
}

impl ReplInput {
    fn parse(line: &str) -> Self {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            return Self::Empty;
        }
        if trimmed.eq_ignore_ascii_case("exit") || trimmed.eq_ignore_ascii_case("/exit") {
            return Self::Exit;
        }

        match trimmed.split_once(char::is_whitespace) {
            Some(("/upload", rest)) => {
                Self::Upload(rest.split_whitespace().map(PathBuf::from).collect())
            }
            None if trimmed == "/upload" => Self::Upload(Vec::new()),
            None if trimmed == "/history" => Self::History,
            None if trimmed == "/reset" => Self::Reset,
            _ => Self::Message(trimmed.to_owned()),
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    init_tracing();
    let cli = Cli::parse();

    if let Some(command) = cli.command {
        return run_command(command).await;
    }

    let config = ChatConfig::from_env().context("Invalid chat configuration")?;
    let llm_client =
        build_llm_client_from_env(cli.offline).context("LLM client initialization failed")?;

    let orchestrator = Orchestrator::new(llm_client, config);
    let session_id = cli
        .session
        .map(SessionId::new)
        .unwrap_or_else(SessionId::generate);

    let greeting = orchestrator.start_session(&session_id).await?;

    if cli.prompt.is_some() || !cli.attach.is_empty() {
        for path in cli.attach {
            run_upload(&orchestrator, &session_id, vec![path]).await?;
        }
        if let Some(prompt) = cli.prompt {
            run_single(&orchestrator, &session_id, IncomingAction::text(prompt)).await?;
        }
        orchestrator.end_session(&session_id)?;
        return Ok(());
    }

    print_outgoing(&greeting);
    run_repl(&orchestrator, &session_id).await?;
    orchestrator.end_session(&session_id)?;
    Ok(())
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_target(false)
        .try_init();
}

fn print_outgoing(message: &OutgoingMessage) {
    let label = match message.kind {
        OutgoingKind::Reply => "Assistant",
        OutgoingKind::Summary => "Document",
        OutgoingKind::Error => "Error",
        OutgoingKind::Notice => "docchat",
    };
    println!("\n{label}:\n{}\n", message.content);
}

async fn run_single(
    orchestrator: &Orchestrator,
    session_id: &SessionId,
    action: IncomingAction,
) -> anyhow::Result<()> {
    let outgoing = orchestrator
        .handle(session_id, action)
        .await
        .map_err(|err| {
            error!(?err, "Turn could not be processed");
            err
        })?;

    if let Some(message) = outgoing {
        print_outgoing(&message);
    }
    Ok(())
}

async fn run_upload(
    orchestrator: &Orchestrator,
    session_id: &SessionId,
    paths: Vec<PathBuf>,
) -> anyhow::Result<()> {
    let mut action = IncomingAction::default();
    for path in paths {
        match UploadedDocument::from_path(&path) {
            Ok(document) => action = action.with_attachment(document),
            Err(err) => println!("\nError:\n{err:#}\n"),
        }
    }

    if action.attachments.is_empty() {
        return Ok(());
    }
    run_single(orchestrator, session_id, action).await
}

async fn run_repl(orchestrator: &Orchestrator, session_id: &SessionId) -> anyhow::Result<()> {
    println!(
        "docchat ready (session {session_id}). Commands: /upload PATH..., /history, /reset, exit.\n"
    );
    let stdin = io::stdin();

    loop {
        print!("You > ");
        io::stdout().flush()?;

        let mut buffer = String::new();
        if stdin.read_line(&mut buffer)? == 0 {
            break;
        }

        match ReplInput::parse(&buffer) {
            ReplInput::Exit => {
                info!("User exited CLI");
                break;
            }
            ReplInput::Empty => continue,
            ReplInput::History => {
                let history = orchestrator.sessions().get(session_id).await?;
                println!("{}", serde_json::to_string_pretty(&history)?);
            }
            ReplInput::Reset => {
                let greeting = orchestrator.start_session(session_id).await?;
                print_outgoing(&greeting);
            }
            ReplInput::Upload(paths) if paths.is_empty() => {
                println!("Usage: /upload PATH [PATH...]");
            }
            ReplInput::Upload(paths) => run_upload(orchestrator, session_id, paths).await?,
            ReplInput::Message(text) => {
                run_single(orchestrator, session_id, IncomingAction::text(text)).await?
            }
        }
    }

    Ok(())
}

/// Local document tools; only `chunks` needs the chat configuration.
async fn run_command(command: Commands) -> anyhow::Result<()> {
    match command {
        Commands::Extract { path } => run_extract(path).await,
        Commands::Chunks {
            path,
            chunk_size,
            overlap,
        } => {
            let config = ChatConfig::from_env().context("Invalid chat configuration")?;
            let mut chunking = config.chunking;
            if let Some(size) = chunk_size {
                chunking.chunk_size = size;
            }
            if let Some(overlap) = overlap {
                chunking.overlap = overlap;
            }
            run_chunks(path, chunking).await
        }
    }
}

async fn run_extract(path: PathBuf) -> anyhow::Result<()> {
    let document = UploadedDocument::from_path(&path)?;
    let extracted = extract_blocking(document)
        .await
        .with_context(|| format!("Failed to extract {}", path.display()))?;

    println!(
        "# {} ({}, {} chars)\n",
        extracted.name,
        extracted.kind,
        extracted.text.chars().count()
    );
    println!("{}", extracted.text);
    Ok(())
}

async fn run_chunks(path: PathBuf, chunking: ChunkingConfig) -> anyhow::Result<()> {
    let probe = ChatConfig {
        chunking,
        ..ChatConfig::default()
    };
    probe.validate()?;

    let document = UploadedDocument::from_path(&path)?;
    let extracted = extract_blocking(document)
        .await
        .with_context(|| format!("Failed to extract {}", path.display()))?;

    let chunks: Vec<_> = ingest::plan(&extracted.text, &chunking).collect();
    println!(
        "{} ({}) -> {} chunk(s) (size={} overlap={} threshold={})",
        extracted.name,
        extracted.kind,
        chunks.len(),
        chunking.chunk_size,
        chunking.overlap,
        chunking.threshold
    );
    for chunk in &chunks {
        let preview: String = chunk.text.chars().take(60).collect();
        println!(
            "  #{} start={} chars={} | {}",
            chunk.index,
            chunk.start,
            chunk.char_len(),
            preview.replace('\n', " ")
        );
    }
    Ok(())
}
