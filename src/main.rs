mod agent_client;
mod chat;
mod config;
mod error;
mod ingest;
mod persist;

use std::fs;
use std::io::{self, Write};
use std::path::PathBuf;
use std::sync::Arc;

use agent_client::build_agent_client_from_env;
use anyhow::Context;
use chat::{AttachmentRef, ChatRelay, ChatTurn, MemoryCheckpointer};
use clap::{Parser, Subcommand};
use config::AppConfig;
use ingest::{
    detect_repository_urls, GitCliFetcher, PdfExtractConverter, PdfNormalizer, PersistPolicy,
    RepoCache, RepositoryNormalizer, SourceLanguage, TurnComposer,
};
use persist::build_persistence_from_env;
use tracing::{error, info};

#[derive(Parser, Debug)]
#[command(
    name = "kb-chat",
    about = "Chat relay that reads attached PDFs and GitHub repositories and saves them to a knowledge base"
)]
struct Cli {
    /// Optional one-shot prompt; if omitted the CLI enters interactive mode.
    #[arg(short, long)]
    prompt: Option<String>,

    /// File to attach to the one-shot prompt. Repeatable.
    #[arg(short, long = "attach", value_name = "FILE")]
    attachments: Vec<PathBuf>,

    /// Conversation thread id, shared with the agent as its session id.
    #[arg(long, default_value = "local")]
    thread: String,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Clone a GitHub repository and print its generated documentation.
    DocRepo {
        url: String,
        /// Source language to document; defaults to KB_CHAT_REPO_LANGUAGE or python.
        #[arg(long)]
        language: Option<SourceLanguage>,
        /// Write the document to this file instead of stdout.
        #[arg(long)]
        out: Option<PathBuf>,
    },
    /// Convert a PDF to normalized text.
    ConvertPdf { path: PathBuf },
    /// Print the GitHub repository URLs found in a message.
    DetectUrls { text: String },
    /// Print the relay's processing graph as Mermaid.
    Flow,
}

const STARTERS: [(&str, &str); 3] = [
    (
        "Tell me something interesting !",
        "Give me an interesting fact about history or science.",
    ),
    (
        "What is quantum computing?",
        "Explain what quantum computing is in simple terms.",
    ),
    (
        "Explain photosynthesis",
        "Can you explain how photosynthesis works? Include the key steps in the process.",
    ),
];

const FLOW_MERMAID: &str = "\
flowchart TD
    user([User turn]) --> relay[Chat relay]
    relay --> composer[Turn composer]
    composer --> pdfs{PDF attachments?}
    pdfs -- yes --> pdf[PDF normalizer]
    pdfs -- no --> urls{GitHub URLs?}
    pdf -- save the file --> persist[Persist + ingestion job]
    pdf -- otherwise --> urls
    urls -- yes --> repo[Repository normalizer]
    urls -- no --> agent[Agent]
    repo -- save --> persist
    repo -- otherwise --> agent
    persist --> reply([Reply])
    agent --> reply
";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    init_tracing();
    let cli = Cli::parse();

    let config = AppConfig::from_env().context("Invalid configuration")?;

    if let Some(command) = cli.command {
        return run_command(command, &config).await;
    }

    let relay = build_relay(&config).context("Failed to initialize chat relay")?;

    if let Some(prompt) = cli.prompt {
        let turn = cli
            .attachments
            .into_iter()
            .map(AttachmentRef::new)
            .fold(ChatTurn::new(prompt), ChatTurn::with_attachment);
        let reply = relay.handle_turn(&cli.thread, turn).await?;
        println!("\nAgent:\n{}\n", reply);
        return Ok(());
    }

    run_repl(&relay, &cli.thread).await
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_target(false)
        .try_init();
}

fn repository_normalizer(config: &AppConfig, language: SourceLanguage) -> RepositoryNormalizer {
    RepositoryNormalizer::new(
        RepoCache::new(&config.clone.saved_repos_dir),
        GitCliFetcher::shared(config.clone.timeout),
        language,
    )
}

fn build_relay(config: &AppConfig) -> anyhow::Result<ChatRelay> {
    let agent = build_agent_client_from_env(true).context("Agent client initialization failed")?;
    let persistence =
        build_persistence_from_env(config, true).context("Persistence initialization failed")?;

    let composer = TurnComposer::new(
        PdfNormalizer::new(Arc::new(PdfExtractConverter)),
        repository_normalizer(config, config.clone.language),
        persistence,
        PersistPolicy {
            pdf_target: config.pdf_target.clone(),
            pdf_triggers: config.pdf_triggers.clone(),
            repo_target: config.repo_target.clone(),
            repo_triggers: config.repo_triggers.clone(),
        },
    );

    info!(
        pdf_triggers = ?config.pdf_triggers.phrases(),
        repo_triggers = ?config.repo_triggers.phrases(),
        saved_repos = %config.clone.saved_repos_dir.display(),
        "Chat relay ready"
    );
    Ok(ChatRelay::new(MemoryCheckpointer::shared(), composer, agent))
}

async fn run_command(command: Commands, config: &AppConfig) -> anyhow::Result<()> {
    match command {
        Commands::DocRepo { url, language, out } => {
            let url = detect_repository_urls(Some(&url))
                .into_iter()
                .next()
                .with_context(|| format!("'{url}' is not a GitHub repository URL"))?;
            let normalizer =
                repository_normalizer(config, language.unwrap_or(config.clone.language));
            let artifact = normalizer
                .normalize(&url)
                .await
                .with_context(|| format!("Failed to document {url}"))?;

            match out {
                Some(path) => {
                    fs::write(&path, &artifact.body)
                        .with_context(|| format!("Failed to write {}", path.display()))?;
                    println!("Wrote documentation for {} to {}", artifact.label, path.display());
                }
                None => println!("{}", artifact.body),
            }
        }
        Commands::ConvertPdf { path } => {
            let normalizer = PdfNormalizer::new(Arc::new(PdfExtractConverter));
            let artifact = normalizer
                .normalize(&AttachmentRef::new(&path))
                .await
                .with_context(|| format!("Failed to convert {}", path.display()))?;
            println!("{}", artifact.body);
        }
        Commands::DetectUrls { text } => {
            for url in detect_repository_urls(Some(&text)) {
                println!("{url}");
            }
        }
        Commands::Flow => print!("{FLOW_MERMAID}"),
    }
    Ok(())
}

/// What one line of REPL input asks for.
#[derive(Debug, PartialEq)]
enum ReplInput {
    Exit,
    Skip,
    History,
    Attach(PathBuf),
    Send(String),
}

fn parse_repl_line(line: &str) -> ReplInput {
    let trimmed = line.trim();
    if trimmed.eq_ignore_ascii_case("exit") {
        return ReplInput::Exit;
    }
    if trimmed.is_empty() {
        return ReplInput::Skip;
    }
    if trimmed.eq_ignore_ascii_case("history") {
        return ReplInput::History;
    }
    if let Some(path) = trimmed.strip_prefix("attach ") {
        let path = path.trim();
        if !path.is_empty() {
            return ReplInput::Attach(PathBuf::from(path));
        }
    }
    if let Ok(choice) = trimmed.parse::<usize>() {
        if let Some((_, message)) = choice.checked_sub(1).and_then(|i| STARTERS.get(i)) {
            return ReplInput::Send((*message).to_string());
        }
    }
    ReplInput::Send(trimmed.to_owned())
}

async fn run_repl(relay: &ChatRelay, thread_id: &str) -> anyhow::Result<()> {
    println!("kb-chat ready. Type 'exit' to quit, 'history' to review this thread, 'attach <path>' to add a file to your next message.\n");
    println!("Try one of these (enter its number):");
    for (index, (label, _)) in STARTERS.iter().enumerate() {
        println!("  {}. {}", index + 1, label);
    }
    println!();

    let stdin = io::stdin();
    let mut pending = Vec::new();

    loop {
        print!("You > ");
        io::stdout().flush()?;

        let mut buffer = String::new();
        if stdin.read_line(&mut buffer)? == 0 {
            break;
        }

        match parse_repl_line(&buffer) {
            ReplInput::Exit => {
                info!("User exited CLI");
                break;
            }
            ReplInput::Skip => continue,
            ReplInput::History => match relay.history(thread_id) {
                Ok(messages) => {
                    for message in messages {
                        println!(
                            "[{}] {:?}: {}",
                            message.timestamp.format("%H:%M:%S"),
                            message.role,
                            message.content
                        );
                    }
                }
                Err(err) => error!(?err, "Failed to read history"),
            },
            ReplInput::Attach(path) => {
                println!("Attached {} to your next message.", path.display());
                pending.push(AttachmentRef::new(path));
            }
            ReplInput::Send(text) => {
                let mut turn = ChatTurn::new(text);
                turn.attachments = std::mem::take(&mut pending);
                match relay.handle_turn(thread_id, turn).await {
                    Ok(reply) => println!("\nAgent:\n{}\n", reply),
                    Err(err) => error!(?err, "Turn failed"),
                }
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_accepts_prompt_flag_headlessly() {
        // Ensures CLI parsing stays non-interactive under `cargo test`.
        let cli = Cli::parse_from([
            "kb-chat", "--prompt", "hello", "--attach", "a.pdf", "--attach", "b.pdf",
        ]);
        assert_eq!(cli.prompt.as_deref(), Some("hello"));
        assert_eq!(cli.attachments, [PathBuf::from("a.pdf"), PathBuf::from("b.pdf")]);
        assert_eq!(cli.thread, "local");
        assert!(cli.command.is_none());
    }

    #[test]
    fn cli_help_is_emitted_as_error_kind() {
        // Clap returns DisplayHelp as an error; asserting keeps this headless and fast.
        let err = Cli::command()
            .try_get_matches_from(["kb-chat", "--help"])
            .expect_err("help should short-circuit");
        assert_eq!(err.kind(), clap::error::ErrorKind::DisplayHelp);
    }

    #[test]
    fn doc_repo_parses_language() {
        let cli = Cli::parse_from([
            "kb-chat",
            "doc-repo",
            "https://github.com/acme/widgets",
            "--language",
            "typescript",
        ]);
        match cli.command {
            Some(Commands::DocRepo { url, language, out }) => {
                assert_eq!(url, "https://github.com/acme/widgets");
                assert_eq!(language, Some(SourceLanguage::TypeScript));
                assert!(out.is_none());
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn unknown_language_is_rejected() {
        let err = Cli::try_parse_from(["kb-chat", "doc-repo", "github.com/a/b", "--language", "cobol"])
            .expect_err("unsupported language");
        assert_eq!(err.kind(), clap::error::ErrorKind::ValueValidation);
    }

    #[test]
    fn repl_lines_are_classified() {
        assert_eq!(parse_repl_line("  EXIT \n"), ReplInput::Exit);
        assert_eq!(parse_repl_line("\n"), ReplInput::Skip);
        assert_eq!(parse_repl_line("History"), ReplInput::History);
        assert_eq!(
            parse_repl_line("attach docs/report.pdf\n"),
            ReplInput::Attach(PathBuf::from("docs/report.pdf"))
        );
        assert_eq!(
            parse_repl_line("2"),
            ReplInput::Send(STARTERS[1].1.to_string())
        );
        assert_eq!(parse_repl_line("4"), ReplInput::Send("4".to_string()));
        assert_eq!(
            parse_repl_line("attachments are great"),
            ReplInput::Send("attachments are great".to_string())
        );
    }

    #[test]
    fn flow_covers_both_short_circuits() {
        assert!(FLOW_MERMAID.starts_with("flowchart TD"));
        assert_eq!(FLOW_MERMAID.matches("--> persist").count(), 2);
    }
}
