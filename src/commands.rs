use std::path::{Path, PathBuf};

use anyhow::{Context, bail};
use regula_core::{
    Answer, App, ChainError, ChainType, ConversationState, ConversationalChain, QaChain,
    with_cancellation,
};
use regula_llm::any::AnyProvider;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio_util::sync::CancellationToken;

use crate::output;

const EXIT_COMMANDS: [&str; 3] = ["quit", "exit", "q"];

pub async fn ingest(app: &App, path: Option<PathBuf>, rebuild: bool) -> anyhow::Result<()> {
    let root = path.unwrap_or_else(|| app.config().paths.documents.clone());
    let pipeline = app.ingestion_pipeline()?;
    let report = pipeline.run(&root, rebuild).await?;
    for skipped in &report.skipped {
        tracing::warn!(path = %skipped.path.display(), error = %skipped.error, "document skipped");
    }
    tracing::info!(
        collection = pipeline.collection(),
        entries = report.entries,
        skipped = report.skipped.len(),
        reused = report.reused,
        "ingest finished"
    );
    println!("{}", output::ingest_report(&report));
    Ok(())
}

enum Session {
    Qa(QaChain<AnyProvider, AnyProvider>),
    Conversational {
        chain: ConversationalChain<AnyProvider, AnyProvider>,
        state: ConversationState,
    },
}

impl Session {
    fn new(app: &App) -> Self {
        match app.config().retrieval.chain_type {
            ChainType::Conversational => Self::Conversational {
                chain: app.conversational_chain(),
                state: app.new_conversation(),
            },
            ChainType::Qa => Self::Qa(app.qa_chain()),
            other => {
                tracing::warn!(chain_type = %other, "chain type is not interactive, using qa");
                Self::Qa(app.qa_chain())
            }
        }
    }

    async fn ask(&mut self, question: &str, token: &CancellationToken) -> Result<Answer, ChainError> {
        match self {
            Self::Qa(chain) => with_cancellation(token, chain.run(question)).await,
            Self::Conversational { chain, state } => {
                let (answer, next) = with_cancellation(token, chain.ask(state, question)).await?;
                *state = next;
                Ok(answer)
            }
        }
    }
}

/// Read questions from stdin until EOF, an exit command or Ctrl-C at the prompt.
/// Ctrl-C while a question is in flight cancels only that question.
pub async fn ask(app: &App) -> anyhow::Result<()> {
    let mut session = Session::new(app);
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdout = tokio::io::stdout();

    println!("Ask a question about the indexed regulations (quit, exit or q to leave).");
    loop {
        stdout.write_all(b"> ").await?;
        stdout.flush().await?;

        let line = tokio::select! {
            line = lines.next_line() => line.context("failed to read from stdin")?,
            _ = tokio::signal::ctrl_c() => None,
        };
        let Some(line) = line else {
            println!();
            break;
        };
        let question = line.trim();
        if question.is_empty() {
            continue;
        }
        if EXIT_COMMANDS.contains(&question.to_ascii_lowercase().as_str()) {
            break;
        }

        let token = CancellationToken::new();
        let interrupt = {
            let token = token.clone();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    token.cancel();
                }
            })
        };
        let result = session.ask(question, &token).await;
        interrupt.abort();

        match result {
            Ok(answer) => println!("{}\n", output::answer(&answer)),
            Err(ChainError::Cancelled) => println!("(cancelled)\n"),
            Err(e) => {
                tracing::warn!(error = %e, retryable = e.is_retryable(), "question failed");
                println!("{}\n", output::failure(&e));
            }
        }
    }
    Ok(())
}

pub async fn check(app: &App, topic: &str, practices: &str, json: bool) -> anyhow::Result<()> {
    let assessment = app
        .compliance_chain()
        .check(topic, practices)
        .await
        .context("compliance check failed")?;
    if json {
        println!("{}", serde_json::to_string_pretty(&assessment)?);
    } else {
        println!("{}", output::assessment(&assessment));
    }
    Ok(())
}

pub async fn summarize(app: &App, paths: &[PathBuf]) -> anyhow::Result<()> {
    let loader = app.document_loader();
    let mut documents = Vec::new();
    for path in paths {
        documents.extend(load(&loader, path).await?);
    }
    if documents.is_empty() {
        bail!("no supported documents found");
    }
    tracing::info!(documents = documents.len(), "summarizing");

    let summary = app
        .summary_chain()
        .summarize(&documents)
        .await
        .context("summarization failed")?;
    println!("{summary}");
    Ok(())
}

async fn load(
    loader: &regula_knowledge::document::DirectoryLoader,
    path: &Path,
) -> anyhow::Result<Vec<regula_knowledge::Document>> {
    if path.is_dir() {
        let report = loader.load_directory(path).await?;
        for skipped in &report.skipped {
            tracing::warn!(path = %skipped.path.display(), error = %skipped.error, "document skipped");
        }
        Ok(report.documents)
    } else {
        loader
            .load_file(path)
            .await
            .with_context(|| format!("failed to load {}", path.display()))
    }
}
