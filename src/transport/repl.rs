//! Interactive terminal session.

use crate::assistant::{ALREADY_INDEXED, Assistant, IndexOptions, QueryOutcome};
use crate::error::AppResult;
use crate::format::{OutputFormat, render};
use crate::transport::Transport;
use std::sync::Arc;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::signal;
use tracing::info;

pub const BANNER: &str = "\n=== Natural Language Database Query Interface ===\n\
                          Enter 'exit' or 'quit' to exit, 'init' to initialize/update vector DB, 'help' for commands\n";
const HELP: &str = "\nCommands:\n  \
                    help    show this message\n  \
                    tables  list the indexed tables\n  \
                    init    initialize/update the vector DB\n  \
                    exit    leave (also 'quit')\n\
                    Anything else is answered as a question about the database.\n";
const PROMPT: &str = "\nEnter your query: ";

pub struct ReplTransport {
    assistant: Arc<Assistant>,
    format: OutputFormat,
    index_options: IndexOptions,
}

impl ReplTransport {
    pub fn new(assistant: Arc<Assistant>, format: OutputFormat, index_options: IndexOptions) -> Self {
        Self {
            assistant,
            format,
            index_options,
        }
    }

    /// Read questions from `input` until EOF, `exit` or `quit`.
    pub async fn run_session<R, W>(&self, input: R, mut output: W) -> AppResult<()>
    where
        R: AsyncBufRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        output.write_all(BANNER.as_bytes()).await?;
        let mut lines = input.lines();

        loop {
            output.write_all(PROMPT.as_bytes()).await?;
            output.flush().await?;

            let Some(line) = lines.next_line().await? else {
                break;
            };
            let line = line.trim();
            if line.is_empty() {
                continue;
            }

            let text = match line.to_lowercase().as_str() {
                "exit" | "quit" => break,
                "help" => HELP.to_string(),
                "tables" => self.list_tables().await,
                "init" => self.reindex().await,
                _ => {
                    let outcome = self.assistant.process_query(line).await;
                    render_outcome(&outcome, self.format)
                }
            };
            output.write_all(text.as_bytes()).await?;
        }

        output.flush().await?;
        Ok(())
    }

    async fn list_tables(&self) -> String {
        match self.assistant.indexed_tables().await {
            Ok(tables) if tables.is_empty() => {
                "No tables indexed yet. Run 'init' first.\n".to_string()
            }
            Ok(tables) => format!("\n=== Tables ===\n{}\n", tables.join("\n")),
            Err(e) => format!("Failed to list tables: {}\n", e.user_message()),
        }
    }

    async fn reindex(&self) -> String {
        let result = match self.assistant.default_index_source() {
            Ok(source) => {
                self.assistant
                    .initialize_vector_db(&source, self.index_options)
                    .await
            }
            Err(e) => Err(e),
        };
        match result {
            Ok(report) if report.skipped => format!("{ALREADY_INDEXED}\n"),
            Ok(_) => "Vector database initialized successfully\n".to_string(),
            Err(e) => format!("Failed to initialize vector database: {}\n", e.user_message()),
        }
    }
}

impl Transport for ReplTransport {
    async fn run(&self) -> AppResult<()> {
        info!("Starting interactive session");
        let stdin = BufReader::new(tokio::io::stdin());
        let stdout = tokio::io::stdout();

        tokio::select! {
            result = self.run_session(stdin, stdout) => result?,
            _ = signal::ctrl_c() => info!("Received SIGINT, ending session"),
        }
        Ok(())
    }

    fn name(&self) -> &'static str {
        "repl"
    }
}

/// Section-formatted text for one answered question.
pub fn render_outcome(outcome: &QueryOutcome, format: OutputFormat) -> String {
    let mut out = String::new();
    if outcome.success {
        out.push_str(&format!("\n=== SQL Query ===\n{}\n", outcome.sql));
        out.push_str(&format!("\n=== Explanation ===\n{}\n", outcome.explanation));
        if outcome.offline_mode {
            out.push_str("\n=== OFFLINE MODE ===\nQuery not executed. SQL query is shown above.\n");
        } else {
            out.push_str(&format!(
                "\n=== Results ===\n{}\n",
                render(&outcome.query_result(), format)
            ));
        }
    } else {
        out.push_str(&format!(
            "\n=== Error ===\n{}\n",
            outcome.error.as_deref().unwrap_or("Unknown error")
        ));
        if !outcome.explanation.is_empty() {
            out.push_str(&format!("\n=== Explanation ===\n{}\n", outcome.explanation));
        }
    }
    out
}
