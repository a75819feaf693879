//! Natural-language SQL assistant - main entry point.

use nl_sql_assistant::assistant::{
    ALREADY_INDEXED, Assistant, IndexOptions, IndexSource, collect_documents, documents_from_dump,
};
use nl_sql_assistant::config::{AppSettings, Command, Config, DEFAULT_DUMP_DIR};
use nl_sql_assistant::db::{DatabaseConnector, DumpParser, PoolSettings};
use nl_sql_assistant::embeddings::OpenAiEmbedder;
use nl_sql_assistant::error::{AppError, AppResult};
use nl_sql_assistant::format::render;
use nl_sql_assistant::llm::OpenAiChat;
use nl_sql_assistant::transport::{HttpTransport, ReplTransport, Transport};
use nl_sql_assistant::vector_store::VectorStore;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use tracing::{error, info, warn};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

/// Initialize the tracing subscriber. Logs go to stderr so stdout stays
/// reserved for answers.
fn init_tracing(config: &Config) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));

    let subscriber = tracing_subscriber::registry().with(filter);

    if config.json_logs {
        subscriber
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        subscriber
            .with(
                fmt::layer()
                    .with_target(true)
                    .with_thread_ids(false)
                    .with_writer(std::io::stderr),
            )
            .init();
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let config = Config::parse_args();
    init_tracing(&config);

    info!("Starting nl-sql-assistant v{}", env!("CARGO_PKG_VERSION"));

    match run(config).await {
        Ok(code) => code,
        Err(e) => {
            error!(error = %e, "Fatal error");
            eprintln!("Error: {}", e.user_message());
            ExitCode::FAILURE
        }
    }
}

async fn run(config: Config) -> AppResult<ExitCode> {
    let settings = AppSettings::load(&config.config_file)?;

    // Diagnostics that never call the API.
    match &config.command {
        Some(Command::InspectDump {
            file,
            table,
            list_tables,
            sample_limit,
            export_json,
            chunks,
        }) => {
            inspect_dump(
                file,
                table.as_deref(),
                *list_tables,
                *sample_limit,
                export_json.as_deref(),
                *chunks,
            )?;
            return Ok(ExitCode::SUCCESS);
        }
        Some(Command::Describe { sql_file }) => {
            describe(&config, &settings, sql_file.as_deref()).await?;
            return Ok(ExitCode::SUCCESS);
        }
        _ => {}
    }

    let index_dump = match &config.command {
        Some(Command::Index { sql_file, .. }) => sql_file.clone().or(config.sql_file.clone()),
        _ => config.sql_file.clone(),
    };
    let use_database = !config.offline
        && !matches!(config.command, Some(Command::Index { sql_file: Some(_), .. }));
    let assistant = Arc::new(build_assistant(&config, settings.clone(), use_database).await?);

    match config.command.clone() {
        Some(Command::Index {
            keep_existing,
            include_columns,
            sample_rows,
            ..
        }) => {
            let options = IndexOptions {
                force: true,
                keep_existing,
                include_columns,
                sample_rows: sample_rows.unwrap_or(settings.embedding.sample_rows),
            };
            let source = index_source(index_dump.as_deref(), assistant.is_offline())?;
            let report = assistant.initialize_vector_db(&source, options).await?;
            println!(
                "Indexed {} tables ({} sample chunks, {} columns)",
                report.tables, report.chunks, report.columns
            );
            shutdown(&assistant).await;
            Ok(ExitCode::SUCCESS)
        }
        Some(Command::Serve { host, port }) => {
            initialize_if_requested(&config, &assistant, index_dump.as_deref()).await?;
            let transport = HttpTransport::new(assistant, host, port);
            info!(transport = transport.name(), addr = %transport.bind_addr(), "Starting front end");
            transport.run().await?;
            info!("Server shutdown complete");
            Ok(ExitCode::SUCCESS)
        }
        Some(Command::InspectDump { .. }) | Some(Command::Describe { .. }) => Ok(ExitCode::SUCCESS),
        None => {
            initialize_if_requested(&config, &assistant, index_dump.as_deref()).await?;
            if !assistant.vector_store().has_embeddings().await? {
                warn!("Vector database has no embeddings. Run with --init or the index command");
            }

            let code = match &config.query {
                Some(question) => answer_once(&assistant, question, &config).await,
                None => {
                    let options = IndexOptions {
                        force: true,
                        keep_existing: false,
                        include_columns: false,
                        sample_rows: settings.embedding.sample_rows,
                    };
                    let transport = ReplTransport::new(assistant.clone(), config.format, options);
                    info!(transport = transport.name(), "Starting front end");
                    transport.run().await?;
                    ExitCode::SUCCESS
                }
            };
            shutdown(&assistant).await;
            Ok(code)
        }
    }
}

async fn connect_database(config: &Config) -> AppResult<DatabaseConnector> {
    let settings = config.database();
    let url = settings.connection_url()?;
    info!(url = %settings.masked_url(), "Connecting to database");

    let pool_settings = PoolSettings {
        acquire_timeout: config.connect_timeout_duration(),
        read_only: !config.allow_writes,
        ..PoolSettings::default()
    };
    DatabaseConnector::connect(
        &url,
        &pool_settings,
        config.query_timeout_duration(),
        config.max_rows,
    )
    .await
}

async fn build_assistant(
    config: &Config,
    settings: AppSettings,
    use_database: bool,
) -> AppResult<Assistant> {
    let api_key = config.api_key()?;
    let dimensions = settings.embedding.dimensions();

    let embedder = OpenAiEmbedder::new(
        api_key,
        config.openai_base_url.as_str(),
        settings.embedding.model.as_str(),
        dimensions,
    )?
    .with_requested_dimensions(settings.embedding.dimensions);
    let chat = OpenAiChat::new(api_key, config.openai_base_url.as_str(), settings.llm.clone())?;
    let store = VectorStore::open(
        &config.vector_db_path,
        settings.vector_store.collection.as_str(),
        dimensions,
        settings.vector_store.batch_size,
    )
    .await?;

    let database = if use_database {
        Some(connect_database(config).await?)
    } else {
        info!("Running in offline mode; SQL will not be executed");
        None
    };

    Assistant::builder()
        .embedder(Arc::new(embedder))
        .completion(Arc::new(chat))
        .vector_store(Arc::new(store))
        .database(database)
        .settings(settings)
        .allow_writes(config.allow_writes)
        .dump_file(config.sql_file.clone())
        .build()
}

/// Dump when given a file or running offline, otherwise the database.
fn index_source(sql_file: Option<&Path>, offline: bool) -> AppResult<IndexSource> {
    if sql_file.is_some() || offline {
        IndexSource::dump(sql_file, Path::new(DEFAULT_DUMP_DIR))
    } else {
        Ok(IndexSource::Database)
    }
}

async fn initialize_if_requested(
    config: &Config,
    assistant: &Assistant,
    sql_file: Option<&Path>,
) -> AppResult<()> {
    if !config.init && !config.force_init {
        return Ok(());
    }
    let options = IndexOptions {
        force: config.force_init,
        keep_existing: false,
        include_columns: false,
        sample_rows: assistant.settings().embedding.sample_rows,
    };
    let source = index_source(sql_file, assistant.is_offline())?;
    let report = assistant.initialize_vector_db(&source, options).await?;
    if report.skipped {
        println!("{ALREADY_INDEXED}");
    } else {
        println!("Vector database initialized with {} tables", report.tables);
    }
    Ok(())
}

async fn answer_once(assistant: &Assistant, question: &str, config: &Config) -> ExitCode {
    let outcome = assistant.process_query(question).await;
    if !outcome.success {
        eprintln!(
            "Error: {}",
            outcome.error.as_deref().unwrap_or("Unknown error")
        );
        return ExitCode::FAILURE;
    }

    println!("SQL Query:\n{}", outcome.sql);
    if !outcome.explanation.is_empty() {
        println!("\nExplanation:\n{}", outcome.explanation);
    }
    if outcome.offline_mode {
        println!("\nOFFLINE MODE: Query not executed");
    } else {
        println!("\nResults:\n{}", render(&outcome.query_result(), config.format));
    }
    ExitCode::SUCCESS
}

async fn shutdown(assistant: &Assistant) {
    if let Some(database) = assistant.database() {
        database.close().await;
    }
    assistant.vector_store().close().await;
}

fn inspect_dump(
    file: &Path,
    table: Option<&str>,
    list_tables: bool,
    sample_limit: usize,
    export_json: Option<&Path>,
    chunks: bool,
) -> AppResult<()> {
    let parser = DumpParser::open(file)?;
    let names = parser.table_names();
    println!("Found {} tables in {}", names.len(), file.display());

    if list_tables {
        for name in &names {
            println!("  - {name}");
        }
        return Ok(());
    }

    if let Some(path) = export_json {
        let json = serde_json::to_string_pretty(&parser.export(sample_limit))?;
        std::fs::write(path, json)?;
        println!("Exported schema and samples to {}", path.display());
    }

    let documents: Vec<_> = documents_from_dump(&parser, sample_limit)
        .into_iter()
        .filter(|doc| table.is_none_or(|t| doc.table_name() == t))
        .collect();
    if let Some(table) = table {
        if documents.is_empty() {
            return Err(AppError::invalid_input(format!(
                "Table '{table}' not found in {}",
                file.display()
            )));
        }
    }

    for doc in documents {
        println!("\n{}", "=".repeat(60));
        if chunks {
            println!("{}", doc.chunk.as_deref().unwrap_or_default());
        } else {
            println!("{}", doc.description);
            println!("Sample rows: {}", doc.samples.len());
        }
    }
    Ok(())
}

async fn describe(config: &Config, settings: &AppSettings, sql_file: Option<&Path>) -> AppResult<()> {
    let sql_file: Option<PathBuf> = sql_file.map(Path::to_path_buf).or(config.sql_file.clone());
    let database = if sql_file.is_none() && !config.offline {
        Some(connect_database(config).await?)
    } else {
        None
    };
    let source = index_source(sql_file.as_deref(), database.is_none())?;

    let documents =
        collect_documents(database.as_ref(), &source, settings.embedding.sample_rows).await?;
    for doc in &documents {
        println!("{}", doc.description);
        if let Some(chunk) = &doc.chunk {
            println!("{chunk}");
        }
        println!("{}", "-".repeat(60));
    }
    println!("{} table documents", documents.len());

    if let Some(database) = database {
        database.close().await;
    }
    Ok(())
}
