//! Web front end.
//!
//! Routes:
//! - `GET /`: query form
//! - `GET /health`: liveness plus index status
//! - `GET /api/tables`: indexed table names
//! - `POST /api/query`: `{"question": ...}` → outcome plus the top schema previews

use crate::assistant::{Assistant, QueryOutcome, SchemaPreview, schema_previews};
use crate::error::{AppError, AppResult, REINDEX};
use crate::transport::Transport;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{Html, IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::signal;
use tracing::{error, info, warn};

/// Previews returned with each answer.
pub const PREVIEW_COUNT: usize = 3;
const GRACEFUL_TIMEOUT: Duration = Duration::from_secs(10);

const INDEX_HTML: &str = r#"<!doctype html>
<html lang="en">
<head>
<meta charset="utf-8">
<title>NL to SQL Converter</title>
<style>
body { font-family: sans-serif; max-width: 960px; margin: 2rem auto; padding: 0 1rem; }
textarea { width: 100%; height: 6rem; }
pre { background: #f4f4f4; padding: .75rem; overflow-x: auto; }
.error { color: #b00020; }
table { border-collapse: collapse; }
td, th { border: 1px solid #ccc; padding: .25rem .5rem; }
</style>
</head>
<body>
<h1>Natural Language to SQL Converter</h1>
<p>Ask questions about your database in plain English and get SQL queries.</p>
<textarea id="question" placeholder="Example: Find all users with admin role"></textarea>
<p><button id="submit">Generate SQL</button></p>
<div id="output"></div>
<script>
const esc = s => String(s ?? "").replace(/[&<>"]/g, c => ({"&":"&amp;","<":"&lt;",">":"&gt;","\"":"&quot;"}[c]));
document.getElementById("submit").onclick = async () => {
  const out = document.getElementById("output");
  const question = document.getElementById("question").value.trim();
  if (!question) { out.innerHTML = '<p class="error">Please enter a query</p>'; return; }
  out.innerHTML = "<p>Generating SQL query...</p>";
  const res = await fetch("/api/query", {method: "POST", headers: {"Content-Type": "application/json"}, body: JSON.stringify({question})});
  const data = await res.json();
  let html = "";
  if (data.sql) html += "<h2>Generated SQL</h2><pre>" + esc(data.sql) + "</pre>";
  if (data.explanation) html += "<h2>Explanation</h2><p>" + esc(data.explanation) + "</p>";
  if (data.error) html += '<p class="error">' + esc(data.error) + "</p>";
  if (data.success && !data.offline_mode && data.columns) {
    html += "<h2>Results</h2><table><tr>" + data.columns.map(c => "<th>" + esc(c) + "</th>").join("") + "</tr>";
    for (const row of data.results) html += "<tr>" + data.columns.map(c => "<td>" + esc(row[c]) + "</td>").join("") + "</tr>";
    html += "</table>";
  }
  if (data.schema && data.schema.length) {
    html += "<details><summary>View schema information used</summary>";
    for (const s of data.schema) html += "<p><b>Table: " + esc(s.table) + "</b> (score: " + s.score.toFixed(4) + ")</p><pre>" + esc(s.preview) + "</pre>";
    html += "</details>";
  }
  out.innerHTML = html;
};
</script>
</body>
</html>
"#;

#[derive(Debug, Deserialize)]
pub struct QueryRequest {
    #[serde(default)]
    pub question: String,
}

#[derive(Debug, Serialize)]
pub struct QueryResponse {
    #[serde(flatten)]
    pub outcome: QueryOutcome,
    pub schema: Vec<SchemaPreview>,
}

struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }
}

impl From<AppError> for ApiError {
    fn from(e: AppError) -> Self {
        let status = match &e {
            AppError::InvalidInput { .. } => StatusCode::BAD_REQUEST,
            AppError::VectorStore { .. } | AppError::Connection { .. } => {
                StatusCode::SERVICE_UNAVAILABLE
            }
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        Self::new(status, e.user_message())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(json!({ "error": self.message }))).into_response()
    }
}

/// Build the router; exposed for in-process tests.
pub fn router(assistant: Arc<Assistant>) -> Router {
    Router::new()
        .route("/", get(index))
        .route("/health", get(health))
        .route("/api/tables", get(tables))
        .route("/api/query", post(query))
        .with_state(assistant)
}

async fn index() -> Html<&'static str> {
    Html(INDEX_HTML)
}

async fn health(State(assistant): State<Arc<Assistant>>) -> Json<serde_json::Value> {
    let documents = assistant.vector_store().count().await.ok();
    Json(json!({
        "status": "ok",
        "offline_mode": assistant.is_offline(),
        "indexed": documents.is_some_and(|n| n > 0),
        "documents": documents,
    }))
}

async fn require_index(assistant: &Assistant) -> Result<(), ApiError> {
    if assistant.vector_store().count().await? == 0 {
        return Err(ApiError::new(
            StatusCode::SERVICE_UNAVAILABLE,
            format!("Vector database has no embeddings. {REINDEX}"),
        ));
    }
    Ok(())
}

async fn tables(
    State(assistant): State<Arc<Assistant>>,
) -> Result<Json<serde_json::Value>, ApiError> {
    require_index(&assistant).await?;
    let tables = assistant.indexed_tables().await?;
    Ok(Json(json!({ "tables": tables })))
}

async fn query(
    State(assistant): State<Arc<Assistant>>,
    Json(request): Json<QueryRequest>,
) -> Result<Json<QueryResponse>, ApiError> {
    let question = request.question.trim();
    if question.is_empty() {
        return Err(ApiError::new(StatusCode::BAD_REQUEST, "Please enter a query"));
    }
    require_index(&assistant).await?;

    let (outcome, hits) = assistant.process_query_with_context(question).await;
    Ok(Json(QueryResponse {
        outcome,
        schema: schema_previews(&hits, PREVIEW_COUNT),
    }))
}

pub struct HttpTransport {
    assistant: Arc<Assistant>,
    host: String,
    port: u16,
}

impl HttpTransport {
    pub fn new(assistant: Arc<Assistant>, host: impl Into<String>, port: u16) -> Self {
        Self {
            assistant,
            host: host.into(),
            port,
        }
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl Transport for HttpTransport {
    async fn run(&self) -> AppResult<()> {
        let bind_addr = self.bind_addr();
        if !self.assistant.vector_store().has_embeddings().await? {
            warn!("Vector database has no embeddings; queries will be refused until it is indexed");
        }

        let listener = TcpListener::bind(&bind_addr).await.map_err(|e| {
            AppError::connection(
                format!("Failed to bind to {}: {}", bind_addr, e),
                "Check that the port is available or pass --port",
            )
        })?;
        info!(addr = %bind_addr, "Web front end listening");

        let shutdown_notify = Arc::new(tokio::sync::Notify::new());
        let notify = shutdown_notify.clone();
        let shutdown_signal = async move {
            wait_for_signal().await;
            notify.notify_one();
        };

        let server = axum::serve(listener, router(self.assistant.clone()))
            .with_graceful_shutdown(shutdown_signal);

        tokio::select! {
            result = server => {
                if let Err(e) = result {
                    error!(error = %e, "HTTP server error");
                    return Err(AppError::internal(format!("HTTP server error: {}", e)));
                }
                info!("HTTP server stopped");
            }
            _ = async {
                shutdown_notify.notified().await;
                tokio::select! {
                    _ = tokio::time::sleep(GRACEFUL_TIMEOUT) => {
                        warn!("Graceful shutdown timeout, forcing exit");
                    }
                    _ = wait_for_signal() => {
                        warn!("Received second signal, forcing immediate exit");
                    }
                }
            } => {}
        }

        if let Some(database) = self.assistant.database() {
            database.close().await;
        }
        self.assistant.vector_store().close().await;
        Ok(())
    }

    fn name(&self) -> &'static str {
        "http"
    }
}

/// Wait for SIGINT or SIGTERM.
pub async fn wait_for_signal() {
    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = signal::ctrl_c() => info!("Received SIGINT"),
        _ = terminate => info!("Received SIGTERM"),
    }
}
