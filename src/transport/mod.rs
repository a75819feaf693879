//! User-facing front ends.
//!
//! - REPL: the interactive terminal session
//! - HTTP: a small web page plus a JSON API

pub mod http;
pub mod repl;

pub use http::HttpTransport;
pub use repl::ReplTransport;

use crate::error::AppResult;
use std::future::Future;

/// A front end that serves questions until the user or a signal stops it.
pub trait Transport: Send + Sync {
    /// Run until shut down.
    fn run(&self) -> impl Future<Output = AppResult<()>> + Send;

    /// Get the name of this transport for logging.
    fn name(&self) -> &'static str;
}
