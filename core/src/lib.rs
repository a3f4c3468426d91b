//! Response capture and request lifecycle for a blocking HTTP client.
//!
//! # Overview
//! `execute` runs one request through a transfer engine and captures the
//! response: header bytes and body bytes are accumulated chunk by chunk into
//! NUL-terminated buffers, and status, effective URL, redirect target and
//! elapsed time are recorded when the transfer completes. `follow_redirect`
//! extends a response into a redirect chain of at most ten hops.
//!
//! # Design
//! - `WriteBuffer` appends are all-or-nothing; a failed append aborts the
//!   transfer and is reported as `HttpError::OutOfMemory`.
//! - The engine sits behind the `Engine` trait. `UreqEngine` is the default
//!   and is shared process-wide through `global`.
//! - No engine state outlives a call: everything a caller can ask a
//!   `Response` is captured eagerly.
//! - Errors are values (`HttpError`); nothing is reported through globals.

pub mod auth;
pub mod buffer;
pub mod client;
pub mod config;
pub mod engine;
pub mod error;
pub mod global;
pub mod options;
pub mod response;

pub use buffer::{ChunkSink, WriteBuffer};
pub use client::{Client, MAX_REDIRECTS};
pub use config::EngineConfig;
pub use engine::{Completion, Engine, Transfer, UreqEngine};
pub use error::{HttpError, TransportCode};
pub use options::{Auth, RequestOptions};
pub use response::{RequestRecord, Response};

/// Run one request on the shared engine.
pub fn execute(method: &str, url: &str, options: Option<&RequestOptions>) -> Result<Response, HttpError> {
    Client::new().execute(method, url, options)
}

/// Follow the redirect at the tail of `response`'s chain on the shared engine.
pub fn follow_redirect(response: &mut Response) -> Result<&mut Response, HttpError> {
    Client::new().follow_redirect(response)
}
