//! Request lifecycle: validate, prepare, perform, finalize, follow.
//!
//! # Design
//! `Client` holds only an engine and its configuration. `execute` builds an
//! empty `Response`, prepares a `Transfer` from the options, lets the engine
//! stream header and body chunks straight into the response's accumulators
//! and finally records the completion data. Any error, including a failed
//! accumulator append, ends the request and is returned as is; the partly
//! filled response is dropped with it.
//!
//! Redirects are followed explicitly with `follow_redirect`, which appends
//! the new response at the tail of the chain:
//! - 303 switches to GET (HEAD stays HEAD),
//! - 301 and 302 switch anything but GET/HEAD to GET,
//! - 307 and 308 keep method and body.
//!
//! A method switch drops the request body. Header credentials are dropped
//! when the redirect leaves the origin.

use std::sync::Arc;
use std::time::Duration;

use url::Url;

use crate::auth::preemptive_header;
use crate::config::EngineConfig;
use crate::engine::{Engine, Transfer};
use crate::error::HttpError;
use crate::global;
use crate::options::{Auth, RequestOptions};
use crate::response::{RequestRecord, Response};

/// Longest redirect chain `follow_redirect` will build.
pub const MAX_REDIRECTS: u32 = 10;

#[derive(Clone)]
pub struct Client {
    engine: Arc<dyn Engine>,
    config: EngineConfig,
}

impl Client {
    /// Client over the shared process-wide engine.
    pub fn new() -> Self {
        let engine = global::init();
        let config = engine.config().clone();
        Self { engine, config }
    }

    pub fn with_engine(engine: Arc<dyn Engine>) -> Self {
        Self::with_engine_and_config(engine, EngineConfig::default())
    }

    pub fn with_engine_and_config(engine: Arc<dyn Engine>, config: EngineConfig) -> Self {
        Self { engine, config }
    }

    /// Perform one request and capture its response.
    ///
    /// Blocks until the engine has finished the transfer or failed. Without
    /// `timeout_seconds` this may block indefinitely.
    pub fn execute(
        &self,
        method: &str,
        url: &str,
        options: Option<&RequestOptions>,
    ) -> Result<Response, HttpError> {
        if method.is_empty() {
            return Err(HttpError::invalid("method must not be empty"));
        }
        if url.is_empty() {
            return Err(HttpError::invalid("url must not be empty"));
        }
        let request = RequestRecord {
            method: method.to_string(),
            url: url.to_string(),
            options: options.cloned().unwrap_or_default(),
        };
        self.run(request, 0)
    }

    /// Request the redirect target of the last response in `response`'s
    /// chain and append the result to the chain.
    pub fn follow_redirect<'r>(&self, response: &'r mut Response) -> Result<&'r mut Response, HttpError> {
        let tail = response.last_mut();

        let redirect_count = tail.redirect_count + 1;
        if redirect_count > MAX_REDIRECTS {
            return Err(HttpError::TooManyRedirects { max: MAX_REDIRECTS });
        }
        let target = tail
            .redirect_target_url()
            .ok_or_else(|| HttpError::invalid("response has no redirect target"))?
            .to_string();

        let previous = &tail.request;
        let mut options = previous.options.clone();
        let method = match redirect_method(tail.status_code(), &previous.method) {
            Some(switched) => {
                options = options.without_body();
                switched.to_string()
            }
            None => previous.method.clone(),
        };

        if options.auth.as_ref().is_some_and(Auth::is_header_credential)
            && !same_origin(&previous.url, &target)
        {
            tracing::debug!(%target, "dropping credentials on cross-origin redirect");
            options.auth = None;
        }

        let next = self.run(
            RequestRecord {
                method,
                url: target,
                options,
            },
            redirect_count,
        )?;
        Ok(tail.append(next))
    }

    fn run(&self, request: RequestRecord, redirect_count: u32) -> Result<Response, HttpError> {
        let span = tracing::debug_span!(
            "http_request",
            method = %request.method,
            url = %request.url,
            redirect_count
        );
        let _guard = span.enter();

        let limit = request.options.max_response_bytes.or(self.config.max_buffer_bytes);
        let mut response = Response::shell(request, redirect_count, limit);

        let outcome = {
            let transfer = self.prepare(&response.request);
            self.engine
                .perform(&transfer, &mut response.headers, &mut response.body)
        };
        let completion = match outcome {
            Ok(completion) => completion,
            Err(err) => {
                tracing::warn!(error = %err, "request failed");
                return Err(err);
            }
        };

        response.finalize(completion)?;
        tracing::debug!(
            status = response.status_code(),
            header_bytes = response.header_bytes_length(),
            body_bytes = response.body_bytes_length(),
            elapsed_s = response.elapsed_seconds(),
            "request complete"
        );
        Ok(response)
    }

    /// Turn the options into headers and engine settings.
    fn prepare<'a>(&self, request: &'a RequestRecord) -> Transfer<'a> {
        let options = &request.options;
        let mut headers = vec![("user-agent".to_string(), self.config.user_agent.clone())];

        if let Some(cookies) = &options.cookies {
            headers.push(("cookie".to_string(), cookies.clone()));
        }

        let body = match (&options.json_body, &options.body) {
            (Some(json), raw) => {
                if raw.is_some() {
                    tracing::warn!("json body replaces the raw request body");
                }
                headers.push(("content-type".to_string(), "application/json".to_string()));
                Some(json.as_bytes())
            }
            (None, Some(raw)) => Some(raw.as_slice()),
            (None, None) => None,
        };

        let mut engine_auth = None;
        if let Some(auth) = &options.auth {
            match preemptive_header(auth) {
                Some(value) => headers.push(("authorization".to_string(), value)),
                None => engine_auth = Some(auth),
            }
        }

        Transfer {
            method: &request.method,
            url: &request.url,
            headers,
            body,
            timeout: options
                .timeout_seconds
                .filter(|secs| *secs > 0)
                .map(Duration::from_secs),
            proxy: options.proxy.as_deref(),
            auth: engine_auth,
        }
    }
}

impl Default for Client {
    fn default() -> Self {
        Self::new()
    }
}

/// Method to switch to when following a `status` redirect, if any.
fn redirect_method(status: u16, method: &str) -> Option<&'static str> {
    let is = |m: &str| method.eq_ignore_ascii_case(m);
    match status {
        303 if !is("GET") && !is("HEAD") => Some("GET"),
        301 | 302 if !is("GET") && !is("HEAD") => Some("GET"),
        _ => None,
    }
}

fn same_origin(a: &str, b: &str) -> bool {
    match (Url::parse(a), Url::parse(b)) {
        (Ok(a), Ok(b)) => {
            a.scheme() == b.scheme()
                && a.host_str() == b.host_str()
                && a.port_or_known_default() == b.port_or_known_default()
        }
        _ => false,
    }
}
