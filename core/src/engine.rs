//! Transfer engines: the external collaborator that does the network work.
//!
//! # Design
//! The lifecycle manager prepares a `Transfer` (plain data, like an HTTP
//! request description) and hands it to an `Engine` together with two chunk
//! sinks. The engine delivers header bytes and body bytes through the sinks
//! as they arrive and returns a `Completion` with everything a caller may
//! later ask about. Nothing engine-specific outlives `perform`.
//!
//! `UreqEngine` is the default. It never follows redirects on its own and
//! never turns HTTP status codes into errors: redirects are followed
//! explicitly through the response chain, and statuses are data.

use std::io::{self, Read};
use std::time::{Duration, Instant};

use ureq::http::{self, header, Method};
use ureq::tls::{Certificate, ClientCert, PrivateKey, TlsConfig};
use ureq::Agent;
use url::Url;
use uuid::Uuid;

use crate::auth::DigestChallenge;
use crate::buffer::ChunkSink;
use crate::config::EngineConfig;
use crate::error::{HttpError, TransportCode};
use crate::options::Auth;

/// Upper bound of a single body chunk handed to a sink.
pub const BODY_CHUNK_SIZE: usize = 16 * 1024;

/// One request, prepared for an engine.
#[derive(Debug, Clone)]
pub struct Transfer<'a> {
    pub method: &'a str,
    pub url: &'a str,
    pub headers: Vec<(String, String)>,
    pub body: Option<&'a [u8]>,
    pub timeout: Option<Duration>,
    pub proxy: Option<&'a str>,
    /// Credentials the engine must handle itself (Digest, X509).
    pub auth: Option<&'a Auth>,
}

/// Everything captured when a transfer finishes.
#[derive(Debug, Clone, PartialEq)]
pub struct Completion {
    pub status: u16,
    pub effective_url: String,
    pub redirect_url: Option<String>,
    pub elapsed: Duration,
}

/// Performs transfers. Implementations must be usable from several threads,
/// each running its own transfer.
pub trait Engine: Send + Sync {
    fn perform(
        &self,
        transfer: &Transfer<'_>,
        headers: &mut dyn ChunkSink,
        body: &mut dyn ChunkSink,
    ) -> Result<Completion, HttpError>;
}

/// Target of a 3xx response's `Location`, resolved against `effective_url`.
pub fn resolve_redirect(effective_url: &str, status: u16, location: Option<&str>) -> Option<String> {
    if !(300..400).contains(&status) {
        return None;
    }
    let location = location?.trim();
    if location.is_empty() {
        return None;
    }
    let base = Url::parse(effective_url).ok()?;
    base.join(location).ok().map(String::from)
}

/// Engine backed by a blocking `ureq` agent.
#[derive(Debug, Clone, Default)]
pub struct UreqEngine {
    config: EngineConfig,
}

impl UreqEngine {
    pub fn new(config: EngineConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    fn agent(&self, transfer: &Transfer<'_>) -> Result<Agent, HttpError> {
        let mut builder = Agent::config_builder()
            .http_status_as_error(false)
            .max_redirects(0)
            .max_redirects_will_error(false)
            .allow_non_standard_methods(true)
            .timeout_connect(self.config.connect_timeout_secs.map(Duration::from_secs))
            .timeout_global(transfer.timeout);

        if let Some(proxy) = transfer.proxy {
            let proxy = ureq::Proxy::new(proxy)
                .map_err(|e| HttpError::transport(TransportCode::Proxy, e.to_string()))?;
            builder = builder.proxy(Some(proxy));
        }

        if let Some(Auth::X509 { cert, key, password }) = transfer.auth {
            builder = builder.tls_config(client_cert_tls(cert, key, password.as_deref())?);
        }

        Ok(builder.build().new_agent())
    }

    fn send(
        &self,
        agent: &Agent,
        transfer: &Transfer<'_>,
        authorization: Option<&str>,
    ) -> Result<http::Response<ureq::Body>, HttpError> {
        let method = Method::from_bytes(transfer.method.as_bytes())
            .map_err(|_| HttpError::invalid(format!("unusable method {:?}", transfer.method)))?;
        let uri: http::Uri = transfer
            .url
            .parse()
            .map_err(|e| HttpError::transport(TransportCode::MalformedUrl, format!("{}: {e}", transfer.url)))?;

        let mut builder = http::Request::builder().method(method).uri(uri);
        for (name, value) in &transfer.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        if let Some(authorization) = authorization {
            builder = builder.header(header::AUTHORIZATION, authorization);
        }

        let result = match transfer.body {
            Some(bytes) => agent.run(builder.body(bytes).map_err(invalid_request)?),
            None => agent.run(builder.body(()).map_err(invalid_request)?),
        };
        result.map_err(transport_error)
    }
}

impl Engine for UreqEngine {
    fn perform(
        &self,
        transfer: &Transfer<'_>,
        headers: &mut dyn ChunkSink,
        body: &mut dyn ChunkSink,
    ) -> Result<Completion, HttpError> {
        let agent = self.agent(transfer)?;
        let started = Instant::now();

        let mut response = self.send(&agent, transfer, None)?;

        if let Some(Auth::Digest { username, password }) = transfer.auth {
            if response.status() == http::StatusCode::UNAUTHORIZED {
                if let Some(challenge) = digest_challenge(&response) {
                    let target = request_target(transfer.url)?;
                    let cnonce = Uuid::new_v4().simple().to_string();
                    let authorization =
                        challenge.respond(username, password, transfer.method, &target, &cnonce);
                    tracing::debug!(realm = %challenge.realm, "answering digest challenge");
                    drop(response);
                    response = self.send(&agent, transfer, Some(&authorization))?;
                }
            }
        }

        let status = response.status().as_u16();
        let location = response
            .headers()
            .get(header::LOCATION)
            .and_then(|v| v.to_str().ok())
            .map(str::to_owned);

        emit_headers(&response, headers)?;

        let mut reader = response.into_body().into_reader();
        let mut chunk = vec![0u8; BODY_CHUNK_SIZE];
        loop {
            let n = match reader.read(&mut chunk) {
                Ok(0) => break,
                Ok(n) => n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(io_error(e)),
            };
            tracing::trace!(bytes = n, "body chunk");
            // An Err here drops the reader and with it the connection.
            body.write_chunk(&chunk[..n])?;
        }

        let effective_url = transfer.url.to_string();
        Ok(Completion {
            status,
            redirect_url: resolve_redirect(&effective_url, status, location.as_deref()),
            effective_url,
            elapsed: started.elapsed(),
        })
    }
}

/// Deliver the header block one CRLF-terminated line per chunk.
fn emit_headers(response: &http::Response<ureq::Body>, sink: &mut dyn ChunkSink) -> Result<(), HttpError> {
    let status = response.status();
    let status_line = match status.canonical_reason() {
        Some(reason) => format!("{:?} {} {reason}\r\n", response.version(), status.as_u16()),
        None => format!("{:?} {}\r\n", response.version(), status.as_u16()),
    };
    sink.write_chunk(status_line.as_bytes())?;

    let mut line = Vec::new();
    for (name, value) in response.headers() {
        line.clear();
        line.extend_from_slice(name.as_str().as_bytes());
        line.extend_from_slice(b": ");
        line.extend_from_slice(value.as_bytes());
        line.extend_from_slice(b"\r\n");
        sink.write_chunk(&line)?;
    }
    sink.write_chunk(b"\r\n")
}

fn digest_challenge(response: &http::Response<ureq::Body>) -> Option<DigestChallenge> {
    response
        .headers()
        .get_all(header::WWW_AUTHENTICATE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .find_map(DigestChallenge::parse)
}

/// Path and query of `url`, as used in the digest `uri` parameter.
fn request_target(url: &str) -> Result<String, HttpError> {
    let parsed = Url::parse(url)
        .map_err(|e| HttpError::transport(TransportCode::MalformedUrl, format!("{url}: {e}")))?;
    let mut target = parsed.path().to_string();
    if let Some(query) = parsed.query() {
        target.push('?');
        target.push_str(query);
    }
    Ok(target)
}

fn client_cert_tls(cert: &str, key: &str, password: Option<&str>) -> Result<TlsConfig, HttpError> {
    if password.is_some_and(|p| !p.is_empty()) {
        return Err(HttpError::invalid("encrypted private keys are not supported"));
    }
    let cert_pem = std::fs::read(cert).map_err(|e| HttpError::invalid(format!("client certificate {cert}: {e}")))?;
    let key_pem = std::fs::read(key).map_err(|e| HttpError::invalid(format!("private key {key}: {e}")))?;

    let certificate = Certificate::from_pem(&cert_pem)
        .map_err(|e| HttpError::invalid(format!("client certificate {cert}: {e}")))?;
    let private_key =
        PrivateKey::from_pem(&key_pem).map_err(|e| HttpError::invalid(format!("private key {key}: {e}")))?;

    let client_cert = ClientCert::new_with_certs(&[certificate], private_key);
    Ok(TlsConfig::builder().client_cert(Some(client_cert)).build())
}

fn invalid_request(err: http::Error) -> HttpError {
    HttpError::invalid(format!("request rejected: {err}"))
}

fn classify(err: &ureq::Error) -> TransportCode {
    match err {
        ureq::Error::Timeout(_) => TransportCode::Timeout,
        ureq::Error::HostNotFound => TransportCode::HostNotFound,
        ureq::Error::ConnectionFailed => TransportCode::ConnectFailed,
        ureq::Error::BadUri(_) => TransportCode::MalformedUrl,
        ureq::Error::InvalidProxyUrl | ureq::Error::ConnectProxyFailed(_) => TransportCode::Proxy,
        ureq::Error::Tls(_) => TransportCode::Tls,
        ureq::Error::Io(e) => io_code(e),
        _ => TransportCode::Other,
    }
}

fn io_code(err: &io::Error) -> TransportCode {
    match err.kind() {
        io::ErrorKind::TimedOut => TransportCode::Timeout,
        io::ErrorKind::ConnectionRefused => TransportCode::ConnectFailed,
        _ => TransportCode::Io,
    }
}

fn transport_error(err: ureq::Error) -> HttpError {
    HttpError::transport(classify(&err), err.to_string())
}

/// Errors surfacing while reading the body arrive as `io::Error`, possibly
/// wrapping the engine's own error.
fn io_error(err: io::Error) -> HttpError {
    let code = match err.get_ref().and_then(|inner| inner.downcast_ref::<ureq::Error>()) {
        Some(inner) => classify(inner),
        None => io_code(&err),
    };
    HttpError::transport(code, err.to_string())
}
