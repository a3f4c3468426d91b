//! Per-request options and authentication credentials.
//!
//! # Design
//! `RequestOptions` is plain owned data. The lifecycle manager only borrows
//! it while preparing a transfer; a clone is kept on the `Response` so a
//! redirect can be re-issued with the same cookies, proxy and credentials.
//!
//! `Auth` is a sum type: each scheme carries exactly the fields it needs and
//! is dispatched with `match`.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::HttpError;

/// Credentials for one request.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Auth {
    Basic { username: String, password: String },
    Digest { username: String, password: String },
    Bearer { token: String },
    /// PEM client certificate chain and private key, given as file paths.
    X509 {
        cert: String,
        key: String,
        #[serde(default)]
        password: Option<String>,
    },
}

impl Auth {
    pub fn basic(username: impl Into<String>, password: impl Into<String>) -> Self {
        Auth::Basic {
            username: username.into(),
            password: password.into(),
        }
    }

    pub fn digest(username: impl Into<String>, password: impl Into<String>) -> Self {
        Auth::Digest {
            username: username.into(),
            password: password.into(),
        }
    }

    pub fn bearer(token: impl Into<String>) -> Self {
        Auth::Bearer {
            token: token.into(),
        }
    }

    pub fn x509(cert: impl Into<String>, key: impl Into<String>, password: Option<String>) -> Self {
        Auth::X509 {
            cert: cert.into(),
            key: key.into(),
            password,
        }
    }

    /// Whether the credentials travel in request headers (and must not follow
    /// a redirect to another origin).
    pub fn is_header_credential(&self) -> bool {
        !matches!(self, Auth::X509 { .. })
    }

    pub fn scheme(&self) -> &'static str {
        match self {
            Auth::Basic { .. } => "basic",
            Auth::Digest { .. } => "digest",
            Auth::Bearer { .. } => "bearer",
            Auth::X509 { .. } => "x509",
        }
    }
}

impl fmt::Debug for Auth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Auth::Basic { username, .. } => f
                .debug_struct("Basic")
                .field("username", username)
                .field("password", &"<redacted>")
                .finish(),
            Auth::Digest { username, .. } => f
                .debug_struct("Digest")
                .field("username", username)
                .field("password", &"<redacted>")
                .finish(),
            Auth::Bearer { .. } => f.debug_struct("Bearer").field("token", &"<redacted>").finish(),
            Auth::X509 { cert, key, password } => f
                .debug_struct("X509")
                .field("cert", cert)
                .field("key", key)
                .field("password", &password.as_ref().map(|_| "<redacted>"))
                .finish(),
        }
    }
}

/// Optional settings applied to one request. Every field defaults to unset.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RequestOptions {
    /// Sent verbatim as the `Cookie` header, e.g. `"k1=v1;k2=v2"`.
    pub cookies: Option<String>,
    pub proxy: Option<String>,
    pub body: Option<Vec<u8>>,
    /// Request body sent with `Content-Type: application/json`.
    pub json_body: Option<String>,
    pub timeout_seconds: Option<u64>,
    pub auth: Option<Auth>,
    /// Per-accumulator ceiling on captured bytes.
    pub max_response_bytes: Option<usize>,
}

impl RequestOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_cookies(mut self, cookies: impl Into<String>) -> Self {
        self.cookies = Some(cookies.into());
        self
    }

    pub fn with_proxy(mut self, proxy: impl Into<String>) -> Self {
        self.proxy = Some(proxy.into());
        self
    }

    pub fn with_body(mut self, body: impl Into<Vec<u8>>) -> Self {
        self.body = Some(body.into());
        self
    }

    pub fn with_json_body(mut self, json: impl Into<String>) -> Self {
        self.json_body = Some(json.into());
        self
    }

    /// Serialize `value` and send it as the JSON body.
    pub fn with_json<T: Serialize>(self, value: &T) -> Result<Self, HttpError> {
        let json = serde_json::to_string(value)
            .map_err(|e| HttpError::invalid(format!("json body: {e}")))?;
        Ok(self.with_json_body(json))
    }

    pub fn with_timeout_seconds(mut self, secs: u64) -> Self {
        self.timeout_seconds = Some(secs);
        self
    }

    pub fn with_auth(mut self, auth: Auth) -> Self {
        self.auth = Some(auth);
        self
    }

    pub fn with_max_response_bytes(mut self, max: usize) -> Self {
        self.max_response_bytes = Some(max);
        self
    }

    /// Drop everything that describes a request body.
    pub(crate) fn without_body(mut self) -> Self {
        self.body = None;
        self.json_body = None;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_sets_fields() {
        let opts = RequestOptions::new()
            .with_cookies("k1=v1;k2=v2")
            .with_timeout_seconds(1)
            .with_auth(Auth::bearer("t0ken"));
        assert_eq!(opts.cookies.as_deref(), Some("k1=v1;k2=v2"));
        assert_eq!(opts.timeout_seconds, Some(1));
        assert_eq!(opts.auth.as_ref().map(Auth::scheme), Some("bearer"));
        assert!(opts.proxy.is_none());
    }

    #[test]
    fn with_json_serializes_value() {
        let opts = RequestOptions::new()
            .with_json(&serde_json::json!({"title": "Buy milk"}))
            .unwrap();
        assert_eq!(opts.json_body.as_deref(), Some(r#"{"title":"Buy milk"}"#));
    }

    #[test]
    fn debug_redacts_secrets() {
        let rendered = format!(
            "{:?} {:?} {:?}",
            Auth::basic("alice", "hunter2"),
            Auth::bearer("s3cret"),
            Auth::x509("cert.pem", "key.pem", Some("keypass".into()))
        );
        assert!(rendered.contains("alice"));
        assert!(!rendered.contains("hunter2"));
        assert!(!rendered.contains("s3cret"));
        assert!(!rendered.contains("keypass"));
    }

    #[test]
    fn auth_deserializes_from_tagged_json() {
        let auth: Auth =
            serde_json::from_str(r#"{"type":"digest","username":"u","password":"p"}"#).unwrap();
        assert_eq!(auth, Auth::digest("u", "p"));

        let auth: Auth = serde_json::from_str(r#"{"type":"x509","cert":"c","key":"k"}"#).unwrap();
        assert_eq!(auth, Auth::x509("c", "k", None));
    }

    #[test]
    fn options_deserialize_with_defaults() {
        let opts: RequestOptions = serde_json::from_str(r#"{"cookies":"a=b"}"#).unwrap();
        assert_eq!(opts.cookies.as_deref(), Some("a=b"));
        assert_eq!(opts.timeout_seconds, None);
        assert!(opts.auth.is_none());
    }

    #[test]
    fn only_x509_is_not_a_header_credential() {
        assert!(Auth::basic("u", "p").is_header_credential());
        assert!(Auth::digest("u", "p").is_header_credential());
        assert!(Auth::bearer("t").is_header_credential());
        assert!(!Auth::x509("c", "k", None).is_header_credential());
    }

    #[test]
    fn without_body_clears_both_bodies() {
        let opts = RequestOptions::new()
            .with_body("raw")
            .with_json_body("{}")
            .with_cookies("a=b")
            .without_body();
        assert!(opts.body.is_none());
        assert!(opts.json_body.is_none());
        assert_eq!(opts.cookies.as_deref(), Some("a=b"));
    }
}
