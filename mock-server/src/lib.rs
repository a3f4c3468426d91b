use std::collections::BTreeMap;
use std::time::Duration;

use axum::{
    body::Bytes,
    extract::{Path, Query},
    http::{header, HeaderMap, Method, StatusCode, Uri},
    response::{IntoResponse, Response},
    routing::{any, get},
    Json, Router,
};
use base64::prelude::BASE64_STANDARD;
use base64::Engine as _;
use md5::{Digest, Md5};
use serde::{Deserialize, Serialize};
use tokio::net::TcpListener;
use uuid::Uuid;

pub const DIGEST_REALM: &str = "mock";
const MAX_BYTES: usize = 8 * 1024 * 1024;
const MAX_DELAY_SECS: u64 = 10;

/// `b"hello"` gzip-compressed.
pub const GZIP_HELLO: [u8; 25] = [
    0x1f, 0x8b, 0x08, 0x00, 0x00, 0x00, 0x00, 0x00, 0x02, 0x03, 0xcb, 0x48, 0xcd, 0xc9, 0xc9, 0x07, 0x00, 0x86,
    0xa6, 0x10, 0x36, 0x05, 0x00, 0x00, 0x00,
];

/// Body of `/cookies`: the raw `Cookie` header as received.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CookieEcho {
    pub cookies: String,
}

/// Body of `/anything` and `/headers`.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Echo {
    pub method: String,
    pub headers: BTreeMap<String, String>,
    pub body: String,
}

#[derive(Deserialize)]
pub struct RedirectTo {
    pub url: String,
    pub status: Option<u16>,
}

pub fn app() -> Router {
    Router::new()
        .route("/cookies", get(cookies))
        .route("/headers", any(echo))
        .route("/anything", any(echo))
        .route("/status/{code}", any(status))
        .route("/redirect/{n}", get(redirect))
        .route("/redirect-to", any(redirect_to))
        .route("/loop", any(redirect_loop))
        .route("/delay/{secs}", get(delay))
        .route("/bytes/{n}", get(bytes))
        .route("/gzip", get(gzip))
        .route("/basic-auth/{user}/{pass}", get(basic_auth))
        .route("/bearer", get(bearer))
        .route("/digest-auth/{user}/{pass}", get(digest_auth))
}

pub async fn run(listener: TcpListener) -> Result<(), std::io::Error> {
    axum::serve(listener, app()).await
}

fn header_map(headers: &HeaderMap) -> BTreeMap<String, String> {
    let mut map: BTreeMap<String, String> = BTreeMap::new();
    for (name, value) in headers {
        let value = String::from_utf8_lossy(value.as_bytes()).into_owned();
        match map.get_mut(name.as_str()) {
            Some(existing) => {
                existing.push_str(", ");
                existing.push_str(&value);
            }
            None => {
                map.insert(name.as_str().to_string(), value);
            }
        }
    }
    map
}

fn header_str<'a>(headers: &'a HeaderMap, name: header::HeaderName) -> Option<&'a str> {
    headers.get(name).and_then(|v| v.to_str().ok())
}

fn found(location: String) -> Response {
    (StatusCode::FOUND, [(header::LOCATION, location)]).into_response()
}

async fn cookies(headers: HeaderMap) -> Json<CookieEcho> {
    let cookies = header_str(&headers, header::COOKIE).unwrap_or_default().to_string();
    Json(CookieEcho { cookies })
}

async fn echo(method: Method, headers: HeaderMap, body: Bytes) -> Json<Echo> {
    Json(Echo {
        method: method.to_string(),
        headers: header_map(&headers),
        body: String::from_utf8_lossy(&body).into_owned(),
    })
}

async fn status(Path(code): Path<u16>) -> StatusCode {
    StatusCode::from_u16(code).unwrap_or(StatusCode::BAD_REQUEST)
}

async fn redirect(Path(n): Path<u32>) -> Response {
    if n == 0 {
        return Json(serde_json::json!({ "redirected": true })).into_response();
    }
    found(format!("/redirect/{}", n - 1))
}

async fn redirect_to(Query(query): Query<RedirectTo>) -> Response {
    let status = query.status.unwrap_or(302);
    match StatusCode::from_u16(status) {
        Ok(code) if code.is_redirection() => (code, [(header::LOCATION, query.url)]).into_response(),
        _ => StatusCode::BAD_REQUEST.into_response(),
    }
}

async fn redirect_loop() -> Response {
    found("/loop".to_string())
}

async fn delay(Path(secs): Path<u64>) -> Json<serde_json::Value> {
    tokio::time::sleep(Duration::from_secs(secs.min(MAX_DELAY_SECS))).await;
    Json(serde_json::json!({ "delayed": secs }))
}

async fn bytes(Path(n): Path<usize>) -> Response {
    let body: Vec<u8> = (0..n.min(MAX_BYTES)).map(|i| (i % 251) as u8).collect();
    ([(header::CONTENT_TYPE, "application/octet-stream")], body).into_response()
}

/// Always gzip-encoded, whatever the client accepts.
async fn gzip() -> Response {
    (
        [
            (header::CONTENT_TYPE, "text/plain"),
            (header::CONTENT_ENCODING, "gzip"),
        ],
        GZIP_HELLO.to_vec(),
    )
        .into_response()
}

async fn basic_auth(Path((user, pass)): Path<(String, String)>, headers: HeaderMap) -> Response {
    let expected = format!("Basic {}", BASE64_STANDARD.encode(format!("{user}:{pass}")));
    if header_str(&headers, header::AUTHORIZATION) == Some(expected.as_str()) {
        return Json(serde_json::json!({ "authenticated": true, "user": user })).into_response();
    }
    (
        StatusCode::UNAUTHORIZED,
        [(header::WWW_AUTHENTICATE, "Basic realm=\"mock\"")],
    )
        .into_response()
}

async fn bearer(headers: HeaderMap) -> Response {
    match header_str(&headers, header::AUTHORIZATION).and_then(|v| v.strip_prefix("Bearer ")) {
        Some(token) if !token.is_empty() => {
            Json(serde_json::json!({ "authenticated": true, "token": token })).into_response()
        }
        _ => (StatusCode::UNAUTHORIZED, [(header::WWW_AUTHENTICATE, "Bearer")]).into_response(),
    }
}

async fn digest_auth(
    Path((user, pass)): Path<(String, String)>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
) -> Response {
    let authorized = header_str(&headers, header::AUTHORIZATION)
        .and_then(|v| v.strip_prefix("Digest "))
        .map(parse_params)
        .is_some_and(|params| verify_digest(&params, &user, &pass, method.as_str(), &uri));

    if authorized {
        return Json(serde_json::json!({ "authenticated": true, "user": user })).into_response();
    }

    let challenge = format!(
        "Digest realm=\"{DIGEST_REALM}\", qop=\"auth\", nonce=\"{}\", opaque=\"{}\"",
        Uuid::new_v4().simple(),
        Uuid::new_v4().simple()
    );
    (StatusCode::UNAUTHORIZED, [(header::WWW_AUTHENTICATE, challenge)]).into_response()
}

fn verify_digest(params: &BTreeMap<String, String>, user: &str, pass: &str, method: &str, uri: &Uri) -> bool {
    let get = |key: &str| params.get(key).map(String::as_str);
    let target = uri.path_and_query().map(|pq| pq.as_str()).unwrap_or(uri.path());

    if get("username") != Some(user) || get("realm") != Some(DIGEST_REALM) || get("uri") != Some(target) {
        return false;
    }
    let (Some(nonce), Some(response)) = (get("nonce"), get("response")) else {
        return false;
    };

    let ha1 = md5_hex(&format!("{user}:{DIGEST_REALM}:{pass}"));
    let ha2 = md5_hex(&format!("{method}:{target}"));
    let expected = match (get("qop"), get("nc"), get("cnonce")) {
        (Some("auth"), Some(nc), Some(cnonce)) => md5_hex(&format!("{ha1}:{nonce}:{nc}:{cnonce}:auth:{ha2}")),
        (None, _, _) => md5_hex(&format!("{ha1}:{nonce}:{ha2}")),
        _ => return false,
    };
    expected == response
}

fn md5_hex(input: &str) -> String {
    format!("{:x}", Md5::digest(input.as_bytes()))
}

/// Parse `k="v", k2=v2` auth parameters.
pub fn parse_params(input: &str) -> BTreeMap<String, String> {
    let mut params = BTreeMap::new();
    let mut rest = input.trim();
    while let Some((key, after)) = rest.split_once('=') {
        let key = key.trim().trim_start_matches(',').trim().to_ascii_lowercase();
        let after = after.trim_start();
        let (value, remaining) = match after.strip_prefix('"') {
            Some(quoted) => match quoted.find('"') {
                Some(end) => (&quoted[..end], &quoted[end + 1..]),
                None => (quoted, ""),
            },
            None => match after.find(',') {
                Some(end) => (after[..end].trim(), &after[end..]),
                None => (after.trim(), ""),
            },
        };
        params.insert(key, value.to_string());
        rest = remaining.trim_start().trim_start_matches(',').trim_start();
    }
    params
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_quoted_and_bare_params() {
        let params = parse_params(r#"username="u", realm="mock", nc=00000001, qop=auth, uri="/a?b=1,2""#);
        assert_eq!(params["username"], "u");
        assert_eq!(params["nc"], "00000001");
        assert_eq!(params["qop"], "auth");
        assert_eq!(params["uri"], "/a?b=1,2");
    }

    #[test]
    fn verifies_rfc_style_digest() {
        let uri: Uri = "/digest-auth/u/p".parse().unwrap();
        let ha1 = md5_hex("u:mock:p");
        let ha2 = md5_hex("GET:/digest-auth/u/p");
        let response = md5_hex(&format!("{ha1}:n1:00000001:c1:auth:{ha2}"));
        let params = parse_params(&format!(
            r#"username="u", realm="mock", nonce="n1", uri="/digest-auth/u/p", qop=auth, nc=00000001, cnonce="c1", response="{response}""#
        ));
        assert!(verify_digest(&params, "u", "p", "GET", &uri));
        assert!(!verify_digest(&params, "u", "wrong", "GET", &uri));
    }

    #[test]
    fn header_map_joins_repeated_headers() {
        let mut headers = HeaderMap::new();
        headers.append("x-a", "1".parse().unwrap());
        headers.append("x-a", "2".parse().unwrap());
        let map = header_map(&headers);
        assert_eq!(map["x-a"], "1, 2");
    }

    #[test]
    fn echo_serializes_to_json() {
        let echo = Echo {
            method: "GET".to_string(),
            headers: BTreeMap::from([("cookie".to_string(), "a=b".to_string())]),
            body: String::new(),
        };
        let json = serde_json::to_value(&echo).unwrap();
        assert_eq!(json["method"], "GET");
        assert_eq!(json["headers"]["cookie"], "a=b");
    }
}
