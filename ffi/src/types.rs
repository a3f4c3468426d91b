//! `#[repr(C)]` types for the FFI boundary.
//!
//! # Design
//! Input types (`FfiHttpOpts`, `FfiHttpAuth`) are caller-owned plain data
//! that the library only reads for the duration of one call. Output types
//! (`FfiHttpResult`) are heap-allocated here and released by the matching
//! `http_*_free` function. Conversions live here to keep `lib.rs` focused on
//! the `extern "C"` surface.

use std::ffi::{CStr, CString};
use std::os::raw::c_char;

use httpcap_core::{Auth, HttpError, RequestOptions, Response};

// ---------------------------------------------------------------------------
// Request options (caller-provided, not freed by us)
// ---------------------------------------------------------------------------

/// Which credential fields of `FfiHttpAuth` are read.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FfiAuthType {
    Basic = 0,
    Digest = 1,
    Bearer = 2,
    X509 = 3,
}

/// Credentials for one request.
///
/// - `Basic` / `Digest`: `username`, `password`
/// - `Bearer`: `token`
/// - `X509`: `cert` and `key` as paths to PEM files, `password` optional
///
/// Fields not used by `auth_type` may be null.
#[repr(C)]
pub struct FfiHttpAuth {
    pub auth_type: FfiAuthType,
    pub username: *const c_char,
    pub password: *const c_char,
    pub token: *const c_char,
    pub cert: *const c_char,
    pub key: *const c_char,
}

/// Per-request options. Every pointer may be null; numeric fields `<= 0`
/// mean "not set".
#[repr(C)]
pub struct FfiHttpOpts {
    pub cookies: *const c_char,
    pub proxy: *const c_char,
    pub data: *const u8,
    pub data_len: usize,
    pub json: *const c_char,
    pub timeout_secs: i64,
    pub auth: *const FfiHttpAuth,
    pub max_response_bytes: usize,
}

impl Default for FfiHttpOpts {
    fn default() -> Self {
        Self {
            cookies: std::ptr::null(),
            proxy: std::ptr::null(),
            data: std::ptr::null(),
            data_len: 0,
            json: std::ptr::null(),
            timeout_secs: 0,
            auth: std::ptr::null(),
            max_response_bytes: 0,
        }
    }
}

/// Read an optional C string. Non-UTF-8 text is an invalid argument.
///
/// # Safety
/// `ptr` must be null or point to a NUL-terminated string.
pub(crate) unsafe fn opt_string(ptr: *const c_char, field: &str) -> Result<Option<String>, HttpError> {
    if ptr.is_null() {
        return Ok(None);
    }
    unsafe { CStr::from_ptr(ptr) }
        .to_str()
        .map(|s| Some(s.to_string()))
        .map_err(|_| HttpError::invalid(format!("{field} is not valid UTF-8")))
}

/// # Safety
/// Same as [`opt_string`].
unsafe fn required_string(ptr: *const c_char, field: &str) -> Result<String, HttpError> {
    unsafe { opt_string(ptr, field) }?.ok_or_else(|| HttpError::invalid(format!("{field} is required")))
}

impl FfiHttpAuth {
    /// # Safety
    /// Every non-null string field must be NUL-terminated.
    pub(crate) unsafe fn to_auth(&self) -> Result<Auth, HttpError> {
        let auth = match self.auth_type {
            FfiAuthType::Basic => Auth::basic(
                unsafe { required_string(self.username, "auth.username") }?,
                unsafe { required_string(self.password, "auth.password") }?,
            ),
            FfiAuthType::Digest => Auth::digest(
                unsafe { required_string(self.username, "auth.username") }?,
                unsafe { required_string(self.password, "auth.password") }?,
            ),
            FfiAuthType::Bearer => Auth::bearer(unsafe { required_string(self.token, "auth.token") }?),
            FfiAuthType::X509 => Auth::x509(
                unsafe { required_string(self.cert, "auth.cert") }?,
                unsafe { required_string(self.key, "auth.key") }?,
                unsafe { opt_string(self.password, "auth.password") }?,
            ),
        };
        Ok(auth)
    }
}

impl FfiHttpOpts {
    /// Copy the options into an owned `RequestOptions`.
    ///
    /// # Safety
    /// Every non-null pointer must be valid: strings NUL-terminated, `data`
    /// readable for `data_len` bytes, `auth` pointing to an `FfiHttpAuth`.
    pub(crate) unsafe fn to_options(&self) -> Result<RequestOptions, HttpError> {
        let mut options = RequestOptions::new();

        if let Some(cookies) = unsafe { opt_string(self.cookies, "cookies") }? {
            options = options.with_cookies(cookies);
        }
        if let Some(proxy) = unsafe { opt_string(self.proxy, "proxy") }? {
            options = options.with_proxy(proxy);
        }
        if !self.data.is_null() {
            let data = unsafe { std::slice::from_raw_parts(self.data, self.data_len) };
            options = options.with_body(data.to_vec());
        } else if self.data_len > 0 {
            return Err(HttpError::invalid("data is null but data_len is not zero"));
        }
        if let Some(json) = unsafe { opt_string(self.json, "json") }? {
            options = options.with_json_body(json);
        }
        if self.timeout_secs > 0 {
            options = options.with_timeout_seconds(self.timeout_secs as u64);
        }
        if let Some(auth) = unsafe { self.auth.as_ref() } {
            options = options.with_auth(unsafe { auth.to_auth() }?);
        }
        if self.max_response_bytes > 0 {
            options = options.with_max_response_bytes(self.max_response_bytes);
        }
        Ok(options)
    }
}

// ---------------------------------------------------------------------------
// Result types
// ---------------------------------------------------------------------------

/// Error codes returned in `FfiHttpResult`.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FfiErrorCode {
    Ok = 0,
    InvalidArgument = 1,
    OutOfMemory = 2,
    TransportFailure = 3,
    TooManyRedirects = 4,
    Panic = 5,
    NullArg = 6,
}

impl From<&HttpError> for FfiErrorCode {
    fn from(err: &HttpError) -> Self {
        match err {
            HttpError::InvalidArgument(_) => FfiErrorCode::InvalidArgument,
            HttpError::OutOfMemory { .. } => FfiErrorCode::OutOfMemory,
            HttpError::TransportFailure { .. } => FfiErrorCode::TransportFailure,
            HttpError::TooManyRedirects { .. } => FfiErrorCode::TooManyRedirects,
        }
    }
}

/// Result envelope for `http_request` and `http_request_follow_redirect`.
///
/// On success `error_code` is `Ok`, `error_message` is null and `response`
/// points to the response. On failure `error_code` describes the category,
/// `error_message` is a human-readable C string, `transport_code` carries
/// the engine's code for transport failures (0 otherwise) and `response`
/// is null.
#[repr(C)]
pub struct FfiHttpResult {
    pub error_code: FfiErrorCode,
    pub error_message: *mut c_char,
    pub transport_code: i32,
    pub response: *mut Response,
}

/// NUL-free copy of `msg` for C callers.
fn c_message(msg: String) -> *mut c_char {
    CString::new(msg.replace('\0', " "))
        .unwrap_or_default()
        .into_raw()
}

impl FfiHttpResult {
    pub(crate) fn ok(response: *mut Response) -> *mut Self {
        Box::into_raw(Box::new(FfiHttpResult {
            error_code: FfiErrorCode::Ok,
            error_message: std::ptr::null_mut(),
            transport_code: 0,
            response,
        }))
    }

    pub(crate) fn from_error(err: &HttpError) -> *mut Self {
        Box::into_raw(Box::new(FfiHttpResult {
            error_code: err.into(),
            error_message: c_message(err.to_string()),
            transport_code: err.transport_code().map_or(0, |code| code.as_i32()),
            response: std::ptr::null_mut(),
        }))
    }

    pub(crate) fn null_arg(name: &str) -> *mut Self {
        Box::into_raw(Box::new(FfiHttpResult {
            error_code: FfiErrorCode::NullArg,
            error_message: c_message(format!("null argument: {name}")),
            transport_code: 0,
            response: std::ptr::null_mut(),
        }))
    }

    pub(crate) fn panic() -> *mut Self {
        Box::into_raw(Box::new(FfiHttpResult {
            error_code: FfiErrorCode::Panic,
            error_message: c_message("internal panic".to_string()),
            transport_code: 0,
            response: std::ptr::null_mut(),
        }))
    }
}
