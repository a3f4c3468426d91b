//! C-ABI wrapper around `httpcap-core`.
//!
//! # Overview
//! Exposes request execution, redirect following and response accessors
//! through `extern "C"` functions. Responses cross the boundary as opaque
//! pointers; every outcome of a request is reported through one
//! `FfiHttpResult` envelope.
//!
//! # Design
//! - Every `extern "C"` function wraps its body in `catch_unwind` so panics
//!   never cross the FFI boundary.
//! - Chain heads handed out by `http_request` are tracked in a live-handle
//!   registry. `http_response_free` only accepts registered heads, so a
//!   double free or freeing a chain member is reported instead of corrupting
//!   memory. A chain with a follow in progress is marked in the registry and
//!   cannot be freed until the follow returns.
//! - Accessors return pointers borrowed from the response; they stay valid
//!   until the chain head is freed.
//! - The C caller owns every returned envelope and must release it with
//!   `http_result_free`.

pub mod types;

use std::collections::BTreeSet;
use std::ffi::CString;
use std::os::raw::c_char;
use std::panic::catch_unwind;
use std::sync::{Mutex, MutexGuard, PoisonError};

use httpcap_core::{global, HttpError, Response};
use tracing_subscriber::EnvFilter;

use types::*;

/// Environment variable holding the `tracing` filter for the library.
pub const LOG_ENV: &str = "HTTPCAP_LOG";

/// Chain heads returned by `http_request` and not yet freed, plus the heads
/// whose chain is being extended by `http_request_follow_redirect`.
struct Registry {
    heads: BTreeSet<usize>,
    following: BTreeSet<usize>,
}

impl Registry {
    const fn new() -> Self {
        Self {
            heads: BTreeSet::new(),
            following: BTreeSet::new(),
        }
    }

    fn insert(&mut self, head: *mut Response) {
        self.heads.insert(head as usize);
    }

    /// Head of the live chain containing `target`. Chains being followed are
    /// not walked, since another thread is mutating them.
    fn owning_head(&self, target: *const Response) -> Option<usize> {
        if self.heads.contains(&(target as usize)) {
            return Some(target as usize);
        }
        self.heads
            .iter()
            .copied()
            .filter(|head| !self.following.contains(head))
            .find(|&head| {
                // Registered heads are valid until removed from the set.
                let head = unsafe { &*(head as *const Response) };
                head.chain().any(|member| std::ptr::eq(member, target))
            })
    }

    /// Mark `head` as being followed; false if it already is.
    fn begin_follow(&mut self, head: usize) -> bool {
        self.following.insert(head)
    }

    fn end_follow(&mut self, head: usize) {
        self.following.remove(&head);
    }

    /// Unregister `head`; false if it is not a live head or is being followed.
    fn remove(&mut self, head: usize) -> bool {
        !self.following.contains(&head) && self.heads.remove(&head)
    }
}

static LIVE: Mutex<Registry> = Mutex::new(Registry::new());

fn live() -> MutexGuard<'static, Registry> {
    LIVE.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Clears the follow mark of a chain head when dropped.
struct Following(usize);

impl Drop for Following {
    fn drop(&mut self) {
        live().end_follow(self.0);
    }
}

/// Borrow a response handed out by this library.
///
/// # Safety
/// `resp` must be null or a live response pointer.
unsafe fn response_ref<'a>(resp: *const Response) -> Option<&'a Response> {
    unsafe { resp.as_ref() }
}

fn install_logging() {
    let filter = EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new("warn"));
    // Another subscriber may already be installed by the host.
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

// ---------------------------------------------------------------------------
// Process lifecycle
// ---------------------------------------------------------------------------

/// Install logging and create the shared engine.
///
/// Optional: `http_request` initializes lazily. Returns false only if an
/// internal panic occurs.
#[unsafe(no_mangle)]
pub extern "C" fn http_global_init() -> bool {
    catch_unwind(|| {
        install_logging();
        global::init();
        true
    })
    .unwrap_or(false)
}

/// Drop the shared engine. Responses already returned stay readable.
///
/// Returns whether an engine was live.
#[unsafe(no_mangle)]
pub extern "C" fn http_global_cleanup() -> bool {
    catch_unwind(global::cleanup).unwrap_or(false)
}

// ---------------------------------------------------------------------------
// Requests
// ---------------------------------------------------------------------------

/// Perform one request.
///
/// `opts` may be null. A null or empty `method`/`url` yields
/// `InvalidArgument` without any network activity.
/// On success the caller owns `result->response` and must release it with
/// `http_response_free`; the envelope itself is released with
/// `http_result_free`.
#[unsafe(no_mangle)]
pub extern "C" fn http_request(
    method: *const c_char,
    url: *const c_char,
    opts: *const FfiHttpOpts,
) -> *mut FfiHttpResult {
    catch_unwind(|| {
        let run = || -> Result<*mut Response, HttpError> {
            let method = unsafe { opt_string(method, "method") }?.unwrap_or_default();
            let url = unsafe { opt_string(url, "url") }?.unwrap_or_default();
            let options = match unsafe { opts.as_ref() } {
                Some(opts) => Some(unsafe { opts.to_options() }?),
                None => None,
            };

            let response = httpcap_core::execute(&method, &url, options.as_ref())?;
            let ptr = Box::into_raw(Box::new(response));
            live().insert(ptr);
            Ok(ptr)
        };
        match run() {
            Ok(ptr) => FfiHttpResult::ok(ptr),
            Err(err) => FfiHttpResult::from_error(&err),
        }
    })
    .unwrap_or_else(|_| FfiHttpResult::panic())
}

/// Follow the redirect at the end of `resp`'s chain.
///
/// `resp` may be any member of a live chain. The returned response is owned
/// by the chain: do not pass it to `http_response_free`. While the follow is
/// in progress the chain cannot be freed, and a second follow on it fails
/// with `InvalidArgument`.
#[unsafe(no_mangle)]
pub extern "C" fn http_request_follow_redirect(resp: *mut Response) -> *mut FfiHttpResult {
    catch_unwind(|| {
        if resp.is_null() {
            return FfiHttpResult::null_arg("resp");
        }
        let _following = {
            let mut registry = live();
            let Some(head) = registry.owning_head(resp) else {
                return FfiHttpResult::from_error(&HttpError::invalid(
                    "response is not live or its chain is being followed",
                ));
            };
            if !registry.begin_follow(head) {
                return FfiHttpResult::from_error(&HttpError::invalid("chain is already being followed"));
            }
            Following(head)
        };
        let response = unsafe { &mut *resp };
        match httpcap_core::follow_redirect(response) {
            Ok(next) => FfiHttpResult::ok(next as *mut Response),
            Err(err) => FfiHttpResult::from_error(&err),
        }
    })
    .unwrap_or_else(|_| FfiHttpResult::panic())
}

// ---------------------------------------------------------------------------
// Free functions
// ---------------------------------------------------------------------------

/// Release a chain head returned by `http_request`, and every response
/// behind it.
///
/// Returns false, without touching memory, for null, an already freed
/// response, a chain member that is not the head, or a chain with a follow
/// in progress.
#[unsafe(no_mangle)]
pub extern "C" fn http_response_free(resp: *mut Response) -> bool {
    if resp.is_null() {
        return false;
    }
    catch_unwind(|| {
        if !live().remove(resp as usize) {
            tracing::warn!("http_response_free called with a pointer that is not a free-able chain head");
            return false;
        }
        let head = unsafe { Box::from_raw(resp) };
        head.release();
        true
    })
    .unwrap_or(false)
}

/// Free an `FfiHttpResult` envelope and its error message. Does not free
/// `result->response`. Safe to call with null.
#[unsafe(no_mangle)]
pub extern "C" fn http_result_free(result: *mut FfiHttpResult) {
    if result.is_null() {
        return;
    }
    let _ = catch_unwind(|| {
        let r = unsafe { Box::from_raw(result) };
        if !r.error_message.is_null() {
            drop(unsafe { CString::from_raw(r.error_message) });
        }
    });
}

// ---------------------------------------------------------------------------
// Accessors
// ---------------------------------------------------------------------------

const EMPTY: &std::ffi::CStr = c"";

/// Number of captured header bytes, excluding the terminator. 0 for null.
#[unsafe(no_mangle)]
pub extern "C" fn http_response_headers_length(resp: *const Response) -> usize {
    unsafe { response_ref(resp) }.map_or(0, Response::header_bytes_length)
}

/// Raw header block, NUL-terminated. Null for a null response.
#[unsafe(no_mangle)]
pub extern "C" fn http_response_headers(resp: *const Response) -> *const c_char {
    match unsafe { response_ref(resp) } {
        Some(r) => r
            .headers()
            .as_bytes_with_nul()
            .map_or(EMPTY.as_ptr(), |bytes| bytes.as_ptr().cast()),
        None => std::ptr::null(),
    }
}

/// Number of captured body bytes, excluding the terminator. 0 for null.
#[unsafe(no_mangle)]
pub extern "C" fn http_response_content_length(resp: *const Response) -> usize {
    unsafe { response_ref(resp) }.map_or(0, Response::body_bytes_length)
}

/// Body bytes followed by a NUL terminator. Use
/// `http_response_content_length` for binary bodies. Null for a null
/// response.
#[unsafe(no_mangle)]
pub extern "C" fn http_response_content(resp: *const Response) -> *const c_char {
    match unsafe { response_ref(resp) } {
        Some(r) => r
            .body()
            .as_bytes_with_nul()
            .map_or(EMPTY.as_ptr(), |bytes| bytes.as_ptr().cast()),
        None => std::ptr::null(),
    }
}

#[unsafe(no_mangle)]
pub extern "C" fn http_response_redirect_count(resp: *const Response) -> u32 {
    unsafe { response_ref(resp) }.map_or(0, Response::redirect_count)
}

/// Effective URL of the transfer. Null for a null response.
#[unsafe(no_mangle)]
pub extern "C" fn http_response_url(resp: *const Response) -> *const c_char {
    unsafe { response_ref(resp) }.map_or(std::ptr::null(), |r| r.effective_url_cstr().as_ptr())
}

#[unsafe(no_mangle)]
pub extern "C" fn http_response_status_code(resp: *const Response) -> u16 {
    unsafe { response_ref(resp) }.map_or(0, Response::status_code)
}

/// Absolute redirect target, or null when the response is not a redirect.
#[unsafe(no_mangle)]
pub extern "C" fn http_response_redirect_url(resp: *const Response) -> *const c_char {
    unsafe { response_ref(resp) }
        .and_then(Response::redirect_target_url_cstr)
        .map_or(std::ptr::null(), |url| url.as_ptr())
}

/// Total transfer time in seconds.
#[unsafe(no_mangle)]
pub extern "C" fn http_response_elapsed(resp: *const Response) -> f64 {
    unsafe { response_ref(resp) }.map_or(0.0, Response::elapsed_seconds)
}

/// Next response in the redirect chain, or null.
#[unsafe(no_mangle)]
pub extern "C" fn http_response_next(resp: *const Response) -> *const Response {
    unsafe { response_ref(resp) }
        .and_then(Response::next)
        .map_or(std::ptr::null(), |next| next as *const Response)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::ffi::CStr;

    fn result_parts(result: *mut FfiHttpResult) -> (FfiErrorCode, String, *mut Response) {
        assert!(!result.is_null());
        let r = unsafe { &*result };
        let msg = if r.error_message.is_null() {
            String::new()
        } else {
            unsafe { CStr::from_ptr(r.error_message) }.to_str().unwrap().to_string()
        };
        let parts = (r.error_code, msg, r.response);
        http_result_free(result);
        parts
    }

    #[test]
    fn null_method_is_invalid_argument() {
        let url = CString::new("http://127.0.0.1:1/").unwrap();
        let (code, msg, resp) = result_parts(http_request(std::ptr::null(), url.as_ptr(), std::ptr::null()));
        assert_eq!(code, FfiErrorCode::InvalidArgument);
        assert!(msg.contains("method"));
        assert!(resp.is_null());
    }

    #[test]
    fn empty_url_is_invalid_argument() {
        let method = CString::new("GET").unwrap();
        let url = CString::new("").unwrap();
        let (code, _, resp) = result_parts(http_request(method.as_ptr(), url.as_ptr(), std::ptr::null()));
        assert_eq!(code, FfiErrorCode::InvalidArgument);
        assert!(resp.is_null());
    }

    #[test]
    fn invalid_opts_are_reported_before_any_request() {
        let method = CString::new("GET").unwrap();
        let url = CString::new("http://127.0.0.1:1/").unwrap();
        let opts = FfiHttpOpts {
            data_len: 3,
            ..FfiHttpOpts::default()
        };
        let (code, msg, _) = result_parts(http_request(method.as_ptr(), url.as_ptr(), &opts));
        assert_eq!(code, FfiErrorCode::InvalidArgument);
        assert!(msg.contains("data_len"));
    }

    #[test]
    fn follow_null_is_null_arg() {
        let (code, msg, _) = result_parts(http_request_follow_redirect(std::ptr::null_mut()));
        assert_eq!(code, FfiErrorCode::NullArg);
        assert_eq!(msg, "null argument: resp");
    }

    #[test]
    fn frees_are_null_safe() {
        assert!(!http_response_free(std::ptr::null_mut()));
        http_result_free(std::ptr::null_mut());
    }

    #[test]
    fn accessors_on_null_return_defaults() {
        assert_eq!(http_response_headers_length(std::ptr::null()), 0);
        assert!(http_response_headers(std::ptr::null()).is_null());
        assert_eq!(http_response_content_length(std::ptr::null()), 0);
        assert!(http_response_content(std::ptr::null()).is_null());
        assert_eq!(http_response_redirect_count(std::ptr::null()), 0);
        assert!(http_response_url(std::ptr::null()).is_null());
        assert_eq!(http_response_status_code(std::ptr::null()), 0);
        assert!(http_response_redirect_url(std::ptr::null()).is_null());
        assert_eq!(http_response_elapsed(std::ptr::null()), 0.0);
        assert!(http_response_next(std::ptr::null()).is_null());
    }

    #[test]
    fn unregistered_pointer_is_not_live() {
        let registry = Registry::new();
        assert_eq!(registry.owning_head(0x1000 as *const Response), None);
    }

    #[test]
    fn chain_being_followed_cannot_be_freed() {
        // Addresses are never dereferenced: they are registered heads.
        let head = 0x1000 as *mut Response;
        let mut registry = Registry::new();
        registry.insert(head);
        assert_eq!(registry.owning_head(head), Some(0x1000));

        assert!(registry.begin_follow(0x1000));
        assert!(!registry.begin_follow(0x1000));
        assert!(!registry.remove(0x1000));

        registry.end_follow(0x1000);
        assert!(registry.remove(0x1000));
        assert!(!registry.remove(0x1000));
    }
}
