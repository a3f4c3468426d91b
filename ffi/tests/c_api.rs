//! Drive the C ABI end to end against the live mock server.

use std::ffi::{CStr, CString};

use httpcap_core::Response;
use httpcap_ffi::types::{FfiAuthType, FfiErrorCode, FfiHttpAuth, FfiHttpOpts, FfiHttpResult};
use httpcap_ffi::*;

fn start_server() -> String {
    let std_listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = std_listener.local_addr().unwrap();
    std_listener.set_nonblocking(true).unwrap();

    std::thread::spawn(move || {
        let rt = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();
        rt.block_on(async {
            let listener = tokio::net::TcpListener::from_std(std_listener).unwrap();
            mock_server::run(listener).await
        })
        .unwrap();
    });

    format!("http://{addr}")
}

fn c(s: &str) -> CString {
    CString::new(s).unwrap()
}

/// Unwrap a successful envelope into its response pointer.
fn ok_response(result: *mut FfiHttpResult) -> *mut Response {
    let r = unsafe { &*result };
    assert_eq!(r.error_code, FfiErrorCode::Ok);
    assert!(r.error_message.is_null());
    let response = r.response;
    http_result_free(result);
    assert!(!response.is_null());
    response
}

fn request(method: &str, url: &str, opts: Option<&FfiHttpOpts>) -> *mut FfiHttpResult {
    let method = c(method);
    let url = c(url);
    let opts = opts.map_or(std::ptr::null(), |o| o as *const FfiHttpOpts);
    http_request(method.as_ptr(), url.as_ptr(), opts)
}

fn content(resp: *const Response) -> String {
    let ptr = http_response_content(resp);
    unsafe { CStr::from_ptr(ptr) }.to_str().unwrap().to_string()
}

#[test]
fn cookies_round_trip_through_the_c_api() {
    assert!(http_global_init());
    let base = start_server();
    let cookies = c("k1=v1;k2=v2");
    let opts = FfiHttpOpts {
        cookies: cookies.as_ptr(),
        timeout_secs: 1,
        ..FfiHttpOpts::default()
    };

    let resp = ok_response(request("GET", &format!("{base}/cookies"), Some(&opts)));
    assert_eq!(http_response_status_code(resp), 200);
    assert!(content(resp).contains("k1=v1;k2=v2"));
    assert_eq!(http_response_content_length(resp), content(resp).len());

    let headers = unsafe { CStr::from_ptr(http_response_headers(resp)) };
    assert!(headers.to_str().unwrap().starts_with("HTTP/1.1 200"));
    assert_eq!(http_response_headers_length(resp), headers.to_bytes().len());

    let url = unsafe { CStr::from_ptr(http_response_url(resp)) };
    assert_eq!(url.to_str().unwrap(), format!("{base}/cookies"));
    assert!(http_response_redirect_url(resp).is_null());
    assert!(http_response_next(resp).is_null());
    assert!(http_response_elapsed(resp) >= 0.0);

    assert!(http_response_free(resp));

    // Released engine is recreated on the next request.
    assert!(http_global_cleanup());
    let resp = ok_response(request("GET", &format!("{base}/status/200"), None));
    assert!(http_response_free(resp));
}

#[test]
fn redirect_chain_is_owned_by_its_head() {
    let base = start_server();
    let head = ok_response(request("GET", &format!("{base}/redirect/2"), None));
    assert_eq!(http_response_status_code(head), 302);

    let mut tail = head;
    while !http_response_redirect_url(tail).is_null() {
        tail = ok_response(http_request_follow_redirect(tail));
    }
    assert_eq!(http_response_redirect_count(tail), 2);
    assert_eq!(http_response_status_code(tail), 200);
    assert!(content(tail).contains("redirected"));

    let second = http_response_next(head);
    assert_eq!(http_response_redirect_count(second), 1);

    // Members belong to the head.
    assert!(!http_response_free(tail));
    assert!(http_response_free(head));
}

#[test]
fn redirect_cap_is_reported() {
    let base = start_server();
    let head = ok_response(request("GET", &format!("{base}/loop"), None));
    for _ in 0..10 {
        ok_response(http_request_follow_redirect(head));
    }

    let result = http_request_follow_redirect(head);
    let r = unsafe { &*result };
    assert_eq!(r.error_code, FfiErrorCode::TooManyRedirects);
    assert!(r.response.is_null());
    http_result_free(result);

    assert!(http_response_free(head));
}

#[test]
fn body_and_bearer_token_are_sent() {
    let base = start_server();
    let token = c("t0ken");
    let auth = FfiHttpAuth {
        auth_type: FfiAuthType::Bearer,
        username: std::ptr::null(),
        password: std::ptr::null(),
        token: token.as_ptr(),
        cert: std::ptr::null(),
        key: std::ptr::null(),
    };
    let opts = FfiHttpOpts {
        auth: &auth,
        ..FfiHttpOpts::default()
    };
    let resp = ok_response(request("GET", &format!("{base}/bearer"), Some(&opts)));
    assert_eq!(http_response_status_code(resp), 200);
    assert!(http_response_free(resp));

    let data = b"a=1&b=2";
    let opts = FfiHttpOpts {
        data: data.as_ptr(),
        data_len: data.len(),
        ..FfiHttpOpts::default()
    };
    let resp = ok_response(request("PUT", &format!("{base}/anything"), Some(&opts)));
    let echo: serde_json::Value = serde_json::from_str(&content(resp)).unwrap();
    assert_eq!(echo["method"], "PUT");
    assert_eq!(echo["body"], "a=1&b=2");
    assert!(http_response_free(resp));
}

#[test]
fn transport_failure_carries_engine_code() {
    let base = start_server();
    let opts = FfiHttpOpts {
        timeout_secs: 1,
        ..FfiHttpOpts::default()
    };
    let result = request("GET", &format!("{base}/delay/3"), Some(&opts));
    let r = unsafe { &*result };
    assert_eq!(r.error_code, FfiErrorCode::TransportFailure);
    assert_eq!(r.transport_code, 28);
    assert!(!r.error_message.is_null());
    assert!(r.response.is_null());
    http_result_free(result);
}

#[test]
fn response_limit_is_out_of_memory() {
    let base = start_server();
    let opts = FfiHttpOpts {
        max_response_bytes: 100,
        ..FfiHttpOpts::default()
    };
    let result = request("GET", &format!("{base}/bytes/1000"), Some(&opts));
    assert_eq!(unsafe { &*result }.error_code, FfiErrorCode::OutOfMemory);
    http_result_free(result);
}
