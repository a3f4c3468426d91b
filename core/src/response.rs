//! Captured responses and redirect chains.
//!
//! # Design
//! A `Response` owns its two accumulators and the completion data captured
//! eagerly when the transfer finished: status, effective URL, redirect
//! target and elapsed time are plain fields, so no engine state outlives
//! `execute`. The request that produced it (method, URL, options) is kept so
//! the response can be followed.
//!
//! Responses produced by `follow_redirect` hang off `next`; each response
//! owns the rest of the chain.

use std::ffi::{CStr, CString};
use std::time::Duration;

use crate::buffer::WriteBuffer;
use crate::engine::Completion;
use crate::error::HttpError;
use crate::options::RequestOptions;

/// The request a response was produced by.
#[derive(Debug, Clone)]
pub struct RequestRecord {
    pub method: String,
    pub url: String,
    pub options: RequestOptions,
}

#[derive(Debug)]
pub struct Response {
    pub(crate) request: RequestRecord,
    pub(crate) headers: WriteBuffer,
    pub(crate) body: WriteBuffer,
    pub(crate) redirect_count: u32,
    pub(crate) next: Option<Box<Response>>,
    status: u16,
    effective_url: CString,
    redirect_url: Option<CString>,
    elapsed: Duration,
}

impl Response {
    /// Empty shell for a request about to run.
    pub(crate) fn shell(request: RequestRecord, redirect_count: u32, buffer_limit: Option<usize>) -> Self {
        let buffer = || match buffer_limit {
            Some(limit) => WriteBuffer::with_limit(limit),
            None => WriteBuffer::new(),
        };
        Self {
            request,
            headers: buffer(),
            body: buffer(),
            redirect_count,
            next: None,
            status: 0,
            effective_url: CString::default(),
            redirect_url: None,
            elapsed: Duration::ZERO,
        }
    }

    /// Record the completion data of the finished transfer.
    pub(crate) fn finalize(&mut self, completion: Completion) -> Result<(), HttpError> {
        self.status = completion.status;
        self.effective_url = to_cstring(completion.effective_url)?;
        self.redirect_url = completion.redirect_url.map(to_cstring).transpose()?;
        self.elapsed = completion.elapsed;
        Ok(())
    }

    pub fn header_bytes_length(&self) -> usize {
        self.headers.len()
    }

    pub fn header_bytes(&self) -> &[u8] {
        self.headers.as_bytes()
    }

    pub fn headers(&self) -> &WriteBuffer {
        &self.headers
    }

    pub fn body_bytes_length(&self) -> usize {
        self.body.len()
    }

    pub fn body_bytes(&self) -> &[u8] {
        self.body.as_bytes()
    }

    pub fn body(&self) -> &WriteBuffer {
        &self.body
    }

    pub fn redirect_count(&self) -> u32 {
        self.redirect_count
    }

    pub fn status_code(&self) -> u16 {
        self.status
    }

    pub fn effective_url(&self) -> &str {
        self.effective_url.to_str().unwrap_or_default()
    }

    pub fn effective_url_cstr(&self) -> &CStr {
        &self.effective_url
    }

    /// Where a 3xx response points to, resolved to an absolute URL.
    pub fn redirect_target_url(&self) -> Option<&str> {
        self.redirect_url.as_deref().and_then(|url| url.to_str().ok())
    }

    pub fn redirect_target_url_cstr(&self) -> Option<&CStr> {
        self.redirect_url.as_deref()
    }

    pub fn elapsed(&self) -> Duration {
        self.elapsed
    }

    pub fn elapsed_seconds(&self) -> f64 {
        self.elapsed.as_secs_f64()
    }

    pub fn request(&self) -> &RequestRecord {
        &self.request
    }

    /// Value of the first header named `name` (case-insensitive) in the
    /// header block of this response.
    pub fn header(&self, name: &str) -> Option<&str> {
        let text = self.headers.to_str()?;
        text.split("\r\n").skip(1).find_map(|line| {
            let (key, value) = line.split_once(':')?;
            key.trim().eq_ignore_ascii_case(name).then(|| value.trim())
        })
    }

    pub fn next(&self) -> Option<&Response> {
        self.next.as_deref()
    }

    pub fn next_mut(&mut self) -> Option<&mut Response> {
        self.next.as_deref_mut()
    }

    /// This response followed by every response it owns through `next`.
    pub fn chain(&self) -> Chain<'_> {
        Chain { current: Some(self) }
    }

    pub fn chain_len(&self) -> usize {
        self.chain().count()
    }

    pub fn last(&self) -> &Response {
        match self.next {
            Some(ref next) => next.last(),
            None => self,
        }
    }

    pub fn last_mut(&mut self) -> &mut Response {
        match self.next {
            Some(ref mut next) => next.last_mut(),
            None => self,
        }
    }

    pub(crate) fn append(&mut self, next: Response) -> &mut Response {
        let tail = self.last_mut();
        tail.next.insert(Box::new(next))
    }

    /// Release this response and the whole chain behind it.
    ///
    /// Returns how many responses were released.
    pub fn release(mut self) -> usize {
        let mut next = self.next.take();
        drop(self);
        let mut released = 1;
        while let Some(mut response) = next {
            next = response.next.take();
            released += 1;
        }
        tracing::trace!(released, "released response chain");
        released
    }
}

fn to_cstring(url: String) -> Result<CString, HttpError> {
    CString::new(url).map_err(|_| HttpError::invalid("url contains a NUL byte"))
}

/// Iterator over a redirect chain, head first.
pub struct Chain<'a> {
    current: Option<&'a Response>,
}

impl<'a> Iterator for Chain<'a> {
    type Item = &'a Response;

    fn next(&mut self) -> Option<Self::Item> {
        let current = self.current?;
        self.current = current.next.as_deref();
        Some(current)
    }
}
