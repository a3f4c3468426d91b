//! Growable, NUL-terminated byte accumulator.
//!
//! # Design
//! The engine hands over header and body bytes in chunks whose size and
//! count it alone decides. `WriteBuffer` concatenates them into one
//! contiguous `Vec<u8>` that always ends with a single `0` once anything has
//! been appended, so the content can be handed to C as a string.
//!
//! Growth is all-or-nothing: capacity is reserved with `try_reserve` before
//! the old terminator is touched. A failed append leaves length, content and
//! terminator exactly as they were.

use crate::error::HttpError;

/// Destination for chunks delivered by an engine during a transfer.
///
/// Returning an error aborts the in-flight transfer.
pub trait ChunkSink {
    fn write_chunk(&mut self, chunk: &[u8]) -> Result<(), HttpError>;
}

/// Accumulates chunks in call order behind a trailing NUL.
#[derive(Debug, Default, Clone)]
pub struct WriteBuffer {
    // content followed by one 0 byte; empty while unallocated
    data: Vec<u8>,
    limit: Option<usize>,
}

impl WriteBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Buffer whose content may never exceed `limit` bytes.
    ///
    /// Growth past the limit fails with `OutOfMemory` like a failed
    /// allocation would.
    pub fn with_limit(limit: usize) -> Self {
        Self {
            data: Vec::new(),
            limit: Some(limit),
        }
    }

    pub fn limit(&self) -> Option<usize> {
        self.limit
    }

    /// Append `chunk` after the existing content.
    pub fn append(&mut self, chunk: &[u8]) -> Result<(), HttpError> {
        let len = self.len();
        let content = len
            .checked_add(chunk.len())
            .ok_or(HttpError::OutOfMemory { requested: usize::MAX })?;
        let needed = content
            .checked_add(1)
            .ok_or(HttpError::OutOfMemory { requested: usize::MAX })?;

        if let Some(limit) = self.limit {
            if content > limit {
                return Err(HttpError::OutOfMemory { requested: needed });
            }
        }

        self.data
            .try_reserve(needed - self.data.len())
            .map_err(|_| HttpError::OutOfMemory { requested: needed })?;

        // Nothing below can fail.
        self.data.pop();
        self.data.extend_from_slice(chunk);
        self.data.push(0);
        Ok(())
    }

    /// Content length, terminator excluded.
    pub fn len(&self) -> usize {
        self.data.len().saturating_sub(1)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Whether anything (even an empty chunk) has been appended.
    pub fn is_allocated(&self) -> bool {
        !self.data.is_empty()
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.data[..self.len()]
    }

    /// Content plus trailing NUL, or `None` while unallocated.
    pub fn as_bytes_with_nul(&self) -> Option<&[u8]> {
        if self.data.is_empty() {
            None
        } else {
            Some(&self.data)
        }
    }

    pub fn to_str(&self) -> Option<&str> {
        std::str::from_utf8(self.as_bytes()).ok()
    }

    pub fn to_string_lossy(&self) -> std::borrow::Cow<'_, str> {
        String::from_utf8_lossy(self.as_bytes())
    }
}

impl ChunkSink for WriteBuffer {
    fn write_chunk(&mut self, chunk: &[u8]) -> Result<(), HttpError> {
        self.append(chunk)
    }
}
