//! Chunk descriptors for binary resources.
//!
//! One logical file yields one [`Chunk`] per window of at most the configured
//! chunk size. Windows are inclusive byte ranges that tile `[0, size)`; the
//! terminal chunk is the one whose `end == size - 1`.

use bytes::Bytes;
use serde::{Deserialize, Serialize};

/// Default chunk window (5 MiB).
pub const DEFAULT_CHUNK_SIZE: u64 = 5 * 1024 * 1024;

/// Upper bound accepted for a configured chunk window (64 MiB).
pub const MAX_CHUNK_SIZE: u64 = 64 * 1024 * 1024;

/// One bounded byte range of a binary resource.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Chunk {
    /// Payload for this window. Never persisted and stripped from cached copies.
    #[serde(skip)]
    pub data: Bytes,

    /// First byte offset (inclusive).
    pub start: u64,

    /// Last byte offset (inclusive).
    pub end: u64,

    /// Total size of the logical resource in bytes.
    pub size: u64,
}

impl Chunk {
    pub fn new(data: Bytes, start: u64, end: u64, size: u64) -> Self {
        Self {
            data,
            start,
            end,
            size,
        }
    }

    /// Descriptor without payload, used as an export template.
    pub fn describe(size: u64) -> Self {
        Self {
            data: Bytes::new(),
            start: 0,
            end: size.saturating_sub(1),
            size,
        }
    }

    /// Whether this window closes the logical resource.
    ///
    /// An empty resource is a single window that is both first and terminal.
    pub fn is_terminal(&self) -> bool {
        self.size == 0 || self.end == self.size - 1
    }

    pub fn is_first(&self) -> bool {
        self.start == 0
    }

    /// Number of bytes this window covers.
    pub fn expected_len(&self) -> u64 {
        if self.size == 0 {
            0
        } else {
            self.end - self.start + 1
        }
    }

    /// Offset the next window starts at.
    pub fn next_offset(&self) -> u64 {
        if self.size == 0 {
            0
        } else {
            self.end + 1
        }
    }

    /// Content-Range style header value, e.g. `bytes 0-5242879/12582912`.
    pub fn content_range(&self) -> String {
        if self.size == 0 {
            return "bytes */0".to_string();
        }
        format!("bytes {}-{}/{}", self.start, self.end, self.size)
    }
}

/// Iterator over `(start, end)` windows of a payload.
#[derive(Debug, Clone)]
pub struct ChunkRanges {
    size: u64,
    chunk_size: u64,
    offset: u64,
    emitted_empty: bool,
}

impl ChunkRanges {
    /// Resume iteration at `offset`; offsets past the end yield nothing.
    pub fn starting_at(size: u64, chunk_size: u64, offset: u64) -> Self {
        Self {
            size,
            chunk_size: chunk_size.max(1),
            offset,
            emitted_empty: offset > 0,
        }
    }
}

impl Iterator for ChunkRanges {
    type Item = (u64, u64);

    fn next(&mut self) -> Option<Self::Item> {
        if self.size == 0 {
            if self.emitted_empty {
                return None;
            }
            self.emitted_empty = true;
            return Some((0, 0));
        }
        if self.offset >= self.size {
            return None;
        }
        let start = self.offset;
        let end = (start + self.chunk_size - 1).min(self.size - 1);
        self.offset = end + 1;
        Some((start, end))
    }
}

/// Windows covering `[0, size)` in `chunk_size` steps.
pub fn chunk_ranges(size: u64, chunk_size: u64) -> ChunkRanges {
    ChunkRanges::starting_at(size, chunk_size, 0)
}
