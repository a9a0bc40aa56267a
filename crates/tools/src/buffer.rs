//! Append-only, offset-addressable output log for one session.
//!
//! Chunks from stdout and stderr are interleaved in arrival order and
//! numbered with a monotonically increasing `seq`.  Offsets handed to
//! readers are chunk sequence numbers, so dropping old chunks under the
//! byte cap never renumbers anything.

use std::collections::VecDeque;

use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Stream {
    Stdout,
    Stderr,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OutputChunk {
    pub seq: u64,
    pub stream: Stream,
    pub text: String,
}

/// Result of reading a suffix of the buffer.
#[derive(Debug, Clone, Default)]
pub struct OutputSlice {
    pub chunks: Vec<OutputChunk>,
    /// Chunks the reader never saw because the cap evicted them.
    pub missed: u64,
    /// Offset to resume from.
    pub next: u64,
}

impl OutputSlice {
    pub fn text(&self) -> String {
        self.chunks.iter().map(|c| c.text.as_str()).collect()
    }
}

pub struct OutputBuffer {
    chunks: VecDeque<OutputChunk>,
    next_seq: u64,
    bytes: usize,
    max_bytes: usize,
}

impl OutputBuffer {
    pub fn new(max_bytes: usize) -> Self {
        Self {
            chunks: VecDeque::new(),
            next_seq: 0,
            bytes: 0,
            max_bytes,
        }
    }

    /// Append a chunk.  Empty text is ignored.
    pub fn push(&mut self, stream: Stream, text: impl Into<String>) {
        let text = text.into();
        if text.is_empty() {
            return;
        }
        self.bytes += text.len();
        self.chunks.push_back(OutputChunk {
            seq: self.next_seq,
            stream,
            text,
        });
        self.next_seq += 1;

        if self.bytes > self.max_bytes {
            // Evict down to 3/4 of the cap so we are not trimming on every push.
            // The newest chunk always survives.
            let keep = self.max_bytes * 3 / 4;
            while self.bytes > keep && self.chunks.len() > 1 {
                if let Some(old) = self.chunks.pop_front() {
                    self.bytes -= old.text.len();
                }
            }
        }
    }

    /// Sequence number of the oldest retained chunk.
    pub fn first_offset(&self) -> u64 {
        self.chunks.front().map_or(self.next_seq, |c| c.seq)
    }

    /// Offset one past the newest chunk.
    pub fn end_offset(&self) -> u64 {
        self.next_seq
    }

    pub fn len_bytes(&self) -> usize {
        self.bytes
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    /// Every chunk at or after `offset`.
    pub fn read_from(&self, offset: u64) -> OutputSlice {
        let first = self.first_offset();
        let start = offset.max(first);
        let skip = (start - first) as usize;
        OutputSlice {
            chunks: self.chunks.iter().skip(skip).cloned().collect(),
            missed: first.saturating_sub(offset),
            next: self.next_seq,
        }
    }

    /// All retained text, both streams, in arrival order.
    pub fn text(&self) -> String {
        self.chunks.iter().map(|c| c.text.as_str()).collect()
    }
}

/// Incremental UTF-8 decoder for pipe reads.
///
/// A multi-byte character split across two reads is held back until the
/// rest arrives; invalid sequences become U+FFFD.
#[derive(Debug, Default)]
pub struct Utf8Decoder {
    pending: Vec<u8>,
}

impl Utf8Decoder {
    pub fn decode(&mut self, bytes: &[u8]) -> String {
        self.pending.extend_from_slice(bytes);
        let mut out = String::new();
        let mut rest: &[u8] = &self.pending;
        loop {
            match std::str::from_utf8(rest) {
                Ok(s) => {
                    out.push_str(s);
                    rest = &[];
                    break;
                }
                Err(e) => {
                    let valid = e.valid_up_to();
                    if let Ok(s) = std::str::from_utf8(&rest[..valid]) {
                        out.push_str(s);
                    }
                    match e.error_len() {
                        Some(bad) => {
                            out.push(char::REPLACEMENT_CHARACTER);
                            rest = &rest[valid + bad..];
                        }
                        None => {
                            rest = &rest[valid..];
                            break;
                        }
                    }
                }
            }
        }
        let tail = rest.to_vec();
        self.pending = tail;
        out
    }

    /// Flush whatever is still pending at end of stream.
    pub fn finish(&mut self) -> String {
        let out = String::from_utf8_lossy(&self.pending).into_owned();
        self.pending.clear();
        out
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Tests
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
