mod sync;
mod tokio_io;

pub use sync::SyncBoundedLineReader;
pub use tokio_io::AsyncBoundedLineReader;

use crate::SourceError;

const CHUNK_SIZE_BYTES: usize = 8192;

/// One newline-terminated line, without the terminator (and without a trailing `\r`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BoundedLine {
    pub line_number: usize,
    pub bytes: Vec<u8>,
}

impl BoundedLine {
    pub fn is_blank(&self) -> bool {
        self.bytes.iter().all(|b| b.is_ascii_whitespace())
    }
}

/// Chunked line splitting shared by the blocking and async readers. The
/// readers only decide how a chunk gets filled.
struct LineAssembler {
    max_line_bytes: usize,
    buffer: Box<[u8]>,
    buffer_pos: usize,
    buffer_len: usize,
    current_line: Vec<u8>,
    line_number: usize,
    done: bool,
}

impl LineAssembler {
    fn new(max_line_bytes: usize) -> Self {
        Self {
            max_line_bytes,
            buffer: vec![0u8; CHUNK_SIZE_BYTES].into_boxed_slice(),
            buffer_pos: 0,
            buffer_len: 0,
            current_line: Vec::new(),
            line_number: 0,
            done: false,
        }
    }

    fn needs_fill(&self) -> bool {
        self.buffer_pos >= self.buffer_len
    }

    fn chunk(&mut self) -> &mut [u8] {
        &mut self.buffer
    }

    fn filled(&mut self, n: usize) {
        self.buffer_pos = 0;
        self.buffer_len = n;
    }

    /// Consumes buffered bytes. Returns `None` when more input is needed.
    fn scan(&mut self) -> Option<Result<BoundedLine, SourceError>> {
        let slice = &self.buffer[self.buffer_pos..self.buffer_len];
        let newline_idx = slice.iter().position(|b| *b == b'\n');
        let take = newline_idx.unwrap_or(slice.len());

        let observed_bytes = self.current_line.len().saturating_add(take);
        if observed_bytes > self.max_line_bytes {
            return Some(Err(self.fail(|line_number, max_line_bytes| {
                SourceError::LineTooLong {
                    line_number,
                    observed_bytes,
                    max_line_bytes,
                }
            })));
        }

        self.current_line.extend_from_slice(&slice[..take]);
        match newline_idx {
            Some(idx) => {
                self.buffer_pos += idx + 1;
                Some(Ok(self.finish_line()))
            }
            None => {
                self.buffer_pos = self.buffer_len;
                None
            }
        }
    }

    fn finish_at_eof(&mut self) -> Option<Result<BoundedLine, SourceError>> {
        self.done = true;
        if self.current_line.is_empty() {
            return None;
        }
        Some(Ok(self.finish_line()))
    }

    fn fail_io(&mut self, source: std::io::Error) -> SourceError {
        self.fail(|line_number, _| SourceError::Io {
            line_number,
            source,
        })
    }

    fn fail(&mut self, build: impl FnOnce(usize, usize) -> SourceError) -> SourceError {
        self.line_number += 1;
        self.done = true;
        self.current_line.clear();
        build(self.line_number, self.max_line_bytes)
    }

    fn finish_line(&mut self) -> BoundedLine {
        self.line_number += 1;
        let mut bytes = std::mem::take(&mut self.current_line);
        if bytes.last() == Some(&b'\r') {
            bytes.pop();
        }
        BoundedLine {
            line_number: self.line_number,
            bytes,
        }
    }
}
