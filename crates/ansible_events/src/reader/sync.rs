use std::io::{ErrorKind, Read};

use super::{BoundedLine, LineAssembler};
use crate::SourceError;

/// Blocking line source over any [`Read`].
pub struct SyncBoundedLineReader<R: Read> {
    reader: R,
    lines: LineAssembler,
}

impl<R: Read> SyncBoundedLineReader<R> {
    pub fn new(reader: R, max_line_bytes: usize) -> Self {
        Self {
            reader,
            lines: LineAssembler::new(max_line_bytes),
        }
    }

    pub fn into_inner(self) -> R {
        self.reader
    }
}

impl<R: Read> Iterator for SyncBoundedLineReader<R> {
    type Item = Result<BoundedLine, SourceError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.lines.done {
            return None;
        }

        loop {
            if self.lines.needs_fill() {
                match self.reader.read(self.lines.chunk()) {
                    Ok(0) => return self.lines.finish_at_eof(),
                    Ok(n) => self.lines.filled(n),
                    Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                    Err(err) => return Some(Err(self.lines.fail_io(err))),
                }
            }

            if let Some(next) = self.lines.scan() {
                return Some(next);
            }
        }
    }
}
