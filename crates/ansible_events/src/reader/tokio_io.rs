use std::io::ErrorKind;

use tokio::io::{AsyncRead, AsyncReadExt};

use super::{BoundedLine, LineAssembler};
use crate::SourceError;

/// Async line source; the pump's only view of the producing process.
pub struct AsyncBoundedLineReader<R: AsyncRead + Unpin> {
    reader: R,
    lines: LineAssembler,
}

impl<R: AsyncRead + Unpin> AsyncBoundedLineReader<R> {
    pub fn new(reader: R, max_line_bytes: usize) -> Self {
        Self {
            reader,
            lines: LineAssembler::new(max_line_bytes),
        }
    }

    /// Next line, a terminal [`SourceError`], or `None` once the source is exhausted.
    ///
    /// Cancel safe in the sense the pump needs: dropping the future loses at most
    /// the chunk being read, and the pump never resumes after that.
    pub async fn next_line(&mut self) -> Option<Result<BoundedLine, SourceError>> {
        if self.lines.done {
            return None;
        }

        loop {
            if self.lines.needs_fill() {
                match self.reader.read(self.lines.chunk()).await {
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

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::AsyncWriteExt;

    #[tokio::test]
    async fn yields_lines_as_they_arrive() {
        let (mut tx, rx) = tokio::io::duplex(64);
        let mut lines = AsyncBoundedLineReader::new(rx, 1024);

        tx.write_all(b"{\"a\":1}\n{\"b\"").await.unwrap();
        let first = lines.next_line().await.unwrap().unwrap();
        assert_eq!(first.bytes, b"{\"a\":1}".to_vec());

        tx.write_all(b":2}\n").await.unwrap();
        drop(tx);
        let second = lines.next_line().await.unwrap().unwrap();
        assert_eq!(second.line_number, 2);
        assert_eq!(second.bytes, b"{\"b\":2}".to_vec());
        assert!(lines.next_line().await.is_none());
        assert!(lines.next_line().await.is_none());
    }
}
