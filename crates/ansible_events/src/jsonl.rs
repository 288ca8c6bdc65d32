use std::{
    fs::File,
    io::{self, BufReader, Read},
    path::Path,
};

use crate::{
    decode::decode_line_bytes, reader::SyncBoundedLineReader, EventRecord, SourceError,
    StreamLimits,
};

/// Blocking iterator over an Ansible JSONL log, one [`EventRecord`] per non-blank line.
///
/// Decode failures are returned in-band. A [`SourceError`] is yielded once and
/// ends iteration.
pub struct AnsibleEventJsonlReader<R: Read> {
    lines: SyncBoundedLineReader<R>,
}

impl<R: Read> AnsibleEventJsonlReader<R> {
    pub fn new(reader: R) -> Self {
        Self::with_limits(reader, StreamLimits::default())
    }

    pub fn with_limits(reader: R, limits: StreamLimits) -> Self {
        Self {
            lines: SyncBoundedLineReader::new(reader, limits.max_line_bytes),
        }
    }

    /// Consumes the iterator and returns the wrapped reader.
    pub fn into_inner(self) -> R {
        self.lines.into_inner()
    }
}

impl<R: Read> Iterator for AnsibleEventJsonlReader<R> {
    type Item = Result<EventRecord, SourceError>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let line = match self.lines.next()? {
                Ok(line) => line,
                Err(err) => return Some(Err(err)),
            };
            if line.is_blank() {
                continue;
            }
            return Some(Ok(EventRecord {
                line_number: line.line_number,
                outcome: decode_line_bytes(&line.bytes),
            }));
        }
    }
}

pub type AnsibleEventJsonlFileReader = AnsibleEventJsonlReader<BufReader<File>>;

/// Convenience constructor for reader-backed parsing.
pub fn ansible_event_jsonl_reader<R: Read>(reader: R) -> AnsibleEventJsonlReader<R> {
    AnsibleEventJsonlReader::new(reader)
}

/// Convenience constructor for file-backed parsing.
pub fn ansible_event_jsonl_file(
    path: impl AsRef<Path>,
) -> io::Result<AnsibleEventJsonlFileReader> {
    let file = File::open(path.as_ref())?;
    Ok(AnsibleEventJsonlReader::new(BufReader::new(file)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{AnsibleEvent, DecodeError};

    #[test]
    fn reader_is_tolerant_and_line_oriented() {
        let log = concat!(
            "{\"eventType\":\"PLAYBOOK_START\",\"eventData\":{\"count\":2}}\r\n",
            "   \n",
            "{not-json}\n",
            "{\"eventType\":\"PLAYBOOK_END\",\"eventData\":{}}",
        );
        let records: Vec<_> = ansible_event_jsonl_reader(log.as_bytes())
            .collect::<Result<_, _>>()
            .unwrap();

        assert_eq!(records.len(), 3);
        assert!(matches!(
            records[0].outcome,
            Ok(AnsibleEvent::PlaybookStart(ref start)) if start.count == 2
        ));
        assert_eq!(records[1].line_number, 3);
        assert!(matches!(
            records[1].outcome,
            Err(DecodeError::EnvelopeParse { .. })
        ));
        assert!(matches!(records[2].outcome, Ok(AnsibleEvent::PlaybookEnd(_))));
    }

    #[test]
    fn limits_are_applied() {
        let log = "{\"eventType\":\"PLAY_START\",\"eventData\":{\"name\":\"a long play name\"}}\n";
        let mut reader = AnsibleEventJsonlReader::with_limits(
            log.as_bytes(),
            StreamLimits { max_line_bytes: 16 },
        );
        assert!(matches!(
            reader.next(),
            Some(Err(SourceError::LineTooLong { line_number: 1, .. }))
        ));
        assert!(reader.next().is_none());
    }
}
