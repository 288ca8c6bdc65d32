use std::{
    pin::Pin,
    task::{Context, Poll},
};

use futures_core::Stream;
use tokio::{io::AsyncRead, sync::mpsc, task::JoinHandle};
use tokio_util::sync::{CancellationToken, DropGuard};
use tracing::{debug, error, warn};

use crate::{
    decode::decode_line_bytes, reader::AsyncBoundedLineReader, AnsibleEvent, DecodeError,
    DecodeErrorPolicy, Diagnostic, DiagnosticSink, SourceError, StreamConfig, StreamError,
};

// One slot: the pump can be at most one event ahead of the consumer.
const HANDOFF_CAPACITY: usize = 1;

/// Decode outcome for one non-blank line, as yielded by [`record_stream`].
#[derive(Debug)]
pub struct EventRecord {
    /// 1-based line number in the underlying source.
    pub line_number: usize,
    pub outcome: Result<AnsibleEvent, DecodeError>,
}

/// How the pump left the `READING` state.
#[derive(Debug)]
pub enum Termination {
    /// Clean end of stream.
    Exhausted,
    SourceFailed(SourceError),
    /// A line failed to decode under [`DecodeErrorPolicy::Halt`].
    DecodeHalted { line_number: usize },
    Cancelled,
    /// The receiving half was closed or dropped.
    ConsumerClosed,
}

#[derive(Debug)]
pub struct PumpSummary {
    /// Non-blank lines handed to the decoder.
    pub lines_read: usize,
    pub events_published: usize,
    pub lines_dropped: usize,
    pub termination: Termination,
}

/// Consumer half of a running pump.
///
/// Items arrive in source order. The sequence ends when the pump reaches
/// `DONE`; a clean end and an errored end look the same here, use
/// [`PumpStream::finish`] to tell them apart. Dropping the stream cancels the pump.
pub struct PumpStream<T> {
    rx: mpsc::Receiver<T>,
    cancel: CancellationToken,
    pump: JoinHandle<PumpSummary>,
    _cancel_on_drop: DropGuard,
}

pub type EventStream = PumpStream<AnsibleEvent>;
pub type RecordStream = PumpStream<EventRecord>;

impl<T> PumpStream<T> {
    /// Waits for the next item; `None` once the sequence is closed.
    pub async fn recv(&mut self) -> Option<T> {
        self.rx.recv().await
    }

    /// Asks the pump to stop; the sequence closes promptly afterwards.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Stops the pump if it is still running and reports how it ended.
    ///
    /// After the sequence has been drained to `None` this only collects the
    /// summary; the termination recorded then is the real one.
    pub async fn finish(self) -> Result<PumpSummary, StreamError> {
        let PumpStream {
            mut rx,
            cancel,
            pump,
            _cancel_on_drop,
        } = self;
        rx.close();
        cancel.cancel();
        Ok(pump.await?)
    }
}

impl<T> Stream for PumpStream<T> {
    type Item = T;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.get_mut().rx.poll_recv(cx)
    }
}

/// Converts a JSONL byte stream into an ordered stream of [`AnsibleEvent`]s.
///
/// Spawns the producer on the current Tokio runtime. Lines that fail to
/// decode are handled per [`StreamConfig::decode_errors`]; by default they
/// are dropped without a trace.
pub fn event_stream<R>(reader: R, config: StreamConfig) -> EventStream
where
    R: AsyncRead + Unpin + Send + 'static,
{
    let policy = config.decode_errors;
    spawn_pump(reader, config, move |record, diagnostics| {
        let err = match record.outcome {
            Ok(event) => return Dispatch::Publish(event),
            Err(err) => err,
        };
        match policy {
            DecodeErrorPolicy::Drop => Dispatch::Skip,
            DecodeErrorPolicy::Log => {
                diagnostics.decode_failed(record.line_number, &err);
                Dispatch::Skip
            }
            DecodeErrorPolicy::Halt => {
                diagnostics.decode_failed(record.line_number, &err);
                Dispatch::Halt
            }
        }
    })
}

/// Like [`event_stream`], but every decode failure is propagated in-band as
/// an [`EventRecord`] instead of being subject to the drop policy.
pub fn record_stream<R>(reader: R, config: StreamConfig) -> RecordStream
where
    R: AsyncRead + Unpin + Send + 'static,
{
    spawn_pump(reader, config, |record, _| Dispatch::Publish(record))
}

enum Dispatch<T> {
    Publish(T),
    Skip,
    Halt,
}

struct Diagnostics {
    sink: Option<Box<dyn DiagnosticSink>>,
}

impl Diagnostics {
    fn decode_failed(&mut self, line_number: usize, err: &DecodeError) {
        warn!(line_number, code = ?err.code(), error = %err, "undecodable ansible event line");
        self.report(Diagnostic {
            line_number,
            code: err.code(),
            details: err.to_string(),
        });
    }

    fn source_failed(&mut self, err: &SourceError) {
        error!(
            line_number = err.line_number(),
            error = %err,
            "error reading ansible event stream"
        );
        self.report(Diagnostic {
            line_number: err.line_number(),
            code: err.code(),
            details: err.to_string(),
        });
    }

    fn report(&mut self, diagnostic: Diagnostic) {
        if let Some(sink) = self.sink.as_mut() {
            sink.report(diagnostic);
        }
    }
}

fn spawn_pump<R, T, F>(reader: R, config: StreamConfig, route: F) -> PumpStream<T>
where
    R: AsyncRead + Unpin + Send + 'static,
    T: Send + 'static,
    F: FnMut(EventRecord, &mut Diagnostics) -> Dispatch<T> + Send + 'static,
{
    let StreamConfig {
        limits,
        decode_errors,
        diagnostics,
        cancel,
    } = config;
    // A child token so that dropping the stream never cancels the caller's token.
    let cancel = cancel
        .map(|parent| parent.child_token())
        .unwrap_or_else(CancellationToken::new);
    let (tx, rx) = mpsc::channel(HANDOFF_CAPACITY);

    debug!(
        max_line_bytes = limits.max_line_bytes,
        decode_errors = ?decode_errors,
        "starting ansible event pump"
    );
    let pump = tokio::spawn(run_pump(
        AsyncBoundedLineReader::new(reader, limits.max_line_bytes),
        tx,
        cancel.clone(),
        Diagnostics { sink: diagnostics },
        route,
    ));

    PumpStream {
        rx,
        _cancel_on_drop: cancel.clone().drop_guard(),
        cancel,
        pump,
    }
}

async fn run_pump<R, T, F>(
    mut lines: AsyncBoundedLineReader<R>,
    sender: mpsc::Sender<T>,
    cancel: CancellationToken,
    mut diagnostics: Diagnostics,
    mut route: F,
) -> PumpSummary
where
    R: AsyncRead + Unpin,
    F: FnMut(EventRecord, &mut Diagnostics) -> Dispatch<T>,
{
    let mut lines_read = 0;
    let mut events_published = 0;
    let mut lines_dropped = 0;

    let termination = loop {
        let next = tokio::select! {
            biased;
            _ = cancel.cancelled() => break Termination::Cancelled,
            next = lines.next_line() => next,
        };

        let line = match next {
            None => break Termination::Exhausted,
            Some(Err(err)) => {
                diagnostics.source_failed(&err);
                break Termination::SourceFailed(err);
            }
            Some(Ok(line)) => line,
        };
        if line.is_blank() {
            continue;
        }
        lines_read += 1;

        let line_number = line.line_number;
        let record = EventRecord {
            line_number,
            outcome: decode_line_bytes(&line.bytes),
        };
        match route(record, &mut diagnostics) {
            Dispatch::Skip => lines_dropped += 1,
            Dispatch::Halt => {
                lines_dropped += 1;
                break Termination::DecodeHalted { line_number };
            }
            Dispatch::Publish(item) => {
                let sent = tokio::select! {
                    biased;
                    _ = cancel.cancelled() => break Termination::Cancelled,
                    sent = sender.send(item) => sent,
                };
                if sent.is_err() {
                    break Termination::ConsumerClosed;
                }
                events_published += 1;
            }
        }
    };

    debug!(
        lines_read,
        events_published,
        lines_dropped,
        termination = ?termination,
        "ansible event pump finished"
    );
    PumpSummary {
        lines_read,
        events_published,
        lines_dropped,
        termination,
    }
}

#[cfg(test)]
mod tests {
    use std::{
        io,
        sync::{Arc, Mutex},
    };

    use tokio::io::{AsyncWriteExt, ReadBuf};

    use super::*;
    use crate::{DiagnosticCode, EventKind};

    #[derive(Clone, Default)]
    struct Collect(Arc<Mutex<Vec<Diagnostic>>>);

    impl Collect {
        fn codes(&self) -> Vec<DiagnosticCode> {
            self.0.lock().unwrap().iter().map(|d| d.code).collect()
        }
    }

    impl DiagnosticSink for Collect {
        fn report(&mut self, diagnostic: Diagnostic) {
            self.0.lock().unwrap().push(diagnostic);
        }
    }

    /// Serves `data`, then fails every read.
    struct FailAfter {
        data: io::Cursor<Vec<u8>>,
    }

    impl AsyncRead for FailAfter {
        fn poll_read(
            mut self: Pin<&mut Self>,
            _cx: &mut Context<'_>,
            buf: &mut ReadBuf<'_>,
        ) -> Poll<io::Result<()>> {
            let pos = self.data.position() as usize;
            let remaining = &self.data.get_ref()[pos..];
            if remaining.is_empty() {
                return Poll::Ready(Err(io::Error::new(
                    io::ErrorKind::ConnectionReset,
                    "runner went away",
                )));
            }
            let n = remaining.len().min(buf.remaining());
            buf.put_slice(&remaining[..n]);
            self.data.set_position((pos + n) as u64);
            Poll::Ready(Ok(()))
        }
    }

    const PLAY: &str = r#"{"eventType":"PLAY_START","eventData":{"name":"etcd"}}"#;
    const TASK: &str = r#"{"eventType":"TASK_START","eventData":{"name":"copy certs"}}"#;

    async fn drain<T>(stream: &mut PumpStream<T>) -> Vec<T> {
        let mut out = Vec::new();
        while let Some(item) = stream.recv().await {
            out.push(item);
        }
        out
    }

    #[tokio::test]
    async fn clean_eof_reports_exhausted_without_diagnostics() {
        let sink = Collect::default();
        let input = format!("{PLAY}\n\n{TASK}\n");
        let mut stream = event_stream(
            io::Cursor::new(input.into_bytes()),
            StreamConfig::new().diagnostics(sink.clone()),
        );

        let kinds: Vec<_> = drain(&mut stream).await.iter().map(|e| e.kind()).collect();
        assert_eq!(kinds, vec![EventKind::PlayStart, EventKind::TaskStart]);

        let summary = stream.finish().await.unwrap();
        assert!(matches!(summary.termination, Termination::Exhausted));
        assert_eq!(summary.lines_read, 2);
        assert_eq!(summary.events_published, 2);
        assert!(sink.codes().is_empty());
    }

    #[tokio::test]
    async fn read_error_closes_stream_and_reports_once() {
        let sink = Collect::default();
        let reader = FailAfter {
            data: io::Cursor::new(format!("{PLAY}\n").into_bytes()),
        };
        let mut stream = event_stream(reader, StreamConfig::new().diagnostics(sink.clone()));

        assert_eq!(drain(&mut stream).await.len(), 1);
        let summary = stream.finish().await.unwrap();
        assert!(matches!(
            summary.termination,
            Termination::SourceFailed(SourceError::Io { line_number: 2, .. })
        ));
        assert_eq!(sink.codes(), vec![DiagnosticCode::Io]);
    }

    #[tokio::test]
    async fn oversized_line_terminates_the_stream() {
        let input = format!("{PLAY}\n{}\n{TASK}\n", "x".repeat(200));
        let mut stream = event_stream(
            io::Cursor::new(input.into_bytes()),
            StreamConfig::new().max_line_bytes(128),
        );

        assert_eq!(drain(&mut stream).await.len(), 1);
        let summary = stream.finish().await.unwrap();
        assert!(matches!(
            summary.termination,
            Termination::SourceFailed(SourceError::LineTooLong { line_number: 2, .. })
        ));
    }

    #[tokio::test]
    async fn drop_policy_is_silent() {
        let sink = Collect::default();
        let input = format!("not json\n{PLAY}\n");
        let mut stream = event_stream(
            io::Cursor::new(input.into_bytes()),
            StreamConfig::new().diagnostics(sink.clone()),
        );

        assert_eq!(drain(&mut stream).await.len(), 1);
        let summary = stream.finish().await.unwrap();
        assert_eq!(summary.lines_dropped, 1);
        assert!(sink.codes().is_empty());
    }

    #[tokio::test]
    async fn log_policy_reports_and_continues() {
        let sink = Collect::default();
        let input = format!("not json\n{{\"eventType\":\"BOGUS\",\"eventData\":{{}}}}\n{TASK}\n");
        let mut stream = event_stream(
            io::Cursor::new(input.into_bytes()),
            StreamConfig::new()
                .decode_errors(DecodeErrorPolicy::Log)
                .diagnostics(sink.clone()),
        );

        assert_eq!(drain(&mut stream).await.len(), 1);
        assert_eq!(
            sink.codes(),
            vec![DiagnosticCode::EnvelopeParse, DiagnosticCode::UnknownEventType]
        );
    }

    #[tokio::test]
    async fn halt_policy_stops_at_first_bad_line() {
        let input = format!("{PLAY}\nnot json\n{TASK}\n");
        let mut stream = event_stream(
            io::Cursor::new(input.into_bytes()),
            StreamConfig::new().decode_errors(DecodeErrorPolicy::Halt),
        );

        assert_eq!(drain(&mut stream).await.len(), 1);
        let summary = stream.finish().await.unwrap();
        assert!(matches!(
            summary.termination,
            Termination::DecodeHalted { line_number: 2 }
        ));
    }

    #[tokio::test]
    async fn cancel_releases_a_hung_source() {
        let (mut tx, rx) = tokio::io::duplex(1024);
        let mut stream = event_stream(rx, StreamConfig::default());

        tx.write_all(format!("{PLAY}\n").as_bytes()).await.unwrap();
        assert!(stream.recv().await.is_some());

        // The writer stays open, so the pump is parked in a read.
        stream.cancel();
        assert!(stream.recv().await.is_none());
        let summary = stream.finish().await.unwrap();
        assert!(matches!(summary.termination, Termination::Cancelled));
    }

    #[tokio::test]
    async fn external_token_cancels_but_is_not_cancelled_by_drop() {
        let parent = CancellationToken::new();
        let (_tx, rx) = tokio::io::duplex(1024);
        let stream = event_stream(rx, StreamConfig::new().cancel_token(parent.clone()));
        drop(stream);
        assert!(!parent.is_cancelled());

        let (_tx, rx) = tokio::io::duplex(1024);
        let mut stream = event_stream(rx, StreamConfig::new().cancel_token(parent.clone()));
        parent.cancel();
        assert!(stream.recv().await.is_none());
    }

    #[tokio::test]
    async fn record_stream_propagates_failures_in_order() {
        let input = format!("{PLAY}\nnot json\n\n{TASK}\n");
        let mut stream = record_stream(io::Cursor::new(input.into_bytes()), StreamConfig::new());

        let records = drain(&mut stream).await;
        let lines: Vec<_> = records
            .iter()
            .map(|r| (r.line_number, r.outcome.is_ok()))
            .collect();
        assert_eq!(lines, vec![(1, true), (2, false), (4, true)]);
    }
}
