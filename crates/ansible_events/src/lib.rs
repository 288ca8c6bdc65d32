#![forbid(unsafe_code)]
//! Typed event stream for the Ansible runner's JSONL callback output.
//!
//! The runner writes one `{"eventType": ..., "eventData": ...}` object per line.
//! This crate provides:
//! - A pure line decoder ([`decode_line`]) keyed on the closed [`EventKind`] set.
//! - A bounded-memory line source (sync + tokio).
//! - A pump ([`event_stream`]) that turns an [`tokio::io::AsyncRead`] into an ordered,
//!   cancellable [`EventStream`] with one-slot backpressure.
//! - A blocking iterator ([`ansible_event_jsonl_reader`]) for offline logs.

mod config;
mod decode;
mod error;
mod jsonl;
mod pump;
mod reader;
mod types;

pub use config::{DecodeErrorPolicy, StreamConfig, StreamLimits};
pub use decode::{decode_line, decode_line_bytes};
pub use error::{DecodeError, Diagnostic, DiagnosticCode, DiagnosticSink, SourceError, StreamError};
pub use jsonl::{
    ansible_event_jsonl_file, ansible_event_jsonl_reader, AnsibleEventJsonlFileReader,
    AnsibleEventJsonlReader,
};
pub use pump::{
    event_stream, record_stream, EventRecord, EventStream, PumpStream, PumpSummary, RecordStream,
    Termination,
};
pub use reader::{AsyncBoundedLineReader, BoundedLine, SyncBoundedLineReader};
pub use types::{
    AnsibleEvent, EventKind, HandlerTaskStart, PlayStart, PlaybookEnd, PlaybookStart,
    RunnerResult, RunnerResultEvent, TaskStart,
};
