use thiserror::Error;

/// Coarse classification used when reporting to a [`DiagnosticSink`].
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum DiagnosticCode {
    Io,
    LineTooLong,
    EnvelopeParse,
    PayloadDecode,
    UnknownEventType,
}

/// Why a single line failed to decode into an [`AnsibleEvent`](crate::AnsibleEvent).
#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("failed to parse ansible event envelope: {source}: `{line}`")]
    EnvelopeParse {
        line: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("failed to decode `{tag}` event data: {source}: `{line}`")]
    PayloadDecode {
        tag: String,
        line: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("unhandled ansible event type {tag:?}")]
    UnknownEventType { tag: String },
}

impl DecodeError {
    pub fn code(&self) -> DiagnosticCode {
        match self {
            DecodeError::EnvelopeParse { .. } => DiagnosticCode::EnvelopeParse,
            DecodeError::PayloadDecode { .. } => DiagnosticCode::PayloadDecode,
            DecodeError::UnknownEventType { .. } => DiagnosticCode::UnknownEventType,
        }
    }
}

/// Failure below the line level. Always terminal for the stream that hit it.
#[derive(Debug, Error)]
pub enum SourceError {
    #[error("failed to read ansible event stream at line {line_number}: {source}")]
    Io {
        line_number: usize,
        #[source]
        source: std::io::Error,
    },
    #[error(
        "line {line_number} too long (observed_bytes={observed_bytes}, max_line_bytes={max_line_bytes})"
    )]
    LineTooLong {
        line_number: usize,
        observed_bytes: usize,
        max_line_bytes: usize,
    },
}

impl SourceError {
    pub fn code(&self) -> DiagnosticCode {
        match self {
            SourceError::Io { .. } => DiagnosticCode::Io,
            SourceError::LineTooLong { .. } => DiagnosticCode::LineTooLong,
        }
    }

    pub fn line_number(&self) -> usize {
        match self {
            SourceError::Io { line_number, .. } | SourceError::LineTooLong { line_number, .. } => {
                *line_number
            }
        }
    }
}

#[derive(Debug, Error)]
pub enum StreamError {
    #[error("failed to join ansible event pump task: {0}")]
    Join(#[from] tokio::task::JoinError),
}

/// One report delivered to the operational side channel.
#[derive(Debug, Clone)]
pub struct Diagnostic {
    pub line_number: usize,
    pub code: DiagnosticCode,
    pub details: String,
}

pub trait DiagnosticSink: Send + 'static {
    fn report(&mut self, diagnostic: Diagnostic);
}
