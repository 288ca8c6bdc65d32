use tokio_util::sync::CancellationToken;

use crate::error::DiagnosticSink;

/// What the pump does with a line that fails to decode.
#[derive(Debug, Clone, Copy, Default, Eq, PartialEq)]
pub enum DecodeErrorPolicy {
    /// Discard the line without a trace and keep reading.
    #[default]
    Drop,
    /// Report the failure (tracing + diagnostic sink) and keep reading.
    Log,
    /// Report the failure and close the stream.
    Halt,
}

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub struct StreamLimits {
    pub max_line_bytes: usize,
}

impl Default for StreamLimits {
    fn default() -> Self {
        Self {
            max_line_bytes: 64 * 1024,
        }
    }
}

pub struct StreamConfig {
    pub limits: StreamLimits,
    pub decode_errors: DecodeErrorPolicy,
    pub diagnostics: Option<Box<dyn DiagnosticSink>>,
    /// External token; when unset the stream creates its own.
    pub cancel: Option<CancellationToken>,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            limits: StreamLimits::default(),
            decode_errors: DecodeErrorPolicy::Drop,
            diagnostics: None,
            cancel: None,
        }
    }
}

impl StreamConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn max_line_bytes(mut self, max_line_bytes: usize) -> Self {
        self.limits.max_line_bytes = max_line_bytes;
        self
    }

    pub fn decode_errors(mut self, policy: DecodeErrorPolicy) -> Self {
        self.decode_errors = policy;
        self
    }

    pub fn diagnostics(mut self, sink: impl DiagnosticSink) -> Self {
        self.diagnostics = Some(Box::new(sink));
        self
    }

    pub fn cancel_token(mut self, token: CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }
}
