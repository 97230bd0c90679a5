//! Frame reading and state tracking shared by [`Session`](crate::Session)
//! and [`Documents`](crate::Documents).

use std::io::{self, BufRead, Write};

use layered_annotations::Document;
use serde_json::{Map, Value};

use crate::codec::{self, EMPTY_RESPONSE};
use crate::{
    Corpus, ExecutionState, Frame, FrameKind, ProtocolError, ProtocolResult, SessionConfig,
    SessionSummary, Transition,
};

/// What one inbound line amounted to, once the state machine accepted it.
pub(crate) enum Event {
    /// Execution began; carries the raw `parameterMap`.
    Started(Map<String, Value>),
    /// A decoded document the caller must answer exactly once.
    Document(Document),
    Finished,
    Aborted,
    /// Nothing for the caller to do: the line was rejected, already
    /// answered, or ended an execution that never began.
    Handled,
}

pub(crate) struct FrameChannel<R, W> {
    input: R,
    output: W,
    diagnostics: Box<dyn Write>,
    pub config: SessionConfig,
    pub state: ExecutionState,
    pub corpus: Option<Corpus>,
    pub input_set: String,
    pub output_set: String,
    pub summary: SessionSummary,
}

impl<R: BufRead, W: Write> FrameChannel<R, W> {
    pub fn new(input: R, output: W) -> Self {
        Self {
            input,
            output,
            diagnostics: Box::new(io::stderr()),
            config: SessionConfig::default(),
            state: ExecutionState::Idle,
            corpus: None,
            input_set: String::new(),
            output_set: String::new(),
            summary: SessionSummary::default(),
        }
    }

    pub fn set_diagnostics(&mut self, diagnostics: Box<dyn Write>) {
        self.diagnostics = diagnostics;
    }

    pub fn into_output(self) -> W {
        self.output
    }

    /// Read one line and run it through the state machine.
    pub fn next_event(&mut self) -> ProtocolResult<Event> {
        if self.state.is_terminated() {
            return Ok(Event::Handled);
        }

        let mut line = String::new();
        let read = match self.input.read_line(&mut line) {
            Ok(read) => read,
            Err(err) if err.kind() == io::ErrorKind::InvalidData => {
                self.report(format_args!("unreadable frame, closing: {}", err));
                0
            }
            Err(err) => return Err(ProtocolError::Channel(err)),
        };

        let frame = line.trim();
        if read == 0 || frame.is_empty() {
            log::debug!("input closed");
            return self.lifecycle(FrameKind::Closed);
        }

        log::debug!("frame received ({} bytes)", frame.len());
        match codec::decode_frame(frame) {
            Ok(Frame::Begin { parameters, corpus }) => {
                if self.advance(FrameKind::Begin)?.is_none() {
                    return Ok(Event::Handled);
                }
                self.begin(&parameters, corpus);
                Ok(Event::Started(parameters))
            }
            Ok(Frame::End) => self.lifecycle(FrameKind::End),
            Ok(Frame::Abort) => self.lifecycle(FrameKind::Abort),
            Ok(Frame::Document(document)) => {
                self.summary.documents += 1;
                if self.advance(FrameKind::Document)?.is_none() {
                    return Ok(Event::Handled);
                }
                match codec::decode_document(document, &self.config) {
                    Ok(document) => Ok(Event::Document(document)),
                    Err(err) => {
                        self.summary.failures += 1;
                        self.report(format_args!("{}", err));
                        self.respond(EMPTY_RESPONSE)?;
                        Ok(Event::Handled)
                    }
                }
            }
            Ok(Frame::Unrecognized { command }) => {
                log::warn!("ignoring unknown command {:?}", command);
                self.report(format_args!("ignoring unknown command {:?}", command));
                Ok(Event::Handled)
            }
            Err(err @ ProtocolError::Control { .. }) => {
                // Control frames are never answered, malformed or not.
                self.summary.rejected += 1;
                log::warn!("{}", err);
                self.report(format_args!("{}", err));
                Ok(Event::Handled)
            }
            Err(err) => {
                // Not a control frame, so the host is waiting for an answer.
                self.summary.documents += 1;
                self.summary.failures += 1;
                self.report(format_args!("{}", err));
                self.respond(EMPTY_RESPONSE)?;
                Ok(Event::Handled)
            }
        }
    }

    /// Feed the state machine; `None` when it refused the frame.
    fn advance(&mut self, kind: FrameKind) -> ProtocolResult<Option<Transition>> {
        match self.state.advance(kind) {
            Ok(transition) => Ok(Some(transition)),
            Err(err) => {
                self.summary.rejected += 1;
                log::warn!("{}", err);
                self.report(format_args!("{}", err));
                // keep one response per document frame
                if kind == FrameKind::Document {
                    self.respond(EMPTY_RESPONSE)?;
                }
                Ok(None)
            }
        }
    }

    /// END, ABORT and channel close.
    fn lifecycle(&mut self, kind: FrameKind) -> ProtocolResult<Event> {
        Ok(match self.advance(kind)? {
            Some(Transition::Finish) => Event::Finished,
            Some(Transition::Abort) => {
                self.summary.aborted = true;
                Event::Aborted
            }
            _ => Event::Handled,
        })
    }

    fn begin(&mut self, supplied: &Map<String, Value>, corpus: Corpus) {
        let set_name = |parameter: &str| {
            supplied
                .get(parameter)
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string()
        };
        self.input_set = set_name(&self.config.input_set_parameter);
        self.output_set = set_name(&self.config.output_set_parameter);
        log::debug!(
            "execution started for corpus {:?}, input set {:?}, output set {:?}",
            corpus.name,
            self.input_set,
            self.output_set
        );
        self.corpus = Some(corpus);
    }

    /// Answer a document with its flushed journal.
    pub fn respond_with(&mut self, document: &mut Document) -> ProtocolResult<()> {
        let records = document.take_journal();
        log::debug!("responding with {} records", records.len());
        let response = codec::encode_response(records, document)?;
        self.respond(&response)
    }

    pub fn respond(&mut self, line: &str) -> ProtocolResult<()> {
        self.output.write_all(line.as_bytes())?;
        self.output.write_all(b"\n")?;
        self.output.flush()?;
        self.summary.responses += 1;
        Ok(())
    }

    /// Write one line to the diagnostics channel.
    pub fn report(&mut self, message: std::fmt::Arguments<'_>) {
        let written = writeln!(self.diagnostics, "{}: {}", self.config.diagnostics_prefix, message)
            .and_then(|_| self.diagnostics.flush());
        if let Err(err) = written {
            log::warn!("diagnostics channel failed: {}", err);
        }
    }
}
