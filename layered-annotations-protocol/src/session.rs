//! The request/response loop.

use std::any::Any;
use std::io::{self, BufRead, Write};
use std::panic::{self, AssertUnwindSafe};

use layered_annotations::Document;
use serde_json::{Map, Value};

use crate::channel::{Event, FrameChannel};
use crate::codec::EMPTY_RESPONSE;
use crate::{
    BoundParameters, ExecutionState, ProcessingStage, ProtocolResult, SessionConfig,
    StageContext, StageError, StageResult,
};

/// Counters describing a finished (or running) session.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionSummary {
    /// Document frames received, including rejected and undecodable ones
    pub documents: usize,
    /// Response frames written
    pub responses: usize,
    /// Documents answered with an empty journal because of an error
    pub failures: usize,
    /// Frames the state machine refused
    pub rejected: usize,
    pub aborted: bool,
}

/// Drives one [`ProcessingStage`] over a line-delimited duplex channel.
///
/// Frames are read from `input` one line at a time; each document frame is
/// answered with exactly one line on `output`. Problems that do not end the
/// session are reported on the diagnostics channel (stderr unless replaced),
/// never on `output`.
pub struct Session<S, R, W> {
    stage: S,
    channel: FrameChannel<R, W>,
    parameters: BoundParameters,
}

impl<S, R, W> Session<S, R, W>
where
    S: ProcessingStage,
    R: BufRead,
    W: Write,
{
    pub fn new(stage: S, input: R, output: W) -> Self {
        Self {
            stage,
            channel: FrameChannel::new(input, output),
            parameters: BoundParameters::default(),
        }
    }

    /// Takes self
    pub fn with_config(mut self, config: SessionConfig) -> Self {
        self.channel.config = config;
        self
    }

    /// Takes self, replaces the diagnostics channel
    pub fn with_diagnostics(mut self, diagnostics: impl Write + 'static) -> Self {
        self.channel.set_diagnostics(Box::new(diagnostics));
        self
    }

    pub fn state(&self) -> ExecutionState {
        self.channel.state
    }

    pub fn summary(&self) -> &SessionSummary {
        &self.channel.summary
    }

    pub fn stage(&self) -> &S {
        &self.stage
    }

    pub fn into_inner(self) -> (S, W) {
        (self.stage, self.channel.into_output())
    }

    /// Process frames until the session terminates.
    ///
    /// Only channel failures end the loop early with an error.
    pub fn run(&mut self) -> ProtocolResult<SessionSummary> {
        while !self.channel.state.is_terminated() {
            self.step()?;
        }
        Ok(self.channel.summary.clone())
    }

    /// Read and handle one frame. Does nothing once terminated.
    pub fn step(&mut self) -> ProtocolResult<ExecutionState> {
        match self.channel.next_event()? {
            Event::Started(supplied) => self.begin(&supplied),
            Event::Document(document) => self.process(document)?,
            Event::Finished => {
                let parameters = &self.parameters;
                let stage = &mut self.stage;
                if let Err(err) = guarded(|| stage.finish(parameters)) {
                    self.channel.report(format_args!("finish hook failed: {}", err));
                }
            }
            Event::Aborted => {
                let parameters = &self.parameters;
                let stage = &mut self.stage;
                if let Err(err) = guarded(|| stage.abort(parameters)) {
                    self.channel.report(format_args!("abort hook failed: {}", err));
                }
            }
            Event::Handled => {}
        }
        Ok(self.channel.state)
    }

    fn begin(&mut self, supplied: &Map<String, Value>) {
        self.parameters = BoundParameters::bind(&self.stage.parameters(), supplied);
        log::debug!("{} parameters bound", self.parameters.len());

        let parameters = &self.parameters;
        let stage = &mut self.stage;
        if let Err(err) = guarded(|| stage.start(parameters)) {
            self.channel.report(format_args!("start hook failed: {}", err));
        }
    }

    fn process(&mut self, mut document: Document) -> ProtocolResult<()> {
        let channel = &self.channel;
        let mut context =
            StageContext::new(&self.parameters, &channel.input_set, &channel.output_set);
        if let Some(corpus) = &channel.corpus {
            context = context.with_corpus(corpus);
        }
        let stage = &mut self.stage;
        let outcome = guarded(|| stage.process(&mut document, &context));

        match outcome {
            Ok(()) => self.channel.respond_with(&mut document),
            Err(err) => {
                // the partial journal is dropped with the document
                self.channel.summary.failures += 1;
                log::error!("processing stage failed: {}", err);
                self.channel
                    .report(format_args!("processing stage failed: {}", err));
                self.channel.respond(EMPTY_RESPONSE)
            }
        }
    }
}

/// Run a stage hook, turning a panic into a [`StageError`].
fn guarded(hook: impl FnOnce() -> StageResult) -> StageResult {
    match panic::catch_unwind(AssertUnwindSafe(hook)) {
        Ok(result) => result,
        Err(payload) => Err(StageError::Panicked(panic_message(payload.as_ref()))),
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

/// Run `stage` over stdin and stdout until the host ends execution.
pub fn run_stdio<S: ProcessingStage>(stage: S) -> ProtocolResult<SessionSummary> {
    let stdin = io::stdin();
    let stdout = io::stdout();
    Session::new(stage, stdin.lock(), stdout.lock()).run()
}
