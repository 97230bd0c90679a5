//! Pull-style access to the documents of one execution.

use std::io::{BufRead, Write};

use layered_annotations::Document;

use crate::channel::{Event, FrameChannel};
use crate::codec::EMPTY_RESPONSE;
use crate::{
    BoundParameters, Corpus, ExecutionState, ParameterSpec, ProtocolResult, SessionConfig,
    SessionSummary,
};

/// Hands out documents one at a time to code that drives its own loop.
///
/// Each call to [`next_document`](Self::next_document) first answers the
/// document handed out before it with that document's journal, then reads
/// frames until the next document arrives or execution ends. Documents that
/// fail to decode are answered with `[]` and skipped.
///
/// ```no_run
/// use layered_annotations::FeatureMap;
/// use layered_annotations_protocol::Documents;
///
/// let stdin = std::io::stdin();
/// let mut documents = Documents::new(stdin.lock(), std::io::stdout());
/// while let Some(document) = documents.next_document()? {
///     let len = document.len();
///     document.annotations("").add(0, len, "Document", FeatureMap::new())?;
/// }
/// # Ok::<(), Box<dyn std::error::Error>>(())
/// ```
pub struct Documents<R, W> {
    channel: FrameChannel<R, W>,
    specs: Vec<ParameterSpec>,
    parameters: BoundParameters,
    pending: Option<Document>,
}

impl<R, W> Documents<R, W>
where
    R: BufRead,
    W: Write,
{
    pub fn new(input: R, output: W) -> Self {
        Self {
            channel: FrameChannel::new(input, output),
            specs: Vec::new(),
            parameters: BoundParameters::default(),
            pending: None,
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

    /// Takes self, declares a parameter to bind when execution begins
    pub fn with_parameter(mut self, spec: ParameterSpec) -> Self {
        self.specs.push(spec);
        self
    }

    pub fn parameters(&self) -> &BoundParameters {
        &self.parameters
    }

    pub fn corpus(&self) -> Option<&Corpus> {
        self.channel.corpus.as_ref()
    }

    pub fn input_set(&self) -> &str {
        &self.channel.input_set
    }

    pub fn output_set(&self) -> &str {
        &self.channel.output_set
    }

    pub fn state(&self) -> ExecutionState {
        self.channel.state
    }

    pub fn summary(&self) -> &SessionSummary {
        &self.channel.summary
    }

    /// Answer the previous document, then wait for the next one.
    ///
    /// `None` once the host ends or aborts execution or closes the channel.
    pub fn next_document(&mut self) -> ProtocolResult<Option<&mut Document>> {
        self.flush()?;
        loop {
            if self.channel.state.is_terminated() {
                return Ok(None);
            }
            match self.channel.next_event()? {
                Event::Started(supplied) => {
                    self.parameters = BoundParameters::bind(&self.specs, &supplied);
                }
                Event::Document(document) => return Ok(Some(self.pending.insert(document))),
                Event::Finished | Event::Aborted => return Ok(None),
                Event::Handled => {}
            }
        }
    }

    /// Answer the outstanding document with `[]`, dropping its changes.
    pub fn discard(&mut self) -> ProtocolResult<()> {
        if self.pending.take().is_some() {
            self.channel.summary.failures += 1;
            self.channel.respond(EMPTY_RESPONSE)?;
        }
        Ok(())
    }

    /// Answer the outstanding document, then every remaining one unchanged,
    /// until execution ends.
    pub fn finish(mut self) -> ProtocolResult<(SessionSummary, W)> {
        while self.next_document()?.is_some() {}
        Ok((self.channel.summary.clone(), self.channel.into_output()))
    }

    fn flush(&mut self) -> ProtocolResult<()> {
        if let Some(mut document) = self.pending.take() {
            self.channel.respond_with(&mut document)?;
        }
        Ok(())
    }
}
