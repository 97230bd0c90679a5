#![doc(
    html_logo_url = "https://raw.githubusercontent.com/storyscript/layered-nlp/main/assets/layered-nlp.svg",
    issue_tracker_base_url = "https://github.com/storyscript/layered-nlp/issues/"
)]

//! Session protocol between an annotation host and a processing stage.
//!
//! The host writes one JSON value per line; the stage answers every document
//! with one line holding the journal of changes it made.
//!
//! ```text
//! > {"command":"BEGIN_EXECUTION","parameterMap":{"outputAS":"tokens"}}
//! > {"text":"ab cd","documentFeatures":{},"entities":{}}
//! < [{"command":"ADD_ANNOT","annotationSet":"tokens",...}]
//! > {"command":"END_EXECUTION"}
//! ```
//!
//! - [`Session`] - Reads frames, drives the [`ExecutionState`] machine, writes responses
//! - [`Documents`] - The same loop turned inside out, for callers that pull documents
//! - [`ProcessingStage`] - The stage interface; [`FnStage`] adapts a closure
//! - [`SessionConfig`] - Parameter names, entity unescaping, diagnostics prefix
//!
//! ## Example
//!
//! ```no_run
//! use layered_annotations::FeatureMap;
//! use layered_annotations_protocol::{run_stdio, FnStage};
//!
//! let stage = FnStage::new(|document, context| {
//!     let len = document.len();
//!     document
//!         .annotations(context.output_set())
//!         .add(0, len, "Document", FeatureMap::new())?;
//!     Ok(())
//! });
//! run_stdio(stage).unwrap();
//! ```

mod channel;
mod codec;
mod config;
mod documents;
mod error;
mod frame;
mod session;
mod stage;
mod state;

pub use codec::{decode_document, decode_frame, encode_response, EMPTY_RESPONSE};
pub use config::SessionConfig;
pub use documents::Documents;
pub use error::{ProtocolError, ProtocolResult, StageError, StageResult};
pub use frame::{Corpus, DocumentFrame, EntityRecord, Frame};
pub use session::{run_stdio, Session, SessionSummary};
pub use stage::{BoundParameters, FnStage, ParameterSpec, ProcessingStage, StageContext};
pub use state::{ExecutionState, FrameKind, Transition};
