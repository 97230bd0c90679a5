//! Error types for the session protocol.
//!
//! [`ProtocolError`] covers the channel and the frames on it; [`StageError`]
//! is what a processing stage returns when it cannot handle a document.

use std::fmt;

use layered_annotations::{AnnotationError, DocumentError};
use thiserror::Error;

use crate::{ExecutionState, FrameKind};

/// Errors raised while driving a session.
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// A frame that is not valid JSON or lacks required document fields.
    ///
    /// Only that frame is lost; the session keeps running.
    #[error("malformed frame: {message}")]
    Decode { message: String },

    /// A line carrying a `command` key whose fields do not decode.
    ///
    /// Control frames are never answered, so neither is this one.
    #[error("malformed control frame: {message}")]
    Control { message: String },

    /// Reading or writing the duplex channel failed.
    #[error("channel failure: {0}")]
    Channel(#[from] std::io::Error),

    /// A response frame could not be serialized.
    #[error("failed to encode response: {0}")]
    Encode(#[source] serde_json::Error),

    /// A frame arrived in a state that does not accept it.
    #[error("{frame} frame not accepted while {state}")]
    InvalidTransition {
        state: ExecutionState,
        frame: FrameKind,
    },

    /// Session configuration could not be loaded.
    #[error("failed to load session config: {path}: {message}")]
    Config { path: String, message: String },
}

impl ProtocolError {
    pub(crate) fn decode(message: impl fmt::Display) -> Self {
        ProtocolError::Decode {
            message: message.to_string(),
        }
    }
}

impl From<AnnotationError> for ProtocolError {
    fn from(err: AnnotationError) -> Self {
        ProtocolError::decode(err)
    }
}

/// Result type for protocol operations.
pub type ProtocolResult<T> = Result<T, ProtocolError>;

/// Failure reported by a processing stage hook.
#[derive(Debug, Error)]
pub enum StageError {
    #[error("{0}")]
    Failed(String),

    #[error(transparent)]
    Document(#[from] DocumentError),

    #[error(transparent)]
    Annotation(#[from] AnnotationError),

    #[error("parameter {name:?} has an unexpected value: {source}")]
    Parameter {
        name: String,
        #[source]
        source: serde_json::Error,
    },

    /// The hook panicked; the payload message is kept when it is a string.
    #[error("stage panicked: {0}")]
    Panicked(String),
}

impl StageError {
    pub fn msg(message: impl fmt::Display) -> Self {
        StageError::Failed(message.to_string())
    }
}

/// Result type for processing stage hooks.
pub type StageResult<T = ()> = Result<T, StageError>;
