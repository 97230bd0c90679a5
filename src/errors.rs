//! Error types for annotation stores and documents.

use thiserror::Error;

use crate::AnnotationId;

/// Errors raised by annotation store operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AnnotationError {
    /// A span that is negative, inverted, or runs past the document.
    ///
    /// Always raised before the store is touched.
    #[error("invalid offsets [{start}, {end}) for document of length {len}: {reason}")]
    InvalidOffset {
        start: i64,
        end: i64,
        len: usize,
        reason: &'static str,
    },

    /// Lookup or removal of an annotation the set does not contain.
    #[error("annotation {id} not found in set {set:?}")]
    NotFound { set: String, id: AnnotationId },
}

/// Errors raised by document operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DocumentError {
    /// Document text is write-once.
    #[error("document text cannot be modified by a processing stage")]
    ReadOnlyText,

    #[error(transparent)]
    Annotation(#[from] AnnotationError),
}

/// A wire command that cannot be read back as a journal record.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RecordError {
    #[error("{command} record is missing {field}")]
    MissingField {
        command: &'static str,
        field: &'static str,
    },
}

/// Result type for annotation store operations.
pub type AnnotationResult<T> = Result<T, AnnotationError>;

/// Result type for document operations.
pub type DocumentResult<T> = Result<T, DocumentError>;
