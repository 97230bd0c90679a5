#![doc(
    html_logo_url = "https://raw.githubusercontent.com/storyscript/layered-nlp/main/assets/layered-nlp.svg",
    issue_tracker_base_url = "https://github.com/storyscript/layered-nlp/issues/"
)]

//! In-memory annotation documents for external pipeline stages.
//!
//! A host process owns the authoritative document store and hands a stage one
//! document at a time. This crate models that document while the stage works
//! on it and records every change so the host can replay it.
//!
//! ## Text
//!
//! - [`SourcedString`] - Text that remembers where each char came from
//! - [`unescape_entities`] - Decodes character references, keeping offsets mappable
//!
//! ## Annotations
//!
//! - [`AnnotationSet`] - Interval-indexed store answering positional queries
//! - [`Annotation`], [`Span`] - Typed, feature-bearing spans
//!
//! ## Documents
//!
//! - [`Document`] - Write-once text plus named annotation sets and features
//! - [`AnnotationSetMut`], [`AnnotationMut`] - Journaling write handles
//! - [`Journal`], [`JournalRecord`] - Ordered, replayable mutation records
//!
//! ## Example
//!
//! ```
//! use layered_annotations::{Document, FeatureMap};
//!
//! let mut doc = Document::new("ab cd");
//! doc.annotations("").add(0, 2, "Token", FeatureMap::new()).unwrap();
//!
//! let tokens = doc.annotation_set("").unwrap().by_type("Token");
//! assert_eq!(tokens[0].span().len(), 2);
//! assert_eq!(doc.journal().len(), 1);
//! ```

mod annotation;
mod annotation_set;
mod display;
mod document;
mod entities;
mod errors;
mod journal;
mod offset_tree;
mod sourced_string;

pub use annotation::{Annotation, AnnotationId, FeatureMap, Span};
pub use annotation_set::AnnotationSet;
pub use display::AnnotationSetDisplay;
pub use document::{AnnotationMut, AnnotationSetMut, Document, DocumentBuilder, DEFAULT_SET};
pub use errors::{
    AnnotationError, AnnotationResult, DocumentError, DocumentResult, RecordError,
};
pub use journal::{CommandName, FeatureScope, Journal, JournalRecord};
pub use sourced_string::{unescape_entities, SourcePosition, SourceSpan, SourcedString};
