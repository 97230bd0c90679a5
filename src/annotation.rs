//! Annotations and the spans they cover.

use std::fmt;

use serde_json::Value;

use crate::{AnnotationError, AnnotationResult};

/// Identifier of an annotation, unique within its set.
pub type AnnotationId = u64;

/// Key/value features attached to a document or an annotation.
pub type FeatureMap = serde_json::Map<String, Value>;

/// A half-open character range `[start, end)` within a document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Span {
    pub start: usize,
    pub end: usize,
}

impl Span {
    pub fn new(start: usize, end: usize) -> Self {
        Self { start, end }
    }

    /// Validate a span against a document of `len` chars.
    ///
    /// Takes signed offsets because that is what arrives on the wire.
    pub fn checked(start: i64, end: i64, len: usize) -> AnnotationResult<Self> {
        let invalid = |reason| AnnotationError::InvalidOffset {
            start,
            end,
            len,
            reason,
        };

        if start < 0 {
            return Err(invalid("annotation starts before 0"));
        }
        if end < 0 {
            return Err(invalid("annotation ends before 0"));
        }
        if start > end {
            return Err(invalid("annotation ends before it starts"));
        }
        // Both offsets are non-negative here.
        let (start, end) = (start as u64, end as u64);
        if start > len as u64 {
            return Err(invalid("annotation starts after document ends"));
        }
        if end > len as u64 {
            return Err(invalid("annotation ends after document ends"));
        }

        Ok(Self::new(start as usize, end as usize))
    }

    pub fn len(&self) -> usize {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }

    /// Whether `offset` falls inside `[start, end)`.
    pub fn contains(&self, offset: usize) -> bool {
        self.start <= offset && offset < self.end
    }

    /// Whether the spans share at least one boundary-exclusive point.
    pub fn overlaps(&self, other: &Span) -> bool {
        self.start < other.end && self.end > other.start
    }
}

impl fmt::Display for Span {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {})", self.start, self.end)
    }
}

/// A typed, feature-bearing span over document text.
///
/// Annotations are read through shared references; feature writes on a
/// document-owned annotation go through [`AnnotationMut`](crate::AnnotationMut)
/// so that they are journaled.
#[derive(Debug, Clone, PartialEq)]
pub struct Annotation {
    pub(crate) id: AnnotationId,
    pub(crate) span: Span,
    pub(crate) annotation_type: String,
    pub(crate) features: FeatureMap,
}

impl Annotation {
    pub(crate) fn new(
        id: AnnotationId,
        span: Span,
        annotation_type: impl Into<String>,
        features: FeatureMap,
    ) -> Self {
        Self {
            id,
            span,
            annotation_type: annotation_type.into(),
            features,
        }
    }

    pub fn id(&self) -> AnnotationId {
        self.id
    }

    pub fn span(&self) -> Span {
        self.span
    }

    pub fn start(&self) -> usize {
        self.span.start
    }

    pub fn end(&self) -> usize {
        self.span.end
    }

    pub fn annotation_type(&self) -> &str {
        &self.annotation_type
    }

    pub fn features(&self) -> &FeatureMap {
        &self.features
    }

    pub fn feature(&self, key: &str) -> Option<&Value> {
        self.features.get(key)
    }
}

impl fmt::Display for Annotation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "<{} annotation {} at ({}, {})>",
            self.annotation_type, self.id, self.span.start, self.span.end
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_checked_span_accepts_bounds() {
        assert_eq!(Span::checked(0, 0, 0), Ok(Span::new(0, 0)));
        assert_eq!(Span::checked(3, 10, 10), Ok(Span::new(3, 10)));
    }

    #[test]
    fn test_checked_span_rejections() {
        let reason = |result: AnnotationResult<Span>| match result {
            Err(AnnotationError::InvalidOffset { reason, .. }) => reason,
            other => panic!("expected InvalidOffset, got {:?}", other),
        };

        assert_eq!(reason(Span::checked(-1, 4, 100)), "annotation starts before 0");
        assert_eq!(reason(Span::checked(0, -4, 100)), "annotation ends before 0");
        assert_eq!(reason(Span::checked(5, 3, 100)), "annotation ends before it starts");
        assert_eq!(reason(Span::checked(101, 101, 100)), "annotation starts after document ends");
        assert_eq!(reason(Span::checked(50, 101, 100)), "annotation ends after document ends");
    }

    #[test]
    fn test_span_predicates() {
        let span = Span::new(2, 6);
        assert!(span.contains(2));
        assert!(!span.contains(6));
        assert!(span.overlaps(&Span::new(5, 9)));
        assert!(!span.overlaps(&Span::new(6, 9)));
        assert_eq!(span.len(), 4);
        assert_eq!(span.to_string(), "[2, 6)");
    }
}
