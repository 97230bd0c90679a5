//! Interval-indexed annotation store.
//!
//! An [`AnnotationSet`] keeps every annotation in two [`OffsetTree`]s, one
//! keyed by start offset and one keyed by end offset, plus an id index and a
//! lazily built type index. All positional queries return annotations in
//! document order: ascending start, ties broken by insertion order.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fmt;
use std::ops::Bound;

use once_cell::unsync::OnceCell;

use crate::offset_tree::{Entry, OffsetTree, RangeQuery};
use crate::{Annotation, AnnotationError, AnnotationId, AnnotationResult, FeatureMap, Span};

#[derive(Debug, Clone)]
struct Stored {
    annotation: Annotation,
    /// Insertion sequence number, breaks ties between equal starts.
    seq: u64,
}

/// Position of an annotation in document order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
struct OrderKey {
    start: usize,
    seq: u64,
    id: AnnotationId,
}

/// A named collection of annotations over one document.
#[derive(Clone)]
pub struct AnnotationSet {
    name: String,
    doc_len: usize,
    annotations: BTreeMap<AnnotationId, Stored>,
    by_start: OffsetTree,
    by_end: OffsetTree,
    by_type: OnceCell<HashMap<String, Vec<OrderKey>>>,
    next_seq: u64,
}

impl AnnotationSet {
    /// Create an empty set for a document of `doc_len` chars.
    pub fn new(name: impl Into<String>, doc_len: usize) -> Self {
        Self {
            name: name.into(),
            doc_len,
            annotations: BTreeMap::new(),
            by_start: OffsetTree::new(),
            by_end: OffsetTree::new(),
            by_type: OnceCell::new(),
            next_seq: 0,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Length, in chars, of the document this set annotates.
    pub fn document_len(&self) -> usize {
        self.doc_len
    }

    pub fn len(&self) -> usize {
        self.annotations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.annotations.is_empty()
    }

    /// The id [`add`](Self::add) would assign next.
    pub fn next_id(&self) -> AnnotationId {
        self.annotations
            .keys()
            .next_back()
            .map_or(1, |max| max + 1)
    }

    // ------------------------------------------------------------------
    // Mutation
    // ------------------------------------------------------------------

    /// Add an annotation with an automatically assigned id.
    pub fn add(
        &mut self,
        start: usize,
        end: usize,
        annotation_type: &str,
        features: FeatureMap,
    ) -> AnnotationResult<AnnotationId> {
        let span = self.check_span(start, end)?;
        let id = self.next_id();
        self.insert(Annotation::new(id, span, annotation_type, features));
        Ok(id)
    }

    /// Add an annotation under an explicit id.
    ///
    /// Returns `Ok(None)` without touching the set when `id` is already taken.
    pub fn add_with_id(
        &mut self,
        id: AnnotationId,
        start: usize,
        end: usize,
        annotation_type: &str,
        features: FeatureMap,
    ) -> AnnotationResult<Option<AnnotationId>> {
        if self.annotations.contains_key(&id) {
            return Ok(None);
        }
        let span = self.check_span(start, end)?;
        self.insert(Annotation::new(id, span, annotation_type, features));
        Ok(Some(id))
    }

    /// Remove an annotation, returning it.
    pub fn remove(&mut self, id: AnnotationId) -> AnnotationResult<Annotation> {
        let stored = self
            .annotations
            .remove(&id)
            .ok_or_else(|| self.not_found(id))?;
        let span = stored.annotation.span;

        self.by_start.remove(span.start, id);
        self.by_end.remove(span.end, id);
        if let Some(index) = self.by_type.get_mut() {
            let key = OrderKey {
                start: span.start,
                seq: stored.seq,
                id,
            };
            let annotation_type = stored.annotation.annotation_type();
            if let Some(bucket) = index.get_mut(annotation_type) {
                if let Ok(pos) = bucket.binary_search(&key) {
                    bucket.remove(pos);
                }
                if bucket.is_empty() {
                    index.remove(annotation_type);
                }
            }
        }

        Ok(stored.annotation)
    }

    fn check_span(&self, start: usize, end: usize) -> AnnotationResult<Span> {
        match (i64::try_from(start), i64::try_from(end)) {
            (Ok(start), Ok(end)) => Span::checked(start, end, self.doc_len),
            _ => Err(AnnotationError::InvalidOffset {
                start: i64::try_from(start).unwrap_or(i64::MAX),
                end: i64::try_from(end).unwrap_or(i64::MAX),
                len: self.doc_len,
                reason: "offset is past any document end",
            }),
        }
    }

    fn not_found(&self, id: AnnotationId) -> AnnotationError {
        AnnotationError::NotFound {
            set: self.name.clone(),
            id,
        }
    }

    /// Index an already validated annotation whose id is free.
    fn insert(&mut self, annotation: Annotation) {
        let id = annotation.id;
        let span = annotation.span;
        let seq = self.next_seq;
        self.next_seq += 1;

        self.by_start.insert(
            span.start,
            Entry {
                id,
                partner: span.end,
            },
        );
        self.by_end.insert(
            span.end,
            Entry {
                id,
                partner: span.start,
            },
        );
        if let Some(index) = self.by_type.get_mut() {
            let key = OrderKey {
                start: span.start,
                seq,
                id,
            };
            let bucket = index.entry(annotation.annotation_type.clone()).or_default();
            let pos = bucket.partition_point(|existing| *existing < key);
            bucket.insert(pos, key);
        }

        self.annotations.insert(id, Stored { annotation, seq });
    }

    /// Mutable access for feature edits; span and type stay fixed so the
    /// indexes never go stale.
    pub(crate) fn annotation_mut(
        &mut self,
        id: AnnotationId,
    ) -> AnnotationResult<(&str, &mut Annotation)> {
        let name = &self.name;
        match self.annotations.get_mut(&id) {
            Some(stored) => Ok((name.as_str(), &mut stored.annotation)),
            None => Err(AnnotationError::NotFound {
                set: name.clone(),
                id,
            }),
        }
    }

    // ------------------------------------------------------------------
    // Lookup
    // ------------------------------------------------------------------

    /// Direct lookup by id.
    pub fn by_id(&self, id: AnnotationId) -> AnnotationResult<&Annotation> {
        self.get(id).ok_or_else(|| self.not_found(id))
    }

    pub fn get(&self, id: AnnotationId) -> Option<&Annotation> {
        self.annotations.get(&id).map(|stored| &stored.annotation)
    }

    pub fn contains(&self, id: AnnotationId) -> bool {
        self.annotations.contains_key(&id)
    }

    /// All annotations in document order.
    pub fn iter(&self) -> impl Iterator<Item = &Annotation> + '_ {
        self.by_start
            .iter()
            .flat_map(|(_, entries)| entries.iter())
            .map(move |entry| self.resolve(entry.id))
    }

    /// The earliest annotation in document order.
    pub fn first(&self) -> Option<&Annotation> {
        let (_, entries) = self.by_start.first()?;
        entries.first().map(|entry| self.resolve(entry.id))
    }

    /// The latest annotation in document order.
    pub fn last(&self) -> Option<&Annotation> {
        let (_, entries) = self.by_start.last()?;
        entries.last().map(|entry| self.resolve(entry.id))
    }

    /// Distinct annotation types, sorted.
    pub fn types(&self) -> BTreeSet<&str> {
        self.annotations
            .values()
            .map(|stored| stored.annotation.annotation_type())
            .collect()
    }

    fn resolve(&self, id: AnnotationId) -> &Annotation {
        // Both trees are kept in lockstep with the id index.
        &self.annotations[&id].annotation
    }

    fn resolve_all(&self, ids: Vec<AnnotationId>) -> Vec<&Annotation> {
        ids.into_iter().map(|id| self.resolve(id)).collect()
    }

    fn order_key(&self, id: AnnotationId) -> OrderKey {
        let stored = &self.annotations[&id];
        OrderKey {
            start: stored.annotation.span.start,
            seq: stored.seq,
            id,
        }
    }

    // ------------------------------------------------------------------
    // Positional queries
    // ------------------------------------------------------------------

    /// Annotations starting exactly at `offset`.
    pub fn at(&self, offset: usize) -> Vec<&Annotation> {
        self.by_start
            .get(offset)
            .iter()
            .map(|entry| self.resolve(entry.id))
            .collect()
    }

    /// Annotations at the smallest start offset `>= offset`.
    pub fn first_after(&self, offset: usize) -> Vec<&Annotation> {
        match self.by_start.first_at_or_after(offset) {
            Some((_, entries)) => entries.iter().map(|entry| self.resolve(entry.id)).collect(),
            None => Vec::new(),
        }
    }

    /// Annotations ending exactly at `offset`, in document order.
    pub fn ending_at(&self, offset: usize) -> Vec<&Annotation> {
        let ids = self.by_end.get(offset).iter().map(|entry| entry.id).collect();
        self.in_document_order(ids)
    }

    /// Annotations intersecting `[left, right)`: `start < right && end > left`.
    pub fn overlapping(&self, left: usize, right: usize) -> Vec<&Annotation> {
        let query = RangeQuery::keys((Bound::Unbounded, Bound::Excluded(right)))
            .with_partners((Bound::Excluded(left), Bound::Unbounded));
        self.resolve_all(self.by_start.query(&query))
    }

    /// Annotations containing all of `[left, right)`: `start <= left && end >= right`.
    pub fn covering(&self, left: usize, right: usize) -> Vec<&Annotation> {
        let query = RangeQuery::keys((Bound::Included(right), Bound::Unbounded))
            .with_partners((Bound::Unbounded, Bound::Included(left)));
        let ids = self.by_end.query(&query);
        self.in_document_order(ids)
    }

    /// Annotations lying inside `[left, right]`: `left <= start && end <= right`.
    pub fn within(&self, left: usize, right: usize) -> Vec<&Annotation> {
        if left > right {
            return Vec::new();
        }
        let query = RangeQuery::keys((Bound::Included(left), Bound::Included(right)))
            .with_partners((Bound::Unbounded, Bound::Included(right)));
        self.resolve_all(self.by_start.query(&query))
    }

    /// Annotations starting strictly before `offset`.
    pub fn before(&self, offset: usize) -> Vec<&Annotation> {
        let query = RangeQuery::keys((Bound::Unbounded, Bound::Excluded(offset)));
        self.resolve_all(self.by_start.query(&query))
    }

    /// Annotations starting at or after `offset`.
    pub fn after(&self, offset: usize) -> Vec<&Annotation> {
        let query = RangeQuery::keys((Bound::Included(offset), Bound::Unbounded));
        self.resolve_all(self.by_start.query(&query))
    }

    /// Annotations of one type, in document order.
    ///
    /// The type index is built on the first call and kept up to date by later
    /// inserts and removals.
    pub fn by_type(&self, annotation_type: &str) -> Vec<&Annotation> {
        let index = self.by_type.get_or_init(|| self.build_type_index());
        match index.get(annotation_type) {
            Some(bucket) => bucket.iter().map(|key| self.resolve(key.id)).collect(),
            None => Vec::new(),
        }
    }

    fn build_type_index(&self) -> HashMap<String, Vec<OrderKey>> {
        log::trace!("building type index for set {:?}", self.name);
        let mut index: HashMap<String, Vec<OrderKey>> = HashMap::new();
        for (_, entries) in self.by_start.iter() {
            for entry in entries {
                let annotation = self.resolve(entry.id);
                index
                    .entry(annotation.annotation_type.clone())
                    .or_default()
                    .push(self.order_key(entry.id));
            }
        }
        index
    }

    fn in_document_order(&self, ids: Vec<AnnotationId>) -> Vec<&Annotation> {
        let mut keys: Vec<OrderKey> = ids.into_iter().map(|id| self.order_key(id)).collect();
        keys.sort_unstable();
        keys.into_iter().map(|key| self.resolve(key.id)).collect()
    }

    // ------------------------------------------------------------------
    // Set algebra
    // ------------------------------------------------------------------

    /// A detached set holding only the annotations whose ids are given.
    ///
    /// Unknown ids are skipped.
    pub fn restrict<I>(&self, ids: I) -> AnnotationSet
    where
        I: IntoIterator<Item = AnnotationId>,
    {
        let wanted: BTreeSet<AnnotationId> = ids.into_iter().collect();
        let picked = self
            .iter()
            .filter(|annotation| wanted.contains(&annotation.id))
            .collect();
        self.detached(picked)
    }

    /// Annotations present in either set. Ids in both resolve to `self`'s copy.
    pub fn union(&self, other: &AnnotationSet) -> AnnotationSet {
        let mut picked: Vec<&Annotation> = self.iter().collect();
        picked.extend(other.iter().filter(|annotation| !self.contains(annotation.id)));
        self.detached(picked)
    }

    /// Annotations whose ids are in both sets.
    pub fn intersection(&self, other: &AnnotationSet) -> AnnotationSet {
        let picked = self
            .iter()
            .filter(|annotation| other.contains(annotation.id))
            .collect();
        self.detached(picked)
    }

    /// Annotations of `self` whose ids are not in `other`.
    pub fn difference(&self, other: &AnnotationSet) -> AnnotationSet {
        let picked = self
            .iter()
            .filter(|annotation| !other.contains(annotation.id))
            .collect();
        self.detached(picked)
    }

    /// Annotations whose ids are in exactly one of the sets.
    pub fn symmetric_difference(&self, other: &AnnotationSet) -> AnnotationSet {
        let mut picked: Vec<&Annotation> = self
            .iter()
            .filter(|annotation| !other.contains(annotation.id))
            .collect();
        picked.extend(other.iter().filter(|annotation| !self.contains(annotation.id)));
        self.detached(picked)
    }

    /// Build a new set from already validated annotations.
    fn detached(&self, mut picked: Vec<&Annotation>) -> AnnotationSet {
        // stable: keeps self's annotations ahead of other's on equal starts
        picked.sort_by_key(|annotation| annotation.span.start);

        let mut set = AnnotationSet::new(self.name.clone(), self.doc_len);
        for annotation in picked {
            set.insert(annotation.clone());
        }
        set
    }

    #[cfg(test)]
    pub(crate) fn assert_invariants(&self) {
        self.by_start.assert_invariants();
        self.by_end.assert_invariants();
        assert_eq!(self.by_start.len(), self.annotations.len());
        assert_eq!(self.by_end.len(), self.annotations.len());
    }

    #[cfg(test)]
    pub(crate) fn tree_heights(&self) -> (usize, usize) {
        (self.by_start.height(), self.by_end.height())
    }

    /// Tree nodes entered by the last range query, per tree.
    #[cfg(test)]
    pub(crate) fn last_query_visits(&self) -> (usize, usize) {
        (self.by_start.last_query_visits(), self.by_end.last_query_visits())
    }
}

impl fmt::Debug for AnnotationSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AnnotationSet")
            .field("name", &self.name)
            .field("document_len", &self.doc_len)
            .field("annotations", &self.iter().collect::<Vec<_>>())
            .finish()
    }
}

impl<'a> IntoIterator for &'a AnnotationSet {
    type Item = &'a Annotation;
    type IntoIter = Box<dyn Iterator<Item = &'a Annotation> + 'a>;

    fn into_iter(self) -> Self::IntoIter {
        Box::new(self.iter())
    }
}
