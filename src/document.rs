//! Documents: write-once text, named annotation sets and journaled features.
//!
//! A [`Document`] is the in-memory model of one host document for the length
//! of one processing pass. Reads go straight to the underlying stores; every
//! write goes through a journaling handle ([`AnnotationSetMut`],
//! [`AnnotationMut`], or the document's own feature methods) so the host can
//! replay it.

use std::collections::BTreeMap;
use std::ops::Deref;

use serde_json::Value;

use crate::{
    Annotation, AnnotationError, AnnotationId, AnnotationResult, AnnotationSet, DocumentError,
    DocumentResult, FeatureMap, FeatureScope, Journal, JournalRecord, SourcedString,
};

/// Name of the default annotation set.
pub const DEFAULT_SET: &str = "";

#[derive(Debug, Clone)]
pub struct Document {
    text: String,
    /// Length of `text` in chars
    len: usize,
    /// Mapping back to the host's text, kept only when it is not the identity
    provenance: Option<SourcedString>,
    features: FeatureMap,
    sets: BTreeMap<String, AnnotationSet>,
    journal: Journal,
    source: Option<String>,
}

impl Document {
    pub fn new(text: impl Into<String>) -> Self {
        Self::from_sourced(SourcedString::new(text))
    }

    /// Build over transformed text, keeping its mapping to host offsets.
    pub fn from_sourced(text: SourcedString) -> Self {
        let provenance = if text.is_identity() { None } else { Some(text.clone()) };
        Self {
            len: text.len(),
            text: text.as_str().to_string(),
            provenance,
            features: FeatureMap::new(),
            sets: BTreeMap::new(),
            journal: Journal::new(),
            source: None,
        }
    }

    pub fn builder(text: impl Into<String>) -> DocumentBuilder {
        DocumentBuilder::new(Self::new(text))
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    /// Length in chars; the upper bound for every annotation offset.
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Opaque identifier of where the host loaded this document from.
    pub fn source(&self) -> Option<&str> {
        self.source.as_deref()
    }

    /// Always fails: document text is fixed once created.
    pub fn set_text(&mut self, _text: impl Into<String>) -> DocumentResult<()> {
        Err(DocumentError::ReadOnlyText)
    }

    pub fn provenance(&self) -> Option<&SourcedString> {
        self.provenance.as_ref()
    }

    /// Translate a document offset to the host's offset for the same position.
    pub fn to_host_offset(&self, offset: usize) -> Option<usize> {
        match &self.provenance {
            Some(provenance) => provenance.to_source_offset(offset),
            None => (offset <= self.len).then_some(offset),
        }
    }

    /// Translate a host offset to a document offset.
    pub fn from_host_offset(&self, host_offset: usize) -> Option<usize> {
        match &self.provenance {
            Some(provenance) => provenance.from_source_offset(host_offset),
            None => (host_offset <= self.len).then_some(host_offset),
        }
    }

    // ------------------------------------------------------------------
    // Annotation sets
    // ------------------------------------------------------------------

    /// Journaling handle on the named set, created empty on first use.
    pub fn annotations(&mut self, name: &str) -> AnnotationSetMut<'_> {
        let len = self.len;
        let set = self
            .sets
            .entry(name.to_string())
            .or_insert_with(|| AnnotationSet::new(name, len));
        AnnotationSetMut {
            set,
            journal: &mut self.journal,
        }
    }

    /// Read-only access to a set that has already been referenced.
    pub fn annotation_set(&self, name: &str) -> Option<&AnnotationSet> {
        self.sets.get(name)
    }

    pub fn set_names(&self) -> impl Iterator<Item = &str> + '_ {
        self.sets.keys().map(String::as_str)
    }

    // ------------------------------------------------------------------
    // Document features
    // ------------------------------------------------------------------

    pub fn features(&self) -> &FeatureMap {
        &self.features
    }

    pub fn feature(&self, key: &str) -> Option<&Value> {
        self.features.get(key)
    }

    /// Set a document feature, returning the previous value.
    pub fn set_feature(&mut self, key: impl Into<String>, value: impl Into<Value>) -> Option<Value> {
        let (key, value) = (key.into(), value.into());
        self.journal.push(JournalRecord::SetFeature {
            scope: FeatureScope::Document,
            key: key.clone(),
            value: value.clone(),
        });
        self.features.insert(key, value)
    }

    pub fn remove_feature(&mut self, key: &str) -> Option<Value> {
        self.journal.push(JournalRecord::RemoveFeature {
            scope: FeatureScope::Document,
            key: key.to_string(),
        });
        self.features.remove(key)
    }

    pub fn clear_features(&mut self) {
        self.journal.push(JournalRecord::ClearFeatures {
            scope: FeatureScope::Document,
        });
        self.features.clear();
    }

    // ------------------------------------------------------------------
    // Journal
    // ------------------------------------------------------------------

    pub fn journal(&self) -> &Journal {
        &self.journal
    }

    /// Flush the journal, leaving it empty.
    pub fn take_journal(&mut self) -> Vec<JournalRecord> {
        self.journal.take()
    }

    /// Apply records the way the host applies a response, without journaling.
    pub fn replay<I>(&mut self, records: I) -> DocumentResult<()>
    where
        I: IntoIterator<Item = JournalRecord>,
    {
        for record in records {
            match record {
                JournalRecord::AddAnnotation {
                    set,
                    id,
                    start,
                    end,
                    annotation_type,
                    features,
                } => {
                    let added = self
                        .set_entry(&set)
                        .add_with_id(id, start, end, &annotation_type, features)?;
                    if added.is_none() {
                        log::warn!("replay skipped annotation {} already present in set {:?}", id, set);
                    }
                }
                JournalRecord::RemoveAnnotation { set, id } => {
                    self.set_entry(&set).remove(id)?;
                }
                JournalRecord::SetFeature { scope, key, value } => {
                    self.features_in(&scope)?.insert(key, value);
                }
                JournalRecord::RemoveFeature { scope, key } => {
                    self.features_in(&scope)?.remove(&key);
                }
                JournalRecord::ClearFeatures { scope } => {
                    self.features_in(&scope)?.clear();
                }
            }
        }
        Ok(())
    }

    fn set_entry(&mut self, name: &str) -> &mut AnnotationSet {
        let len = self.len;
        self.sets
            .entry(name.to_string())
            .or_insert_with(|| AnnotationSet::new(name, len))
    }

    fn features_in(&mut self, scope: &FeatureScope) -> AnnotationResult<&mut FeatureMap> {
        match scope {
            FeatureScope::Document => Ok(&mut self.features),
            FeatureScope::Annotation { set, id } => {
                let not_found = || AnnotationError::NotFound {
                    set: set.clone(),
                    id: *id,
                };
                let store = self.sets.get_mut(set).ok_or_else(not_found)?;
                let (_, annotation) = store.annotation_mut(*id)?;
                Ok(&mut annotation.features)
            }
        }
    }
}

/// Loads host-supplied state into a [`Document`] without journaling it.
#[derive(Debug)]
pub struct DocumentBuilder {
    document: Document,
}

impl DocumentBuilder {
    pub fn new(document: Document) -> Self {
        Self { document }
    }

    pub fn sourced(text: SourcedString) -> Self {
        Self::new(Document::from_sourced(text))
    }

    pub fn source(mut self, source: impl Into<String>) -> Self {
        self.document.source = Some(source.into());
        self
    }

    pub fn features(mut self, features: FeatureMap) -> Self {
        self.document.features = features;
        self
    }

    /// Length in chars of the text being loaded.
    pub fn len(&self) -> usize {
        self.document.len
    }

    pub fn is_empty(&self) -> bool {
        self.document.is_empty()
    }

    pub fn document(&self) -> &Document {
        &self.document
    }

    /// Load one annotation. `None` for `id` assigns the next free id.
    ///
    /// Returns `Ok(None)` when the id is already taken in the set.
    pub fn annotation(
        &mut self,
        set: &str,
        id: Option<AnnotationId>,
        start: usize,
        end: usize,
        annotation_type: &str,
        features: FeatureMap,
    ) -> AnnotationResult<Option<AnnotationId>> {
        let store = self.document.set_entry(set);
        match id {
            Some(id) => store.add_with_id(id, start, end, annotation_type, features),
            None => store.add(start, end, annotation_type, features).map(Some),
        }
    }

    pub fn build(self) -> Document {
        self.document
    }
}

/// Journaling write handle on one annotation set.
///
/// Dereferences to the [`AnnotationSet`] for queries.
pub struct AnnotationSetMut<'a> {
    set: &'a mut AnnotationSet,
    journal: &'a mut Journal,
}

impl<'a> AnnotationSetMut<'a> {
    /// Add an annotation with the next free id.
    pub fn add(
        &mut self,
        start: usize,
        end: usize,
        annotation_type: &str,
        features: FeatureMap,
    ) -> AnnotationResult<AnnotationId> {
        let id = self.set.add(start, end, annotation_type, features.clone())?;
        self.journal_add(id, start, end, annotation_type, features);
        Ok(id)
    }

    /// Add an annotation under `id`; `Ok(None)` if the id is taken.
    pub fn add_with_id(
        &mut self,
        id: AnnotationId,
        start: usize,
        end: usize,
        annotation_type: &str,
        features: FeatureMap,
    ) -> AnnotationResult<Option<AnnotationId>> {
        let added = self
            .set
            .add_with_id(id, start, end, annotation_type, features.clone())?;
        if added.is_some() {
            self.journal_add(id, start, end, annotation_type, features);
        }
        Ok(added)
    }

    fn journal_add(
        &mut self,
        id: AnnotationId,
        start: usize,
        end: usize,
        annotation_type: &str,
        features: FeatureMap,
    ) {
        self.journal.push(JournalRecord::AddAnnotation {
            set: self.set.name().to_string(),
            id,
            start,
            end,
            annotation_type: annotation_type.to_string(),
            features,
        });
    }

    pub fn remove(&mut self, id: AnnotationId) -> AnnotationResult<Annotation> {
        let removed = self.set.remove(id)?;
        self.journal.push(JournalRecord::RemoveAnnotation {
            set: self.set.name().to_string(),
            id,
        });
        Ok(removed)
    }

    /// Remove every annotation, in document order. Returns how many were removed.
    pub fn clear(&mut self) -> AnnotationResult<usize> {
        let ids: Vec<AnnotationId> = self.set.iter().map(Annotation::id).collect();
        for &id in &ids {
            self.remove(id)?;
        }
        Ok(ids.len())
    }

    /// Journaling handle for editing one annotation's features.
    pub fn annotation_mut(&mut self, id: AnnotationId) -> AnnotationResult<AnnotationMut<'_>> {
        let (set, annotation) = self.set.annotation_mut(id)?;
        Ok(AnnotationMut {
            set,
            annotation,
            journal: &mut *self.journal,
        })
    }
}

impl<'a> Deref for AnnotationSetMut<'a> {
    type Target = AnnotationSet;

    fn deref(&self) -> &AnnotationSet {
        &*self.set
    }
}

/// Journaling feature editor for one annotation.
pub struct AnnotationMut<'a> {
    set: &'a str,
    annotation: &'a mut Annotation,
    journal: &'a mut Journal,
}

impl<'a> AnnotationMut<'a> {
    fn scope(&self) -> FeatureScope {
        FeatureScope::Annotation {
            set: self.set.to_string(),
            id: self.annotation.id,
        }
    }

    pub fn set_feature(&mut self, key: impl Into<String>, value: impl Into<Value>) -> Option<Value> {
        let (key, value) = (key.into(), value.into());
        self.journal.push(JournalRecord::SetFeature {
            scope: self.scope(),
            key: key.clone(),
            value: value.clone(),
        });
        self.annotation.features.insert(key, value)
    }

    pub fn remove_feature(&mut self, key: &str) -> Option<Value> {
        self.journal.push(JournalRecord::RemoveFeature {
            scope: self.scope(),
            key: key.to_string(),
        });
        self.annotation.features.remove(key)
    }

    pub fn clear_features(&mut self) {
        self.journal.push(JournalRecord::ClearFeatures { scope: self.scope() });
        self.annotation.features.clear();
    }
}

impl<'a> Deref for AnnotationMut<'a> {
    type Target = Annotation;

    fn deref(&self) -> &Annotation {
        &*self.annotation
    }
}
