//! Change journal.
//!
//! Every mutation a processing stage makes to a [`Document`](crate::Document)
//! is appended here as a [`JournalRecord`]. The journal is the only way the
//! host learns what changed, so records are kept in call order and are
//! serializable to the host's flat command vocabulary:
//!
//! ```json
//! {"command":"ADD_ANNOT","annotationSet":"","startOffset":0,"endOffset":2,
//!  "annotationName":"Token","annotationID":1,"featureMap":{}}
//! ```

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{AnnotationId, FeatureMap, RecordError};

/// Which feature map a feature record targets.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FeatureScope {
    Document,
    Annotation { set: String, id: AnnotationId },
}

/// One replayable mutation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(into = "WireCommand", try_from = "WireCommand")]
pub enum JournalRecord {
    AddAnnotation {
        set: String,
        id: AnnotationId,
        start: usize,
        end: usize,
        annotation_type: String,
        features: FeatureMap,
    },
    RemoveAnnotation {
        set: String,
        id: AnnotationId,
    },
    SetFeature {
        scope: FeatureScope,
        key: String,
        value: Value,
    },
    RemoveFeature {
        scope: FeatureScope,
        key: String,
    },
    ClearFeatures {
        scope: FeatureScope,
    },
}

impl JournalRecord {
    /// The wire command name of this record.
    pub fn command(&self) -> CommandName {
        match self {
            JournalRecord::AddAnnotation { .. } => CommandName::AddAnnot,
            JournalRecord::RemoveAnnotation { .. } => CommandName::RemoveAnnot,
            JournalRecord::SetFeature { .. } => CommandName::UpdateFeature,
            JournalRecord::RemoveFeature { .. } => CommandName::RemoveFeature,
            JournalRecord::ClearFeatures { .. } => CommandName::ClearFeatures,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CommandName {
    AddAnnot,
    RemoveAnnot,
    UpdateFeature,
    RemoveFeature,
    ClearFeatures,
}

impl CommandName {
    pub fn as_str(&self) -> &'static str {
        match self {
            CommandName::AddAnnot => "ADD_ANNOT",
            CommandName::RemoveAnnot => "REMOVE_ANNOT",
            CommandName::UpdateFeature => "UPDATE_FEATURE",
            CommandName::RemoveFeature => "REMOVE_FEATURE",
            CommandName::ClearFeatures => "CLEAR_FEATURES",
        }
    }
}

/// Flat wire shape shared by every command. Field order is the host's.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireCommand {
    command: CommandName,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    annotation_set: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    start_offset: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    end_offset: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    annotation_name: Option<String>,
    #[serde(rename = "annotationID", default, skip_serializing_if = "Option::is_none")]
    annotation_id: Option<AnnotationId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    feature_map: Option<FeatureMap>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    feature_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    feature_value: Option<Value>,
}

impl WireCommand {
    fn new(command: CommandName) -> Self {
        Self {
            command,
            annotation_set: None,
            start_offset: None,
            end_offset: None,
            annotation_name: None,
            annotation_id: None,
            feature_map: None,
            feature_name: None,
            feature_value: None,
        }
    }

    fn scoped(command: CommandName, scope: FeatureScope) -> Self {
        let mut wire = Self::new(command);
        if let FeatureScope::Annotation { set, id } = scope {
            wire.annotation_set = Some(set);
            wire.annotation_id = Some(id);
        }
        wire
    }

    fn scope(&mut self) -> Result<FeatureScope, RecordError> {
        match (self.annotation_set.take(), self.annotation_id.take()) {
            (None, None) => Ok(FeatureScope::Document),
            (Some(set), Some(id)) => Ok(FeatureScope::Annotation { set, id }),
            (Some(_), None) => Err(self.missing("annotationID")),
            (None, Some(_)) => Err(self.missing("annotationSet")),
        }
    }

    fn missing(&self, field: &'static str) -> RecordError {
        RecordError::MissingField {
            command: self.command.as_str(),
            field,
        }
    }

    fn require<T>(&self, value: Option<T>, field: &'static str) -> Result<T, RecordError> {
        value.ok_or_else(|| self.missing(field))
    }
}

impl From<JournalRecord> for WireCommand {
    fn from(record: JournalRecord) -> Self {
        let command = record.command();
        match record {
            JournalRecord::AddAnnotation {
                set,
                id,
                start,
                end,
                annotation_type,
                features,
            } => WireCommand {
                annotation_set: Some(set),
                start_offset: Some(start),
                end_offset: Some(end),
                annotation_name: Some(annotation_type),
                annotation_id: Some(id),
                feature_map: Some(features),
                ..WireCommand::new(command)
            },
            JournalRecord::RemoveAnnotation { set, id } => WireCommand {
                annotation_set: Some(set),
                annotation_id: Some(id),
                ..WireCommand::new(command)
            },
            JournalRecord::SetFeature { scope, key, value } => WireCommand {
                feature_name: Some(key),
                feature_value: Some(value),
                ..WireCommand::scoped(command, scope)
            },
            JournalRecord::RemoveFeature { scope, key } => WireCommand {
                feature_name: Some(key),
                ..WireCommand::scoped(command, scope)
            },
            JournalRecord::ClearFeatures { scope } => WireCommand::scoped(command, scope),
        }
    }
}

impl TryFrom<WireCommand> for JournalRecord {
    type Error = RecordError;

    fn try_from(mut wire: WireCommand) -> Result<Self, Self::Error> {
        Ok(match wire.command {
            CommandName::AddAnnot => JournalRecord::AddAnnotation {
                set: wire.require(wire.annotation_set.clone(), "annotationSet")?,
                id: wire.require(wire.annotation_id, "annotationID")?,
                start: wire.require(wire.start_offset, "startOffset")?,
                end: wire.require(wire.end_offset, "endOffset")?,
                annotation_type: wire.require(wire.annotation_name.clone(), "annotationName")?,
                features: wire.feature_map.take().unwrap_or_default(),
            },
            CommandName::RemoveAnnot => JournalRecord::RemoveAnnotation {
                set: wire.require(wire.annotation_set.clone(), "annotationSet")?,
                id: wire.require(wire.annotation_id, "annotationID")?,
            },
            CommandName::UpdateFeature => {
                let key = wire.require(wire.feature_name.clone(), "featureName")?;
                // A JSON null value deserializes as an absent field.
                let value = wire.feature_value.take().unwrap_or(Value::Null);
                JournalRecord::SetFeature {
                    scope: wire.scope()?,
                    key,
                    value,
                }
            }
            CommandName::RemoveFeature => {
                let key = wire.require(wire.feature_name.clone(), "featureName")?;
                JournalRecord::RemoveFeature {
                    scope: wire.scope()?,
                    key,
                }
            }
            CommandName::ClearFeatures => JournalRecord::ClearFeatures {
                scope: wire.scope()?,
            },
        })
    }
}

/// Ordered mutation records for one document's processing pass.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Journal {
    records: Vec<JournalRecord>,
}

impl Journal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, record: JournalRecord) {
        log::trace!("journal {}", record.command().as_str());
        self.records.push(record);
    }

    pub fn records(&self) -> &[JournalRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Flush: hand over every record and leave the journal empty.
    pub fn take(&mut self) -> Vec<JournalRecord> {
        std::mem::take(&mut self.records)
    }

    /// Encode the records as one JSON array, the shape of a response frame.
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(&self.records)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn encode(record: JournalRecord) -> String {
        serde_json::to_string(&record).unwrap()
    }

    #[test]
    fn test_add_annotation_wire_shape() {
        let record = JournalRecord::AddAnnotation {
            set: String::new(),
            id: 1,
            start: 0,
            end: 2,
            annotation_type: "Token".to_string(),
            features: FeatureMap::new(),
        };
        insta::assert_snapshot!(encode(record), @r###"{"command":"ADD_ANNOT","annotationSet":"","startOffset":0,"endOffset":2,"annotationName":"Token","annotationID":1,"featureMap":{}}"###);
    }

    #[test]
    fn test_feature_records_wire_shape() {
        let on_annotation = FeatureScope::Annotation {
            set: "ents".to_string(),
            id: 7,
        };
        insta::assert_snapshot!(encode(JournalRecord::SetFeature {
            scope: on_annotation.clone(),
            key: "kind".to_string(),
            value: json!("person"),
        }), @r###"{"command":"UPDATE_FEATURE","annotationSet":"ents","annotationID":7,"featureName":"kind","featureValue":"person"}"###);
        insta::assert_snapshot!(encode(JournalRecord::RemoveFeature {
            scope: FeatureScope::Document,
            key: "lang".to_string(),
        }), @r###"{"command":"REMOVE_FEATURE","featureName":"lang"}"###);
        insta::assert_snapshot!(encode(JournalRecord::ClearFeatures {
            scope: on_annotation,
        }), @r###"{"command":"CLEAR_FEATURES","annotationSet":"ents","annotationID":7}"###);
        insta::assert_snapshot!(encode(JournalRecord::RemoveAnnotation {
            set: "ents".to_string(),
            id: 7,
        }), @r###"{"command":"REMOVE_ANNOT","annotationSet":"ents","annotationID":7}"###);
    }

    #[test]
    fn test_records_decode_from_wire() {
        let records: Vec<JournalRecord> = serde_json::from_str(
            r#"[
                {"command":"UPDATE_FEATURE","featureName":"k","featureValue":null},
                {"command":"CLEAR_FEATURES","annotationSet":"","annotationID":3},
                {"command":"ADD_ANNOT","annotationSet":"a","startOffset":1,"endOffset":4,"annotationName":"T","annotationID":2}
            ]"#,
        )
        .unwrap();

        assert_eq!(
            records,
            vec![
                JournalRecord::SetFeature {
                    scope: FeatureScope::Document,
                    key: "k".to_string(),
                    value: Value::Null,
                },
                JournalRecord::ClearFeatures {
                    scope: FeatureScope::Annotation {
                        set: String::new(),
                        id: 3
                    },
                },
                JournalRecord::AddAnnotation {
                    set: "a".to_string(),
                    id: 2,
                    start: 1,
                    end: 4,
                    annotation_type: "T".to_string(),
                    features: FeatureMap::new(),
                },
            ]
        );
    }

    #[test]
    fn test_decode_rejects_half_scoped_feature_record() {
        let err = serde_json::from_str::<JournalRecord>(
            r#"{"command":"REMOVE_FEATURE","annotationSet":"x","featureName":"k"}"#,
        )
        .unwrap_err();
        assert!(
            err.to_string().contains("REMOVE_FEATURE record is missing annotationID"),
            "{}",
            err
        );
    }

    #[test]
    fn test_take_resets() {
        let mut journal = Journal::new();
        journal.push(JournalRecord::ClearFeatures {
            scope: FeatureScope::Document,
        });
        assert_eq!(journal.to_json().unwrap(), r#"[{"command":"CLEAR_FEATURES"}]"#);
        assert_eq!(journal.take().len(), 1);
        assert!(journal.is_empty());
        assert_eq!(journal.to_json().unwrap(), "[]");
    }
}
