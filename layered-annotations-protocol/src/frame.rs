//! Inbound frame types.

use std::collections::BTreeMap;

use layered_annotations::{AnnotationId, FeatureMap};
use serde::{Deserialize, Deserializer};
use serde_json::{Map, Value};

use crate::FrameKind;

/// One decoded inbound line.
#[derive(Debug, Clone, PartialEq)]
pub enum Frame {
    Begin {
        parameters: Map<String, Value>,
        corpus: Corpus,
    },
    End,
    Abort,
    Document(DocumentFrame),
    /// A control frame whose command this runtime does not know.
    Unrecognized { command: String },
}

impl Frame {
    /// The state machine input for this frame, if it drives one.
    pub fn kind(&self) -> Option<FrameKind> {
        match self {
            Frame::Begin { .. } => Some(FrameKind::Begin),
            Frame::End => Some(FrameKind::End),
            Frame::Abort => Some(FrameKind::Abort),
            Frame::Document(_) => Some(FrameKind::Document),
            Frame::Unrecognized { .. } => None,
        }
    }
}

/// The corpus a run of documents belongs to, as announced by BEGIN_EXECUTION.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Corpus {
    pub name: Option<String>,
    pub features: FeatureMap,
}

/// `{"command": ..., "corpusName": ..., "corpusFeatures": {...}, "parameterMap": {...}}`
///
/// Hosts serialize unset fields as `null`, so every map field accepts it.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct ControlFrame {
    pub command: String,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub parameter_map: Map<String, Value>,
    #[serde(default)]
    pub corpus_name: Option<String>,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub corpus_features: FeatureMap,
}

fn null_as_empty<'de, D>(deserializer: D) -> Result<Map<String, Value>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<Map<String, Value>>::deserialize(deserializer)?.unwrap_or_default())
}

/// `{"text": ..., "documentFeatures": {...}, "entities": {"set:Type": [...]}}`
///
/// Keys the host adds for its own bookkeeping are ignored.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentFrame {
    pub text: String,
    #[serde(default)]
    pub document_features: FeatureMap,
    #[serde(default)]
    pub entities: BTreeMap<String, Vec<EntityRecord>>,
    /// Where the host loaded the document from, when it says.
    #[serde(default)]
    pub src: Option<String>,
}

/// One annotation as the host sends it: offsets, an optional id, and every
/// other key as a feature.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct EntityRecord {
    pub indices: [i64; 2],
    #[serde(rename = "annotationID", default)]
    pub annotation_id: Option<AnnotationId>,
    #[serde(flatten)]
    pub features: FeatureMap,
}
