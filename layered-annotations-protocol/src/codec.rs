//! Line codec: inbound frames to [`Document`]s, journals to response lines.

use layered_annotations::{
    unescape_entities, AnnotationError, Document, DocumentBuilder, JournalRecord, Span,
};
use serde_json::Value;

use crate::frame::ControlFrame;
use crate::{Corpus, DocumentFrame, Frame, ProtocolError, ProtocolResult, SessionConfig};

/// The response for a document whose changes were discarded.
pub const EMPTY_RESPONSE: &str = "[]";

/// Decode one trimmed, non-blank line.
pub fn decode_frame(line: &str) -> ProtocolResult<Frame> {
    let value: Value = serde_json::from_str(line).map_err(ProtocolError::decode)?;

    if value.get("command").is_some() {
        let control: ControlFrame =
            serde_json::from_value(value).map_err(|err| ProtocolError::Control {
                message: err.to_string(),
            })?;
        return Ok(match control.command.as_str() {
            "BEGIN_EXECUTION" => Frame::Begin {
                parameters: control.parameter_map,
                corpus: Corpus {
                    name: control.corpus_name,
                    features: control.corpus_features,
                },
            },
            "END_EXECUTION" => Frame::End,
            "ABORT_EXECUTION" => Frame::Abort,
            _ => Frame::Unrecognized {
                command: control.command,
            },
        });
    }

    serde_json::from_value(value)
        .map(Frame::Document)
        .map_err(ProtocolError::decode)
}

/// Build the stage's view of a document frame.
///
/// Host-supplied state is loaded without journaling. With
/// [`SessionConfig::unescape_entities`] the text is decoded first and
/// incoming offsets are translated into the decoded text.
pub fn decode_document(frame: DocumentFrame, config: &SessionConfig) -> ProtocolResult<Document> {
    let builder = if config.unescape_entities {
        DocumentBuilder::sourced(unescape_entities(&frame.text))
    } else {
        Document::builder(frame.text)
    };
    let mut builder = builder.features(frame.document_features);
    if let Some(src) = frame.src {
        builder = builder.source(src);
    }

    let mut entities = Vec::new();
    for (key, instances) in frame.entities {
        let (set, annotation_type) = key.rsplit_once(':').ok_or_else(|| {
            ProtocolError::decode(format!("entity key {:?} is not of the form set:Type", key))
        })?;
        for entity in instances {
            entities.push((set.to_string(), annotation_type.to_string(), entity));
        }
    }

    // Host ids are placed first so an assigned id can never take one of them.
    let (explicit, assigned): (Vec<_>, Vec<_>) = entities
        .into_iter()
        .partition(|(_, _, entity)| entity.annotation_id.is_some());

    for (set, annotation_type, entity) in explicit.into_iter().chain(assigned) {
        let [start, end] = entity.indices;
        let span = document_span(builder.document(), start, end)?;
        let added = builder.annotation(
            &set,
            entity.annotation_id,
            span.start,
            span.end,
            &annotation_type,
            entity.features,
        )?;
        if added.is_none() {
            log::warn!(
                "skipping {} annotation with duplicate id {:?} in set {:?}",
                annotation_type,
                entity.annotation_id,
                set
            );
        }
    }

    Ok(builder.build())
}

/// Validate host offsets and translate them into document offsets.
fn document_span(document: &Document, start: i64, end: i64) -> Result<Span, AnnotationError> {
    if document.provenance().is_none() || start < 0 || end < 0 {
        return Span::checked(start, end, document.len());
    }

    let translate = |offset: i64| {
        usize::try_from(offset)
            .ok()
            .and_then(|offset| document.from_host_offset(offset))
    };
    match (translate(start), translate(end)) {
        (Some(start), Some(end)) => Span::checked(start as i64, end as i64, document.len()),
        _ => Err(AnnotationError::InvalidOffset {
            start,
            end,
            len: document.len(),
            reason: "offset does not map into the document",
        }),
    }
}

/// Encode a flushed journal as one response line, in host coordinates.
pub fn encode_response(records: Vec<JournalRecord>, document: &Document) -> ProtocolResult<String> {
    let records: Vec<JournalRecord> = if document.provenance().is_some() {
        records
            .into_iter()
            .map(|record| to_host_coordinates(record, document))
            .collect()
    } else {
        records
    };

    serde_json::to_string(&records).map_err(ProtocolError::Encode)
}

fn to_host_coordinates(record: JournalRecord, document: &Document) -> JournalRecord {
    match record {
        JournalRecord::AddAnnotation {
            set,
            id,
            start,
            end,
            annotation_type,
            features,
        } => JournalRecord::AddAnnotation {
            set,
            id,
            start: document.to_host_offset(start).unwrap_or(start),
            end: document.to_host_offset(end).unwrap_or(end),
            annotation_type,
            features,
        },
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use layered_annotations::{Annotation, FeatureMap};
    use serde_json::{json, Map};

    fn document_frame(line: &str) -> DocumentFrame {
        match decode_frame(line).unwrap() {
            Frame::Document(frame) => frame,
            other => panic!("expected a document frame, got {:?}", other),
        }
    }

    #[test]
    fn test_decode_control_frames() {
        assert_eq!(decode_frame(r#"{"command":"END_EXECUTION"}"#).unwrap(), Frame::End);
        assert_eq!(decode_frame(r#"{"command":"ABORT_EXECUTION"}"#).unwrap(), Frame::Abort);

        let begin = decode_frame(r#"{"command":"BEGIN_EXECUTION","parameterMap":{"outputAS":"out"}}"#)
            .unwrap();
        match begin {
            Frame::Begin { parameters, corpus } => {
                assert_eq!(parameters["outputAS"], json!("out"));
                assert_eq!(corpus, Corpus::default());
            }
            other => panic!("unexpected {:?}", other),
        }

        assert_eq!(
            decode_frame(r#"{"command":"PAUSE"}"#).unwrap(),
            Frame::Unrecognized {
                command: "PAUSE".to_string()
            }
        );
    }

    #[test]
    fn test_decode_begin_with_null_fields() {
        let begin = decode_frame(
            r#"{"command":"BEGIN_EXECUTION","corpusName":"news","corpusFeatures":null,"parameterMap":null}"#,
        )
        .unwrap();
        assert_eq!(
            begin,
            Frame::Begin {
                parameters: Map::new(),
                corpus: Corpus {
                    name: Some("news".to_string()),
                    features: FeatureMap::new(),
                },
            }
        );

        let begin = decode_frame(
            r#"{"command":"BEGIN_EXECUTION","corpusFeatures":{"lang":"en"},"parameterMap":{"k":1}}"#,
        )
        .unwrap();
        match begin {
            Frame::Begin { parameters, corpus } => {
                assert_eq!(parameters["k"], json!(1));
                assert_eq!(corpus.name, None);
                assert_eq!(corpus.features["lang"], json!("en"));
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_decode_rejects_malformed_lines() {
        assert!(matches!(decode_frame("{not json"), Err(ProtocolError::Decode { .. })));
        assert!(matches!(
            decode_frame(r#"{"documentFeatures":{}}"#),
            Err(ProtocolError::Decode { .. })
        ));
        assert!(matches!(
            decode_frame(r#"{"command":"BEGIN_EXECUTION","parameterMap":[1]}"#),
            Err(ProtocolError::Control { .. })
        ));
        assert!(matches!(
            decode_frame(r#"{"command":7}"#),
            Err(ProtocolError::Control { .. })
        ));
    }

    #[test]
    fn test_document_defaults_and_entities() {
        let frame = document_frame(
            r#"{"text":"Alice met Bob","inputAS":"x","entities":{
                "people:Person":[
                    {"indices":[0,5],"annotationID":4,"gender":"female"},
                    {"indices":[10,13]}
                ],
                ":Token":[{"indices":[6,9],"annotationID":1}]
            }}"#,
        );
        let doc = decode_document(frame, &SessionConfig::default()).unwrap();

        assert!(doc.features().is_empty());
        assert!(doc.journal().is_empty());
        let people: Vec<String> = doc
            .annotation_set("people")
            .unwrap()
            .iter()
            .map(Annotation::to_string)
            .collect();
        assert_eq!(
            people,
            vec![
                "<Person annotation 4 at (0, 5)>",
                "<Person annotation 5 at (10, 13)>"
            ]
        );
        let alice = doc.annotation_set("people").unwrap().by_id(4).unwrap();
        assert_eq!(alice.feature("gender"), Some(&json!("female")));
        assert_eq!(alice.features().len(), 1);
        assert_eq!(doc.annotation_set("").unwrap().len(), 1);
    }

    #[test]
    fn test_host_ids_are_loaded_before_assigned_ones() {
        let frame = document_frame(
            r#"{"text":"abcd","entities":{
                "s:A":[{"indices":[0,1]}],
                "s:B":[{"indices":[2,4],"annotationID":1}]
            }}"#,
        );
        let doc = decode_document(frame, &SessionConfig::default()).unwrap();

        let loaded: Vec<String> = doc
            .annotation_set("s")
            .unwrap()
            .iter()
            .map(Annotation::to_string)
            .collect();
        assert_eq!(
            loaded,
            vec!["<A annotation 2 at (0, 1)>", "<B annotation 1 at (2, 4)>"]
        );
    }

    #[test]
    fn test_document_with_bad_offsets_fails_to_decode() {
        for entities in [
            r#"{":T":[{"indices":[-1,2]}]}"#,
            r#"{":T":[{"indices":[3,1]}]}"#,
            r#"{":T":[{"indices":[0,99]}]}"#,
            r#"{"NoColon":[{"indices":[0,1]}]}"#,
        ] {
            let frame = document_frame(&format!(r#"{{"text":"abc","entities":{}}}"#, entities));
            let err = decode_document(frame, &SessionConfig::default()).unwrap_err();
            assert!(matches!(err, ProtocolError::Decode { .. }), "{:?}", err);
        }
    }

    #[test]
    fn test_unescaped_documents_round_trip_host_offsets() {
        let config = SessionConfig {
            unescape_entities: true,
            ..SessionConfig::default()
        };
        let frame = document_frame(
            r#"{"text":"Tom &amp; Jerry","entities":{":Name":[{"indices":[10,15]}]}}"#,
        );
        let mut doc = decode_document(frame, &config).unwrap();
        assert_eq!(doc.text(), "Tom & Jerry");

        let jerry = doc.annotation_set("").unwrap().by_id(1).unwrap();
        assert_eq!((jerry.start(), jerry.end()), (6, 11));

        doc.annotations("").add(0, 5, "Phrase", FeatureMap::new()).unwrap();
        let response = encode_response(doc.take_journal(), &doc).unwrap();
        insta::assert_snapshot!(response, @r###"[{"command":"ADD_ANNOT","annotationSet":"","startOffset":0,"endOffset":9,"annotationName":"Phrase","annotationID":2,"featureMap":{}}]"###);
    }
}
