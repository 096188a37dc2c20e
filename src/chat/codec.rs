//! Decodes wire frames into typed stream events.
//!
//! The backend names its frames `start`, `retrieval`, `sources`, `token`,
//! `done` and `error`. Token frames have carried their text under both
//! `data.token` and `data.text` across backend versions; both spellings are
//! accepted here and nothing past this module sees the difference.

use serde_json::{Map, Value};

use crate::core::errors::DecodeError;

use super::sse::SseFrame;
use super::types::Source;

/// The closed set of events a chat stream can deliver.
///
/// `Error` is a successfully decoded, server-reported failure; it is not the
/// same thing as a [`DecodeError`], which means the frame itself was
/// unreadable.
#[derive(Debug, Clone)]
pub enum StreamEvent {
    Start(Value),
    Retrieval(Value),
    Sources(Vec<Source>),
    Token(String),
    Done(Value),
    Error(Value),
}

impl StreamEvent {
    pub fn kind(&self) -> &'static str {
        match self {
            StreamEvent::Start(_) => "start",
            StreamEvent::Retrieval(_) => "retrieval",
            StreamEvent::Sources(_) => "sources",
            StreamEvent::Token(_) => "token",
            StreamEvent::Done(_) => "done",
            StreamEvent::Error(_) => "error",
        }
    }
}

pub fn decode_frame(frame: &SseFrame) -> Result<Option<StreamEvent>, DecodeError> {
    decode_event(&frame.event, &frame.data)
}

/// Decode one wire frame into a typed event.
///
/// Unrecognized event names are skipped (`Ok(None)`); a payload that fails
/// to parse is a [`DecodeError`], which the caller reports without tearing
/// the stream down.
pub fn decode_event(event: &str, raw: &str) -> Result<Option<StreamEvent>, DecodeError> {
    let decoded = match event {
        "token" => {
            let data = parse_payload(event, raw)?;
            let token = data
                .get("text")
                .or_else(|| data.get("token"))
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string();
            StreamEvent::Token(token)
        }
        "sources" => {
            let data = parse_payload(event, raw)?;
            let sources = match data.get("sources") {
                Some(list) => serde_json::from_value::<Vec<Source>>(list.clone())
                    .map_err(|err| DecodeError::new(event, err))?,
                None => Vec::new(),
            };
            StreamEvent::Sources(sources)
        }
        "start" => StreamEvent::Start(parse_payload(event, raw)?),
        "retrieval" => StreamEvent::Retrieval(parse_payload(event, raw)?),
        "done" => StreamEvent::Done(parse_payload(event, raw)?),
        "error" => StreamEvent::Error(parse_payload(event, raw)?),
        other => {
            tracing::debug!(event = other, "skipping unrecognized stream event");
            return Ok(None);
        }
    };
    Ok(Some(decoded))
}

/// Frames arrive as `{"type": …, "data": {…}}`; only `data` matters past
/// this point. A missing `data` field decodes as an empty object.
fn parse_payload(event: &str, raw: &str) -> Result<Value, DecodeError> {
    let payload: Value = serde_json::from_str(raw).map_err(|err| DecodeError::new(event, err))?;
    Ok(match payload.get("data") {
        Some(data) => data.clone(),
        None => Value::Object(Map::new()),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn token_text_field() {
        let event = decode_event("token", r#"{"type":"token","data":{"text":"xin chào"}}"#)
            .unwrap()
            .unwrap();
        match event {
            StreamEvent::Token(token) => assert_eq!(token, "xin chào"),
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[test]
    fn token_legacy_field() {
        let event = decode_event("token", r#"{"data":{"token":"hi"}}"#)
            .unwrap()
            .unwrap();
        match event {
            StreamEvent::Token(token) => assert_eq!(token, "hi"),
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[test]
    fn token_text_wins_over_legacy_field() {
        let event = decode_event("token", r#"{"data":{"text":"a","token":"b"}}"#)
            .unwrap()
            .unwrap();
        match event {
            StreamEvent::Token(token) => assert_eq!(token, "a"),
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[test]
    fn token_without_either_field_is_empty() {
        let event = decode_event("token", r#"{"data":{}}"#).unwrap().unwrap();
        match event {
            StreamEvent::Token(token) => assert_eq!(token, ""),
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[test]
    fn sources_list_passes_through_in_order() {
        let raw = r#"{"data":{"sources":[
            {"document_id":1,"chapter_id":2,"chunk_id":10,"text":"a","score":0.9},
            {"document_id":1,"chapter_id":3,"chunk_id":11,"text":"b","page_number":5}
        ]}}"#;
        let event = decode_event("sources", raw).unwrap().unwrap();
        match event {
            StreamEvent::Sources(sources) => {
                assert_eq!(sources.len(), 2);
                assert_eq!(sources[0].chunk_id, 10);
                assert_eq!(sources[1].chunk_id, 11);
                assert_eq!(sources[1].page_number, Some(5));
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[test]
    fn malformed_payload_is_a_decode_error() {
        let err = decode_event("token", "not-json").unwrap_err();
        assert_eq!(err.event, "token");
    }

    #[test]
    fn error_event_decodes_cleanly() {
        let event = decode_event("error", r#"{"data":{"message":"boom"}}"#)
            .unwrap()
            .unwrap();
        assert_eq!(event.kind(), "error");
    }

    #[test]
    fn unknown_event_is_skipped() {
        assert!(decode_event("heartbeat", "whatever").unwrap().is_none());
    }

    #[test]
    fn missing_data_field_decodes_as_empty() {
        let event = decode_event("done", r#"{"type":"done"}"#).unwrap().unwrap();
        match event {
            StreamEvent::Done(data) => assert_eq!(data, Value::Object(Default::default())),
            other => panic!("unexpected event: {other:?}"),
        }
    }
}
