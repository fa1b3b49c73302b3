//! Response envelope decoding.
//!
//! The API answers with one of three shapes:
//! - `{ "data": T }`
//! - `{ "data": { "data": [T], "pagination": P } }`
//! - `{ "error": "...", "message": "..." }` with a non-2xx status
//!
//! The shape is decided once here and callers only see a bare value or a
//! typed error.

use crate::error::TrawlError;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Message used when a failed reply carries neither `message` nor `error`.
pub const GENERIC_FAILURE: &str = "An error occurred while fetching the data.";

/// Pagination block of a paginated list reply
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageInfo {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub page: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub per_page: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_pages: Option<u32>,
}

/// Body of a paginated list, as written by the server
#[derive(Debug, Clone, Serialize)]
pub struct Paginated<T> {
    pub data: Vec<T>,
    pub pagination: PageInfo,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Envelope {
    Plain(Value),
    Paginated(Vec<Value>, PageInfo),
    Failure { status: u16, message: String },
}

impl Envelope {
    /// Decode a raw reply. An empty body decodes as `null`.
    pub fn decode(status: u16, body: &[u8]) -> Result<Self, TrawlError> {
        let json: Value = if body.iter().all(u8::is_ascii_whitespace) {
            Value::Null
        } else {
            serde_json::from_slice(body)?
        };

        if !(200..300).contains(&status) {
            return Ok(Envelope::Failure {
                status,
                message: failure_message(&json),
            });
        }

        Ok(Self::from_success(json))
    }

    fn from_success(mut json: Value) -> Self {
        let Some(data) = json.get_mut("data").map(Value::take) else {
            return Envelope::Plain(json);
        };

        match data {
            Value::Object(mut inner)
                if inner.get("data").map_or(false, Value::is_array)
                    && inner.contains_key("pagination") =>
            {
                let pagination = inner
                    .remove("pagination")
                    .and_then(|p| serde_json::from_value(p).ok())
                    .unwrap_or_default();
                let items = match inner.remove("data") {
                    Some(Value::Array(items)) => items,
                    _ => Vec::new(),
                };
                Envelope::Paginated(items, pagination)
            }
            other => Envelope::Plain(other),
        }
    }

    pub fn into_result(self) -> Result<Value, TrawlError> {
        match self {
            Envelope::Plain(value) => Ok(value),
            Envelope::Paginated(items, _) => Ok(Value::Array(items)),
            Envelope::Failure { status, message } => Err(TrawlError::from_status(status, message)),
        }
    }
}

fn failure_message(json: &Value) -> String {
    ["message", "error"]
        .iter()
        .filter_map(|field| json.get(*field).and_then(Value::as_str))
        .find(|s| !s.is_empty())
        .unwrap_or(GENERIC_FAILURE)
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn decode(status: u16, body: Value) -> Result<Value, TrawlError> {
        Envelope::decode(status, body.to_string().as_bytes())?.into_result()
    }

    #[test]
    fn test_paginated_unwraps_to_items() {
        let body = json!({"data": {"data": [{"id": "1"}], "pagination": {"page": 1}}});
        let envelope = Envelope::decode(200, body.to_string().as_bytes()).unwrap();

        match &envelope {
            Envelope::Paginated(items, page) => {
                assert_eq!(items, &vec![json!({"id": "1"})]);
                assert_eq!(page.page, Some(1));
                assert_eq!(page.total, None);
            }
            other => panic!("expected paginated, got {:?}", other),
        }
        assert_eq!(envelope.into_result().unwrap(), json!([{"id": "1"}]));
    }

    #[test]
    fn test_plain_data_unwraps() {
        assert_eq!(
            decode(200, json!({"data": {"id": "a", "name": "nightly"}})).unwrap(),
            json!({"id": "a", "name": "nightly"})
        );
        // A list without pagination is plain data
        assert_eq!(
            decode(200, json!({"data": {"data": [1, 2]}})).unwrap(),
            json!({"data": [1, 2]})
        );
        assert_eq!(decode(200, json!({"data": [1, 2]})).unwrap(), json!([1, 2]));
    }

    #[test]
    fn test_body_without_data_is_returned_raw() {
        assert_eq!(
            decode(200, json!({"status": "ok"})).unwrap(),
            json!({"status": "ok"})
        );
        assert_eq!(
            Envelope::decode(204, b"").unwrap().into_result().unwrap(),
            Value::Null
        );
    }

    #[test]
    fn test_failure_message_priority() {
        let both = decode(500, json!({"message": "Database down", "error": "Internal"}));
        assert_eq!(both.unwrap_err().to_string(), "Database down");

        let error_only = decode(500, json!({"error": "Internal"}));
        assert_eq!(error_only.unwrap_err().to_string(), "Internal");

        let neither = decode(502, json!({"detail": "gateway"}));
        assert_eq!(neither.unwrap_err().to_string(), GENERIC_FAILURE);
    }

    #[test]
    fn test_not_found_is_typed() {
        let err = decode(404, json!({"error": "Run not found"})).unwrap_err();
        assert_eq!(err, TrawlError::NotFound("Run not found".into()));

        let err = decode(401, json!({"error": "Unauthorized"})).unwrap_err();
        assert!(matches!(err, TrawlError::Unauthenticated(_)));
    }

    #[test]
    fn test_malformed_body_is_parse_failure() {
        let err = Envelope::decode(200, b"<html>oops</html>").unwrap_err();
        assert!(matches!(err, TrawlError::Parse(_)));

        let err = Envelope::decode(500, b"upstream exploded").unwrap_err();
        assert!(matches!(err, TrawlError::Parse(_)));
    }

    #[test]
    fn test_odd_pagination_block_is_tolerated() {
        let body = json!({"data": {"data": [], "pagination": "cursor-xyz"}});
        let envelope = Envelope::decode(200, body.to_string().as_bytes()).unwrap();
        assert_eq!(envelope, Envelope::Paginated(vec![], PageInfo::default()));
    }
}
