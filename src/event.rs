//! Wire shape of the origin-response trigger: a batch of records, each
//! carrying the original request and the origin's response. The handler's
//! return value is the (possibly rewritten) response object.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum EventError {
    #[error("origin response event contains no records")]
    NoRecords,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct OriginResponseEvent {
    #[serde(rename = "Records")]
    pub records: Vec<EventRecord>,
}

impl OriginResponseEvent {
    /// Request and response of the first record, the only one the edge sends.
    pub fn into_parts(self) -> Result<(OriginRequest, OriginResponse), EventError> {
        let record = self
            .records
            .into_iter()
            .next()
            .ok_or(EventError::NoRecords)?;
        Ok((record.cf.request, record.cf.response))
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct EventRecord {
    pub cf: CloudFrontEvent,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CloudFrontEvent {
    pub request: OriginRequest,
    pub response: OriginResponse,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct OriginRequest {
    pub uri: String,
    #[serde(default)]
    pub querystring: String,
    #[serde(default)]
    pub origin: RequestOrigin,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct RequestOrigin {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub s3: Option<S3Origin>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct S3Origin {
    pub domain_name: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum BodyEncoding {
    Text,
    Base64,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OriginResponse {
    pub status: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status_description: Option<String>,
    #[serde(default)]
    pub headers: Headers,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body_encoding: Option<BodyEncoding>,
    /// Fields the handler does not interpret, carried through as-is.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl OriginResponse {
    pub fn status_is(&self, codes: &[&str]) -> bool {
        codes.contains(&self.status.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct HeaderEntry {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,
    pub value: String,
}

/// Lower-case header name to its list of entries.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(transparent)]
pub struct Headers(BTreeMap<String, Vec<HeaderEntry>>);

impl Headers {
    /// Replaces every entry stored under `name`.
    pub fn set(&mut self, name: &str, key: &str, value: impl Into<String>) {
        self.0.insert(
            name.to_ascii_lowercase(),
            vec![HeaderEntry {
                key: Some(key.to_string()),
                value: value.into(),
            }],
        );
    }

    pub fn first(&self, name: &str) -> Option<&str> {
        self.0
            .get(&name.to_ascii_lowercase())
            .and_then(|entries| entries.first())
            .map(|entry| entry.value.as_str())
    }
}
