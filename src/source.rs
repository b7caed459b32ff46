//! The remote mailbox as seen by the pipeline.

use crate::error::SourceError;
use crate::models::Label;
use async_trait::async_trait;
use serde::{Deserialize, Deserializer, Serialize};

/// One page of a message search.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListPage {
    pub ids: Vec<String>,
    /// Empty when there are no further pages.
    pub next_page_token: String,
    /// Informational only; never used to stop pagination.
    pub result_size_estimate: u32,
}

#[async_trait]
pub trait MessageSource: Send + Sync {
    async fn list(
        &self,
        query: &str,
        page_size: u32,
        page_token: &str,
    ) -> Result<ListPage, SourceError>;

    async fn get(&self, id: &str) -> Result<RawMessage, SourceError>;

    async fn list_labels(&self) -> Result<Vec<Label>, SourceError>;
}

/// A message resource as returned by the remote, before decoding.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawMessage {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub thread_id: String,
    #[serde(default)]
    pub label_ids: Vec<String>,
    #[serde(default)]
    pub snippet: String,
    /// Milliseconds since the epoch.
    #[serde(default, deserialize_with = "int_or_string")]
    pub internal_date: i64,
    #[serde(default)]
    pub payload: Option<MessagePart>,
    #[serde(skip)]
    pub source: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessagePart {
    #[serde(default)]
    pub mime_type: String,
    #[serde(default)]
    pub headers: Vec<Header>,
    #[serde(default)]
    pub body: Option<MessagePartBody>,
    #[serde(default)]
    pub parts: Vec<MessagePart>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Header {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub value: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessagePartBody {
    /// base64url encoded content
    #[serde(default)]
    pub data: Option<String>,
}

impl RawMessage {
    /// Parses a message resource and keeps the text it was parsed from.
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        let mut msg: RawMessage = serde_json::from_str(json)?;
        msg.source = json.to_string();
        Ok(msg)
    }

    pub fn headers(&self) -> &[Header] {
        self.payload
            .as_ref()
            .map(|p| p.headers.as_slice())
            .unwrap_or_default()
    }
}

impl Header {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }
}

// Gmail encodes int64 fields as JSON strings.
fn int_or_string<'de, D>(deserializer: D) -> Result<i64, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum IntOrString {
        Int(i64),
        Str(String),
    }

    match Option::<IntOrString>::deserialize(deserializer)? {
        None => Ok(0),
        Some(IntOrString::Int(n)) => Ok(n),
        Some(IntOrString::Str(s)) => s.trim().parse().map_err(serde::de::Error::custom),
    }
}
