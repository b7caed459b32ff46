//! Turning a fetched [`RawMessage`] into a storage-ready [`Message`].

use crate::models::Message;
use crate::source::{MessagePart, RawMessage};
use base64::{Engine as _, engine::general_purpose};
use chrono::{DateTime, Utc};

/// Value of the first header called `name`, compared case-insensitively.
/// Later headers with the same name are ignored.
pub fn extract_header(msg: &RawMessage, name: &str) -> String {
    msg.headers()
        .iter()
        .find(|h| h.name.eq_ignore_ascii_case(name))
        .map(|h| h.value.clone())
        .unwrap_or_default()
}

/// Plain text body: the top-level body data when present, otherwise the
/// first immediate `text/plain` part. Empty when neither exists.
pub fn body_text(msg: &RawMessage) -> String {
    let Some(payload) = &msg.payload else {
        return String::new();
    };

    if let Some(data) = part_data(payload) {
        return decode_base64url(data);
    }

    payload
        .parts
        .iter()
        .find(|p| p.mime_type == "text/plain")
        .and_then(part_data)
        .map(decode_base64url)
        .unwrap_or_default()
}

fn part_data(part: &MessagePart) -> Option<&str> {
    part.body
        .as_ref()
        .and_then(|b| b.data.as_deref())
        .filter(|d| !d.is_empty())
}

fn decode_base64url(data: &str) -> String {
    let trimmed = data.trim().trim_end_matches('=');

    // Gmail uses the URL-safe alphabet; tolerate the standard one too.
    let decoded = general_purpose::URL_SAFE_NO_PAD
        .decode(trimmed)
        .or_else(|_| general_purpose::STANDARD_NO_PAD.decode(trimmed));

    match decoded {
        Ok(bytes) => String::from_utf8_lossy(&bytes).into_owned(),
        Err(e) => {
            tracing::debug!(error = %e, "Body data is not base64url");
            String::new()
        }
    }
}

/// Millisecond epoch timestamp to a time with second precision.
pub fn timestamp(internal_date_ms: i64) -> DateTime<Utc> {
    DateTime::from_timestamp(internal_date_ms / 1000, 0).unwrap_or_default()
}

/// Builds the canonical record for a fetched message.
pub fn to_message(raw: &RawMessage, inbox_url: &str, download_started_at: DateTime<Utc>) -> Message {
    Message {
        id: raw.id.clone(),
        thread_id: raw.thread_id.clone(),
        url: format!("{}#inbox/{}", inbox_url, raw.thread_id),
        date: Some(timestamp(raw.internal_date)),
        to: extract_header(raw, "To"),
        cc: extract_header(raw, "Cc"),
        from: extract_header(raw, "From"),
        subject: extract_header(raw, "Subject"),
        body: body_text(raw),
        snippet: raw.snippet.clone(),
        label_ids: raw.label_ids.clone(),
        source: raw.source.clone(),
        download_started_at,
    }
}
