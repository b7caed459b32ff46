use crate::auth::READONLY_SCOPE;
use crate::error::SourceError;
use crate::models::Label;
use crate::source::{ListPage, MessageSource, RawMessage};
use async_trait::async_trait;
use google_gmail1::Gmail;
use hyper::client::HttpConnector;
use hyper_rustls::HttpsConnector;

const USER: &str = "me";

/// [`MessageSource`] backed by the Gmail REST API.
#[derive(Clone)]
pub struct GmailSource {
    hub: Gmail<HttpsConnector<HttpConnector>>,
}

impl GmailSource {
    pub fn new(hub: Gmail<HttpsConnector<HttpConnector>>) -> Self {
        Self { hub }
    }
}

#[async_trait]
impl MessageSource for GmailSource {
    async fn list(
        &self,
        query: &str,
        page_size: u32,
        page_token: &str,
    ) -> Result<ListPage, SourceError> {
        let mut req = self
            .hub
            .users()
            .messages_list(USER)
            .max_results(page_size)
            .add_scope(READONLY_SCOPE);

        if !query.is_empty() {
            req = req.q(query);
        }
        if !page_token.is_empty() {
            req = req.page_token(page_token);
        }

        let (_, message_list) = req
            .doit()
            .await
            .map_err(|e| source_error("Failed to list messages", &e))?;

        let ids = message_list
            .messages
            .unwrap_or_default()
            .into_iter()
            .filter_map(|m| m.id)
            .collect();

        Ok(ListPage {
            ids,
            next_page_token: message_list.next_page_token.unwrap_or_default(),
            result_size_estimate: message_list.result_size_estimate.unwrap_or(0),
        })
    }

    async fn get(&self, id: &str) -> Result<RawMessage, SourceError> {
        let (_, msg) = self
            .hub
            .users()
            .messages_get(USER, id)
            .format("full")
            .add_scope(READONLY_SCOPE)
            .doit()
            .await
            .map_err(|e| source_error(&format!("Failed to get message {}", id), &e))?;

        // Round-trip through JSON so the stored source is the API's own
        // representation, base64url bodies included.
        let json = serde_json::to_string(&msg)
            .map_err(|e| SourceError::new(None, format!("Failed to encode message {id}: {e}")))?;
        RawMessage::from_json(&json)
            .map_err(|e| SourceError::new(None, format!("Failed to decode message {id}: {e}")))
    }

    async fn list_labels(&self) -> Result<Vec<Label>, SourceError> {
        let (_, label_list) = self
            .hub
            .users()
            .labels_list(USER)
            .add_scope(READONLY_SCOPE)
            .doit()
            .await
            .map_err(|e| source_error("Failed to list labels", &e))?;

        let labels = label_list
            .labels
            .unwrap_or_default()
            .into_iter()
            .map(|l| Label {
                id: l.id.unwrap_or_default(),
                name: l.name.unwrap_or_default(),
                label_type: l.type_.unwrap_or_default(),
            })
            .collect();

        Ok(labels)
    }
}

fn source_error(context: &str, err: &google_gmail1::Error) -> SourceError {
    SourceError::new(status_code(err), format!("{context}: {err}"))
}

/// HTTP status of a failed API call, if the server answered.
fn status_code(err: &google_gmail1::Error) -> Option<u16> {
    match err {
        google_gmail1::Error::Failure(response) => Some(response.status().as_u16()),
        google_gmail1::Error::BadRequest(body) => body
            .get("error")
            .and_then(|e| e.get("code"))
            .and_then(|c| c.as_u64())
            .and_then(|c| u16::try_from(c).ok()),
        _ => None,
    }
}
