//! Inbox listing: `GET {api_url}/message/inbox.json`.
//!
//! The feed is heterogeneous (comment replies, username mentions, private
//! messages, notifications). The envelope tolerates `null` at every level and
//! each child is decoded on its own, so one malformed entry never fails the
//! page. Entries that do not decode, or lack a usable id or body, are dropped
//! here and never reach the poller.

use serde::Deserialize;
use tracing::trace;

use super::{AccessToken, RedditClient, bearer, truncate_body};
use crate::error::FetchError;

/// One actionable inbox entry.
#[derive(Debug, Clone, PartialEq)]
pub struct InboxMessage {
    /// Platform-assigned id, without kind prefix.
    pub id: String,
    /// Thing kind, e.g. `t1` for comments, `t4` for private messages.
    pub kind: String,
    pub author: String,
    pub subject: Option<String>,
    pub body: String,
    /// Creation time in epoch seconds (platform clock).
    pub created_utc: f64,
}

#[derive(Debug, Default, Deserialize)]
struct Listing {
    #[serde(default)]
    data: Option<ListingData>,
}

#[derive(Debug, Default, Deserialize)]
struct ListingData {
    /// Kept as raw values; see [`Thing::decode`].
    #[serde(default)]
    children: Option<Vec<serde_json::Value>>,
}

#[derive(Debug, Default, Deserialize)]
struct Thing {
    #[serde(default)]
    kind: Option<String>,
    #[serde(default)]
    data: Option<ThingData>,
}

#[derive(Debug, Default, Deserialize)]
struct ThingData {
    id: Option<String>,
    body: Option<String>,
    author: Option<String>,
    subject: Option<String>,
    created_utc: Option<f64>,
}

impl Thing {
    /// Decode one child. A wrongly typed field drops only this entry.
    fn decode(value: serde_json::Value) -> Option<InboxMessage> {
        serde_json::from_value::<Thing>(value).ok()?.into_message()
    }

    fn into_message(self) -> Option<InboxMessage> {
        let data = self.data?;
        let id = data.id.filter(|id| !id.is_empty())?;
        let body = data.body.filter(|b| !b.trim().is_empty())?;
        Some(InboxMessage {
            id,
            kind: self.kind.unwrap_or_default(),
            author: data.author.unwrap_or_default(),
            subject: data.subject,
            body,
            created_utc: data.created_utc.unwrap_or(0.0),
        })
    }
}

/// Decode a listing envelope into actionable messages, keeping feed order.
pub fn parse_listing(body: &str) -> Result<Vec<InboxMessage>, FetchError> {
    let listing: Listing = serde_json::from_str(body)?;
    let children = listing
        .data
        .and_then(|data| data.children)
        .unwrap_or_default();
    let total = children.len();

    let messages: Vec<InboxMessage> = children.into_iter().filter_map(Thing::decode).collect();

    if messages.len() < total {
        trace!(
            dropped = total - messages.len(),
            "Skipped malformed inbox entries or entries without id or body"
        );
    }

    Ok(messages)
}

impl RedditClient {
    pub(crate) async fn inbox(&self, token: &AccessToken) -> Result<Vec<InboxMessage>, FetchError> {
        let resp = self
            .client
            .get(self.api_url("/message/inbox.json"))
            .header(reqwest::header::AUTHORIZATION, bearer(token))
            .send()
            .await?;

        let status = resp.status();
        let body = resp.text().await?;

        if !status.is_success() {
            return Err(FetchError::Status {
                status,
                body: truncate_body(&body),
            });
        }

        parse_listing(&body)
    }
}
