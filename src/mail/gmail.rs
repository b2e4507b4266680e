use anyhow::{Context, Result, anyhow};
use reqwest::blocking::{Client, RequestBuilder};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::json;
use std::time::Duration;

use crate::auth::TokenSource;
use crate::domain::email::{Message, MessageRef, Reply};
use crate::mail::InboxGateway;
use crate::mail::decoders::{decode_mime_words, encode_reply_raw};

const API_BASE: &str = "https://gmail.googleapis.com/gmail/v1/users/me";
const UNSEEN_QUERY: &str = "is:unread in:inbox";

#[derive(Debug, Deserialize)]
struct ListResponse {
    #[serde(default)]
    messages: Vec<MessageRef>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ApiMessage {
    id: String,
    #[serde(rename = "threadId", default)]
    thread_id: String,
    #[serde(default)]
    snippet: String,
    #[serde(rename = "internalDate", default)]
    internal_date: Option<String>,
    #[serde(default)]
    payload: Option<ApiPayload>,
}

#[derive(Debug, Default, Deserialize)]
struct ApiPayload {
    #[serde(default)]
    headers: Vec<ApiHeader>,
}

#[derive(Debug, Deserialize)]
struct ApiHeader {
    name: String,
    value: String,
}

impl ApiMessage {
    fn header(&self, name: &str) -> Option<&str> {
        self.payload
            .as_ref()?
            .headers
            .iter()
            .find(|h| h.name.eq_ignore_ascii_case(name))
            .map(|h| h.value.as_str())
    }

    pub(crate) fn into_message(self) -> Message {
        let subject = self
            .header("Subject")
            .map(decode_mime_words)
            .unwrap_or_else(|| "No Subject".to_string());
        let sender = self
            .header("From")
            .map(decode_mime_words)
            .unwrap_or_else(|| "Unknown".to_string());
        // internalDate is epoch milliseconds as a string
        let received_at_epoch_seconds = self
            .internal_date
            .as_deref()
            .and_then(|ms| ms.parse::<i64>().ok())
            .map(|ms| ms / 1000)
            .unwrap_or(0);

        Message {
            id: self.id,
            thread_id: self.thread_id,
            subject,
            sender,
            snippet: self.snippet,
            received_at_epoch_seconds,
        }
    }
}

/// Gmail REST API v1 over a blocking, timeout-bounded HTTP client.
pub struct GmailClient {
    http: Client,
    tokens: Box<dyn TokenSource>,
    base: String,
}

impl GmailClient {
    pub fn new(tokens: Box<dyn TokenSource>, timeout: Duration) -> Result<Self> {
        let http = Client::builder()
            .timeout(timeout)
            .build()
            .context("building Gmail HTTP client")?;
        Ok(Self {
            http,
            tokens,
            base: API_BASE.to_string(),
        })
    }

    fn authorized(&self, req: RequestBuilder) -> Result<RequestBuilder> {
        let token = self.tokens.access_token()?;
        Ok(req.bearer_auth(token))
    }

    fn send<T: DeserializeOwned>(&self, req: RequestBuilder, what: &str) -> Result<T> {
        let resp = self
            .authorized(req)?
            .send()
            .with_context(|| format!("Gmail {what} request failed"))?;
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().unwrap_or_default();
            let excerpt: String = body.chars().take(300).collect();
            return Err(anyhow!("Gmail {what} returned {status}: {excerpt}"));
        }
        resp.json::<T>()
            .with_context(|| format!("decoding Gmail {what} response"))
    }
}

impl InboxGateway for GmailClient {
    fn authenticate(&self) -> Result<()> {
        self.tokens
            .access_token()
            .map(|_| ())
            .context("Gmail authentication failed")
    }

    fn list_unseen(&self, max: u32) -> Result<Vec<MessageRef>> {
        let max = max.to_string();
        let req = self
            .http
            .get(format!("{}/messages", self.base))
            .query(&[("q", UNSEEN_QUERY), ("maxResults", max.as_str())]);
        let list: ListResponse = self.send(req, "list")?;
        Ok(list.messages)
    }

    fn fetch(&self, id: &str) -> Result<Message> {
        let req = self
            .http
            .get(format!("{}/messages/{id}", self.base))
            .query(&[
                ("format", "metadata"),
                ("metadataHeaders", "Subject"),
                ("metadataHeaders", "From"),
            ]);
        let api: ApiMessage = self.send(req, "get")?;
        Ok(api.into_message())
    }

    fn send_reply(&self, reply: &Reply) -> Result<()> {
        let body = json!({
            "raw": encode_reply_raw(reply)?,
            "threadId": reply.thread_id,
        });
        let req = self
            .http
            .post(format!("{}/messages/send", self.base))
            .json(&body);
        let _: serde_json::Value = self.send(req, "send")?;
        Ok(())
    }

    fn mark_read(&self, id: &str) -> Result<()> {
        let req = self
            .http
            .post(format!("{}/messages/{id}/modify", self.base))
            .json(&json!({ "removeLabelIds": ["UNREAD"] }));
        let _: serde_json::Value = self.send(req, "modify")?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn converts_api_message() {
        let api: ApiMessage = serde_json::from_value(json!({
            "id": "18c2",
            "threadId": "18c0",
            "snippet": "The build is failing on main",
            "internalDate": "1700000123456",
            "payload": {
                "headers": [
                    {"name": "From", "value": "CI Bot <ci@example.com>"},
                    {"name": "Subject", "value": "=?utf-8?B?QnVpbGQgZmFpbGVk?="}
                ]
            }
        }))
        .unwrap();

        let msg = api.into_message();
        assert_eq!(msg.id, "18c2");
        assert_eq!(msg.thread_id, "18c0");
        assert_eq!(msg.subject, "Build failed");
        assert_eq!(msg.sender, "CI Bot <ci@example.com>");
        assert_eq!(msg.received_at_epoch_seconds, 1_700_000_123);
    }

    #[test]
    fn missing_fields_get_defaults() {
        let api: ApiMessage = serde_json::from_value(json!({"id": "x"})).unwrap();
        let msg = api.into_message();
        assert_eq!(msg.subject, "No Subject");
        assert_eq!(msg.sender, "Unknown");
        assert_eq!(msg.snippet, "");
        assert_eq!(msg.received_at_epoch_seconds, 0);
    }

    #[test]
    fn empty_list_response_has_no_messages() {
        let list: ListResponse = serde_json::from_str(r#"{"resultSizeEstimate": 0}"#).unwrap();
        assert!(list.messages.is_empty());

        let list: ListResponse = serde_json::from_value(json!({
            "messages": [{"id": "a", "threadId": "t"}, {"id": "b", "threadId": "u"}]
        }))
        .unwrap();
        let ids: Vec<_> = list.messages.iter().map(|m| m.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b"]);
    }
}
