//! Durable inbox on a Redis-compatible REST key-value service
//! (Upstash / Vercel KV wire format).
//!
//! Layout: a list of envelope ids, newest first, plus a hash of id → envelope
//! JSON. Commands are posted as JSON arrays with a bearer token; replies are
//! `{"result": ..}` or `{"error": ".."}`.

use std::time::Duration;

use reqwest::Client;
use serde::Deserialize;
use serde_json::Value;

use crate::config::KvConfig;
use crate::error::StoreError;
use crate::models::WebhookEnvelope;

use super::InboxBackend;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Deserialize)]
struct KvReply {
    #[serde(default)]
    result: Option<Value>,
    #[serde(default)]
    error: Option<String>,
}

impl KvReply {
    fn into_result(self) -> Result<Value, StoreError> {
        match self.error {
            Some(e) => Err(StoreError::Kv(e)),
            None => Ok(self.result.unwrap_or(Value::Null)),
        }
    }
}

#[derive(Debug, Clone)]
pub struct KvBackend {
    client: Client,
    url: String,
    token: String,
    ids_key: String,
    items_key: String,
    capacity: usize,
}

impl KvBackend {
    pub fn new(config: &KvConfig, capacity: usize) -> Result<Self, StoreError> {
        let client = Client::builder().timeout(REQUEST_TIMEOUT).build()?;
        Ok(Self {
            client,
            url: config.url.trim_end_matches('/').to_string(),
            token: config.token.clone(),
            ids_key: format!("{}:ids", config.prefix),
            items_key: format!("{}:items", config.prefix),
            capacity: capacity.max(1),
        })
    }

    async fn command(&self, args: Vec<Value>) -> Result<Value, StoreError> {
        let response = self
            .client
            .post(&self.url)
            .bearer_auth(&self.token)
            .json(&args)
            .send()
            .await?;

        let status = response.status();
        let reply: KvReply = response.json().await?;
        if reply.error.is_none() && !status.is_success() {
            return Err(StoreError::Kv(format!("HTTP {}", status)));
        }
        reply.into_result()
    }

    /// Runs `commands` atomically. Any failing command fails the batch.
    async fn multi_exec(&self, commands: Vec<Vec<Value>>) -> Result<Vec<Value>, StoreError> {
        let response = self
            .client
            .post(format!("{}/multi-exec", self.url))
            .bearer_auth(&self.token)
            .json(&commands)
            .send()
            .await?;

        let status = response.status();
        let body: Value = response.json().await?;

        if let Value::Array(replies) = body {
            return replies
                .into_iter()
                .map(|r| serde_json::from_value::<KvReply>(r)?.into_result())
                .collect();
        }

        let reply: KvReply = serde_json::from_value(body)?;
        match reply.error {
            Some(e) => Err(StoreError::Kv(e)),
            None => Err(StoreError::UnexpectedReply(format!(
                "multi-exec returned HTTP {} without a reply array",
                status
            ))),
        }
    }
}

fn arg(s: impl Into<String>) -> Value {
    Value::String(s.into())
}

fn string_list(value: Value) -> Result<Vec<Option<String>>, StoreError> {
    match value {
        Value::Null => Ok(Vec::new()),
        Value::Array(items) => items
            .into_iter()
            .map(|v| match v {
                Value::String(s) => Ok(Some(s)),
                Value::Null => Ok(None),
                other => Err(StoreError::UnexpectedReply(other.to_string())),
            })
            .collect(),
        other => Err(StoreError::UnexpectedReply(other.to_string())),
    }
}

impl InboxBackend for KvBackend {
    async fn append(&self, envelope: &WebhookEnvelope) -> Result<(), StoreError> {
        let body = serde_json::to_string(envelope)?;
        let keep = self.capacity.to_string();
        let last = (self.capacity - 1).to_string();

        let replies = self
            .multi_exec(vec![
                vec![arg("LPUSH"), arg(&self.ids_key), arg(&envelope.id)],
                vec![arg("HSET"), arg(&self.items_key), arg(&envelope.id), arg(body)],
                vec![arg("LRANGE"), arg(&self.ids_key), arg(keep), arg("-1")],
                vec![arg("LTRIM"), arg(&self.ids_key), arg("0"), arg(last)],
            ])
            .await?;

        let evicted: Vec<String> = match replies.into_iter().nth(2) {
            Some(value) => string_list(value)?.into_iter().flatten().collect(),
            None => return Err(StoreError::UnexpectedReply("short multi-exec reply".into())),
        };

        if !evicted.is_empty() {
            let mut hdel = vec![arg("HDEL"), arg(&self.items_key)];
            hdel.extend(evicted.into_iter().map(arg));
            // The list is already trimmed; a stale hash entry is only wasted space.
            if let Err(e) = self.command(hdel).await {
                tracing::warn!("Failed to drop evicted inbox bodies: {}", e);
            }
        }

        Ok(())
    }

    async fn list(&self, limit: usize) -> Result<Vec<WebhookEnvelope>, StoreError> {
        let take = limit.min(self.capacity);
        if take == 0 {
            return Ok(Vec::new());
        }

        let ids = self
            .command(vec![
                arg("LRANGE"),
                arg(&self.ids_key),
                arg("0"),
                arg((take - 1).to_string()),
            ])
            .await?;
        let ids: Vec<String> = string_list(ids)?.into_iter().flatten().collect();
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let mut hmget = vec![arg("HMGET"), arg(&self.items_key)];
        hmget.extend(ids.into_iter().map(arg));
        let bodies = self.command(hmget).await?;

        string_list(bodies)?
            .into_iter()
            .flatten()
            .map(|body| serde_json::from_str(&body).map_err(StoreError::from))
            .collect()
    }

    async fn get_by_id(&self, id: &str) -> Result<Option<WebhookEnvelope>, StoreError> {
        let body = self
            .command(vec![arg("HGET"), arg(&self.items_key), arg(id)])
            .await?;
        match body {
            Value::Null => Ok(None),
            Value::String(s) => Ok(Some(serde_json::from_str(&s)?)),
            other => Err(StoreError::UnexpectedReply(other.to_string())),
        }
    }

    async fn clear(&self) -> Result<(), StoreError> {
        self.command(vec![arg("DEL"), arg(&self.ids_key), arg(&self.items_key)])
            .await?;
        Ok(())
    }
}
