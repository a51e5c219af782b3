//! REST client for an Upstash-style hosted cache.
//!
//! Each command is POSTed as a JSON array (`["SET", "k", "v", "EX", 60]`) with a
//! bearer token. The reply is `{"result": ...}` on success or `{"error": "..."}`.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};
use std::time::Duration;

use super::KvStore;
use crate::error::{StoreError, StoreResult};

pub struct RestStore {
    client: reqwest::Client,
    url: String,
    token: String,
    timeout: Duration,
}

#[derive(Debug, Deserialize)]
struct Reply {
    #[serde(default)]
    result: Value,
    #[serde(default)]
    error: Option<String>,
}

impl RestStore {
    pub fn new(url: &str, token: &str, timeout: Duration) -> StoreResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| StoreError::Unavailable(format!("failed to build http client: {e}")))?;
        Ok(Self {
            client,
            url: url.trim_end_matches('/').to_string(),
            token: token.to_string(),
            timeout,
        })
    }

    async fn command(&self, args: Vec<Value>) -> StoreResult<Value> {
        let response = self
            .client
            .post(&self.url)
            .bearer_auth(&self.token)
            .json(&args)
            .send()
            .await
            .map_err(|e| self.transport_error(e))?;

        let status = response.status();
        let body = response.text().await.map_err(|e| self.transport_error(e))?;
        let reply: Option<Reply> = serde_json::from_str(&body).ok();

        if let Some(Reply {
            error: Some(message),
            ..
        }) = &reply
        {
            return Err(StoreError::Rejected {
                status: status.as_u16(),
                message: message.clone(),
            });
        }
        if !status.is_success() {
            return Err(StoreError::Rejected {
                status: status.as_u16(),
                message: body,
            });
        }
        reply
            .map(|r| r.result)
            .ok_or_else(|| StoreError::Malformed(format!("undecodable reply: {body}")))
    }

    fn transport_error(&self, err: reqwest::Error) -> StoreError {
        if err.is_timeout() {
            StoreError::Timeout(self.timeout)
        } else {
            StoreError::from(err)
        }
    }
}

fn expect_string_list(value: Value, what: &str) -> StoreResult<Vec<String>> {
    match value {
        Value::Array(items) => items
            .into_iter()
            .map(|item| match item {
                Value::String(s) => Ok(s),
                other => Err(StoreError::Malformed(format!("{what}: non-string item {other}"))),
            })
            .collect(),
        Value::Null => Ok(Vec::new()),
        other => Err(StoreError::Malformed(format!("{what}: expected array, got {other}"))),
    }
}

/// Parse a `SCAN` reply: `[cursor, [keys...]]`, cursor as string or number.
fn parse_scan_reply(value: Value) -> StoreResult<(u64, Vec<String>)> {
    let Value::Array(mut parts) = value else {
        return Err(StoreError::Malformed("scan: expected [cursor, keys]".into()));
    };
    if parts.len() != 2 {
        return Err(StoreError::Malformed("scan: expected [cursor, keys]".into()));
    }
    let keys = expect_string_list(parts.pop().unwrap_or_default(), "scan")?;
    let cursor = match parts.pop().unwrap_or_default() {
        Value::String(s) => s
            .parse::<u64>()
            .map_err(|e| StoreError::Malformed(format!("scan cursor {s}: {e}")))?,
        Value::Number(n) => n
            .as_u64()
            .ok_or_else(|| StoreError::Malformed(format!("scan cursor {n}")))?,
        other => return Err(StoreError::Malformed(format!("scan cursor {other}"))),
    };
    Ok((cursor, keys))
}

#[async_trait]
impl KvStore for RestStore {
    async fn get(&self, key: &str) -> StoreResult<Option<String>> {
        match self.command(vec![json!("GET"), json!(key)]).await? {
            Value::Null => Ok(None),
            Value::String(s) => Ok(Some(s)),
            // Some proxies hand back already-decoded JSON
            other => Ok(Some(other.to_string())),
        }
    }

    async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> StoreResult<()> {
        let mut args = vec![json!("SET"), json!(key), json!(value)];
        if let Some(ttl) = ttl {
            args.push(json!("EX"));
            args.push(json!(ttl.as_secs().max(1)));
        }
        self.command(args).await.map(|_| ())
    }

    async fn set_keep_ttl(&self, key: &str, value: &str) -> StoreResult<()> {
        self.command(vec![json!("SET"), json!(key), json!(value), json!("KEEPTTL")])
            .await
            .map(|_| ())
    }

    async fn scan(
        &self,
        cursor: u64,
        pattern: &str,
        count: usize,
    ) -> StoreResult<(u64, Vec<String>)> {
        let reply = self
            .command(vec![
                json!("SCAN"),
                json!(cursor),
                json!("MATCH"),
                json!(pattern),
                json!("COUNT"),
                json!(count),
            ])
            .await?;
        parse_scan_reply(reply)
    }

    async fn lpush(&self, key: &str, value: &str) -> StoreResult<u64> {
        let reply = self.command(vec![json!("LPUSH"), json!(key), json!(value)]).await?;
        reply
            .as_u64()
            .ok_or_else(|| StoreError::Malformed(format!("lpush: expected integer, got {reply}")))
    }

    async fn lrange(&self, key: &str, start: i64, stop: i64) -> StoreResult<Vec<String>> {
        let reply = self
            .command(vec![json!("LRANGE"), json!(key), json!(start), json!(stop)])
            .await?;
        expect_string_list(reply, "lrange")
    }

    async fn ltrim(&self, key: &str, start: i64, stop: i64) -> StoreResult<()> {
        self.command(vec![json!("LTRIM"), json!(key), json!(start), json!(stop)])
            .await
            .map(|_| ())
    }

    async fn ping(&self) -> StoreResult<()> {
        self.command(vec![json!("PING")]).await.map(|_| ())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scan_reply_accepts_string_and_numeric_cursor() {
        let (cursor, keys) = parse_scan_reply(json!(["17", ["ada:now:a", "ada:now:b"]])).unwrap();
        assert_eq!(cursor, 17);
        assert_eq!(keys, ["ada:now:a", "ada:now:b"]);

        let (cursor, keys) = parse_scan_reply(json!([0, []])).unwrap();
        assert_eq!(cursor, 0);
        assert!(keys.is_empty());
    }

    #[test]
    fn scan_reply_rejects_garbage() {
        assert!(parse_scan_reply(json!("OK")).is_err());
        assert!(parse_scan_reply(json!(["x", []])).is_err());
        assert!(parse_scan_reply(json!(["0", [1, 2]])).is_err());
    }

    #[tokio::test]
    async fn unreachable_endpoint_is_transient() {
        // Port 9 (discard) on localhost is closed in test environments.
        let store = RestStore::new("http://127.0.0.1:9", "t", Duration::from_millis(500)).unwrap();
        let err = store.get("k").await.unwrap_err();
        assert!(err.is_transient(), "unexpected error: {err}");
    }
}
