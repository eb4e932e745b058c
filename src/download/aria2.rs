//! aria2 JSON-RPC client

use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{debug, trace};

use super::client::{DownloadState, DownloadStatus, Downloader};
use super::DownloadConfig;
use crate::error::{HubError, Result};

/// aria2 error codes caused by network conditions or timeouts
const RETRYABLE_CODES: &[&str] = &["1", "2", "6", "19", "22", "23", "29"];

const STATUS_KEYS: &[&str] = &[
    "gid",
    "status",
    "totalLength",
    "completedLength",
    "errorCode",
    "errorMessage",
];

#[derive(Debug, Deserialize)]
struct RpcResponse<T> {
    result: Option<T>,
    error: Option<RpcError>,
}

#[derive(Debug, Deserialize)]
struct RpcError {
    code: i64,
    message: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StatusReply {
    gid: String,
    status: String,
    #[serde(default)]
    total_length: String,
    #[serde(default)]
    completed_length: String,
    error_code: Option<String>,
    error_message: Option<String>,
}

#[derive(Debug, Deserialize)]
struct VersionReply {
    version: String,
}

pub struct Aria2Client {
    client: reqwest::Client,
    uri: String,
    secret: String,
    next_id: AtomicU64,
}

impl Aria2Client {
    pub fn new(config: &DownloadConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| HubError::Downloader(format!("failed to build http client: {}", e)))?;
        Ok(Self {
            client,
            uri: config.uri.clone(),
            secret: config.secret.clone(),
            next_id: AtomicU64::new(1),
        })
    }

    fn request_body(&self, method: &str, params: Vec<Value>) -> Value {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let mut all = Vec::with_capacity(params.len() + 1);
        if !self.secret.is_empty() {
            all.push(json!(format!("token:{}", self.secret)));
        }
        all.extend(params);
        json!({
            "jsonrpc": "2.0",
            "id": id.to_string(),
            "method": method,
            "params": all,
        })
    }

    async fn call<T: DeserializeOwned>(&self, method: &str, params: Vec<Value>) -> Result<T> {
        let body = self.request_body(method, params);
        trace!("aria2 call: {}", method);
        // aria2 reports RPC errors with a non-2xx status and a JSON body,
        // so the body is decoded regardless of the status code.
        let response = self
            .client
            .post(&self.uri)
            .json(&body)
            .send()
            .await
            .map_err(|e| HubError::Downloader(format!("{} failed: {}", method, e)))?;
        let reply: RpcResponse<T> = response
            .json()
            .await
            .map_err(|e| HubError::Downloader(format!("{}: invalid response: {}", method, e)))?;
        match reply {
            RpcResponse {
                error: Some(err), ..
            } => Err(HubError::Downloader(format!(
                "{}: aria2 error {}: {}",
                method, err.code, err.message
            ))),
            RpcResponse {
                result: Some(result),
                ..
            } => Ok(result),
            _ => Err(HubError::Downloader(format!("{}: empty response", method))),
        }
    }
}

fn map_status(reply: StatusReply) -> DownloadStatus {
    let state = match reply.status.as_str() {
        "complete" => DownloadState::Complete,
        "removed" => DownloadState::Removed,
        "error" => {
            let code = reply.error_code.unwrap_or_default();
            DownloadState::Error {
                retryable: RETRYABLE_CODES.contains(&code.as_str()),
                message: format!(
                    "aria2 error {}: {}",
                    code,
                    reply.error_message.unwrap_or_default()
                ),
            }
        }
        // active, waiting, paused
        _ => DownloadState::Active,
    };
    DownloadStatus {
        gid: reply.gid,
        state,
        total_length: reply.total_length.parse().unwrap_or(0),
        completed_length: reply.completed_length.parse().unwrap_or(0),
    }
}

#[async_trait]
impl Downloader for Aria2Client {
    async fn add_uri(&self, uris: &[String], dir: &Path) -> Result<String> {
        debug!("aria2 addUri {:?} -> {:?}", uris, dir);
        self.call(
            "aria2.addUri",
            vec![json!(uris), json!({ "dir": dir.to_string_lossy() })],
        )
        .await
    }

    async fn status(&self, gid: &str) -> Result<DownloadStatus> {
        let reply: StatusReply = self
            .call("aria2.tellStatus", vec![json!(gid), json!(STATUS_KEYS)])
            .await?;
        Ok(map_status(reply))
    }

    async fn remove(&self, gid: &str) -> Result<()> {
        let _: String = self.call("aria2.forceRemove", vec![json!(gid)]).await?;
        Ok(())
    }

    async fn version(&self) -> Result<String> {
        let reply: VersionReply = self.call("aria2.getVersion", vec![]).await?;
        Ok(reply.version)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reply(status: &str, code: Option<&str>) -> StatusReply {
        StatusReply {
            gid: "2089b05ecca3d829".to_string(),
            status: status.to_string(),
            total_length: "1024".to_string(),
            completed_length: "512".to_string(),
            error_code: code.map(str::to_string),
            error_message: code.map(|_| "boom".to_string()),
        }
    }

    #[test]
    fn test_map_status() {
        assert_eq!(map_status(reply("active", None)).state, DownloadState::Active);
        assert_eq!(map_status(reply("waiting", None)).state, DownloadState::Active);
        assert_eq!(map_status(reply("complete", None)).state, DownloadState::Complete);
        assert_eq!(map_status(reply("removed", None)).state, DownloadState::Removed);
        assert_eq!(map_status(reply("active", None)).progress(), 50.0);
    }

    #[test]
    fn test_error_codes_classified() {
        match map_status(reply("error", Some("2"))).state {
            DownloadState::Error { retryable, message } => {
                assert!(retryable);
                assert!(message.contains("boom"));
            }
            other => panic!("unexpected state {:?}", other),
        }
        match map_status(reply("error", Some("3"))).state {
            DownloadState::Error { retryable, .. } => assert!(!retryable),
            other => panic!("unexpected state {:?}", other),
        }
    }

    #[test]
    fn test_status_reply_parses_camel_case() {
        let body = r#"{"id":"1","jsonrpc":"2.0","result":{"gid":"abc","status":"error","totalLength":"0","completedLength":"0","errorCode":"19","errorMessage":"Name resolution failed"}}"#;
        let parsed: RpcResponse<StatusReply> = serde_json::from_str(body).unwrap();
        let status = map_status(parsed.result.unwrap());
        assert!(matches!(status.state, DownloadState::Error { retryable: true, .. }));
    }

    #[test]
    fn test_request_body_carries_token() {
        let client = Aria2Client::new(&DownloadConfig {
            secret: "s3cret".to_string(),
            ..Default::default()
        })
        .unwrap();
        let body = client.request_body("aria2.tellStatus", vec![json!("gid")]);
        assert_eq!(body["method"], "aria2.tellStatus");
        assert_eq!(body["params"][0], "token:s3cret");
        assert_eq!(body["params"][1], "gid");

        let anonymous = Aria2Client::new(&DownloadConfig::default()).unwrap();
        let body = anonymous.request_body("aria2.getVersion", vec![]);
        assert_eq!(body["params"], json!([]));
    }
}
