//! HTTP client for the remote sync API
//!
//! `POST {api_url}/sync` with a bearer token and form-encoded fields:
//! `sync_token`, `resource_types` (JSON array) and `commands` (JSON array).

use std::time::Duration;

use reqwest::Client;
use tracing::debug;

use super::error::{RemoteError, RemoteResult};
use super::{RemoteClient, SyncRequest, SyncResponse};
use crate::config::Config;

/// Longest error body kept in a `Rejected` message
const MAX_ERROR_BODY: usize = 200;

/// Remote client speaking the sync API over HTTPS
#[derive(Debug, Clone)]
pub struct HttpRemote {
    client: Client,
    base_url: String,
    /// `None` until an api token is configured; every call then fails
    token: Option<String>,
    timeout: Duration,
}

impl HttpRemote {
    /// Create a client for `base_url` authenticated with `token`
    pub fn new(
        base_url: impl Into<String>,
        token: Option<String>,
        timeout: Duration,
    ) -> RemoteResult<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(concat!("todosync/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| RemoteError::NotConfigured(e.to_string()))?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            token,
            timeout,
        })
    }

    /// Create a client from the application configuration.
    ///
    /// A missing token is not an error here so cache-only commands still
    /// work; it is reported by the first remote call instead.
    pub fn from_config(config: &Config) -> RemoteResult<Self> {
        let token = config.api_token.clone().filter(|t| !t.is_empty());
        Self::new(&config.api_url, token, config.request_timeout())
    }

    fn token(&self) -> RemoteResult<&str> {
        self.token.as_deref().ok_or_else(|| {
            RemoteError::NotConfigured(
                "api_token is not set (todosync config set api_token <token>)".to_string(),
            )
        })
    }

    fn sync_url(&self) -> String {
        format!("{}/sync", self.base_url)
    }
}

/// Form fields for a request; empty lists are left out
fn form_fields(request: &SyncRequest) -> RemoteResult<Vec<(&'static str, String)>> {
    let mut fields = vec![("sync_token", request.sync_token.clone())];

    if !request.resource_types.is_empty() {
        let types = serde_json::to_string(&request.resource_types)
            .map_err(|e| RemoteError::Decode(e.to_string()))?;
        fields.push(("resource_types", types));
    }
    if !request.commands.is_empty() {
        let commands = serde_json::to_string(&request.commands)
            .map_err(|e| RemoteError::Decode(e.to_string()))?;
        fields.push(("commands", commands));
    }

    Ok(fields)
}

fn truncate(s: &str, max_len: usize) -> String {
    match s.char_indices().nth(max_len) {
        Some((idx, _)) => format!("{}...", &s[..idx]),
        None => s.to_string(),
    }
}

impl RemoteClient for HttpRemote {
    async fn sync(&self, request: SyncRequest) -> RemoteResult<SyncResponse> {
        let token = self.token()?;
        let fields = form_fields(&request)?;
        debug!(
            "POST {} token={} resources={} commands={}",
            self.sync_url(),
            request.sync_token,
            request.resource_types.len(),
            request.commands.len()
        );

        let response = self
            .client
            .post(self.sync_url())
            .bearer_auth(token)
            .form(&fields)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    RemoteError::Timeout(self.timeout)
                } else {
                    RemoteError::Unavailable(e.to_string())
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(RemoteError::Rejected {
                status: status.as_u16(),
                message: truncate(body.trim(), MAX_ERROR_BODY),
            });
        }

        response
            .json::<SyncResponse>()
            .await
            .map_err(|e| RemoteError::Decode(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::remote::{Command, ALL_RESOURCES};

    #[test]
    fn test_form_fields_full_sync() {
        let fields = form_fields(&SyncRequest::full(&ALL_RESOURCES)).unwrap();
        assert_eq!(fields[0], ("sync_token", "*".to_string()));
        assert_eq!(
            fields[1],
            (
                "resource_types",
                r#"["projects","sections","items"]"#.to_string()
            )
        );
        assert_eq!(fields.len(), 2);
    }

    #[test]
    fn test_form_fields_write_only() {
        let request = SyncRequest::write(vec![Command::item_close("5")]);
        let fields = form_fields(&request).unwrap();

        assert!(fields.iter().all(|(name, _)| *name != "resource_types"));
        let (_, commands) = fields.iter().find(|(name, _)| *name == "commands").unwrap();
        assert!(commands.contains("item_close"));
    }

    #[tokio::test]
    async fn test_missing_token_fails_on_first_call() {
        let remote = HttpRemote::from_config(&Config::default()).unwrap();
        let err = remote
            .sync(SyncRequest::full(&ALL_RESOURCES))
            .await
            .unwrap_err();
        assert!(matches!(err, RemoteError::NotConfigured(_)));
    }

    #[test]
    fn test_from_config_url() {
        let config = Config {
            api_token: Some("secret".to_string()),
            api_url: "https://example.com/api/".to_string(),
            ..Config::default()
        };
        let remote = HttpRemote::from_config(&config).unwrap();
        assert_eq!(remote.sync_url(), "https://example.com/api/sync");
    }

    #[test]
    fn test_truncate() {
        assert_eq!(truncate("short", 10), "short");
        assert_eq!(truncate("this is a long string", 7), "this is...");
    }
}
