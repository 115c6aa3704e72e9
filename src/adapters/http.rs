// Shared HTTP client for webhook, api-call and NPM deployments

use crate::error::EngineError;
use crate::Result;
use reqwest::Client;
use std::time::Duration;

const USER_AGENT: &str = concat!("certmill/", env!("CARGO_PKG_VERSION"));

/// Build the process-wide HTTP client. Per-request deadlines are applied by
/// the dispatcher, so only the connect timeout lives here.
pub fn build_client() -> Result<Client> {
    Client::builder()
        .user_agent(USER_AGENT)
        .connect_timeout(Duration::from_secs(10))
        .build()
        .map_err(|e| EngineError::Internal(format!("HTTP client init: {}", e)))
}

/// Map a non-success HTTP status onto an engine error
pub fn status_to_error(adapter: &str, status: reqwest::StatusCode, body: String) -> EngineError {
    let details = if body.is_empty() {
        format!("HTTP {}", status)
    } else {
        format!("HTTP {}: {}", status, truncate(&body, 200))
    };
    if status == reqwest::StatusCode::UNAUTHORIZED || status == reqwest::StatusCode::FORBIDDEN {
        EngineError::AdapterAuth {
            adapter: adapter.to_string(),
            details,
        }
    } else {
        EngineError::AdapterRemote {
            adapter: adapter.to_string(),
            details,
        }
    }
}

/// Cheap reachability probe used by simulate mode: resolve and connect
/// without sending the real payload.
pub async fn probe(client: &Client, url: &str) -> Result<()> {
    let response = client.head(url).send().await?;
    // Any response at all proves reachability; HEAD being rejected is fine
    tracing::debug!(url, status = %response.status(), "HTTP probe");
    Ok(())
}

fn truncate(s: &str, max: usize) -> &str {
    match s.char_indices().nth(max) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        let err = status_to_error("webhook", reqwest::StatusCode::UNAUTHORIZED, String::new());
        assert_eq!(err.kind(), "AdapterAuth");

        let err = status_to_error("webhook", reqwest::StatusCode::BAD_GATEWAY, "oops".into());
        assert_eq!(err.kind(), "AdapterRemote");
        assert!(err.to_string().contains("502"));
    }

    #[test]
    fn test_truncate_respects_char_boundaries() {
        assert_eq!(truncate("héllo", 2), "hé");
        assert_eq!(truncate("ok", 200), "ok");
    }
}
