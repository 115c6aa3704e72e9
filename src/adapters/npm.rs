// nginx-proxy-manager API client
//
// Used by the nginx-proxy-manager deployment action in `api` mode: log in
// with operator credentials, then replace the key material of an existing
// NPM certificate record. Tokens are cached per client and refreshed once on
// a 401.

use crate::adapters::http;
use crate::error::EngineError;
use crate::Result;
use reqwest::multipart::{Form, Part};
use reqwest::Client;
use serde::Deserialize;
use tokio::sync::Mutex;

#[derive(Deserialize)]
struct TokenResponse {
    token: String,
}

pub struct NpmApiClient {
    client: Client,
    base_url: String,
    email: String,
    password: String,
    token: Mutex<Option<String>>,
}

impl NpmApiClient {
    pub fn new(client: Client, base_url: &str, email: &str, password: &str) -> Self {
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            email: email.to_string(),
            password: password.to_string(),
            token: Mutex::new(None),
        }
    }

    async fn login(&self) -> Result<String> {
        let response = self
            .client
            .post(format!("{}/api/tokens", self.base_url))
            .json(&serde_json::json!({
                "identity": self.email,
                "secret": self.password,
            }))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(http::status_to_error("nginx-proxy-manager", status, body));
        }

        let token: TokenResponse = response.json().await?;
        Ok(token.token)
    }

    async fn token(&self, force_refresh: bool) -> Result<String> {
        let mut guard = self.token.lock().await;
        if force_refresh || guard.is_none() {
            *guard = Some(self.login().await?);
        }
        Ok(guard.clone().unwrap_or_default())
    }

    /// Replace the key material of an existing NPM certificate record
    pub async fn upload_certificate(
        &self,
        certificate_id: u64,
        cert_pem: &[u8],
        key_pem: &[u8],
    ) -> Result<()> {
        let mut refreshed = false;
        loop {
            let token = self.token(refreshed).await?;
            let form = Form::new()
                .part(
                    "certificate",
                    Part::bytes(cert_pem.to_vec()).file_name("cert.pem"),
                )
                .part(
                    "certificate_key",
                    Part::bytes(key_pem.to_vec()).file_name("cert.key"),
                );

            let response = self
                .client
                .post(format!(
                    "{}/api/nginx/certificates/{}/upload",
                    self.base_url, certificate_id
                ))
                .bearer_auth(&token)
                .multipart(form)
                .send()
                .await?;

            let status = response.status();
            if status.is_success() {
                tracing::info!(certificate_id, "Replaced nginx-proxy-manager certificate");
                return Ok(());
            }
            if status == reqwest::StatusCode::UNAUTHORIZED && !refreshed {
                // Cached token expired; log in again and retry once
                refreshed = true;
                continue;
            }

            let body = response.text().await.unwrap_or_default();
            return Err(http::status_to_error("nginx-proxy-manager", status, body));
        }
    }

    /// Log in and confirm the certificate record exists
    pub async fn check(&self, certificate_id: u64) -> Result<()> {
        let token = self.token(false).await?;
        let response = self
            .client
            .get(format!(
                "{}/api/nginx/certificates/{}",
                self.base_url, certificate_id
            ))
            .bearer_auth(&token)
            .send()
            .await?;

        let status = response.status();
        if status.is_success() {
            Ok(())
        } else if status == reqwest::StatusCode::NOT_FOUND {
            Err(EngineError::AdapterRemote {
                adapter: "nginx-proxy-manager".to_string(),
                details: format!("Certificate record {} does not exist", certificate_id),
            })
        } else {
            let body = response.text().await.unwrap_or_default();
            Err(http::status_to_error("nginx-proxy-manager", status, body))
        }
    }
}
