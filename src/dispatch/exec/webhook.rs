// webhook: notify an endpoint about the renewal

use crate::adapters::http;
use crate::dispatch::ActionContext;
use crate::model::action::{WebhookMethod, WebhookPayload};
use crate::model::DispatchMode;
use crate::Result;
use chrono::Utc;
use reqwest::Method;
use std::collections::HashMap;

pub async fn run(
    ctx: &ActionContext<'_>,
    mode: DispatchMode,
    url: &str,
    method: WebhookMethod,
    payload: &WebhookPayload,
    headers: &HashMap<String, String>,
) -> Result<String> {
    let method = match method {
        WebhookMethod::Post => Method::POST,
        WebhookMethod::Put => Method::PUT,
        WebhookMethod::Patch => Method::PATCH,
    };

    if mode == DispatchMode::Simulate {
        http::probe(ctx.http, url).await?;
        return Ok(format!("Would {} webhook {}", method, url));
    }

    let mut request = ctx.http.request(method.clone(), url);
    for (name, value) in headers {
        request = request.header(name, value);
    }

    request = match payload {
        WebhookPayload::Json => {
            let cert = ctx.cert;
            request.json(&serde_json::json!({
                "event": "certificate.renewed",
                "name": cert.name,
                "fingerprint": cert.fingerprint,
                "common_name": cert.common_name(),
                "subject": cert.subject,
                "valid_from": cert.valid_from,
                "valid_to": cert.valid_to,
                "days_remaining": cert.days_remaining(Utc::now()),
            }))
        }
        WebhookPayload::Raw { body } => request.body(ctx.expand(body)),
    };

    let response = request.send().await?;
    let status = response.status();
    if status.is_success() {
        Ok(format!("Webhook {} returned {}", url, status))
    } else {
        let body = response.text().await.unwrap_or_default();
        Err(http::status_to_error("webhook", status, body))
    }
}
