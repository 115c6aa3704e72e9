// api-call: hit an arbitrary HTTP endpoint after renewal

use crate::adapters::http;
use crate::dispatch::ActionContext;
use crate::error::EngineError;
use crate::model::action::BasicAuth;
use crate::model::DispatchMode;
use crate::Result;
use reqwest::Method;
use std::collections::HashMap;

pub async fn run(
    ctx: &ActionContext<'_>,
    mode: DispatchMode,
    url: &str,
    method: &str,
    headers: &HashMap<String, String>,
    body: Option<&str>,
    basic_auth: &Option<BasicAuth>,
) -> Result<String> {
    let method: Method = method
        .to_uppercase()
        .parse()
        .map_err(|_| EngineError::invalid(format!("Unknown HTTP method '{}'", method)))?;

    if mode == DispatchMode::Simulate {
        http::probe(ctx.http, url).await?;
        return Ok(format!("Would {} {}", method, url));
    }

    let mut request = ctx.http.request(method.clone(), url);
    for (name, value) in headers {
        request = request.header(name, value);
    }
    if let Some(auth) = basic_auth {
        let password = auth.password.reveal(ctx.cipher)?;
        request = request.basic_auth(&auth.username, Some(password));
    }
    if let Some(body) = body {
        request = request.body(ctx.expand(body));
    }

    let response = request.send().await?;
    let status = response.status();
    if status.is_success() {
        Ok(format!("{} {} returned {}", method, url, status))
    } else {
        let body = response.text().await.unwrap_or_default();
        Err(http::status_to_error("api-call", status, body))
    }
}
