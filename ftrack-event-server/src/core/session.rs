/*!
Login check against the ftrack JSON API
*/

use std::time::Duration;

use ftrack_endpoints::ServerUrl;
use serde_json::{Value, json};
use tracing::{debug, info};

use crate::error::EventServerError;

/// Verify that `user` can log into `server` with `api_key`
pub async fn validate_credentials(
    server: &ServerUrl,
    user: &str,
    api_key: &str,
    timeout: Duration,
) -> Result<(), EventServerError> {
    if user.trim().is_empty() {
        return Err(EventServerError::MissingUsername);
    }
    if api_key.trim().is_empty() {
        return Err(EventServerError::MissingApiKey);
    }

    let client = reqwest::Client::builder().timeout(timeout).build()?;
    let response = client
        .post(server.api_url())
        .header("ftrack-user", user)
        .header("ftrack-api-key", api_key)
        .json(&json!([{ "action": "query_server_information" }]))
        .send()
        .await?;

    let status = response.status();
    if !status.is_success() {
        return Err(EventServerError::LoginRejected {
            user: user.to_string(),
            reason: format!("server answered {status}"),
        });
    }

    let body: Value = response.json().await?;
    if body.get("exception").is_some() {
        let reason = body
            .get("content")
            .and_then(Value::as_str)
            .unwrap_or("unknown error")
            .to_string();
        return Err(EventServerError::LoginRejected {
            user: user.to_string(),
            reason,
        });
    }

    debug!("Server information: {}", body);
    info!("Credentials of \"{}\" are valid", user);
    Ok(())
}
