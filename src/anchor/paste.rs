//! Paste witness
//!
//! Publishes the anchor as an unlisted paste through a Pastebin-compatible
//! API. With credentials configured the paste is owned by that account; the
//! user key from the first login is reused afterwards.

use async_trait::async_trait;
use reqwest::Client;
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::anchor::{AnchorPayload, Witness};
use crate::config::PasteConfig;
use crate::error::{LedgerError, Result};

const KIND: &str = "paste";

pub struct PasteWitness {
    config: PasteConfig,
    http_client: Client,
    user_key: Mutex<Option<String>>,
}

impl PasteWitness {
    pub fn new(config: PasteConfig) -> Self {
        Self {
            config,
            http_client: Client::new(),
            user_key: Mutex::new(None),
        }
    }

    async fn user_key(&self) -> Result<Option<String>> {
        let (username, password) = match (&self.config.username, &self.config.password) {
            (Some(username), Some(password)) => (username, password),
            _ => return Ok(None),
        };

        let mut cached = self.user_key.lock().await;
        if let Some(key) = cached.as_ref() {
            return Ok(Some(key.clone()));
        }

        let form = [
            ("api_dev_key", self.config.api_dev_key.as_str()),
            ("api_user_name", username.as_str()),
            ("api_user_password", password.as_str()),
        ];
        let key = self.post(&self.config.login_url, &form).await?;
        info!("Logged in to paste service as {}", username);
        *cached = Some(key.clone());
        Ok(Some(key))
    }

    async fn post(&self, url: &str, form: &[(&str, &str)]) -> Result<String> {
        let response = self
            .http_client
            .post(url)
            .form(form)
            .send()
            .await
            .map_err(|e| LedgerError::witness(KIND, e))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| LedgerError::witness(KIND, e))?;
        let body = body.trim().to_string();

        if !status.is_success() || body.to_ascii_lowercase().starts_with("bad api request") {
            return Err(LedgerError::witness(
                KIND,
                format!("paste service rejected request ({}): {}", status, body),
            ));
        }
        Ok(body)
    }
}

#[async_trait]
impl Witness for PasteWitness {
    fn kind(&self) -> &'static str {
        KIND
    }

    async fn publish(&self, payload: &AnchorPayload) -> Result<String> {
        if self.config.api_dev_key.is_empty() {
            return Err(LedgerError::witness(KIND, "api_dev_key is not configured"));
        }

        let user_key = self.user_key().await?;
        let code = serde_json::to_string_pretty(payload)?;
        let name = format!("ledger-anchor {}", payload.timestamp);

        let mut form = vec![
            ("api_dev_key", self.config.api_dev_key.as_str()),
            ("api_option", "paste"),
            ("api_paste_code", code.as_str()),
            ("api_paste_name", name.as_str()),
            ("api_paste_private", "1"),
            ("api_paste_expire_date", "N"),
        ];
        if let Some(key) = user_key.as_deref() {
            form.push(("api_user_key", key));
        }

        let url = self.post(&self.config.api_url, &form).await?;
        if !url.starts_with("http") {
            return Err(LedgerError::witness(
                KIND,
                format!("unexpected paste response: {}", url),
            ));
        }

        debug!("Paste created at {}", url);
        Ok(url)
    }
}
