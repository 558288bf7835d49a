//! Blocking webhook delivery.

use crate::collab::HttpTransport;
use anyhow::{Context, Result};
use reqwest::blocking::Client;

pub struct HttpPoster {
    client: Client,
}

impl HttpPoster {
    pub fn new() -> Self {
        Self {
            client: Client::new(),
        }
    }
}

impl Default for HttpPoster {
    fn default() -> Self {
        Self::new()
    }
}

impl HttpTransport for HttpPoster {
    fn post_json(&self, url: &str, payload: &serde_json::Value) -> Result<()> {
        let response = self
            .client
            .post(url)
            .json(payload)
            .send()
            .with_context(|| format!("POST {url} failed"))?;
        if !response.status().is_success() {
            anyhow::bail!("webhook {url} answered {}", response.status());
        }
        Ok(())
    }
}
