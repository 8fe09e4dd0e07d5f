use std::time::Duration;

use anyhow::{Context, Result};
use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use reqwest::{Client, Response, StatusCode};
use thiserror::Error;
use tracing::{debug, warn};

use crate::config::FetchSettings;

/// Everything outside `[A-Za-z0-9_.~-]` and `:/?&=%` gets percent-encoded.
const URL_SAFE: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'_')
    .remove(b'.')
    .remove(b'-')
    .remove(b'~')
    .remove(b':')
    .remove(b'/')
    .remove(b'?')
    .remove(b'&')
    .remove(b'=')
    .remove(b'%');

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("HTTP status {0}")]
    Status(StatusCode),
}

/// A fetched text resource.
#[derive(Debug, Clone)]
pub struct Page {
    /// Final URL after redirects.
    pub url: String,
    pub body: String,
}

/// HTTP GET with retries and a rotating list of client identities.
///
/// Never fails outward: once every identity has given up the caller gets `None`.
pub struct Fetcher {
    clients: Vec<Client>,
    settings: FetchSettings,
}

impl Fetcher {
    pub fn new(settings: &FetchSettings) -> Result<Self> {
        anyhow::ensure!(
            !settings.user_agents.is_empty(),
            "fetch.user_agents must list at least one client identity"
        );

        let roots = match &settings.ca_bundle {
            Some(path) => {
                let pem = std::fs::read(path)
                    .with_context(|| format!("Failed to read CA bundle {:?}", path))?;
                reqwest::Certificate::from_pem_bundle(&pem)
                    .with_context(|| format!("Invalid CA bundle {:?}", path))?
            }
            None => Vec::new(),
        };

        let clients = settings
            .user_agents
            .iter()
            .map(|agent| {
                let mut builder = Client::builder().user_agent(agent.as_str());
                for cert in &roots {
                    builder = builder.add_root_certificate(cert.clone());
                }
                builder.build()
            })
            .collect::<Result<Vec<_>, _>>()
            .context("Failed to build HTTP client")?;

        Ok(Fetcher {
            clients,
            settings: settings.clone(),
        })
    }

    /// GET `url`, trying each identity in order. `None` when all of them fail.
    pub async fn get(&self, url: &str, timeout: Duration) -> Option<Response> {
        let url = encode_url(url);
        let identity_backoff = Duration::from_millis(self.settings.identity_backoff_ms);

        for (idx, client) in self.clients.iter().enumerate() {
            match self.get_with_retry(client, &url, timeout).await {
                Ok(resp) => return Some(resp),
                Err(e) => {
                    warn!("fetch fail UA#{} {}: {}", idx, url, e);
                    tokio::time::sleep(identity_backoff).await;
                }
            }
        }
        None
    }

    async fn get_with_retry(
        &self,
        client: &Client,
        url: &str,
        timeout: Duration,
    ) -> Result<Response, FetchError> {
        let max_retries = self.settings.max_retries;
        let mut attempt = 0u32;

        loop {
            let result = client.get(url).timeout(timeout).send().await;

            let should_retry = match &result {
                Ok(resp) => self
                    .settings
                    .retry_statuses
                    .contains(&resp.status().as_u16()),
                Err(e) => e.is_timeout() || e.is_connect() || e.is_request(),
            };

            if !should_retry || attempt >= max_retries {
                let resp = result?;
                let status = resp.status();
                if status.is_client_error() || status.is_server_error() {
                    return Err(FetchError::Status(status));
                }
                return Ok(resp);
            }

            let backoff =
                Duration::from_millis(self.settings.retry_backoff_ms * 2u64.pow(attempt));
            debug!(
                "Retrying {} (attempt {}/{}), backing off {:.1}s",
                url,
                attempt + 1,
                max_retries,
                backoff.as_secs_f64()
            );
            tokio::time::sleep(backoff).await;
            attempt += 1;
        }
    }

    /// Fetch an HTML/XML page as text with the page timeout.
    pub async fn fetch_page(&self, url: &str) -> Option<Page> {
        let resp = self.get(url, self.settings.page_timeout()).await?;
        let final_url = resp.url().to_string();
        match resp.text().await {
            Ok(body) => Some(Page {
                url: final_url,
                body,
            }),
            Err(e) => {
                warn!("failed to read body of {}: {}", url, e);
                None
            }
        }
    }

    /// Download a document, reading chunks until the byte cap is passed.
    pub async fn fetch_document(&self, url: &str) -> Option<Vec<u8>> {
        let mut resp = self.get(url, self.settings.document_timeout()).await?;
        let cap = self.settings.max_document_bytes;
        let mut content = Vec::new();

        loop {
            match resp.chunk().await {
                Ok(Some(chunk)) => {
                    if push_capped(&mut content, &chunk, cap) {
                        debug!("document {} exceeded {} bytes, truncated", url, cap);
                        break;
                    }
                }
                Ok(None) => break,
                Err(e) => {
                    warn!("document download interrupted {}: {}", url, e);
                    break;
                }
            }
        }

        if content.is_empty() {
            None
        } else {
            Some(content)
        }
    }
}

/// Append a chunk; `true` once the accumulated size is over `cap`.
fn push_capped(buf: &mut Vec<u8>, chunk: &[u8], cap: usize) -> bool {
    buf.extend_from_slice(chunk);
    buf.len() > cap
}

pub fn encode_url(url: &str) -> String {
    utf8_percent_encode(url, URL_SAFE).to_string()
}

#[cfg(test)]
pub(crate) fn fast_settings(agents: &[&str]) -> FetchSettings {
    FetchSettings {
        user_agents: agents.iter().map(|a| a.to_string()).collect(),
        retry_backoff_ms: 0,
        identity_backoff_ms: 0,
        page_timeout_secs: 5,
        document_timeout_secs: 5,
        ..FetchSettings::default()
    }
}

// ── Tests ──
