// ABOUTME: Blocking HTTP client for the Penzu journal API
// ABOUTME: Handles OAuth signing, pacing, 429 backoff, and fail-fast errors

use crate::{
    config::ExportConfig, session::SessionContext, util::truncate_str, EntryPage, Error,
    JournalInfo, Result,
};
use rand::Rng;
use reqwest::blocking::{Client, RequestBuilder};
use reqwest::StatusCode;
use std::time::Duration;
use tracing::{debug, error, warn};

const FALLBACK_USER_AGENT: &str = "penzu-export/0.1 (Rust)";

pub(crate) fn sleep_ms(ms: u64) {
    if ms > 0 {
        std::thread::sleep(Duration::from_millis(ms));
    }
}

pub struct PenzuClient {
    client: Client,
    config: ExportConfig,
    session: SessionContext,
}

impl PenzuClient {
    pub fn new(config: ExportConfig, session: SessionContext) -> Result<Self> {
        let client = Client::builder().timeout(Duration::from_secs(30)).build()?;

        Ok(PenzuClient {
            client,
            config,
            session,
        })
    }

    pub fn config(&self) -> &ExportConfig {
        &self.config
    }

    pub fn session(&self) -> &SessionContext {
        &self.session
    }

    fn user_agent(&self) -> &str {
        if self.session.user_agent.is_empty() {
            FALLBACK_USER_AGENT
        } else {
            &self.session.user_agent
        }
    }

    fn referer(&self) -> String {
        format!(
            "{}/journals/{}",
            self.config.base_url, self.session.journal_id
        )
    }

    /// Cookie, user agent and referer: what every request from the tab carries.
    fn browser_headers(&self, request: RequestBuilder) -> RequestBuilder {
        let request = request
            .header("User-Agent", self.user_agent())
            .header("Referer", self.referer());
        if self.session.cookie_header.is_empty() {
            request
        } else {
            request.header("Cookie", &self.session.cookie_header)
        }
    }

    /// Random 2-3 s wait between entry fetches.
    pub fn pace(&self) {
        if self.config.max_delay_ms > 0 {
            let sleep_ms = rand::thread_rng()
                .gen_range(self.config.min_delay_ms..=self.config.max_delay_ms);
            debug!(sleep_ms, "pacing before next entry");
            std::thread::sleep(Duration::from_millis(sleep_ms));
        }
    }

    fn get<T: serde::de::DeserializeOwned>(&self, endpoint: &str) -> Result<T> {
        let url = format!("{}{}", self.config.base_url, endpoint);
        let mut retries = 0;

        let response = loop {
            let authorization = self.session.credentials.authorization("GET", &url)?;
            let request = self
                .client
                .get(&url)
                .header("Accept", "application/json, text/plain, */*")
                .header("Accept-Language", "en-US,en;q=0.9")
                .header("Authorization", authorization)
                .header("X-Xsrf-Protection", "0");
            let response = self.browser_headers(request).send()?;

            if response.status() != StatusCode::TOO_MANY_REQUESTS {
                break response;
            }
            if retries >= self.config.max_retries {
                error!(endpoint, attempts = retries + 1, "rate limit persisted past retry cap");
                return Err(Error::RateLimited {
                    endpoint: endpoint.into(),
                    attempts: retries + 1,
                });
            }
            retries += 1;
            let backoff = self.config.backoff_ms(retries);
            warn!(
                "Rate limited (429). Waiting {}s before retry {}/{}",
                backoff / 1000,
                retries,
                self.config.max_retries
            );
            sleep_ms(backoff);
        };

        let status = response.status();
        if !status.is_success() {
            let message = response.text().unwrap_or_default();
            error!(
                endpoint,
                status = status.as_u16(),
                body = %truncate_str(&message, 500),
                "API request failed"
            );
            return Err(Error::Api {
                endpoint: endpoint.into(),
                status: status.as_u16(),
                message: truncate_str(&message, 100),
            });
        }

        // Get response text for better error messages
        let body = response.text()?;
        serde_json::from_str(&body).map_err(|e| {
            error!(
                endpoint,
                body = %truncate_str(&body, 500),
                "Failed to parse response: {}",
                e
            );
            Error::Parse(e)
        })
    }

    pub fn latest_entry_id(&self, journal_id: &str) -> Result<Option<String>> {
        let endpoint = format!("/api/journals/{}", urlencoding::encode(journal_id));
        let info: JournalInfo = self.get(&endpoint)?;
        Ok(info
            .journal
            .and_then(|j| j.last_entry_id)
            .map(|id| id.to_string()))
    }

    pub fn fetch_entry(&self, journal_id: &str, entry_id: &str) -> Result<EntryPage> {
        let window = self.config.page_window;
        let endpoint = format!(
            "/api/journals/{}/entries/{}?next={}&previous={}",
            urlencoding::encode(journal_id),
            urlencoding::encode(entry_id),
            window,
            window
        );
        self.get(&endpoint)
    }

    /// Fetch raw bytes of an embedded image. Not signed, not retried.
    pub fn download(&self, url: &str) -> Result<Vec<u8>> {
        let response = self.browser_headers(self.client.get(url)).send()?;

        let status = response.status();
        if !status.is_success() {
            return Err(Error::Api {
                endpoint: url.into(),
                status: status.as_u16(),
                message: status.canonical_reason().unwrap_or_default().into(),
            });
        }

        Ok(response.bytes()?.to_vec())
    }
}
