// ABOUTME: Immutable export configuration shared by client, exporter and transcoder
// ABOUTME: Defaults are the fixed pacing, retry and checkpoint constants

/// Tunables for a run. Built once and handed to every component.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportConfig {
    /// Service origin, e.g. `https://penzu.com`
    pub base_url: String,
    pub chrome_debug_port: u16,
    pub min_delay_ms: u64,
    pub max_delay_ms: u64,
    pub max_retries: u32,
    pub retry_backoff_ms: u64,
    pub image_delay_ms: u64,
    pub checkpoint_every: usize,
    /// Size of the `next`/`previous` window requested per entry
    pub page_window: u32,
}

impl Default for ExportConfig {
    fn default() -> Self {
        ExportConfig {
            base_url: "https://penzu.com".into(),
            chrome_debug_port: 9222,
            min_delay_ms: 2000,
            max_delay_ms: 3000,
            max_retries: 3,
            retry_backoff_ms: 5000,
            image_delay_ms: 500,
            checkpoint_every: 10,
            page_window: 10,
        }
    }
}

impl ExportConfig {
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn with_debug_port(mut self, port: u16) -> Self {
        self.chrome_debug_port = port;
        self
    }

    /// Zero every timed wait. Retry and checkpoint counts are unchanged.
    pub fn without_delays(mut self) -> Self {
        self.min_delay_ms = 0;
        self.max_delay_ms = 0;
        self.retry_backoff_ms = 0;
        self.image_delay_ms = 0;
        self
    }

    /// Backoff before retry number `attempt` (1-based).
    pub fn backoff_ms(&self, attempt: u32) -> u64 {
        self.retry_backoff_ms * u64::from(attempt)
    }

    /// Host part of the service origin, used to recognise the browser tab.
    pub fn service_domain(&self) -> &str {
        let without_scheme = self
            .base_url
            .split_once("://")
            .map(|(_, rest)| rest)
            .unwrap_or(&self.base_url);
        without_scheme.split('/').next().unwrap_or(without_scheme)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_fixed_constants() {
        let config = ExportConfig::default();
        assert_eq!(config.min_delay_ms, 2000);
        assert_eq!(config.max_delay_ms, 3000);
        assert_eq!(config.max_retries, 3);
        assert_eq!(config.retry_backoff_ms, 5000);
        assert_eq!(config.image_delay_ms, 500);
        assert_eq!(config.checkpoint_every, 10);
        assert_eq!(config.chrome_debug_port, 9222);
    }

    #[test]
    fn test_backoff_is_linear() {
        let config = ExportConfig::default();
        assert_eq!(config.backoff_ms(1), 5000);
        assert_eq!(config.backoff_ms(2), 10000);
        assert_eq!(config.backoff_ms(3), 15000);
    }

    #[test]
    fn test_without_delays_keeps_retry_cap() {
        let config = ExportConfig::default().without_delays();
        assert_eq!(config.max_delay_ms, 0);
        assert_eq!(config.backoff_ms(3), 0);
        assert_eq!(config.max_retries, 3);
        assert_eq!(config.checkpoint_every, 10);
    }

    #[test]
    fn test_service_domain() {
        assert_eq!(ExportConfig::default().service_domain(), "penzu.com");
        let local = ExportConfig::default().with_base_url("http://127.0.0.1:4000/");
        assert_eq!(local.base_url, "http://127.0.0.1:4000");
        assert_eq!(local.service_domain(), "127.0.0.1:4000");
    }
}
