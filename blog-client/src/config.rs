use std::time::Duration;

use secrecy::SecretString;
use server_wake::WAKE_THRESHOLD;
use url::Url;

/// API root used when nothing else is configured.
pub const DEFAULT_BASE_URL: &str = "http://localhost:8080/api";

/// Settings for an [`ApiClient`](crate::ApiClient).
#[derive(Debug)]
pub struct ClientConfig {
    /// Root of the API; request paths are appended to it.
    pub base_url: Url,
    /// Bearer token sent with every request when set.
    pub token: Option<SecretString>,
    /// How long the client may stay continuously busy before it reports the
    /// server as waking up.
    pub wake_threshold: Duration,
    /// Transport timeout per request. `None` waits for the server however
    /// long it takes to wake.
    pub request_timeout: Option<Duration>,
}

impl ClientConfig {
    pub fn new(base_url: Url) -> Self {
        Self {
            base_url,
            token: None,
            wake_threshold: WAKE_THRESHOLD,
            request_timeout: None,
        }
    }

    pub fn with_token(mut self, token: impl Into<SecretString>) -> Self {
        self.token = Some(token.into());
        self
    }

    pub fn with_wake_threshold(mut self, threshold: Duration) -> Self {
        self.wake_threshold = threshold;
        self
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = Some(timeout);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use secrecy::ExposeSecret;

    #[test]
    fn defaults() {
        let config = ClientConfig::new(Url::parse(DEFAULT_BASE_URL).unwrap());
        assert_eq!(config.base_url.as_str(), DEFAULT_BASE_URL);
        assert!(config.token.is_none());
        assert_eq!(config.wake_threshold, Duration::from_millis(2000));
        assert_eq!(config.request_timeout, None);
    }

    #[test]
    fn token_is_redacted_in_debug_output() {
        let config = ClientConfig::new(Url::parse(DEFAULT_BASE_URL).unwrap()).with_token("s3cr3t".to_owned());
        assert_eq!(config.token.as_ref().unwrap().expose_secret(), "s3cr3t");
        assert!(!format!("{config:?}").contains("s3cr3t"));
    }
}
