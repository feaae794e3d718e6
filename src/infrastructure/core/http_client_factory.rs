use anyhow::{Context, Result};
use reqwest::{Client, Url};
use reqwest_middleware::{ClientBuilder, ClientWithMiddleware};
use reqwest_retry::{RetryTransientMiddleware, policies::ExponentialBackoff};
use std::time::Duration;

/// Transport-level knobs for outbound HTTP. Job-level retries are separate.
#[derive(Debug, Clone, Copy)]
pub struct HttpClientSettings {
    pub max_retries: u32,
    pub timeout: Duration,
    pub connect_timeout: Duration,
}

impl Default for HttpClientSettings {
    fn default() -> Self {
        Self {
            max_retries: 3,
            timeout: Duration::from_secs(30),
            connect_timeout: Duration::from_secs(10),
        }
    }
}

pub struct HttpClientFactory;

impl HttpClientFactory {
    /// Client with transient-error retry middleware (exponential backoff).
    pub fn create_client(settings: HttpClientSettings) -> ClientWithMiddleware {
        let retry_policy =
            ExponentialBackoff::builder().build_with_max_retries(settings.max_retries);

        let client = Client::builder()
            .pool_max_idle_per_host(5)
            .timeout(settings.timeout)
            .connect_timeout(settings.connect_timeout)
            .build()
            .unwrap_or_else(|_| Client::new());

        ClientBuilder::new(client)
            .with(RetryTransientMiddleware::new_with_policy(retry_policy))
            .build()
    }
}

/// Appends URL-encoded query parameters to `base_url`.
///
/// `ClientWithMiddleware` has no `.query()`, so requests are built from a
/// complete URL.
pub fn build_url_with_query<K, V>(base_url: &str, params: &[(K, V)]) -> Result<Url>
where
    K: AsRef<str>,
    V: AsRef<str>,
{
    let pairs = params.iter().map(|(k, v)| (k.as_ref(), v.as_ref()));
    Url::parse_with_params(base_url, pairs)
        .with_context(|| format!("Invalid request URL: {}", base_url))
}
