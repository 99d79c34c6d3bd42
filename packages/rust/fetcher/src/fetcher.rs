//! Paced HTTP fetcher for registry company pages.
//!
//! One [`PageFetcher`] owns one `reqwest::Client`. Workers each build their
//! own fetcher and keep it for their whole lifetime, so connections are reused
//! but never shared between workers.

use std::time::Duration;

use reqwest::header::{ACCEPT, ACCEPT_LANGUAGE, HeaderMap, HeaderValue};
use reqwest::{Client, StatusCode};
use tracing::{debug, instrument};
use url::Url;

use siren_enrich_shared::{EnrichError, FetchConfig, Result, Siren};

/// Maximum number of redirects followed per request.
const MAX_REDIRECTS: usize = 5;

/// Fetches one company page per identifier and pauses after every attempt.
#[derive(Debug)]
pub struct PageFetcher {
    client: Client,
    base_url: Url,
    pace: Duration,
}

impl PageFetcher {
    /// Build a fetcher with its own HTTP client.
    pub fn new(config: &FetchConfig) -> Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(
            ACCEPT,
            HeaderValue::from_static("text/html,application/xhtml+xml;q=0.9,*/*;q=0.8"),
        );
        headers.insert(
            ACCEPT_LANGUAGE,
            HeaderValue::from_str(&config.accept_language).map_err(|e| {
                EnrichError::config(format!(
                    "invalid Accept-Language '{}': {e}",
                    config.accept_language
                ))
            })?,
        );

        let client = Client::builder()
            .user_agent(config.user_agent.as_str())
            .default_headers(headers)
            .redirect(reqwest::redirect::Policy::limited(MAX_REDIRECTS))
            .timeout(config.timeout)
            .build()
            .map_err(|e| EnrichError::Network(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            base_url: config.base_url.clone(),
            pace: config.pace,
        })
    }

    /// URL of the company page for `siren`.
    pub fn page_url(&self, siren: &Siren) -> Result<Url> {
        self.base_url
            .join(siren.as_str())
            .map_err(|e| EnrichError::config(format!("cannot build page URL for {siren}: {e}")))
    }

    /// Fetch the page for `siren`.
    ///
    /// Returns `Ok(None)` on HTTP 404. Any other failure is an error the caller
    /// may record and retry in a later run. Whatever the outcome, the pacing
    /// delay is slept before returning.
    #[instrument(skip_all, fields(%siren))]
    pub async fn fetch(&self, siren: &Siren) -> Result<Option<String>> {
        let result = self.fetch_once(siren).await;

        if !self.pace.is_zero() {
            tokio::time::sleep(self.pace).await;
        }

        result
    }

    async fn fetch_once(&self, siren: &Siren) -> Result<Option<String>> {
        let url = self.page_url(siren)?;
        debug!(%url, "fetching company page");

        let response = self
            .client
            .get(url.as_str())
            .send()
            .await
            .map_err(|e| EnrichError::Network(format!("{url}: {e}")))?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            debug!(%url, "company not found");
            return Ok(None);
        }
        if !status.is_success() {
            return Err(EnrichError::Network(format!("{url}: HTTP {status}")));
        }

        let body = response
            .text()
            .await
            .map_err(|e| EnrichError::Network(format!("{url}: body read failed: {e}")))?;

        Ok(Some(body))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, Request, ResponseTemplate};

    fn config_for(server: &MockServer, pace: Duration) -> FetchConfig {
        FetchConfig::default()
            .with_base_url(&format!("{}/entreprise", server.uri()))
            .unwrap()
            .with_pace(pace)
    }

    fn siren(s: &str) -> Siren {
        Siren::parse(s).unwrap()
    }

    /// Exact header comparison; the stock matcher splits values on commas.
    fn header_is(name: &'static str, expected: String) -> impl Fn(&Request) -> bool + Send + Sync + 'static {
        move |req: &Request| {
            req.headers
                .get(name)
                .and_then(|v| v.to_str().ok())
                .is_some_and(|v| v == expected)
        }
    }

    #[test]
    fn page_url_appends_identifier() {
        let config = FetchConfig::default();
        let fetcher = PageFetcher::new(&config).unwrap();
        let url = fetcher.page_url(&siren("552100554")).unwrap();
        assert_eq!(url.as_str(), "https://www.pappers.fr/entreprise/552100554");
    }

    #[test]
    fn rejects_invalid_language_header() {
        let config = FetchConfig {
            accept_language: "fr\nFR".into(),
            ..FetchConfig::default()
        };
        assert!(PageFetcher::new(&config).is_err());
    }

    #[tokio::test]
    async fn fetch_returns_body_and_sends_browser_headers() {
        let server = MockServer::start().await;
        let config = config_for(&server, Duration::ZERO);

        Mock::given(method("GET"))
            .and(path("/entreprise/552100554"))
            .and(header_is("user-agent", config.user_agent.clone()))
            .and(header_is("accept-language", config.accept_language.clone()))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>ok</html>"))
            .expect(1)
            .mount(&server)
            .await;

        let fetcher = PageFetcher::new(&config).unwrap();
        let body = fetcher.fetch(&siren("552100554")).await.unwrap();
        assert_eq!(body.as_deref(), Some("<html>ok</html>"));
    }

    #[tokio::test]
    async fn not_found_is_empty_not_error() {
        let server = MockServer::start().await;
        Mock::given(path("/entreprise/000000000"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let fetcher = PageFetcher::new(&config_for(&server, Duration::ZERO)).unwrap();
        let result = fetcher.fetch(&siren("000000000")).await.unwrap();
        assert!(result.is_none());
    }

    #[tokio::test]
    async fn server_error_is_recoverable_failure() {
        let server = MockServer::start().await;
        Mock::given(path("/entreprise/111111111"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let fetcher = PageFetcher::new(&config_for(&server, Duration::ZERO)).unwrap();
        let err = fetcher.fetch(&siren("111111111")).await.unwrap_err();
        assert!(matches!(err, EnrichError::Network(_)));
        assert!(err.to_string().contains("503"));
    }

    #[tokio::test]
    async fn timeout_is_recoverable_failure() {
        let server = MockServer::start().await;
        Mock::given(path("/entreprise/222222222"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_string("late")
                    .set_delay(Duration::from_secs(2)),
            )
            .mount(&server)
            .await;

        let config = FetchConfig {
            timeout: Duration::from_millis(200),
            ..config_for(&server, Duration::ZERO)
        };
        let fetcher = PageFetcher::new(&config).unwrap();
        let err = fetcher.fetch(&siren("222222222")).await.unwrap_err();
        assert!(matches!(err, EnrichError::Network(_)));
    }

    #[tokio::test]
    async fn pacing_applies_after_every_outcome() {
        let server = MockServer::start().await;
        Mock::given(path("/entreprise/333333333"))
            .respond_with(ResponseTemplate::new(200).set_body_string("page"))
            .mount(&server)
            .await;
        Mock::given(path("/entreprise/444444444"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;
        Mock::given(path("/entreprise/555555555"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let pace = Duration::from_millis(150);
        let fetcher = PageFetcher::new(&config_for(&server, pace)).unwrap();

        for id in ["333333333", "444444444", "555555555"] {
            let started = Instant::now();
            let _ = fetcher.fetch(&siren(id)).await;
            assert!(started.elapsed() >= pace, "no pause after {id}");
        }
    }

    #[tokio::test]
    async fn connection_failure_is_recoverable() {
        // Nothing listens on the discard port.
        let config = FetchConfig::default()
            .with_base_url("http://127.0.0.1:9/entreprise")
            .unwrap()
            .with_pace(Duration::ZERO);
        let fetcher = PageFetcher::new(&config).unwrap();
        let err = fetcher.fetch(&siren("666666666")).await.unwrap_err();
        assert!(matches!(err, EnrichError::Network(_)));
    }
}
