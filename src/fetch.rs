use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use reqwest::{Client, Request, StatusCode};
use tracing::{debug, warn};
use url::Url;

use crate::error::FetchError;

const MAX_RETRIES: u32 = 2;
const BASE_BACKOFF_MS: u64 = 500;

/// Anything that can turn a URL into an HTML document.
#[async_trait]
pub trait PageSource: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<String, FetchError>;

    /// Fetch of an author detail page. Only these requests are bounded by a timeout.
    async fn fetch_detail(&self, url: &str) -> Result<String, FetchError> {
        self.fetch(url).await
    }
}

#[async_trait]
impl<T: PageSource + ?Sized> PageSource for Arc<T> {
    async fn fetch(&self, url: &str) -> Result<String, FetchError> {
        (**self).fetch(url).await
    }

    async fn fetch_detail(&self, url: &str) -> Result<String, FetchError> {
        (**self).fetch_detail(url).await
    }
}

/// Opens a fresh page source for each pipeline run.
pub trait SessionFactory: Send + Sync {
    fn open(&self) -> Result<Box<dyn PageSource>, FetchError>;
}

pub struct HttpSessionFactory {
    pub detail_timeout: Duration,
}

impl SessionFactory for HttpSessionFactory {
    fn open(&self) -> Result<Box<dyn PageSource>, FetchError> {
        Ok(Box::new(HttpSession::new(self.detail_timeout)?))
    }
}

/// HTTP session for one pipeline run. Dropping it releases the connection pool.
///
/// Listing pages are fetched without a deadline; author detail pages get `detail_timeout`
/// per request.
pub struct HttpSession {
    client: Client,
    detail_timeout: Duration,
}

impl HttpSession {
    pub fn new(detail_timeout: Duration) -> Result<Self, FetchError> {
        let client = Client::builder()
            .user_agent(concat!("quotes_scraper/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self {
            client,
            detail_timeout,
        })
    }

    fn request(&self, url: &str, timeout: Option<Duration>) -> Result<Request, FetchError> {
        let parsed = Url::parse(url).map_err(|_| FetchError::InvalidUrl(url.to_string()))?;
        let mut builder = self.client.get(parsed);
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }
        Ok(builder.build()?)
    }

    async fn fetch_once(&self, url: &str, timeout: Option<Duration>) -> Result<String, FetchError> {
        let request = self.request(url, timeout)?;
        let start = Instant::now();
        let response = self.client.execute(request).await?;
        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }
        let body = response.text().await?;
        debug!(url, bytes = body.len(), ms = start.elapsed().as_millis() as u64, "fetched");
        Ok(body)
    }
}

fn is_retryable(err: &FetchError) -> bool {
    match err {
        FetchError::Status { status, .. } => {
            *status == StatusCode::TOO_MANY_REQUESTS.as_u16() || (500..600).contains(status)
        }
        FetchError::Http(e) => e.is_timeout() || e.is_connect(),
        FetchError::InvalidUrl(_) => false,
    }
}

impl HttpSession {
    async fn fetch_with_retry(
        &self,
        url: &str,
        timeout: Option<Duration>,
    ) -> Result<String, FetchError> {
        let mut attempt = 0;
        loop {
            match self.fetch_once(url, timeout).await {
                Ok(body) => return Ok(body),
                Err(err) if attempt < MAX_RETRIES && is_retryable(&err) => {
                    let backoff = Duration::from_millis(BASE_BACKOFF_MS * 2u64.pow(attempt));
                    warn!(
                        "Fetch of {} failed (attempt {}/{}): {}, backing off {:.1}s",
                        url,
                        attempt + 1,
                        MAX_RETRIES,
                        err,
                        backoff.as_secs_f64()
                    );
                    tokio::time::sleep(backoff).await;
                    attempt += 1;
                }
                Err(err) => return Err(err),
            }
        }
    }
}

#[async_trait]
impl PageSource for HttpSession {
    async fn fetch(&self, url: &str) -> Result<String, FetchError> {
        self.fetch_with_retry(url, None).await
    }

    async fn fetch_detail(&self, url: &str) -> Result<String, FetchError> {
        self.fetch_with_retry(url, Some(self.detail_timeout)).await
    }
}

#[cfg(test)]
pub mod testing {
    use std::collections::HashMap;
    use std::sync::Mutex;

    use super::*;

    /// Serves canned documents by URL and records every request.
    #[derive(Default)]
    pub struct StaticSource {
        pages: HashMap<String, String>,
        requests: Mutex<Vec<String>>,
    }

    impl StaticSource {
        pub fn with(mut self, url: &str, html: impl Into<String>) -> Self {
            self.pages.insert(url.to_string(), html.into());
            self
        }

        pub fn requests(&self) -> Vec<String> {
            self.requests.lock().unwrap().clone()
        }
    }

    /// Hands out the same shared source for every run.
    impl SessionFactory for Arc<StaticSource> {
        fn open(&self) -> Result<Box<dyn PageSource>, FetchError> {
            Ok(Box::new(Arc::clone(self)))
        }
    }

    #[async_trait]
    impl PageSource for StaticSource {
        async fn fetch(&self, url: &str) -> Result<String, FetchError> {
            self.requests.lock().unwrap().push(url.to_string());
            self.pages
                .get(url)
                .cloned()
                .ok_or_else(|| FetchError::Status {
                    url: url.to_string(),
                    status: 404,
                })
        }
    }

    pub fn fixture(name: &str) -> String {
        std::fs::read_to_string(format!("tests/fixtures/{}.html", name)).unwrap()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retries_only_transient_statuses() {
        let status = |status| FetchError::Status {
            url: "u".into(),
            status,
        };
        assert!(is_retryable(&status(429)));
        assert!(is_retryable(&status(503)));
        assert!(!is_retryable(&status(404)));
        assert!(!is_retryable(&FetchError::InvalidUrl("x".into())));
    }

    #[test]
    fn only_detail_requests_carry_a_timeout() {
        let session = HttpSession::new(Duration::from_secs(3)).unwrap();
        let url = "https://quotes.example/author/Albert-Einstein";

        let listing = session.request("https://quotes.example/", None).unwrap();
        assert!(listing.timeout().is_none());
        let detail = session.request(url, Some(session.detail_timeout)).unwrap();
        assert_eq!(detail.timeout(), Some(&Duration::from_secs(3)));
    }

    #[test]
    fn malformed_url_is_rejected_before_sending() {
        let session = HttpSession::new(Duration::from_secs(3)).unwrap();
        assert!(matches!(
            session.request("not a url", None),
            Err(FetchError::InvalidUrl(_))
        ));
    }
}
