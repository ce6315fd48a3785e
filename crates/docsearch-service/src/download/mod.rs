//! Support to keep a decoded copy of an HTTP resource fresh.
//!
//! A [`ResourceFetcher`] is a [`TimedCache`] whose refresh step is a conditional `GET` against
//! the resource's origin. The origin's `ETag` is sent back as `If-None-Match`, so an unchanged
//! resource is neither transferred nor decoded again.

use std::error::Error;
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::future::BoxFuture;
use parking_lot::Mutex;
use reqwest::{Client, StatusCode, Url, header};

use crate::caching::{CacheEntry, CacheError, Refresh, TimedCache};
use crate::utils::http::DownloadTimeouts;

/// Decodes a response body into the cached value.
pub type Decoder<T> = Box<dyn Fn(&[u8]) -> CacheEntry<T> + Send + Sync>;

/// A cached HTTP resource, decoded into a `T`.
pub type ResourceFetcher<T> = TimedCache<HttpResource<T>>;

/// The refresh step of a [`ResourceFetcher`].
///
/// Failures fall back to the previously decoded value whenever there is one; only a failure
/// without any previous value is reported, as [`CacheError::NoPriorValue`].
pub struct HttpResource<T> {
    client: Client,
    url: Url,
    timeouts: DownloadTimeouts,
    decode: Decoder<T>,
    /// The `ETag` of the last successfully decoded response.
    etag: Mutex<Option<String>>,
}

impl<T> fmt::Debug for HttpResource<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HttpResource")
            .field("url", &self.url.as_str())
            .field("timeouts", &self.timeouts)
            .field("etag", &*self.etag.lock())
            .finish()
    }
}

impl<T> HttpResource<T> {
    pub fn new<F>(client: Client, url: Url, timeouts: DownloadTimeouts, decode: F) -> Self
    where
        F: Fn(&[u8]) -> CacheEntry<T> + Send + Sync + 'static,
    {
        Self {
            client,
            url,
            timeouts,
            decode: Box::new(decode),
            etag: Mutex::new(None),
        }
    }

    /// The revalidation token that will be sent with the next request, if any.
    pub fn etag(&self) -> Option<String> {
        self.etag.lock().clone()
    }

    fn request_error(&self, error: reqwest::Error) -> CacheError {
        if error.is_timeout() {
            CacheError::Timeout(self.timeouts.max_download)
        } else {
            CacheError::download_error(&error)
        }
    }

    /// Performs one conditional request, without falling back to `previous` on errors.
    async fn fetch(&self, previous: Option<&Arc<T>>) -> CacheEntry<Arc<T>> {
        tracing::info!(url = %self.url, "Fetching resource");

        let mut builder = self.client.get(self.url.clone());
        if let Some(etag) = self.etag() {
            builder = builder.header(header::IF_NONE_MATCH, etag);
        }

        let response = builder.send().await.map_err(|e| self.request_error(e))?;

        match response.status() {
            StatusCode::NOT_MODIFIED => match previous {
                Some(previous) => {
                    tracing::debug!(url = %self.url, "ETag matched, keeping previous value");
                    metric!(counter("resource.fetch") += 1, "status" => "not_modified");
                    Ok(Arc::clone(previous))
                }
                None => {
                    // We cannot revalidate something we do not have, so ask for the full body next time.
                    self.etag.lock().take();
                    Err(CacheError::DownloadError(
                        "origin reported the resource as not modified, but none is cached".into(),
                    ))
                }
            },
            status if status.is_success() => {
                let etag = response
                    .headers()
                    .get(header::ETAG)
                    .and_then(|value| value.to_str().ok())
                    .map(str::to_owned);
                let body = response.bytes().await.map_err(|e| self.request_error(e))?;
                let value = (self.decode)(&body[..])?;

                tracing::debug!(url = %self.url, size = body.len(), "Finished request");
                metric!(counter("resource.fetch") += 1, "status" => "fresh");

                *self.etag.lock() = etag;
                Ok(Arc::new(value))
            }
            status => Err(CacheError::DownloadError(status.to_string())),
        }
    }
}

impl<T: Send + Sync + 'static> Refresh for HttpResource<T> {
    type Item = Arc<T>;

    fn refresh(&self, previous: Option<Arc<T>>) -> BoxFuture<'_, CacheEntry<Arc<T>>> {
        Box::pin(async move {
            let start = Instant::now();
            let result = self.fetch(previous.as_ref()).await;
            metric!(timer("resource.fetch.duration") = start.elapsed());

            let error = match result {
                Ok(value) => return Ok(value),
                Err(error) => error,
            };

            match previous {
                Some(previous) => {
                    tracing::error!(
                        error = &error as &dyn Error,
                        url = %self.url,
                        "Failed to refresh resource, serving the previous value"
                    );
                    metric!(counter("resource.fetch") += 1, "status" => "stale");
                    Ok(previous)
                }
                None => {
                    tracing::error!(
                        error = &error as &dyn Error,
                        url = %self.url,
                        "Failed to fetch resource"
                    );
                    metric!(counter("resource.fetch") += 1, "status" => "failed");
                    Err(CacheError::NoPriorValue(Box::new(error)))
                }
            }
        })
    }
}

impl<T: Send + Sync + 'static> TimedCache<HttpResource<T>> {
    /// Creates a cache of the resource at `url`, decoded with `decode` and kept for `ttl`.
    pub fn from_url<F>(
        client: Client,
        url: Url,
        ttl: Duration,
        timeouts: DownloadTimeouts,
        decode: F,
    ) -> Self
    where
        F: Fn(&[u8]) -> CacheEntry<T> + Send + Sync + 'static,
    {
        Self::new(HttpResource::new(client, url, timeouts, decode), ttl)
    }
}
