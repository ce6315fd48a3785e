use std::time::Duration;

use reqwest::redirect;

use crate::config::Config;

/// The `User-Agent` sent with every request to an origin.
pub const USER_AGENT: &str = concat!("docsearch/", env!("CARGO_PKG_VERSION"));

/// Timeouts applied to every request made by a [`reqwest::Client`] from [`create_client`].
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct DownloadTimeouts {
    /// The timeout for establishing a connection.
    pub connect: Duration,
    /// Global timeout for one request, including reading the body.
    pub max_download: Duration,
}

impl DownloadTimeouts {
    pub fn from_config(config: &Config) -> Self {
        Self {
            connect: config.connect_timeout,
            max_download: config.max_download_timeout,
        }
    }
}

impl Default for DownloadTimeouts {
    fn default() -> Self {
        Self {
            connect: Duration::from_secs(1),
            max_download: Duration::from_secs(30),
        }
    }
}

/// Creates a [`reqwest::Client`] with the provided timeouts.
///
/// The client is cheap to clone and shares its connection pool between clones. Dropping the
/// last clone releases all pooled connections.
pub fn create_client(timeouts: &DownloadTimeouts) -> reqwest::Result<reqwest::Client> {
    reqwest::ClientBuilder::new()
        .gzip(true)
        .brotli(true)
        .deflate(true)
        .user_agent(USER_AGENT)
        .connect_timeout(timeouts.connect)
        .timeout(timeouts.max_download)
        .pool_idle_timeout(Duration::from_secs(30))
        .redirect(redirect::Policy::limited(5))
        .build()
}
