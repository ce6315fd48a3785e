use std::collections::BTreeMap;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use sentry::types::Dsn;
use serde::{Deserialize, Deserializer, de};
use tracing::level_filters::LevelFilter;
use url::Url;

/// Controls the log format
#[derive(Clone, Copy, Debug, Eq, PartialEq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Auto detect (pretty for tty, simplified for other)
    Auto,
    /// With colors
    Pretty,
    /// Simplified log output
    Simplified,
    /// Dump out JSON lines
    Json,
}

/// Controls the logging system.
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct Logging {
    /// The log level for docsearch.
    #[serde(deserialize_with = "deserialize_level_filter")]
    pub level: LevelFilter,
    /// Controls the log format.
    pub format: LogFormat,
    /// When set to true, backtraces are forced on.
    pub enable_backtraces: bool,
}

impl Default for Logging {
    fn default() -> Self {
        Logging {
            level: LevelFilter::INFO,
            format: LogFormat::Auto,
            enable_backtraces: true,
        }
    }
}

/// Control the metrics.
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct Metrics {
    /// host/port of statsd instance
    pub statsd: Option<String>,
    /// The prefix that should be added to all metrics.
    pub prefix: String,
    /// A map containing custom tags and their values.
    ///
    /// These tags will be appended to every metric.
    pub custom_tags: BTreeMap<String, String>,
}

impl Default for Metrics {
    fn default() -> Self {
        Metrics {
            statsd: env::var("STATSD_SERVER").ok(),
            prefix: "docsearch".into(),
            custom_tags: BTreeMap::new(),
        }
    }
}

/// Where the documentation index is fetched from, and how long it is kept.
#[derive(Clone, Debug, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct DocsConfig {
    /// The JSON index mapping identifiers to their documentation.
    pub index_url: Url,
    /// How long a fetched index is served before it is revalidated.
    #[serde(with = "humantime_serde")]
    pub ttl: Duration,
    /// The base URL that the `url` field of index entries is relative to.
    pub link_base: Url,
}

impl Default for DocsConfig {
    fn default() -> Self {
        DocsConfig {
            index_url: Url::parse("https://tweaked.cc/index.json").unwrap(),
            ttl: Duration::from_secs(60),
            link_base: Url::parse("https://tweaked.cc/").unwrap(),
        }
    }
}

#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Configuration for internal logging.
    pub logging: Logging,

    /// Configuration for reporting metrics to a statsd instance.
    pub metrics: Metrics,

    /// DSN to report internal errors to
    pub sentry_dsn: Option<Dsn>,

    /// The documentation index to search.
    pub docs: DocsConfig,

    /// The directory containing the FAQ markdown files.
    pub faq_dir: PathBuf,

    /// The timeout for establishing a connection to the documentation server.
    #[serde(with = "humantime_serde")]
    pub connect_timeout: Duration,

    /// The timeout for fetching the documentation index, including the connection.
    #[serde(with = "humantime_serde")]
    pub max_download_timeout: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            logging: Logging::default(),
            metrics: Metrics::default(),
            sentry_dsn: None,
            docs: DocsConfig::default(),
            faq_dir: PathBuf::from("faqs"),
            connect_timeout: Duration::from_secs(1),
            max_download_timeout: Duration::from_secs(30),
        }
    }
}

impl Config {
    pub fn get(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => Self::from_reader(
                fs::File::open(path).context("failed to open configuration file")?,
            ),
            None => Ok(Config::default()),
        }
    }

    fn from_reader(mut reader: impl std::io::Read) -> Result<Self> {
        let mut config = String::new();
        reader
            .read_to_string(&mut config)
            .context("failed reading config file")?;
        // check for empty files explicitly
        if config.trim().is_empty() {
            anyhow::bail!("config file empty");
        }
        serde_yaml::from_str(&config).context("failed to parse config YAML")
    }
}

fn deserialize_level_filter<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> Result<LevelFilter, D::Error> {
    let level = String::deserialize(deserializer)?;
    level.parse().map_err(|_| {
        de::Error::invalid_value(
            de::Unexpected::Str(&level),
            &r#"one of "off", "error", "warn", "info", "debug", or "trace""#,
        )
    })
}
