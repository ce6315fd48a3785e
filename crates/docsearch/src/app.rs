//! The lookups offered by the command line.
use std::path::PathBuf;

use anyhow::{Context, Result};
use docsearch_service::config::Config;
use docsearch_service::download::{HttpResource, ResourceFetcher};
use docsearch_service::faq;
use docsearch_service::search::{self, ApproximateResolver, DocIndex};
use docsearch_service::utils::http::{DownloadTimeouts, create_client};
use url::Url;

use crate::output;

/// What a documentation lookup links to.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LinkKind {
    /// The rendered documentation page.
    Doc,
    /// The source code.
    Source,
}

/// Answers documentation and FAQ lookups.
///
/// The documentation index is fetched on first use and kept fresh for the configured TTL.
#[derive(Debug)]
pub struct Docsearch {
    resolver: ApproximateResolver<HttpResource<DocIndex>>,
    link_base: Url,
    faq_dir: PathBuf,
}

impl Docsearch {
    pub fn new(config: &Config) -> Result<Self> {
        let timeouts = DownloadTimeouts::from_config(config);
        let client = create_client(&timeouts).context("failed to create the HTTP client")?;
        let index = ResourceFetcher::from_url(
            client,
            config.docs.index_url.clone(),
            config.docs.ttl,
            timeouts,
            DocIndex::from_json,
        );

        Ok(Self {
            resolver: ApproximateResolver::new(index),
            link_base: config.docs.link_base.clone(),
            faq_dir: config.faq_dir.clone(),
        })
    }

    /// Looks up `query` in the documentation index and links to the result.
    pub async fn lookup(&self, kind: LinkKind, query: &str) -> Result<String> {
        let result = self
            .resolver
            .resolve(query)
            .await
            .context("failed to fetch the documentation index")?;

        let output = match kind {
            LinkKind::Doc => output::format_match(&result, query, |record| {
                search::doc_link(&self.link_base, record)
            }),
            LinkKind::Source => output::format_match(&result, query, search::source_link),
        };
        Ok(output)
    }

    /// Searches the FAQs for `pattern`.
    ///
    /// FAQs are read from disk on every search, so edits show up without a restart.
    pub fn faq(&self, pattern: &str) -> Result<String> {
        let faqs = faq::load_dir(&self.faq_dir)?;
        let found = faq::search(&faqs, pattern).context("invalid search pattern")?;
        Ok(output::format_faqs(&found))
    }
}
