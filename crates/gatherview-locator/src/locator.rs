//! Archive discovery over directory-listing trees.

use std::collections::HashSet;
use std::sync::Arc;

use futures::future::BoxFuture;
use futures::FutureExt;
use tracing::{debug, info, warn};
use url::Url;

use crate::config::LocatorConfig;
use crate::error::{LocatorError, LocatorResult};
use crate::listing::{HttpListingSource, Link, ListingPage, ListingSource};
use crate::resolve::{filename_for, parse_url, resolve_against};

/// Link text used by the artifact browser for the artifacts directory.
const BROWSER_LINK_TEXT: &str = "artifacts/";

/// Link text used by CI run pages that point at the artifact browser.
const RUN_PAGE_LINK_TEXT: &str = "Artifacts";

/// Result of one locator run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactLocation {
    /// Archive handed to the viewer (the first one discovered).
    pub archive_url: Url,
    /// Every archive discovered, in crawl order.
    pub dump_urls: Vec<Url>,
}

impl ArtifactLocation {
    /// Build a location from crawl results. Returns `None` if nothing was found.
    #[must_use]
    pub fn from_urls(dump_urls: Vec<Url>) -> Option<Self> {
        let archive_url = dump_urls.first()?.clone();
        Some(Self {
            archive_url,
            dump_urls,
        })
    }

    /// Collision-free local names for each discovered archive.
    #[must_use]
    pub fn local_names(&self) -> Vec<(String, &Url)> {
        self.dump_urls
            .iter()
            .map(|url| (filename_for(url), url))
            .collect()
    }
}

/// Finds diagnostic archives below a CI run's listing pages.
pub struct ArtifactLocator {
    source: Arc<dyn ListingSource>,
    config: LocatorConfig,
}

impl ArtifactLocator {
    /// Create a locator over an arbitrary listing source.
    pub fn new(source: Arc<dyn ListingSource>, config: LocatorConfig) -> Self {
        Self { source, config }
    }

    /// Create a locator that fetches listings over HTTP.
    pub fn http(config: LocatorConfig) -> LocatorResult<Self> {
        let source = HttpListingSource::new(&config)?;
        Ok(Self::new(Arc::new(source), config))
    }

    /// Locator configuration.
    #[must_use]
    pub const fn config(&self) -> &LocatorConfig {
        &self.config
    }

    /// Find the archives for a CI run.
    ///
    /// Resolves the artifacts directory, crawls it for the configured target
    /// file names and fails with [`LocatorError::NotFound`] if none exist.
    pub async fn locate(&self, run_url: &str) -> LocatorResult<ArtifactLocation> {
        let root = self.locate_artifacts_root(run_url).await?;
        info!(url = %root, "found artifacts url");

        let dump_urls = self
            .crawl_for_archives(&root, &self.config.target_filenames)
            .await?;

        ArtifactLocation::from_urls(dump_urls)
            .ok_or_else(|| LocatorError::not_found(root.as_str(), "no dump archives found"))
    }

    /// Resolve the URL of the "artifacts" directory for a CI run.
    ///
    /// Artifact-browser pages link the directory directly. CI run pages only
    /// link to the browser, so that link is followed and the search repeats
    /// there, at most `max_redirects` times.
    pub async fn locate_artifacts_root(&self, listing_url: &str) -> LocatorResult<Url> {
        let mut url = parse_url(listing_url)?;

        for _ in 0..=self.config.max_redirects {
            info!(url = %url, "finding artifacts url");
            let page = self.source.fetch(&url).await?;

            if let Some(link) = page.find_link_containing(BROWSER_LINK_TEXT) {
                return resolve_link(&page, link);
            }

            let Some(link) = page.find_link_containing(RUN_PAGE_LINK_TEXT) else {
                return Err(LocatorError::not_found(
                    url.as_str(),
                    "no artifacts link on page",
                ));
            };

            url = resolve_link(&page, link)?;
            debug!(url = %url, "following CI run page to artifact browser");
        }

        Err(LocatorError::not_found(
            url.as_str(),
            format!(
                "artifact browser not reached after {} pages",
                self.config.max_redirects + 1
            ),
        ))
    }

    /// Depth-first search below `root` for links named like one of `targets`.
    ///
    /// Results are in document order. A subdirectory that cannot be fetched
    /// contributes nothing; a tree deeper than `max_depth` fails the crawl.
    pub async fn crawl_for_archives(
        &self,
        root: &Url,
        targets: &[String],
    ) -> LocatorResult<Vec<Url>> {
        let page = self.source.fetch(root).await?;
        let mut visited = HashSet::from([root.to_string()]);
        self.crawl_page(page, targets, 0, &mut visited).await
    }

    fn crawl_page<'a>(
        &'a self,
        page: ListingPage,
        targets: &'a [String],
        depth: usize,
        visited: &'a mut HashSet<String>,
    ) -> BoxFuture<'a, LocatorResult<Vec<Url>>> {
        async move {
            debug!(url = %page.url, depth, "processing listing");
            let mut found = Vec::new();

            for link in &page.links {
                let Some(href) = link.href.as_deref() else {
                    continue;
                };

                if targets.iter().any(|target| target == link.trimmed_text()) {
                    match resolve_against(&page.url, href) {
                        Ok(url) => found.push(url),
                        Err(e) => warn!(error = %e, page = %page.url, "couldn't build archive url"),
                    }
                }

                if !link.is_directory() || self.config.is_ignored(href) {
                    continue;
                }

                let sub_url = match resolve_against(&page.url, href) {
                    Ok(url) => url,
                    Err(e) => {
                        warn!(error = %e, page = %page.url, "couldn't build directory url");
                        continue;
                    }
                };

                if self.config.is_ignored(sub_url.as_str())
                    || !visited.insert(sub_url.to_string())
                {
                    continue;
                }

                if depth >= self.config.max_depth {
                    return Err(LocatorError::not_found(
                        sub_url.as_str(),
                        format!("listing tree deeper than {} levels", self.config.max_depth),
                    ));
                }

                let sub_page = match self.source.fetch(&sub_url).await {
                    Ok(sub_page) => sub_page,
                    Err(e) => {
                        warn!(error = %e, url = %sub_url, "encountered error while crawling");
                        continue;
                    }
                };

                found.extend(self.crawl_page(sub_page, targets, depth + 1, visited).await?);
            }

            Ok(found)
        }
        .boxed()
    }
}

impl std::fmt::Debug for ArtifactLocator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ArtifactLocator")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

fn resolve_link(page: &ListingPage, link: &Link) -> LocatorResult<Url> {
    let href = link.href.as_deref().ok_or_else(|| {
        LocatorError::not_found(
            page.url.as_str(),
            format!("no href on {:?} link", link.trimmed_text()),
        )
    })?;
    resolve_against(&page.url, href)
}
