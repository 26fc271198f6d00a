//! Per-locale weave-build scheduler.
//!
//! [`DirScheduler`] drives weave builds for one tree: localization-repo
//! changes trigger the touched locale, and an en-US change on the English
//! branch fans out to every locale, discovered from the repository index
//! when no explicit list is configured. Unlike comparison builds there is
//! no coalescing: every trigger submits immediately, tracking the default
//! line instead of pinning revisions.

use crate::loader::DEFAULT_FETCH_TIMEOUT;
use lingua_core::Result;
use lingua_core::change::Change;
use lingua_core::ports::{BuildSink, TextFetcher};
use lingua_core::request::{SourceStamp, WeaveParams, WeaveRequest};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Locale code of the English reference.
const EN_US: &str = "en-US";

/// Scheduler for per-locale weave builds of one tree.
pub struct DirScheduler {
    tree: String,
    /// Localization branch path.
    branch: String,
    /// English branch path; defaults to the localization branch.
    en_branch: String,
    builders: Vec<String>,
    repourl: String,
    /// Explicit locale list; `None` discovers locales from the repository
    /// index on en-US changes.
    locales: Option<Vec<String>>,
    fetcher: Arc<dyn TextFetcher>,
    sink: Arc<dyn BuildSink>,
    fetch_timeout: Duration,
}

impl DirScheduler {
    pub fn new(
        tree: impl Into<String>,
        branch: impl Into<String>,
        builders: Vec<String>,
        repourl: impl Into<String>,
        fetcher: Arc<dyn TextFetcher>,
        sink: Arc<dyn BuildSink>,
    ) -> Self {
        let branch = branch.into();
        Self {
            tree: tree.into(),
            en_branch: branch.clone(),
            branch,
            builders,
            repourl: repourl.into(),
            locales: None,
            fetcher,
            sink,
            fetch_timeout: DEFAULT_FETCH_TIMEOUT,
        }
    }

    pub fn with_en_branch(mut self, en_branch: impl Into<String>) -> Self {
        self.en_branch = en_branch.into();
        self
    }

    pub fn with_locales(mut self, locales: Vec<String>) -> Self {
        self.locales = Some(locales);
        self
    }

    pub fn with_fetch_timeout(mut self, timeout: Duration) -> Self {
        self.fetch_timeout = timeout;
        self
    }

    /// Classify one change and submit the weave builds it triggers.
    pub async fn add_change(&self, change: &Change) -> Result<()> {
        if change.branch != self.branch && change.branch != self.en_branch {
            debug!(branch = %change.branch, "not our branch");
            return Ok(());
        }
        let Some(locale) = change.resolved_locale() else {
            return Ok(());
        };
        if locale == EN_US && change.branch == self.en_branch {
            match self.locales.clone() {
                Some(locales) => {
                    for locale in locales {
                        self.queue_build(&locale, change).await;
                    }
                }
                None => self.fan_out_from_index(change).await,
            }
            return Ok(());
        }
        if change.branch != self.branch {
            return Ok(());
        }
        if let Some(locales) = &self.locales
            && !locales.iter().any(|l| l == locale)
        {
            return Ok(());
        }
        self.queue_build(locale, change).await;
        Ok(())
    }

    /// Fetch the repository index to discover the locales to trigger.
    /// Fetch failure degrades this fan-out only.
    async fn fan_out_from_index(&self, change: &Change) {
        let url = format!("{}{}?style=raw", self.repourl, self.branch);
        let fetched = self.fetcher.fetch(&url, self.fetch_timeout).await;
        match fetched {
            Ok(text) => {
                for locale in parse_repo_index(&text) {
                    if locale == EN_US {
                        continue;
                    }
                    self.queue_build(&locale, change).await;
                }
            }
            Err(error) => {
                warn!(tree = %self.tree, url = %url, %error, "repository index fetch failed");
            }
        }
    }

    /// Submit one weave build. Submission failure degrades this locale
    /// only.
    async fn queue_build(&self, locale: &str, change: &Change) {
        let request = WeaveRequest {
            builders: self.builders.clone(),
            reason: format!("{} {}", self.tree, locale),
            stamp: SourceStamp::for_changes(None, vec![change.clone()]),
            params: WeaveParams {
                tree: self.tree.clone(),
                branch: self.branch.clone(),
                en_branch: self.en_branch.clone(),
                repourl: self.repourl.clone(),
                locale: locale.to_string(),
            },
        };
        if let Err(error) = self.sink.submit_weave(request).await {
            warn!(tree = %self.tree, locale, %error, "weave submission failed");
        }
    }
}

/// Parse an hg repository index (`?style=raw`): one repository path per
/// whitespace-separated entry, the locale being the path segment before
/// the trailing slash. Entries without enough segments are skipped.
pub fn parse_repo_index(text: &str) -> Vec<String> {
    text.split_whitespace()
        .filter_map(|entry| {
            let mut segments = entry.rsplitn(3, '/');
            segments.next()?;
            segments.next().map(str::to_string)
        })
        .collect()
}
