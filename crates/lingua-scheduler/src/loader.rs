//! Metadata loader: fetches and parses per-tree manifests.
//!
//! A tree load starts from a descriptor section, fetches the manifest
//! (`l10n.ini`) it names, and follows nested includes and the all-locales
//! discovery file. The load is complete only when no fetch remains
//! pending; a failed include or all-locales fetch degrades that branch of
//! the load with a warning, while a failed top-level fetch aborts the
//! whole load.

use futures::FutureExt;
use futures::future::BoxFuture;
use ini::Ini;
use lingua_core::config::{LocaleMode, TreeConfig};
use lingua_core::ports::TextFetcher;
use lingua_core::request::DEFAULT_LINE;
use lingua_core::tree::Tree;
use lingua_core::{Error, Result};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Default manifest fetch timeout.
pub const DEFAULT_FETCH_TIMEOUT: Duration = Duration::from_secs(5);

/// Loads tree metadata from remote manifests.
pub struct TreeLoader {
    fetcher: Arc<dyn TextFetcher>,
    timeout: Duration,
}

impl TreeLoader {
    pub fn new(fetcher: Arc<dyn TextFetcher>) -> Self {
        Self {
            fetcher,
            timeout: DEFAULT_FETCH_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Load the full metadata for one tree.
    pub async fn load(&self, name: &str, config: &TreeConfig) -> Result<Tree> {
        debug!(tree = name, repo = %config.repo, "loading manifests");
        let mut tree = config.seed_tree(name);
        let want_all = config.locales == LocaleMode::All;
        self.load_ini(
            &mut tree,
            config.repo.clone(),
            config.branch.clone(),
            config.l10n_ini.clone(),
            want_all,
        )
        .await?;
        Ok(tree)
    }

    /// Fetch and parse one manifest, recursing into its includes.
    fn load_ini<'a>(
        &'a self,
        tree: &'a mut Tree,
        repo: String,
        branch: String,
        path: String,
        want_all: bool,
    ) -> BoxFuture<'a, Result<()>> {
        async move {
            let url = manifest_url(&repo, &branch, &path);
            let content = self.fetcher.fetch(&url, self.timeout).await?;
            let ini = Ini::load_from_str(&content).map_err(|e| Error::Manifest {
                path: path.clone(),
                message: e.to_string(),
            })?;

            let mut dirs = section_list(&ini, "compare", "dirs");
            dirs.extend(section_list(&ini, "extras", "dirs"));
            let tld = ini
                .section(Some("compare"))
                .and_then(|s| s.get("tld"))
                .map(str::to_string);
            if let Some(tld) = &tld {
                // the tld is compared on its own, not as a regular dir
                dirs.retain(|d| d != tld);
            }
            if !dirs.is_empty() {
                debug!(tree = %tree.name, branch = %branch, ?dirs, "adding comparison dirs");
            }
            tree.add_data(&branch, Some(&path), &dirs, tld);

            if let Some(includes) = ini.section(Some("includes")) {
                let entries: Vec<(String, String)> = includes
                    .iter()
                    .map(|(title, rel)| (title.to_string(), rel.to_string()))
                    .collect();
                for (title, rel_path) in entries {
                    let details = ini
                        .section(Some(format!("include_{title}").as_str()))
                        .filter(|d| d.get("type") == Some("hg"));
                    let result = if let Some(details) = details {
                        let (Some(inc_repo), Some(inc_branch), Some(inc_path)) = (
                            details.get("repo"),
                            details.get("mozilla"),
                            details.get("l10n.ini"),
                        ) else {
                            warn!(tree = %tree.name, include = %title, "incomplete include section, skipping");
                            continue;
                        };
                        // register a new branch role unless the named
                        // English branch is already known to the tree
                        if !tree.knows_branch(inc_branch) {
                            tree.branches.insert(title.clone(), inc_branch.to_string());
                        }
                        self.load_ini(
                            tree,
                            inc_repo.to_string(),
                            inc_branch.to_string(),
                            inc_path.to_string(),
                            false,
                        )
                        .await
                    } else {
                        self.load_ini(tree, repo.clone(), branch.clone(), rel_path, false)
                            .await
                    };
                    if let Err(error) = result {
                        warn!(tree = %tree.name, include = %title, %error, "include load failed");
                    }
                }
            }

            if want_all
                && let Some(all_path) = ini.section(Some("general")).and_then(|s| s.get("all"))
            {
                tree.all_locales = Some(all_path.to_string());
                let all_url = manifest_url(&repo, &branch, all_path);
                match self.fetcher.fetch(&all_url, self.timeout).await {
                    Ok(text) => {
                        tree.locales = parse_locales(&text);
                        debug!(tree = %tree.name, locales = tree.locales.len(), "all-locales loaded");
                    }
                    Err(error) => {
                        warn!(tree = %tree.name, url = %all_url, %error, "all-locales load failed");
                    }
                }
            }

            Ok(())
        }
        .boxed()
    }
}

/// Raw-file URL of a path on the default line of a branch.
pub fn manifest_url(repo: &str, branch: &str, path: &str) -> String {
    format!("{repo}/{branch}/raw-file/{DEFAULT_LINE}/{path}")
}

/// Parse an all-locales file: one locale per line, first whitespace token,
/// blank lines ignored.
pub fn parse_locales(text: &str) -> Vec<String> {
    text.lines()
        .filter_map(|line| line.split_whitespace().next())
        .map(str::to_string)
        .collect()
}

fn section_list(ini: &Ini, section: &str, key: &str) -> Vec<String> {
    ini.section(Some(section))
        .and_then(|s| s.get(key))
        .map(|v| v.split_whitespace().map(str::to_string).collect())
        .unwrap_or_default()
}
