//! Change classification and pending-build coalescing.
//!
//! [`AppScheduler`] is the main entry point: the host feeds it changes,
//! it classifies them against the tree registry, accrues (tree, locale)
//! build triggers, and flushes them as batched comparison requests with
//! resolved revision pins.
//!
//! Classification is a strictly serial pipeline: while tree-metadata loads
//! are in flight the scheduler is busy and incoming changes queue in
//! arrival order; [`AppScheduler::process_loads`] awaits the loads,
//! registers the reloaded trees, runs the English-repo continuation, and
//! replays the backlog in original order.

use crate::loader::{DEFAULT_FETCH_TIMEOUT, parse_locales};
use crate::registry::{BranchData, TreeRegistry};
use lingua_core::change::Change;
use lingua_core::config::BuildsConfig;
use lingua_core::ports::{BuildSink, ForestStore, PushStore, TextFetcher, TreeLoadHandle};
use lingua_core::request::{
    BranchPin, CompareParams, CompareRequest, DEFAULT_LINE, SourceStamp, TreeLoadRequest,
};
use lingua_core::tree::{EN_ROLE, L10N_ROLE, Tree};
use lingua_core::{Error, Result};
use std::collections::{BTreeSet, HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Marker path segment identifying English source files.
const EN_US_MARKER: &str = "locales/en-US";

/// English-repo continuation carried across a tree-load wait. Holds the
/// branch data captured at classification time: the reload may rename the
/// branch out of the rebuilt index, and the re-check set must drain either
/// way.
struct EnUsCheck {
    data: BranchData,
    change: Change,
}

/// Tree-load wait state.
struct LoadWait {
    handles: Vec<TreeLoadHandle>,
    continuation: Option<EnUsCheck>,
}

enum LoadState {
    Idle,
    Loading(LoadWait),
}

/// Scheduler for app compare-locales builds.
pub struct AppScheduler {
    /// Builder names comparison requests target.
    builders: Vec<String>,
    /// Builder name for tree-metadata loads.
    tree_builder: String,
    /// Builds descriptor; `None` runs without startup loads (tests).
    descriptor: Option<BuildsConfig>,
    registry: TreeRegistry,
    fetcher: Arc<dyn TextFetcher>,
    pushes: Arc<dyn PushStore>,
    sink: Arc<dyn BuildSink>,
    fetch_timeout: Duration,
    /// Per-(tree, locale) contributing changes awaiting flush.
    pendings: HashMap<(String, String), Vec<Change>>,
    flush_scheduled: bool,
    load: LoadState,
    /// Changes queued while a tree load is in flight, in arrival order.
    backlog: VecDeque<Change>,
}

impl AppScheduler {
    pub fn new(
        builders: Vec<String>,
        tree_builder: impl Into<String>,
        descriptor: Option<BuildsConfig>,
        fetcher: Arc<dyn TextFetcher>,
        forests: Arc<dyn ForestStore>,
        pushes: Arc<dyn PushStore>,
        sink: Arc<dyn BuildSink>,
    ) -> Self {
        Self {
            builders,
            tree_builder: tree_builder.into(),
            descriptor,
            registry: TreeRegistry::new(forests),
            fetcher,
            pushes,
            sink,
            fetch_timeout: DEFAULT_FETCH_TIMEOUT,
            pendings: HashMap::new(),
            flush_scheduled: false,
            load: LoadState::Idle,
            backlog: VecDeque::new(),
        }
    }

    pub fn with_fetch_timeout(mut self, timeout: Duration) -> Self {
        self.fetch_timeout = timeout;
        self
    }

    /// Submit a tree-load request per descriptor section. The scheduler is
    /// busy until [`process_loads`](Self::process_loads) drives the batch
    /// to completion.
    pub async fn start(&mut self) -> Result<()> {
        let Some(descriptor) = self.descriptor.clone() else {
            return Ok(());
        };
        debug!("starting l10n scheduler");
        let mut handles = Vec::new();
        for (name, config) in descriptor.trees() {
            let request = TreeLoadRequest {
                builder: self.tree_builder.clone(),
                tree: name.to_string(),
                config: Some(config.clone()),
                stamp: SourceStamp::default(),
            };
            handles.push(self.sink.submit_tree_load(request).await?);
        }
        if !handles.is_empty() {
            self.load = LoadState::Loading(LoadWait {
                handles,
                continuation: None,
            });
        }
        Ok(())
    }

    /// Whether tree loads are in flight (incoming changes will queue).
    pub fn is_loading(&self) -> bool {
        matches!(self.load, LoadState::Loading(_))
    }

    /// Register a loaded tree directly. Exposed for hosts that run tree
    /// loads outside the dispatch protocol.
    pub async fn add_tree(&mut self, tree: Tree) -> Result<bool> {
        self.registry.add_tree(tree).await
    }

    /// Main entry point: classify one change, or queue it while busy.
    pub async fn add_change(&mut self, change: Change) -> Result<()> {
        if self.is_loading() {
            debug!(branch = %change.branch, "tree load in flight, queueing change");
            self.backlog.push_back(change);
            return Ok(());
        }
        self.classify(change).await
    }

    /// Await outstanding tree loads and replay the backlog in arrival
    /// order. Returns once the scheduler is idle with an empty backlog.
    pub async fn process_loads(&mut self) -> Result<()> {
        loop {
            match std::mem::replace(&mut self.load, LoadState::Idle) {
                LoadState::Loading(wait) => {
                    for handle in wait.handles {
                        match handle.await {
                            Ok(Some(tree)) => {
                                let name = tree.name.clone();
                                if let Err(error) = self.registry.add_tree(tree).await {
                                    warn!(tree = %name, %error, "tree registration failed");
                                }
                            }
                            Ok(None) => warn!("tree load failed"),
                            Err(_) => warn!("tree load executor dropped"),
                        }
                    }
                    debug!("pending trees got built");
                    if let Some(check) = wait.continuation {
                        self.check_en_us(&check.data, &check.change).await?;
                    }
                }
                LoadState::Idle => match self.backlog.pop_front() {
                    Some(change) => self.classify(change).await?,
                    None => return Ok(()),
                },
            }
        }
    }

    /// Decision tree for one change: English-repo changes go through the
    /// manifest and en-US checks, localization-repo changes through the
    /// directory-prefix index.
    async fn classify(&mut self, change: Change) -> Result<()> {
        let Some(locale) = change.resolved_locale().map(str::to_string) else {
            return self.classify_english(change).await;
        };

        let l10n = self.registry.l10n_snapshot();
        let Some(dirs) = l10n.get(&change.branch) else {
            debug!(branch = %change.branch, "not our l10n branch");
            return Ok(());
        };
        let mut trees = BTreeSet::new();
        for file in &change.files {
            trees.extend(dirs.trees_for_path(file).map(str::to_string));
        }
        for name in trees {
            let known = self
                .registry
                .tree(&name)
                .is_some_and(|t| t.locales.iter().any(|l| l == &locale));
            if known {
                self.compare_build(&name, &locale, vec![change.clone()]);
            }
        }
        Ok(())
    }

    async fn classify_english(&mut self, change: Change) -> Result<()> {
        let branches = self.registry.branches_snapshot();
        let Some(data) = branches.get(&change.branch) else {
            debug!(branch = %change.branch, "not our branch");
            return Ok(());
        };

        // manifest changes force a metadata reload before en-US checks
        let mut reloads = BTreeSet::new();
        for file in &change.files {
            if let Some(trees) = data.inis.get(file) {
                reloads.extend(trees.iter().cloned());
            }
        }
        if !reloads.is_empty() {
            let mut handles = Vec::new();
            for name in &reloads {
                let request = TreeLoadRequest {
                    builder: self.tree_builder.clone(),
                    tree: name.clone(),
                    config: self.descriptor.as_ref().and_then(|d| d.get(name)).cloned(),
                    stamp: SourceStamp::for_changes(
                        Some(change.branch.clone()),
                        vec![change.clone()],
                    ),
                };
                handles.push(self.sink.submit_tree_load(request).await?);
            }
            debug!(count = reloads.len(), "manifest change, reloading trees");
            self.load = LoadState::Loading(LoadWait {
                handles,
                continuation: Some(EnUsCheck {
                    data: data.clone(),
                    change,
                }),
            });
            return Ok(());
        }

        self.check_en_us(data, &change).await
    }

    /// English-repo continuation: re-check updated trees, refresh
    /// all-locales files, and fan en-US changes out to every known locale
    /// of the owning trees.
    async fn check_en_us(&mut self, data: &BranchData, change: &Change) -> Result<()> {
        debug!(branch = %change.branch, "checking en-US");
        let mut all_locales = BTreeSet::new();
        // pick up trees updated by registry rebuilds
        let mut en_us: BTreeSet<String> = self.registry.take_recheck().into_iter().collect();

        for file in &change.files {
            if let Some(trees) = data.all_locales.get(file) {
                all_locales.extend(trees.iter().cloned());
            }
            if let Some(idx) = file.find(EN_US_MARKER) {
                let module = file[..idx].trim_end_matches('/');
                if module.is_empty() {
                    // single-module layout: the tree is the repository root
                    for name in &data.toplevel_trees {
                        let locales = self
                            .registry
                            .tree(name)
                            .map(|t| t.locales.clone())
                            .unwrap_or_default();
                        for locale in locales {
                            self.compare_build(name, &locale, vec![change.clone()]);
                        }
                    }
                } else if let Some(trees) = data.dirs.get(module) {
                    en_us.extend(trees.iter().cloned());
                }
            }
        }

        for name in all_locales {
            self.refresh_all_locales(&name, change).await;
        }

        for name in en_us {
            let locales = self
                .registry
                .tree(&name)
                .map(|t| t.locales.clone())
                .unwrap_or_default();
            for locale in locales {
                self.compare_build(&name, &locale, vec![change.clone()]);
            }
        }
        Ok(())
    }

    /// Re-fetch a tree's all-locales file and compare-build the change for
    /// every newly discovered locale. Fetch failure degrades this tree
    /// only.
    async fn refresh_all_locales(&mut self, name: &str, change: &Change) {
        let Some(tree) = self.registry.tree(name) else {
            return;
        };
        let Some(all_path) = tree.all_locales.clone() else {
            return;
        };
        let revision = change.revision.as_deref().unwrap_or(DEFAULT_LINE);
        let url = format!(
            "{}/{}/raw-file/{}/{}",
            tree.repo,
            tree.en_branch(),
            revision,
            all_path
        );
        let fetched = self.fetcher.fetch(&url, self.fetch_timeout).await;
        match fetched {
            Ok(text) => {
                let locales = parse_locales(&text);
                match self.registry.update_locales(name, locales) {
                    Ok(added) => {
                        debug!(tree = name, added = added.len(), "all-locales refreshed");
                        for locale in added {
                            self.compare_build(name, &locale, vec![change.clone()]);
                        }
                    }
                    Err(error) => warn!(tree = name, %error, "locale update failed"),
                }
            }
            Err(error) => warn!(tree = name, url = %url, %error, "all-locales fetch failed"),
        }
    }

    /// Accrue changes for a (tree, locale) build and schedule a flush.
    fn compare_build(&mut self, tree: &str, locale: &str, changes: Vec<Change>) {
        self.pendings
            .entry((tree.to_string(), locale.to_string()))
            .or_default()
            .extend(changes);
        if !self.flush_scheduled {
            self.flush_scheduled = true;
            debug!(tree, locale, "scheduled buildset flush");
        }
    }

    /// Whether a flush is scheduled for the next tick.
    pub fn flush_scheduled(&self) -> bool {
        self.flush_scheduled
    }

    /// Unschedule a pending flush without submitting (teardown hook).
    pub fn cancel_flush(&mut self) {
        self.flush_scheduled = false;
    }

    /// Pending builds awaiting flush, for host inspection.
    pub fn pendings(&self) -> &HashMap<(String, String), Vec<Change>> {
        &self.pendings
    }

    pub fn registry(&self) -> &TreeRegistry {
        &self.registry
    }

    /// Flush every pending (tree, locale) batch as one comparison request
    /// each, clearing the pending map. Resolution or submission failure
    /// degrades the affected build only.
    pub async fn submit_buildsets(&mut self) -> Result<()> {
        let pendings = std::mem::take(&mut self.pendings);
        self.flush_scheduled = false;
        for ((tree_name, locale), changes) in pendings {
            let Some(tree) = self.registry.tree(&tree_name).cloned() else {
                warn!(tree = %tree_name, "pending build for unregistered tree, dropping");
                continue;
            };
            match self.build_params(&tree, &locale, &changes).await {
                Ok(params) => {
                    let request = CompareRequest {
                        builders: self.builders.clone(),
                        stamp: SourceStamp::for_changes(None, changes),
                        params,
                    };
                    if let Err(error) = self.sink.submit_compare(request).await {
                        warn!(tree = %tree_name, locale = %locale, %error, "compare submission failed");
                    }
                }
                Err(error) => {
                    warn!(tree = %tree_name, locale = %locale, %error, "revision resolution failed, dropping build");
                }
            }
        }
        Ok(())
    }

    /// Resolve the parameter bundle for one (tree, locale) batch: per
    /// branch role the concrete revision to pin, plus manifest and forest
    /// paths.
    async fn build_params(
        &self,
        tree: &Tree,
        locale: &str,
        changes: &[Change],
    ) -> Result<CompareParams> {
        let mut srctime = changes.iter().filter_map(|c| c.when).max();
        let mut revisions = std::collections::BTreeMap::new();
        let mut en_path = None;

        for (role, branch) in &tree.branches {
            let relative = if role == L10N_ROLE {
                format!("{branch}/{locale}")
            } else {
                branch.clone()
            };
            let repo = self.pushes.repository(&relative).await?;
            let revision = match self
                .pushes
                .latest_push_at_or_before(&repo, DEFAULT_LINE, srctime)
                .await?
            {
                Some(push) => {
                    if let Some(date) = push.date {
                        srctime = Some(srctime.map_or(date, |s| s.max(date)));
                    }
                    self.pushes.tip_revision_on_line(&push, DEFAULT_LINE).await?
                }
                // no qualifying push: newest known changeset on the line
                None => {
                    self.pushes
                        .fallback_revision_on_line(&repo, DEFAULT_LINE)
                        .await?
                }
            };
            if role == EN_ROLE {
                en_path = Some(repo.relative_path.clone());
            }
            revisions.insert(
                role.clone(),
                BranchPin {
                    branch: repo.relative_path,
                    revision,
                },
            );
        }

        let en_path = en_path
            .ok_or_else(|| Error::Internal(format!("tree {} has no en branch", tree.name)))?;
        let ini = tree
            .l10n_inis
            .get(tree.en_branch())
            .and_then(|inis| inis.first())
            .ok_or_else(|| {
                Error::Internal(format!("tree {} has no manifest on its en branch", tree.name))
            })?;
        let l10nbase = self.registry.forest_path(tree.l10n_branch()).await?;

        Ok(CompareParams {
            tree: tree.name.clone(),
            l10nbase,
            locale: locale.to_string(),
            inipath: format!("{en_path}/{ini}"),
            srctime,
            revisions,
        })
    }
}
