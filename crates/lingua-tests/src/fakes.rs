//! In-memory fakes for the scheduler's ports.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use lingua_core::ids::{ForestId, PushId, RepoId, TreeId};
use lingua_core::ports::{
    BuildSink, ForestStore, PushHandle, PushStore, RepoHandle, TextFetcher, TreeLoadHandle,
};
use lingua_core::request::{CompareRequest, TreeLoadRequest, WeaveRequest};
use lingua_core::tree::Tree;
use lingua_core::{Error, Result};
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;
use tokio::sync::oneshot;

/// Revision reported when a repository has no qualifying pushes.
pub const NULL_REVISION: &str = "000000000000";

/// Serves canned pages; unknown URLs fail, listed URLs time out.
#[derive(Default)]
pub struct FakeFetcher {
    pages: Mutex<HashMap<String, String>>,
    timeouts: Mutex<Vec<String>>,
    requests: Mutex<Vec<String>>,
}

impl FakeFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, url: impl Into<String>, body: impl Into<String>) {
        self.pages.lock().unwrap().insert(url.into(), body.into());
    }

    /// Make a URL time out instead of resolving.
    pub fn time_out(&self, url: impl Into<String>) {
        self.timeouts.lock().unwrap().push(url.into());
    }

    /// URLs fetched so far, in request order.
    pub fn requests(&self) -> Vec<String> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl TextFetcher for FakeFetcher {
    async fn fetch(&self, url: &str, timeout: Duration) -> Result<String> {
        self.requests.lock().unwrap().push(url.to_string());
        if self.timeouts.lock().unwrap().iter().any(|u| u == url) {
            return Err(Error::FetchTimeout {
                url: url.to_string(),
                timeout_ms: timeout.as_millis() as u64,
            });
        }
        self.pages.lock().unwrap().get(url).cloned().ok_or_else(|| Error::Fetch {
            url: url.to_string(),
            message: "no such page".into(),
        })
    }
}

struct RepoEntry {
    id: RepoId,
    pushes: Vec<(PushId, Option<DateTime<Utc>>)>,
    fallback: String,
}

#[derive(Default)]
struct StoreState {
    next_id: i64,
    forests: HashMap<String, ForestId>,
    forests_created: usize,
    trees: HashMap<String, (TreeId, Option<ForestId>)>,
    forest_updates: usize,
    repos: HashMap<String, RepoEntry>,
    push_revisions: HashMap<i64, String>,
}

impl StoreState {
    fn next(&mut self) -> i64 {
        self.next_id += 1;
        self.next_id
    }
}

/// In-memory metadata store implementing both `ForestStore` and
/// `PushStore`, recording write counts for idempotence assertions.
/// Repositories are created on first lookup with only the null changeset.
#[derive(Default)]
pub struct RecordingStore {
    state: Mutex<StoreState>,
}

impl RecordingStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a push to the repository at `path`.
    pub fn add_push(&self, path: &str, date: Option<DateTime<Utc>>, revision: &str) {
        let mut state = self.state.lock().unwrap();
        let id = state.next();
        let repo_id = state.next();
        let entry = state.repos.entry(path.to_string()).or_insert_with(|| RepoEntry {
            id: RepoId::new(repo_id),
            pushes: Vec::new(),
            fallback: NULL_REVISION.to_string(),
        });
        entry.pushes.push((PushId::new(id), date));
        state.push_revisions.insert(id, revision.to_string());
    }

    /// Times a forest row was created.
    pub fn forests_created(&self) -> usize {
        self.state.lock().unwrap().forests_created
    }

    /// Times a tree record was pointed at a forest.
    pub fn forest_updates(&self) -> usize {
        self.state.lock().unwrap().forest_updates
    }
}

#[async_trait]
impl ForestStore for RecordingStore {
    async fn forest_for_branch(&self, name: &str) -> Result<(ForestId, bool)> {
        let mut state = self.state.lock().unwrap();
        if let Some(id) = state.forests.get(name) {
            return Ok((*id, false));
        }
        let id = ForestId::new(state.next());
        state.forests.insert(name.to_string(), id);
        state.forests_created += 1;
        Ok((id, true))
    }

    async fn forest_path(&self, name: &str) -> Result<String> {
        Ok(name.to_string())
    }

    async fn tree_record(&self, code: &str) -> Result<(TreeId, Option<ForestId>)> {
        let mut state = self.state.lock().unwrap();
        if let Some(record) = state.trees.get(code) {
            return Ok(*record);
        }
        let id = TreeId::new(state.next());
        state.trees.insert(code.to_string(), (id, None));
        Ok((id, None))
    }

    async fn set_tree_forest(&self, tree: TreeId, forest: ForestId) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        for record in state.trees.values_mut() {
            if record.0 == tree {
                record.1 = Some(forest);
                state.forest_updates += 1;
                return Ok(());
            }
        }
        Err(Error::Store(format!("no tree record {tree}")))
    }
}

#[async_trait]
impl PushStore for RecordingStore {
    async fn repository(&self, relative_path: &str) -> Result<RepoHandle> {
        let mut state = self.state.lock().unwrap();
        let id = state.next();
        let entry = state
            .repos
            .entry(relative_path.to_string())
            .or_insert_with(|| RepoEntry {
                id: RepoId::new(id),
                pushes: Vec::new(),
                fallback: NULL_REVISION.to_string(),
            });
        Ok(RepoHandle {
            id: entry.id,
            relative_path: relative_path.to_string(),
        })
    }

    async fn latest_push_at_or_before(
        &self,
        repo: &RepoHandle,
        _line: &str,
        when: Option<DateTime<Utc>>,
    ) -> Result<Option<PushHandle>> {
        let state = self.state.lock().unwrap();
        let Some(entry) = state.repos.get(&repo.relative_path) else {
            return Ok(None);
        };
        let push = entry
            .pushes
            .iter()
            .filter(|(_, date)| match when {
                Some(when) => date.is_some_and(|d| d <= when),
                None => true,
            })
            .next_back();
        Ok(push.map(|(id, date)| PushHandle { id: *id, date: *date }))
    }

    async fn tip_revision_on_line(&self, push: &PushHandle, _line: &str) -> Result<String> {
        let state = self.state.lock().unwrap();
        state
            .push_revisions
            .get(&push.id.as_i64())
            .cloned()
            .ok_or_else(|| Error::Store(format!("no push {}", push.id)))
    }

    async fn fallback_revision_on_line(&self, repo: &RepoHandle, _line: &str) -> Result<String> {
        let state = self.state.lock().unwrap();
        Ok(state
            .repos
            .get(&repo.relative_path)
            .map(|e| e.fallback.clone())
            .unwrap_or_else(|| NULL_REVISION.to_string()))
    }
}

/// A tree-load request captured by [`FakeSink`], with its completion
/// sender.
pub struct PendingTreeLoad {
    pub request: TreeLoadRequest,
    pub resolve: oneshot::Sender<Option<Tree>>,
}

/// Captures submissions; tree loads stay pending until the test resolves
/// them.
#[derive(Default)]
pub struct FakeSink {
    compares: Mutex<Vec<CompareRequest>>,
    weaves: Mutex<Vec<WeaveRequest>>,
    tree_loads: Mutex<Vec<PendingTreeLoad>>,
}

impl FakeSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn compares(&self) -> Vec<CompareRequest> {
        self.compares.lock().unwrap().clone()
    }

    pub fn weaves(&self) -> Vec<WeaveRequest> {
        self.weaves.lock().unwrap().clone()
    }

    /// Drain the captured tree-load requests.
    pub fn take_tree_loads(&self) -> Vec<PendingTreeLoad> {
        std::mem::take(&mut self.tree_loads.lock().unwrap())
    }
}

#[async_trait]
impl BuildSink for FakeSink {
    async fn submit_compare(&self, request: CompareRequest) -> Result<()> {
        self.compares.lock().unwrap().push(request);
        Ok(())
    }

    async fn submit_weave(&self, request: WeaveRequest) -> Result<()> {
        self.weaves.lock().unwrap().push(request);
        Ok(())
    }

    async fn submit_tree_load(&self, request: TreeLoadRequest) -> Result<TreeLoadHandle> {
        let (resolve, handle) = oneshot::channel();
        self.tree_loads.lock().unwrap().push(PendingTreeLoad { request, resolve });
        Ok(handle)
    }
}
