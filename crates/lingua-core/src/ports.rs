//! Port traits (hexagonal architecture).
//!
//! These traits define the seams between the scheduling core and the host
//! runtime: manifest retrieval, metadata persistence, push/revision
//! resolution, and build submission. They are passed into the scheduler's
//! constructor, never looked up ambiently.

use crate::error::Result;
use crate::ids::{ForestId, PushId, RepoId, TreeId};
use crate::request::{CompareRequest, TreeLoadRequest, WeaveRequest};
use crate::tree::Tree;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::time::Duration;
use tokio::sync::oneshot;

/// Retrieves manifest and all-locales files from remote repositories.
#[async_trait]
pub trait TextFetcher: Send + Sync {
    /// Fetch a text resource. A timeout is a hard failure for this fetch
    /// only; callers decide how far the failure degrades.
    async fn fetch(&self, url: &str, timeout: Duration) -> Result<String>;
}

/// Persistence side effects of tree registration.
#[async_trait]
pub trait ForestStore: Send + Sync {
    /// Get or create the forest grouping the per-locale repositories of a
    /// localization branch. The flag reports whether a row was created.
    async fn forest_for_branch(&self, name: &str) -> Result<(ForestId, bool)>;

    /// Relative path of a forest.
    async fn forest_path(&self, name: &str) -> Result<String>;

    /// Get or create the persistent tree record, with its current forest.
    async fn tree_record(&self, code: &str) -> Result<(TreeId, Option<ForestId>)>;

    /// Point a tree record at a forest.
    async fn set_tree_forest(&self, tree: TreeId, forest: ForestId) -> Result<()>;
}

/// A repository row in the metadata store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepoHandle {
    pub id: RepoId,
    pub relative_path: String,
}

/// A recorded push.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PushHandle {
    pub id: PushId,
    pub date: Option<DateTime<Utc>>,
}

/// Push and revision resolution against the metadata store.
#[async_trait]
pub trait PushStore: Send + Sync {
    /// Look up the repository registered at a relative path.
    async fn repository(&self, relative_path: &str) -> Result<RepoHandle>;

    /// Most recent push with changesets on `line`, at or before `when`
    /// (unconstrained when `when` is `None`).
    async fn latest_push_at_or_before(
        &self,
        repo: &RepoHandle,
        line: &str,
        when: Option<DateTime<Utc>>,
    ) -> Result<Option<PushHandle>>;

    /// Tip revision of a push on `line`.
    async fn tip_revision_on_line(&self, push: &PushHandle, line: &str) -> Result<String>;

    /// Newest known changeset on `line` regardless of pushes. Must always
    /// succeed: a null changeset is guaranteed to exist.
    async fn fallback_revision_on_line(&self, repo: &RepoHandle, line: &str) -> Result<String>;
}

/// Resolves with the loaded tree once the executor finishes, or `None` if
/// the load failed.
pub type TreeLoadHandle = oneshot::Receiver<Option<Tree>>;

/// Outward-facing submission sink for build requests.
#[async_trait]
pub trait BuildSink: Send + Sync {
    /// Submit a comparison build. Fire-and-forget: the scheduler does not
    /// block on the outcome.
    async fn submit_compare(&self, request: CompareRequest) -> Result<()>;

    /// Submit a per-locale weave build. Fire-and-forget.
    async fn submit_weave(&self, request: WeaveRequest) -> Result<()>;

    /// Submit a tree-metadata-load build. The returned handle is the one
    /// completion signal the scheduler awaits before resuming change
    /// processing.
    async fn submit_tree_load(&self, request: TreeLoadRequest) -> Result<TreeLoadHandle>;
}
