//! Dispatch protocol helpers.
//!
//! Build submission is fire-and-forget except for tree-metadata loads,
//! whose completion the classifier awaits. [`LoaderSink`] services those
//! loads with a [`TreeLoader`]; [`run`] drives a scheduler from a change
//! feed with burst coalescing.

use crate::loader::TreeLoader;
use crate::scheduler::AppScheduler;
use async_trait::async_trait;
use lingua_core::Result;
use lingua_core::change::Change;
use lingua_core::ports::{BuildSink, TreeLoadHandle};
use lingua_core::request::{CompareRequest, TreeLoadRequest, WeaveRequest};
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tracing::warn;

/// `BuildSink` decorator that executes tree-load requests with a
/// [`TreeLoader`] on a spawned task and forwards comparison builds to the
/// inner sink.
pub struct LoaderSink {
    loader: Arc<TreeLoader>,
    inner: Arc<dyn BuildSink>,
}

impl LoaderSink {
    pub fn new(loader: Arc<TreeLoader>, inner: Arc<dyn BuildSink>) -> Self {
        Self { loader, inner }
    }
}

#[async_trait]
impl BuildSink for LoaderSink {
    async fn submit_compare(&self, request: CompareRequest) -> Result<()> {
        self.inner.submit_compare(request).await
    }

    async fn submit_weave(&self, request: WeaveRequest) -> Result<()> {
        self.inner.submit_weave(request).await
    }

    async fn submit_tree_load(&self, request: TreeLoadRequest) -> Result<TreeLoadHandle> {
        let (tx, rx) = oneshot::channel();
        let loader = Arc::clone(&self.loader);
        tokio::spawn(async move {
            let loaded = match &request.config {
                Some(config) => match loader.load(&request.tree, config).await {
                    Ok(tree) => Some(tree),
                    Err(error) => {
                        warn!(tree = %request.tree, %error, "tree load failed");
                        None
                    }
                },
                None => {
                    warn!(tree = %request.tree, "tree load request without descriptor section");
                    None
                }
            };
            let _ = tx.send(loaded);
        });
        Ok(rx)
    }
}

/// Drive a scheduler from a change feed until the feed closes.
///
/// Implements the cooperative tick: every change available without
/// waiting is classified as one burst (coalescing same-(tree, locale)
/// triggers), outstanding tree loads are driven to completion, and a
/// scheduled flush runs once per burst. Per-change failures are logged,
/// never fatal.
pub async fn run(mut scheduler: AppScheduler, mut changes: mpsc::Receiver<Change>) -> Result<()> {
    scheduler.start().await?;
    scheduler.process_loads().await?;

    while let Some(change) = changes.recv().await {
        if let Err(error) = scheduler.add_change(change).await {
            warn!(%error, "change classification failed");
        }
        while let Ok(change) = changes.try_recv() {
            if let Err(error) = scheduler.add_change(change).await {
                warn!(%error, "change classification failed");
            }
        }
        if let Err(error) = scheduler.process_loads().await {
            warn!(%error, "tree load processing failed");
        }
        if scheduler.flush_scheduled()
            && let Err(error) = scheduler.submit_buildsets().await
        {
            warn!(%error, "buildset submission failed");
        }
    }
    Ok(())
}
