//! Fixtures for the canonical test tree and a fully faked scheduler.

use crate::fakes::{FakeFetcher, FakeSink, RecordingStore};
use lingua_core::change::Change;
use lingua_core::tree::Tree;
use lingua_scheduler::AppScheduler;
use std::sync::Arc;

/// Tree "app": English branch `mozilla`, localization branch `l10n`,
/// one comparison directory `app`, locales de and fr.
pub fn simple_tree() -> Tree {
    let mut tree = Tree::new(
        "app",
        "http://hg.example.org",
        "mozilla",
        "l10n",
        "app/locales/l10n.ini",
    );
    tree.add_data("mozilla", Some("app/locales/l10n.ini"), &["app".into()], None);
    tree.locales = vec!["de".into(), "fr".into()];
    tree
}

/// A scheduler wired to fakes, plus handles to inspect them.
pub struct TestScheduler {
    pub scheduler: AppScheduler,
    pub sink: Arc<FakeSink>,
    pub store: Arc<RecordingStore>,
    pub fetcher: Arc<FakeFetcher>,
}

/// Scheduler with no descriptor (no startup loads) and an empty registry.
pub fn bare_scheduler() -> TestScheduler {
    let sink = Arc::new(FakeSink::new());
    let store = Arc::new(RecordingStore::new());
    let fetcher = Arc::new(FakeFetcher::new());
    let scheduler = AppScheduler::new(
        vec!["compare".into()],
        "tree-builds",
        None,
        fetcher.clone(),
        store.clone(),
        store.clone(),
        sink.clone(),
    );
    TestScheduler {
        scheduler,
        sink,
        store,
        fetcher,
    }
}

/// [`bare_scheduler`] with [`simple_tree`] registered.
pub async fn simple_scheduler() -> TestScheduler {
    let mut ctx = bare_scheduler();
    ctx.scheduler
        .add_tree(simple_tree())
        .await
        .expect("register fixture tree");
    ctx
}

/// A localization-repo change for one locale.
pub fn l10n_change(locale: &str, files: &[&str]) -> Change {
    Change::new("l10n", files.iter().map(|f| f.to_string()).collect()).with_locale(locale)
}

/// An English-repo change.
pub fn en_change(files: &[&str]) -> Change {
    Change::new("mozilla", files.iter().map(|f| f.to_string()).collect())
}
