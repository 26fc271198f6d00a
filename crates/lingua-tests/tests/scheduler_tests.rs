//! Classification, coalescing, and dispatch behavior of `AppScheduler`.

use chrono::{TimeZone, Utc};
use lingua_core::tree::Tree;
use lingua_tests::{
    NULL_REVISION, bare_scheduler, en_change, init_test_logging, l10n_change, simple_scheduler,
    simple_tree,
};

#[tokio::test]
async fn unknown_branch_is_a_noop() {
    init_test_logging();
    let mut ctx = simple_scheduler().await;

    let c = l10n_change("de", &["app/file.dtd"]);
    let c = lingua_core::change::Change { branch: "other-l10n".into(), ..c };
    ctx.scheduler.add_change(c).await.unwrap();

    let c = en_change(&["app/locales/en-US/file.dtd"]);
    let c = lingua_core::change::Change { branch: "other-branch".into(), ..c };
    ctx.scheduler.add_change(c).await.unwrap();

    assert!(ctx.scheduler.pendings().is_empty());
    assert!(!ctx.scheduler.flush_scheduled());
    assert!(ctx.sink.compares().is_empty());
}

#[tokio::test]
async fn l10n_change_accrues_one_pending_build() {
    init_test_logging();
    let mut ctx = simple_scheduler().await;

    ctx.scheduler
        .add_change(l10n_change("de", &["app/file.dtd"]))
        .await
        .unwrap();

    assert!(ctx.scheduler.flush_scheduled());
    ctx.scheduler.cancel_flush();
    let pendings = ctx.scheduler.pendings();
    assert_eq!(pendings.len(), 1);
    assert_eq!(pendings[&("app".into(), "de".into())].len(), 1);
}

#[tokio::test]
async fn l10n_change_for_unknown_locale_is_ignored() {
    let mut ctx = simple_scheduler().await;

    ctx.scheduler
        .add_change(l10n_change("xx", &["app/file.dtd"]))
        .await
        .unwrap();

    assert!(ctx.scheduler.pendings().is_empty());
}

#[tokio::test]
async fn l10n_change_outside_declared_dirs_is_ignored() {
    let mut ctx = simple_scheduler().await;

    ctx.scheduler
        .add_change(l10n_change("de", &["unrelated/file.dtd"]))
        .await
        .unwrap();

    assert!(ctx.scheduler.pendings().is_empty());
}

#[tokio::test]
async fn locale_property_counts_as_locale() {
    let mut ctx = simple_scheduler().await;

    let c = lingua_core::change::Change::new("l10n", vec!["app/file.dtd".into()])
        .with_property("locale", serde_json::json!("fr"));
    ctx.scheduler.add_change(c).await.unwrap();

    assert_eq!(ctx.scheduler.pendings().len(), 1);
    assert!(ctx.scheduler.pendings().contains_key(&("app".into(), "fr".into())));
}

#[tokio::test]
async fn en_us_change_fans_out_to_every_locale() {
    init_test_logging();
    let mut ctx = simple_scheduler().await;

    ctx.scheduler
        .add_change(en_change(&["app/locales/en-US/file.dtd"]))
        .await
        .unwrap();

    ctx.scheduler.cancel_flush();
    let pendings = ctx.scheduler.pendings();
    assert_eq!(pendings.len(), 2);
    assert_eq!(pendings[&("app".into(), "de".into())].len(), 1);
    assert_eq!(pendings[&("app".into(), "fr".into())].len(), 1);
}

#[tokio::test]
async fn en_change_outside_dirs_and_marker_is_a_noop() {
    let mut ctx = simple_scheduler().await;

    ctx.scheduler
        .add_change(en_change(&["docs/readme.txt", "other/nsThing.cpp"]))
        .await
        .unwrap();

    assert!(ctx.scheduler.pendings().is_empty());
    assert!(!ctx.scheduler.flush_scheduled());
}

#[tokio::test]
async fn same_burst_changes_coalesce_in_arrival_order() {
    init_test_logging();
    let mut ctx = simple_scheduler().await;

    let first = en_change(&["app/locales/en-US/file.dtd"]);
    let second = l10n_change("de", &["app/file.dtd"]);
    ctx.scheduler.add_change(first.clone()).await.unwrap();
    ctx.scheduler.add_change(second.clone()).await.unwrap();

    ctx.scheduler.cancel_flush();
    let pendings = ctx.scheduler.pendings();
    assert_eq!(pendings.len(), 2);
    let de = &pendings[&("app".into(), "de".into())];
    assert_eq!(de.len(), 2);
    assert_eq!(de[0], first);
    assert_eq!(de[1], second);
    assert_eq!(pendings[&("app".into(), "fr".into())].len(), 1);
}

#[tokio::test]
async fn manifest_change_queues_changes_until_trees_rebuilt() {
    init_test_logging();
    let mut ctx = simple_scheduler().await;

    ctx.scheduler
        .add_change(en_change(&["app/locales/l10n.ini"]))
        .await
        .unwrap();
    assert!(ctx.scheduler.is_loading());

    // queued while the tree load is in flight
    ctx.scheduler
        .add_change(en_change(&["app/locales/en-US/app.dtd"]))
        .await
        .unwrap();
    assert!(ctx.scheduler.pendings().is_empty());

    let mut loads = ctx.sink.take_tree_loads();
    assert_eq!(loads.len(), 1);
    assert_eq!(loads[0].request.builder, "tree-builds");
    assert_eq!(loads[0].request.tree, "app");

    // reload yields a structurally identical tree: no re-check fan-out,
    // the queued change replays afterwards
    loads.remove(0).resolve.send(Some(simple_tree())).unwrap();
    ctx.scheduler.process_loads().await.unwrap();

    assert!(!ctx.scheduler.is_loading());
    ctx.scheduler.cancel_flush();
    let pendings = ctx.scheduler.pendings();
    assert_eq!(pendings.len(), 2);
    assert_eq!(pendings[&("app".into(), "de".into())].len(), 1);
    assert_eq!(pendings[&("app".into(), "fr".into())].len(), 1);
}

#[tokio::test]
async fn updated_tree_is_rechecked_for_the_triggering_change() {
    init_test_logging();
    let mut ctx = simple_scheduler().await;

    let manifest_change = en_change(&["app/locales/l10n.ini"]);
    ctx.scheduler.add_change(manifest_change.clone()).await.unwrap();

    let mut updated = simple_tree();
    updated.add_data("mozilla", None, &["newdir".into()], None);
    let mut loads = ctx.sink.take_tree_loads();
    loads.remove(0).resolve.send(Some(updated)).unwrap();
    ctx.scheduler.process_loads().await.unwrap();

    // the updated tree fans the manifest change out to all its locales
    let pendings = ctx.scheduler.pendings();
    assert_eq!(pendings.len(), 2);
    assert_eq!(pendings[&("app".into(), "de".into())], vec![manifest_change.clone()]);
    assert_eq!(pendings[&("app".into(), "fr".into())], vec![manifest_change]);
}

#[tokio::test]
async fn renamed_english_branch_still_drains_the_recheck_set() {
    init_test_logging();
    let mut ctx = simple_scheduler().await;

    let manifest_change = en_change(&["app/locales/l10n.ini"]);
    ctx.scheduler.add_change(manifest_change.clone()).await.unwrap();

    // the reload moved the tree to a new English branch, so the rebuilt
    // index no longer carries the change's branch
    let mut renamed = Tree::new(
        "app",
        "http://hg.example.org",
        "mozilla-next",
        "l10n",
        "app/locales/l10n.ini",
    );
    renamed.add_data(
        "mozilla-next",
        Some("app/locales/l10n.ini"),
        &["app".into()],
        None,
    );
    renamed.locales = vec!["de".into(), "fr".into()];
    let mut loads = ctx.sink.take_tree_loads();
    loads.remove(0).resolve.send(Some(renamed)).unwrap();
    ctx.scheduler.process_loads().await.unwrap();

    // the updated tree is still rechecked against the triggering change
    let pendings = ctx.scheduler.pendings();
    assert_eq!(pendings.len(), 2);
    assert_eq!(pendings[&("app".into(), "de".into())], vec![manifest_change.clone()]);
    assert_eq!(pendings[&("app".into(), "fr".into())], vec![manifest_change]);
}

#[tokio::test]
async fn failed_tree_load_degrades_without_blocking_replay() {
    init_test_logging();
    let mut ctx = simple_scheduler().await;

    ctx.scheduler
        .add_change(en_change(&["app/locales/l10n.ini"]))
        .await
        .unwrap();
    ctx.scheduler
        .add_change(l10n_change("de", &["app/file.dtd"]))
        .await
        .unwrap();

    let mut loads = ctx.sink.take_tree_loads();
    loads.remove(0).resolve.send(None).unwrap();
    ctx.scheduler.process_loads().await.unwrap();

    // the queued l10n change still classified against the old registry
    let pendings = ctx.scheduler.pendings();
    assert_eq!(pendings.len(), 1);
    assert_eq!(pendings[&("app".into(), "de".into())].len(), 1);
}

#[tokio::test]
async fn all_locales_change_discovers_new_locales() {
    init_test_logging();
    let mut ctx = bare_scheduler();
    let mut tree = simple_tree();
    tree.all_locales = Some("app/locales/all-locales".into());
    ctx.scheduler.add_tree(tree).await.unwrap();

    ctx.fetcher.insert(
        "http://hg.example.org/mozilla/raw-file/default/app/locales/all-locales",
        "de\nfr\nja\n\n",
    );
    ctx.scheduler
        .add_change(en_change(&["app/locales/all-locales"]))
        .await
        .unwrap();

    // only the newly discovered locale gets a build
    let pendings = ctx.scheduler.pendings();
    assert_eq!(pendings.len(), 1);
    assert_eq!(pendings[&("app".into(), "ja".into())].len(), 1);
    let tree = ctx.scheduler.registry().tree("app").unwrap();
    assert_eq!(tree.locales, vec!["de", "fr", "ja"]);
}

#[tokio::test]
async fn all_locales_fetch_uses_change_revision() {
    let mut ctx = bare_scheduler();
    let mut tree = simple_tree();
    tree.all_locales = Some("app/locales/all-locales".into());
    ctx.scheduler.add_tree(tree).await.unwrap();

    ctx.fetcher.insert(
        "http://hg.example.org/mozilla/raw-file/abc123/app/locales/all-locales",
        "de\nfr\n",
    );
    let change = en_change(&["app/locales/all-locales"]).with_revision("abc123");
    ctx.scheduler.add_change(change).await.unwrap();

    assert_eq!(
        ctx.fetcher.requests(),
        vec!["http://hg.example.org/mozilla/raw-file/abc123/app/locales/all-locales"]
    );
    assert!(ctx.scheduler.pendings().is_empty());
}

#[tokio::test]
async fn toplevel_and_nested_dirs_edge_case() {
    init_test_logging();
    let mut ctx = bare_scheduler();
    let mut tree = simple_tree();
    // tree declares a top-level comparison and nested dirs at once
    tree.tld = Some("toplevel".into());
    ctx.scheduler.add_tree(tree).await.unwrap();

    // empty module prefix resolves through the top-level set only
    ctx.scheduler
        .add_change(en_change(&["locales/en-US/file.dtd"]))
        .await
        .unwrap();
    assert_eq!(ctx.scheduler.pendings().len(), 2);

    // one change touching both shapes still yields one entry per locale
    ctx.scheduler.submit_buildsets().await.unwrap();
    ctx.scheduler
        .add_change(en_change(&[
            "locales/en-US/file.dtd",
            "app/locales/en-US/other.dtd",
        ]))
        .await
        .unwrap();
    let pendings = ctx.scheduler.pendings();
    assert_eq!(pendings.len(), 2);
    // the change contributes through both paths
    assert_eq!(pendings[&("app".into(), "de".into())].len(), 2);
}

#[tokio::test]
async fn flush_submits_one_request_per_pending_key() {
    init_test_logging();
    let mut ctx = simple_scheduler().await;
    let when = Utc.with_ymd_and_hms(2014, 3, 1, 12, 0, 0).unwrap();
    ctx.store
        .add_push("mozilla", Some(when - chrono::Duration::hours(2)), "abc123");
    ctx.store
        .add_push("l10n/de", Some(when - chrono::Duration::hours(1)), "def456");

    ctx.scheduler
        .add_change(l10n_change("de", &["app/file.dtd"]).with_when(when))
        .await
        .unwrap();
    assert!(ctx.scheduler.flush_scheduled());
    ctx.scheduler.submit_buildsets().await.unwrap();

    let compares = ctx.sink.compares();
    assert_eq!(compares.len(), 1);
    let request = &compares[0];
    assert_eq!(request.builders, vec!["compare"]);
    assert_eq!(request.stamp.changes.len(), 1);
    assert_eq!(request.params.tree, "app");
    assert_eq!(request.params.locale, "de");
    assert_eq!(request.params.l10nbase, "l10n");
    assert_eq!(request.params.inipath, "mozilla/app/locales/l10n.ini");
    assert_eq!(request.params.srctime, Some(when));
    let roles: Vec<&String> = request.params.revisions.keys().collect();
    assert_eq!(roles, vec!["en", "l10n"]);
    assert_eq!(request.params.revisions["en"].branch, "mozilla");
    assert_eq!(request.params.revisions["en"].revision, "abc123");
    assert_eq!(request.params.revisions["l10n"].branch, "l10n/de");
    assert_eq!(request.params.revisions["l10n"].revision, "def456");

    assert!(ctx.scheduler.pendings().is_empty());
    assert!(!ctx.scheduler.flush_scheduled());
}

#[tokio::test]
async fn newer_pushes_are_not_pinned() {
    let mut ctx = simple_scheduler().await;
    let when = Utc.with_ymd_and_hms(2014, 3, 1, 12, 0, 0).unwrap();
    ctx.store
        .add_push("mozilla", Some(when - chrono::Duration::hours(1)), "old111");
    ctx.store
        .add_push("mozilla", Some(when + chrono::Duration::hours(1)), "new222");

    ctx.scheduler
        .add_change(l10n_change("de", &["app/file.dtd"]).with_when(when))
        .await
        .unwrap();
    ctx.scheduler.submit_buildsets().await.unwrap();

    let compares = ctx.sink.compares();
    assert_eq!(compares[0].params.revisions["en"].revision, "old111");
}

#[tokio::test]
async fn revision_resolution_falls_back_to_newest_changeset() {
    init_test_logging();
    let mut ctx = simple_scheduler().await;

    // no pushes recorded anywhere: every role resolves via the fallback
    ctx.scheduler
        .add_change(l10n_change("de", &["app/file.dtd"]))
        .await
        .unwrap();
    ctx.scheduler.submit_buildsets().await.unwrap();

    let compares = ctx.sink.compares();
    assert_eq!(compares.len(), 1);
    assert_eq!(compares[0].params.revisions["en"].revision, NULL_REVISION);
    assert_eq!(compares[0].params.revisions["l10n"].revision, NULL_REVISION);
    assert_eq!(compares[0].params.srctime, None);
}

#[tokio::test]
async fn srctime_bumps_to_resolved_push_date() {
    let mut ctx = simple_scheduler().await;
    let when = Utc.with_ymd_and_hms(2014, 3, 1, 12, 0, 0).unwrap();
    // push without a date constraint match: change has no timestamp
    ctx.store.add_push("mozilla", Some(when), "abc123");

    ctx.scheduler
        .add_change(l10n_change("de", &["app/file.dtd"]))
        .await
        .unwrap();
    ctx.scheduler.submit_buildsets().await.unwrap();

    let compares = ctx.sink.compares();
    assert_eq!(compares[0].params.srctime, Some(when));
}

#[tokio::test]
async fn startup_loads_every_descriptor_tree() {
    init_test_logging();
    let descriptor = lingua_core::config::BuildsConfig::parse(
        "[app]\nrepo = http://hg.example.org\nmozilla = mozilla\nl10n = l10n\n\
         l10n.ini = app/locales/l10n.ini\nlocales = de fr\n",
    )
    .unwrap();
    let sink = std::sync::Arc::new(lingua_tests::FakeSink::new());
    let store = std::sync::Arc::new(lingua_tests::RecordingStore::new());
    let fetcher = std::sync::Arc::new(lingua_tests::FakeFetcher::new());
    let mut scheduler = lingua_scheduler::AppScheduler::new(
        vec!["compare".into()],
        "tree-builds",
        Some(descriptor),
        fetcher,
        store.clone(),
        store,
        sink.clone(),
    );

    scheduler.start().await.unwrap();
    assert!(scheduler.is_loading());
    let mut loads = sink.take_tree_loads();
    assert_eq!(loads.len(), 1);
    assert_eq!(loads[0].request.tree, "app");

    loads.remove(0).resolve.send(Some(simple_tree())).unwrap();
    scheduler.process_loads().await.unwrap();
    assert!(!scheduler.is_loading());
    assert_eq!(scheduler.registry().tree("app").unwrap().name, "app");
}

#[tokio::test]
async fn tree_of_another_forest_is_untouched() {
    init_test_logging();
    let mut ctx = simple_scheduler().await;
    let mut other = Tree::new(
        "mail",
        "http://hg.example.org",
        "comm",
        "l10n-mail",
        "mail/locales/l10n.ini",
    );
    other.add_data("comm", Some("mail/locales/l10n.ini"), &["mail".into()], None);
    other.locales = vec!["de".into()];
    ctx.scheduler.add_tree(other).await.unwrap();

    ctx.scheduler
        .add_change(l10n_change("de", &["app/file.dtd"]))
        .await
        .unwrap();

    let pendings = ctx.scheduler.pendings();
    assert_eq!(pendings.len(), 1);
    assert!(pendings.contains_key(&("app".into(), "de".into())));
}
