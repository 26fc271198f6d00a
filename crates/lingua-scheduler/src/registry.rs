//! Tree registry and derived branch indexes.
//!
//! The registry holds the known trees plus two derived indexes: per
//! English-or-included branch ([`BranchData`]) and per localization branch
//! ([`L10nDirs`]). Indexes are rebuilt wholesale on every add/update and
//! swapped in as immutable `Arc` snapshots; tree counts are small, so
//! correctness wins over incremental patching.

use lingua_core::ports::ForestStore;
use lingua_core::tree::Tree;
use lingua_core::{Error, Result};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Index of all tree data declared on one English or included branch.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BranchData {
    /// Manifest path to the trees declaring it.
    pub inis: HashMap<String, Vec<String>>,
    /// Comparison directory to the trees declaring it.
    pub dirs: HashMap<String, Vec<String>>,
    /// Trees with a top-level comparison on this branch.
    pub toplevel_trees: HashSet<String>,
    /// All-locales file path to the trees discovering locales from it.
    pub all_locales: HashMap<String, HashSet<String>>,
}

impl BranchData {
    fn add_dirs(&mut self, tree: &str, dirs: &[String]) {
        for dir in dirs {
            self.dirs.entry(dir.clone()).or_default().push(tree.to_string());
        }
    }
}

/// Index of comparison directories per localization branch.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct L10nDirs {
    /// Directory to the trees it belongs to.
    pub dirs: HashMap<String, HashSet<String>>,
}

impl L10nDirs {
    fn add_dirs(&mut self, tree: &str, dirs: &[String]) {
        for dir in dirs {
            self.dirs.entry(dir.clone()).or_default().insert(tree.to_string());
        }
    }

    /// Trees owning any directory that prefixes `path`.
    pub fn trees_for_path(&self, path: &str) -> impl Iterator<Item = &str> {
        self.dirs
            .iter()
            .filter(move |(dir, _)| path.starts_with(dir.as_str()))
            .flat_map(|(_, trees)| trees.iter().map(String::as_str))
    }
}

/// The set of known trees and their derived indexes.
pub struct TreeRegistry {
    store: Arc<dyn ForestStore>,
    trees: HashMap<String, Tree>,
    branches: Arc<HashMap<String, BranchData>>,
    l10n_branches: Arc<HashMap<String, L10nDirs>>,
    /// Trees updated by a registry rebuild, consumed by the classifier's
    /// English-repo re-check.
    recheck: HashSet<String>,
}

impl TreeRegistry {
    pub fn new(store: Arc<dyn ForestStore>) -> Self {
        Self {
            store,
            trees: HashMap::new(),
            branches: Arc::new(HashMap::new()),
            l10n_branches: Arc::new(HashMap::new()),
            recheck: HashSet::new(),
        }
    }

    /// Register a loaded tree. Idempotent: structurally identical reloads
    /// are a no-op. Returns whether anything changed.
    pub async fn add_tree(&mut self, tree: Tree) -> Result<bool> {
        if let Some(existing) = self.trees.get(&tree.name) {
            if *existing == tree {
                debug!(tree = %tree.name, "tree info loaded, unchanged");
                return Ok(false);
            }
            // updated tree: picked up by check_en_us after the rebuild
            self.recheck.insert(tree.name.clone());
        }

        let (forest, created) = self.store.forest_for_branch(tree.l10n_branch()).await?;
        if created {
            warn!(forest = %tree.l10n_branch(), "scheduler created forest, not expected");
        }
        let (tree_id, current_forest) = self.store.tree_record(&tree.name).await?;
        if current_forest != Some(forest) {
            self.store.set_tree_forest(tree_id, forest).await?;
            info!(tree = %tree.name, forest = %tree.l10n_branch(), "updated tree forest");
        }

        debug!(tree = %tree.name, "updated tree");
        self.trees.insert(tree.name.clone(), tree);
        self.rebuild();
        Ok(true)
    }

    /// Rebuild both branch indexes from scratch and swap the snapshots.
    fn rebuild(&mut self) {
        let mut branches: HashMap<String, BranchData> = HashMap::new();
        let mut l10n_branches: HashMap<String, L10nDirs> = HashMap::new();
        for (name, tree) in &self.trees {
            let l10n = l10n_branches.entry(tree.l10n_branch().to_string()).or_default();
            for (branch, dirs) in &tree.branch_dirs {
                branches.entry(branch.clone()).or_default().add_dirs(name, dirs);
                l10n.add_dirs(name, dirs);
            }
            for (branch, inis) in &tree.l10n_inis {
                let data = branches.entry(branch.clone()).or_default();
                for ini in inis {
                    data.inis.entry(ini.clone()).or_default().push(name.clone());
                }
            }
            if let Some(tld) = &tree.tld {
                l10n_branches
                    .entry(tree.l10n_branch().to_string())
                    .or_default()
                    .add_dirs(name, std::slice::from_ref(tld));
                branches
                    .entry(tree.en_branch().to_string())
                    .or_default()
                    .toplevel_trees
                    .insert(name.clone());
            }
            if let Some(all) = &tree.all_locales {
                branches
                    .entry(tree.en_branch().to_string())
                    .or_default()
                    .all_locales
                    .entry(all.clone())
                    .or_default()
                    .insert(name.clone());
            }
        }
        self.branches = Arc::new(branches);
        self.l10n_branches = Arc::new(l10n_branches);
        debug!(trees = self.trees.len(), "branch data cache updated");
    }

    pub fn tree(&self, name: &str) -> Option<&Tree> {
        self.trees.get(name)
    }

    /// Replace a tree's known locale list, returning the codes that are
    /// newly added.
    pub fn update_locales(&mut self, name: &str, locales: Vec<String>) -> Result<Vec<String>> {
        let tree = self
            .trees
            .get_mut(name)
            .ok_or_else(|| Error::Internal(format!("no registered tree {name}")))?;
        let added = locales
            .iter()
            .filter(|l| !tree.locales.contains(l))
            .cloned()
            .collect();
        tree.locales = locales;
        Ok(added)
    }

    /// Immutable snapshot of the English/included-branch index.
    pub fn branches_snapshot(&self) -> Arc<HashMap<String, BranchData>> {
        Arc::clone(&self.branches)
    }

    /// Immutable snapshot of the localization-branch index.
    pub fn l10n_snapshot(&self) -> Arc<HashMap<String, L10nDirs>> {
        Arc::clone(&self.l10n_branches)
    }

    /// Relative path of the forest backing a localization branch.
    pub async fn forest_path(&self, name: &str) -> Result<String> {
        self.store.forest_path(name).await
    }

    /// Drain the set of trees flagged for re-check by registry rebuilds.
    pub fn take_recheck(&mut self) -> HashSet<String> {
        std::mem::take(&mut self.recheck)
    }

    pub fn len(&self) -> usize {
        self.trees.len()
    }

    pub fn is_empty(&self) -> bool {
        self.trees.is_empty()
    }
}
