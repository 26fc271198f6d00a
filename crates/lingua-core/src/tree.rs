//! Per-tree metadata records.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Branch role of the English source repository.
pub const EN_ROLE: &str = "en";
/// Branch role of the localization forest.
pub const L10N_ROLE: &str = "l10n";

/// Metadata for one tree (a product/branch configuration pairing an English
/// source branch with a localization branch).
///
/// Built by the metadata loader from a descriptor section and the manifests
/// it references, mutated in place as nested includes are discovered.
/// Structural equality (`PartialEq`) is what the registry uses to detect
/// no-op reloads.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tree {
    pub name: String,
    /// Source repository base URL.
    pub repo: String,
    /// Branch role (`en`, `l10n`, include titles) to repository branch path.
    ///
    /// `new` always seeds the `en` and `l10n` roles.
    pub branches: BTreeMap<String, String>,
    /// Repository branch path to the manifest paths declared on it.
    pub l10n_inis: BTreeMap<String, Vec<String>>,
    /// Repository branch path to the comparison directories its manifests
    /// declare.
    pub branch_dirs: BTreeMap<String, Vec<String>>,
    /// Top-level comparison directory for single-module layouts.
    pub tld: Option<String>,
    /// Known locale codes.
    pub locales: Vec<String>,
    /// Path of the all-locales discovery file on the English branch, when
    /// the tree builds every locale that file lists.
    pub all_locales: Option<String>,
}

impl Tree {
    pub fn new(
        name: impl Into<String>,
        repo: impl Into<String>,
        branch: impl Into<String>,
        l10n_branch: impl Into<String>,
        l10n_ini: impl Into<String>,
    ) -> Self {
        let branch = branch.into();
        let mut branches = BTreeMap::new();
        branches.insert(EN_ROLE.to_string(), branch.clone());
        branches.insert(L10N_ROLE.to_string(), l10n_branch.into());
        let mut l10n_inis = BTreeMap::new();
        l10n_inis.insert(branch, vec![l10n_ini.into()]);
        Self {
            name: name.into(),
            repo: repo.into(),
            branches,
            l10n_inis,
            branch_dirs: BTreeMap::new(),
            tld: None,
            locales: Vec::new(),
            all_locales: None,
        }
    }

    /// Merge the result of one manifest load into the tree: comparison
    /// directories and the manifest path itself, keyed by the branch the
    /// manifest lives on, plus an optional top-level comparison directory.
    pub fn add_data(
        &mut self,
        branch: &str,
        l10n_ini: Option<&str>,
        dirs: &[String],
        tld: Option<String>,
    ) {
        self.branch_dirs
            .entry(branch.to_string())
            .or_default()
            .extend(dirs.iter().cloned());
        if tld.is_some() {
            self.tld = tld;
        }
        if let Some(ini) = l10n_ini {
            let inis = self.l10n_inis.entry(branch.to_string()).or_default();
            if !inis.iter().any(|i| i == ini) {
                inis.push(ini.to_string());
            }
        }
    }

    pub fn en_branch(&self) -> &str {
        // seeded by the constructor
        self.branches
            .get(EN_ROLE)
            .map(String::as_str)
            .unwrap_or_default()
    }

    pub fn l10n_branch(&self) -> &str {
        self.branches
            .get(L10N_ROLE)
            .map(String::as_str)
            .unwrap_or_default()
    }

    /// Whether a branch path is already referenced by any role.
    pub fn knows_branch(&self, branch: &str) -> bool {
        self.branches.values().any(|b| b == branch)
    }
}
