//! Builds descriptor (`l10nbuilds.ini`) configuration model.
//!
//! The descriptor is a central INI file with one section per tree, read
//! once at startup to seed the initial tree loads and re-read per tree
//! when a manifest change forces a metadata reload.

use crate::error::{Error, Result};
use crate::tree::Tree;
use ini::Ini;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// How the locale list for a tree is determined.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum LocaleMode {
    /// Discover locales from the tree's all-locales file.
    All,
    /// Fixed, explicitly configured locale list.
    List(Vec<String>),
}

/// One section of the builds descriptor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TreeConfig {
    /// Source repository base URL.
    pub repo: String,
    /// English branch path (`mozilla` key in the descriptor).
    pub branch: String,
    /// Localization branch path (`l10n` key).
    pub l10n_branch: String,
    /// Manifest path on the English branch (`l10n.ini` key).
    pub l10n_ini: String,
    pub locales: LocaleMode,
}

impl TreeConfig {
    /// Seed a [`Tree`] from this descriptor section. Locale discovery and
    /// manifest data are filled in by the loader.
    pub fn seed_tree(&self, name: &str) -> Tree {
        let mut tree = Tree::new(name, &self.repo, &self.branch, &self.l10n_branch, &self.l10n_ini);
        if let LocaleMode::List(locales) = &self.locales {
            tree.locales = locales.clone();
        }
        tree
    }
}

/// The parsed builds descriptor: tree name to configuration, in file order.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct BuildsConfig {
    trees: Vec<(String, TreeConfig)>,
}

impl BuildsConfig {
    pub fn parse(text: &str) -> Result<Self> {
        let ini = Ini::load_from_str(text).map_err(|e| Error::Descriptor(e.to_string()))?;
        let mut trees = Vec::new();
        for (section, props) in ini.iter() {
            let Some(name) = section else {
                continue;
            };
            let get = |key: &str| -> Result<String> {
                props
                    .get(key)
                    .map(str::to_string)
                    .ok_or_else(|| Error::Descriptor(format!("section {name} is missing {key}")))
            };
            let locales = match get("locales")?.as_str() {
                "all" => LocaleMode::All,
                list => LocaleMode::List(list.split_whitespace().map(str::to_string).collect()),
            };
            trees.push((
                name.to_string(),
                TreeConfig {
                    repo: get("repo")?,
                    branch: get("mozilla")?,
                    l10n_branch: get("l10n")?,
                    l10n_ini: get("l10n.ini")?,
                    locales,
                },
            ));
        }
        Ok(Self { trees })
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        Self::parse(&std::fs::read_to_string(path)?)
    }

    pub fn get(&self, name: &str) -> Option<&TreeConfig> {
        self.trees.iter().find(|(n, _)| n == name).map(|(_, c)| c)
    }

    /// Configured trees in descriptor order.
    pub fn trees(&self) -> impl Iterator<Item = (&str, &TreeConfig)> {
        self.trees.iter().map(|(n, c)| (n.as_str(), c))
    }

    pub fn is_empty(&self) -> bool {
        self.trees.is_empty()
    }
}
