//! Build request types handed to the external executor.

use crate::change::Change;
use crate::config::TreeConfig;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};
use std::collections::BTreeMap;

/// Canonical line of history revisions are resolved on.
pub const DEFAULT_LINE: &str = "default";

/// The sources a build request was triggered by.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SourceStamp {
    pub branch: Option<String>,
    pub changes: Vec<Change>,
}

impl SourceStamp {
    pub fn for_changes(branch: Option<String>, changes: Vec<Change>) -> Self {
        Self { branch, changes }
    }
}

/// A branch role resolved to a concrete repository path and revision.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BranchPin {
    /// Relative repository path (locale-qualified for the l10n role).
    pub branch: String,
    pub revision: String,
}

/// Parameter bundle for one (tree, locale) comparison build.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompareParams {
    pub tree: String,
    /// Relative path of the localization forest.
    pub l10nbase: String,
    pub locale: String,
    /// English-branch relative path joined with the tree's manifest path.
    pub inipath: String,
    /// Most recent contributing change timestamp, bumped to the resolved
    /// push date where that is newer.
    pub srctime: Option<DateTime<Utc>>,
    /// Branch role to resolved pin, ordered by role name.
    pub revisions: BTreeMap<String, BranchPin>,
}

impl CompareParams {
    /// Flatten to the property set the comparison executor expects:
    /// `tree`, `l10nbase`, `locale`, `inipath`, `srctime`, `revisions`
    /// (sorted role names), and `<role>_branch` / `<role>_revision` per
    /// role.
    pub fn to_properties(&self) -> Map<String, Value> {
        let mut props = Map::new();
        props.insert("tree".into(), json!(self.tree));
        props.insert("l10nbase".into(), json!(self.l10nbase));
        props.insert("locale".into(), json!(self.locale));
        props.insert("inipath".into(), json!(self.inipath));
        props.insert("srctime".into(), json!(self.srctime));
        let roles: Vec<&String> = self.revisions.keys().collect();
        props.insert("revisions".into(), json!(roles));
        for (role, pin) in &self.revisions {
            props.insert(format!("{role}_branch"), json!(pin.branch));
            props.insert(format!("{role}_revision"), json!(pin.revision));
        }
        props
    }
}

/// A comparison build request for one (tree, locale) pair.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompareRequest {
    /// Builder names the request targets.
    pub builders: Vec<String>,
    pub stamp: SourceStamp,
    pub params: CompareParams,
}

/// Parameter bundle for one per-locale weave build.
///
/// Weave builds track the default line of history directly instead of
/// pinning resolved revisions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeaveParams {
    pub tree: String,
    /// Localization branch path.
    pub branch: String,
    /// English branch path.
    pub en_branch: String,
    /// Repository base URL.
    pub repourl: String,
    pub locale: String,
}

impl WeaveParams {
    /// Flatten to the property set the weave executor expects: `locale`,
    /// `tree`, `branch`, `repourl`, the en-US reference path, and the
    /// per-side branch/revision pairs on the default line.
    pub fn to_properties(&self) -> Map<String, Value> {
        let refpath = format!("{}/en-US", self.en_branch);
        let mut props = Map::new();
        props.insert("locale".into(), json!(self.locale));
        props.insert("tree".into(), json!(self.tree));
        props.insert("branch".into(), json!(self.branch));
        props.insert("repourl".into(), json!(self.repourl));
        props.insert("refpath".into(), json!(refpath));
        props.insert("en_branch".into(), json!(refpath));
        props.insert("en_revision".into(), json!(DEFAULT_LINE));
        props.insert(
            "l10npath".into(),
            json!(format!("{}/{}", self.branch, self.locale)),
        );
        props.insert("l10n_branch".into(), json!(self.branch));
        props.insert("l10n_revision".into(), json!(DEFAULT_LINE));
        props
    }
}

/// A weave build request for one locale.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeaveRequest {
    /// Builder names the request targets.
    pub builders: Vec<String>,
    /// Human-readable trigger description (`<tree> <locale>`).
    pub reason: String,
    pub stamp: SourceStamp,
    pub params: WeaveParams,
}

/// A tree-metadata-load build request.
///
/// The only request kind whose completion the scheduler awaits; the
/// executor resolves the handle with the loaded tree.
#[derive(Debug, Clone, PartialEq)]
pub struct TreeLoadRequest {
    pub builder: String,
    pub tree: String,
    /// Descriptor section to load from; absent when the scheduler runs
    /// without a descriptor (tests).
    pub config: Option<TreeConfig>,
    pub stamp: SourceStamp,
}
