//! Push/change records delivered by the host's change source.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// A push received from version control.
///
/// Changes are treated as immutable once received; the author and comment
/// payloads are passed through to build requests unmodified.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Change {
    /// Origin repository branch identifier.
    pub branch: String,
    /// Changed file paths, in push order.
    pub files: Vec<String>,
    /// Locale code, set for pushes to per-locale repositories.
    pub locale: Option<String>,
    /// Push timestamp.
    pub when: Option<DateTime<Utc>>,
    /// Tip changeset revision of the push.
    pub revision: Option<String>,
    pub who: String,
    pub comments: String,
    /// Opaque properties attached by the change source.
    #[serde(default)]
    pub properties: HashMap<String, serde_json::Value>,
}

impl Change {
    pub fn new(branch: impl Into<String>, files: Vec<String>) -> Self {
        Self {
            branch: branch.into(),
            files,
            locale: None,
            when: None,
            revision: None,
            who: String::new(),
            comments: String::new(),
            properties: HashMap::new(),
        }
    }

    pub fn with_locale(mut self, locale: impl Into<String>) -> Self {
        self.locale = Some(locale.into());
        self
    }

    pub fn with_when(mut self, when: DateTime<Utc>) -> Self {
        self.when = Some(when);
        self
    }

    pub fn with_revision(mut self, revision: impl Into<String>) -> Self {
        self.revision = Some(revision.into());
        self
    }

    pub fn with_property(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.properties.insert(key.into(), value);
        self
    }

    /// The locale this change applies to: the explicit field wins, then a
    /// `locale` property. `None` marks an English-repo change.
    pub fn resolved_locale(&self) -> Option<&str> {
        if let Some(locale) = self.locale.as_deref()
            && !locale.is_empty()
        {
            return Some(locale);
        }
        self.properties
            .get("locale")
            .and_then(|v| v.as_str())
            .filter(|s| !s.is_empty())
    }
}
