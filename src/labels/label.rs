//! Label keys and the cleaning rule applied before every lookup or store.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::OnceLock;

/// Separator between namespace and key in a composed label.
pub const NAMESPACE_SEPARATOR: char = ':';

static TAG_REGEX: OnceLock<Regex> = OnceLock::new();

/// A normalized label key (tag-stripped, trimmed, lower-cased).
///
/// Construct through [`Label::clean`] so that every key in a table went
/// through the same normalization; `from_stored` exists for keys read back
/// from persisted data, which were cleaned when first written.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Label(String);

impl Label {
    /// Apply the cleaning rule to a raw label.
    pub fn clean(raw: &str) -> Label {
        let regex = TAG_REGEX.get_or_init(|| {
            Regex::new(r"<[^>]*>").expect("Invalid tag regex")
        });

        let stripped = regex.replace_all(raw, "");
        let stripped = stripped.replace("&amp;", "");

        Label(stripped.trim().to_lowercase())
    }

    /// Compose `namespace:key`, cleaning both parts.
    ///
    /// An empty namespace yields the bare key.
    pub fn namespaced(namespace: &str, key: &str) -> Label {
        let namespace = Label::clean(namespace);
        let key = Label::clean(key);

        if namespace.is_empty() {
            key
        } else {
            Label(format!("{}{}{}", namespace.0, NAMESPACE_SEPARATOR, key.0))
        }
    }

    /// Wrap a key taken verbatim from persisted storage.
    pub(crate) fn from_stored(key: String) -> Label {
        Label(key)
    }

    /// Split into `(namespace, key)`. Labels without a separator, or with
    /// nothing before it (`:key`), live in the empty namespace with the
    /// whole label as key, so the split always recomposes to the label.
    pub fn split_namespace(&self) -> (&str, &str) {
        match self.0.split_once(NAMESPACE_SEPARATOR) {
            Some((namespace, key)) if !namespace.is_empty() => (namespace, key),
            _ => ("", &self.0),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for Label {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for Label {
    fn as_ref(&self) -> &str {
        &self.0
    }
}
