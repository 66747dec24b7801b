//! The label table: label → {language → translation}.
//!
//! `BTreeMap` keeps both levels sorted, so the JSON encoding is stable and
//! diff-friendly without a separate sort step.

use crate::labels::{Label, LanguageCode};
use serde::de::IgnoredAny;
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::btree_map::{self, BTreeMap};
use tracing::debug;

/// Translations of one label, keyed by lower-case language code.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct TranslationSet(BTreeMap<String, String>);

impl TranslationSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// A set with an empty string for every given language.
    pub fn blank(languages: &[LanguageCode]) -> Self {
        Self(
            languages
                .iter()
                .map(|code| (code.as_str().to_string(), String::new()))
                .collect(),
        )
    }

    /// The translation for `language`, compared case-insensitively.
    pub fn get(&self, language: &str) -> Option<&str> {
        self.0.get(&language.to_lowercase()).map(String::as_str)
    }

    /// The translation for `language` if it is present and non-empty.
    pub fn non_empty(&self, language: &str) -> Option<&str> {
        self.get(language).filter(|value| !value.is_empty())
    }

    pub fn set(&mut self, language: &str, translation: impl Into<String>) {
        self.0.insert(language.to_lowercase(), translation.into());
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(lang, value)| (lang.as_str(), value.as_str()))
    }

    /// Whether every translation is blank.
    pub fn is_blank(&self) -> bool {
        self.0.values().all(String::is_empty)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<L: Into<String>, T: Into<String>> FromIterator<(L, T)> for TranslationSet {
    fn from_iter<I: IntoIterator<Item = (L, T)>>(iter: I) -> Self {
        let mut set = TranslationSet::new();
        for (language, translation) in iter {
            let language: String = language.into();
            set.set(&language, translation);
        }
        set
    }
}

/// Shapes older writers have produced for a label's translations.
#[derive(Deserialize)]
#[serde(untagged)]
enum StoredSet {
    Map(BTreeMap<String, Option<String>>),
    // `[]`: an empty set encoded as a list
    List(Vec<IgnoredAny>),
}

impl<'de> Deserialize<'de> for TranslationSet {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let stored = Option::<StoredSet>::deserialize(deserializer)?;

        Ok(match stored {
            Some(StoredSet::Map(map)) => map
                .into_iter()
                .map(|(language, value)| (language, value.unwrap_or_default()))
                .collect(),
            Some(StoredSet::List(items)) => {
                if !items.is_empty() {
                    debug!("Dropping {} unkeyed translations", items.len());
                }
                TranslationSet::new()
            }
            None => TranslationSet::new(),
        })
    }
}

/// The full label table, the unit of persistence.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LabelTable(BTreeMap<Label, TranslationSet>);

impl LabelTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, label: &Label) -> Option<&TranslationSet> {
        self.0.get(label)
    }

    /// `table[label][language]` when present and non-empty.
    pub fn translation(&self, label: &Label, language: &str) -> Option<&str> {
        self.0.get(label).and_then(|set| set.non_empty(language))
    }

    pub fn contains(&self, label: &Label) -> bool {
        self.0.contains_key(label)
    }

    pub fn insert(&mut self, label: Label, translations: TranslationSet) {
        self.0.insert(label, translations);
    }

    /// Entry for `label`, created empty when absent.
    pub fn entry(&mut self, label: Label) -> &mut TranslationSet {
        self.0.entry(label).or_default()
    }

    pub fn labels(&self) -> impl Iterator<Item = &Label> {
        self.0.keys()
    }

    pub fn iter(&self) -> btree_map::Iter<'_, Label, TranslationSet> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Deterministic, human-readable JSON encoding used for persistence.
    pub fn encode(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }

    /// Parse a persisted table. Keys are taken as stored, language keys are
    /// lower-cased.
    pub fn decode(json: &str) -> serde_json::Result<LabelTable> {
        let raw: BTreeMap<String, TranslationSet> = serde_json::from_str(json)?;
        Ok(LabelTable(
            raw.into_iter()
                .map(|(key, set)| (Label::from_stored(key), set))
                .collect(),
        ))
    }
}

impl FromIterator<(Label, TranslationSet)> for LabelTable {
    fn from_iter<I: IntoIterator<Item = (Label, TranslationSet)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl<'a> IntoIterator for &'a LabelTable {
    type Item = (&'a Label, &'a TranslationSet);
    type IntoIter = btree_map::Iter<'a, Label, TranslationSet>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}
