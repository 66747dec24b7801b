//! Language codes and per-request language resolution.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A validated 2-letter lowercase language code (`^[a-z]{2}$`).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct LanguageCode(String);

impl LanguageCode {
    /// Validate a code exactly as given. Upper-case input is rejected.
    pub fn parse(code: &str) -> Option<LanguageCode> {
        if is_valid_code(code) {
            Some(LanguageCode(code.to_string()))
        } else {
            None
        }
    }

    /// Lower-case, then validate. Used wherever codes are compared
    /// case-insensitively (per-call overrides, bulk-edit columns, config).
    pub fn parse_lenient(code: &str) -> Option<LanguageCode> {
        LanguageCode::parse(&code.trim().to_lowercase())
    }

    /// Build a code from trusted configuration without re-validating it.
    pub(crate) fn trusted(code: &str) -> LanguageCode {
        LanguageCode(code.to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

fn is_valid_code(code: &str) -> bool {
    code.len() == 2 && code.bytes().all(|b| b.is_ascii_lowercase())
}

impl fmt::Display for LanguageCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for LanguageCode {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        LanguageCode::parse(&value).ok_or_else(|| format!("Invalid language code: '{}'", value))
    }
}

impl From<LanguageCode> for String {
    fn from(code: LanguageCode) -> Self {
        code.0
    }
}

/// Everything a request offers for picking its language.
#[derive(Debug, Clone, Copy, Default)]
pub struct LanguageHints<'a> {
    /// Explicit `?lang=` parameter
    pub explicit: Option<&'a str>,
    /// `Host` header, e.g. `nl.example.org`
    pub host: Option<&'a str>,
    /// Request path, e.g. `/nl/pages`
    pub path: Option<&'a str>,
    /// Locale, e.g. `nl_NL` or an `Accept-Language` value
    pub locale: Option<&'a str>,
}

/// Pick the active language for a request. First match wins:
///
/// 1. explicit parameter
/// 2. subdomain (`nl.example.org`)
/// 3. path prefix (`/nl/...`)
/// 4. locale (`nl_NL`)
/// 5. configured default
///
/// Steps 1-4 only accept valid codes from `allowed`. The default comes from
/// configuration and is used as is.
pub fn resolve_language(
    hints: &LanguageHints<'_>,
    default: &LanguageCode,
    allowed: &[LanguageCode],
) -> LanguageCode {
    let is_allowed = |candidate: &str| allowed.iter().any(|code| code.as_str() == candidate);

    let candidates = [
        hints.explicit.map(str::to_string),
        hints.host.and_then(subdomain_code),
        hints.path.map(|path| first_two(path.strip_prefix('/').unwrap_or(path))),
        hints.locale.map(first_two),
    ];

    candidates
        .into_iter()
        .flatten()
        .find_map(|candidate| {
            LanguageCode::parse(&candidate).filter(|code| is_allowed(code.as_str()))
        })
        .unwrap_or_else(|| default.clone())
}

/// Leading `xx.` label of a host name.
fn subdomain_code(host: &str) -> Option<String> {
    let (first, _) = host.split_once('.')?;
    is_valid_code(first).then(|| first.to_string())
}

fn first_two(value: &str) -> String {
    value.chars().take(2).collect()
}

/// Request-scoped current language.
///
/// Lives for one request only: it is created from [`resolve_language`],
/// may be reassigned by a "set language" directive later in the same
/// request, and is never written back to a session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestLanguage {
    current: LanguageCode,
}

impl RequestLanguage {
    pub fn new(current: LanguageCode) -> Self {
        Self { current }
    }

    pub fn current(&self) -> &LanguageCode {
        &self.current
    }

    /// Override the language for the rest of the request. Invalid codes are
    /// ignored; returns whether the override was applied.
    pub fn set(&mut self, code: &str) -> bool {
        match LanguageCode::parse(code) {
            Some(code) => {
                self.current = code;
                true
            }
            None => false,
        }
    }
}
