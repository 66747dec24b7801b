use crate::labels::LanguageCode;
use crate::store::Seed;
use anyhow::{bail, Context, Result};
use std::path::PathBuf;

/// Which backend holds the label table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StorageKind {
    File,
    Sql,
}

/// Settings that shape label resolution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LabelsConfig {
    /// Languages the deployment accepts; new labels get a blank entry for each
    pub languages: Vec<LanguageCode>,
    pub default_language: LanguageCode,
    /// Register labels the first time a lookup misses them
    pub add_missing: bool,
    /// Use the default-language translation when the requested one is blank
    pub use_fallback: bool,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub labels: LabelsConfig,

    // Storage
    pub storage: StorageKind,
    pub labels_file: PathBuf,
    pub seed_file: Option<PathBuf>,
    pub database_url: String,

    // Admin access (admin routes are disabled when unset)
    pub api_key: Option<String>,

    // Server
    pub port: u16,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        let languages = parse_languages(
            &std::env::var("LABELS_LANGUAGES").unwrap_or_else(|_| "en".to_string()),
        )?;

        // The default is trusted as configured; it only falls back to the
        // first configured language when unset.
        let default_language = match std::env::var("LABELS_DEFAULT_LANGUAGE") {
            Ok(code) if !code.trim().is_empty() => {
                LanguageCode::trusted(&code.trim().to_lowercase())
            }
            _ => languages[0].clone(),
        };

        let storage = match std::env::var("LABELS_STORAGE")
            .unwrap_or_else(|_| "file".to_string())
            .to_lowercase()
            .as_str()
        {
            "file" => StorageKind::File,
            "sql" => StorageKind::Sql,
            other => bail!("Invalid LABELS_STORAGE '{}': expected 'file' or 'sql'", other),
        };

        Ok(Self {
            labels: LabelsConfig {
                languages,
                default_language,
                add_missing: parse_bool("LABELS_ADD_MISSING", true)?,
                use_fallback: parse_bool("LABELS_USE_FALLBACK", true)?,
            },

            // Storage
            storage,
            labels_file: std::env::var("LABELS_FILE")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("config/extensions/labels.json")),
            seed_file: std::env::var("LABELS_SEED_FILE").ok().map(PathBuf::from),
            database_url: std::env::var("DATABASE_URL")
                .unwrap_or_else(|_| "sqlite://labels.db".to_string()),

            // Admin
            api_key: std::env::var("API_KEY").ok().filter(|key| !key.is_empty()),

            // Server
            port: std::env::var("PORT")
                .ok()
                .map(|v| v.parse().context("PORT must be a port number"))
                .transpose()?
                .unwrap_or(8080),
        })
    }

    /// Seed used when the configured storage is empty.
    pub fn seed(&self) -> Seed {
        match &self.seed_file {
            Some(path) => Seed::File(path.clone()),
            None => Seed::Bundled,
        }
    }
}

/// Parse a comma-separated language list such as `en, NL,de`.
fn parse_languages(value: &str) -> Result<Vec<LanguageCode>> {
    let mut languages: Vec<LanguageCode> = Vec::new();

    for part in value.split(',').map(str::trim).filter(|s| !s.is_empty()) {
        let code = LanguageCode::parse_lenient(part)
            .with_context(|| format!("Invalid language code '{}' in LABELS_LANGUAGES", part))?;
        if !languages.contains(&code) {
            languages.push(code);
        }
    }

    if languages.is_empty() {
        bail!("LABELS_LANGUAGES must list at least one language");
    }

    Ok(languages)
}

fn parse_bool(name: &str, default: bool) -> Result<bool> {
    match std::env::var(name) {
        Ok(value) => match value.trim().to_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => Ok(true),
            "0" | "false" | "no" | "off" => Ok(false),
            other => bail!("{} must be a boolean, got '{}'", name, other),
        },
        Err(_) => Ok(default),
    }
}
