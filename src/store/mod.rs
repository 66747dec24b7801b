//! Durable label storage with a process-lifetime cache.
//!
//! `LabelStore` owns the caching, seeding and write policy; the two
//! interchangeable [`Backend`]s only move tables in and out of their medium:
//!
//! - `file`: one JSON document ([`FileBackend`])
//! - `sql`: `labels` + `translations` tables ([`SqlBackend`])
//!
//! The cache is filled on the first `load()` and never re-read from the
//! backend afterwards. Writes made through this store update it; writes made
//! by another process stay invisible until restart.

mod file;
mod sql;

pub use file::FileBackend;
pub use sql::SqlBackend;

use crate::config::{Config, StorageKind};
use crate::labels::{Label, LabelTable, LanguageCode, TranslationSet};
use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

/// Anything shorter than this is treated as a corrupt encoding and not saved.
pub const MIN_ENCODED_LEN: usize = 50;

/// Table shipped with the crate, used to seed empty storage.
pub const BUNDLED_LABELS: &str = include_str!("../../files/labels.json");

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StoreError {
    #[error("The labels storage at {location} can not be read or created: {reason}")]
    StorageUnavailable { location: String, reason: String },

    #[error("There was an issue loading the labels: {0}")]
    ParseError(String),

    #[error("There was an issue encoding the labels ({size} bytes). Changes were NOT saved.")]
    EncodingTooSmall { size: usize },

    #[error("The labels storage at {location} is not writable: {reason}. Changes were NOT saved.")]
    WriteError { location: String, reason: String },
}

/// A persistence medium for the label table.
pub trait Backend: Send + Sync {
    /// Human-readable location used in messages (path or database URL).
    fn location(&self) -> String;

    /// The persisted table, or `None` when nothing has been persisted yet.
    fn read(&self) -> impl Future<Output = Result<Option<LabelTable>, StoreError>> + Send;

    /// First write into empty storage. `raw` is the seed document as shipped.
    fn seed(
        &self,
        table: &LabelTable,
        raw: &str,
    ) -> impl Future<Output = Result<(), StoreError>> + Send;

    /// Overwrite everything with `table`. `encoded` is its JSON encoding.
    fn write_all(
        &self,
        table: &LabelTable,
        encoded: &str,
    ) -> impl Future<Output = Result<(), StoreError>> + Send;

    /// Persist a newly registered label. `table` already contains it.
    /// Must tolerate the label having been inserted concurrently.
    fn insert_label(
        &self,
        label: &Label,
        table: &LabelTable,
    ) -> impl Future<Output = Result<(), StoreError>> + Send;

    /// Persist a single translation. `table` already contains it.
    fn upsert_translation(
        &self,
        label: &Label,
        language: &LanguageCode,
        translation: &str,
        table: &LabelTable,
    ) -> impl Future<Output = Result<(), StoreError>> + Send;
}

/// Where the initial table comes from when storage is empty.
#[derive(Debug, Clone, Default)]
pub enum Seed {
    /// The table compiled into the crate
    #[default]
    Bundled,
    /// A JSON file on disk
    File(PathBuf),
    /// Start empty
    None,
}

impl Seed {
    async fn read(&self) -> Result<Option<String>, StoreError> {
        match self {
            Seed::Bundled => Ok(Some(BUNDLED_LABELS.to_string())),
            Seed::File(path) => tokio::fs::read_to_string(path)
                .await
                .map(Some)
                .map_err(|e| StoreError::StorageUnavailable {
                    location: path.display().to_string(),
                    reason: e.to_string(),
                }),
            Seed::None => Ok(None),
        }
    }
}

/// Result of [`LabelStore::load`].
#[derive(Debug, Clone)]
pub struct Loaded {
    pub table: Arc<LabelTable>,
    /// Set while the store runs on a degraded (empty) table because the
    /// backing data could not be read. Cleared by a successful `replace_all`.
    pub warning: Option<StoreError>,
}

/// Outcome of [`LabelStore::add_if_absent`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Registration {
    AlreadyPresent,
    Persisted,
    /// Added to the cache, but the write failed or the store is degraded
    InMemoryOnly,
    /// Empty labels are never registered
    Rejected,
}

#[derive(Debug, Clone)]
struct Cached {
    table: Arc<LabelTable>,
    warning: Option<StoreError>,
}

impl Cached {
    fn degraded(warning: StoreError) -> Self {
        Self {
            table: Arc::new(LabelTable::new()),
            warning: Some(warning),
        }
    }
}

pub struct LabelStore<B> {
    backend: B,
    languages: Vec<LanguageCode>,
    seed: Seed,
    cache: Mutex<Option<Cached>>,
}

impl<B: Backend> LabelStore<B> {
    /// `languages` are the configured languages new labels are registered with.
    pub fn new(backend: B, languages: Vec<LanguageCode>) -> Self {
        Self {
            backend,
            languages,
            seed: Seed::default(),
            cache: Mutex::new(None),
        }
    }

    /// Use `seed` instead of the bundled table when storage is empty.
    pub fn with_seed(mut self, seed: Seed) -> Self {
        self.seed = seed;
        self
    }

    /// Get the configured languages
    pub fn languages(&self) -> &[LanguageCode] {
        &self.languages
    }

    /// Get the underlying backend
    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// The current table. Reads the backend once per process; later calls
    /// are served from the cache.
    pub async fn load(&self) -> Loaded {
        let mut cache = self.cache.lock().await;
        let cached = self.cached(&mut cache).await;

        Loaded {
            table: Arc::clone(&cached.table),
            warning: cached.warning.clone(),
        }
    }

    /// Atomically replace the persisted table. On failure the cache keeps
    /// the previous table.
    pub async fn replace_all(&self, table: LabelTable) -> Result<(), StoreError> {
        let encoded = table.encode().map_err(|e| StoreError::WriteError {
            location: self.backend.location(),
            reason: e.to_string(),
        })?;

        if encoded.len() < MIN_ENCODED_LEN {
            warn!(
                "Refusing to save labels: encoding is only {} bytes",
                encoded.len()
            );
            return Err(StoreError::EncodingTooSmall {
                size: encoded.len(),
            });
        }

        let mut cache = self.cache.lock().await;
        self.backend.write_all(&table, &encoded).await?;

        info!("Saved {} labels to {}", table.len(), self.backend.location());
        *cache = Some(Cached {
            table: Arc::new(table),
            warning: None,
        });

        Ok(())
    }

    /// Register `label` with blank translations for every configured
    /// language, unless it already exists. Never fails: write errors are
    /// logged and the label stays registered in memory.
    pub async fn add_if_absent(&self, label: &Label) -> Registration {
        if label.is_empty() {
            return Registration::Rejected;
        }

        let mut cache = self.cache.lock().await;
        let cached = self.cached(&mut cache).await;

        if cached.table.contains(label) {
            return Registration::AlreadyPresent;
        }

        let mut table = LabelTable::clone(&cached.table);
        table.insert(label.clone(), TranslationSet::blank(&self.languages));

        let registration = if let Some(warning) = &cached.warning {
            debug!("Storage degraded ({}), keeping '{}' in memory", warning, label);
            Registration::InMemoryOnly
        } else {
            match self.backend.insert_label(label, &table).await {
                Ok(()) => {
                    debug!("Registered missing label '{}'", label);
                    Registration::Persisted
                }
                Err(e) => {
                    warn!("Failed to persist missing label '{}': {}", label, e);
                    Registration::InMemoryOnly
                }
            }
        };

        cached.table = Arc::new(table);
        registration
    }

    /// Set one translation, registering the label first when needed.
    pub async fn set_translation(
        &self,
        label: &Label,
        language: &LanguageCode,
        translation: &str,
    ) -> Result<(), StoreError> {
        let mut cache = self.cache.lock().await;
        let cached = self.cached(&mut cache).await;

        if let Some(warning) = &cached.warning {
            return Err(warning.clone());
        }

        let unchanged = cached
            .table
            .get(label)
            .and_then(|set| set.get(language.as_str()))
            .is_some_and(|current| current == translation);
        if unchanged {
            return Ok(());
        }

        let mut table = LabelTable::clone(&cached.table);
        if !table.contains(label) {
            table.insert(label.clone(), TranslationSet::blank(&self.languages));
        }
        table
            .entry(label.clone())
            .set(language.as_str(), translation);

        self.backend
            .upsert_translation(label, language, translation, &table)
            .await?;

        cached.table = Arc::new(table);
        Ok(())
    }

    /// Fill the cache on first use.
    async fn cached<'a>(&self, cache: &'a mut Option<Cached>) -> &'a mut Cached {
        let cached = match cache.take() {
            Some(cached) => cached,
            None => self.read_or_seed().await,
        };
        cache.insert(cached)
    }

    async fn read_or_seed(&self) -> Cached {
        match self.backend.read().await {
            Ok(Some(table)) => {
                info!(
                    "Loaded {} labels from {}",
                    table.len(),
                    self.backend.location()
                );
                Cached {
                    table: Arc::new(table),
                    warning: None,
                }
            }
            Ok(None) => self.seed_storage().await,
            Err(e) => {
                warn!("Running with an empty label table: {}", e);
                Cached::degraded(e)
            }
        }
    }

    async fn seed_storage(&self) -> Cached {
        let raw = match self.seed.read().await {
            Ok(Some(raw)) => raw,
            Ok(None) => {
                info!("No labels stored yet, starting empty");
                return Cached {
                    table: Arc::new(LabelTable::new()),
                    warning: None,
                };
            }
            Err(e) => {
                warn!("Seed labels unavailable: {}", e);
                return Cached::degraded(e);
            }
        };

        let table = match LabelTable::decode(&raw) {
            Ok(table) => table,
            Err(e) => {
                let e = StoreError::ParseError(e.to_string());
                warn!("Seed labels unusable: {}", e);
                return Cached::degraded(e);
            }
        };

        match self.backend.seed(&table, &raw).await {
            Ok(()) => {
                info!(
                    "Seeded {} with {} default labels",
                    self.backend.location(),
                    table.len()
                );
                Cached {
                    table: Arc::new(table),
                    warning: None,
                }
            }
            Err(e) => {
                warn!("Could not create label storage: {}", e);
                Cached::degraded(e)
            }
        }
    }
}

/// Backend picked at runtime from configuration.
pub enum AnyBackend {
    File(FileBackend),
    Sql(SqlBackend),
}

impl Backend for AnyBackend {
    fn location(&self) -> String {
        match self {
            AnyBackend::File(backend) => backend.location(),
            AnyBackend::Sql(backend) => backend.location(),
        }
    }

    async fn read(&self) -> Result<Option<LabelTable>, StoreError> {
        match self {
            AnyBackend::File(backend) => backend.read().await,
            AnyBackend::Sql(backend) => backend.read().await,
        }
    }

    async fn seed(&self, table: &LabelTable, raw: &str) -> Result<(), StoreError> {
        match self {
            AnyBackend::File(backend) => backend.seed(table, raw).await,
            AnyBackend::Sql(backend) => backend.seed(table, raw).await,
        }
    }

    async fn write_all(&self, table: &LabelTable, encoded: &str) -> Result<(), StoreError> {
        match self {
            AnyBackend::File(backend) => backend.write_all(table, encoded).await,
            AnyBackend::Sql(backend) => backend.write_all(table, encoded).await,
        }
    }

    async fn insert_label(&self, label: &Label, table: &LabelTable) -> Result<(), StoreError> {
        match self {
            AnyBackend::File(backend) => backend.insert_label(label, table).await,
            AnyBackend::Sql(backend) => backend.insert_label(label, table).await,
        }
    }

    async fn upsert_translation(
        &self,
        label: &Label,
        language: &LanguageCode,
        translation: &str,
        table: &LabelTable,
    ) -> Result<(), StoreError> {
        match self {
            AnyBackend::File(backend) => {
                backend
                    .upsert_translation(label, language, translation, table)
                    .await
            }
            AnyBackend::Sql(backend) => {
                backend
                    .upsert_translation(label, language, translation, table)
                    .await
            }
        }
    }
}

impl LabelStore<AnyBackend> {
    /// Open the store selected by `config.storage`.
    pub async fn open(config: &Config) -> Result<Self, StoreError> {
        let backend = match config.storage {
            StorageKind::File => AnyBackend::File(FileBackend::new(&config.labels_file)),
            StorageKind::Sql => AnyBackend::Sql(SqlBackend::connect(&config.database_url).await?),
        };

        info!("Using label storage at {}", backend.location());
        Ok(LabelStore::new(backend, config.labels.languages.clone()).with_seed(config.seed()))
    }
}
