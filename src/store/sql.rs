use super::{Backend, StoreError};
use crate::labels::{Label, LabelTable, LanguageCode};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use sqlx::{Row, Sqlite, Transaction};
use std::str::FromStr;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::info;

/// Label table stored as `labels(id, namespace, label)` plus
/// `translations(id, label_id, language, translation)`.
///
/// A composed label `namespace:key` is split over the two label columns.
/// Labels without translation rows read back as all-blank.
pub struct SqlBackend {
    pool: SqlitePool,
    url: String,
    /// True until the first read when the tables were created by us.
    fresh: AtomicBool,
}

impl SqlBackend {
    /// Connect and create the schema when missing.
    pub async fn connect(database_url: &str) -> Result<Self, StoreError> {
        let unavailable = |e: sqlx::Error| StoreError::StorageUnavailable {
            location: database_url.to_string(),
            reason: e.to_string(),
        };

        let options = SqliteConnectOptions::from_str(database_url)
            .map_err(unavailable)?
            .create_if_missing(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await
            .map_err(unavailable)?;

        let existed = Self::tables_exist(&pool).await.map_err(unavailable)?;
        Self::create_tables(&pool).await.map_err(unavailable)?;

        if !existed {
            info!("Created label tables in {}", database_url);
        }

        Ok(Self {
            pool,
            url: database_url.to_string(),
            fresh: AtomicBool::new(!existed),
        })
    }

    async fn tables_exist(pool: &SqlitePool) -> Result<bool, sqlx::Error> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM sqlite_master WHERE type='table' AND name='labels'",
        )
        .fetch_one(pool)
        .await?;

        Ok(count > 0)
    }

    async fn create_tables(pool: &SqlitePool) -> Result<(), sqlx::Error> {
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS labels (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                namespace TEXT NOT NULL DEFAULT '',
                label TEXT NOT NULL,
                UNIQUE (namespace, label)
            )",
        )
        .execute(pool)
        .await?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS translations (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                label_id INTEGER NOT NULL REFERENCES labels(id) ON DELETE CASCADE,
                language TEXT NOT NULL,
                translation TEXT NOT NULL DEFAULT '',
                UNIQUE (label_id, language)
            )",
        )
        .execute(pool)
        .await?;

        Ok(())
    }

    fn write_error(&self, e: sqlx::Error) -> StoreError {
        StoreError::WriteError {
            location: self.location(),
            reason: e.to_string(),
        }
    }

    /// Insert the label row if missing and return its id.
    async fn ensure_label(
        tx: &mut Transaction<'_, Sqlite>,
        label: &Label,
    ) -> Result<i64, sqlx::Error> {
        let (namespace, key) = label.split_namespace();

        sqlx::query(
            "INSERT INTO labels (namespace, label) VALUES (?1, ?2)
             ON CONFLICT (namespace, label) DO NOTHING",
        )
        .bind(namespace)
        .bind(key)
        .execute(&mut **tx)
        .await?;

        sqlx::query_scalar("SELECT id FROM labels WHERE namespace = ?1 AND label = ?2")
            .bind(namespace)
            .bind(key)
            .fetch_one(&mut **tx)
            .await
    }

    async fn replace_rows(&self, table: &LabelTable) -> Result<(), sqlx::Error> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("DELETE FROM translations").execute(&mut *tx).await?;
        sqlx::query("DELETE FROM labels").execute(&mut *tx).await?;

        for (label, translations) in table {
            let label_id = Self::ensure_label(&mut tx, label).await?;

            for (language, translation) in translations.iter() {
                sqlx::query(
                    "INSERT INTO translations (label_id, language, translation)
                     VALUES (?1, ?2, ?3)",
                )
                .bind(label_id)
                .bind(language)
                .bind(translation)
                .execute(&mut *tx)
                .await?;
            }
        }

        tx.commit().await
    }
}

impl Backend for SqlBackend {
    fn location(&self) -> String {
        self.url.clone()
    }

    async fn read(&self) -> Result<Option<LabelTable>, StoreError> {
        if self.fresh.swap(false, Ordering::SeqCst) {
            return Ok(None);
        }

        let rows = sqlx::query(
            "SELECT l.namespace, l.label, t.language, t.translation
             FROM labels l
             LEFT JOIN translations t ON t.label_id = l.id
             ORDER BY l.namespace, l.label, t.language",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(|e| StoreError::StorageUnavailable {
            location: self.location(),
            reason: e.to_string(),
        })?;

        let mut table = LabelTable::new();
        for row in rows {
            let namespace: String = row.get("namespace");
            let key: String = row.get("label");
            let language: Option<String> = row.get("language");
            let translation: Option<String> = row.get("translation");

            let label = if namespace.is_empty() {
                Label::from_stored(key)
            } else {
                Label::from_stored(format!("{}:{}", namespace, key))
            };

            let set = table.entry(label);
            if let Some(language) = language {
                set.set(&language, translation.unwrap_or_default());
            }
        }

        Ok(Some(table))
    }

    async fn seed(&self, table: &LabelTable, _raw: &str) -> Result<(), StoreError> {
        self.replace_rows(table)
            .await
            .map_err(|e| self.write_error(e))
    }

    async fn write_all(&self, table: &LabelTable, _encoded: &str) -> Result<(), StoreError> {
        self.replace_rows(table)
            .await
            .map_err(|e| self.write_error(e))
    }

    /// Inserts the label with its blank translations. Rows inserted
    /// concurrently by another request are left alone.
    async fn insert_label(&self, label: &Label, table: &LabelTable) -> Result<(), StoreError> {
        let result: Result<(), sqlx::Error> = async {
            let mut tx = self.pool.begin().await?;
            let label_id = Self::ensure_label(&mut tx, label).await?;

            let blanks = table.get(label).into_iter().flat_map(|set| set.iter());
            for (language, translation) in blanks {
                sqlx::query(
                    "INSERT INTO translations (label_id, language, translation)
                     VALUES (?1, ?2, ?3)
                     ON CONFLICT (label_id, language) DO NOTHING",
                )
                .bind(label_id)
                .bind(language)
                .bind(translation)
                .execute(&mut *tx)
                .await?;
            }

            tx.commit().await
        }
        .await;

        result.map_err(|e| self.write_error(e))
    }

    async fn upsert_translation(
        &self,
        label: &Label,
        language: &LanguageCode,
        translation: &str,
        _table: &LabelTable,
    ) -> Result<(), StoreError> {
        let result: Result<(), sqlx::Error> = async {
            let mut tx = self.pool.begin().await?;
            let label_id = Self::ensure_label(&mut tx, label).await?;

            sqlx::query(
                "INSERT INTO translations (label_id, language, translation)
                 VALUES (?1, ?2, ?3)
                 ON CONFLICT (label_id, language) DO UPDATE SET translation = excluded.translation",
            )
            .bind(label_id)
            .bind(language.as_str())
            .bind(translation)
            .execute(&mut *tx)
            .await?;

            tx.commit().await
        }
        .await;

        result.map_err(|e| self.write_error(e))
    }
}
