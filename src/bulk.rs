//! Whole-table editing: tabular export, full replacement, CSV and paged
//! translator views.

use crate::labels::{Label, LabelTable, LanguageCode, TranslationSet};
use crate::store::{Backend, LabelStore, StoreError};
use serde::Serialize;
use std::sync::Arc;
use thiserror::Error;
use tracing::{info, warn};

/// Title of the first column in exports.
pub const LABEL_COLUMN: &str = "Label";

#[derive(Debug, Error)]
pub enum BulkError {
    #[error("Unable to save labels: no columns were submitted")]
    MissingColumns,

    #[error("Unable to save labels: '{0}' is not a valid language column")]
    InvalidColumn(String),

    #[error("Unable to save labels: row '{label}' has {found} values for {expected} languages")]
    RowTooLong {
        label: String,
        found: usize,
        expected: usize,
    },

    #[error("Unable to read CSV: {0}")]
    Csv(String),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// One exported row: a label and its translation per configured language.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExportRow {
    pub label: Label,
    pub values: Vec<String>,
}

impl ExportRow {
    /// The row as table cells, label first.
    pub fn cells(&self) -> Vec<String> {
        std::iter::once(self.label.to_string())
            .chain(self.values.iter().cloned())
            .collect()
    }
}

/// The label table projected onto fixed columns.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TableExport {
    /// `Label` followed by upper-cased language codes
    pub columns: Vec<String>,
    pub rows: Vec<ExportRow>,
}

/// A row of the side-by-side translator view.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TranslatableItem {
    pub label: Label,
    pub source: String,
    pub translation: String,
}

/// User-facing result of a save, shown as a flash message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Flash {
    pub status: &'static str,
    pub message: String,
}

impl Flash {
    pub fn from_result<T>(result: &Result<T, BulkError>) -> Self {
        match result {
            Ok(_) => Self {
                status: "success",
                message: "Changes to the labels have been saved.".to_string(),
            },
            Err(e) => Self {
                status: "error",
                message: e.to_string(),
            },
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == "success"
    }
}

pub struct BulkEditor<B> {
    store: Arc<LabelStore<B>>,
}

impl<B: Backend> BulkEditor<B> {
    pub fn new(store: Arc<LabelStore<B>>) -> Self {
        Self { store }
    }

    fn languages(&self) -> &[LanguageCode] {
        self.store.languages()
    }

    /// Rows sorted by label, one column per configured language, blank where
    /// a translation is missing.
    pub async fn export_table(&self) -> TableExport {
        let loaded = self.store.load().await;
        let languages = self.languages();

        let columns = std::iter::once(LABEL_COLUMN.to_string())
            .chain(languages.iter().map(|code| code.as_str().to_uppercase()))
            .collect();

        let rows = loaded
            .table
            .iter()
            .map(|(label, set)| ExportRow {
                label: label.clone(),
                values: languages
                    .iter()
                    .map(|code| set.get(code.as_str()).unwrap_or_default().to_string())
                    .collect(),
            })
            .collect();

        TableExport { columns, rows }
    }

    /// Replace the whole table with the submitted grid.
    ///
    /// `columns[0]` is the label column title and is dropped; the rest are
    /// language codes (any case). Each row starts with its label; rows
    /// whose cleaned label is empty are skipped. Returns the number of
    /// labels saved.
    pub async fn import_replacement(
        &self,
        columns: &[String],
        rows: &[Vec<String>],
    ) -> Result<usize, BulkError> {
        let table = build_table(columns, rows)?;
        let count = table.len();

        self.store.replace_all(table).await.map_err(|e| {
            warn!("Bulk save failed: {}", e);
            e
        })?;

        info!("Bulk save stored {} labels", count);
        Ok(count)
    }

    /// CSV with a `label,<lang>,...` header and one row per label.
    pub async fn export_csv(&self) -> Result<String, BulkError> {
        let export = self.export_table().await;

        let header: Vec<String> = std::iter::once("label".to_string())
            .chain(self.languages().iter().map(|code| code.to_string()))
            .collect();

        let mut writer = csv::Writer::from_writer(Vec::new());
        writer.write_record(&header).map_err(csv_error)?;
        for row in &export.rows {
            writer.write_record(row.cells()).map_err(csv_error)?;
        }

        let bytes = writer
            .into_inner()
            .map_err(|e| BulkError::Csv(e.to_string()))?;
        String::from_utf8(bytes).map_err(|e| BulkError::Csv(e.to_string()))
    }

    /// Replace the whole table from CSV in the `export_csv` layout.
    pub async fn import_csv(&self, text: &str) -> Result<usize, BulkError> {
        let mut records = read_csv(text)?.into_iter();
        let columns = records.next().ok_or(BulkError::MissingColumns)?;
        let rows: Vec<Vec<String>> = records.collect();

        self.import_replacement(&columns, &rows).await
    }

    /// Page through labels showing `source` next to `dest`, sorted by label.
    /// `untranslated_only` keeps labels whose `dest` translation is blank.
    pub async fn translatable_items(
        &self,
        source: &LanguageCode,
        dest: &LanguageCode,
        untranslated_only: bool,
        page: usize,
        page_size: usize,
    ) -> Vec<TranslatableItem> {
        let loaded = self.store.load().await;

        loaded
            .table
            .iter()
            .map(|(label, set)| TranslatableItem {
                label: label.clone(),
                source: set.get(source.as_str()).unwrap_or_default().to_string(),
                translation: set.get(dest.as_str()).unwrap_or_default().to_string(),
            })
            .filter(|item| !untranslated_only || item.translation.is_empty())
            .skip(page.saturating_mul(page_size))
            .take(page_size)
            .collect()
    }
}

/// Build a table from a submitted grid without touching storage.
pub fn build_table(columns: &[String], rows: &[Vec<String>]) -> Result<LabelTable, BulkError> {
    let (_, language_columns) = columns.split_first().ok_or(BulkError::MissingColumns)?;

    let languages = language_columns
        .iter()
        .map(|column| {
            LanguageCode::parse_lenient(column)
                .ok_or_else(|| BulkError::InvalidColumn(column.clone()))
        })
        .collect::<Result<Vec<_>, _>>()?;

    let mut table = LabelTable::new();
    for row in rows {
        let Some((raw_label, values)) = row.split_first() else {
            continue;
        };

        let label = Label::clean(raw_label);
        if label.is_empty() {
            continue;
        }

        if values.len() > languages.len() {
            return Err(BulkError::RowTooLong {
                label: label.to_string(),
                found: values.len(),
                expected: languages.len(),
            });
        }

        let translations: TranslationSet = languages
            .iter()
            .enumerate()
            .map(|(i, code)| {
                let value = values.get(i).cloned().unwrap_or_default();
                (code.as_str().to_string(), value)
            })
            .collect();

        table.insert(label, translations);
    }

    Ok(table)
}

fn csv_error(e: csv::Error) -> BulkError {
    BulkError::Csv(e.to_string())
}

/// All records of a CSV document, header included. Rows may differ in
/// length; blank lines are skipped.
fn read_csv(text: &str) -> Result<Vec<Vec<String>>, BulkError> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_reader(text.as_bytes());

    reader
        .records()
        .map(|record| {
            record
                .map(|record| record.iter().map(str::to_string).collect())
                .map_err(csv_error)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{FileBackend, Seed};
    use proptest::prelude::*;
    use tempfile::TempDir;

    // ==================== Helper Functions ====================

    fn code(code: &str) -> LanguageCode {
        LanguageCode::parse(code).unwrap()
    }

    fn strings(values: &[&str]) -> Vec<String> {
        values.iter().map(|v| v.to_string()).collect()
    }

    fn create_test_editor(temp_dir: &TempDir, json: &str) -> BulkEditor<FileBackend> {
        let path = temp_dir.path().join("labels.json");
        std::fs::write(&path, json).unwrap();
        let store = LabelStore::new(FileBackend::new(path), vec![code("en"), code("nl")])
            .with_seed(Seed::None);
        BulkEditor::new(Arc::new(store))
    }

    const SAMPLE: &str = r#"{
        "zebra": {"en": "Zebra", "nl": "Zebra"},
        "apple": {"en": "Apple", "de": "Apfel"},
        "cherry": {"nl": "Kers, rood", "en": ""}
    }"#;

    // ==================== export_table Tests ====================

    #[tokio::test]
    async fn test_export_table_sorted_with_blank_columns() {
        let temp_dir = TempDir::new().unwrap();
        let editor = create_test_editor(&temp_dir, SAMPLE);

        let export = editor.export_table().await;

        assert_eq!(export.columns, strings(&["Label", "EN", "NL"]));
        let cells: Vec<_> = export.rows.iter().map(ExportRow::cells).collect();
        assert_eq!(
            cells,
            vec![
                strings(&["apple", "Apple", ""]),
                strings(&["cherry", "", "Kers, rood"]),
                strings(&["zebra", "Zebra", "Zebra"]),
            ]
        );
    }

    #[tokio::test]
    async fn test_export_then_import_is_noop() {
        let temp_dir = TempDir::new().unwrap();
        let editor = create_test_editor(&temp_dir, SAMPLE);
        let before = editor.export_table().await;

        let rows: Vec<_> = before.rows.iter().map(ExportRow::cells).collect();
        editor
            .import_replacement(&before.columns, &rows)
            .await
            .expect("Should save");

        assert_eq!(editor.export_table().await, before);
    }

    // ==================== import_replacement Tests ====================

    #[tokio::test]
    async fn test_import_lowercases_columns() {
        let temp_dir = TempDir::new().unwrap();
        let editor = create_test_editor(&temp_dir, SAMPLE);

        let count = editor
            .import_replacement(
                &strings(&["Label", "EN", "NL"]),
                &[strings(&["hello", "Hello", "Hallo"])],
            )
            .await
            .expect("Should save");

        assert_eq!(count, 1);
        let loaded = editor.store.load().await;
        let expected = LabelTable::decode(r#"{"hello": {"en": "Hello", "nl": "Hallo"}}"#).unwrap();
        assert_eq!(*loaded.table, expected);
    }

    #[test]
    fn test_build_table_skips_empty_labels_and_cleans() {
        let table = build_table(
            &strings(&["Label", "en"]),
            &[
                strings(&["  ", "ignored"]),
                strings(&["<i>Greeting</i>", "Hi"]),
                vec![],
            ],
        )
        .unwrap();

        assert_eq!(table.len(), 1);
        assert_eq!(table.translation(&Label::clean("greeting"), "en"), Some("Hi"));
    }

    #[test]
    fn test_build_table_pads_short_rows() {
        let table =
            build_table(&strings(&["Label", "en", "nl"]), &[strings(&["hi", "Hi"])]).unwrap();
        assert_eq!(table.get(&Label::clean("hi")).unwrap().get("nl"), Some(""));
    }

    #[test]
    fn test_build_table_rejects_long_rows() {
        let result = build_table(&strings(&["Label", "en"]), &[strings(&["hi", "Hi", "extra"])]);
        assert!(matches!(result, Err(BulkError::RowTooLong { found: 2, .. })));
    }

    #[test]
    fn test_build_table_rejects_bad_column() {
        let result = build_table(&strings(&["Label", "english"]), &[]);
        assert!(matches!(result, Err(BulkError::InvalidColumn(c)) if c == "english"));
    }

    #[test]
    fn test_build_table_requires_columns() {
        assert!(matches!(build_table(&[], &[]), Err(BulkError::MissingColumns)));
    }

    #[tokio::test]
    async fn test_import_too_small_keeps_table() {
        let temp_dir = TempDir::new().unwrap();
        let editor = create_test_editor(&temp_dir, SAMPLE);

        let result = editor.import_replacement(&strings(&["Label", "en"]), &[]).await;

        assert!(matches!(
            result,
            Err(BulkError::Store(StoreError::EncodingTooSmall { .. }))
        ));
        assert_eq!(editor.store.load().await.table.len(), 3);
        let flash = Flash::from_result(&result);
        assert!(!flash.is_success());
        assert!(flash.message.contains("NOT saved"));
    }

    // ==================== CSV Tests ====================

    #[tokio::test]
    async fn test_export_csv_quotes_fields() {
        let temp_dir = TempDir::new().unwrap();
        let editor = create_test_editor(&temp_dir, SAMPLE);

        let csv = editor.export_csv().await.expect("Should export");

        assert_eq!(
            csv,
            "label,en,nl\napple,Apple,\ncherry,,\"Kers, rood\"\nzebra,Zebra,Zebra\n"
        );
    }

    #[tokio::test]
    async fn test_import_csv_replaces_table() {
        let temp_dir = TempDir::new().unwrap();
        let editor = create_test_editor(&temp_dir, SAMPLE);

        let count = editor
            .import_csv("label,en,nl\r\nsave,Save,Opslaan\r\n\"say \"\"hi\"\"\",Hi,\"Hoi\nallemaal\"\r\n")
            .await
            .expect("Should import");

        assert_eq!(count, 2);
        let loaded = editor.store.load().await;
        assert_eq!(
            loaded.table.translation(&Label::clean("say \"hi\""), "nl"),
            Some("Hoi\nallemaal")
        );
        assert!(!loaded.table.contains(&Label::clean("apple")));
    }

    #[test]
    fn test_read_csv_handles_blank_lines_and_missing_newline() {
        let records = read_csv("a,b\n\nc,\"d\"").unwrap();
        assert_eq!(records, vec![strings(&["a", "b"]), strings(&["c", "d"])]);
    }

    #[test]
    fn test_read_csv_allows_ragged_rows() {
        let records = read_csv("label,en,nl\nhi,Hi\n").unwrap();
        assert_eq!(records[1], strings(&["hi", "Hi"]));
    }

    #[tokio::test]
    async fn test_import_csv_without_header_is_rejected() {
        let temp_dir = TempDir::new().unwrap();
        let editor = create_test_editor(&temp_dir, SAMPLE);

        let result = editor.import_csv("").await;

        assert!(matches!(result, Err(BulkError::MissingColumns)));
        assert_eq!(editor.store.load().await.table.len(), 3);
    }

    // ==================== translatable_items Tests ====================

    #[tokio::test]
    async fn test_translatable_items_pages() {
        let temp_dir = TempDir::new().unwrap();
        let editor = create_test_editor(&temp_dir, SAMPLE);

        let first = editor.translatable_items(&code("en"), &code("nl"), false, 0, 2).await;
        let second = editor.translatable_items(&code("en"), &code("nl"), false, 1, 2).await;

        assert_eq!(first.len(), 2);
        assert_eq!(first[0].label.as_str(), "apple");
        assert_eq!(first[0].source, "Apple");
        assert_eq!(first[0].translation, "");
        assert_eq!(second.len(), 1);
        assert_eq!(second[0].label.as_str(), "zebra");
    }

    #[tokio::test]
    async fn test_translatable_items_untranslated_only() {
        let temp_dir = TempDir::new().unwrap();
        let editor = create_test_editor(&temp_dir, SAMPLE);

        let items = editor.translatable_items(&code("en"), &code("nl"), true, 0, 10).await;

        let labels: Vec<_> = items.iter().map(|item| item.label.as_str()).collect();
        assert_eq!(labels, vec!["apple"]);
    }

    // ==================== Property Tests ====================

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(16))]

        #[test]
        fn prop_csv_import_reproduces_export(
            entries in prop::collection::btree_map(
                "[a-z]{1,8}",
                ("[A-Za-z ,\"]{0,10}", "[A-Za-z ,\"]{0,10}"),
                3..8,
            )
        ) {
            let temp_dir = TempDir::new().unwrap();
            let grid: Vec<Vec<String>> = entries
                .iter()
                .map(|(label, (en, nl))| vec![label.clone(), en.clone(), nl.clone()])
                .collect();

            let (first, second) = tokio_test::block_on(async {
                let editor = create_test_editor(&temp_dir, SAMPLE);
                editor
                    .import_replacement(&strings(&["Label", "en", "nl"]), &grid)
                    .await
                    .unwrap();
                let first = editor.export_csv().await.unwrap();
                editor.import_csv(&first).await.unwrap();
                (first, editor.export_csv().await.unwrap())
            });

            prop_assert_eq!(first, second);
        }
    }
}
