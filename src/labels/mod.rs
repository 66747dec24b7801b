//! Label data model.
//!
//! # Architecture
//!
//! - `label`: `Label` keys and the cleaning rule
//! - `language`: `LanguageCode`, request language resolution and the
//!   request-scoped `RequestLanguage`
//! - `table`: `TranslationSet` and `LabelTable`, the unit of persistence
//! - `metrics`: lookup counters
//!
//! # Example
//!
//! ```rust,ignore
//! use labels_engine::labels::{Label, LabelTable};
//!
//! let label = Label::clean("<b>Read more</b>");
//! let table = LabelTable::decode(r#"{"read more": {"nl": "Lees meer"}}"#)?;
//! assert_eq!(table.translation(&label, "nl"), Some("Lees meer"));
//! ```

mod label;
mod language;
mod metrics;
mod table;

pub use label::{Label, NAMESPACE_SEPARATOR};
pub use language::{resolve_language, LanguageCode, LanguageHints, RequestLanguage};
pub use metrics::{LabelMetrics, MetricsReport};
pub use table::{LabelTable, TranslationSet};
