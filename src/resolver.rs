use crate::config::LabelsConfig;
use crate::labels::{Label, LabelMetrics, LanguageCode, RequestLanguage};
use crate::store::{Backend, LabelStore, Registration};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use tracing::debug;

/// Pre-escaped HTML. Callers must emit it as is, translations may carry
/// simple inline markup.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct Markup(String);

impl Markup {
    fn trusted(html: impl Into<String>) -> Self {
        Self(html.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

impl fmt::Display for Markup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Escape text for inclusion in HTML.
pub fn escape_html(text: &str) -> String {
    let mut result = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => result.push_str("&amp;"),
            '<' => result.push_str("&lt;"),
            '>' => result.push_str("&gt;"),
            '"' => result.push_str("&quot;"),
            '\'' => result.push_str("&#39;"),
            _ => result.push(c),
        }
    }
    result
}

/// Per-request state the resolver reads: the current language and whether
/// the viewer may see untranslated-label markers.
#[derive(Debug, Clone)]
pub struct RequestContext {
    pub language: RequestLanguage,
    pub privileged: bool,
}

impl RequestContext {
    pub fn new(language: LanguageCode) -> Self {
        Self {
            language: RequestLanguage::new(language),
            privileged: false,
        }
    }

    pub fn privileged(mut self, privileged: bool) -> Self {
        self.privileged = privileged;
        self
    }
}

/// One step of a template-style batch, evaluated in order.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum ResolveDirective {
    /// Resolve a label, optionally in a specific language
    Lookup {
        label: String,
        #[serde(default)]
        lang: Option<String>,
    },
    /// Switch the language for the rest of the batch
    SetLanguage { lang: String },
}

/// Resolves labels to translations with fallback and auto-registration.
pub struct LabelResolver<B> {
    store: Arc<LabelStore<B>>,
    config: LabelsConfig,
    metrics: Arc<LabelMetrics>,
}

impl<B> Clone for LabelResolver<B> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            config: self.config.clone(),
            metrics: Arc::clone(&self.metrics),
        }
    }
}

impl<B: Backend> LabelResolver<B> {
    pub fn new(store: Arc<LabelStore<B>>, config: LabelsConfig) -> Self {
        Self {
            store,
            config,
            metrics: Arc::new(LabelMetrics::new()),
        }
    }

    pub fn store(&self) -> &Arc<LabelStore<B>> {
        &self.store
    }

    pub fn config(&self) -> &LabelsConfig {
        &self.config
    }

    pub fn metrics(&self) -> &LabelMetrics {
        &self.metrics
    }

    /// Resolve `raw_label` for the request.
    ///
    /// `language_override` wins over the request language when it is a
    /// valid code (any case). Always returns something: a stored
    /// translation, the default-language translation, or the label itself.
    /// Empty labels resolve to an empty string and are never registered.
    pub async fn resolve(
        &self,
        raw_label: &str,
        language_override: Option<&str>,
        ctx: &RequestContext,
    ) -> Markup {
        let label = Label::clean(raw_label);
        if label.is_empty() {
            return Markup::default();
        }

        let language = language_override
            .and_then(LanguageCode::parse_lenient)
            .unwrap_or_else(|| ctx.language.current().clone());

        let table = self.store.load().await.table;

        if let Some(translation) = table.translation(&label, language.as_str()) {
            self.metrics.record_hit();
            return Markup::trusted(translation);
        }
        self.metrics.record_miss();

        let default_translation = self
            .config
            .use_fallback
            .then(|| table.translation(&label, self.config.default_language.as_str()))
            .flatten();

        let fallback = match default_translation {
            Some(translation) => {
                self.metrics.record_fallback();
                translation.to_string()
            }
            None => escape_html(label.as_str()),
        };

        if self.config.add_missing && !table.contains(&label) {
            self.register(&label).await;
        }

        if ctx.privileged {
            Markup::trusted(format!("<mark>{}</mark>", fallback))
        } else {
            Markup::trusted(fallback)
        }
    }

    /// Evaluate a batch of directives against one request context.
    /// Returns one result per lookup; `set_language` only affects the
    /// lookups after it.
    pub async fn resolve_all(
        &self,
        directives: &[ResolveDirective],
        ctx: &mut RequestContext,
    ) -> Vec<Markup> {
        let mut results = Vec::new();

        for directive in directives {
            match directive {
                ResolveDirective::Lookup { label, lang } => {
                    results.push(self.resolve(label, lang.as_deref(), ctx).await);
                }
                ResolveDirective::SetLanguage { lang } => {
                    if !ctx.language.set(lang) {
                        debug!("Ignoring invalid language override '{}'", lang);
                    }
                }
            }
        }

        results
    }

    async fn register(&self, label: &Label) {
        match self.store.add_if_absent(label).await {
            Registration::Persisted => self.metrics.record_registration(),
            Registration::InMemoryOnly => {
                self.metrics.record_registration();
                self.metrics.record_failed_write();
            }
            Registration::AlreadyPresent | Registration::Rejected => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::labels::LabelTable;
    use crate::store::{FileBackend, Seed};
    use tempfile::TempDir;

    // ==================== Helper Functions ====================

    fn code(code: &str) -> LanguageCode {
        LanguageCode::parse(code).unwrap()
    }

    fn test_config() -> LabelsConfig {
        LabelsConfig {
            languages: vec![code("en"), code("nl"), code("de")],
            default_language: code("en"),
            add_missing: true,
            use_fallback: true,
        }
    }

    fn sample_table() -> LabelTable {
        LabelTable::decode(
            r#"{
                "hello": {"en": "Hello", "nl": "Hallo", "de": ""},
                "read more": {"en": "Read <b>more</b>", "nl": "", "de": ""}
            }"#,
        )
        .unwrap()
    }

    async fn create_test_resolver(
        temp_dir: &TempDir,
        config: LabelsConfig,
    ) -> LabelResolver<FileBackend> {
        let path = temp_dir.path().join("labels.json");
        std::fs::write(&path, sample_table().encode().unwrap()).unwrap();
        let store = LabelStore::new(FileBackend::new(path), config.languages.clone())
            .with_seed(Seed::None);
        LabelResolver::new(Arc::new(store), config)
    }

    fn anonymous(lang: &str) -> RequestContext {
        RequestContext::new(code(lang))
    }

    // ==================== Lookup Tests ====================

    #[tokio::test]
    async fn test_resolve_stored_translation() {
        let temp_dir = TempDir::new().unwrap();
        let resolver = create_test_resolver(&temp_dir, test_config()).await;

        let result = resolver.resolve("Hello", None, &anonymous("nl")).await;

        assert_eq!(result.as_str(), "Hallo");
        assert_eq!(resolver.metrics().hits(), 1);
    }

    #[tokio::test]
    async fn test_resolve_normalizes_label() {
        let temp_dir = TempDir::new().unwrap();
        let resolver = create_test_resolver(&temp_dir, test_config()).await;

        let result = resolver.resolve("  <span>HELLO</span> ", None, &anonymous("nl")).await;

        assert_eq!(result.as_str(), "Hallo");
    }

    #[tokio::test]
    async fn test_resolve_returns_markup_verbatim() {
        let temp_dir = TempDir::new().unwrap();
        let resolver = create_test_resolver(&temp_dir, test_config()).await;

        let result = resolver.resolve("read more", None, &anonymous("en")).await;

        assert_eq!(result.as_str(), "Read <b>more</b>");
    }

    #[tokio::test]
    async fn test_override_wins_over_request_language() {
        let temp_dir = TempDir::new().unwrap();
        let resolver = create_test_resolver(&temp_dir, test_config()).await;

        let result = resolver.resolve("hello", Some("NL"), &anonymous("en")).await;

        assert_eq!(result.as_str(), "Hallo");
    }

    #[tokio::test]
    async fn test_invalid_override_uses_request_language() {
        let temp_dir = TempDir::new().unwrap();
        let resolver = create_test_resolver(&temp_dir, test_config()).await;

        let result = resolver.resolve("hello", Some("dutch"), &anonymous("nl")).await;

        assert_eq!(result.as_str(), "Hallo");
    }

    // ==================== Fallback Tests ====================

    #[tokio::test]
    async fn test_fallback_to_default_language() {
        let temp_dir = TempDir::new().unwrap();
        let resolver = create_test_resolver(&temp_dir, test_config()).await;

        let result = resolver.resolve("hello", None, &anonymous("de")).await;

        assert_eq!(result.as_str(), "Hello");
        assert_eq!(resolver.metrics().fallbacks(), 1);
    }

    #[tokio::test]
    async fn test_fallback_disabled_returns_label() {
        let temp_dir = TempDir::new().unwrap();
        let config = LabelsConfig {
            use_fallback: false,
            ..test_config()
        };
        let resolver = create_test_resolver(&temp_dir, config).await;

        let result = resolver.resolve("hello", None, &anonymous("de")).await;

        assert_eq!(result.as_str(), "hello");
    }

    #[tokio::test]
    async fn test_blank_default_returns_label() {
        let temp_dir = TempDir::new().unwrap();
        let config = LabelsConfig {
            default_language: code("de"),
            ..test_config()
        };
        let resolver = create_test_resolver(&temp_dir, config).await;

        let result = resolver.resolve("read more", None, &anonymous("nl")).await;

        assert_eq!(result.as_str(), "read more");
    }

    #[tokio::test]
    async fn test_privileged_viewer_sees_marker() {
        let temp_dir = TempDir::new().unwrap();
        let resolver = create_test_resolver(&temp_dir, test_config()).await;
        let ctx = anonymous("nl").privileged(true);

        let missing = resolver.resolve("Unknown Thing", None, &ctx).await;
        let fallback = resolver.resolve("hello", None, &anonymous("de").privileged(true)).await;
        let found = resolver.resolve("hello", None, &ctx).await;

        assert_eq!(missing.as_str(), "<mark>unknown thing</mark>");
        assert_eq!(fallback.as_str(), "<mark>Hello</mark>");
        assert_eq!(found.as_str(), "Hallo");
    }

    #[tokio::test]
    async fn test_label_fallback_is_escaped() {
        let temp_dir = TempDir::new().unwrap();
        let resolver = create_test_resolver(&temp_dir, test_config()).await;

        let result = resolver.resolve("Fish & Chips", None, &anonymous("en")).await;

        assert_eq!(result.as_str(), "fish &amp; chips");
    }

    // ==================== Auto-registration Tests ====================

    #[tokio::test]
    async fn test_missing_label_is_registered() {
        let temp_dir = TempDir::new().unwrap();
        let resolver = create_test_resolver(&temp_dir, test_config()).await;

        let result = resolver.resolve("New Label", None, &anonymous("nl")).await;

        assert_eq!(result.as_str(), "new label");
        let loaded = resolver.store().load().await;
        let set = loaded.table.get(&Label::clean("new label")).unwrap();
        assert!(set.is_blank());
        assert_eq!(set.len(), 3);
        assert_eq!(resolver.metrics().registrations(), 1);
    }

    #[tokio::test]
    async fn test_registration_disabled() {
        let temp_dir = TempDir::new().unwrap();
        let config = LabelsConfig {
            add_missing: false,
            ..test_config()
        };
        let resolver = create_test_resolver(&temp_dir, config).await;

        resolver.resolve("New Label", None, &anonymous("nl")).await;

        let loaded = resolver.store().load().await;
        assert!(!loaded.table.contains(&Label::clean("new label")));
    }

    #[tokio::test]
    async fn test_known_label_with_blank_translation_not_reregistered() {
        let temp_dir = TempDir::new().unwrap();
        let resolver = create_test_resolver(&temp_dir, test_config()).await;

        resolver.resolve("read more", None, &anonymous("nl")).await;

        assert_eq!(resolver.metrics().registrations(), 0);
        let loaded = resolver.store().load().await;
        assert_eq!(
            loaded.table.translation(&Label::clean("read more"), "en"),
            Some("Read <b>more</b>")
        );
    }

    #[tokio::test]
    async fn test_empty_label_resolves_to_empty() {
        let temp_dir = TempDir::new().unwrap();
        let resolver = create_test_resolver(&temp_dir, test_config()).await;

        let result = resolver.resolve("  <br> ", None, &anonymous("en")).await;

        assert_eq!(result.as_str(), "");
        assert_eq!(resolver.store().load().await.table.len(), 2);
    }

    #[tokio::test]
    async fn test_unwritable_storage_still_resolves() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("missing/labels.json");
        let config = test_config();
        let store =
            LabelStore::new(FileBackend::new(path), config.languages.clone()).with_seed(Seed::None);
        let resolver = LabelResolver::new(Arc::new(store), config);

        let result = resolver.resolve("Anything", None, &anonymous("en")).await;

        assert_eq!(result.as_str(), "anything");
        assert_eq!(resolver.metrics().failed_writes(), 1);
    }

    // ==================== Round-trip Tests ====================

    #[tokio::test]
    async fn test_replace_all_then_resolve() {
        let temp_dir = TempDir::new().unwrap();
        let resolver = create_test_resolver(&temp_dir, test_config()).await;

        let mut table = sample_table();
        table.entry(Label::clean("welcome")).set("de", "Willkommen");
        resolver.store().replace_all(table).await.expect("Should save");

        let result = resolver.resolve("welcome", Some("de"), &anonymous("en")).await;
        assert_eq!(result.as_str(), "Willkommen");
    }

    // ==================== Directive Tests ====================

    #[tokio::test]
    async fn test_set_language_affects_later_lookups_only() {
        let temp_dir = TempDir::new().unwrap();
        let resolver = create_test_resolver(&temp_dir, test_config()).await;
        let mut ctx = anonymous("en");

        let directives = vec![
            ResolveDirective::Lookup {
                label: "hello".to_string(),
                lang: None,
            },
            ResolveDirective::SetLanguage {
                lang: "nl".to_string(),
            },
            ResolveDirective::Lookup {
                label: "hello".to_string(),
                lang: None,
            },
            ResolveDirective::SetLanguage {
                lang: "nope".to_string(),
            },
            ResolveDirective::Lookup {
                label: "hello".to_string(),
                lang: Some("en".to_string()),
            },
        ];

        let results = resolver.resolve_all(&directives, &mut ctx).await;

        let results: Vec<_> = results.iter().map(Markup::as_str).collect();
        assert_eq!(results, vec!["Hello", "Hallo", "Hello"]);
        assert_eq!(ctx.language.current().as_str(), "nl");
    }

    #[test]
    fn test_directive_deserialize() {
        let json = r#"[{"op": "lookup", "label": "hi"}, {"op": "set_language", "lang": "nl"}]"#;
        let directives: Vec<ResolveDirective> = serde_json::from_str(json).unwrap();
        assert_eq!(
            directives[0],
            ResolveDirective::Lookup {
                label: "hi".to_string(),
                lang: None
            }
        );
    }

    // ==================== Escaping Tests ====================

    #[test]
    fn test_escape_html() {
        assert_eq!(escape_html("a < b & \"c\""), "a &lt; b &amp; &quot;c&quot;");
        assert_eq!(escape_html("plain"), "plain");
    }
}
