//! Text extraction registry
//!
//! Extraction is a collaborator seam: the pipeline hands bytes plus a
//! file name to the registry and gets plain UTF-8 text back. Built-in
//! extractors cover text-native formats (plain text, CSV, JSON); binary
//! formats (PDF, DOCX) are served by externally registered extractors
//! implementing [`TextExtractor`].
//!
//! The registry's `is_supported` check runs at submission time so
//! unsupported extensions are rejected before a job is queued.

use crate::errors::IngestionError;
use std::collections::HashMap;
use std::sync::Arc;

/// Per-format plain-text extraction
pub trait TextExtractor: Send + Sync {
    /// Lowercase extensions this extractor handles, without the dot
    fn extensions(&self) -> &'static [&'static str];

    /// Extract plain text from file bytes
    fn extract(&self, file_name: &str, bytes: &[u8]) -> Result<String, IngestionError>;
}

/// Extension-keyed extractor dispatch
pub struct ExtractorRegistry {
    by_extension: HashMap<String, Arc<dyn TextExtractor>>,
}

impl ExtractorRegistry {
    /// Registry with the built-in text-native extractors
    pub fn with_builtins() -> Self {
        let mut registry = Self {
            by_extension: HashMap::new(),
        };
        registry.register(Arc::new(PlainTextExtractor));
        registry.register(Arc::new(CsvExtractor));
        registry.register(Arc::new(JsonExtractor));
        registry
    }

    /// Register an extractor for all of its extensions, replacing any
    /// previous handler for the same extension
    pub fn register(&mut self, extractor: Arc<dyn TextExtractor>) {
        for ext in extractor.extensions() {
            self.by_extension
                .insert(ext.to_string(), Arc::clone(&extractor));
        }
    }

    /// Whether a file name's extension has a registered extractor
    pub fn is_supported(&self, file_name: &str) -> bool {
        extension_of(file_name)
            .map(|ext| self.by_extension.contains_key(&ext))
            .unwrap_or(false)
    }

    /// Supported extensions, sorted (for error messages)
    pub fn supported_extensions(&self) -> Vec<String> {
        let mut extensions: Vec<String> = self.by_extension.keys().cloned().collect();
        extensions.sort();
        extensions
    }

    /// Extract plain text from a file
    pub fn extract(&self, file_name: &str, bytes: &[u8]) -> Result<String, IngestionError> {
        let extension = extension_of(file_name).ok_or_else(|| IngestionError::UnsupportedFormat {
            file: file_name.to_string(),
        })?;
        let extractor =
            self.by_extension
                .get(&extension)
                .ok_or_else(|| IngestionError::UnsupportedFormat {
                    file: file_name.to_string(),
                })?;
        extractor.extract(file_name, bytes)
    }
}

/// Lowercase extension of a file name, without the dot
pub fn extension_of(file_name: &str) -> Option<String> {
    let name = file_name.rsplit(['/', '\\']).next()?;
    let (stem, extension) = name.rsplit_once('.')?;
    if stem.is_empty() || extension.is_empty() {
        return None;
    }
    Some(extension.to_lowercase())
}

/// Stray non-UTF-8 bytes are replaced, not rejected
fn decode_utf8(bytes: &[u8]) -> String {
    String::from_utf8_lossy(bytes).into_owned()
}

/// Plain text and markdown
pub struct PlainTextExtractor;

impl TextExtractor for PlainTextExtractor {
    fn extensions(&self) -> &'static [&'static str] {
        &["txt", "md", "text", "log"]
    }

    fn extract(&self, _file_name: &str, bytes: &[u8]) -> Result<String, IngestionError> {
        Ok(decode_utf8(bytes))
    }
}

/// Delimited tabular text. The content is passed through as-is; the
/// chunker applies its header-preserving row batching.
pub struct CsvExtractor;

impl TextExtractor for CsvExtractor {
    fn extensions(&self) -> &'static [&'static str] {
        &["csv", "tsv"]
    }

    fn extract(&self, _file_name: &str, bytes: &[u8]) -> Result<String, IngestionError> {
        Ok(decode_utf8(bytes))
    }
}

/// JSON and JSON Lines. Valid JSON is pretty-printed so nested fields
/// end up on chunkable lines; JSONL is normalized one compact object per
/// line. Invalid JSON falls back to the raw text.
pub struct JsonExtractor;

impl TextExtractor for JsonExtractor {
    fn extensions(&self) -> &'static [&'static str] {
        &["json", "jsonl"]
    }

    fn extract(&self, file_name: &str, bytes: &[u8]) -> Result<String, IngestionError> {
        let text = decode_utf8(bytes);

        if file_name.to_lowercase().ends_with(".jsonl") {
            let normalized: Vec<String> = text
                .lines()
                .filter(|line| !line.trim().is_empty())
                .map(|line| {
                    serde_json::from_str::<serde_json::Value>(line)
                        .and_then(|v| serde_json::to_string(&v))
                        .unwrap_or_else(|_| line.to_string())
                })
                .collect();
            return Ok(normalized.join("\n"));
        }

        match serde_json::from_str::<serde_json::Value>(&text) {
            Ok(value) => Ok(serde_json::to_string_pretty(&value).unwrap_or(text)),
            Err(_) => Ok(text),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extension_of() {
        assert_eq!(extension_of("resume.PDF"), Some("pdf".to_string()));
        assert_eq!(extension_of("dir/notes.txt"), Some("txt".to_string()));
        assert_eq!(extension_of("noextension"), None);
        assert_eq!(extension_of(".hidden"), None);
        assert_eq!(extension_of("trailing."), None);
    }

    #[test]
    fn test_builtin_support() {
        let registry = ExtractorRegistry::with_builtins();
        assert!(registry.is_supported("a.txt"));
        assert!(registry.is_supported("b.csv"));
        assert!(registry.is_supported("c.JSON"));
        assert!(!registry.is_supported("d.exe"));
        assert!(!registry.is_supported("e.pdf")); // binary formats are external
    }

    #[test]
    fn test_plain_text_extraction() {
        let registry = ExtractorRegistry::with_builtins();
        let text = registry.extract("notes.txt", b"hello world").unwrap();
        assert_eq!(text, "hello world");
    }

    #[test]
    fn test_json_pretty_printed() {
        let registry = ExtractorRegistry::with_builtins();
        let text = registry
            .extract("data.json", br#"{"a":{"b":1}}"#)
            .unwrap();
        assert!(text.contains('\n'));
        assert!(text.contains("\"b\": 1"));
    }

    #[test]
    fn test_jsonl_normalized_per_line() {
        let registry = ExtractorRegistry::with_builtins();
        let text = registry
            .extract("data.jsonl", b"{\"a\": 1}\n\n{\"b\":2}\n")
            .unwrap();
        assert_eq!(text, "{\"a\":1}\n{\"b\":2}");
    }

    #[test]
    fn test_invalid_json_falls_back_to_raw() {
        let registry = ExtractorRegistry::with_builtins();
        let text = registry.extract("broken.json", b"not json at all").unwrap();
        assert_eq!(text, "not json at all");
    }

    #[test]
    fn test_external_extractor_registration() {
        struct StubPdf;
        impl TextExtractor for StubPdf {
            fn extensions(&self) -> &'static [&'static str] {
                &["pdf"]
            }
            fn extract(&self, _: &str, _: &[u8]) -> Result<String, IngestionError> {
                Ok("pdf text".to_string())
            }
        }

        let mut registry = ExtractorRegistry::with_builtins();
        registry.register(Arc::new(StubPdf));
        assert!(registry.is_supported("doc.pdf"));
        assert_eq!(registry.extract("doc.pdf", b"%PDF").unwrap(), "pdf text");
    }
}
