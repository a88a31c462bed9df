//! Heuristic query classifier
//!
//! Deterministic for identical (query, schema, corpus-present) input: no
//! wall-clock, no randomness, no I/O. Document intent is a static cue
//! set; schema intent is a vocabulary-index hit.

use querybridge_common::types::QueryType;
use querybridge_discovery::SchemaModel;

/// Tokens that signal document intent
const DOCUMENT_CUES: &[&str] = &[
    "document",
    "documents",
    "file",
    "files",
    "pdf",
    "docx",
    "resume",
    "resumes",
    "cv",
    "note",
    "notes",
    "certificate",
    "certificates",
    "policy",
    "policies",
    "review",
    "reviews",
    "attachment",
    "attachments",
    "upload",
    "uploads",
];

/// Lightweight heuristic classifier for user queries
#[derive(Debug, Default, Clone)]
pub struct QueryClassifier;

impl QueryClassifier {
    pub fn new() -> Self {
        Self
    }

    /// Classify a query.
    ///
    /// Decision table:
    /// - schema vocabulary only → `Sql`
    /// - document cues only → `Document`
    /// - both → `Hybrid`
    /// - neither, with a document corpus present → `Document` (the absence
    ///   of any schema hit is itself a document cue once documents exist)
    /// - neither, without a corpus → `Sql`
    ///
    /// The last default is a documented heuristic limitation: such
    /// queries produce empty SQL results rather than an explicit
    /// "unanswerable" signal.
    pub fn classify(&self, query: &str, schema: &SchemaModel, has_documents: bool) -> QueryType {
        let tokens = SchemaModel::tokenize(query);

        let schema_hit = tokens.iter().any(|t| schema.vocabulary.contains(t));
        let document_hit = tokens.iter().any(|t| DOCUMENT_CUES.contains(&t.as_str()));

        match (schema_hit, document_hit) {
            (true, true) => QueryType::Hybrid,
            (true, false) => QueryType::Sql,
            (false, true) => QueryType::Document,
            (false, false) => {
                if has_documents {
                    QueryType::Document
                } else {
                    QueryType::Sql
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use querybridge_discovery::{Column, SchemaModel, SynonymDictionary, Table, VocabularyIndex};

    fn hr_schema() -> SchemaModel {
        let tables = vec![
            Table {
                name: "departments".to_string(),
                columns: vec![Column::new("id", "integer"), Column::new("name", "text")],
                sample_rows: vec![],
            },
            Table {
                name: "employees".to_string(),
                columns: vec![
                    Column::new("id", "integer"),
                    Column::new("first_name", "text"),
                    Column::new("last_name", "text"),
                    Column::new("salary", "numeric"),
                    Column::new("department_id", "integer"),
                ],
                sample_rows: vec![],
            },
        ];
        let vocabulary = VocabularyIndex::build(&tables, &SynonymDictionary::builtin());
        SchemaModel {
            tables,
            relationships: vec![],
            vocabulary,
            warnings: vec![],
        }
    }

    #[test]
    fn test_schema_vocabulary_only_is_sql() {
        let classifier = QueryClassifier::new();
        let schema = hr_schema();
        assert_eq!(
            classifier.classify("average salary by department", &schema, true),
            QueryType::Sql
        );
        assert_eq!(
            classifier.classify("Show average salary by department", &schema, false),
            QueryType::Sql
        );
    }

    #[test]
    fn test_document_cues_only_is_document() {
        let classifier = QueryClassifier::new();
        let schema = hr_schema();
        assert_eq!(
            classifier.classify("Find documents mentioning Python and AWS", &schema, true),
            QueryType::Document
        );
    }

    #[test]
    fn test_both_is_hybrid() {
        let classifier = QueryClassifier::new();
        let schema = hr_schema();
        assert_eq!(
            classifier.classify("employees with Python skills in their resumes", &schema, true),
            QueryType::Hybrid
        );
    }

    #[test]
    fn test_no_hits_defaults_by_corpus() {
        let classifier = QueryClassifier::new();
        let schema = hr_schema();
        // No schema vocabulary, no cues, no corpus → SQL default
        assert_eq!(
            classifier.classify("what is the meaning of life", &schema, false),
            QueryType::Sql
        );
        // Same query with a corpus → the missing schema hit is a doc cue
        assert_eq!(
            classifier.classify("what is the meaning of life", &schema, true),
            QueryType::Document
        );
    }

    #[test]
    fn test_classification_is_deterministic() {
        let classifier = QueryClassifier::new();
        let schema = hr_schema();
        let first = classifier.classify("salary documents", &schema, true);
        for _ in 0..10 {
            assert_eq!(classifier.classify("salary documents", &schema, true), first);
        }
        assert_eq!(first, QueryType::Hybrid);
    }

    #[test]
    fn test_synonyms_count_as_schema_vocabulary() {
        let classifier = QueryClassifier::new();
        let schema = hr_schema();
        // "comp" resolves through the synonym table to the salary column
        assert_eq!(
            classifier.classify("total comp for staff", &schema, false),
            QueryType::Sql
        );
    }
}
