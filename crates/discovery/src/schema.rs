//! Normalized schema model
//!
//! The model a discovery pass produces and the orchestrator consumes:
//! ordered tables, typed columns, inferred relationships, and the
//! vocabulary index. The vocabulary index is the single source of truth
//! for business-term to schema-element resolution; the classifier and
//! the translator context both read it from here.

use crate::synonyms::{normalize_term, singularize, SynonymDictionary};
use querybridge_common::types::JsonMap;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

/// Small type taxonomy declared column types normalize into
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ColumnType {
    Text,
    Numeric,
    Date,
    Boolean,
    Other,
}

impl ColumnType {
    /// Normalize a declared SQL type into the taxonomy
    pub fn from_declared(raw: &str) -> Self {
        let lower = raw.to_lowercase();
        if lower.contains("bool") {
            ColumnType::Boolean
        } else if lower.contains("int")
            || lower.contains("numeric")
            || lower.contains("decimal")
            || lower.contains("real")
            || lower.contains("double")
            || lower.contains("float")
            || lower.contains("serial")
            || lower.contains("money")
        {
            ColumnType::Numeric
        } else if lower.contains("date") || lower.contains("time") {
            ColumnType::Date
        } else if lower.contains("char") || lower.contains("text") || lower.contains("uuid") {
            ColumnType::Text
        } else {
            ColumnType::Other
        }
    }
}

/// A discovered column
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Column {
    pub name: String,
    /// The type as declared by the source
    pub declared_type: String,
    /// Normalized taxonomy type
    pub column_type: ColumnType,
}

impl Column {
    pub fn new(name: impl Into<String>, declared_type: impl Into<String>) -> Self {
        let declared_type = declared_type.into();
        let column_type = ColumnType::from_declared(&declared_type);
        Self {
            name: name.into(),
            declared_type,
            column_type,
        }
    }
}

/// A discovered table with a bounded row sample for preview
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Table {
    pub name: String,
    pub columns: Vec<Column>,
    #[serde(default)]
    pub sample_rows: Vec<JsonMap>,
}

/// How a relationship was inferred
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RelationshipOrigin {
    /// Declared foreign-key constraint
    ForeignKey,
    /// `<table_singular>_id` naming heuristic, lower confidence
    NamingHeuristic,
}

/// A foreign-key edge between two tables in the model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Relationship {
    pub from_table: String,
    pub from_column: String,
    pub to_table: String,
    pub to_column: String,
    pub origin: RelationshipOrigin,
}

/// A vocabulary entry target: a table, or a column within one
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnRef {
    pub table: String,
    /// None when the term names the table itself
    #[serde(skip_serializing_if = "Option::is_none")]
    pub column: Option<String>,
}

/// Capability-tagged lookup from normalized business terms to schema
/// elements. Built once per discovery pass.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VocabularyIndex {
    terms: HashMap<String, Vec<ColumnRef>>,
}

impl VocabularyIndex {
    /// Build the index from discovered tables and the alias dictionary.
    ///
    /// Every table and column name enters under its normalized (and
    /// singularized) form; names that hit an alias family pull the whole
    /// family in, so "comp" resolves to a column actually named `salary`.
    pub fn build(tables: &[Table], dictionary: &SynonymDictionary) -> Self {
        let mut index = VocabularyIndex::default();

        for table in tables {
            let table_ref = ColumnRef {
                table: table.name.clone(),
                column: None,
            };
            index.insert_with_variants(&table.name, &table_ref);
            for (_, synonyms) in dictionary.families() {
                if family_matches(&table.name, synonyms) {
                    for synonym in synonyms {
                        index.insert(synonym, &table_ref);
                    }
                }
            }

            for column in &table.columns {
                let column_ref = ColumnRef {
                    table: table.name.clone(),
                    column: Some(column.name.clone()),
                };
                index.insert_with_variants(&column.name, &column_ref);
                for (_, synonyms) in dictionary.families() {
                    if family_matches(&column.name, synonyms) {
                        for synonym in synonyms {
                            index.insert(synonym, &column_ref);
                        }
                    }
                }
            }
        }

        index
    }

    fn insert_with_variants(&mut self, term: &str, target: &ColumnRef) {
        self.insert(term, target);
        let singular = singularize(&normalize_term(term));
        self.insert(&singular, target);
    }

    fn insert(&mut self, term: &str, target: &ColumnRef) {
        let key = normalize_term(term);
        if key.is_empty() {
            return;
        }
        let refs = self.terms.entry(key).or_default();
        if !refs.contains(target) {
            refs.push(target.clone());
        }
    }

    /// Whether a token resolves to any schema element
    pub fn contains(&self, token: &str) -> bool {
        self.lookup(token).is_some()
    }

    /// Resolve a token to its schema targets
    pub fn lookup(&self, token: &str) -> Option<&[ColumnRef]> {
        let key = normalize_term(token);
        if let Some(refs) = self.terms.get(&key) {
            return Some(refs);
        }
        self.terms.get(&singularize(&key)).map(|refs| refs.as_slice())
    }

    /// All vocabulary terms that target a table, sorted for determinism
    pub fn terms_for_table(&self, table: &str) -> Vec<String> {
        let mut terms: Vec<String> = self
            .terms
            .iter()
            .filter(|(_, refs)| refs.iter().any(|r| r.table == table))
            .map(|(term, _)| term.clone())
            .collect();
        terms.sort();
        terms
    }

    pub fn is_empty(&self) -> bool {
        self.terms.is_empty()
    }

    pub fn len(&self) -> usize {
        self.terms.len()
    }
}

/// Substring family match, as loose as the source names it covers
fn family_matches(name: &str, synonyms: &[String]) -> bool {
    let normalized = normalize_term(name);
    synonyms.iter().any(|s| normalized.contains(s.as_str()))
}

/// Result of mapping a natural-language query onto the schema
#[derive(Debug, Clone, Serialize)]
pub struct SchemaMapping {
    pub tokens: Vec<String>,
    /// table → vocabulary terms that matched it
    pub matched: BTreeMap<String, Vec<String>>,
    /// Tables ordered by match count (descending), name as tiebreak
    pub likely_tables: Vec<String>,
}

/// The normalized schema model for one connection
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SchemaModel {
    /// Discovery-ordered tables; names are unique within the model
    pub tables: Vec<Table>,
    /// Relationships; both endpoints reference tables present in the model
    pub relationships: Vec<Relationship>,
    /// Business vocabulary → schema elements
    pub vocabulary: VocabularyIndex,
    /// Per-table discovery failures (partial results, not errors)
    #[serde(default)]
    pub warnings: Vec<String>,
}

impl SchemaModel {
    /// Look up a table by name
    pub fn table(&self, name: &str) -> Option<&Table> {
        self.tables.iter().find(|t| t.name == name)
    }

    /// Split a query into lowercase alphanumeric tokens
    pub fn tokenize(query: &str) -> Vec<String> {
        query
            .split(|c: char| !c.is_alphanumeric() && c != '_')
            .filter(|t| !t.is_empty())
            .map(|t| t.to_lowercase())
            .collect()
    }

    /// Map a natural-language query to likely tables via the vocabulary
    /// index. Deterministic for identical (query, schema) input.
    pub fn map_query(&self, query: &str) -> SchemaMapping {
        let tokens = Self::tokenize(query);
        let mut matched: BTreeMap<String, Vec<String>> = BTreeMap::new();

        for token in &tokens {
            if let Some(refs) = self.vocabulary.lookup(token) {
                for r in refs {
                    let terms = matched.entry(r.table.clone()).or_default();
                    if !terms.contains(token) {
                        terms.push(token.clone());
                    }
                }
            }
        }

        let mut likely_tables: Vec<String> = matched.keys().cloned().collect();
        likely_tables.sort_by(|a, b| {
            matched[b]
                .len()
                .cmp(&matched[a].len())
                .then_with(|| a.cmp(b))
        });

        SchemaMapping {
            tokens,
            matched,
            likely_tables,
        }
    }

    /// Whether any query token hits the schema vocabulary
    pub fn has_vocabulary_hit(&self, query: &str) -> bool {
        Self::tokenize(query)
            .iter()
            .any(|t| self.vocabulary.contains(t))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hr_tables() -> Vec<Table> {
        vec![
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
                    Column::new("salary", "numeric(10,2)"),
                    Column::new("department_id", "integer"),
                ],
                sample_rows: vec![],
            },
        ]
    }

    fn hr_model() -> SchemaModel {
        let tables = hr_tables();
        let vocabulary = VocabularyIndex::build(&tables, &SynonymDictionary::builtin());
        SchemaModel {
            tables,
            relationships: vec![],
            vocabulary,
            warnings: vec![],
        }
    }

    #[test]
    fn test_column_type_taxonomy() {
        assert_eq!(ColumnType::from_declared("character varying(64)"), ColumnType::Text);
        assert_eq!(ColumnType::from_declared("NUMERIC(10,2)"), ColumnType::Numeric);
        assert_eq!(ColumnType::from_declared("bigint"), ColumnType::Numeric);
        assert_eq!(ColumnType::from_declared("timestamp with time zone"), ColumnType::Date);
        assert_eq!(ColumnType::from_declared("boolean"), ColumnType::Boolean);
        assert_eq!(ColumnType::from_declared("bytea"), ColumnType::Other);
    }

    #[test]
    fn test_vocabulary_contains_table_and_column_names() {
        let model = hr_model();
        assert!(model.vocabulary.contains("employees"));
        assert!(model.vocabulary.contains("employee")); // singular variant
        assert!(model.vocabulary.contains("salary"));
        assert!(model.vocabulary.contains("department_id"));
        assert!(!model.vocabulary.contains("weather"));
    }

    #[test]
    fn test_vocabulary_resolves_business_synonyms() {
        let model = hr_model();
        // "comp" resolves through the salary family to the salary column
        let refs = model.vocabulary.lookup("comp").unwrap();
        assert!(refs
            .iter()
            .any(|r| r.table == "employees" && r.column.as_deref() == Some("salary")));
        // "dept" resolves to the departments table family
        assert!(model.vocabulary.contains("dept"));
    }

    #[test]
    fn test_map_query_ranks_tables_by_hits() {
        let model = hr_model();
        let mapping = model.map_query("Show average salary by department");
        assert!(!mapping.likely_tables.is_empty());
        // employees matches both "salary" and "department" (via department_id
        // family), so it outranks departments
        assert_eq!(mapping.likely_tables[0], "employees");
    }

    #[test]
    fn test_map_query_is_deterministic() {
        let model = hr_model();
        let a = model.map_query("average salary by department");
        let b = model.map_query("average salary by department");
        assert_eq!(a.likely_tables, b.likely_tables);
        assert_eq!(a.tokens, b.tokens);
    }

    #[test]
    fn test_terms_for_table_sorted() {
        let model = hr_model();
        let terms = model.vocabulary.terms_for_table("departments");
        let mut sorted = terms.clone();
        sorted.sort();
        assert_eq!(terms, sorted);
        assert!(terms.iter().any(|t| t == "departments" || t == "department"));
    }
}
