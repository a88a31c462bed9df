//! Schema discovery service
//!
//! Runs the full discovery pass for a connection: connectivity check,
//! table/column enumeration, bounded row sampling, relationship
//! inference (declared constraints first, naming heuristic second), and
//! vocabulary construction. A single failing table never aborts the
//! pass; it becomes a warning on a partial model.

use crate::introspect::SchemaIntrospector;
use crate::schema::{Relationship, RelationshipOrigin, SchemaModel, Table, VocabularyIndex};
use crate::synonyms::{singularize, SynonymDictionary};
use querybridge_common::config::DiscoveryConfig;
use querybridge_common::errors::Result;
use querybridge_common::metrics;
use std::collections::HashSet;
use std::time::Instant;
use tracing::{info, instrument, warn};

/// Service responsible for analyzing data sources
pub struct SchemaDiscovery {
    sample_row_limit: usize,
    dictionary: SynonymDictionary,
}

impl SchemaDiscovery {
    pub fn new(config: &DiscoveryConfig) -> Self {
        Self {
            sample_row_limit: config.sample_row_limit,
            dictionary: SynonymDictionary::builtin().merge(&config.synonyms),
        }
    }

    /// Use a custom dictionary (tests)
    pub fn with_dictionary(sample_row_limit: usize, dictionary: SynonymDictionary) -> Self {
        Self {
            sample_row_limit,
            dictionary,
        }
    }

    /// Run a discovery pass. Connectivity failure is a hard error; every
    /// per-table failure degrades to a warning on the returned model.
    #[instrument(skip_all)]
    pub async fn discover(&self, introspector: &dyn SchemaIntrospector) -> Result<SchemaModel> {
        let start = Instant::now();

        introspector.ping().await?;

        let names = introspector.table_names().await?;
        let mut seen = HashSet::new();
        let mut tables = Vec::new();
        let mut relationships = Vec::new();
        let mut warnings = Vec::new();

        for name in names {
            // Table names are unique within a model
            if !seen.insert(name.clone()) {
                continue;
            }

            let columns = match introspector.columns(&name).await {
                Ok(columns) if !columns.is_empty() => columns,
                Ok(_) => {
                    warnings.push(format!("table {}: no columns discovered", name));
                    continue;
                }
                Err(e) => {
                    warn!(table = %name, error = %e, "Column introspection failed");
                    warnings.push(format!("table {}: {}", name, e));
                    continue;
                }
            };

            let sample_rows = match introspector.sample_rows(&name, self.sample_row_limit).await {
                Ok(rows) => rows,
                Err(e) => {
                    warn!(table = %name, error = %e, "Row sampling failed");
                    warnings.push(format!("table {} sample: {}", name, e));
                    Vec::new()
                }
            };

            match introspector.foreign_keys(&name).await {
                Ok(fks) => {
                    for fk in fks {
                        relationships.push(Relationship {
                            from_table: name.clone(),
                            from_column: fk.column,
                            to_table: fk.referenced_table,
                            to_column: fk.referenced_column,
                            origin: RelationshipOrigin::ForeignKey,
                        });
                    }
                }
                Err(e) => {
                    warn!(table = %name, error = %e, "Constraint introspection failed");
                    warnings.push(format!("table {} constraints: {}", name, e));
                }
            }

            tables.push(Table {
                name,
                columns,
                sample_rows,
            });
        }

        infer_heuristic_relationships(&tables, &mut relationships);

        // Every relationship must reference tables present in the model
        let table_names: HashSet<&str> = tables.iter().map(|t| t.name.as_str()).collect();
        relationships.retain(|r| {
            table_names.contains(r.from_table.as_str()) && table_names.contains(r.to_table.as_str())
        });

        let vocabulary = VocabularyIndex::build(&tables, &self.dictionary);

        info!(
            tables = tables.len(),
            relationships = relationships.len(),
            vocabulary_terms = vocabulary.len(),
            warnings = warnings.len(),
            "Schema discovery complete"
        );
        metrics::record_discovery(start.elapsed().as_secs_f64(), tables.len());

        Ok(SchemaModel {
            tables,
            relationships,
            vocabulary,
            warnings,
        })
    }
}

/// Columns named `<table_singular>_id` imply a reference to `<table>`
/// when no declared constraint already covers them. Flagged as
/// lower-confidence `NamingHeuristic` relationships.
fn infer_heuristic_relationships(tables: &[Table], relationships: &mut Vec<Relationship>) {
    for table in tables {
        for column in &table.columns {
            let lower = column.name.to_lowercase();
            let Some(stem) = lower.strip_suffix("_id") else {
                continue;
            };
            if stem.is_empty() {
                continue;
            }

            let covered = relationships
                .iter()
                .any(|r| r.from_table == table.name && r.from_column.to_lowercase() == lower);
            if covered {
                continue;
            }

            let target = tables.iter().find(|t| {
                let name = t.name.to_lowercase();
                name != table.name.to_lowercase() && (singularize(&name) == stem || name == stem)
            });

            if let Some(target) = target {
                relationships.push(Relationship {
                    from_table: table.name.clone(),
                    from_column: column.name.clone(),
                    to_table: target.name.clone(),
                    to_column: "id".to_string(),
                    origin: RelationshipOrigin::NamingHeuristic,
                });
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::introspect::{ForeignKey, MemoryBackend};

    fn discovery() -> SchemaDiscovery {
        SchemaDiscovery::with_dictionary(5, SynonymDictionary::builtin())
    }

    #[tokio::test]
    async fn test_discover_hr_fixture() {
        let backend = MemoryBackend::hr_fixture();
        let model = discovery().discover(&backend).await.unwrap();

        assert_eq!(model.tables.len(), 2);
        assert!(model.warnings.is_empty());
        assert!(model.table("employees").is_some());
        assert!(!model.table("employees").unwrap().sample_rows.is_empty());

        // Declared FK captured
        assert!(model.relationships.iter().any(|r| {
            r.from_table == "employees"
                && r.to_table == "departments"
                && r.origin == RelationshipOrigin::ForeignKey
        }));
    }

    #[tokio::test]
    async fn test_discover_is_idempotent() {
        let backend = MemoryBackend::hr_fixture();
        let d = discovery();
        let first = d.discover(&backend).await.unwrap();
        let second = d.discover(&backend).await.unwrap();
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn test_partial_failure_yields_warnings_not_errors() {
        let backend = MemoryBackend::hr_fixture().with_failing_table("employees");
        let model = discovery().discover(&backend).await.unwrap();

        // employees failed but departments survived
        assert_eq!(model.tables.len(), 1);
        assert_eq!(model.tables[0].name, "departments");
        assert_eq!(model.warnings.len(), 1);
        assert!(model.warnings[0].contains("employees"));
    }

    #[tokio::test]
    async fn test_naming_heuristic_relationship() {
        let mut backend = MemoryBackend::empty();
        backend.add_table("projects", &[("id", "integer"), ("name", "text")], vec![], vec![]);
        backend.add_table(
            "tasks",
            &[("id", "integer"), ("project_id", "integer")],
            vec![],
            // No declared constraint on project_id
            vec![],
        );

        let model = discovery().discover(&backend).await.unwrap();
        let rel = model
            .relationships
            .iter()
            .find(|r| r.from_table == "tasks")
            .unwrap();
        assert_eq!(rel.to_table, "projects");
        assert_eq!(rel.origin, RelationshipOrigin::NamingHeuristic);
    }

    #[tokio::test]
    async fn test_declared_constraint_suppresses_heuristic() {
        let mut backend = MemoryBackend::empty();
        backend.add_table("departments", &[("id", "integer")], vec![], vec![]);
        backend.add_table(
            "employees",
            &[("id", "integer"), ("department_id", "integer")],
            vec![],
            vec![ForeignKey {
                column: "department_id".to_string(),
                referenced_table: "departments".to_string(),
                referenced_column: "id".to_string(),
            }],
        );

        let model = discovery().discover(&backend).await.unwrap();
        let edges: Vec<_> = model
            .relationships
            .iter()
            .filter(|r| r.from_table == "employees" && r.from_column == "department_id")
            .collect();
        assert_eq!(edges.len(), 1);
        assert_eq!(edges[0].origin, RelationshipOrigin::ForeignKey);
    }

    #[tokio::test]
    async fn test_relationships_only_reference_present_tables() {
        let mut backend = MemoryBackend::empty();
        backend.add_table(
            "orders",
            &[("id", "integer"), ("customer_id", "integer")],
            vec![],
            vec![ForeignKey {
                column: "customer_id".to_string(),
                // Table not present in the source
                referenced_table: "customers".to_string(),
                referenced_column: "id".to_string(),
            }],
        );

        let model = discovery().discover(&backend).await.unwrap();
        assert!(model.relationships.is_empty());
    }
}
