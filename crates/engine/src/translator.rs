//! NL→SQL translation clients
//!
//! [`SqlTranslator`] is the seam to the language-model provider. The
//! HTTP implementation speaks the OpenAI-compatible chat-completions
//! protocol; the schema model travels as JSON context in the prompt and
//! the reply is reduced to a bare SQL string (or `None` when the
//! provider declares the question untranslatable).

use async_trait::async_trait;
use querybridge_common::config::TranslatorConfig;
use querybridge_common::errors::{AppError, Result};
use querybridge_discovery::{SchemaMapping, SchemaModel};
use regex_lite::Regex;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::{Arc, Mutex};
use std::time::Duration;

const SYSTEM_PROMPT: &str = "You are an expert SQL generator. Given a database schema and a \
natural language question, generate a single, valid read-only SQL query. Do not provide any \
explanation, only the SQL query itself. If you cannot generate a query, respond with 'INVALID'.";

/// Translate a natural-language question into SQL.
///
/// `Ok(None)` means the provider declined: the question has no SQL
/// answer against this schema.
#[async_trait]
pub trait SqlTranslator: Send + Sync {
    async fn translate(
        &self,
        query: &str,
        schema: &SchemaModel,
        mapping: &SchemaMapping,
    ) -> Result<Option<String>>;
}

/// OpenAI-compatible chat-completions translation client
pub struct HttpSqlTranslator {
    client: reqwest::Client,
    api_key: String,
    model: String,
    base_url: String,
}

#[derive(Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<ChatMessage>,
    temperature: f32,
    max_tokens: u32,
    stop: Vec<String>,
}

#[derive(Serialize)]
struct ChatMessage {
    role: &'static str,
    content: String,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Deserialize)]
struct ChatChoiceMessage {
    content: Option<String>,
}

impl HttpSqlTranslator {
    pub fn new(api_key: String, model: String, base_url: Option<String>, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| AppError::Configuration {
                message: format!("Failed to create HTTP client: {}", e),
            })?;

        Ok(Self {
            client,
            api_key,
            model,
            base_url: base_url.unwrap_or_else(|| "https://api.openai.com/v1".to_string()),
        })
    }

    /// Serialize the schema as prompt context: tables with typed columns
    /// and sample rows, relationships, per-table vocabulary, and the
    /// tables the query most likely concerns.
    fn build_prompt(&self, query: &str, schema: &SchemaModel, mapping: &SchemaMapping) -> String {
        let tables: Vec<serde_json::Value> = schema
            .tables
            .iter()
            .map(|table| {
                json!({
                    "name": table.name,
                    "columns": table.columns.iter().map(|c| {
                        json!({ "name": c.name, "type": c.declared_type })
                    }).collect::<Vec<_>>(),
                    "sample_rows": table.sample_rows,
                })
            })
            .collect();

        let relationships: Vec<serde_json::Value> = schema
            .relationships
            .iter()
            .map(|r| {
                json!({
                    "from": format!("{}.{}", r.from_table, r.from_column),
                    "to": format!("{}.{}", r.to_table, r.to_column),
                })
            })
            .collect();

        let synonyms: serde_json::Map<String, serde_json::Value> = schema
            .tables
            .iter()
            .map(|table| {
                (
                    table.name.clone(),
                    json!(schema.vocabulary.terms_for_table(&table.name)),
                )
            })
            .collect();

        let context = json!({
            "tables": tables,
            "relationships": relationships,
            "synonyms": synonyms,
            "likely_tables": mapping.likely_tables,
        });

        format!(
            "Database Schema:\n```json\n{}\n```\n\nUser Question:\n\"{}\"\n\nGenerate the SQL query \
for the user's question based on the provided schema.\nRespond with only the SQL query.",
            serde_json::to_string_pretty(&context).unwrap_or_default(),
            query
        )
    }
}

#[async_trait]
impl SqlTranslator for HttpSqlTranslator {
    async fn translate(
        &self,
        query: &str,
        schema: &SchemaModel,
        mapping: &SchemaMapping,
    ) -> Result<Option<String>> {
        let request = ChatRequest {
            model: self.model.clone(),
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: SYSTEM_PROMPT.to_string(),
                },
                ChatMessage {
                    role: "user",
                    content: self.build_prompt(query, schema, mapping),
                },
            ],
            temperature: 0.1,
            max_tokens: 1024,
            stop: vec!["```\n".to_string()],
        };

        let url = format!("{}/chat/completions", self.base_url);
        let response = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(&request)
            .send()
            .await
            .map_err(|e| AppError::Translation {
                message: format!("request failed: {}", e),
            })?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(AppError::Translation {
                message: format!("API error {}: {}", status, body),
            });
        }

        let parsed: ChatResponse = response.json().await.map_err(|e| AppError::Translation {
            message: format!("failed to parse response: {}", e),
        })?;

        let content = parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .unwrap_or_default();

        if content.is_empty() || content.contains("INVALID") {
            return Ok(None);
        }

        let sql = extract_sql(&content);
        if sql.is_empty() {
            return Ok(None);
        }
        Ok(Some(sql))
    }
}

/// Strip markdown fences from a model reply, keeping the SQL body
fn extract_sql(text: &str) -> String {
    let fenced = Regex::new(r"(?s)```(?:sql)?\s*(.*?)```").expect("valid regex");
    if let Some(captures) = fenced.captures(text) {
        return captures[1].trim().to_string();
    }
    // The stop sequence can cut the closing fence off
    let trimmed = text.trim();
    let trimmed = trimmed
        .strip_prefix("```sql")
        .or_else(|| trimmed.strip_prefix("```"))
        .unwrap_or(trimmed);
    trimmed.trim().trim_end_matches("```").trim().to_string()
}

/// Fixed-answer translator for tests and offline development: returns
/// the SQL registered for the first matching query fragment, `None`
/// otherwise.
#[derive(Default)]
pub struct StaticTranslator {
    answers: Mutex<Vec<(String, String)>>,
}

impl StaticTranslator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Serve `sql` for queries containing `fragment` (case-insensitive)
    pub fn register(&self, fragment: &str, sql: &str) {
        self.answers
            .lock()
            .expect("answers lock")
            .push((fragment.to_lowercase(), sql.to_string()));
    }
}

#[async_trait]
impl SqlTranslator for StaticTranslator {
    async fn translate(
        &self,
        query: &str,
        _schema: &SchemaModel,
        _mapping: &SchemaMapping,
    ) -> Result<Option<String>> {
        let lowered = query.to_lowercase();
        let answers = self.answers.lock().expect("answers lock");
        Ok(answers
            .iter()
            .find(|(fragment, _)| lowered.contains(fragment))
            .map(|(_, sql)| sql.clone()))
    }
}

/// Create a translator based on configuration
pub fn create_translator(config: &TranslatorConfig) -> Result<Arc<dyn SqlTranslator>> {
    match config.provider.as_str() {
        "openai" | "http" => {
            let key = config.api_key.clone().ok_or_else(|| AppError::Configuration {
                message: "Translator API key required for the http provider".to_string(),
            })?;
            Ok(Arc::new(HttpSqlTranslator::new(
                key,
                config.model.clone(),
                config.api_base.clone(),
                Duration::from_secs(config.timeout_secs),
            )?))
        }
        "static" => Ok(Arc::new(StaticTranslator::new())),
        other => {
            tracing::warn!(provider = other, "Unknown translator provider, using static");
            Ok(Arc::new(StaticTranslator::new()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use querybridge_discovery::{SynonymDictionary, Table, VocabularyIndex};

    #[test]
    fn test_extract_sql_from_fenced_block() {
        let text = "```sql\nSELECT 1\n```";
        assert_eq!(extract_sql(text), "SELECT 1");
    }

    #[test]
    fn test_extract_sql_from_unfenced_reply() {
        assert_eq!(extract_sql("SELECT * FROM employees\n"), "SELECT * FROM employees");
    }

    #[test]
    fn test_extract_sql_with_truncated_fence() {
        // The stop sequence removed the closing fence
        let text = "```sql\nSELECT name FROM departments";
        assert_eq!(extract_sql(text), "SELECT name FROM departments");
    }

    #[tokio::test]
    async fn test_static_translator_matches_fragment() {
        let translator = StaticTranslator::new();
        translator.register("average salary", "SELECT AVG(salary) FROM employees");

        let schema = SchemaModel::default();
        let mapping = schema.map_query("show average salary");
        let sql = translator
            .translate("Show Average Salary by department", &schema, &mapping)
            .await
            .unwrap();
        assert_eq!(sql.as_deref(), Some("SELECT AVG(salary) FROM employees"));

        let none = translator
            .translate("something else", &schema, &mapping)
            .await
            .unwrap();
        assert!(none.is_none());
    }

    #[test]
    fn test_prompt_carries_schema_context() {
        let translator = HttpSqlTranslator::new(
            "key".to_string(),
            "model".to_string(),
            None,
            Duration::from_secs(5),
        )
        .unwrap();

        let tables = vec![Table {
            name: "employees".to_string(),
            columns: vec![querybridge_discovery::Column::new("salary", "numeric")],
            sample_rows: vec![],
        }];
        let vocabulary = VocabularyIndex::build(&tables, &SynonymDictionary::builtin());
        let schema = SchemaModel {
            tables,
            relationships: vec![],
            vocabulary,
            warnings: vec![],
        };
        let mapping = schema.map_query("average salary");

        let prompt = translator.build_prompt("average salary", &schema, &mapping);
        assert!(prompt.contains("employees"));
        assert!(prompt.contains("salary"));
        assert!(prompt.contains("likely_tables"));
        assert!(prompt.contains("average salary"));
    }
}
