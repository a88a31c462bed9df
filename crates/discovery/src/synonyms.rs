//! Business-vocabulary synonym dictionary
//!
//! Maps informal terms ("comp", "dept", "staff") to canonical families so
//! the vocabulary index can resolve them to discovered column names.
//! Built-ins cover the common HR/business families; deployments extend
//! them through `discovery.synonyms` in configuration.

use std::collections::HashMap;

/// Canonical term families, canonical → synonyms (canonical included)
#[derive(Debug, Clone)]
pub struct SynonymDictionary {
    families: HashMap<String, Vec<String>>,
}

impl SynonymDictionary {
    /// The built-in alias dictionary
    pub fn builtin() -> Self {
        let mut families = HashMap::new();
        let mut add = |canonical: &str, synonyms: &[&str]| {
            let mut terms: Vec<String> = synonyms.iter().map(|s| s.to_string()).collect();
            if !terms.iter().any(|t| t == canonical) {
                terms.insert(0, canonical.to_string());
            }
            families.insert(canonical.to_string(), terms);
        };

        add("employee", &["employee", "employees", "emp", "staff", "person", "personnel", "worker", "headcount"]);
        add("department", &["department", "dept", "division", "team", "unit"]);
        add("salary", &["salary", "compensation", "comp", "pay", "pay_rate", "annual_salary", "wage", "earnings"]);
        add("manager", &["manager", "lead", "supervisor", "head", "reports_to"]);
        add("hire_date", &["hire_date", "hired_on", "start_date", "join_date", "joined"]);
        add("location", &["location", "office", "city", "site"]);
        add("skills", &["skill", "skills", "competency", "competencies", "skillset"]);
        add("title", &["title", "role", "position", "job_title"]);

        Self { families }
    }

    /// An empty dictionary (tests)
    pub fn empty() -> Self {
        Self {
            families: HashMap::new(),
        }
    }

    /// Merge configured extras into the dictionary. Extra synonyms extend
    /// an existing family or open a new one.
    pub fn merge(mut self, extra: &HashMap<String, Vec<String>>) -> Self {
        for (canonical, synonyms) in extra {
            let canonical = normalize_term(canonical);
            let family = self.families.entry(canonical.clone()).or_insert_with(|| vec![canonical]);
            for synonym in synonyms {
                let synonym = normalize_term(synonym);
                if !family.contains(&synonym) {
                    family.push(synonym);
                }
            }
        }
        self
    }

    /// Iterate families as (canonical, synonyms)
    pub fn families(&self) -> impl Iterator<Item = (&String, &Vec<String>)> {
        self.families.iter()
    }

    /// Find the canonical family a term belongs to
    pub fn family_for(&self, term: &str) -> Option<&str> {
        let normalized = normalize_term(term);
        let singular = singularize(&normalized);
        self.families
            .iter()
            .find(|(canonical, synonyms)| {
                **canonical == normalized
                    || **canonical == singular
                    || synonyms.iter().any(|s| *s == normalized || *s == singular)
            })
            .map(|(canonical, _)| canonical.as_str())
    }
}

/// Normalize a vocabulary term: case-fold, underscore/space equivalence,
/// trimmed. Stored and looked-up terms both pass through here.
pub fn normalize_term(term: &str) -> String {
    term.trim().to_lowercase().replace([' ', '-'], "_")
}

/// Naive English singularization, good enough for column/table names
pub fn singularize(term: &str) -> String {
    if let Some(stem) = term.strip_suffix("ies") {
        if !stem.is_empty() {
            return format!("{}y", stem);
        }
    }
    for suffix in ["ches", "shes", "sses", "xes", "zes"] {
        if let Some(stem) = term.strip_suffix(suffix) {
            return format!("{}{}", stem, &suffix[..suffix.len() - 2]);
        }
    }
    if term.ends_with('s') && !term.ends_with("ss") && term.len() > 1 {
        return term[..term.len() - 1].to_string();
    }
    term.to_string()
}
