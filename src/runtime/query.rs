//! Encoded queries used by `lookup` and `choice` mappings.
//!
//! A query is a `^`-separated list of conditions, for example
//! `name=finding^element=severity^label=$1`. The mapping's template carries a
//! `$1` placeholder that is replaced by the cell value before the query is
//! handed to a lookup collaborator.

use std::sync::OnceLock;

use indexmap::IndexMap;
use regex::Regex;

use crate::error::StoreError;

/// Placeholder replaced by the cell value.
pub const PLACEHOLDER: &str = "$1";

/// Result of filling a query template.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Substitution {
    pub query: String,
    /// Number of placeholders found in the template
    pub placeholders: usize,
}

/// Replace the first `$1` in `template` with `value`.
///
/// Later occurrences are left untouched; a template without a placeholder is
/// returned unchanged. Callers decide whether either case is worth a
/// diagnostic via [`Substitution::placeholders`].
pub fn substitute(template: &str, value: &str) -> Substitution {
    let placeholders = template.matches(PLACEHOLDER).count();
    Substitution {
        query: template.replacen(PLACEHOLDER, value, 1),
        placeholders,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operator {
    Equals,
    NotEquals,
    Like,
    StartsWith,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Condition {
    pub field: String,
    pub operator: Operator,
    pub value: String,
}

impl Condition {
    fn matches(&self, fields: &IndexMap<String, String>) -> bool {
        let actual = fields.get(&self.field).map(String::as_str).unwrap_or("");
        match self.operator {
            Operator::Equals => actual == self.value,
            Operator::NotEquals => actual != self.value,
            Operator::Like => actual.contains(&self.value),
            Operator::StartsWith => actual.starts_with(&self.value),
        }
    }
}

fn condition_regex() -> &'static Regex {
    static CONDITION: OnceLock<Regex> = OnceLock::new();
    CONDITION.get_or_init(|| {
        Regex::new(r"^([A-Za-z_][A-Za-z0-9_.]*?)(!=|=|LIKE|STARTSWITH)(.*)$")
            .expect("condition pattern is valid")
    })
}

/// A parsed conjunction of conditions.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct EncodedQuery {
    conditions: Vec<Condition>,
}

impl EncodedQuery {
    pub fn parse(query: &str) -> Result<Self, StoreError> {
        let mut conditions = Vec::new();

        for term in query.split('^').map(str::trim).filter(|t| !t.is_empty()) {
            let caps = condition_regex()
                .captures(term)
                .ok_or_else(|| StoreError::InvalidQuery {
                    query: query.to_string(),
                    reason: format!("cannot parse condition '{}'", term),
                })?;

            let operator = match &caps[2] {
                "=" => Operator::Equals,
                "!=" => Operator::NotEquals,
                "LIKE" => Operator::Like,
                _ => Operator::StartsWith,
            };

            conditions.push(Condition {
                field: caps[1].to_string(),
                operator,
                value: caps[3].to_string(),
            });
        }

        Ok(Self { conditions })
    }

    pub fn conditions(&self) -> &[Condition] {
        &self.conditions
    }

    /// An empty query matches every record.
    pub fn matches(&self, fields: &IndexMap<String, String>) -> bool {
        self.conditions.iter().all(|c| c.matches(fields))
    }
}
