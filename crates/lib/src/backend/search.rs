//! Search terms and their evaluation against entries.
//!
//! A term names an attribute, an operator and a target value. Attributes are
//! looked up on the entry's serialized form, so any serialized field name is
//! searchable. Two attributes are special:
//!
//! * `entry_type` compares against the entry's kind name (`"Setpoint"`, ...).
//! * `ancestor` matches entries reachable from the target id through child
//!   references, the target itself included.

use std::{cmp::Ordering, fmt, str::FromStr};

use chrono::{DateTime, Utc};
use regex_lite::Regex;
use serde_json::Value;

use super::errors::BackendError;
use crate::{
    Result,
    entry::{Entry, EntryType, ID},
};

/// Comparison operators understood by [`SearchTerm`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SearchOperator {
    /// Equal.
    Eq,
    /// Less than or equal; subset for arrays.
    Lt,
    /// Greater than or equal; superset for arrays.
    Gt,
    /// Contained in the target array (or substring of a target string).
    In,
    /// Regular expression match on the string form.
    Like,
    /// Within tolerance of a target. Target is `[value, rel_tol, abs_tol]`.
    /// Only the client understands this operator; it rewrites it into a
    /// `Gt`/`Lt` pair before reaching a backend.
    IsClose,
}

impl SearchOperator {
    pub fn as_str(&self) -> &'static str {
        match self {
            SearchOperator::Eq => "eq",
            SearchOperator::Lt => "lt",
            SearchOperator::Gt => "gt",
            SearchOperator::In => "in",
            SearchOperator::Like => "like",
            SearchOperator::IsClose => "isclose",
        }
    }
}

impl fmt::Display for SearchOperator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SearchOperator {
    type Err = BackendError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "eq" => Ok(SearchOperator::Eq),
            "lt" => Ok(SearchOperator::Lt),
            "gt" => Ok(SearchOperator::Gt),
            "in" => Ok(SearchOperator::In),
            "like" => Ok(SearchOperator::Like),
            "isclose" => Ok(SearchOperator::IsClose),
            other => Err(BackendError::InvalidSearch {
                reason: format!("unsupported operator \"{other}\""),
            }),
        }
    }
}

/// A single `(attribute, operator, value)` filter.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchTerm {
    pub attr: String,
    pub operator: SearchOperator,
    pub value: Value,
}

impl SearchTerm {
    pub fn new(attr: impl Into<String>, operator: SearchOperator, value: impl Into<Value>) -> Self {
        Self {
            attr: attr.into(),
            operator,
            value: value.into(),
        }
    }

    /// Builds a term from a textual operator name.
    pub fn parse(attr: impl Into<String>, operator: &str, value: impl Into<Value>) -> Result<Self> {
        Ok(Self::new(attr, operator.parse()?, value))
    }

    pub fn eq(attr: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::new(attr, SearchOperator::Eq, value)
    }

    pub fn entry_type(kind: EntryType) -> Self {
        Self::eq("entry_type", kind.as_str())
    }

    pub fn ancestor(id: ID) -> Self {
        Self::eq("ancestor", id.to_string())
    }
}

/// The attribute a compiled term inspects.
#[derive(Debug, Clone)]
pub(crate) enum Attr {
    EntryType,
    Ancestor(ID),
    Field(String),
}

/// A validated term, ready to be evaluated many times.
#[derive(Debug, Clone)]
pub(crate) struct CompiledTerm {
    pub(crate) attr: Attr,
    operator: SearchOperator,
    value: Value,
    regex: Option<Regex>,
}

impl CompiledTerm {
    pub(crate) fn compile(term: &SearchTerm) -> Result<Self> {
        let attr = match term.attr.as_str() {
            "entry_type" => Attr::EntryType,
            "ancestor" => {
                let id = term
                    .value
                    .as_str()
                    .and_then(|s| ID::parse(s).ok())
                    .ok_or_else(|| BackendError::InvalidSearch {
                        reason: format!("ancestor target must be an entry id, got {}", term.value),
                    })?;
                Attr::Ancestor(id)
            }
            other => Attr::Field(other.to_string()),
        };

        let regex = match term.operator {
            SearchOperator::Like => {
                let pattern = term.value.as_str().ok_or_else(|| BackendError::InvalidSearch {
                    reason: format!("\"like\" needs a string pattern, got {}", term.value),
                })?;
                Some(Regex::new(pattern).map_err(|e| BackendError::InvalidSearch {
                    reason: format!("bad pattern {pattern:?}: {e}"),
                })?)
            }
            SearchOperator::IsClose => {
                return Err(BackendError::InvalidSearch {
                    reason: "\"isclose\" must be expanded before reaching a backend".to_string(),
                }
                .into());
            }
            _ => None,
        };

        Ok(Self {
            attr,
            operator: term.operator,
            value: term.value.clone(),
            regex,
        })
    }

    /// Evaluates the term against an entry. `Ancestor` terms are resolved
    /// by the caller, which owns the reachability data.
    pub(crate) fn matches(&self, entry: &Entry, serialized: &Value) -> bool {
        match &self.attr {
            Attr::EntryType => {
                let kind = Value::from(entry.entry_type().as_str());
                self.compare(&kind)
            }
            Attr::Ancestor(_) => false,
            Attr::Field(name) => match serialized.get(name) {
                Some(data) => self.compare(data),
                None => false,
            },
        }
    }

    fn compare(&self, data: &Value) -> bool {
        match self.operator {
            SearchOperator::Eq => loose_eq(data, &self.value),
            SearchOperator::Lt => match (data, &self.value) {
                (Value::Array(d), Value::Array(t)) => d.iter().all(|x| contains(t, x)),
                _ => matches!(order(data, &self.value), Some(Ordering::Less | Ordering::Equal)),
            },
            SearchOperator::Gt => match (data, &self.value) {
                (Value::Array(d), Value::Array(t)) => t.iter().all(|x| contains(d, x)),
                _ => matches!(order(data, &self.value), Some(Ordering::Greater | Ordering::Equal)),
            },
            SearchOperator::In => match (&self.value, data) {
                (Value::Array(t), _) => contains(t, data),
                (Value::String(t), Value::String(d)) => t.contains(d.as_str()),
                _ => false,
            },
            SearchOperator::Like => match &self.regex {
                Some(regex) => match data {
                    Value::String(s) => regex.is_match(s),
                    Value::Null => false,
                    other => regex.is_match(&other.to_string()),
                },
                None => false,
            },
            SearchOperator::IsClose => false,
        }
    }
}

fn contains(haystack: &[Value], needle: &Value) -> bool {
    haystack.iter().any(|v| loose_eq(v, needle))
}

/// Equality where integers and floats with the same value compare equal.
fn loose_eq(a: &Value, b: &Value) -> bool {
    match (a.as_f64(), b.as_f64()) {
        (Some(x), Some(y)) if a.is_number() && b.is_number() => x == y,
        _ => a == b,
    }
}

/// Ordering for numbers, timestamps and plain strings.
fn order(a: &Value, b: &Value) -> Option<Ordering> {
    match (a, b) {
        (Value::Number(_), Value::Number(_)) => a.as_f64()?.partial_cmp(&b.as_f64()?),
        (Value::String(x), Value::String(y)) => {
            match (x.parse::<DateTime<Utc>>(), y.parse::<DateTime<Utc>>()) {
                (Ok(x), Ok(y)) => Some(x.cmp(&y)),
                _ => Some(x.cmp(y)),
            }
        }
        (Value::Bool(x), Value::Bool(y)) => Some(x.cmp(y)),
        _ => None,
    }
}
