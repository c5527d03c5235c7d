//! Primitive process-variable values and EPICS alarm metadata.
//!
//! Values are stored as plain scalars or sequences so every backend can
//! serialize them as bare JSON without wrapper objects.

use serde::{Deserialize, Serialize};

/// A primitive value read from or written to a process variable.
///
/// Serialized untagged: `true`, `3`, `2.5`, `"text"`, `[1, 2, 3]`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum EpicsValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    Array(Vec<EpicsValue>),
}

impl EpicsValue {
    /// Numeric view of the value, if it has one.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            EpicsValue::Int(i) => Some(*i as f64),
            EpicsValue::Float(f) => Some(*f),
            EpicsValue::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
            _ => None,
        }
    }
}

impl From<bool> for EpicsValue {
    fn from(v: bool) -> Self {
        EpicsValue::Bool(v)
    }
}

impl From<i64> for EpicsValue {
    fn from(v: i64) -> Self {
        EpicsValue::Int(v)
    }
}

impl From<i32> for EpicsValue {
    fn from(v: i32) -> Self {
        EpicsValue::Int(v.into())
    }
}

impl From<f64> for EpicsValue {
    fn from(v: f64) -> Self {
        EpicsValue::Float(v)
    }
}

impl From<&str> for EpicsValue {
    fn from(v: &str) -> Self {
        EpicsValue::Str(v.to_string())
    }
}

impl From<String> for EpicsValue {
    fn from(v: String) -> Self {
        EpicsValue::Str(v)
    }
}

impl<T: Into<EpicsValue>> From<Vec<T>> for EpicsValue {
    fn from(v: Vec<T>) -> Self {
        EpicsValue::Array(v.into_iter().map(Into::into).collect())
    }
}

/// EPICS alarm severity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Severity {
    NoAlarm,
    Minor,
    Major,
    #[default]
    Invalid,
}

/// EPICS alarm status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Status {
    NoAlarm,
    Read,
    Write,
    Hihi,
    High,
    Lolo,
    Low,
    State,
    Cos,
    Comm,
    Timeout,
    HwLimit,
    Calc,
    Scan,
    Link,
    Soft,
    BadSub,
    #[default]
    Udf,
    Disable,
    Simm,
    ReadAccess,
    WriteAccess,
}
