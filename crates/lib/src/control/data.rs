//! Readings returned by the control layer.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::entry::{EpicsValue, Severity, Status};

/// A value read from a process variable together with its alarm state and
/// display metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EpicsData {
    pub data: Option<EpicsValue>,
    #[serde(default)]
    pub status: Status,
    #[serde(default)]
    pub severity: Severity,
    pub timestamp: DateTime<Utc>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub units: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub precision: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub upper_ctrl_limit: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lower_ctrl_limit: Option<f64>,
    /// LOLO
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lower_alarm_limit: Option<f64>,
    /// HIHI
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub upper_alarm_limit: Option<f64>,
    /// LOW
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lower_warning_limit: Option<f64>,
    /// HIGH
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub upper_warning_limit: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enums: Option<Vec<String>>,
}

impl EpicsData {
    /// A reading of `data` taken at `timestamp`, with undefined alarm state.
    pub fn new(data: Option<EpicsValue>, timestamp: DateTime<Utc>) -> Self {
        Self {
            data,
            status: Status::default(),
            severity: Severity::default(),
            timestamp,
            units: None,
            precision: None,
            upper_ctrl_limit: None,
            lower_ctrl_limit: None,
            lower_alarm_limit: None,
            upper_alarm_limit: None,
            lower_warning_limit: None,
            upper_warning_limit: None,
            enums: None,
        }
    }

    pub fn with_alarm(mut self, status: Status, severity: Severity) -> Self {
        self.status = status;
        self.severity = severity;
        self
    }

    /// True if the reading carries no alarm.
    pub fn is_healthy(&self) -> bool {
        self.severity == Severity::NoAlarm
    }
}
