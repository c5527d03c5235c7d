//! Transport shims behind the control layer.
//!
//! A shim speaks one protocol. The control layer picks the shim from the
//! address prefix (`loc://PV`) and hands it the bare PV name.

use std::{
    collections::{HashMap, HashSet},
    fmt,
    sync::{Arc, PoisonError, RwLock},
};

use async_trait::async_trait;
use tracing::debug;

use super::{data::EpicsData, errors::ControlError};
use crate::{
    clock::{Clock, SystemClock},
    entry::{EpicsValue, Severity, Status},
};

/// A protocol-specific transport.
#[async_trait]
pub trait Shim: Send + Sync + fmt::Debug {
    /// Protocol prefix this shim serves, without `://`.
    fn protocol(&self) -> &'static str;

    /// Reads the current value of `address`.
    async fn get(&self, address: &str) -> Result<EpicsData, ControlError>;

    /// Writes `value` to `address`, resolving once the write is acknowledged.
    async fn put(&self, address: &str, value: EpicsValue) -> Result<(), ControlError>;
}

/// In-process PV table served under the `loc` protocol.
///
/// Values must be created with [`LocalShim::set`] before they can be read
/// or written. Writes to addresses marked read-only fail.
pub struct LocalShim {
    values: RwLock<HashMap<String, EpicsData>>,
    read_only: RwLock<HashSet<String>>,
    clock: Arc<dyn Clock>,
}

impl LocalShim {
    pub const PROTOCOL: &'static str = "loc";

    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            values: RwLock::default(),
            read_only: RwLock::default(),
            clock,
        }
    }

    /// Creates or replaces a PV with a healthy reading of `value`.
    pub fn set(&self, address: impl Into<String>, value: impl Into<EpicsValue>) {
        let data = EpicsData::new(Some(value.into()), self.clock.now())
            .with_alarm(Status::NoAlarm, Severity::NoAlarm);
        self.set_data(address, data);
    }

    /// Creates or replaces a PV with a full reading.
    pub fn set_data(&self, address: impl Into<String>, data: EpicsData) {
        self.values
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(address.into(), data);
    }

    /// Current value of `address`, if it exists.
    pub fn value(&self, address: &str) -> Option<EpicsValue> {
        self.values
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(address)
            .and_then(|d| d.data.clone())
    }

    pub fn set_read_only(&self, address: impl Into<String>, read_only: bool) {
        let mut set = self.read_only.write().unwrap_or_else(PoisonError::into_inner);
        let address = address.into();
        if read_only {
            set.insert(address);
        } else {
            set.remove(&address);
        }
    }

    fn unknown(address: &str) -> ControlError {
        ControlError::Communication {
            address: address.to_string(),
            reason: "no such PV".to_string(),
        }
    }
}

impl Default for LocalShim {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for LocalShim {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let count = self.values.read().map(|v| v.len()).unwrap_or_default();
        f.debug_struct("LocalShim").field("pvs", &count).finish()
    }
}

#[async_trait]
impl Shim for LocalShim {
    fn protocol(&self) -> &'static str {
        Self::PROTOCOL
    }

    async fn get(&self, address: &str) -> Result<EpicsData, ControlError> {
        self.values
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(address)
            .cloned()
            .ok_or_else(|| Self::unknown(address))
    }

    async fn put(&self, address: &str, value: EpicsValue) -> Result<(), ControlError> {
        let read_only = self
            .read_only
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(address);
        if read_only {
            return Err(ControlError::Communication {
                address: address.to_string(),
                reason: "write access denied".to_string(),
            });
        }
        let mut values = self.values.write().unwrap_or_else(PoisonError::into_inner);
        let data = values.get_mut(address).ok_or_else(|| Self::unknown(address))?;
        data.data = Some(value);
        data.timestamp = self.clock.now();
        debug!(address, "Local put");
        Ok(())
    }
}
