//! Control layer: reads and writes live process variables.
//!
//! [`ControlLayer`] dispatches each address to a [`Shim`] chosen from the
//! address's protocol prefix (`loc://MY:PV`). Addresses without a prefix go
//! to the default shim, which is the first one registered.
//!
//! Reads are `async`. Puts run as tokio tasks and hand back a
//! [`TaskStatus`] that can be polled, awaited or given callbacks.

pub mod data;
pub mod errors;
pub mod shim;
pub mod status;

use std::sync::Arc;

use tracing::{debug, warn};

pub use data::EpicsData;
pub use errors::ControlError;
pub use shim::{LocalShim, Shim};
pub use status::{Callback, TaskStatus};

use crate::{Result, entry::EpicsValue};

/// Per-address outcome of a batch read.
pub type ControlResult<T> = std::result::Result<T, ControlError>;

/// Names of the shims this build can construct.
pub const AVAILABLE_SHIMS: &[&str] = &[LocalShim::PROTOCOL];

/// Dispatches reads and writes to protocol shims.
#[derive(Debug, Clone, Default)]
pub struct ControlLayer {
    shims: Vec<Arc<dyn Shim>>,
}

impl ControlLayer {
    /// A control layer with no shims; every address is unsupported.
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads the named shims, or every available one when `names` is `None`.
    ///
    /// Unknown names are skipped with a warning.
    pub fn from_names(names: Option<&[String]>) -> Self {
        let wanted: Vec<&str> = match names {
            Some(names) => names.iter().map(String::as_str).collect(),
            None => AVAILABLE_SHIMS.to_vec(),
        };
        let mut layer = Self::new();
        for name in wanted {
            match name {
                LocalShim::PROTOCOL => layer.register(Arc::new(LocalShim::new())),
                other => warn!(shim = other, "Skipping unknown control shim"),
            }
        }
        debug!(shims = ?layer.protocols(), "Loaded control shims");
        layer
    }

    /// Adds a shim. The first registered shim is the default.
    pub fn register(&mut self, shim: Arc<dyn Shim>) {
        self.shims.push(shim);
    }

    pub fn with_shim(mut self, shim: Arc<dyn Shim>) -> Self {
        self.register(shim);
        self
    }

    pub fn protocols(&self) -> Vec<&'static str> {
        self.shims.iter().map(|s| s.protocol()).collect()
    }

    /// Picks the shim for `address` and returns it with the bare PV name.
    pub fn shim_for<'a>(&self, address: &'a str) -> ControlResult<(Arc<dyn Shim>, &'a str)> {
        let unsupported = || ControlError::UnsupportedProtocol {
            address: address.to_string(),
        };
        match address.split_once("://") {
            Some((proto, pv)) => self
                .shims
                .iter()
                .find(|s| s.protocol() == proto)
                .map(|s| (s.clone(), pv))
                .ok_or_else(unsupported),
            None => self
                .shims
                .first()
                .map(|s| (s.clone(), address))
                .ok_or_else(unsupported),
        }
    }

    async fn get_one(&self, address: &str) -> ControlResult<EpicsData> {
        let (shim, pv) = self.shim_for(address)?;
        shim.get(pv).await
    }

    /// Reads a single address.
    pub async fn get(&self, address: &str) -> Result<EpicsData> {
        Ok(self.get_one(address).await?)
    }

    /// Reads many addresses concurrently. Results line up with `addresses`.
    pub async fn get_many(&self, addresses: &[String]) -> Vec<ControlResult<EpicsData>> {
        let mut handles = Vec::with_capacity(addresses.len());
        for address in addresses {
            let layer = self.clone();
            let address = address.clone();
            handles.push(tokio::spawn(async move { layer.get_one(&address).await }));
        }
        let mut out = Vec::with_capacity(handles.len());
        for (handle, address) in handles.into_iter().zip(addresses) {
            out.push(handle.await.unwrap_or_else(|e| {
                Err(ControlError::Communication {
                    address: address.clone(),
                    reason: e.to_string(),
                })
            }));
        }
        out
    }

    /// Starts writing `value` to `address`.
    ///
    /// The write runs as a tokio task; `callback` runs when it completes.
    /// Outside a tokio runtime the returned status is already failed.
    pub fn put(
        &self,
        address: &str,
        value: EpicsValue,
        callback: Option<Callback>,
    ) -> TaskStatus {
        let status = TaskStatus::pending();
        if let Some(callback) = callback {
            status.add_callback(callback);
        }
        let (shim, pv) = match self.shim_for(address) {
            Ok(found) => found,
            Err(e) => {
                status.finish(Err(e));
                return status;
            }
        };
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            status.finish(Err(ControlError::Communication {
                address: address.to_string(),
                reason: "no async runtime available".to_string(),
            }));
            return status;
        };
        let pv = pv.to_string();
        let task_status = status.clone();
        runtime.spawn(async move {
            let outcome = shim.put(&pv, value).await;
            if let Err(e) = &outcome {
                warn!(address = %pv, error = %e, "Put failed");
            }
            task_status.finish(outcome);
        });
        status
    }

    /// Starts one put per address. All arguments must have equal length.
    pub fn put_many(
        &self,
        addresses: &[String],
        values: Vec<EpicsValue>,
        callbacks: Option<Vec<Callback>>,
    ) -> ControlResult<Vec<TaskStatus>> {
        let callback_count = callbacks.as_ref().map_or(addresses.len(), Vec::len);
        if addresses.len() != values.len() || addresses.len() != callback_count {
            return Err(ControlError::LengthMismatch {
                addresses: addresses.len(),
                values: values.len(),
                callbacks: callback_count,
            });
        }
        let mut callbacks = callbacks.map(Vec::into_iter);
        Ok(addresses
            .iter()
            .zip(values)
            .map(|(address, value)| {
                let callback = callbacks.as_mut().and_then(Iterator::next);
                self.put(address, value, callback)
            })
            .collect())
    }
}
