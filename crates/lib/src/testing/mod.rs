//! Helpers for building populated backends and clients in tests.
//!
//! Enabled with the `testing` feature.
//!
//! ```
//! use superscore::backend::BackendKind;
//! use superscore::testing::{Seed, seed_backend};
//!
//! let dir = tempfile::tempdir().unwrap();
//! let backend = seed_backend(BackendKind::Filestore, Seed::Named("linac_data"), dir.path()).unwrap();
//! assert_eq!(backend.root().unwrap().entries.len(), 2);
//! ```

pub mod fixtures;

use std::{
    path::{Path, PathBuf},
    sync::Arc,
};

use tracing::debug;

use crate::{
    Client, Result,
    backend::{Backend, BackendError, BackendKind},
    clock::FixedClock,
    control::{ControlLayer, LocalShim},
    entry::{Entry, Root},
};

/// Where seed data comes from.
#[derive(Debug, Clone)]
pub enum Seed {
    /// A JSON document holding a serialized [`Root`].
    Path(PathBuf),
    /// A function producing the data.
    Root(fn() -> Root),
    /// Explicit entries, saved in order.
    Entries(Vec<Entry>),
    /// A fixture from [`fixtures`], by name.
    Named(&'static str),
}

impl Seed {
    /// Materializes the seed data.
    pub fn into_root(self) -> Result<Root> {
        match self {
            Seed::Path(path) => {
                let json = std::fs::read_to_string(&path)
                    .map_err(|source| BackendError::FileIo { source })?;
                let root = serde_json::from_str(&json)
                    .map_err(|source| BackendError::DeserializationFailed { source })?;
                Ok(root)
            }
            Seed::Root(make) => Ok(make()),
            Seed::Entries(entries) => Ok(Root::new(entries)),
            Seed::Named(name) => fixtures::named(name).ok_or_else(|| {
                BackendError::InvalidConfiguration {
                    reason: format!(
                        "unknown fixture \"{name}\"; expected one of {:?}",
                        fixtures::FIXTURE_NAMES
                    ),
                }
                .into()
            }),
        }
    }
}

/// Opens a backend of `kind` inside `dir` and saves the seed entries into it.
///
/// The filestore lives at `dir/filestore.json` and the directory backend
/// at `dir/directory`; the test backend ignores `dir`.
pub fn seed_backend(kind: BackendKind, seed: Seed, dir: &Path) -> Result<Box<dyn Backend>> {
    let path = match kind {
        BackendKind::Filestore => Some(dir.join("filestore.json")),
        BackendKind::Directory => Some(dir.join("directory")),
        BackendKind::Test => None,
    };
    let backend = kind.open(path)?;
    let root = seed.into_root()?;
    debug!(backend = %kind, entries = root.entries.len(), "Seeding backend");
    for mut entry in root.entries {
        backend.save_entry(&mut entry)?;
    }
    Ok(backend)
}

/// A client over `backend` with a [`LocalShim`] as its only shim and a
/// [`FixedClock`].
pub fn local_client(backend: Box<dyn Backend>) -> (Client, Arc<LocalShim>) {
    let clock = Arc::new(FixedClock::default());
    let shim = Arc::new(LocalShim::with_clock(clock.clone()));
    let client = Client::new(backend, ControlLayer::new().with_shim(shim.clone())).with_clock(clock);
    (client, shim)
}
