//! Single-writer session state with replay-latest fan-out.
//!
//! The store owns the canonical in-memory `Option<Identity>` inside a
//! `tokio::sync::watch` channel: `current()` and the stream read the same
//! cell, so the live value and the last publication can never disagree.
//! Persistence is written before the publication, in one uninterruptible
//! step, so a restart restores exactly what subscribers last saw.

use std::sync::Arc;

use tokio::sync::watch;
use tracing::{debug, warn};

use crate::error::Error;
use crate::identity::{Identity, IdentityData};
use crate::storage::SessionStorage;

const STORAGE_KEY: &str = "identity";

/// Cheaply cloneable handle to the process-wide session cell.
#[derive(Clone)]
pub struct SessionStore {
    inner: Arc<Inner>,
}

struct Inner {
    storage: Box<dyn SessionStorage>,
    cell: watch::Sender<Option<Identity>>,
}

impl SessionStore {
    /// Create the store, restoring any previously persisted identity.
    ///
    /// A missing or unreadable snapshot starts the session anonymous; it is
    /// never an error, since this runs at startup and must not block the
    /// application from loading.
    pub fn new(storage: impl SessionStorage + 'static) -> Self {
        let initial = restore(&storage);
        let (cell, _) = watch::channel(initial);
        Self {
            inner: Arc::new(Inner {
                storage: Box::new(storage),
                cell,
            }),
        }
    }

    /// Snapshot of the live value.
    #[must_use]
    pub fn current(&self) -> Option<Identity> {
        self.inner.cell.borrow().clone()
    }

    #[must_use]
    pub fn is_authenticated(&self) -> bool {
        self.inner.cell.borrow().is_some()
    }

    /// Replay-latest stream of session changes: `borrow()` on the receiver
    /// holds the current value, `changed()` resolves on every commit or
    /// clear after that, in commit order.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<Option<Identity>> {
        self.inner.cell.subscribe()
    }

    /// Persist and publish a new identity.
    pub fn commit(&self, identity: Identity) {
        match serde_json::to_string(identity.data()) {
            Ok(snapshot) => self.inner.storage.set(STORAGE_KEY, &snapshot),
            Err(error) => warn!(%error, "failed to serialize session snapshot"),
        }
        self.inner.cell.send_replace(Some(identity));
    }

    /// Drop the identity from memory and storage and publish `None`.
    pub fn clear(&self) {
        self.inner.storage.remove(STORAGE_KEY);
        self.inner.cell.send_replace(None);
    }
}

fn restore(storage: &dyn SessionStorage) -> Option<Identity> {
    let snapshot = storage.get(STORAGE_KEY)?;
    match parse_snapshot(&snapshot) {
        Ok(identity) => Some(identity),
        Err(error) => {
            debug!(%error, "discarding unreadable session snapshot");
            None
        }
    }
}

fn parse_snapshot(snapshot: &str) -> Result<Identity, Error> {
    let data: IdentityData =
        serde_json::from_str(snapshot).map_err(|_| Error::CorruptPersistedState)?;
    Identity::from_data(data).map_err(|_| Error::CorruptPersistedState)
}
