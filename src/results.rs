//! Result store and the local object handles it owns.
//!
//! Local conversions produce bytes that live in an [`ObjectStore`] until the
//! result that references them is superseded. Releasing is explicit: the
//! store forgets an object only when [`ResultStore::clear`] (or
//! [`ObjectStore::revoke`]) says so, mirroring object-URL revocation.

use crate::output::{ConversionResult, DownloadHandle};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::debug;
use uuid::Uuid;

/// Reference to bytes held in an [`ObjectStore`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct LocalHandle {
    id: Uuid,
    size: u64,
}

impl LocalHandle {
    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn size(&self) -> u64 {
        self.size
    }

    /// `blob:fileconv/<uuid>`
    pub fn url(&self) -> String {
        format!("blob:fileconv/{}", self.id)
    }
}

/// Shared registry of locally produced objects.
///
/// Cloning shares the same underlying map.
#[derive(Debug, Clone, Default)]
pub struct ObjectStore {
    objects: Arc<Mutex<HashMap<Uuid, Arc<[u8]>>>>,
}

impl ObjectStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<Uuid, Arc<[u8]>>> {
        self.objects.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Take ownership of `bytes` and hand out a handle to them.
    pub fn create(&self, bytes: Vec<u8>) -> LocalHandle {
        let handle = LocalHandle {
            id: Uuid::new_v4(),
            size: bytes.len() as u64,
        };
        self.lock().insert(handle.id, Arc::from(bytes));
        handle
    }

    /// Bytes behind `handle`, or `None` once revoked.
    pub fn resolve(&self, handle: &LocalHandle) -> Option<Arc<[u8]>> {
        self.lock().get(&handle.id).cloned()
    }

    /// Release `handle`; `false` if it was already gone.
    pub fn revoke(&self, handle: &LocalHandle) -> bool {
        self.lock().remove(&handle.id).is_some()
    }

    pub fn live_count(&self) -> usize {
        self.lock().len()
    }
}

/// Ordered conversion outcomes, in completion order.
#[derive(Debug, Default)]
pub struct ResultStore {
    results: Vec<ConversionResult>,
    objects: ObjectStore,
}

impl ResultStore {
    pub fn new(objects: ObjectStore) -> Self {
        Self {
            results: Vec::new(),
            objects,
        }
    }

    pub fn objects(&self) -> &ObjectStore {
        &self.objects
    }

    pub fn record(&mut self, result: ConversionResult) {
        self.results.push(result);
    }

    /// Release every local handle, then forget all results.
    pub fn clear(&mut self) {
        let mut released = 0;
        for result in &self.results {
            if let Some(DownloadHandle::Local(handle)) = &result.download {
                if self.objects.revoke(handle) {
                    released += 1;
                }
            }
        }
        if released > 0 {
            debug!("Released {} local download handles", released);
        }
        self.results.clear();
    }

    pub fn all(&self) -> &[ConversionResult] {
        &self.results
    }

    pub fn list_successful(&self) -> Vec<&ConversionResult> {
        self.results.iter().filter(|r| r.success).collect()
    }

    pub fn len(&self) -> usize {
        self.results.len()
    }

    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }
}

impl Drop for ResultStore {
    fn drop(&mut self) {
        self.clear();
    }
}
