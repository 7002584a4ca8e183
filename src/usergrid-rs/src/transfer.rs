use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use tracing::debug;

pub type TransferId = u64;

/// `(bytes_so_far, bytes_total)`; the total is `None` when the size is unknown
pub type ProgressCallback = Arc<dyn Fn(u64, Option<u64>) + Send + Sync>;

pub type Completion<T> = Box<dyn FnOnce(T) + Send + 'static>;

struct Handler<T> {
    progress: Option<ProgressCallback>,
    completion: Option<Completion<T>>,
    transferred: u64,
    expected: Option<u64>,
}

/// Progress to report for one chunk
pub struct ProgressUpdate {
    pub callback: ProgressCallback,
    pub so_far: u64,
    pub total: Option<u64>,
}

/// Per-transfer handlers keyed by a locally generated id.
///
/// The lock is held only while updating the map, never while a callback runs.
pub struct TransferRegistry<T> {
    next_id: AtomicU64,
    handlers: Mutex<HashMap<TransferId, Handler<T>>>,
}

impl<T> TransferRegistry<T> {
    pub fn new() -> Self {
        Self {
            next_id: AtomicU64::new(1),
            handlers: Mutex::new(HashMap::new()),
        }
    }

    pub fn register(
        &self,
        progress: Option<ProgressCallback>,
        completion: Option<Completion<T>>,
    ) -> TransferId {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let handler = Handler {
            progress,
            completion,
            transferred: 0,
            expected: None,
        };
        if let Ok(mut handlers) = self.handlers.lock() {
            handlers.insert(id, handler);
        }
        debug!("Registered transfer {}", id);
        id
    }

    /// Account for `bytes` more of transfer `id`
    pub fn record(
        &self,
        id: TransferId,
        bytes: u64,
        expected: Option<u64>,
    ) -> Option<ProgressUpdate> {
        let mut handlers = self.handlers.lock().ok()?;
        let handler = handlers.get_mut(&id)?;
        handler.transferred += bytes;
        if expected.is_some() {
            handler.expected = expected;
        }
        handler.progress.clone().map(|callback| ProgressUpdate {
            callback,
            so_far: handler.transferred,
            total: handler.expected,
        })
    }

    /// Deregister transfer `id`, handing back its completion. Returns `None`
    /// if the transfer already finished.
    pub fn finish(&self, id: TransferId) -> Option<Completion<T>> {
        let handler = self.handlers.lock().ok()?.remove(&id)?;
        debug!("Finished transfer {} after {} bytes", id, handler.transferred);
        handler.completion
    }

    /// Finish transfer `id` when the returned guard drops, including when
    /// the future driving it is cancelled
    pub fn finish_on_drop(&self, id: TransferId) -> FinishOnDrop<'_, T> {
        FinishOnDrop { registry: self, id }
    }

    pub fn is_active(&self, id: TransferId) -> bool {
        self.handlers
            .lock()
            .map(|handlers| handlers.contains_key(&id))
            .unwrap_or(false)
    }

    pub fn active(&self) -> usize {
        self.handlers.lock().map(|h| h.len()).unwrap_or(0)
    }
}

pub struct FinishOnDrop<'a, T> {
    registry: &'a TransferRegistry<T>,
    id: TransferId,
}

impl<T> Drop for FinishOnDrop<'_, T> {
    fn drop(&mut self) {
        self.registry.finish(self.id);
    }
}

impl<T> Default for TransferRegistry<T> {
    fn default() -> Self {
        Self::new()
    }
}
