// In-memory LibraryService for tracker tests

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex};
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use tokio::sync::{Notify, Semaphore};

use super::service::{LibraryService, ProgressUpdate};
use crate::{
    domain::models::{BookId, Kind, LibraryEntry},
    error::{ApiError, ApiResult},
};

type Key = (BookId, Kind);

#[derive(Debug, Clone, Copy)]
pub(crate) enum FailMode {
    Server,
    Unauthorized,
}

impl FailMode {
    fn into_error(self) -> ApiError {
        match self {
            FailMode::Server => ApiError::Status {
                status: 500,
                body: "boom".into(),
            },
            FailMode::Unauthorized => ApiError::Unauthorized,
        }
    }
}

#[derive(Default)]
pub(crate) struct FakeLibrary {
    entries: Mutex<BTreeMap<Key, LibraryEntry>>,
    overrides: Mutex<HashMap<Key, u32>>,
    pushes: Mutex<Vec<ProgressUpdate>>,
    fail_push: Mutex<Option<FailMode>>,
    fail_fetch: AtomicBool,
    held_fetch: Mutex<Option<Arc<Notify>>>,
    fetch_held: AtomicBool,
    audio_unavailable: AtomicBool,
    gate: Option<Semaphore>,
    active: Mutex<HashMap<Key, usize>>,
    max_active: Mutex<HashMap<Key, usize>>,
}

impl FakeLibrary {
    /// Pushes block until `release` hands out permits.
    pub(crate) fn gated() -> Self {
        Self {
            gate: Some(Semaphore::new(0)),
            ..Self::default()
        }
    }

    pub(crate) fn release(&self, n: usize) {
        if let Some(gate) = &self.gate {
            gate.add_permits(n);
        }
    }

    pub(crate) fn seed(&self, entry: LibraryEntry) {
        self.entries
            .lock()
            .unwrap()
            .insert((entry.book_id(), entry.kind()), entry);
    }

    /// Whatever is pushed for this key, the server ends up storing `progress`.
    pub(crate) fn set_override(&self, book_id: BookId, kind: Kind, progress: u32) {
        self.overrides
            .lock()
            .unwrap()
            .insert((book_id, kind), progress);
    }

    pub(crate) fn fail_next_push(&self, mode: FailMode) {
        *self.fail_push.lock().unwrap() = Some(mode);
    }

    pub(crate) fn fail_next_fetch(&self) {
        self.fail_fetch.store(true, Ordering::SeqCst);
    }

    /// The next library fetch reads the entries, then waits for the returned
    /// handle to be notified before answering.
    pub(crate) fn hold_next_fetch(&self) -> Arc<Notify> {
        let notify = Arc::new(Notify::new());
        *self.held_fetch.lock().unwrap() = Some(notify.clone());
        notify
    }

    pub(crate) fn fetch_is_held(&self) -> bool {
        self.fetch_held.load(Ordering::SeqCst)
    }

    pub(crate) fn make_audio_progress_unavailable(&self) {
        self.audio_unavailable.store(true, Ordering::SeqCst);
    }

    pub(crate) fn pushes(&self) -> Vec<ProgressUpdate> {
        self.pushes.lock().unwrap().clone()
    }

    pub(crate) fn max_concurrent_pushes_for(&self, book_id: BookId, kind: Kind) -> usize {
        self.max_active
            .lock()
            .unwrap()
            .get(&(book_id, kind))
            .copied()
            .unwrap_or(0)
    }

    fn enter(&self, key: Key) {
        let mut active = self.active.lock().unwrap();
        let n = active.entry(key).or_default();
        *n += 1;
        let mut max = self.max_active.lock().unwrap();
        let m = max.entry(key).or_default();
        *m = (*m).max(*n);
    }

    fn leave(&self, key: Key) {
        if let Some(n) = self.active.lock().unwrap().get_mut(&key) {
            *n -= 1;
        }
    }
}

#[async_trait]
impl LibraryService for FakeLibrary {
    async fn fetch_library(&self) -> ApiResult<Vec<LibraryEntry>> {
        if self.fail_fetch.swap(false, Ordering::SeqCst) {
            return Err(ApiError::Status {
                status: 503,
                body: "unavailable".into(),
            });
        }
        let entries: Vec<LibraryEntry> = self.entries.lock().unwrap().values().cloned().collect();
        let held = self.held_fetch.lock().unwrap().take();
        if let Some(notify) = held {
            self.fetch_held.store(true, Ordering::SeqCst);
            notify.notified().await;
            self.fetch_held.store(false, Ordering::SeqCst);
        }
        Ok(entries)
    }

    async fn push_progress(&self, update: ProgressUpdate) -> ApiResult<()> {
        let key = (update.book_id, update.kind);
        self.pushes.lock().unwrap().push(update);
        self.enter(key);
        if let Some(gate) = &self.gate {
            if let Ok(permit) = gate.acquire().await {
                permit.forget();
            }
        }
        self.leave(key);

        if let Some(mode) = self.fail_push.lock().unwrap().take() {
            return Err(mode.into_error());
        }
        let stored = self
            .overrides
            .lock()
            .unwrap()
            .get(&key)
            .copied()
            .unwrap_or(update.progress);
        let mut entries = self.entries.lock().unwrap();
        let book = entries.get(&key).and_then(|e| e.book.clone());
        let mut entry = LibraryEntry::new(update.book_id, update.kind, stored, update.total);
        entry.book = book;
        entries.insert(key, entry);
        Ok(())
    }

    async fn add_entry(&self, book_id: BookId, kind: Kind) -> ApiResult<()> {
        self.entries
            .lock()
            .unwrap()
            .entry((book_id, kind))
            .or_insert_with(|| LibraryEntry::new(book_id, kind, 0, None));
        Ok(())
    }

    async fn remove_entry(&self, book_id: BookId, kind: Option<Kind>) -> ApiResult<()> {
        self.entries
            .lock()
            .unwrap()
            .retain(|(b, k), _| !(*b == book_id && kind.is_none_or(|want| want == *k)));
        Ok(())
    }

    async fn fetch_audio_progress(&self, book_id: BookId) -> ApiResult<Option<LibraryEntry>> {
        if self.audio_unavailable.load(Ordering::SeqCst) {
            return Err(ApiError::Status {
                status: 502,
                body: "bad gateway".into(),
            });
        }
        Ok(self
            .entries
            .lock()
            .unwrap()
            .get(&(book_id, Kind::Audio))
            .cloned())
    }
}
