//! Reading and listening progress reconciliation.
//!
//! Every write goes through [`ProgressTracker::submit`]: at most one request per
//! (book, kind) is in flight, later values arriving meanwhile are coalesced into
//! a single follow-up carrying the latest value, and every successful write is
//! followed by a re-fetch of the library so the published snapshot always holds
//! what the server confirmed. Writes run on detached tasks; a caller that stops
//! waiting does not cancel them.

pub mod service;
pub mod session;

#[cfg(test)]
pub(crate) mod testing;

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::{oneshot, watch};

use crate::{
    domain::models::{BookId, Kind, LibraryEntry, LibrarySnapshot},
    error::SyncError,
};

pub use service::{LibraryService, ProgressUpdate};
pub use session::{ListeningSession, ReadingSession, SessionState};

/// Converts time spent with a PDF open into pages read.
///
/// This is a fixed-rate approximation; it knows nothing about the pages actually viewed.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ReadingPolicy {
    pub minutes_per_page: f64,
}

impl Default for ReadingPolicy {
    fn default() -> Self {
        Self {
            minutes_per_page: 0.5,
        }
    }
}

impl ReadingPolicy {
    pub fn new(minutes_per_page: f64) -> Self {
        Self { minutes_per_page }
    }

    /// `round(elapsed_minutes / minutes_per_page)`
    pub fn pages_for(&self, elapsed: Duration) -> u32 {
        if !(self.minutes_per_page > 0.0) {
            return 0;
        }
        let minutes = elapsed.as_secs_f64() / 60.0;
        let pages = (minutes / self.minutes_per_page).round();
        if pages.is_finite() && pages > 0.0 {
            pages.min(f64::from(u32::MAX)) as u32
        } else {
            0
        }
    }
}

/// Result of one write-then-read-back.
#[derive(Debug, Clone, PartialEq)]
pub struct Reconciled {
    /// The value that was sent
    pub sent: ProgressUpdate,
    /// The entry as the server reports it afterwards
    pub entry: Option<LibraryEntry>,
}

pub type ReconcileResult = Result<Reconciled, SyncError>;

/// Handle on a submitted progress write. Dropping it does not cancel the write.
#[derive(Debug)]
pub struct Reconciliation {
    rx: oneshot::Receiver<ReconcileResult>,
    coalesced: bool,
}

impl Reconciliation {
    /// True when this value was folded into a follow-up behind a write already in flight.
    pub fn was_coalesced(&self) -> bool {
        self.coalesced
    }

    pub async fn outcome(self) -> ReconcileResult {
        self.rx.await.unwrap_or(Err(SyncError::Interrupted))
    }
}

type EntryKey = (BookId, Kind);

struct PendingWrite {
    update: ProgressUpdate,
    waiters: Vec<oneshot::Sender<ReconcileResult>>,
}

#[derive(Default)]
struct Slot {
    in_flight: bool,
    pending: Option<PendingWrite>,
}

struct Inner {
    service: Arc<dyn LibraryService>,
    policy: ReadingPolicy,
    snapshot: watch::Sender<LibrarySnapshot>,
    slots: Mutex<HashMap<EntryKey, Slot>>,
    /// Ticket taken before each library fetch
    fetch_seq: AtomicU64,
    /// Ticket of the fetch currently published
    published_seq: AtomicU64,
}

#[derive(Clone)]
pub struct ProgressTracker {
    inner: Arc<Inner>,
}

impl ProgressTracker {
    pub fn new(service: Arc<dyn LibraryService>, policy: ReadingPolicy) -> Self {
        let (snapshot, _) = watch::channel(LibrarySnapshot::default());
        Self {
            inner: Arc::new(Inner {
                service,
                policy,
                snapshot,
                slots: Mutex::new(HashMap::new()),
                fetch_seq: AtomicU64::new(0),
                published_seq: AtomicU64::new(0),
            }),
        }
    }

    pub fn policy(&self) -> ReadingPolicy {
        self.inner.policy
    }

    /// Views re-render on every change of the returned receiver.
    pub fn subscribe(&self) -> watch::Receiver<LibrarySnapshot> {
        self.inner.snapshot.subscribe()
    }

    pub fn snapshot(&self) -> LibrarySnapshot {
        self.inner.snapshot.borrow().clone()
    }

    pub fn is_reconciling(&self, book_id: BookId, kind: Kind) -> bool {
        self.inner
            .lock_slots()
            .get(&(book_id, kind))
            .is_some_and(|s| s.in_flight)
    }

    /// Drop the cached library, e.g. after sign-out.
    pub fn clear(&self) {
        let inner = &self.inner;
        inner.snapshot.send_modify(|current| {
            // fetches already under way belong to the previous user
            let seq = inner.fetch_seq.load(Ordering::SeqCst);
            inner.published_seq.fetch_max(seq, Ordering::SeqCst);
            *current = LibrarySnapshot::default();
        });
    }

    #[tracing::instrument(level = "debug", skip(self))]
    pub async fn refresh(&self) -> Result<LibrarySnapshot, SyncError> {
        self.inner.read_back().await
    }

    #[tracing::instrument(level = "debug", skip(self))]
    pub async fn add_to_library(
        &self,
        book_id: BookId,
        kind: Kind,
    ) -> Result<LibrarySnapshot, SyncError> {
        self.inner
            .service
            .add_entry(book_id, kind)
            .await
            .map_err(SyncError::on_write)?;
        self.inner.read_back().await
    }

    /// Removing one kind leaves the other kind's entry for the same book alone;
    /// `None` removes both.
    #[tracing::instrument(level = "debug", skip(self))]
    pub async fn remove_from_library(
        &self,
        book_id: BookId,
        kind: Option<Kind>,
    ) -> Result<LibrarySnapshot, SyncError> {
        self.inner
            .service
            .remove_entry(book_id, kind)
            .await
            .map_err(SyncError::on_write)?;
        self.inner.read_back().await
    }

    /// Manual scrub: send a user-chosen absolute value right away.
    pub fn scrub(
        &self,
        book_id: BookId,
        kind: Kind,
        progress: u32,
        total: Option<u32>,
    ) -> Reconciliation {
        self.submit(ProgressUpdate::new(book_id, kind, progress, total))
    }

    /// Queue a progress write. Must be called within a tokio runtime.
    pub fn submit(&self, update: ProgressUpdate) -> Reconciliation {
        let key = (update.book_id, update.kind);
        let (tx, rx) = oneshot::channel();
        let start = {
            let mut slots = self.inner.lock_slots();
            let slot = slots.entry(key).or_default();
            if slot.in_flight {
                let mut waiters = slot.pending.take().map(|p| p.waiters).unwrap_or_default();
                waiters.push(tx);
                slot.pending = Some(PendingWrite { update, waiters });
                None
            } else {
                slot.in_flight = true;
                Some(tx)
            }
        };

        let coalesced = match start {
            Some(tx) => {
                tracing::debug!(book_id = update.book_id, kind = %update.kind, progress = update.progress, "starting reconciliation");
                tokio::spawn(self.inner.clone().drive(key, update, vec![tx]));
                false
            }
            None => {
                tracing::debug!(book_id = update.book_id, kind = %update.kind, progress = update.progress, "coalesced behind in-flight reconciliation");
                true
            }
        };
        Reconciliation { rx, coalesced }
    }

    pub fn open_reading(&self, book_id: BookId, total_pages: Option<u32>) -> ReadingSession {
        let snapshot = self.inner.snapshot.borrow();
        let entry = snapshot.entry(book_id, Kind::Pdf);
        let base = entry.map(|e| e.progress()).unwrap_or(0);
        let total = total_pages.filter(|t| *t > 0).or_else(|| {
            entry.and_then(|e| {
                e.total()
                    .or_else(|| e.book.as_ref().and_then(|b| b.total_pages))
            })
        });
        drop(snapshot);
        ReadingSession::start(self.clone(), book_id, total, base)
    }

    /// Resume from the server's audio position, falling back to the cached snapshot.
    #[tracing::instrument(level = "debug", skip(self))]
    pub async fn open_listening(&self, book_id: BookId) -> Result<ListeningSession, SyncError> {
        let resume = match self.inner.service.fetch_audio_progress(book_id).await {
            Ok(Some(entry)) => Some(entry),
            Ok(None) => None,
            Err(e) if e.is_unauthorized() => return Err(SyncError::Unauthorized),
            Err(e) => {
                tracing::warn!(error = %e, book_id, "audio progress unavailable, using cached library");
                None
            }
        }
        .or_else(|| self.inner.snapshot.borrow().entry(book_id, Kind::Audio).cloned());

        let (position, duration) = resume
            .map(|e| (e.progress(), e.total()))
            .unwrap_or((0, None));
        Ok(ListeningSession::start(
            self.clone(),
            book_id,
            f64::from(position),
            duration.map(f64::from),
        ))
    }
}

impl Inner {
    fn lock_slots(&self) -> std::sync::MutexGuard<'_, HashMap<EntryKey, Slot>> {
        self.slots.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Fetch and publish. A fetch that started before the one already
    /// published is dropped, and the newer snapshot is returned instead.
    async fn read_back(&self) -> Result<LibrarySnapshot, SyncError> {
        let seq = self.fetch_seq.fetch_add(1, Ordering::SeqCst) + 1;
        let entries = self
            .service
            .fetch_library()
            .await
            .map_err(SyncError::on_refresh)?;
        let snapshot = LibrarySnapshot::new(entries);
        let published = self.snapshot.send_if_modified(|current| {
            // runs under the channel's write lock, so check and store are serialized
            if seq <= self.published_seq.load(Ordering::SeqCst) {
                return false;
            }
            self.published_seq.store(seq, Ordering::SeqCst);
            *current = snapshot.clone();
            true
        });
        if published {
            tracing::debug!(seq, entries = snapshot.entries.len(), "library snapshot refreshed");
            Ok(snapshot)
        } else {
            tracing::debug!(seq, "stale library fetch discarded");
            Ok(self.snapshot.borrow().clone())
        }
    }

    /// Write, then re-fetch. The snapshot is only replaced by server data.
    async fn write_then_read_back(&self, update: ProgressUpdate) -> ReconcileResult {
        if let Err(e) = self.service.push_progress(update).await {
            tracing::warn!(error = %e, book_id = update.book_id, kind = %update.kind, "progress update failed");
            return Err(SyncError::on_write(e));
        }
        let snapshot = self.read_back().await.inspect_err(|e| {
            tracing::warn!(error = %e, book_id = update.book_id, "library refresh after update failed");
        })?;
        Ok(Reconciled {
            sent: update,
            entry: snapshot.entry(update.book_id, update.kind).cloned(),
        })
    }

    async fn drive(
        self: Arc<Self>,
        key: EntryKey,
        mut update: ProgressUpdate,
        mut waiters: Vec<oneshot::Sender<ReconcileResult>>,
    ) {
        loop {
            let result = self.write_then_read_back(update).await;

            // settle the slot before anyone is woken
            let next = {
                let mut slots = self.lock_slots();
                match slots.get_mut(&key).and_then(|slot| slot.pending.take()) {
                    Some(next) => Some(next),
                    None => {
                        slots.remove(&key);
                        None
                    }
                }
            };

            for w in waiters.drain(..) {
                // receiver gone means the view stopped caring
                let _ = w.send(result.clone());
            }

            let Some(next) = next else {
                break;
            };
            tracing::debug!(book_id = key.0, kind = %key.1, progress = next.update.progress, "sending coalesced follow-up");
            update = next.update;
            waiters = next.waiters;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::testing::{FailMode, FakeLibrary};
    use super::*;

    fn tracker(fake: &Arc<FakeLibrary>) -> ProgressTracker {
        ProgressTracker::new(fake.clone(), ReadingPolicy::default())
    }

    #[test]
    fn pages_from_elapsed_time() {
        let policy = ReadingPolicy::default();
        assert_eq!(policy.pages_for(Duration::from_secs(5 * 60)), 10);
        assert_eq!(policy.pages_for(Duration::from_secs(3 * 60)), 6);
        assert_eq!(policy.pages_for(Duration::from_secs(14)), 0);
        assert_eq!(policy.pages_for(Duration::from_secs(15)), 1);
        assert_eq!(ReadingPolicy::new(0.0).pages_for(Duration::from_secs(600)), 0);
        assert_eq!(ReadingPolicy::new(-1.0).pages_for(Duration::from_secs(600)), 0);
    }

    #[tokio::test]
    async fn successful_write_publishes_server_value() {
        let fake = Arc::new(FakeLibrary::default());
        // another device moved the book further along
        fake.set_override(1, Kind::Pdf, 42);
        let tracker = tracker(&fake);
        let mut rx = tracker.subscribe();

        let outcome = tracker
            .submit(ProgressUpdate::new(1, Kind::Pdf, 6, Some(100)))
            .outcome()
            .await
            .unwrap();
        assert_eq!(outcome.sent.progress, 6);
        assert_eq!(outcome.entry.as_ref().map(|e| e.progress()), Some(42));

        assert!(rx.has_changed().unwrap());
        let snapshot = rx.borrow_and_update().clone();
        assert_eq!(snapshot.entry(1, Kind::Pdf).map(|e| e.progress()), Some(42));
        assert!(!tracker.is_reconciling(1, Kind::Pdf));
    }

    #[tokio::test]
    async fn failed_write_keeps_displayed_progress() {
        let fake = Arc::new(FakeLibrary::default());
        fake.seed(LibraryEntry::new(1, Kind::Pdf, 20, Some(100)));
        let tracker = tracker(&fake);
        tracker.refresh().await.unwrap();

        fake.fail_next_push(FailMode::Server);
        let err = tracker
            .submit(ProgressUpdate::new(1, Kind::Pdf, 30, Some(100)))
            .outcome()
            .await
            .unwrap_err();
        assert!(matches!(err, SyncError::NotSaved(_)));
        assert_eq!(
            tracker.snapshot().entry(1, Kind::Pdf).map(|e| e.progress()),
            Some(20)
        );
        // no retry
        assert_eq!(fake.pushes().len(), 1);
    }

    #[tokio::test]
    async fn unauthorized_is_signalled_upward() {
        let fake = Arc::new(FakeLibrary::default());
        fake.fail_next_push(FailMode::Unauthorized);
        let tracker = tracker(&fake);
        let err = tracker
            .scrub(1, Kind::Audio, 30, Some(300))
            .outcome()
            .await
            .unwrap_err();
        assert_eq!(err, SyncError::Unauthorized);
    }

    #[tokio::test]
    async fn writes_while_in_flight_are_coalesced() {
        let fake = Arc::new(FakeLibrary::gated());
        let tracker = tracker(&fake);

        let first = tracker.submit(ProgressUpdate::new(1, Kind::Pdf, 10, Some(100)));
        let second = tracker.submit(ProgressUpdate::new(1, Kind::Pdf, 12, Some(100)));
        let third = tracker.scrub(1, Kind::Pdf, 15, Some(100));
        // other keys are independent
        let audio = tracker.submit(ProgressUpdate::new(1, Kind::Audio, 60, Some(300)));

        assert!(!first.was_coalesced());
        assert!(second.was_coalesced());
        assert!(third.was_coalesced());
        assert!(!audio.was_coalesced());
        assert!(tracker.is_reconciling(1, Kind::Pdf));

        fake.release(3);
        let first = first.outcome().await.unwrap();
        let second = second.outcome().await.unwrap();
        let third = third.outcome().await.unwrap();
        audio.outcome().await.unwrap();

        assert_eq!(first.sent.progress, 10);
        assert_eq!(second.sent.progress, 15);
        assert_eq!(third.sent.progress, 15);

        let pdf_pushes: Vec<u32> = fake
            .pushes()
            .iter()
            .filter(|u| u.kind == Kind::Pdf)
            .map(|u| u.progress)
            .collect();
        assert_eq!(pdf_pushes, vec![10, 15]);
        assert_eq!(fake.max_concurrent_pushes_for(1, Kind::Pdf), 1);
        assert_eq!(
            tracker.snapshot().entry(1, Kind::Pdf).map(|e| e.progress()),
            Some(15)
        );
        assert!(!tracker.is_reconciling(1, Kind::Pdf));
    }

    #[tokio::test]
    async fn late_fetch_does_not_overwrite_newer_snapshot() {
        let fake = Arc::new(FakeLibrary::default());
        let tracker = tracker(&fake);
        let release_pdf_fetch = fake.hold_next_fetch();

        let pdf = tracker.submit(ProgressUpdate::new(1, Kind::Pdf, 10, Some(100)));
        while !fake.fetch_is_held() {
            tokio::task::yield_now().await;
        }

        // the audio write starts later but settles first
        let audio = tracker
            .submit(ProgressUpdate::new(1, Kind::Audio, 120, Some(300)))
            .outcome()
            .await
            .unwrap();
        assert_eq!(audio.entry.map(|e| e.progress()), Some(120));

        release_pdf_fetch.notify_one();
        let pdf = pdf.outcome().await.unwrap();
        assert_eq!(pdf.entry.map(|e| e.progress()), Some(10));

        let snapshot = tracker.snapshot();
        assert_eq!(snapshot.entry(1, Kind::Audio).map(|e| e.progress()), Some(120));
        assert_eq!(snapshot.entry(1, Kind::Pdf).map(|e| e.progress()), Some(10));
    }

    #[tokio::test]
    async fn clear_discards_fetch_in_flight() {
        let fake = Arc::new(FakeLibrary::default());
        fake.seed(LibraryEntry::new(4, Kind::Pdf, 8, Some(100)));
        let tracker = tracker(&fake);
        let release = fake.hold_next_fetch();

        let pending = tokio::spawn({
            let tracker = tracker.clone();
            async move { tracker.refresh().await }
        });
        while !fake.fetch_is_held() {
            tokio::task::yield_now().await;
        }
        tracker.clear();
        release.notify_one();
        pending.await.unwrap().unwrap();
        assert!(tracker.snapshot().entries.is_empty());
    }

    #[tokio::test]
    async fn removing_pdf_entry_keeps_audio_entry() {
        let fake = Arc::new(FakeLibrary::default());
        fake.seed(LibraryEntry::new(3, Kind::Pdf, 50, Some(100)));
        fake.seed(LibraryEntry::new(3, Kind::Audio, 120, Some(300)));
        let tracker = tracker(&fake);

        let snapshot = tracker.remove_from_library(3, Some(Kind::Pdf)).await.unwrap();
        assert!(snapshot.entry(3, Kind::Pdf).is_none());
        assert_eq!(snapshot.entry(3, Kind::Audio).map(|e| e.progress()), Some(120));

        tracker.add_to_library(3, Kind::Pdf).await.unwrap();
        let snapshot = tracker.remove_from_library(3, Some(Kind::Audio)).await.unwrap();
        assert!(snapshot.entry(3, Kind::Audio).is_none());
        assert_eq!(snapshot.entry(3, Kind::Pdf).map(|e| e.progress()), Some(0));

        let snapshot = tracker.remove_from_library(3, None).await.unwrap();
        assert!(snapshot.entries.is_empty());
    }

    #[tokio::test]
    async fn refresh_failure_after_write_is_reported() {
        let fake = Arc::new(FakeLibrary::default());
        fake.fail_next_fetch();
        let tracker = tracker(&fake);
        let err = tracker
            .submit(ProgressUpdate::new(2, Kind::Pdf, 4, None))
            .outcome()
            .await
            .unwrap_err();
        assert!(matches!(err, SyncError::RefreshFailed(_)));
        // the write itself went through
        assert_eq!(fake.pushes().len(), 1);
        assert!(tracker.snapshot().entries.is_empty());
    }
}
