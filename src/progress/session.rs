// Per-asset sessions: a PDF open in the viewer, or an audio player.

use tokio::time::Instant;
use uuid::Uuid;

use super::{ProgressTracker, ProgressUpdate, Reconciliation};
use crate::domain::models::{BookId, Kind, clamp_progress, percent_complete};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Active,
    Reconciling,
}

fn current_state(tracker: &ProgressTracker, active: bool, book_id: BookId, kind: Kind) -> SessionState {
    if active {
        SessionState::Active
    } else if tracker.is_reconciling(book_id, kind) {
        SessionState::Reconciling
    } else {
        SessionState::Idle
    }
}

/// A PDF being read. Time accrues from open (or the last scrub) until close.
pub struct ReadingSession {
    id: Uuid,
    tracker: ProgressTracker,
    book_id: BookId,
    total_pages: Option<u32>,
    base: u32,
    started: Option<Instant>,
}

impl ReadingSession {
    pub(crate) fn start(
        tracker: ProgressTracker,
        book_id: BookId,
        total_pages: Option<u32>,
        base: u32,
    ) -> Self {
        let id = Uuid::now_v7();
        tracing::debug!(%id, book_id, base, ?total_pages, "reading session opened");
        Self {
            id,
            tracker,
            book_id,
            total_pages,
            base: clamp_progress(base, total_pages),
            started: Some(Instant::now()),
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn book_id(&self) -> BookId {
        self.book_id
    }

    pub fn total_pages(&self) -> Option<u32> {
        self.total_pages
    }

    pub fn state(&self) -> SessionState {
        current_state(&self.tracker, self.started.is_some(), self.book_id, Kind::Pdf)
    }

    /// Local estimate of the current page, for display only.
    pub fn estimated_progress(&self) -> u32 {
        let pages = self
            .started
            .map(|s| self.tracker.policy().pages_for(s.elapsed()))
            .unwrap_or(0);
        clamp_progress(self.base.saturating_add(pages), self.total_pages)
    }

    /// Jump to `page`: sent right away, and the clock restarts from there.
    pub fn scrub(&mut self, page: u32) -> Reconciliation {
        self.base = clamp_progress(page, self.total_pages);
        self.started = Some(Instant::now());
        tracing::debug!(id = %self.id, book_id = self.book_id, page = self.base, "reading session scrubbed");
        self.tracker
            .submit(ProgressUpdate::new(self.book_id, Kind::Pdf, self.base, self.total_pages))
    }

    /// Stop the clock and send the estimate. `None` when no whole page was read.
    pub fn close(mut self) -> Option<Reconciliation> {
        self.finish()
    }

    fn finish(&mut self) -> Option<Reconciliation> {
        let started = self.started.take()?;
        let pages = self.tracker.policy().pages_for(started.elapsed());
        if pages == 0 {
            tracing::debug!(id = %self.id, book_id = self.book_id, "reading session closed without progress");
            return None;
        }
        let progress = self.base.saturating_add(pages);
        tracing::debug!(id = %self.id, book_id = self.book_id, pages, progress, "reading session closed");
        Some(
            self.tracker
                .submit(ProgressUpdate::new(self.book_id, Kind::Pdf, progress, self.total_pages)),
        )
    }
}

impl Drop for ReadingSession {
    fn drop(&mut self) {
        if self.started.is_none() {
            return;
        }
        if tokio::runtime::Handle::try_current().is_ok() {
            // fire and forget
            let _ = self.finish();
        } else {
            tracing::warn!(id = %self.id, book_id = self.book_id, "reading session dropped outside a runtime, progress lost");
        }
    }
}

/// An audio player. Only accrues while playing; pause flushes the position.
pub struct ListeningSession {
    id: Uuid,
    tracker: ProgressTracker,
    book_id: BookId,
    position: f64,
    duration: Option<f64>,
    playing: bool,
}

impl ListeningSession {
    pub(crate) fn start(
        tracker: ProgressTracker,
        book_id: BookId,
        position: f64,
        duration: Option<f64>,
    ) -> Self {
        let id = Uuid::now_v7();
        tracing::debug!(%id, book_id, position, "listening session opened");
        Self {
            id,
            tracker,
            book_id,
            position: sanitize(position).unwrap_or(0.0),
            duration: duration.and_then(sanitize).filter(|d| *d > 0.0),
            playing: false,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn book_id(&self) -> BookId {
        self.book_id
    }

    /// Current position in seconds
    pub fn position(&self) -> f64 {
        self.position
    }

    pub fn duration(&self) -> Option<f64> {
        self.duration
    }

    pub fn is_playing(&self) -> bool {
        self.playing
    }

    pub fn state(&self) -> SessionState {
        current_state(&self.tracker, self.playing, self.book_id, Kind::Audio)
    }

    pub fn percent_complete(&self) -> u8 {
        let update = self.update();
        percent_complete(update.progress, update.total)
    }

    pub fn play(&mut self) {
        self.playing = true;
    }

    /// A playback position event from the player.
    pub fn time_update(&mut self, current_time: f64, duration: Option<f64>) {
        if let Some(t) = sanitize(current_time) {
            self.position = t;
        }
        if let Some(d) = duration.and_then(sanitize).filter(|d| *d > 0.0) {
            self.duration = Some(d);
        }
    }

    /// Flush the current position. `None` if playback was already paused.
    pub fn pause(&mut self) -> Option<Reconciliation> {
        if !self.playing {
            return None;
        }
        self.playing = false;
        tracing::debug!(id = %self.id, book_id = self.book_id, position = self.position, "playback paused");
        Some(self.tracker.submit(self.update()))
    }

    /// User moved the playhead: sent right away whether or not audio is playing.
    pub fn seek(&mut self, position: f64) -> Reconciliation {
        if let Some(p) = sanitize(position) {
            self.position = p;
        }
        self.tracker.submit(self.update())
    }

    pub fn close(mut self) -> Option<Reconciliation> {
        self.pause()
    }

    fn update(&self) -> ProgressUpdate {
        let total = self.duration.map(|d| d.round() as u32);
        ProgressUpdate::new(self.book_id, Kind::Audio, self.position.floor() as u32, total)
    }
}

impl Drop for ListeningSession {
    fn drop(&mut self) {
        if !self.playing {
            return;
        }
        if tokio::runtime::Handle::try_current().is_ok() {
            let _ = self.pause();
        } else {
            tracing::warn!(id = %self.id, book_id = self.book_id, "listening session dropped outside a runtime, position lost");
        }
    }
}

fn sanitize(seconds: f64) -> Option<f64> {
    (seconds.is_finite() && seconds >= 0.0).then_some(seconds)
}
