use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use tokio::time::Instant;
use uuid::Uuid;

use crate::progress::{ListeningSession, ReadingSession, Reconciliation};

struct Tracked<S> {
    session: S,
    touched: Instant,
}

impl<S> Tracked<S> {
    fn new(session: S) -> Self {
        Self {
            session,
            touched: Instant::now(),
        }
    }
}

/// Asset sessions opened by views, addressed by id between requests.
///
/// Sessions removed from here are closed by their owner. Views that go away
/// without closing are swept by `close_idle`.
#[derive(Default)]
pub struct SessionRegistry {
    reading: Mutex<HashMap<Uuid, Tracked<ReadingSession>>>,
    listening: Mutex<HashMap<Uuid, Tracked<ListeningSession>>>,
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|e| e.into_inner())
}

fn take_idle<S>(map: &Mutex<HashMap<Uuid, Tracked<S>>>, max_idle: Duration) -> Vec<S> {
    let mut map = lock(map);
    let idle: Vec<Uuid> = map
        .iter()
        .filter(|(_, t)| t.touched.elapsed() >= max_idle)
        .map(|(id, _)| *id)
        .collect();
    idle.into_iter()
        .filter_map(|id| map.remove(&id))
        .map(|t| t.session)
        .collect()
}

impl SessionRegistry {
    pub fn insert_reading(&self, session: ReadingSession) -> Uuid {
        let id = session.id();
        lock(&self.reading).insert(id, Tracked::new(session));
        id
    }

    pub fn insert_listening(&self, session: ListeningSession) -> Uuid {
        let id = session.id();
        lock(&self.listening).insert(id, Tracked::new(session));
        id
    }

    pub fn take_reading(&self, id: Uuid) -> Option<ReadingSession> {
        lock(&self.reading).remove(&id).map(|t| t.session)
    }

    pub fn take_listening(&self, id: Uuid) -> Option<ListeningSession> {
        lock(&self.listening).remove(&id).map(|t| t.session)
    }

    /// Run `f` against a registered reading session. Counts as activity.
    pub fn with_reading<R>(&self, id: Uuid, f: impl FnOnce(&mut ReadingSession) -> R) -> Option<R> {
        lock(&self.reading).get_mut(&id).map(|t| {
            t.touched = Instant::now();
            f(&mut t.session)
        })
    }

    pub fn with_listening<R>(
        &self,
        id: Uuid,
        f: impl FnOnce(&mut ListeningSession) -> R,
    ) -> Option<R> {
        lock(&self.listening).get_mut(&id).map(|t| {
            t.touched = Instant::now();
            f(&mut t.session)
        })
    }

    pub fn open_count(&self) -> usize {
        lock(&self.reading).len() + lock(&self.listening).len()
    }

    /// Close every session nobody has touched for `max_idle`, returning the
    /// writes that closing produced.
    pub fn close_idle(&self, max_idle: Duration) -> Vec<Reconciliation> {
        // sessions are closed outside the locks
        let reading = take_idle(&self.reading, max_idle);
        let listening = take_idle(&self.listening, max_idle);
        if reading.is_empty() && listening.is_empty() {
            return Vec::new();
        }
        tracing::info!(
            reading = reading.len(),
            listening = listening.len(),
            "closing idle sessions"
        );
        reading
            .into_iter()
            .filter_map(ReadingSession::close)
            .chain(listening.into_iter().filter_map(ListeningSession::close))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::{
        domain::models::Kind,
        progress::{ProgressTracker, ReadingPolicy, testing::FakeLibrary},
    };

    const MINUTE: Duration = Duration::from_secs(60);

    #[tokio::test(start_paused = true)]
    async fn abandoned_reading_session_is_closed_after_idle_timeout() {
        let fake = Arc::new(FakeLibrary::default());
        let tracker = ProgressTracker::new(fake.clone(), ReadingPolicy::default());
        let registry = SessionRegistry::default();

        let abandoned = registry.insert_reading(tracker.open_reading(1, Some(200)));
        tokio::time::advance(20 * MINUTE).await;
        let recent = registry.insert_reading(tracker.open_reading(2, Some(200)));
        tokio::time::advance(15 * MINUTE).await;

        let closed = registry.close_idle(30 * MINUTE);
        assert_eq!(closed.len(), 1);
        for reconciliation in closed {
            reconciliation.outcome().await.unwrap();
        }

        let pushes = fake.pushes();
        assert_eq!(pushes.len(), 1);
        assert_eq!(pushes[0].book_id, 1);
        assert_eq!(pushes[0].kind, Kind::Pdf);
        assert_eq!(pushes[0].progress, 70);

        assert!(registry.take_reading(abandoned).is_none());
        assert!(registry.with_reading(recent, |s| s.book_id()).is_some());
        assert_eq!(registry.open_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn activity_keeps_a_session_registered() {
        let fake = Arc::new(FakeLibrary::default());
        let tracker = ProgressTracker::new(fake.clone(), ReadingPolicy::default());
        let registry = SessionRegistry::default();

        let id = registry.insert_reading(tracker.open_reading(3, Some(200)));
        tokio::time::advance(25 * MINUTE).await;
        registry.with_reading(id, |s| s.estimated_progress());
        tokio::time::advance(25 * MINUTE).await;

        assert!(registry.close_idle(30 * MINUTE).is_empty());
        assert_eq!(registry.open_count(), 1);
        assert!(fake.pushes().is_empty());
    }
}
