use crate::{
    companion_api::{
        models::{KindDto, ReconcileResponse, ScrubRequestDto},
        services::settle,
    },
    domain::models::BookId,
    progress::ProgressTracker,
};

pub struct ProgressService<'a> {
    pub tracker: &'a ProgressTracker,
}

impl<'a> ProgressService<'a> {
    pub fn new(tracker: &'a ProgressTracker) -> Self {
        Self { tracker }
    }

    /// Set an absolute value chosen by the user, outside any open session.
    #[tracing::instrument(level = "debug", skip(self, body), fields(progress = body.progress))]
    pub async fn scrub(&self, book_id: BookId, kind: KindDto, body: ScrubRequestDto) -> ReconcileResponse {
        let total = body.total.or_else(|| {
            self.tracker
                .snapshot()
                .entry(book_id, kind.into())
                .and_then(|e| e.total())
        });
        settle(Some(self.tracker.scrub(book_id, kind.into(), body.progress, total))).await
    }
}
