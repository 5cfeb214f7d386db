use poem_openapi::payload::Json;
use uuid::Uuid;

use crate::{
    companion_api::{
        models::{KindDto, ReconcileResponse, SessionDto, SessionResponse},
        registry::SessionRegistry,
        services::{settle, unknown_session},
    },
    domain::models::{BookId, percent_complete},
    error::SyncError,
    progress::{ProgressTracker, ReadingSession},
};

pub struct ReadingService<'a> {
    pub tracker: &'a ProgressTracker,
    pub registry: &'a SessionRegistry,
}

pub(crate) fn reading_dto(session: &ReadingSession) -> SessionDto {
    let progress = session.estimated_progress();
    SessionDto {
        session_id: session.id(),
        book_id: session.book_id(),
        kind: KindDto::Pdf,
        state: session.state().into(),
        progress,
        total: session.total_pages(),
        percent_complete: percent_complete(progress, session.total_pages()),
    }
}

impl<'a> ReadingService<'a> {
    pub fn new(tracker: &'a ProgressTracker, registry: &'a SessionRegistry) -> Self {
        Self { tracker, registry }
    }

    /// Start the clock for a PDF. The base page comes from the library snapshot,
    /// fetched first if this is the first thing the view does.
    #[tracing::instrument(level = "debug", skip(self))]
    pub async fn open(&self, book_id: BookId, total_pages: Option<u32>) -> SessionResponse {
        if self.tracker.snapshot().fetched_at.is_none() {
            match self.tracker.refresh().await {
                Ok(_) => {}
                Err(SyncError::Unauthorized) => {
                    return SessionResponse::Unauthorized(Json(
                        SyncError::Unauthorized.to_string().into(),
                    ));
                }
                Err(e) => tracing::warn!(error = %e, book_id, "opening reader without a library snapshot"),
            }
        }
        let session = self.tracker.open_reading(book_id, total_pages);
        let dto = reading_dto(&session);
        self.registry.insert_reading(session);
        SessionResponse::Ok(Json(dto))
    }

    pub fn get(&self, id: Uuid) -> SessionResponse {
        match self.registry.with_reading(id, |s| reading_dto(s)) {
            Some(dto) => SessionResponse::Ok(Json(dto)),
            None => SessionResponse::NotFound(unknown_session()),
        }
    }

    #[tracing::instrument(level = "debug", skip(self))]
    pub async fn scrub(&self, id: Uuid, page: u32) -> ReconcileResponse {
        match self.registry.with_reading(id, |s| s.scrub(page)) {
            Some(handle) => settle(Some(handle)).await,
            None => ReconcileResponse::NotFound(unknown_session()),
        }
    }

    #[tracing::instrument(level = "debug", skip(self))]
    pub async fn close(&self, id: Uuid) -> ReconcileResponse {
        match self.registry.take_reading(id) {
            Some(session) => settle(session.close()).await,
            None => ReconcileResponse::NotFound(unknown_session()),
        }
    }
}
