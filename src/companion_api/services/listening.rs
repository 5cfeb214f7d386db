use poem_openapi::payload::Json;
use uuid::Uuid;

use crate::{
    companion_api::{
        models::{KindDto, ReconcileResponse, SessionDto, SessionResponse, TimeUpdateRequestDto},
        registry::SessionRegistry,
        services::{settle, unknown_session},
    },
    domain::models::BookId,
    progress::{ListeningSession, ProgressTracker},
};

pub struct ListeningService<'a> {
    pub tracker: &'a ProgressTracker,
    pub registry: &'a SessionRegistry,
}

pub(crate) fn listening_dto(session: &ListeningSession) -> SessionDto {
    SessionDto {
        session_id: session.id(),
        book_id: session.book_id(),
        kind: KindDto::Audio,
        state: session.state().into(),
        progress: session.position().floor() as u32,
        total: session.duration().map(|d| d.round() as u32),
        percent_complete: session.percent_complete(),
    }
}

impl<'a> ListeningService<'a> {
    pub fn new(tracker: &'a ProgressTracker, registry: &'a SessionRegistry) -> Self {
        Self { tracker, registry }
    }

    #[tracing::instrument(level = "debug", skip(self))]
    pub async fn open(&self, book_id: BookId) -> SessionResponse {
        match self.tracker.open_listening(book_id).await {
            Ok(session) => {
                let dto = listening_dto(&session);
                self.registry.insert_listening(session);
                SessionResponse::Ok(Json(dto))
            }
            // only an auth failure stops a player from opening
            Err(e) => SessionResponse::Unauthorized(Json(e.to_string().into())),
        }
    }

    pub fn play(&self, id: Uuid) -> SessionResponse {
        self.update(id, |s| s.play())
    }

    pub fn time_update(&self, id: Uuid, body: TimeUpdateRequestDto) -> SessionResponse {
        self.update(id, |s| s.time_update(body.current_time, body.duration))
    }

    #[tracing::instrument(level = "debug", skip(self))]
    pub async fn pause(&self, id: Uuid) -> ReconcileResponse {
        match self.registry.with_listening(id, |s| s.pause()) {
            Some(handle) => settle(handle).await,
            None => ReconcileResponse::NotFound(unknown_session()),
        }
    }

    #[tracing::instrument(level = "debug", skip(self))]
    pub async fn seek(&self, id: Uuid, position: f64) -> ReconcileResponse {
        match self.registry.with_listening(id, |s| s.seek(position)) {
            Some(handle) => settle(Some(handle)).await,
            None => ReconcileResponse::NotFound(unknown_session()),
        }
    }

    #[tracing::instrument(level = "debug", skip(self))]
    pub async fn close(&self, id: Uuid) -> ReconcileResponse {
        match self.registry.take_listening(id) {
            Some(session) => settle(session.close()).await,
            None => ReconcileResponse::NotFound(unknown_session()),
        }
    }

    fn update(&self, id: Uuid, f: impl FnOnce(&mut ListeningSession)) -> SessionResponse {
        let dto = self.registry.with_listening(id, |s| {
            f(s);
            listening_dto(s)
        });
        match dto {
            Some(dto) => SessionResponse::Ok(Json(dto)),
            None => SessionResponse::NotFound(unknown_session()),
        }
    }
}
