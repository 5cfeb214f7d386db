use std::sync::Arc;

use poem_openapi::{
    OpenApi,
    param::{Path, Query},
    payload::Json,
};
use uuid::Uuid;

use super::models::{
    AddEntryRequestDto, AuthResponse, FilterDto, KindDto, LibraryChangeResponse,
    LibraryResponse, LibraryStatsResponse, LoginRequestDto, LogoutResponse, ReconcileResponse,
    RegisterRequestDto, ScrubRequestDto, SessionResponse, StatusResponse, TimeUpdateRequestDto,
};
use super::registry::SessionRegistry;
use super::services::{
    account::AccountService, health::HealthService, library::LibraryPageService,
    listening::ListeningService, progress::ProgressService, reading::ReadingService,
};
use crate::{error::ApiError, progress::ProgressTracker, session::SessionManager};

pub struct CompanionApi {
    pub sessions: Arc<SessionManager>,
    pub tracker: ProgressTracker,
    pub registry: Arc<SessionRegistry>,
}

impl CompanionApi {
    /// Refresh an expired access token before a route that talks to the server.
    /// Failures are left for the route itself to report.
    async fn keep_fresh(&self) {
        match self.sessions.ensure_fresh().await {
            Ok(()) => {}
            Err(ApiError::Unauthorized) => {
                if !self.sessions.context().is_signed_in() {
                    self.tracker.clear();
                }
            }
            Err(e) => tracing::warn!(error = %e, "access token refresh failed"),
        }
    }
}

#[OpenApi]
impl CompanionApi {
    /// Signed-in user and cached library size
    #[oai(path = "/status", method = "get")]
    #[tracing::instrument(level = "debug", skip(self))]
    async fn status(&self) -> StatusResponse {
        HealthService::new(&self.sessions, &self.tracker).status()
    }

    // ===== Account =====

    #[oai(path = "/v1/auth/login", method = "post")]
    #[tracing::instrument(level = "debug", skip(self, body))]
    async fn login(&self, body: Json<LoginRequestDto>) -> AuthResponse {
        AccountService::new(&self.sessions, &self.tracker)
            .login(body.0)
            .await
    }

    #[oai(path = "/v1/auth/register", method = "post")]
    #[tracing::instrument(level = "debug", skip(self, body))]
    async fn register(&self, body: Json<RegisterRequestDto>) -> AuthResponse {
        AccountService::new(&self.sessions, &self.tracker)
            .register(body.0)
            .await
    }

    #[oai(path = "/v1/auth/logout", method = "post")]
    #[tracing::instrument(level = "debug", skip(self))]
    async fn logout(&self) -> LogoutResponse {
        AccountService::new(&self.sessions, &self.tracker)
            .logout()
            .await
    }

    /// Exchange the stored refresh token for a new access token
    #[oai(path = "/v1/auth/refresh", method = "post")]
    #[tracing::instrument(level = "debug", skip(self))]
    async fn refresh(&self) -> AuthResponse {
        AccountService::new(&self.sessions, &self.tracker)
            .refresh()
            .await
    }

    // ===== Library =====

    #[oai(path = "/v1/library", method = "get")]
    #[tracing::instrument(level = "debug", skip(self))]
    async fn library(
        &self,
        /// Re-fetch from the server before answering
        Query(refresh): Query<Option<bool>>,
        /// all, reading or completed
        Query(filter): Query<Option<FilterDto>>,
    ) -> LibraryResponse {
        self.keep_fresh().await;
        LibraryPageService::new(&self.tracker)
            .list(refresh.unwrap_or(false), filter)
            .await
    }

    #[oai(path = "/v1/library/stats", method = "get")]
    #[tracing::instrument(level = "debug", skip(self))]
    async fn library_stats(&self) -> LibraryStatsResponse {
        LibraryPageService::new(&self.tracker).stats()
    }

    #[oai(path = "/v1/library", method = "post")]
    #[tracing::instrument(level = "debug", skip(self, body))]
    async fn add_entry(&self, body: Json<AddEntryRequestDto>) -> LibraryChangeResponse {
        self.keep_fresh().await;
        LibraryPageService::new(&self.tracker).add(body.0).await
    }

    /// Remove one kind, or both when `kind` is omitted
    #[oai(path = "/v1/library/:book_id", method = "delete")]
    #[tracing::instrument(level = "debug", skip(self, book_id), fields(book_id = book_id.0))]
    async fn remove_entry(
        &self,
        book_id: Path<i64>,
        Query(kind): Query<Option<KindDto>>,
    ) -> LibraryChangeResponse {
        self.keep_fresh().await;
        LibraryPageService::new(&self.tracker)
            .remove(book_id.0, kind)
            .await
    }

    /// Manual scrub to an absolute value
    #[oai(path = "/v1/progress/:book_id/:kind", method = "post")]
    #[tracing::instrument(level = "debug", skip(self, body, book_id, kind), fields(book_id = book_id.0, kind = ?kind.0))]
    async fn scrub(
        &self,
        book_id: Path<i64>,
        kind: Path<KindDto>,
        body: Json<ScrubRequestDto>,
    ) -> ReconcileResponse {
        self.keep_fresh().await;
        ProgressService::new(&self.tracker)
            .scrub(book_id.0, kind.0, body.0)
            .await
    }

    // ===== PDF reader =====

    #[oai(path = "/v1/reading/:book_id/open", method = "post")]
    #[tracing::instrument(level = "debug", skip(self, book_id), fields(book_id = book_id.0))]
    async fn open_reading(
        &self,
        book_id: Path<i64>,
        /// Page count when the viewer knows it better than the library
        Query(total_pages): Query<Option<u32>>,
    ) -> SessionResponse {
        self.keep_fresh().await;
        ReadingService::new(&self.tracker, &self.registry)
            .open(book_id.0, total_pages)
            .await
    }

    #[oai(path = "/v1/reading/sessions/:id", method = "get")]
    #[tracing::instrument(level = "debug", skip(self, id), fields(id = %id.0))]
    async fn reading_session(&self, id: Path<Uuid>) -> SessionResponse {
        ReadingService::new(&self.tracker, &self.registry).get(id.0)
    }

    #[oai(path = "/v1/reading/sessions/:id/scrub", method = "post")]
    #[tracing::instrument(level = "debug", skip(self, body, id), fields(id = %id.0))]
    async fn scrub_reading(&self, id: Path<Uuid>, body: Json<ScrubRequestDto>) -> ReconcileResponse {
        self.keep_fresh().await;
        ReadingService::new(&self.tracker, &self.registry)
            .scrub(id.0, body.0.progress)
            .await
    }

    #[oai(path = "/v1/reading/sessions/:id/close", method = "post")]
    #[tracing::instrument(level = "debug", skip(self, id), fields(id = %id.0))]
    async fn close_reading(&self, id: Path<Uuid>) -> ReconcileResponse {
        self.keep_fresh().await;
        ReadingService::new(&self.tracker, &self.registry)
            .close(id.0)
            .await
    }

    // ===== Audio player =====

    #[oai(path = "/v1/listening/:book_id/open", method = "post")]
    #[tracing::instrument(level = "debug", skip(self, book_id), fields(book_id = book_id.0))]
    async fn open_listening(&self, book_id: Path<i64>) -> SessionResponse {
        self.keep_fresh().await;
        ListeningService::new(&self.tracker, &self.registry)
            .open(book_id.0)
            .await
    }

    #[oai(path = "/v1/listening/sessions/:id/play", method = "post")]
    #[tracing::instrument(level = "debug", skip(self, id), fields(id = %id.0))]
    async fn play(&self, id: Path<Uuid>) -> SessionResponse {
        ListeningService::new(&self.tracker, &self.registry).play(id.0)
    }

    #[oai(path = "/v1/listening/sessions/:id/timeupdate", method = "post")]
    #[tracing::instrument(level = "debug", skip(self, body, id), fields(id = %id.0))]
    async fn time_update(&self, id: Path<Uuid>, body: Json<TimeUpdateRequestDto>) -> SessionResponse {
        ListeningService::new(&self.tracker, &self.registry).time_update(id.0, body.0)
    }

    #[oai(path = "/v1/listening/sessions/:id/pause", method = "post")]
    #[tracing::instrument(level = "debug", skip(self, id), fields(id = %id.0))]
    async fn pause(&self, id: Path<Uuid>) -> ReconcileResponse {
        self.keep_fresh().await;
        ListeningService::new(&self.tracker, &self.registry)
            .pause(id.0)
            .await
    }

    #[oai(path = "/v1/listening/sessions/:id/seek", method = "post")]
    #[tracing::instrument(level = "debug", skip(self, body, id), fields(id = %id.0))]
    async fn seek(&self, id: Path<Uuid>, body: Json<TimeUpdateRequestDto>) -> ReconcileResponse {
        self.keep_fresh().await;
        ListeningService::new(&self.tracker, &self.registry)
            .seek(id.0, body.0.current_time)
            .await
    }

    #[oai(path = "/v1/listening/sessions/:id/close", method = "post")]
    #[tracing::instrument(level = "debug", skip(self, id), fields(id = %id.0))]
    async fn close_listening(&self, id: Path<Uuid>) -> ReconcileResponse {
        self.keep_fresh().await;
        ListeningService::new(&self.tracker, &self.registry)
            .close(id.0)
            .await
    }
}
