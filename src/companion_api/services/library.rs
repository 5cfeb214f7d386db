use poem_openapi::payload::Json;

use crate::{
    companion_api::{
        models::{
            AddEntryRequestDto, FilterDto, KindDto, LibraryChangeResponse, LibraryResponse,
            LibraryStatsResponse,
        },
        services::library_dto,
    },
    domain::models::{BookId, LibraryFilter, LibrarySnapshot},
    error::SyncError,
    progress::ProgressTracker,
};

pub struct LibraryPageService<'a> {
    pub tracker: &'a ProgressTracker,
}

impl<'a> LibraryPageService<'a> {
    pub fn new(tracker: &'a ProgressTracker) -> Self {
        Self { tracker }
    }

    /// The cached snapshot, re-fetched first when asked to or when nothing was fetched yet.
    /// A failed re-fetch falls back to the cache with a notice.
    #[tracing::instrument(level = "debug", skip(self))]
    pub async fn list(&self, refresh: bool, filter: Option<FilterDto>) -> LibraryResponse {
        let filter = filter.map(LibraryFilter::from).unwrap_or_default();
        let cached = self.tracker.snapshot();
        if !refresh && cached.fetched_at.is_some() {
            return LibraryResponse::Ok(Json(library_dto(self.tracker, &cached, filter, None)));
        }
        match self.tracker.refresh().await {
            Ok(snapshot) => {
                LibraryResponse::Ok(Json(library_dto(self.tracker, &snapshot, filter, None)))
            }
            Err(SyncError::Unauthorized) => {
                LibraryResponse::Unauthorized(Json(SyncError::Unauthorized.to_string().into()))
            }
            Err(e) => {
                tracing::warn!(error = %e, "library refresh failed, serving cached snapshot");
                LibraryResponse::Ok(Json(library_dto(
                    self.tracker,
                    &cached,
                    filter,
                    Some(e.to_string()),
                )))
            }
        }
    }

    pub fn stats(&self) -> LibraryStatsResponse {
        LibraryStatsResponse::Ok(Json(self.tracker.snapshot().stats().into()))
    }

    #[tracing::instrument(level = "debug", skip(self, body), fields(book_id = body.book_id))]
    pub async fn add(&self, body: AddEntryRequestDto) -> LibraryChangeResponse {
        let result = self
            .tracker
            .add_to_library(body.book_id, body.kind.into())
            .await;
        self.changed(result)
    }

    #[tracing::instrument(level = "debug", skip(self))]
    pub async fn remove(&self, book_id: BookId, kind: Option<KindDto>) -> LibraryChangeResponse {
        let result = self
            .tracker
            .remove_from_library(book_id, kind.map(Into::into))
            .await;
        self.changed(result)
    }

    fn changed(&self, result: Result<LibrarySnapshot, SyncError>) -> LibraryChangeResponse {
        match result {
            Ok(snapshot) => LibraryChangeResponse::Ok(Json(library_dto(
                self.tracker,
                &snapshot,
                LibraryFilter::All,
                None,
            ))),
            Err(SyncError::Unauthorized) => {
                LibraryChangeResponse::Unauthorized(Json(SyncError::Unauthorized.to_string().into()))
            }
            // the change went through, only the re-fetch failed
            Err(e @ SyncError::RefreshFailed(_)) => LibraryChangeResponse::Ok(Json(library_dto(
                self.tracker,
                &self.tracker.snapshot(),
                LibraryFilter::All,
                Some(e.to_string()),
            ))),
            Err(e) => {
                tracing::warn!(error = %e, "library change failed");
                LibraryChangeResponse::BadGateway(Json(e.to_string().into()))
            }
        }
    }
}
