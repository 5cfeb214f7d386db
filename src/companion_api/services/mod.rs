pub mod account;
pub mod health;
pub mod library;
pub mod listening;
pub mod progress;
pub mod reading;

use poem_openapi::payload::Json;

use crate::{
    companion_api::models::{ErrorDto, LibraryDto, LibraryEntryDto, ReconcileDto, ReconcileResponse},
    domain::models::{LibraryFilter, LibrarySnapshot},
    error::SyncError,
    progress::{ProgressTracker, Reconciliation},
};

/// Wait for a submitted write to settle and describe it for the view.
/// Only an auth failure is an error response; everything else is a notice.
pub(crate) async fn settle(handle: Option<Reconciliation>) -> ReconcileResponse {
    let Some(handle) = handle else {
        return ReconcileResponse::Ok(Json(ReconcileDto::nothing_to_send()));
    };
    let coalesced = handle.was_coalesced();
    match handle.outcome().await {
        Ok(reconciled) => ReconcileResponse::Ok(Json(ReconcileDto::settled(reconciled, coalesced))),
        Err(SyncError::Unauthorized) => {
            ReconcileResponse::Unauthorized(Json(SyncError::Unauthorized.to_string().into()))
        }
        Err(e) => {
            tracing::warn!(error = %e, "progress not reconciled");
            ReconcileResponse::Ok(Json(ReconcileDto::failed(&e, coalesced)))
        }
    }
}

pub(crate) fn unknown_session() -> Json<ErrorDto> {
    Json("Unknown or closed session".into())
}

pub(crate) fn library_dto(
    tracker: &ProgressTracker,
    snapshot: &LibrarySnapshot,
    filter: LibraryFilter,
    notice: Option<String>,
) -> LibraryDto {
    LibraryDto {
        entries: snapshot
            .filtered(filter)
            .map(|e| LibraryEntryDto::new(e, tracker.is_reconciling(e.book_id(), e.kind())))
            .collect(),
        fetched_at: snapshot.fetched_at,
        notice,
    }
}
