use poem_openapi::payload::Json;

use crate::{
    companion_api::models::{StatusDto, StatusResponse},
    progress::ProgressTracker,
    session::SessionManager,
};

pub struct HealthService<'a> {
    pub sessions: &'a SessionManager,
    pub tracker: &'a ProgressTracker,
}

impl<'a> HealthService<'a> {
    pub fn new(sessions: &'a SessionManager, tracker: &'a ProgressTracker) -> Self {
        Self { sessions, tracker }
    }

    #[tracing::instrument(level = "debug", skip(self))]
    pub fn status(&self) -> StatusResponse {
        let user = self.sessions.context().user();
        let snapshot = self.tracker.snapshot();
        StatusResponse::Ok(Json(StatusDto {
            version: env!("CARGO_PKG_VERSION").to_string(),
            signed_in: user.is_some(),
            user: user.map(Into::into),
            library_entries: snapshot.entries.len(),
            fetched_at: snapshot.fetched_at,
        }))
    }
}
