use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use poem_openapi::{ApiResponse, Enum, Object, payload::Json};
use uuid::Uuid;

use crate::{
    domain::models::{Book, Kind, LibraryEntry, LibraryFilter, LibraryStats, Role, User},
    error::{ApiError, FieldErrors, SyncError},
    progress::{ProgressUpdate, Reconciled, SessionState},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Enum)]
#[oai(rename_all = "lowercase")]
pub enum KindDto {
    Pdf,
    Audio,
}

impl From<Kind> for KindDto {
    fn from(kind: Kind) -> Self {
        match kind {
            Kind::Pdf => KindDto::Pdf,
            Kind::Audio => KindDto::Audio,
        }
    }
}

impl From<KindDto> for Kind {
    fn from(kind: KindDto) -> Self {
        match kind {
            KindDto::Pdf => Kind::Pdf,
            KindDto::Audio => Kind::Audio,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Enum)]
#[oai(rename_all = "lowercase")]
pub enum FilterDto {
    All,
    Reading,
    Completed,
}

impl From<FilterDto> for LibraryFilter {
    fn from(filter: FilterDto) -> Self {
        match filter {
            FilterDto::All => LibraryFilter::All,
            FilterDto::Reading => LibraryFilter::Reading,
            FilterDto::Completed => LibraryFilter::Completed,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Enum)]
#[oai(rename_all = "lowercase")]
pub enum SessionStateDto {
    Idle,
    Active,
    Reconciling,
}

impl From<SessionState> for SessionStateDto {
    fn from(state: SessionState) -> Self {
        match state {
            SessionState::Idle => SessionStateDto::Idle,
            SessionState::Active => SessionStateDto::Active,
            SessionState::Reconciling => SessionStateDto::Reconciling,
        }
    }
}

#[derive(Debug, Clone, Object)]
pub struct ErrorDto {
    /// Human-readable error message
    pub message: String,
    /// Per-field validation messages
    #[oai(skip_serializing_if_is_none)]
    pub fields: Option<BTreeMap<String, Vec<String>>>,
}

impl From<String> for ErrorDto {
    fn from(message: String) -> Self {
        ErrorDto {
            message,
            fields: None,
        }
    }
}

impl From<&str> for ErrorDto {
    fn from(message: &str) -> Self {
        message.to_string().into()
    }
}

impl From<FieldErrors> for ErrorDto {
    fn from(errors: FieldErrors) -> Self {
        ErrorDto {
            message: errors.summary(),
            fields: Some(errors.0),
        }
    }
}

impl From<&ApiError> for ErrorDto {
    fn from(err: &ApiError) -> Self {
        match err {
            ApiError::Validation(errors) if !errors.is_empty() => errors.clone().into(),
            other => other.user_message().into(),
        }
    }
}

#[derive(Debug, Clone, Object)]
pub struct UserDto {
    pub id: i64,
    pub name: String,
    pub username: String,
    pub mobile: Option<String>,
    pub email: Option<String>,
    /// `user` or `admin`
    pub role: String,
}

impl From<User> for UserDto {
    fn from(user: User) -> Self {
        UserDto {
            id: user.id,
            name: user.name,
            username: user.username,
            mobile: user.mobile,
            email: user.email,
            role: user.role.as_str().to_string(),
        }
    }
}

#[derive(Debug, Clone, Object)]
pub struct StatusDto {
    pub version: String,
    pub signed_in: bool,
    pub user: Option<UserDto>,
    /// Entries in the cached library snapshot
    pub library_entries: usize,
    pub fetched_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Object)]
pub struct LoginRequestDto {
    pub username: String,
    #[oai(write_only)]
    pub password: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Enum)]
#[oai(rename_all = "lowercase")]
pub enum RoleDto {
    User,
    Admin,
}

impl From<RoleDto> for Role {
    fn from(role: RoleDto) -> Self {
        match role {
            RoleDto::User => Role::User,
            RoleDto::Admin => Role::Admin,
        }
    }
}

#[derive(Debug, Clone, Object)]
pub struct RegisterRequestDto {
    pub name: String,
    pub username: String,
    /// 10 to 15 digits
    pub mobile: String,
    pub email: String,
    #[oai(write_only)]
    pub password: String,
    /// Defaults to `user`
    pub role: Option<RoleDto>,
}

#[derive(Debug, Clone, Object)]
pub struct BookSummaryDto {
    pub id: i64,
    pub title: String,
    pub author: String,
    pub cover_url: String,
    pub total_pages: Option<u32>,
}

impl From<&Book> for BookSummaryDto {
    fn from(book: &Book) -> Self {
        BookSummaryDto {
            id: book.id,
            title: book.title.clone(),
            author: book.author.clone(),
            cover_url: book.cover.url().to_string(),
            total_pages: book.total_pages,
        }
    }
}

#[derive(Debug, Clone, Object)]
pub struct LibraryEntryDto {
    pub book_id: i64,
    pub kind: KindDto,
    /// Pages for pdf, seconds for audio
    pub progress: u32,
    pub total: Option<u32>,
    pub percent_complete: u8,
    pub completed: bool,
    /// A write for this entry is in flight
    pub reconciling: bool,
    pub book: Option<BookSummaryDto>,
}

impl LibraryEntryDto {
    pub fn new(entry: &LibraryEntry, reconciling: bool) -> Self {
        LibraryEntryDto {
            book_id: entry.book_id(),
            kind: entry.kind().into(),
            progress: entry.progress(),
            total: entry.total(),
            percent_complete: entry.percent_complete(),
            completed: entry.is_completed(),
            reconciling,
            book: entry.book.as_ref().map(BookSummaryDto::from),
        }
    }
}

#[derive(Debug, Clone, Object)]
pub struct LibraryDto {
    pub entries: Vec<LibraryEntryDto>,
    pub fetched_at: Option<DateTime<Utc>>,
    /// Set when the refresh failed and the cached snapshot is shown instead
    #[oai(skip_serializing_if_is_none)]
    pub notice: Option<String>,
}

#[derive(Debug, Clone, Object)]
pub struct LibraryStatsDto {
    pub total: usize,
    pub reading: usize,
    pub completed: usize,
}

impl From<LibraryStats> for LibraryStatsDto {
    fn from(stats: LibraryStats) -> Self {
        LibraryStatsDto {
            total: stats.total,
            reading: stats.reading,
            completed: stats.completed,
        }
    }
}

#[derive(Debug, Clone, Object)]
pub struct AddEntryRequestDto {
    pub book_id: i64,
    pub kind: KindDto,
}

#[derive(Debug, Clone, Object)]
pub struct ProgressDto {
    pub book_id: i64,
    pub kind: KindDto,
    pub progress: u32,
    pub total: Option<u32>,
}

impl From<ProgressUpdate> for ProgressDto {
    fn from(update: ProgressUpdate) -> Self {
        ProgressDto {
            book_id: update.book_id,
            kind: update.kind.into(),
            progress: update.progress,
            total: update.total,
        }
    }
}

/// Outcome of a progress write as seen by the view.
#[derive(Debug, Clone, Object)]
pub struct ReconcileDto {
    /// What was sent; absent when there was nothing to send
    pub sent: Option<ProgressDto>,
    /// The entry as the server reports it after the write
    pub entry: Option<LibraryEntryDto>,
    /// The value was folded into a follow-up behind an earlier write
    pub coalesced: bool,
    /// Non-fatal failure message for inline display
    #[oai(skip_serializing_if_is_none)]
    pub notice: Option<String>,
}

impl ReconcileDto {
    pub fn nothing_to_send() -> Self {
        ReconcileDto {
            sent: None,
            entry: None,
            coalesced: false,
            notice: None,
        }
    }

    pub fn settled(reconciled: Reconciled, coalesced: bool) -> Self {
        ReconcileDto {
            sent: Some(reconciled.sent.into()),
            entry: reconciled.entry.as_ref().map(|e| LibraryEntryDto::new(e, false)),
            coalesced,
            notice: None,
        }
    }

    pub fn failed(err: &SyncError, coalesced: bool) -> Self {
        ReconcileDto {
            sent: None,
            entry: None,
            coalesced,
            notice: Some(err.to_string()),
        }
    }
}

#[derive(Debug, Clone, Object)]
pub struct ScrubRequestDto {
    pub progress: u32,
    pub total: Option<u32>,
}

#[derive(Debug, Clone, Object)]
pub struct TimeUpdateRequestDto {
    /// Playback position in seconds
    pub current_time: f64,
    pub duration: Option<f64>,
}

#[derive(Debug, Clone, Object)]
pub struct SessionDto {
    pub session_id: Uuid,
    pub book_id: i64,
    pub kind: KindDto,
    pub state: SessionStateDto,
    /// Estimated page for pdf, position in whole seconds for audio
    pub progress: u32,
    pub total: Option<u32>,
    pub percent_complete: u8,
}

#[derive(ApiResponse)]
pub enum StatusResponse {
    #[oai(status = 200)]
    Ok(Json<StatusDto>),
}

#[derive(ApiResponse)]
pub enum AuthResponse {
    /// Signed in; the library snapshot was refreshed
    #[oai(status = 200)]
    Ok(Json<UserDto>),

    /// Field validation failed locally or on the server
    #[oai(status = 400)]
    BadRequest(Json<ErrorDto>),

    /// Wrong credentials
    #[oai(status = 401)]
    Unauthorized(Json<ErrorDto>),

    /// Book platform unreachable or misbehaving
    #[oai(status = 502)]
    BadGateway(Json<ErrorDto>),
}

#[derive(ApiResponse)]
pub enum LogoutResponse {
    #[oai(status = 204)]
    NoContent,
}

#[derive(ApiResponse)]
pub enum LibraryResponse {
    #[oai(status = 200)]
    Ok(Json<LibraryDto>),

    #[oai(status = 401)]
    Unauthorized(Json<ErrorDto>),
}

#[derive(ApiResponse)]
pub enum LibraryStatsResponse {
    #[oai(status = 200)]
    Ok(Json<LibraryStatsDto>),
}

#[derive(ApiResponse)]
pub enum LibraryChangeResponse {
    /// Change applied; body is the refreshed library
    #[oai(status = 200)]
    Ok(Json<LibraryDto>),

    #[oai(status = 401)]
    Unauthorized(Json<ErrorDto>),

    #[oai(status = 502)]
    BadGateway(Json<ErrorDto>),
}

#[derive(ApiResponse)]
pub enum SessionResponse {
    #[oai(status = 200)]
    Ok(Json<SessionDto>),

    #[oai(status = 401)]
    Unauthorized(Json<ErrorDto>),

    /// Unknown session id
    #[oai(status = 404)]
    NotFound(Json<ErrorDto>),
}

#[derive(ApiResponse)]
pub enum ReconcileResponse {
    /// Reconciliation settled; failures other than auth are reported in `notice`
    #[oai(status = 200)]
    Ok(Json<ReconcileDto>),

    #[oai(status = 401)]
    Unauthorized(Json<ErrorDto>),

    #[oai(status = 404)]
    NotFound(Json<ErrorDto>),
}
