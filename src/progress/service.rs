use async_trait::async_trait;

use crate::{
    domain::models::{BookId, Kind, LibraryEntry, clamp_progress},
    error::ApiResult,
    shelf_client::ShelfClient,
};

/// An absolute progress value to persist for one (book, kind) entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProgressUpdate {
    pub book_id: BookId,
    pub kind: Kind,
    pub progress: u32,
    pub total: Option<u32>,
}

impl ProgressUpdate {
    /// Progress is clamped to `total` when it is known.
    pub fn new(book_id: BookId, kind: Kind, progress: u32, total: Option<u32>) -> Self {
        let total = total.filter(|t| *t > 0);
        Self {
            book_id,
            kind,
            progress: clamp_progress(progress, total),
            total,
        }
    }
}

/// The REST calls the progress tracker depends on.
#[async_trait]
pub trait LibraryService: Send + Sync {
    async fn fetch_library(&self) -> ApiResult<Vec<LibraryEntry>>;

    async fn push_progress(&self, update: ProgressUpdate) -> ApiResult<()>;

    async fn add_entry(&self, book_id: BookId, kind: Kind) -> ApiResult<()>;

    /// `None` removes both kinds
    async fn remove_entry(&self, book_id: BookId, kind: Option<Kind>) -> ApiResult<()>;

    async fn fetch_audio_progress(&self, book_id: BookId) -> ApiResult<Option<LibraryEntry>>;
}

#[async_trait]
impl LibraryService for ShelfClient {
    async fn fetch_library(&self) -> ApiResult<Vec<LibraryEntry>> {
        self.get_library().await
    }

    async fn push_progress(&self, update: ProgressUpdate) -> ApiResult<()> {
        self.update_progress(update.book_id, update.kind, update.progress, update.total)
            .await
    }

    async fn add_entry(&self, book_id: BookId, kind: Kind) -> ApiResult<()> {
        self.add_library_entry(book_id, kind).await
    }

    async fn remove_entry(&self, book_id: BookId, kind: Option<Kind>) -> ApiResult<()> {
        self.delete_library_entry(book_id, kind).await
    }

    async fn fetch_audio_progress(&self, book_id: BookId) -> ApiResult<Option<LibraryEntry>> {
        self.audio_progress(book_id).await
    }
}
