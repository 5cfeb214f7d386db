// REST client for the book platform backend

use std::collections::HashMap;
use std::time::Duration;

use reqwest::{
    RequestBuilder, Response,
    multipart::{Form, Part},
};
use serde::{Deserialize, Serialize, de::DeserializeOwned};

use crate::{
    domain::{
        mapping::{map_audio_progress, map_book, map_library_entry, map_review},
        models::{Book, BookId, Kind, LibraryEntry, Review, ReviewId, Role, User},
    },
    error::{ApiError, ApiResult, FieldErrors},
    session::SessionContext,
};

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Clone, Debug)]
pub struct ShelfClient {
    base_url: String,
    asset_host: String,
    session: SessionContext,
    client: reqwest::Client,
}

impl ShelfClient {
    /// Create a new client for the given API base URL (e.g. "http://localhost:8000/api").
    /// Relative asset paths resolve against the URL's origin until `with_asset_host` says otherwise.
    pub fn new(base_url: impl Into<String>) -> ApiResult<Self> {
        let client = reqwest::Client::builder().timeout(DEFAULT_TIMEOUT).build()?;
        let base_url_str = base_url.into();
        tracing::debug!(base_url = %base_url_str, "creating ShelfClient");
        let base_url = base_url_str.trim_end_matches('/').to_string();
        Ok(ShelfClient {
            asset_host: origin_of(&base_url),
            base_url,
            session: SessionContext::default(),
            client,
        })
    }

    /// Return a client whose requests time out after `timeout`
    pub fn with_timeout(mut self, timeout: Duration) -> ApiResult<Self> {
        self.client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(self)
    }

    /// Return a client resolving relative cover/pdf paths against `asset_host`
    pub fn with_asset_host(mut self, asset_host: impl Into<String>) -> Self {
        self.asset_host = asset_host.into().trim_end_matches('/').to_string();
        self
    }

    /// Return a client reading its bearer token from `session`
    pub fn with_session(mut self, session: SessionContext) -> Self {
        self.session = session;
        self
    }

    pub fn session(&self) -> &SessionContext {
        &self.session
    }

    pub fn asset_host(&self) -> &str {
        &self.asset_host
    }

    fn url(&self, path: &str) -> String {
        if path.starts_with('/') {
            format!("{}{}", self.base_url, path)
        } else {
            format!("{}/{}", self.base_url, path)
        }
    }

    fn auth_header(&self) -> Option<(String, String)> {
        self.session
            .access_token()
            .map(|k| ("Authorization".to_string(), format!("Bearer {}", k)))
    }

    /// Attach the bearer token, or fail without sending when nobody is signed in.
    fn authed(&self, req: RequestBuilder) -> ApiResult<RequestBuilder> {
        match self.auth_header() {
            Some((k, v)) => Ok(req.header(&k, &v)),
            None => Err(ApiError::Unauthorized),
        }
    }

    async fn send(&self, req: RequestBuilder) -> ApiResult<Response> {
        let resp = req.send().await?;
        let status = resp.status();
        if status.is_success() {
            return Ok(resp);
        }
        let body = resp.text().await.unwrap_or_default();
        tracing::debug!(%status, body_len = body.len(), "request rejected");
        Err(ApiError::from_status(status, body))
    }

    async fn read_json<T: DeserializeOwned>(resp: Response) -> ApiResult<T> {
        let body = resp.text().await?;
        match serde_json::from_str::<T>(&body) {
            Ok(parsed) => Ok(parsed),
            Err(e) => {
                let snippet_len = body.len().min(2000);
                let snippet = body.get(..snippet_len).unwrap_or_default();
                tracing::error!(error = %e, body_snippet = %snippet, "failed to parse response body");
                Err(e.into())
            }
        }
    }

    // ===== Catalog =====

    /// GET /books/ (no auth required)
    #[tracing::instrument(level = "debug", skip(self))]
    pub async fn list_books(&self) -> ApiResult<Vec<Book>> {
        let url = self.url("/books/");
        tracing::debug!(%url, "GET books");
        let resp = self.send(self.client.get(&url)).await?;
        let books: Vec<BookDto> = Self::read_json(resp).await?;
        Ok(books
            .into_iter()
            .map(|b| map_book(&self.asset_host, b))
            .collect())
    }

    /// GET /books/search/?q=...
    #[tracing::instrument(level = "debug", skip(self))]
    pub async fn search_books(&self, query: &str) -> ApiResult<Vec<Book>> {
        let url = self.url("/books/search/");
        tracing::debug!(%url, %query, "GET book search");
        let req = self.client.get(&url).query(&[("q", query)]);
        let resp = self.send(req).await?;
        let books: Vec<BookDto> = Self::read_json(resp).await?;
        Ok(books
            .into_iter()
            .map(|b| map_book(&self.asset_host, b))
            .collect())
    }

    /// GET /books/{id}/
    #[tracing::instrument(level = "debug", skip(self))]
    pub async fn get_book(&self, book_id: BookId) -> ApiResult<Book> {
        let url = self.url(&format!("/books/{}/", book_id));
        tracing::debug!(%url, "GET book");
        let resp = self.send(self.client.get(&url)).await?;
        let book: BookDto = Self::read_json(resp).await?;
        Ok(map_book(&self.asset_host, book))
    }

    /// POST /books/ as multipart. Cover and PDF may each be an upload or a URL.
    #[tracing::instrument(level = "debug", skip(self, book), fields(title = %book.title))]
    pub async fn create_book(&self, book: NewBook) -> ApiResult<Book> {
        let url = self.url("/books/");
        tracing::debug!(%url, "POST book");
        let req = self.authed(self.client.post(&url))?.multipart(book.into_form()?);
        let resp = self.send(req).await?;
        let created: BookDto = Self::read_json(resp).await?;
        Ok(map_book(&self.asset_host, created))
    }

    /// PUT /books/{id}/ with only the fields that are set
    #[tracing::instrument(level = "debug", skip(self, changes))]
    pub async fn update_book(&self, book_id: BookId, changes: &BookChanges) -> ApiResult<Book> {
        let url = self.url(&format!("/books/{}/", book_id));
        tracing::debug!(%url, "PUT book");
        let req = self.authed(self.client.put(&url))?.json(changes);
        let resp = self.send(req).await?;
        let updated: BookDto = Self::read_json(resp).await?;
        Ok(map_book(&self.asset_host, updated))
    }

    /// DELETE /books/{id}/
    #[tracing::instrument(level = "debug", skip(self))]
    pub async fn delete_book(&self, book_id: BookId) -> ApiResult<()> {
        let url = self.url(&format!("/books/{}/", book_id));
        tracing::debug!(%url, "DELETE book");
        self.send(self.authed(self.client.delete(&url))?).await?;
        Ok(())
    }

    /// GET /books/{id}/pdf/ as raw bytes
    #[tracing::instrument(level = "debug", skip(self))]
    pub async fn fetch_pdf(&self, book_id: BookId) -> ApiResult<Vec<u8>> {
        let url = self.url(&format!("/books/{}/pdf/", book_id));
        tracing::debug!(%url, "GET pdf");
        let resp = self.send(self.authed(self.client.get(&url))?).await?;
        Ok(resp.bytes().await?.to_vec())
    }

    /// GET /books/{id}/read-aloud/ for an optional page range, as raw audio bytes
    #[tracing::instrument(level = "debug", skip(self))]
    pub async fn fetch_read_aloud(
        &self,
        book_id: BookId,
        start_page: Option<u32>,
        end_page: Option<u32>,
    ) -> ApiResult<Vec<u8>> {
        if let (Some(start), Some(end)) = (start_page, end_page) {
            if start > end {
                return Err(ApiError::InvalidRequest(format!(
                    "start_page {} is after end_page {}",
                    start, end
                )));
            }
        }
        let url = self.url(&format!("/books/{}/read-aloud/", book_id));
        tracing::debug!(%url, start_page, end_page, "GET read-aloud");
        let mut q: Vec<(&str, String)> = vec![];
        if let Some(s) = start_page {
            q.push(("start_page", s.to_string()));
        }
        if let Some(e) = end_page {
            q.push(("end_page", e.to_string()));
        }
        let req = self.authed(self.client.get(&url))?.query(&q);
        let resp = self.send(req).await?;
        Ok(resp.bytes().await?.to_vec())
    }

    // ===== Reviews =====

    /// GET /books/{id}/reviews/
    #[tracing::instrument(level = "debug", skip(self))]
    pub async fn list_reviews(&self, book_id: BookId) -> ApiResult<Vec<Review>> {
        let url = self.url(&format!("/books/{}/reviews/", book_id));
        tracing::debug!(%url, "GET reviews");
        let resp = self.send(self.client.get(&url)).await?;
        let reviews: Vec<ReviewDto> = Self::read_json(resp).await?;
        Ok(reviews.into_iter().map(map_review).collect())
    }

    /// POST /books/{id}/reviews/
    #[tracing::instrument(level = "debug", skip(self, review))]
    pub async fn create_review(&self, book_id: BookId, review: &NewReview) -> ApiResult<Review> {
        review.validate().map_err(ApiError::Validation)?;
        let url = self.url(&format!("/books/{}/reviews/", book_id));
        tracing::debug!(%url, rating = review.rating, "POST review");
        let req = self.authed(self.client.post(&url))?.json(review);
        let resp = self.send(req).await?;
        let created: ReviewDto = Self::read_json(resp).await?;
        Ok(map_review(created))
    }

    /// DELETE /reviews/{id}/
    #[tracing::instrument(level = "debug", skip(self))]
    pub async fn delete_review(&self, review_id: ReviewId) -> ApiResult<()> {
        let url = self.url(&format!("/reviews/{}/", review_id));
        tracing::debug!(%url, "DELETE review");
        self.send(self.authed(self.client.delete(&url))?).await?;
        Ok(())
    }

    /// GET /topreviews/ (no auth required)
    #[tracing::instrument(level = "debug", skip(self))]
    pub async fn top_reviews(&self) -> ApiResult<Vec<Review>> {
        let url = self.url("/topreviews/");
        tracing::debug!(%url, "GET top reviews");
        let resp = self.send(self.client.get(&url)).await?;
        let reviews: Vec<ReviewDto> = Self::read_json(resp).await?;
        Ok(reviews.into_iter().map(map_review).collect())
    }

    /// GET /recommendations/
    #[tracing::instrument(level = "debug", skip(self))]
    pub async fn recommendations(&self) -> ApiResult<Vec<Book>> {
        let url = self.url("/recommendations/");
        tracing::debug!(%url, "GET recommendations");
        let resp = self.send(self.authed(self.client.get(&url))?).await?;
        let books: Vec<BookDto> = Self::read_json(resp).await?;
        Ok(books
            .into_iter()
            .map(|b| map_book(&self.asset_host, b))
            .collect())
    }

    // ===== Library =====

    /// GET /library/
    #[tracing::instrument(level = "debug", skip(self))]
    pub async fn get_library(&self) -> ApiResult<Vec<LibraryEntry>> {
        let url = self.url("/library/");
        tracing::debug!(%url, "GET library");
        let resp = self.send(self.authed(self.client.get(&url))?).await?;
        let entries: Vec<LibraryEntryDto> = Self::read_json(resp).await?;
        Ok(entries
            .into_iter()
            .map(|e| map_library_entry(&self.asset_host, e))
            .collect())
    }

    /// POST /library/update/
    #[tracing::instrument(level = "debug", skip(self))]
    pub async fn update_progress(
        &self,
        book_id: BookId,
        kind: Kind,
        progress: u32,
        total: Option<u32>,
    ) -> ApiResult<()> {
        let url = self.url("/library/update/");
        let body = ProgressUpdateBody {
            book_id,
            progress,
            kind,
            total,
        };
        tracing::debug!(%url, book_id, %kind, progress, "POST library progress");
        let req = self.authed(self.client.post(&url))?.json(&body);
        self.send(req).await?;
        Ok(())
    }

    /// POST /library/
    #[tracing::instrument(level = "debug", skip(self))]
    pub async fn add_library_entry(&self, book_id: BookId, kind: Kind) -> ApiResult<()> {
        let url = self.url("/library/");
        tracing::debug!(%url, book_id, %kind, "POST library entry");
        let body = AddEntryBody {
            book: book_id,
            kind,
        };
        let req = self.authed(self.client.post(&url))?.json(&body);
        self.send(req).await?;
        Ok(())
    }

    /// DELETE /library/?book_id&type. Without a kind the backend removes both entries.
    #[tracing::instrument(level = "debug", skip(self))]
    pub async fn delete_library_entry(&self, book_id: BookId, kind: Option<Kind>) -> ApiResult<()> {
        let url = self.url("/library/");
        tracing::debug!(%url, book_id, kind = kind.map(|k| k.as_str()).unwrap_or("all"), "DELETE library entry");
        let mut q: Vec<(&str, String)> = vec![("book_id", book_id.to_string())];
        if let Some(k) = kind {
            q.push(("type", k.as_str().to_string()));
        }
        let req = self.authed(self.client.delete(&url))?.query(&q);
        self.send(req).await?;
        Ok(())
    }

    /// GET /library/audio-progress/?book_id. A missing entry is `None`, not an error.
    #[tracing::instrument(level = "debug", skip(self))]
    pub async fn audio_progress(&self, book_id: BookId) -> ApiResult<Option<LibraryEntry>> {
        let url = self.url("/library/audio-progress/");
        tracing::debug!(%url, book_id, "GET audio progress");
        let req = self
            .authed(self.client.get(&url))?
            .query(&[("book_id", book_id.to_string())]);
        match self.send(req).await {
            Ok(resp) => {
                let dto: AudioProgressDto = Self::read_json(resp).await?;
                Ok(Some(map_audio_progress(book_id, dto)))
            }
            Err(ApiError::NotFound) => Ok(None),
            Err(e) => Err(e),
        }
    }

    // ===== Accounts =====

    /// POST /login/ (no auth required). Does not touch the session; see `SessionManager`.
    #[tracing::instrument(level = "debug", skip(self, password))]
    pub async fn login(&self, username: &str, password: &str) -> ApiResult<AuthResponse> {
        let url = self.url("/login/");
        tracing::debug!(%url, %username, "POST login");
        let body = LoginBody { username, password };
        let resp = self.send(self.client.post(&url).json(&body)).await?;
        Self::read_json(resp).await
    }

    /// POST /register/ (no auth required), validated locally first
    #[tracing::instrument(level = "debug", skip(self, request), fields(username = %request.username))]
    pub async fn register(&self, request: &RegisterRequest) -> ApiResult<AuthResponse> {
        request.validate().map_err(ApiError::Validation)?;
        let url = self.url("/register/");
        tracing::debug!(%url, "POST register");
        let resp = self.send(self.client.post(&url).json(request)).await?;
        Self::read_json(resp).await
    }

    /// POST /token/refresh/ exchanging a refresh token for a new access token
    #[tracing::instrument(level = "debug", skip(self, refresh))]
    pub async fn refresh_token(&self, refresh: &str) -> ApiResult<TokenRefreshResponse> {
        let url = self.url("/token/refresh/");
        tracing::debug!(%url, "POST token refresh");
        let body = RefreshBody { refresh };
        let resp = self.send(self.client.post(&url).json(&body)).await?;
        Self::read_json(resp).await
    }
}

fn origin_of(base_url: &str) -> String {
    match reqwest::Url::parse(base_url) {
        Ok(u) => u.origin().ascii_serialization(),
        Err(_) => base_url.to_string(),
    }
}

// ============ Request bodies ============

#[derive(Debug, Serialize)]
struct LoginBody<'a> {
    username: &'a str,
    password: &'a str,
}

#[derive(Debug, Serialize)]
struct RefreshBody<'a> {
    refresh: &'a str,
}

#[derive(Debug, Serialize, PartialEq)]
pub struct ProgressUpdateBody {
    pub book_id: BookId,
    pub progress: u32,
    #[serde(rename = "type")]
    pub kind: Kind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total: Option<u32>,
}

#[derive(Debug, Serialize, PartialEq)]
pub struct AddEntryBody {
    pub book: BookId,
    #[serde(rename = "type")]
    pub kind: Kind,
}

#[derive(Debug, Clone, Serialize)]
pub struct RegisterRequest {
    pub name: String,
    pub username: String,
    pub mobile: String,
    pub email: String,
    pub password: String,
    #[serde(rename = "type")]
    pub role: Role,
}

impl RegisterRequest {
    /// Same rules the backend enforces, checked before anything is sent.
    pub fn validate(&self) -> Result<(), FieldErrors> {
        let mut errors = FieldErrors::new();
        if self.name.trim().is_empty() {
            errors.push("name", "This field may not be blank.");
        }
        if self.username.is_empty() {
            errors.push("username", "This field may not be blank.");
        } else if !self
            .username
            .chars()
            .all(|c| c.is_alphanumeric() || matches!(c, '_' | '.' | '@' | '+' | '-'))
        {
            errors.push(
                "username",
                "Username may contain only letters, numbers, and @/./+/-/_ characters.",
            );
        }
        let digits = self.mobile.chars().all(|c| c.is_ascii_digit());
        if !digits || !(10..=15).contains(&self.mobile.len()) {
            errors.push("mobile", "Mobile number must be 10-15 digits.");
        }
        if !self.email.contains('@') {
            errors.push("email", "Enter a valid email address.");
        }
        if self.password.chars().count() < 8 {
            errors.push("password", "Password must be at least 8 characters long.");
        } else if !self.password.chars().any(|c| c.is_ascii_alphabetic())
            || !self.password.chars().any(|c| c.is_ascii_digit())
        {
            errors.push("password", "Password must contain both letters and numbers.");
        }
        if errors.is_empty() { Ok(()) } else { Err(errors) }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct NewReview {
    pub rating: u8,
    pub comment: String,
}

impl NewReview {
    pub fn validate(&self) -> Result<(), FieldErrors> {
        let mut errors = FieldErrors::new();
        if !(1..=5).contains(&self.rating) {
            errors.push("rating", "Rating must be between 1 and 5.");
        }
        if self.comment.trim().is_empty() {
            errors.push("comment", "This field may not be blank.");
        }
        if errors.is_empty() { Ok(()) } else { Err(errors) }
    }
}

/// A cover image or PDF given either as file contents or as a URL.
#[derive(Debug, Clone)]
pub enum Upload {
    File { file_name: String, bytes: Vec<u8> },
    Url(String),
}

#[derive(Debug, Clone)]
pub struct NewBook {
    pub title: String,
    pub author: String,
    pub genre: String,
    pub published_year: Option<i64>,
    pub description: Option<String>,
    pub cover: Option<Upload>,
    pub pdf: Option<Upload>,
}

impl NewBook {
    fn into_form(self) -> ApiResult<Form> {
        let mut form = Form::new()
            .text("title", self.title)
            .text("author", self.author)
            .text("genre", self.genre)
            .text("description", self.description.unwrap_or_default());
        if let Some(year) = self.published_year {
            form = form.text("published_year", year.to_string());
        }
        form = match self.cover {
            Some(Upload::File { file_name, bytes }) => form.part(
                "cover_image",
                Part::bytes(bytes)
                    .file_name(file_name)
                    .mime_str("application/octet-stream")?,
            ),
            Some(Upload::Url(url)) => form.text("cover_image_url", url),
            None => form,
        };
        form = match self.pdf {
            Some(Upload::File { file_name, bytes }) => form.part(
                "pdf_document",
                Part::bytes(bytes).file_name(file_name).mime_str("application/pdf")?,
            ),
            Some(Upload::Url(url)) => form.text("pdf_document_url", url),
            None => form,
        };
        Ok(form)
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct BookChanges {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub author: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub genre: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub published_year: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_pages: Option<u32>,
}

// ============ Responses ============

#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct AuthResponse {
    pub access: String,
    pub refresh: String,
    pub user: User,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct TokenRefreshResponse {
    pub access: String,
    /// Present when the backend rotates refresh tokens
    pub refresh: Option<String>,
}

#[derive(Debug, Deserialize, PartialEq)]
pub struct BookDto {
    pub id: BookId,
    pub title: Option<String>,
    pub author: Option<String>,
    pub genre: Option<String>,
    #[serde(
        deserialize_with = "crate::shelf_client::de::opt_i64_from_str_or_num",
        default
    )]
    pub published_year: Option<i64>,
    pub description: Option<String>,
    #[serde(
        deserialize_with = "crate::shelf_client::de::opt_i64_from_str_or_num",
        default
    )]
    pub total_pages: Option<i64>,
    #[serde(
        deserialize_with = "crate::shelf_client::de::opt_f64_from_str_or_num",
        default
    )]
    pub rating: Option<f64>,
    pub cover_image_url: Option<String>,
    pub cover_image: Option<String>,
    pub pdf_document_url: Option<String>,
    pub pdf_document: Option<String>,
    // allow extra fields
    #[serde(flatten)]
    pub extra: HashMap<String, serde_json::Value>,
}

/// Library entries carry either the nested book or just its id.
#[derive(Debug, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum BookRefDto {
    Id(BookId),
    Book(Box<BookDto>),
}

#[derive(Debug, Deserialize, PartialEq)]
pub struct LibraryEntryDto {
    pub id: Option<i64>,
    #[serde(alias = "book_id")]
    pub book: BookRefDto,
    #[serde(rename = "type")]
    pub kind: Kind,
    #[serde(
        deserialize_with = "crate::shelf_client::de::opt_i64_from_str_or_num",
        default
    )]
    pub progress: Option<i64>,
    #[serde(
        deserialize_with = "crate::shelf_client::de::opt_i64_from_str_or_num",
        default
    )]
    pub total: Option<i64>,
    pub percent_complete: Option<f64>,
}

#[derive(Debug, Deserialize, PartialEq)]
pub struct AudioProgressDto {
    #[serde(
        deserialize_with = "crate::shelf_client::de::opt_i64_from_str_or_num",
        default
    )]
    pub progress: Option<i64>,
    #[serde(
        alias = "duration",
        deserialize_with = "crate::shelf_client::de::opt_i64_from_str_or_num",
        default
    )]
    pub total: Option<i64>,
}

#[derive(Debug, Deserialize, PartialEq)]
pub struct ReviewDto {
    pub id: ReviewId,
    /// Book id, or the nested book
    pub book: Option<serde_json::Value>,
    /// Username string, or a nested user object
    pub user: Option<serde_json::Value>,
    #[serde(
        deserialize_with = "crate::shelf_client::de::opt_i64_from_str_or_num",
        default
    )]
    pub rating: Option<i64>,
    #[serde(alias = "content", alias = "text", default)]
    pub comment: Option<String>,
    pub created_at: Option<String>,
}

/// Internal serde helpers
pub mod de {
    use serde::{Deserialize, Deserializer};

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum NumOrStr {
        Int(i64),
        Float(f64),
        Str(String),
    }

    /// Accept Option<i64> from a number or a string like "1925"; null/"" -> None.
    pub fn opt_i64_from_str_or_num<'de, D>(deserializer: D) -> Result<Option<i64>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let val: Option<NumOrStr> = Option::deserialize(deserializer)?;
        Ok(match val {
            None => None,
            Some(NumOrStr::Int(n)) => Some(n),
            Some(NumOrStr::Float(f)) if f.is_finite() => Some(f.round() as i64),
            Some(NumOrStr::Float(_)) => None,
            Some(NumOrStr::Str(s)) => s.trim().parse::<i64>().ok(),
        })
    }

    /// Accept Option<f64> from a number or a decimal string like "4.5".
    pub fn opt_f64_from_str_or_num<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let val: Option<NumOrStr> = Option::deserialize(deserializer)?;
        Ok(match val {
            None => None,
            Some(NumOrStr::Int(n)) => Some(n as f64),
            Some(NumOrStr::Float(f)) => Some(f),
            Some(NumOrStr::Str(s)) => s.trim().parse::<f64>().ok(),
        })
    }
}
