// Mapping from backend DTOs to domain models. This is the only place that
// knows about optional/alternate wire fields.

use chrono::{DateTime, Utc};
use serde_json::Value;

use super::models::{Book, BookId, Cover, Kind, LibraryEntry, PdfSource, Review};
use crate::shelf_client::{AudioProgressDto, BookDto, BookRefDto, LibraryEntryDto, ReviewDto};

/// Absolute URLs pass through; paths are served from the backend host.
pub fn resolve_asset_url(asset_host: &str, path: &str) -> String {
    if path.starts_with("http://") || path.starts_with("https://") {
        path.to_string()
    } else if path.starts_with('/') {
        format!("{}{}", asset_host.trim_end_matches('/'), path)
    } else {
        format!("{}/{}", asset_host.trim_end_matches('/'), path)
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

fn to_count(value: Option<i64>) -> Option<u32> {
    value.and_then(|v| u32::try_from(v).ok())
}

pub fn map_book(asset_host: &str, dto: BookDto) -> Book {
    // cover_image_url wins over the uploaded cover_image
    let cover = non_empty(dto.cover_image_url)
        .or_else(|| non_empty(dto.cover_image))
        .map(|p| Cover::Url(resolve_asset_url(asset_host, &p)))
        .unwrap_or(Cover::Default);

    let pdf = match non_empty(dto.pdf_document_url) {
        Some(url) => PdfSource::External(resolve_asset_url(asset_host, &url)),
        None => PdfSource::Hosted,
    };

    Book {
        id: dto.id,
        title: non_empty(dto.title).unwrap_or_else(|| "Untitled".into()),
        author: non_empty(dto.author).unwrap_or_else(|| "Unknown author".into()),
        genre: non_empty(dto.genre),
        published_year: dto.published_year,
        description: non_empty(dto.description),
        total_pages: to_count(dto.total_pages).filter(|p| *p > 0),
        rating: dto.rating,
        cover,
        pdf,
    }
}

pub fn map_library_entry(asset_host: &str, dto: LibraryEntryDto) -> LibraryEntry {
    let (book_id, book) = match dto.book {
        BookRefDto::Id(id) => (id, None),
        BookRefDto::Book(b) => {
            let book = map_book(asset_host, *b);
            (book.id, Some(book))
        }
    };
    // negative progress from the wire is treated as none read
    let progress = dto.progress.map(|p| p.max(0)).and_then(|p| u32::try_from(p).ok());
    let total = to_count(dto.total).filter(|t| *t > 0).or_else(|| match dto.kind {
        Kind::Pdf => book.as_ref().and_then(|b| b.total_pages),
        Kind::Audio => None,
    });

    let entry = LibraryEntry::new(book_id, dto.kind, progress.unwrap_or(0), total);
    match book {
        Some(b) => entry.with_book(b),
        None => entry,
    }
}

pub fn map_audio_progress(book_id: BookId, dto: AudioProgressDto) -> LibraryEntry {
    let progress = dto
        .progress
        .map(|p| p.max(0))
        .and_then(|p| u32::try_from(p).ok())
        .unwrap_or(0);
    LibraryEntry::new(book_id, Kind::Audio, progress, to_count(dto.total))
}

fn id_from(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64(),
        Value::Object(map) => map.get("id").and_then(Value::as_i64),
        Value::String(s) => s.parse().ok(),
        _ => None,
    }
}

fn author_from(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Object(map) => ["name", "username"]
            .iter()
            .find_map(|k| map.get(*k).and_then(Value::as_str))
            .map(str::to_string),
        _ => None,
    }
}

pub fn map_review(dto: ReviewDto) -> Review {
    Review {
        id: dto.id,
        book_id: dto.book.as_ref().and_then(id_from),
        author: dto.user.as_ref().and_then(author_from),
        rating: dto
            .rating
            .and_then(|r| u8::try_from(r).ok())
            .filter(|r| (1..=5).contains(r)),
        comment: dto.comment.unwrap_or_default(),
        created_at: dto
            .created_at
            .as_deref()
            .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
            .map(|d| d.with_timezone(&Utc)),
    }
}
