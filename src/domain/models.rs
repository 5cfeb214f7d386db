// Normalized domain records. Everything downstream of the client works on these,
// never on the raw wire shapes.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub type BookId = i64;
pub type ReviewId = i64;
pub type UserId = i64;

pub const DEFAULT_COVER_PATH: &str = "/default-cover.png";

/// Which progress a library entry records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Kind {
    /// Reading progress, in pages
    Pdf,
    /// Listening progress, in seconds
    Audio,
}

impl Kind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Kind::Pdf => "pdf",
            Kind::Audio => "audio",
        }
    }
}

impl fmt::Display for Kind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Kind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "pdf" => Ok(Kind::Pdf),
            "audio" => Ok(Kind::Audio),
            other => Err(format!("unknown library entry kind: {other}")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Cover {
    Url(String),
    Default,
}

impl Cover {
    pub fn url(&self) -> &str {
        match self {
            Cover::Url(u) => u,
            Cover::Default => DEFAULT_COVER_PATH,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PdfSource {
    /// Document lives at a third-party URL and can be opened directly
    External(String),
    /// Document is served by the backend at `/books/{id}/pdf/`
    Hosted,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Book {
    pub id: BookId,
    pub title: String,
    pub author: String,
    pub genre: Option<String>,
    pub published_year: Option<i64>,
    pub description: Option<String>,
    pub total_pages: Option<u32>,
    pub rating: Option<f64>,
    pub cover: Cover,
    pub pdf: PdfSource,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Admin,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Admin => "admin",
        }
    }
}

impl FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "user" => Ok(Role::User),
            "admin" => Ok(Role::Admin),
            other => Err(format!("unknown role: {other}")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: UserId,
    pub name: String,
    pub username: String,
    pub mobile: Option<String>,
    pub email: Option<String>,
    #[serde(rename = "type")]
    pub role: Role,
}

impl User {
    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Review {
    pub id: ReviewId,
    pub book_id: Option<BookId>,
    pub author: Option<String>,
    pub rating: Option<u8>,
    pub comment: String,
    pub created_at: Option<DateTime<Utc>>,
}

/// A user's reading or listening progress for one book.
///
/// `kind` is fixed at construction and `progress` never exceeds a known `total`.
#[derive(Debug, Clone, PartialEq)]
pub struct LibraryEntry {
    book_id: BookId,
    kind: Kind,
    progress: u32,
    total: Option<u32>,
    pub book: Option<Book>,
}

impl LibraryEntry {
    pub fn new(book_id: BookId, kind: Kind, progress: u32, total: Option<u32>) -> Self {
        let total = total.filter(|t| *t > 0);
        Self {
            book_id,
            kind,
            progress: clamp_progress(progress, total),
            total,
            book: None,
        }
    }

    pub fn with_book(mut self, book: Book) -> Self {
        self.book = Some(book);
        self
    }

    pub fn book_id(&self) -> BookId {
        self.book_id
    }

    pub fn kind(&self) -> Kind {
        self.kind
    }

    pub fn progress(&self) -> u32 {
        self.progress
    }

    pub fn total(&self) -> Option<u32> {
        self.total
    }

    pub fn percent_complete(&self) -> u8 {
        percent_complete(self.progress, self.total)
    }

    pub fn is_completed(&self) -> bool {
        self.percent_complete() == 100
    }

    pub fn is_reading(&self) -> bool {
        self.progress > 0 && self.percent_complete() < 100
    }
}

pub fn clamp_progress(progress: u32, total: Option<u32>) -> u32 {
    match total {
        Some(t) if t > 0 => progress.min(t),
        _ => progress,
    }
}

/// `round(100 * progress / total)` clamped to 0..=100; 0 while the total is unknown.
pub fn percent_complete(progress: u32, total: Option<u32>) -> u8 {
    match total {
        Some(t) if t > 0 => {
            let p = u64::from(progress);
            let t = u64::from(t);
            // round half up in integers
            let pct = (200 * p + t) / (2 * t);
            pct.min(100) as u8
        }
        _ => 0,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LibraryFilter {
    #[default]
    All,
    Reading,
    Completed,
}

impl LibraryFilter {
    pub fn matches(&self, entry: &LibraryEntry) -> bool {
        match self {
            LibraryFilter::All => true,
            LibraryFilter::Reading => entry.is_reading(),
            LibraryFilter::Completed => entry.is_completed(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct LibraryStats {
    pub total: usize,
    pub reading: usize,
    pub completed: usize,
}

/// The last library state confirmed by the server.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct LibrarySnapshot {
    pub entries: Vec<LibraryEntry>,
    pub fetched_at: Option<DateTime<Utc>>,
}

impl LibrarySnapshot {
    pub fn new(entries: Vec<LibraryEntry>) -> Self {
        Self {
            entries,
            fetched_at: Some(Utc::now()),
        }
    }

    pub fn entry(&self, book_id: BookId, kind: Kind) -> Option<&LibraryEntry> {
        self.entries
            .iter()
            .find(|e| e.book_id() == book_id && e.kind() == kind)
    }

    pub fn filtered(&self, filter: LibraryFilter) -> impl Iterator<Item = &LibraryEntry> {
        self.entries.iter().filter(move |e| filter.matches(e))
    }

    pub fn stats(&self) -> LibraryStats {
        LibraryStats {
            total: self.entries.len(),
            reading: self.entries.iter().filter(|e| e.is_reading()).count(),
            completed: self.entries.iter().filter(|e| e.is_completed()).count(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn percent_rounds_and_clamps() {
        assert_eq!(percent_complete(6, Some(100)), 6);
        assert_eq!(percent_complete(120, Some(300)), 40);
        assert_eq!(percent_complete(1, Some(3)), 33);
        assert_eq!(percent_complete(2, Some(3)), 67);
        assert_eq!(percent_complete(1, Some(200)), 1); // 0.5 rounds up
        assert_eq!(percent_complete(500, Some(100)), 100);
        assert_eq!(percent_complete(10, None), 0);
        assert_eq!(percent_complete(10, Some(0)), 0);
    }

    #[test]
    fn entry_clamps_progress_to_total() {
        let e = LibraryEntry::new(1, Kind::Pdf, 250, Some(180));
        assert_eq!(e.progress(), 180);
        assert!(e.is_completed());

        let e = LibraryEntry::new(1, Kind::Audio, 250, None);
        assert_eq!(e.progress(), 250);
        assert_eq!(e.percent_complete(), 0);
    }

    #[test]
    fn snapshot_stats_and_filters() {
        let snapshot = LibrarySnapshot::new(vec![
            LibraryEntry::new(1, Kind::Pdf, 0, Some(100)),
            LibraryEntry::new(2, Kind::Pdf, 50, Some(100)),
            LibraryEntry::new(2, Kind::Audio, 300, Some(300)),
        ]);
        assert_eq!(
            snapshot.stats(),
            LibraryStats {
                total: 3,
                reading: 1,
                completed: 1
            }
        );
        let reading: Vec<_> = snapshot.filtered(LibraryFilter::Reading).collect();
        assert_eq!(reading.len(), 1);
        assert_eq!(reading[0].book_id(), 2);
        assert_eq!(snapshot.entry(2, Kind::Audio).map(|e| e.progress()), Some(300));
        assert!(snapshot.entry(1, Kind::Audio).is_none());
    }

    #[test]
    fn kind_parses_case_insensitively() {
        assert_eq!("PDF".parse::<Kind>(), Ok(Kind::Pdf));
        assert_eq!("audio".parse::<Kind>(), Ok(Kind::Audio));
        assert!("epub".parse::<Kind>().is_err());
    }
}
