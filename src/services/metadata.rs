//! Book and series metadata refresh and aggregation.

use crate::db::Database;
use crate::error::Result;
use crate::events::{DomainEvent, EventSink};
use crate::library::{
    Book, BookMetadata, BookMetadataAggregation, Media, Series, SeriesMetadata,
};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Metadata fields a provider may be allowed to set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MetadataCapability {
    /// Book title.
    Title,
    /// Display number.
    Number,
    /// Numeric sort key.
    NumberSort,
    /// Summary.
    Summary,
    /// Release date.
    ReleaseDate,
    /// Authors.
    Authors,
    /// Tags.
    Tags,
}

impl MetadataCapability {
    /// Every capability.
    pub const ALL: [MetadataCapability; 7] = [
        MetadataCapability::Title,
        MetadataCapability::Number,
        MetadataCapability::NumberSort,
        MetadataCapability::Summary,
        MetadataCapability::ReleaseDate,
        MetadataCapability::Authors,
        MetadataCapability::Tags,
    ];
}

/// Partial book metadata returned by a provider.
#[derive(Debug, Clone, Default, PartialEq)]
#[allow(missing_docs)]
pub struct BookMetadataPatch {
    pub title: Option<String>,
    pub number: Option<String>,
    pub number_sort: Option<f32>,
    pub summary: Option<String>,
    pub release_date: Option<NaiveDate>,
    pub authors: Option<Vec<String>>,
    pub tags: Option<Vec<String>>,
}

impl BookMetadataPatch {
    /// Apply the fields allowed by `capabilities`.
    pub fn apply(self, metadata: &mut BookMetadata, capabilities: &[MetadataCapability]) {
        let allowed = |c: MetadataCapability| capabilities.contains(&c);

        if let Some(title) = self.title.filter(|_| allowed(MetadataCapability::Title)) {
            metadata.title = title;
        }
        if let Some(number) = self.number.filter(|_| allowed(MetadataCapability::Number)) {
            metadata.number = number;
        }
        if let Some(sort) = self
            .number_sort
            .filter(|_| allowed(MetadataCapability::NumberSort))
        {
            metadata.number_sort = sort;
        }
        if let Some(summary) = self.summary.filter(|_| allowed(MetadataCapability::Summary)) {
            metadata.summary = summary;
        }
        if let Some(date) = self
            .release_date
            .filter(|_| allowed(MetadataCapability::ReleaseDate))
        {
            metadata.release_date = Some(date);
        }
        if let Some(authors) = self.authors.filter(|_| allowed(MetadataCapability::Authors)) {
            metadata.authors = authors;
        }
        if let Some(tags) = self.tags.filter(|_| allowed(MetadataCapability::Tags)) {
            metadata.tags = tags;
        }
    }
}

/// Partial series metadata returned by a provider.
#[derive(Debug, Clone, Default, PartialEq)]
#[allow(missing_docs)]
pub struct SeriesMetadataPatch {
    pub title: Option<String>,
    pub title_sort: Option<String>,
    pub summary: Option<String>,
    pub total_book_count: Option<u32>,
}

/// Source of book metadata.
pub trait BookMetadataProvider: Send + Sync {
    /// Provider name for logs.
    fn name(&self) -> &'static str;

    /// Fields this provider can supply.
    fn capabilities(&self) -> &[MetadataCapability];

    /// Metadata for a book, `None` if the provider has nothing to say.
    fn get_book_metadata(&self, book: &Book, media: Option<&Media>) -> Result<Option<BookMetadataPatch>>;
}

/// Source of series metadata.
pub trait SeriesMetadataProvider: Send + Sync {
    /// Provider name for logs.
    fn name(&self) -> &'static str;

    /// Metadata for a series given its live books.
    fn get_series_metadata(&self, series: &Series, books: &[Book]) -> Result<Option<SeriesMetadataPatch>>;
}

fn strip_suffix_ignore_case<'a>(s: &'a str, suffix: &str) -> Option<&'a str> {
    let cut = s.len().checked_sub(suffix.len())?;
    (s.is_char_boundary(cut) && s[cut..].eq_ignore_ascii_case(suffix)).then(|| &s[..cut])
}

/// Split a file name like "Series v01", "Series #12" or "Series - 3" into
/// title and number.
pub(crate) fn parse_title_number(name: &str) -> Option<(String, f32)> {
    let trimmed = name.trim();
    let digits_start = trimmed
        .char_indices()
        .rev()
        .take_while(|(_, c)| c.is_ascii_digit() || *c == '.')
        .last()
        .map(|(i, _)| i)?;
    let number: f32 = trimmed[digits_start..].trim_matches('.').parse().ok()?;

    let mut title = &trimmed[..digits_start];
    for marker in ["vol.", "vol", "v", "#"] {
        if let Some(rest) = strip_suffix_ignore_case(title, marker)
            && (rest.is_empty() || rest.ends_with(char::is_whitespace))
        {
            title = rest;
            break;
        }
    }
    title = title.trim_end();
    for marker in [" -", " #", " vol.", " vol"] {
        if let Some(rest) = strip_suffix_ignore_case(title, marker) {
            title = rest.trim_end();
            break;
        }
    }

    (!title.is_empty()).then(|| (title.to_string(), number))
}

fn format_number(number: f32) -> String {
    if number.fract() == 0.0 {
        format!("{}", number as i64)
    } else {
        number.to_string()
    }
}

/// Book metadata derived from the file name.
#[derive(Debug, Default, Clone, Copy)]
pub struct FilenameMetadataProvider;

impl BookMetadataProvider for FilenameMetadataProvider {
    fn name(&self) -> &'static str {
        "filename"
    }

    fn capabilities(&self) -> &[MetadataCapability] {
        &[
            MetadataCapability::Title,
            MetadataCapability::Number,
            MetadataCapability::NumberSort,
        ]
    }

    fn get_book_metadata(&self, book: &Book, _media: Option<&Media>) -> Result<Option<BookMetadataPatch>> {
        let number = parse_title_number(&book.name)
            .map(|(_, n)| n)
            .unwrap_or(book.number as f32);

        Ok(Some(BookMetadataPatch {
            title: Some(book.name.clone()),
            number: Some(format_number(number)),
            number_sort: Some(number),
            ..Default::default()
        }))
    }
}

/// Series metadata derived from the folder.
#[derive(Debug, Default, Clone, Copy)]
pub struct FolderMetadataProvider;

impl SeriesMetadataProvider for FolderMetadataProvider {
    fn name(&self) -> &'static str {
        "folder"
    }

    fn get_series_metadata(&self, series: &Series, books: &[Book]) -> Result<Option<SeriesMetadataPatch>> {
        let name = series.name.as_str();
        let title_sort = name
            .strip_prefix("The ")
            .or_else(|| name.strip_prefix("the "))
            .unwrap_or(name)
            .to_string();

        Ok(Some(SeriesMetadataPatch {
            title: Some(series.name.clone()),
            title_sort: Some(title_sort),
            summary: None,
            total_book_count: Some(books.len() as u32),
        }))
    }
}

/// Refreshes metadata with the configured providers.
#[derive(Clone)]
pub struct MetadataLifecycle {
    db: Database,
    events: Arc<dyn EventSink>,
    book_providers: Vec<Arc<dyn BookMetadataProvider>>,
    series_providers: Vec<Arc<dyn SeriesMetadataProvider>>,
}

impl MetadataLifecycle {
    /// Create a lifecycle with the built-in file name and folder providers.
    pub fn new(db: Database, events: Arc<dyn EventSink>) -> Self {
        Self {
            db,
            events,
            book_providers: vec![Arc::new(FilenameMetadataProvider)],
            series_providers: vec![Arc::new(FolderMetadataProvider)],
        }
    }

    /// Add a book provider, applied after the existing ones.
    pub fn with_book_provider(mut self, provider: Arc<dyn BookMetadataProvider>) -> Self {
        self.book_providers.push(provider);
        self
    }

    /// Refresh book metadata, restricted to `capabilities`.
    pub fn refresh_book_metadata(
        &self,
        book: &Book,
        capabilities: &[MetadataCapability],
    ) -> Result<()> {
        tracing::info!(book_id = %book.id, "Refreshing book metadata");
        let media = self.db.get_media(&book.id)?;
        let current = self
            .db
            .get_book_metadata(&book.id)?
            .unwrap_or_else(|| BookMetadata::for_book(book));

        let mut metadata = current.clone();
        for provider in &self.book_providers {
            let allowed: Vec<MetadataCapability> = provider
                .capabilities()
                .iter()
                .copied()
                .filter(|c| capabilities.contains(c))
                .collect();
            if allowed.is_empty() {
                continue;
            }

            match provider.get_book_metadata(book, media.as_ref()) {
                Ok(Some(patch)) => patch.apply(&mut metadata, &allowed),
                Ok(None) => {}
                Err(e) => {
                    tracing::error!(book_id = %book.id, provider = provider.name(), error = %e, "Metadata provider failed");
                }
            }
        }

        if metadata != current {
            self.db.save_book_metadata(&metadata)?;
            self.events.publish(DomainEvent::BookUpdated(book.clone()));
        }
        Ok(())
    }

    /// Refresh series metadata.
    pub fn refresh_series_metadata(&self, series: &Series) -> Result<()> {
        tracing::info!(series_id = %series.id, "Refreshing series metadata");
        let books = self.db.get_series_books(&series.id)?;
        let stored = self.db.get_series_metadata(&series.id)?;
        let current = stored.clone().unwrap_or_else(|| SeriesMetadata {
            series_id: series.id.clone(),
            title: series.name.clone(),
            title_sort: series.name.clone(),
            ..Default::default()
        });

        let mut metadata = current.clone();
        for provider in &self.series_providers {
            match provider.get_series_metadata(series, &books) {
                Ok(Some(patch)) => {
                    if let Some(title) = patch.title {
                        metadata.title = title;
                    }
                    if let Some(title_sort) = patch.title_sort {
                        metadata.title_sort = title_sort;
                    }
                    if let Some(summary) = patch.summary {
                        metadata.summary = summary;
                    }
                    if patch.total_book_count.is_some() {
                        metadata.total_book_count = patch.total_book_count;
                    }
                }
                Ok(None) => {}
                Err(e) => {
                    tracing::error!(series_id = %series.id, provider = provider.name(), error = %e, "Metadata provider failed");
                }
            }
        }

        if stored.is_none() || metadata != current {
            self.db.save_series_metadata(&metadata)?;
            self.events.publish(DomainEvent::SeriesUpdated(series.clone()));
        }
        Ok(())
    }

    /// Compute and store the metadata aggregated from a series' books.
    pub fn aggregate_series_metadata(&self, series: &Series) -> Result<BookMetadataAggregation> {
        let mut metadata = self.db.get_series_book_metadata(&series.id)?;
        metadata.sort_by(|a, b| a.number_sort.total_cmp(&b.number_sort));

        let mut aggregation = BookMetadataAggregation {
            series_id: series.id.clone(),
            ..Default::default()
        };
        for book in &metadata {
            for author in &book.authors {
                if !aggregation.authors.contains(author) {
                    aggregation.authors.push(author.clone());
                }
            }
            for tag in &book.tags {
                if !aggregation.tags.contains(tag) {
                    aggregation.tags.push(tag.clone());
                }
            }
        }
        aggregation.tags.sort();
        aggregation.release_date = metadata.iter().filter_map(|m| m.release_date).min();
        if let Some(first) = metadata.iter().find(|m| !m.summary.trim().is_empty()) {
            aggregation.summary = first.summary.clone();
            aggregation.summary_number = first.number.clone();
        }

        self.db.save_aggregation(&aggregation)?;
        self.events.publish(DomainEvent::SeriesUpdated(series.clone()));
        Ok(aggregation)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_title_number() {
        assert_eq!(
            parse_title_number("One Piece v01"),
            Some(("One Piece".to_string(), 1.0))
        );
        assert_eq!(
            parse_title_number("Spider-Man #123"),
            Some(("Spider-Man".to_string(), 123.0))
        );
        assert_eq!(
            parse_title_number("Batman - 3"),
            Some(("Batman".to_string(), 3.0))
        );
        assert_eq!(
            parse_title_number("Saga Vol.2.5"),
            Some(("Saga".to_string(), 2.5))
        );
        assert_eq!(
            parse_title_number("Kiev3"),
            Some(("Kiev".to_string(), 3.0))
        );
        assert_eq!(parse_title_number("No Number"), None);
        assert_eq!(parse_title_number("042"), None);
    }

    #[test]
    fn test_patch_respects_capabilities() {
        let mut metadata = BookMetadata {
            title: "old".into(),
            number: "1".into(),
            ..Default::default()
        };
        let patch = BookMetadataPatch {
            title: Some("new".into()),
            number: Some("2".into()),
            ..Default::default()
        };
        patch.apply(&mut metadata, &[MetadataCapability::Number]);

        assert_eq!(metadata.title, "old");
        assert_eq!(metadata.number, "2");
    }

    #[test]
    fn test_format_number() {
        assert_eq!(format_number(3.0), "3");
        assert_eq!(format_number(1.5), "1.5");
    }
}
