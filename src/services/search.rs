//! In-memory title search over books and series.

use crate::db::Database;
use crate::error::Result;
use parking_lot::RwLock;
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use std::time::Instant;

/// Kind of a search hit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SearchKind {
    /// A book.
    Book,
    /// A series.
    Series,
}

/// One indexed document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SearchEntry {
    /// Document kind.
    pub kind: SearchKind,
    /// Book or series id.
    pub id: String,
    /// Indexed title.
    pub title: String,
}

#[derive(Default)]
struct Index {
    entries: Vec<SearchEntry>,
    tokens: BTreeMap<String, BTreeSet<usize>>,
}

fn tokenize(text: &str) -> impl Iterator<Item = String> + '_ {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(str::to_lowercase)
}

impl Index {
    fn add(&mut self, entry: SearchEntry) {
        let position = self.entries.len();
        for token in tokenize(&entry.title) {
            self.tokens.entry(token).or_default().insert(position);
        }
        self.entries.push(entry);
    }

    fn matching(&self, prefix: &str) -> BTreeSet<usize> {
        self.tokens
            .range(prefix.to_string()..)
            .take_while(|(token, _)| token.starts_with(prefix))
            .flat_map(|(_, ids)| ids.iter().copied())
            .collect()
    }
}

/// Token index rebuilt from the database on demand.
#[derive(Clone)]
pub struct SearchIndex {
    db: Database,
    index: Arc<RwLock<Index>>,
}

impl SearchIndex {
    /// Create an empty index.
    pub fn new(db: Database) -> Self {
        Self {
            db,
            index: Arc::new(RwLock::new(Index::default())),
        }
    }

    /// Rebuild from live books and series. Returns the number of documents.
    pub fn rebuild(&self) -> Result<usize> {
        let start = Instant::now();
        let mut index = Index::default();

        for series in self.db.get_all_series()? {
            if series.deleted_date.is_some() {
                continue;
            }
            let title = self
                .db
                .get_series_metadata(&series.id)?
                .map(|m| m.title)
                .filter(|t| !t.trim().is_empty())
                .unwrap_or(series.name);
            index.add(SearchEntry {
                kind: SearchKind::Series,
                id: series.id,
                title,
            });
        }

        for book in self.db.get_all_books()? {
            if book.is_deleted() {
                continue;
            }
            let title = self
                .db
                .get_book_metadata(&book.id)?
                .map(|m| m.title)
                .filter(|t| !t.trim().is_empty())
                .unwrap_or(book.name);
            index.add(SearchEntry {
                kind: SearchKind::Book,
                id: book.id,
                title,
            });
        }

        let count = index.entries.len();
        *self.index.write() = index;
        tracing::info!(documents = count, elapsed = ?start.elapsed(), "Rebuilt search index");
        Ok(count)
    }

    /// Entries whose title has a token starting with every query term.
    pub fn search(&self, query: &str) -> Vec<SearchEntry> {
        let index = self.index.read();
        let mut hits: Option<BTreeSet<usize>> = None;
        for term in tokenize(query) {
            let matching = index.matching(&term);
            hits = Some(match hits {
                Some(previous) => previous.intersection(&matching).copied().collect(),
                None => matching,
            });
        }

        let mut results: Vec<SearchEntry> = hits
            .unwrap_or_default()
            .into_iter()
            .filter_map(|i| index.entries.get(i).cloned())
            .collect();
        results.sort_by(|a, b| a.title.to_lowercase().cmp(&b.title.to_lowercase()));
        results
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::library::{Book, Library, Series};

    #[test]
    fn test_tokenize() {
        let tokens: Vec<String> = tokenize("Spider-Man #12: Home").collect();
        assert_eq!(tokens, vec!["spider", "man", "12", "home"]);
    }

    #[test]
    fn test_search_matches_prefixes_of_all_terms() {
        let db = Database::open_memory().unwrap();
        let library = Library::new("comics", "/lib".into());
        db.create_library(&library).unwrap();
        let series = Series::new("/lib/Saga".into(), &library.id);
        db.insert_series(&series).unwrap();
        db.insert_books(&[
            Book::new("/lib/Saga/Saga 01.cbz".into(), &library.id, &series.id),
            Book::new("/lib/Saga/Paper Girls 01.cbz".into(), &library.id, &series.id),
        ])
        .unwrap();

        let index = SearchIndex::new(db);
        assert!(index.search("saga").is_empty());
        assert_eq!(index.rebuild().unwrap(), 3);

        let hits = index.search("sag");
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].kind, SearchKind::Series);
        assert_eq!(hits[1].title, "Saga 01");

        let hits = index.search("paper 01");
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].title, "Paper Girls 01");

        assert!(index.search("").is_empty());
        assert!(index.search("batman").is_empty());
    }
}
