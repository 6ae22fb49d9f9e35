//! Reading progress.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Reading progress of a user on a book.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReadProgress {
    /// Book id.
    pub book_id: String,
    /// User id.
    pub user_id: String,
    /// Last page read (1-indexed).
    pub page: u32,
    /// Whether the book was read to the end.
    pub completed: bool,
    /// Last update time.
    pub updated_at: DateTime<Utc>,
}

impl ReadProgress {
    /// Progress at `page` of a book with `page_count` pages.
    pub fn at_page(book_id: &str, user_id: &str, page: u32, page_count: u32) -> Self {
        Self {
            book_id: book_id.to_string(),
            user_id: user_id.to_string(),
            page,
            completed: page == page_count,
            updated_at: Utc::now(),
        }
    }
}
