mod books;
mod media;
mod progress;
mod schema;
mod thumbnails;

pub use schema::Database;

use chrono::{DateTime, NaiveDate, Utc};

/// Book row joined with its media status, used to select task candidates.
#[derive(Debug, Clone)]
pub struct BookMediaSummary {
    /// The book.
    pub book: crate::library::Book,
    /// Media status.
    pub status: crate::library::MediaStatus,
    /// Container media type, if analyzed.
    pub media_type: Option<String>,
}

/// Timestamp helper.
pub fn now_timestamp() -> i64 {
    Utc::now().timestamp()
}

/// Convert timestamp to DateTime.
pub fn timestamp_to_datetime(ts: i64) -> DateTime<Utc> {
    DateTime::from_timestamp(ts, 0).unwrap_or_else(Utc::now)
}

fn date_to_string(date: Option<NaiveDate>) -> Option<String> {
    date.map(|d| d.format("%Y-%m-%d").to_string())
}

fn string_to_date(value: Option<String>) -> Option<NaiveDate> {
    value.and_then(|v| NaiveDate::parse_from_str(&v, "%Y-%m-%d").ok())
}

fn list_to_json(values: &[String]) -> String {
    serde_json::to_string(values).unwrap_or_else(|_| "[]".to_string())
}

fn json_to_list(value: Option<String>) -> Vec<String> {
    value
        .and_then(|j| serde_json::from_str::<Vec<String>>(&j).ok())
        .unwrap_or_default()
}
