use crate::services::{CopyMode, MetadataCapability};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Scheduled before anything else.
pub const HIGHEST_PRIORITY: i32 = 0;
/// Priority of tasks nobody asked to expedite.
pub const DEFAULT_PRIORITY: i32 = 4;
/// Best-effort background work. Cascades never move a task off this value.
pub const LOWEST_PRIORITY: i32 = i32::MAX;

/// Cascade offset running a follow-up ahead of tasks queued at its parent's priority.
pub(crate) const SOONER: i32 = -1;
/// Cascade offset running a follow-up behind tasks queued at its parent's priority.
pub(crate) const LATER: i32 = 1;

/// Priority of a follow-up task enqueued by a task running at `priority`.
///
/// Lower values run first, so a negative `offset` expedites the follow-up.
pub fn cascade_priority(priority: i32, offset: i32) -> i32 {
    if priority == LOWEST_PRIORITY {
        return LOWEST_PRIORITY;
    }
    priority.saturating_add(offset).max(HIGHEST_PRIORITY)
}

/// Unit of background work. Lower priority values run first.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
#[allow(missing_docs)]
pub enum Task {
    ScanLibrary {
        library_id: String,
        priority: i32,
    },
    EmptyTrash {
        library_id: String,
        priority: i32,
    },
    AnalyzeBook {
        book_id: String,
        priority: i32,
    },
    GenerateBookThumbnail {
        book_id: String,
        priority: i32,
    },
    RefreshBookMetadata {
        book_id: String,
        capabilities: Vec<MetadataCapability>,
        priority: i32,
    },
    RefreshSeriesMetadata {
        series_id: String,
        priority: i32,
    },
    AggregateSeriesMetadata {
        series_id: String,
        priority: i32,
    },
    RefreshBookLocalArtwork {
        book_id: String,
        priority: i32,
    },
    RefreshSeriesLocalArtwork {
        series_id: String,
        priority: i32,
    },
    ImportBook {
        series_id: String,
        source_file: PathBuf,
        copy_mode: CopyMode,
        destination_name: Option<String>,
        upgrade_book_id: Option<String>,
        priority: i32,
    },
    ConvertBook {
        book_id: String,
        priority: i32,
    },
    RepairExtension {
        book_id: String,
        priority: i32,
    },
    HashBook {
        book_id: String,
        priority: i32,
    },
    RebuildIndex {
        priority: i32,
    },
}

impl Task {
    /// Scheduling priority.
    pub fn priority(&self) -> i32 {
        match self {
            Task::ScanLibrary { priority, .. }
            | Task::EmptyTrash { priority, .. }
            | Task::AnalyzeBook { priority, .. }
            | Task::GenerateBookThumbnail { priority, .. }
            | Task::RefreshBookMetadata { priority, .. }
            | Task::RefreshSeriesMetadata { priority, .. }
            | Task::AggregateSeriesMetadata { priority, .. }
            | Task::RefreshBookLocalArtwork { priority, .. }
            | Task::RefreshSeriesLocalArtwork { priority, .. }
            | Task::ImportBook { priority, .. }
            | Task::ConvertBook { priority, .. }
            | Task::RepairExtension { priority, .. }
            | Task::HashBook { priority, .. }
            | Task::RebuildIndex { priority } => *priority,
        }
    }

    pub(crate) fn priority_mut(&mut self) -> &mut i32 {
        match self {
            Task::ScanLibrary { priority, .. }
            | Task::EmptyTrash { priority, .. }
            | Task::AnalyzeBook { priority, .. }
            | Task::GenerateBookThumbnail { priority, .. }
            | Task::RefreshBookMetadata { priority, .. }
            | Task::RefreshSeriesMetadata { priority, .. }
            | Task::AggregateSeriesMetadata { priority, .. }
            | Task::RefreshBookLocalArtwork { priority, .. }
            | Task::RefreshSeriesLocalArtwork { priority, .. }
            | Task::ImportBook { priority, .. }
            | Task::ConvertBook { priority, .. }
            | Task::RepairExtension { priority, .. }
            | Task::HashBook { priority, .. }
            | Task::RebuildIndex { priority } => priority,
        }
    }

    /// Kind name for logs.
    pub fn kind(&self) -> &'static str {
        match self {
            Task::ScanLibrary { .. } => "ScanLibrary",
            Task::EmptyTrash { .. } => "EmptyTrash",
            Task::AnalyzeBook { .. } => "AnalyzeBook",
            Task::GenerateBookThumbnail { .. } => "GenerateBookThumbnail",
            Task::RefreshBookMetadata { .. } => "RefreshBookMetadata",
            Task::RefreshSeriesMetadata { .. } => "RefreshSeriesMetadata",
            Task::AggregateSeriesMetadata { .. } => "AggregateSeriesMetadata",
            Task::RefreshBookLocalArtwork { .. } => "RefreshBookLocalArtwork",
            Task::RefreshSeriesLocalArtwork { .. } => "RefreshSeriesLocalArtwork",
            Task::ImportBook { .. } => "ImportBook",
            Task::ConvertBook { .. } => "ConvertBook",
            Task::RepairExtension { .. } => "RepairExtension",
            Task::HashBook { .. } => "HashBook",
            Task::RebuildIndex { .. } => "RebuildIndex",
        }
    }

    /// Id of the entity the task works on.
    pub fn entity_id(&self) -> Option<String> {
        match self {
            Task::ScanLibrary { library_id, .. } | Task::EmptyTrash { library_id, .. } => {
                Some(library_id.clone())
            }
            Task::AnalyzeBook { book_id, .. }
            | Task::GenerateBookThumbnail { book_id, .. }
            | Task::RefreshBookMetadata { book_id, .. }
            | Task::RefreshBookLocalArtwork { book_id, .. }
            | Task::ConvertBook { book_id, .. }
            | Task::RepairExtension { book_id, .. }
            | Task::HashBook { book_id, .. } => Some(book_id.clone()),
            Task::RefreshSeriesMetadata { series_id, .. }
            | Task::AggregateSeriesMetadata { series_id, .. }
            | Task::RefreshSeriesLocalArtwork { series_id, .. } => Some(series_id.clone()),
            Task::ImportBook {
                series_id,
                source_file,
                ..
            } => Some(format!("{}:{}", series_id, source_file.display())),
            Task::RebuildIndex { .. } => None,
        }
    }

    /// Deduplication key: one pending task per kind and entity.
    pub fn unique_key(&self) -> String {
        match self.entity_id() {
            Some(id) => format!("{}:{}", self.kind(), id),
            None => self.kind().to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cascade_priority() {
        assert_eq!(cascade_priority(DEFAULT_PRIORITY, LATER), 5);
        assert_eq!(cascade_priority(DEFAULT_PRIORITY, SOONER), 3);
        assert_eq!(cascade_priority(HIGHEST_PRIORITY, -1), HIGHEST_PRIORITY);
        assert_eq!(cascade_priority(LOWEST_PRIORITY, 1), LOWEST_PRIORITY);
        assert_eq!(cascade_priority(LOWEST_PRIORITY, -1), LOWEST_PRIORITY);
        assert_eq!(cascade_priority(LOWEST_PRIORITY - 1, 1), LOWEST_PRIORITY);
    }

    #[test]
    fn test_unique_key() {
        let analyze = Task::AnalyzeBook {
            book_id: "b1".into(),
            priority: 1,
        };
        let hash = Task::HashBook {
            book_id: "b1".into(),
            priority: 1,
        };
        assert_eq!(analyze.unique_key(), "AnalyzeBook:b1");
        assert_ne!(analyze.unique_key(), hash.unique_key());
        assert_eq!(Task::RebuildIndex { priority: 0 }.unique_key(), "RebuildIndex");
    }

    #[test]
    fn test_serde_tagged() {
        let task = Task::RefreshBookMetadata {
            book_id: "b".into(),
            capabilities: vec![MetadataCapability::Title],
            priority: 5,
        };
        let json = serde_json::to_string(&task).unwrap();
        assert!(json.contains("\"type\":\"RefreshBookMetadata\""));
        assert!(json.contains("\"TITLE\""));
        let back: Task = serde_json::from_str(&json).unwrap();
        assert_eq!(back, task);
        assert_eq!(back.priority(), 5);
    }
}
