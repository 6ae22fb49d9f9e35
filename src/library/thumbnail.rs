//! Thumbnail records for books and series.

use crate::error::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use uuid::Uuid;

/// Entity a thumbnail belongs to.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "lowercase")]
pub enum ThumbnailOwner {
    /// A book.
    Book(String),
    /// A series.
    Series(String),
}

impl ThumbnailOwner {
    /// Storage discriminator.
    pub fn kind_str(&self) -> &'static str {
        match self {
            ThumbnailOwner::Book(_) => "book",
            ThumbnailOwner::Series(_) => "series",
        }
    }

    /// Owner id.
    pub fn id(&self) -> &str {
        match self {
            ThumbnailOwner::Book(id) | ThumbnailOwner::Series(id) => id,
        }
    }

    /// Rebuild from storage columns.
    pub fn from_parts(kind: &str, id: String) -> Option<Self> {
        match kind {
            "book" => Some(ThumbnailOwner::Book(id)),
            "series" => Some(ThumbnailOwner::Series(id)),
            _ => None,
        }
    }
}

impl fmt::Display for ThumbnailOwner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.kind_str(), self.id())
    }
}

/// Origin of a thumbnail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ThumbnailKind {
    /// Rendered from the first page.
    Generated,
    /// Image file stored next to the media.
    Sidecar,
    /// Uploaded by a user.
    UserUploaded,
}

impl ThumbnailKind {
    /// Storage representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            ThumbnailKind::Generated => "GENERATED",
            ThumbnailKind::Sidecar => "SIDECAR",
            ThumbnailKind::UserUploaded => "USER_UPLOADED",
        }
    }
}

impl FromStr for ThumbnailKind {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "GENERATED" => Ok(ThumbnailKind::Generated),
            "SIDECAR" => Ok(ThumbnailKind::Sidecar),
            "USER_UPLOADED" => Ok(ThumbnailKind::UserUploaded),
            other => Err(format!("unknown thumbnail kind: {}", other)),
        }
    }
}

/// Selection policy applied when adding a thumbnail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MarkSelected {
    /// Always select the new thumbnail.
    Yes,
    /// Select only when nothing, or a generated thumbnail, is selected.
    IfNoneOrGenerated,
    /// Never select the new thumbnail.
    No,
}

/// A thumbnail with either inline bytes or a file reference.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Thumbnail {
    /// Unique identifier.
    pub id: String,
    /// Owning entity.
    pub owner: ThumbnailOwner,
    /// Origin.
    pub kind: ThumbnailKind,
    /// Whether this is the thumbnail shown for the owner.
    pub selected: bool,
    /// Inline image bytes.
    #[serde(skip)]
    pub data: Option<Vec<u8>>,
    /// File reference.
    pub url: Option<PathBuf>,
    /// Image media type.
    pub media_type: String,
    /// Creation time.
    pub created_at: DateTime<Utc>,
}

impl Thumbnail {
    fn new(
        owner: ThumbnailOwner,
        kind: ThumbnailKind,
        data: Option<Vec<u8>>,
        url: Option<PathBuf>,
        media_type: &str,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            owner,
            kind,
            selected: false,
            data,
            url,
            media_type: media_type.to_string(),
            created_at: Utc::now(),
        }
    }

    /// Thumbnail rendered from a book's content.
    pub fn generated(owner: ThumbnailOwner, data: Vec<u8>, media_type: &str) -> Self {
        Self::new(owner, ThumbnailKind::Generated, Some(data), None, media_type)
    }

    /// Thumbnail referencing a sidecar file.
    pub fn sidecar(owner: ThumbnailOwner, url: PathBuf, media_type: &str) -> Self {
        Self::new(owner, ThumbnailKind::Sidecar, None, Some(url), media_type)
    }

    /// Thumbnail uploaded by a user.
    pub fn uploaded(owner: ThumbnailOwner, data: Vec<u8>, media_type: &str) -> Self {
        Self::new(owner, ThumbnailKind::UserUploaded, Some(data), None, media_type)
    }

    /// Whether the referenced bytes are still reachable.
    pub fn exists(&self) -> bool {
        if self.data.is_some() {
            return true;
        }
        self.url.as_ref().is_some_and(|p| p.is_file())
    }

    /// Read the thumbnail bytes.
    pub fn bytes(&self) -> Result<Option<Vec<u8>>> {
        if let Some(data) = &self.data {
            return Ok(Some(data.clone()));
        }
        match &self.url {
            Some(path) => Ok(Some(std::fs::read(path)?)),
            None => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_inline_thumbnail_always_exists() {
        let t = Thumbnail::generated(ThumbnailOwner::Book("b".into()), vec![1, 2], "image/jpeg");
        assert!(t.exists());
        assert!(!t.selected);
        assert_eq!(t.bytes().unwrap(), Some(vec![1, 2]));
    }

    #[test]
    fn test_sidecar_thumbnail_exists_follows_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cover.jpg");
        let t = Thumbnail::sidecar(ThumbnailOwner::Series("s".into()), path.clone(), "image/jpeg");
        assert!(!t.exists());

        std::fs::write(&path, b"jpg").unwrap();
        assert!(t.exists());
    }

    #[test]
    fn test_owner_from_parts() {
        assert_eq!(
            ThumbnailOwner::from_parts("series", "x".into()),
            Some(ThumbnailOwner::Series("x".into()))
        );
        assert_eq!(ThumbnailOwner::from_parts("user", "x".into()), None);
    }
}
