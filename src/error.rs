use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use std::path::PathBuf;
use thiserror::Error;

/// Stable code reported when a book file cannot be accessed for deletion.
pub const ERR_FILE_NOT_ACCESSIBLE: &str = "ERR_1018";

/// Main error type for the application.
#[derive(Error, Debug)]
pub enum AppError {
    /// Resource not found error.
    #[error("Not found: {0}")]
    NotFound(String),

    /// Page requested before the book's media reached READY.
    #[error("Media not ready for book {0}")]
    MediaNotReady(String),

    /// Page number outside `[1, count]`.
    #[error("Page {page} out of range, book has {count} pages")]
    PageOutOfRange {
        /// Requested page (1-indexed).
        page: u32,
        /// Number of pages in the book.
        count: u32,
    },

    /// Image conversion could not be performed.
    #[error("Image conversion failed: {0}")]
    Conversion(#[from] ConversionFailure),

    /// Book file missing or not writable.
    #[error("[{code}] File is not accessible: {}", .path.display())]
    FileAccess {
        /// Stable error code.
        code: &'static str,
        /// Offending path.
        path: PathBuf,
    },

    /// Invalid argument passed to an operation.
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// Invalid format error.
    #[error("Invalid format: {0}")]
    InvalidFormat(String),

    /// I/O error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// ZIP archive error.
    #[error("ZIP error: {0}")]
    Zip(#[from] zip::result::ZipError),

    /// Image processing error.
    #[error("Image processing error: {0}")]
    Image(#[from] image::ImageError),

    /// Database error.
    #[error("Database error: {0}")]
    Database(String),

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Internal server error.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Reason an image conversion was refused or failed.
#[derive(Error, Debug)]
pub enum ConversionFailure {
    /// Source media type cannot be decoded.
    #[error("{context}: unsupported read format {media_type}")]
    UnsupportedRead {
        /// Description of the attempted conversion.
        context: String,
        /// Source media type.
        media_type: String,
    },

    /// Target media type cannot be encoded.
    #[error("{context}: unsupported write format {media_type}")]
    UnsupportedWrite {
        /// Description of the attempted conversion.
        context: String,
        /// Target media type.
        media_type: String,
    },

    /// Decoder or encoder failure.
    #[error("{context}: {message}")]
    Codec {
        /// Description of the attempted conversion.
        context: String,
        /// Underlying codec message.
        message: String,
    },
}

impl AppError {
    /// Shorthand for a database error with context.
    pub fn db(context: &str, err: rusqlite::Error) -> Self {
        AppError::Database(format!("{}: {}", context, err))
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = match &self {
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::MediaNotReady(_) => StatusCode::NOT_FOUND,
            AppError::PageOutOfRange { .. } => StatusCode::BAD_REQUEST,
            AppError::Conversion(ConversionFailure::Codec { .. }) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
            AppError::Conversion(_) => StatusCode::UNSUPPORTED_MEDIA_TYPE,
            AppError::FileAccess { .. } => StatusCode::CONFLICT,
            AppError::InvalidArgument(_) | AppError::InvalidFormat(_) => StatusCode::BAD_REQUEST,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };

        tracing::error!(error = %self, "Request error");

        (status, self.to_string()).into_response()
    }
}

/// Result type alias for the application.
pub type Result<T> = std::result::Result<T, AppError>;
