use clap::{Parser, Subcommand};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::PathBuf;

/// Self-hosted comics library server.
#[derive(Parser, Debug, Clone)]
#[command(name = "shelf-rs")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Path to config file.
    #[arg(short, long, env = "SHELF_CONFIG", global = true)]
    pub config: Option<PathBuf>,

    /// Subcommand to run.
    #[command(subcommand)]
    pub command: Option<Command>,
}

/// CLI subcommands.
#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Start the server and task workers (default if no command given).
    Serve {
        /// Address to bind the server to.
        #[arg(short, long)]
        bind: Option<SocketAddr>,
    },

    /// Library management commands.
    Library {
        /// Library subcommand action.
        #[command(subcommand)]
        action: LibraryCommand,
    },

    /// Search index commands.
    Index {
        /// Index subcommand action.
        #[command(subcommand)]
        action: IndexCommand,
    },

    /// Initialize database and create default config.
    Init {
        /// Force overwrite existing config.
        #[arg(short, long)]
        force: bool,
    },
}

/// Library management subcommands.
#[derive(Subcommand, Debug, Clone)]
pub enum LibraryCommand {
    /// Add a new library.
    Add {
        /// Library name.
        name: String,
        /// Path to library directory.
        #[arg(short, long)]
        path: PathBuf,
        /// Rename files whose extension does not match their content.
        #[arg(long)]
        repair_extensions: bool,
        /// Convert image-only books to CBZ.
        #[arg(long)]
        convert_to_cbz: bool,
        /// Skip sidecar thumbnail import.
        #[arg(long)]
        no_local_artwork: bool,
    },

    /// Remove a library and all of its books.
    Del {
        /// Library name.
        name: String,
    },

    /// List all libraries.
    List,

    /// Scan libraries and run the resulting tasks to completion.
    Scan {
        /// Specific library name (all libraries when omitted).
        name: Option<String>,
    },

    /// Purge soft-deleted books and series.
    EmptyTrash {
        /// Library name.
        name: String,
    },
}

/// Search index subcommands.
#[derive(Subcommand, Debug, Clone)]
pub enum IndexCommand {
    /// Rebuild the search index and run a query against it.
    Rebuild {
        /// Optional query to run after rebuilding.
        query: Option<String>,
    },
}

/// Main configuration from TOML file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Server configuration.
    #[serde(default)]
    pub server: ServerConfig,

    /// Database configuration.
    #[serde(default)]
    pub database: DatabaseConfig,

    /// Task worker configuration.
    #[serde(default)]
    pub tasks: TaskConfig,

    /// Scan configuration.
    #[serde(default)]
    pub scan: ScanConfig,

    /// Thumbnail configuration.
    #[serde(default)]
    pub thumbnails: ThumbnailConfig,
}

/// Server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Address to bind to.
    #[serde(default = "default_bind")]
    pub bind: SocketAddr,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
        }
    }
}

fn default_bind() -> SocketAddr {
    SocketAddr::new(
        std::net::IpAddr::V4(std::net::Ipv4Addr::new(0, 0, 0, 0)),
        8080,
    )
}

/// Database configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// Path to SQLite database file.
    #[serde(default = "default_db_path")]
    pub path: PathBuf,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
        }
    }
}

fn default_db_path() -> PathBuf {
    PathBuf::from("data/shelf.db")
}

/// Task worker configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskConfig {
    /// Consumer slots per priority band.
    #[serde(default = "default_task_workers")]
    pub workers: usize,

    /// Inclusive priority bands, one consumer group each. Empty means one
    /// group consuming every priority.
    #[serde(default)]
    pub priority_bands: Vec<[i32; 2]>,
}

impl Default for TaskConfig {
    fn default() -> Self {
        Self {
            workers: default_task_workers(),
            priority_bands: Vec::new(),
        }
    }
}

fn default_task_workers() -> usize {
    2
}

/// Scan configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanConfig {
    /// Rescan interval in seconds (0 to disable).
    #[serde(default = "default_scan_interval")]
    pub interval_seconds: u64,

    /// Compute content hashes for books.
    #[serde(default = "default_file_hashing")]
    pub file_hashing: bool,

    /// Number of parallel workers used to stat files (1 = sequential).
    /// Keep low for NAS/network storage to avoid saturation.
    #[serde(default = "default_scan_workers")]
    pub workers: usize,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            interval_seconds: default_scan_interval(),
            file_hashing: default_file_hashing(),
            workers: default_scan_workers(),
        }
    }
}

fn default_scan_interval() -> u64 {
    3600
}

fn default_file_hashing() -> bool {
    true
}

fn default_scan_workers() -> usize {
    1 // Sequential by default - safe for NAS/Raspberry Pi
}

/// Thumbnail configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ThumbnailConfig {
    /// Maximum dimension of generated thumbnails in pixels.
    #[serde(default = "default_thumbnail_size")]
    pub size: u32,
}

impl Default for ThumbnailConfig {
    fn default() -> Self {
        Self {
            size: default_thumbnail_size(),
        }
    }
}

fn default_thumbnail_size() -> u32 {
    300
}

impl Config {
    /// Load configuration from file.
    pub fn load(path: &PathBuf) -> crate::error::Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            crate::error::AppError::Config(format!("Failed to read config file: {}", e))
        })?;

        toml::from_str(&content).map_err(|e| {
            crate::error::AppError::Config(format!("Failed to parse config file: {}", e))
        })
    }

    /// Find config file in default locations.
    pub fn find_config_file() -> Option<PathBuf> {
        let candidates = [
            PathBuf::from("config.toml"),
            PathBuf::from("shelf-rs.toml"),
            dirs::config_dir()
                .map(|p| p.join("shelf-rs").join("config.toml"))
                .unwrap_or_default(),
            PathBuf::from("/etc/shelf-rs/config.toml"),
        ];

        candidates.into_iter().find(|p| p.exists())
    }

    /// Generate default config file content.
    pub fn generate_default() -> String {
        r#"# shelf-rs configuration

[server]
bind = "0.0.0.0:8080"

[database]
# path = "/var/lib/shelf-rs/shelf.db"

[tasks]
# Consumer slots per priority band
workers = 2
# Optional inclusive priority bands, lower runs first.
# Example: interactive work on its own slots, background work on others.
# priority_bands = [[0, 5], [6, 2147483647]]

[scan]
# Rescan interval in seconds (0 to disable)
interval_seconds = 3600
# Compute content hashes of books
file_hashing = true
workers = 1

[thumbnails]
size = 300
"#
        .to_string()
    }
}

/// Supported book formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BookFormat {
    /// CBZ format (Comic Book ZIP archive).
    Cbz,
    /// Plain ZIP archive.
    Zip,
    /// CBR format (Comic Book RAR archive).
    Cbr,
    /// Plain RAR archive.
    Rar,
    /// CB7 format (Comic Book 7-Zip archive).
    Cb7,
    /// Plain 7-Zip archive.
    SevenZip,
    /// EPUB format (Electronic Publication).
    Epub,
    /// PDF format (Portable Document Format).
    Pdf,
}

impl BookFormat {
    /// Get the MIME type for this format.
    pub fn mime_type(&self) -> &'static str {
        match self {
            BookFormat::Cbz | BookFormat::Zip => "application/zip",
            BookFormat::Cbr | BookFormat::Rar => "application/x-rar-compressed",
            BookFormat::Cb7 | BookFormat::SevenZip => "application/x-7z-compressed",
            BookFormat::Epub => "application/epub+zip",
            BookFormat::Pdf => "application/pdf",
        }
    }

    /// Try to detect format from file extension.
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_lowercase().as_str() {
            "cbz" => Some(BookFormat::Cbz),
            "zip" => Some(BookFormat::Zip),
            "cbr" => Some(BookFormat::Cbr),
            "rar" => Some(BookFormat::Rar),
            "cb7" => Some(BookFormat::Cb7),
            "7z" => Some(BookFormat::SevenZip),
            "epub" => Some(BookFormat::Epub),
            "pdf" => Some(BookFormat::Pdf),
            _ => None,
        }
    }

    /// Check if this format is a comic book archive.
    pub fn is_comic(&self) -> bool {
        matches!(self, BookFormat::Cbz | BookFormat::Cbr | BookFormat::Cb7)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_config_uses_defaults() {
        let config: Config = toml::from_str("").unwrap();
        assert_eq!(config.tasks.workers, 2);
        assert!(config.tasks.priority_bands.is_empty());
        assert!(config.scan.file_hashing);
        assert_eq!(config.thumbnails.size, 300);
    }

    #[test]
    fn test_generated_default_config_parses() {
        let config: Config = toml::from_str(&Config::generate_default()).unwrap();
        assert_eq!(config.server.bind.port(), 8080);
        assert_eq!(config.scan.interval_seconds, 3600);
    }

    #[test]
    fn test_priority_bands_parse() {
        let config: Config = toml::from_str("[tasks]\npriority_bands = [[0, 5], [6, 10]]").unwrap();
        assert_eq!(config.tasks.priority_bands, vec![[0, 5], [6, 10]]);
    }

    #[test]
    fn test_format_from_extension() {
        assert_eq!(BookFormat::from_extension("CBZ"), Some(BookFormat::Cbz));
        assert_eq!(BookFormat::from_extension("7z"), Some(BookFormat::SevenZip));
        assert_eq!(BookFormat::from_extension("mobi"), None);
        assert!(BookFormat::Cbr.is_comic());
        assert!(!BookFormat::Epub.is_comic());
    }
}
