//! Application state shared across handlers.

use crate::config::Config;
use crate::db::Database;
use crate::error::{AppError, Result};
use crate::library::{Book, Library};
use crate::services::Services;
use crate::tasks::TaskQueue;
use std::sync::Arc;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    /// Application configuration.
    pub config: Arc<Config>,
    /// Database connection.
    pub db: Database,
    /// Domain services.
    pub services: Services,
    /// Pending background tasks.
    pub queue: Arc<TaskQueue>,
}

impl AppState {
    /// Create the state.
    pub fn new(config: Config, db: Database, services: Services, queue: Arc<TaskQueue>) -> Self {
        Self {
            config: Arc::new(config),
            db,
            services,
            queue,
        }
    }

    /// Live book by id.
    pub fn get_book(&self, id: &str) -> Result<Book> {
        self.db
            .get_book(id)?
            .filter(|b| !b.is_deleted())
            .ok_or_else(|| AppError::NotFound(format!("Book not found: {}", id)))
    }

    /// Library by id.
    pub fn get_library(&self, id: &str) -> Result<Library> {
        self.db
            .get_library(id)?
            .ok_or_else(|| AppError::NotFound(format!("Library not found: {}", id)))
    }

    /// Run blocking work (file I/O, codecs, storage) off the async runtime.
    pub async fn blocking<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(AppState) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let state = self.clone();
        tokio::task::spawn_blocking(move || f(state))
            .await
            .map_err(|e| AppError::Internal(format!("Blocking task failed: {}", e)))?
    }
}
