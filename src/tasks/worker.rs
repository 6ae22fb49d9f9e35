use super::handler::TaskHandler;
use super::queue::{TaskQueue, TaskSelector, uncovered_bands};
use crate::config::TaskConfig;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Fixed pool of consumer slots pulling from a [`TaskQueue`].
pub struct TaskWorkers {
    handles: Vec<JoinHandle<()>>,
}

/// One selector per configured band. Priorities left out of every band get
/// their own group so queued work never starves.
fn selectors(config: &TaskConfig) -> Vec<TaskSelector> {
    if config.priority_bands.is_empty() {
        return vec![TaskSelector::all()];
    }

    let mut selectors: Vec<TaskSelector> = config
        .priority_bands
        .iter()
        .map(|[min, max]| TaskSelector::band(*min, *max))
        .collect();
    for gap in uncovered_bands(&selectors) {
        tracing::warn!(band = ?gap, "Priority band not covered by configuration, adding a consumer group");
        selectors.push(gap);
    }
    selectors
}

async fn consume(
    slot: usize,
    selector: TaskSelector,
    queue: Arc<TaskQueue>,
    handler: TaskHandler,
    shutdown: CancellationToken,
) {
    tracing::debug!(slot, ?selector, "Task worker started");
    loop {
        let task = tokio::select! {
            _ = shutdown.cancelled() => break,
            task = queue.take(&selector) => task,
        };

        let handler = handler.clone();
        let kind = task.kind();
        // Blocking work runs off the async runtime; a panic only loses this task.
        if let Err(e) = tokio::task::spawn_blocking(move || handler.handle_task(&task)).await {
            tracing::error!(slot, task = kind, error = %e, "Task worker panicked");
        }
    }
    tracing::debug!(slot, "Task worker stopped");
}

impl TaskWorkers {
    /// Spawn `config.workers` slots per priority band.
    pub fn start(
        queue: Arc<TaskQueue>,
        handler: TaskHandler,
        config: &TaskConfig,
        shutdown: CancellationToken,
    ) -> Self {
        let slots = config.workers.max(1);
        let mut handles = Vec::new();
        for selector in selectors(config) {
            for _ in 0..slots {
                let slot = handles.len();
                handles.push(tokio::spawn(consume(
                    slot,
                    selector,
                    queue.clone(),
                    handler.clone(),
                    shutdown.clone(),
                )));
            }
        }
        tracing::info!(workers = handles.len(), "Task workers started");
        Self { handles }
    }

    /// Wait for every slot to stop after shutdown.
    pub async fn join(self) {
        for handle in self.handles {
            if let Err(e) = handle.await {
                tracing::error!(error = %e, "Task worker terminated abnormally");
            }
        }
    }
}

/// Run the queue to exhaustion on the current thread, follow-ups included.
///
/// Returns the number of tasks handled.
pub fn drain_blocking(queue: &TaskQueue, handler: &TaskHandler) -> usize {
    let selector = TaskSelector::all();
    let mut handled = 0;
    while let Some(task) = queue.try_take(&selector) {
        if catch_unwind(AssertUnwindSafe(|| handler.handle_task(&task))).is_err() {
            tracing::error!(task = ?task, "Task panicked");
        }
        handled += 1;
    }
    handled
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::db::Database;
    use crate::error::Result;
    use crate::events::TracingEventSink;
    use crate::hash::Hasher;
    use crate::imaging::ImageCrateConverter;
    use crate::library::{Book, Library, Series};
    use crate::services::Services;
    use crate::tasks::{DEFAULT_PRIORITY, LOWEST_PRIORITY, Task, TaskSink};
    use std::path::{Path, PathBuf};
    use std::time::Duration;

    /// Hasher blowing up on `poison.cbz`, hashing the path otherwise.
    struct PoisonHasher;

    impl Hasher for PoisonHasher {
        fn compute_hash(&self, path: &Path) -> Result<String> {
            if path.ends_with("poison.cbz") {
                panic!("hasher exploded");
            }
            Ok(format!("hash:{}", path.display()))
        }
    }

    #[test]
    fn test_selectors_from_bands() {
        let config = TaskConfig {
            workers: 1,
            priority_bands: vec![[0, 5], [6, i32::MAX]],
        };
        let selectors = selectors(&config);
        assert_eq!(selectors.len(), 2);
        assert!(selectors[0].matches(5));
        assert!(!selectors[0].matches(6));
        assert!(selectors[1].matches(i32::MAX));

        let config = TaskConfig {
            workers: 1,
            priority_bands: Vec::new(),
        };
        assert_eq!(super::selectors(&config), vec![TaskSelector::all()]);
    }

    #[test]
    fn test_uncovered_priorities_get_their_own_group() {
        let config = TaskConfig {
            workers: 1,
            priority_bands: vec![[0, 5], [10, 20]],
        };
        let selectors = selectors(&config);
        assert_eq!(selectors.len(), 4);
        for priority in [0, 5, 6, 9, 10, 20, 21, LOWEST_PRIORITY] {
            assert_eq!(
                selectors.iter().filter(|s| s.matches(priority)).count(),
                1,
                "priority {}",
                priority
            );
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_worker_survives_panicking_task_and_stops_on_cancel() {
        let db = Database::open_memory().unwrap();
        let queue = Arc::new(TaskQueue::new());
        let services = Services::new(
            &Config::default(),
            db.clone(),
            Arc::new(TracingEventSink),
            Arc::new(ImageCrateConverter),
            Arc::new(PoisonHasher),
            queue.clone(),
        );
        let handler = TaskHandler::new(db.clone(), services);

        let library = Library::new("comics", PathBuf::from("/library"));
        db.create_library(&library).unwrap();
        let series = Series::new(PathBuf::from("/library/Saga"), &library.id);
        db.insert_series(&series).unwrap();
        let poison = Book::new(
            PathBuf::from("/library/Saga/poison.cbz"),
            &library.id,
            &series.id,
        );
        let healthy = Book::new(
            PathBuf::from("/library/Saga/healthy.cbz"),
            &library.id,
            &series.id,
        );
        db.insert_books(&[poison.clone(), healthy.clone()]).unwrap();

        let shutdown = CancellationToken::new();
        let config = TaskConfig {
            workers: 1,
            priority_bands: Vec::new(),
        };
        let workers = TaskWorkers::start(queue.clone(), handler, &config, shutdown.clone());

        // Single slot: the healthy task only runs if the slot outlives the panic.
        for book in [&poison, &healthy] {
            queue.submit(Task::HashBook {
                book_id: book.id.clone(),
                priority: DEFAULT_PRIORITY,
            });
        }

        let hashed = tokio::time::timeout(Duration::from_secs(10), async {
            loop {
                if db.get_book(&healthy.id).unwrap().is_some_and(|b| b.has_hash()) {
                    break;
                }
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await;
        assert!(hashed.is_ok(), "healthy task never ran");
        assert!(queue.is_empty());
        assert!(!db.get_book(&poison.id).unwrap().unwrap().has_hash());

        shutdown.cancel();
        tokio::time::timeout(Duration::from_secs(5), workers.join())
            .await
            .unwrap();
    }
}
