use super::task::{HIGHEST_PRIORITY, LOWEST_PRIORITY, Task};
use parking_lot::Mutex;
use std::collections::{BTreeMap, HashSet};
use tokio::sync::Notify;

/// Receiver of submitted tasks.
pub trait TaskSink: Send + Sync {
    /// Enqueue a task. Never waits for the task to run.
    fn submit(&self, task: Task);
}

/// Inclusive priority band a consumer restricts itself to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TaskSelector {
    min: i32,
    max: i32,
}

impl TaskSelector {
    /// Accept every priority.
    pub fn all() -> Self {
        Self {
            min: HIGHEST_PRIORITY,
            max: LOWEST_PRIORITY,
        }
    }

    /// Accept priorities within `[min, max]`.
    pub fn band(min: i32, max: i32) -> Self {
        Self {
            min: min.min(max),
            max: max.max(min),
        }
    }

    /// Whether a priority falls in the band.
    pub fn matches(&self, priority: i32) -> bool {
        (self.min..=self.max).contains(&priority)
    }
}

/// Bands of `[HIGHEST_PRIORITY, LOWEST_PRIORITY]` that no selector accepts.
pub(crate) fn uncovered_bands(selectors: &[TaskSelector]) -> Vec<TaskSelector> {
    let mut sorted = selectors.to_vec();
    sorted.sort_by_key(|s| s.min);

    let mut gaps = Vec::new();
    // i64 so the cursor can step past i32::MAX.
    let mut next = i64::from(HIGHEST_PRIORITY);
    for selector in sorted {
        if i64::from(selector.min) > next {
            gaps.push(TaskSelector::band(next as i32, selector.min - 1));
        }
        next = next.max(i64::from(selector.max) + 1);
    }
    if next <= i64::from(LOWEST_PRIORITY) {
        gaps.push(TaskSelector::band(next as i32, LOWEST_PRIORITY));
    }
    gaps
}

#[derive(Default)]
struct Pending {
    tasks: BTreeMap<(i32, u64), Task>,
    keys: HashSet<String>,
    next_seq: u64,
}

/// In-process priority queue: lower priority first, FIFO within a priority.
///
/// A task whose unique key is already pending is dropped on submit.
#[derive(Default)]
pub struct TaskQueue {
    pending: Mutex<Pending>,
    notify: Notify,
}

impl TaskQueue {
    /// Create an empty queue.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of pending tasks.
    pub fn len(&self) -> usize {
        self.pending.lock().tasks.len()
    }

    /// Whether no task is pending.
    pub fn is_empty(&self) -> bool {
        self.pending.lock().tasks.is_empty()
    }

    /// Pop the next task within `selector`, if any.
    pub fn try_take(&self, selector: &TaskSelector) -> Option<Task> {
        let mut pending = self.pending.lock();
        let key = *pending
            .tasks
            .range((selector.min, 0)..=(selector.max, u64::MAX))
            .next()?
            .0;
        let task = pending.tasks.remove(&key)?;
        pending.keys.remove(&task.unique_key());
        Some(task)
    }

    /// Wait for the next task within `selector`.
    pub async fn take(&self, selector: &TaskSelector) -> Task {
        loop {
            // Registered before the check so a submit in between is not missed.
            let notified = self.notify.notified();
            if let Some(task) = self.try_take(selector) {
                return task;
            }
            notified.await;
        }
    }
}

impl TaskSink for TaskQueue {
    fn submit(&self, mut task: Task) {
        if task.priority() < HIGHEST_PRIORITY {
            tracing::debug!(task = task.kind(), priority = task.priority(), "Priority clamped to highest");
            *task.priority_mut() = HIGHEST_PRIORITY;
        }
        {
            let mut pending = self.pending.lock();
            let key = task.unique_key();
            if pending.keys.contains(&key) {
                tracing::debug!(task = %key, "Task already pending, ignoring");
                return;
            }
            let seq = pending.next_seq;
            pending.next_seq += 1;
            tracing::debug!(task = %key, priority = task.priority(), "Task submitted");
            pending.keys.insert(key);
            pending.tasks.insert((task.priority(), seq), task);
        }
        self.notify.notify_waiters();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;

    fn analyze(id: &str, priority: i32) -> Task {
        Task::AnalyzeBook {
            book_id: id.into(),
            priority,
        }
    }

    fn book_ids(queue: &TaskQueue, selector: &TaskSelector) -> Vec<String> {
        std::iter::from_fn(|| queue.try_take(selector))
            .filter_map(|t| t.entity_id())
            .collect()
    }

    #[test]
    fn test_fifo_within_priority() {
        let queue = TaskQueue::new();
        for id in ["a", "b", "c"] {
            queue.submit(analyze(id, 4));
        }
        assert_eq!(book_ids(&queue, &TaskSelector::all()), vec!["a", "b", "c"]);
    }

    #[test]
    fn test_lower_priority_first() {
        let queue = TaskQueue::new();
        queue.submit(analyze("background", LOWEST_PRIORITY));
        queue.submit(analyze("normal", 4));
        queue.submit(analyze("urgent", 0));
        queue.submit(analyze("later", 5));

        assert_eq!(
            book_ids(&queue, &TaskSelector::all()),
            vec!["urgent", "normal", "later", "background"]
        );
    }

    #[test]
    fn test_selector_band() {
        let queue = TaskQueue::new();
        queue.submit(analyze("low", 8));
        queue.submit(analyze("high", 1));

        let band = TaskSelector::band(5, 10);
        assert!(band.matches(5) && band.matches(10));
        assert!(!band.matches(4));
        assert_eq!(book_ids(&queue, &band), vec!["low"]);
        assert_eq!(queue.len(), 1);
        assert!(queue.try_take(&band).is_none());
    }

    #[test]
    fn test_pending_duplicate_ignored() {
        let queue = TaskQueue::new();
        queue.submit(analyze("a", 4));
        queue.submit(analyze("a", 0));
        assert_eq!(queue.len(), 1);
        assert_eq!(queue.try_take(&TaskSelector::all()).map(|t| t.priority()), Some(4));

        // Once taken, the same task can be queued again.
        queue.submit(analyze("a", 0));
        assert_eq!(queue.len(), 1);
    }

    #[test]
    fn test_negative_priority_clamped_to_highest() {
        let queue = TaskQueue::new();
        queue.submit(analyze("a", -3));
        queue.submit(analyze("b", 0));
        let taken = queue.try_take(&TaskSelector::all()).unwrap();
        assert_eq!(taken.entity_id().as_deref(), Some("a"));
        assert_eq!(taken.priority(), HIGHEST_PRIORITY);

        // The unique key is released, so the book can be queued again.
        queue.submit(analyze("a", -1));
        assert_eq!(book_ids(&queue, &TaskSelector::all()), vec!["b", "a"]);
        assert!(queue.is_empty());
    }

    #[test]
    fn test_uncovered_bands() {
        let full = [TaskSelector::band(0, 5), TaskSelector::band(6, LOWEST_PRIORITY)];
        assert!(uncovered_bands(&full).is_empty());
        assert!(uncovered_bands(&[TaskSelector::all()]).is_empty());

        let gaps = uncovered_bands(&[TaskSelector::band(10, 20), TaskSelector::band(0, 5)]);
        assert_eq!(
            gaps,
            vec![TaskSelector::band(6, 9), TaskSelector::band(21, LOWEST_PRIORITY)]
        );

        let overlapping = [TaskSelector::band(0, 8), TaskSelector::band(3, 5)];
        assert_eq!(
            uncovered_bands(&overlapping),
            vec![TaskSelector::band(9, LOWEST_PRIORITY)]
        );
    }

    #[tokio::test]
    async fn test_take_waits_for_submit() {
        let queue = Arc::new(TaskQueue::new());
        let consumer = {
            let queue = queue.clone();
            tokio::spawn(async move { queue.take(&TaskSelector::all()).await })
        };

        tokio::time::sleep(Duration::from_millis(20)).await;
        queue.submit(analyze("a", 4));

        let task = tokio::time::timeout(Duration::from_secs(5), consumer)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(task.entity_id().as_deref(), Some("a"));
        assert!(queue.is_empty());
    }

    #[test]
    fn test_take_returns_ready_task() {
        let queue = TaskQueue::new();
        queue.submit(Task::RebuildIndex { priority: 0 });
        let task = tokio_test::block_on(queue.take(&TaskSelector::all()));
        assert_eq!(task.kind(), "RebuildIndex");
    }
}
