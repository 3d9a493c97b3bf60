use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::types::{Task, TaskStatus};

// ---------------------------------------------------------------------------
// Error
// ---------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("task {0} not found")]
    NotFound(Uuid),
    /// A persisted row could not be mapped back to a [`Task`].
    #[error("corrupt record: {0}")]
    Corrupt(String),
    #[error("backend: {0}")]
    Backend(String),
}

impl StoreError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, StoreError::NotFound(_))
    }
}

// ---------------------------------------------------------------------------
// TaskStore
// ---------------------------------------------------------------------------

/// Persistence contract consumed by the workflow engine and the sweeps.
///
/// Implementations must return the latest committed state. `save` is the
/// only write path the engine uses.
#[async_trait]
pub trait TaskStore: Send + Sync {
    async fn load(&self, id: Uuid) -> Result<Task, StoreError>;

    async fn save(&self, task: &Task) -> Result<(), StoreError>;

    async fn children(&self, parent_id: Uuid) -> Result<Vec<Task>, StoreError>;

    async fn list_by_status(&self, status: TaskStatus) -> Result<Vec<Task>, StoreError>;

    async fn list_all(&self) -> Result<Vec<Task>, StoreError>;

    /// The owning task, or `None` when there is no parent or it no longer
    /// exists.
    async fn parent(&self, task: &Task) -> Result<Option<Task>, StoreError> {
        match task.parent_task_id {
            Some(parent_id) => match self.load(parent_id).await {
                Ok(parent) => Ok(Some(parent)),
                Err(StoreError::NotFound(_)) => Ok(None),
                Err(e) => Err(e),
            },
            None => Ok(None),
        }
    }
}

// ---------------------------------------------------------------------------
// MemoryStore
// ---------------------------------------------------------------------------

/// In-process store keyed by task id. Used by tests and by the daemon when no
/// database path is configured.
#[derive(Default)]
pub struct MemoryStore {
    tasks: RwLock<HashMap<Uuid, Task>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed the store with `tasks`, replacing any existing entries.
    pub async fn with_tasks(tasks: impl IntoIterator<Item = Task>) -> Self {
        let store = Self::new();
        {
            let mut guard = store.tasks.write().await;
            for task in tasks {
                guard.insert(task.id, task);
            }
        }
        store
    }

    /// Remove a task and, recursively, every task it owns.
    pub async fn delete(&self, id: Uuid) -> usize {
        let mut guard = self.tasks.write().await;
        let mut pending = vec![id];
        let mut removed = 0;
        while let Some(next) = pending.pop() {
            if guard.remove(&next).is_some() {
                removed += 1;
            }
            pending.extend(
                guard
                    .values()
                    .filter(|t| t.parent_task_id == Some(next))
                    .map(|t| t.id),
            );
        }
        removed
    }

    pub async fn len(&self) -> usize {
        self.tasks.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.tasks.read().await.is_empty()
    }
}

/// Deterministic ordering for list results: oldest first, id as tie-break.
fn sort_tasks(tasks: &mut [Task]) {
    tasks.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
}

#[async_trait]
impl TaskStore for MemoryStore {
    async fn load(&self, id: Uuid) -> Result<Task, StoreError> {
        self.tasks
            .read()
            .await
            .get(&id)
            .cloned()
            .ok_or(StoreError::NotFound(id))
    }

    async fn save(&self, task: &Task) -> Result<(), StoreError> {
        self.tasks.write().await.insert(task.id, task.clone());
        Ok(())
    }

    async fn children(&self, parent_id: Uuid) -> Result<Vec<Task>, StoreError> {
        let mut out: Vec<Task> = self
            .tasks
            .read()
            .await
            .values()
            .filter(|t| t.parent_task_id == Some(parent_id))
            .cloned()
            .collect();
        sort_tasks(&mut out);
        Ok(out)
    }

    async fn list_by_status(&self, status: TaskStatus) -> Result<Vec<Task>, StoreError> {
        let mut out: Vec<Task> = self
            .tasks
            .read()
            .await
            .values()
            .filter(|t| t.status == status)
            .cloned()
            .collect();
        sort_tasks(&mut out);
        Ok(out)
    }

    async fn list_all(&self) -> Result<Vec<Task>, StoreError> {
        let mut out: Vec<Task> = self.tasks.read().await.values().cloned().collect();
        sort_tasks(&mut out);
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn load_missing_task_is_not_found() {
        let store = MemoryStore::new();
        let err = store.load(Uuid::new_v4()).await.unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn parent_of_orphan_is_none() {
        let store = MemoryStore::new();
        let sub = Task::sub("orphan", Uuid::new_v4());
        store.save(&sub).await.unwrap();
        assert!(store.parent(&sub).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn delete_cascades_to_children() {
        let main = Task::main("main");
        let a = Task::sub("a", main.id);
        let b = Task::sub("b", main.id);
        let unrelated = Task::main("other");
        let store = MemoryStore::with_tasks(vec![main.clone(), a, b, unrelated]).await;

        assert_eq!(store.delete(main.id).await, 3);
        assert_eq!(store.len().await, 1);
        assert!(store.children(main.id).await.unwrap().is_empty());
    }
}
