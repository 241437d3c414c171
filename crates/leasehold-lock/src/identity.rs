//! Owner identity
//!
//! An owner value is `"{process_id}:{task_id}"`. The process id is a UUID
//! generated once per process and the task id is allocated from a
//! process-wide counter, so no two live tasks anywhere share a value.
//!
//! Tasks are explicit `OwnerTask` handles rather than OS threads. A task is
//! alive while at least one clone of its handle exists and `finish` has not
//! been called; the keep-alive pass only holds a weak `TaskProbe`.

use std::fmt::{Debug, Display, Formatter};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, LazyLock, Weak};

use tokio::task::JoinHandle;
use uuid::Uuid;

static PROCESS_ID: LazyLock<String> = LazyLock::new(|| Uuid::new_v4().to_string());

static NEXT_TASK_ID: AtomicU64 = AtomicU64::new(1);

tokio::task_local! {
    static CURRENT_TASK: OwnerTask;
}

/// Random identifier of this process, stable for its lifetime
pub fn process_id() -> &'static str {
    PROCESS_ID.as_str()
}

/// Owner value of the task-local current `OwnerTask`, if any
pub fn current_owner_value() -> Option<String> {
    OwnerTask::current().map(|task| task.owner_value().to_string())
}

/// Recover the task id from an owner value minted by this process
pub fn task_of(owner_value: &str) -> Option<TaskId> {
    owner_value
        .strip_prefix(process_id())?
        .strip_prefix(':')?
        .parse()
        .ok()
        .map(TaskId)
}

/// Process-unique identifier of an `OwnerTask`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TaskId(u64);

impl Display for TaskId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

struct TaskInner {
    id: TaskId,
    owner_value: String,
    finished: AtomicBool,
}

/// Handle identifying one unit of work that may own renewable locks
#[derive(Clone)]
pub struct OwnerTask {
    inner: Arc<TaskInner>,
}

impl OwnerTask {
    pub fn new() -> Self {
        let id = TaskId(NEXT_TASK_ID.fetch_add(1, Ordering::Relaxed));
        Self {
            inner: Arc::new(TaskInner {
                id,
                owner_value: format!("{}:{}", process_id(), id),
                finished: AtomicBool::new(false),
            }),
        }
    }

    pub fn id(&self) -> TaskId {
        self.inner.id
    }

    /// Value stored under every lock this task acquires with renewal
    pub fn owner_value(&self) -> &str {
        &self.inner.owner_value
    }

    /// Mark the task finished while handles to it are still around
    pub fn finish(&self) {
        self.inner.finished.store(true, Ordering::SeqCst);
    }

    pub fn is_alive(&self) -> bool {
        !self.inner.finished.load(Ordering::SeqCst)
    }

    /// Weak liveness view that does not keep the task alive
    pub fn probe(&self) -> TaskProbe {
        TaskProbe {
            id: self.inner.id,
            inner: Arc::downgrade(&self.inner),
        }
    }

    /// The `OwnerTask` installed for the running tokio task, if any
    pub fn current() -> Option<OwnerTask> {
        CURRENT_TASK.try_with(|task| task.clone()).ok()
    }

    /// Run `future` with this handle as the task-local current owner
    pub async fn scope<F: Future>(self, future: F) -> F::Output {
        CURRENT_TASK.scope(self, future).await
    }

    /// Spawn a tokio task bound to a fresh `OwnerTask`.
    ///
    /// The handle passed to `f` is also the task-local current owner. Once the
    /// spawned future completes, panics or is aborted, the handle is dropped
    /// and the task counts as dead.
    pub fn spawn<F, Fut>(f: F) -> JoinHandle<Fut::Output>
    where
        F: FnOnce(OwnerTask) -> Fut,
        Fut: Future + Send + 'static,
        Fut::Output: Send + 'static,
    {
        let task = OwnerTask::new();
        let future = f(task.clone());
        tokio::spawn(CURRENT_TASK.scope(task, future))
    }
}

impl Default for OwnerTask {
    fn default() -> Self {
        Self::new()
    }
}

impl Debug for OwnerTask {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OwnerTask")
            .field("id", &self.inner.id)
            .field("owner_value", &self.inner.owner_value)
            .field("alive", &self.is_alive())
            .finish()
    }
}

/// Liveness probe held by a lease record
#[derive(Clone)]
pub struct TaskProbe {
    id: TaskId,
    inner: Weak<TaskInner>,
}

impl TaskProbe {
    pub fn id(&self) -> TaskId {
        self.id
    }

    pub fn is_alive(&self) -> bool {
        self.inner
            .upgrade()
            .is_some_and(|task| !task.finished.load(Ordering::SeqCst))
    }
}

impl Debug for TaskProbe {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskProbe")
            .field("id", &self.id)
            .field("alive", &self.is_alive())
            .finish()
    }
}
