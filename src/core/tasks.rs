use std::collections::HashMap;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::mpsc::{Receiver, Sender, channel};
use std::sync::{Arc, Condvar, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use anyhow::{Result, bail};
use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, info};
use uuid::Uuid;

pub const DEFAULT_WORKER_COUNT: usize = 4;

type Job = Box<dyn FnOnce() -> Result<()> + Send + 'static>;

/// Where a task is in its lifecycle. The worker thread is bound when the
/// task is picked up, not when it is scheduled.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum TaskState {
    Queued,
    Running { thread: String },
    Finished { finished_at: DateTime<Utc> },
}

#[derive(Debug, Clone, Serialize)]
pub struct TaskMeta {
    pub key: String,
    pub description: Option<String>,
    pub started_at: DateTime<Utc>,
    #[serde(flatten)]
    pub state: TaskState,
}

enum HandleState {
    Pending,
    Finished {
        finished_at: DateTime<Utc>,
        error: Option<String>,
    },
}

struct HandleShared {
    state: Mutex<HandleState>,
    done: Condvar,
}

/// Caller-side view of a scheduled task. A failed closure (error or panic)
/// is captured here; the runner itself does not report it.
#[derive(Clone)]
pub struct TaskHandle {
    key: String,
    shared: Arc<HandleShared>,
}

impl TaskHandle {
    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn is_finished(&self) -> bool {
        let state = self.shared.state.lock().expect("task handle lock poisoned");
        matches!(*state, HandleState::Finished { .. })
    }

    /// The captured failure message, if the task has finished and failed.
    pub fn error(&self) -> Option<String> {
        let state = self.shared.state.lock().expect("task handle lock poisoned");
        match &*state {
            HandleState::Finished { error, .. } => error.clone(),
            HandleState::Pending => None,
        }
    }

    pub fn finished_at(&self) -> Option<DateTime<Utc>> {
        let state = self.shared.state.lock().expect("task handle lock poisoned");
        match &*state {
            HandleState::Finished { finished_at, .. } => Some(*finished_at),
            HandleState::Pending => None,
        }
    }

    /// Blocks until the task finishes; returns the failure message if any.
    pub fn wait(&self) -> Option<String> {
        let mut state = self.shared.state.lock().expect("task handle lock poisoned");
        loop {
            if let HandleState::Finished { error, .. } = &*state {
                return error.clone();
            }
            state = self
                .shared
                .done
                .wait(state)
                .expect("task handle lock poisoned");
        }
    }

    /// Returns true if the task finished within `timeout`.
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        let deadline = std::time::Instant::now() + timeout;
        let mut state = self.shared.state.lock().expect("task handle lock poisoned");
        loop {
            if matches!(*state, HandleState::Finished { .. }) {
                return true;
            }
            let Some(remaining) = deadline.checked_duration_since(std::time::Instant::now())
            else {
                return false;
            };
            let (guard, result) = self
                .shared
                .done
                .wait_timeout(state, remaining)
                .expect("task handle lock poisoned");
            state = guard;
            if result.timed_out() && !matches!(*state, HandleState::Finished { .. }) {
                return false;
            }
        }
    }
}

struct WorkItem {
    key: String,
    job: Job,
    shared: Arc<HandleShared>,
}

/// Fixed pool of worker threads with per-task bookkeeping. Metadata for a
/// task lives in the map only while the task is in flight.
pub struct TaskRunner {
    identifier: String,
    sender: Mutex<Option<Sender<WorkItem>>>,
    workers: Mutex<Vec<JoinHandle<()>>>,
    meta: Arc<Mutex<HashMap<String, TaskMeta>>>,
}

impl TaskRunner {
    pub fn new(identifier: impl Into<String>, worker_count: usize) -> Self {
        let identifier = identifier.into();
        let meta: Arc<Mutex<HashMap<String, TaskMeta>>> = Arc::new(Mutex::new(HashMap::new()));
        let (sender, receiver) = channel::<WorkItem>();
        let receiver = Arc::new(Mutex::new(receiver));

        let mut workers = Vec::with_capacity(worker_count.max(1));
        for index in 0..worker_count.max(1) {
            let receiver = Arc::clone(&receiver);
            let meta = Arc::clone(&meta);
            let name = format!("{identifier}-{index}");
            let handle = thread::Builder::new()
                .name(name.clone())
                .spawn(move || worker_loop(&name, &receiver, &meta))
                .expect("failed to spawn task runner worker");
            workers.push(handle);
        }

        info!("Task runner '{identifier}' initialized with {} workers.", worker_count.max(1));
        Self {
            identifier,
            sender: Mutex::new(Some(sender)),
            workers: Mutex::new(workers),
            meta,
        }
    }

    /// Non-blocking: queues the closure on the pool and returns a handle.
    /// Fails only when the runner has been shut down.
    pub fn schedule<F>(&self, description: Option<&str>, job: F) -> Result<TaskHandle>
    where
        F: FnOnce() -> Result<()> + Send + 'static,
    {
        let sender = self.sender.lock().expect("task runner lock poisoned");
        let Some(sender) = sender.as_ref() else {
            bail!("task runner '{}' is shut down", self.identifier);
        };

        let key = format!("task-{}", Uuid::new_v4());
        let shared = Arc::new(HandleShared {
            state: Mutex::new(HandleState::Pending),
            done: Condvar::new(),
        });
        {
            let mut map = self.meta.lock().expect("task meta lock poisoned");
            map.insert(
                key.clone(),
                TaskMeta {
                    key: key.clone(),
                    description: description.map(str::to_string),
                    started_at: Utc::now(),
                    state: TaskState::Queued,
                },
            );
        }
        debug!("[{}] Scheduled background task [{key}].", self.identifier);
        sender
            .send(WorkItem {
                key: key.clone(),
                job: Box::new(job),
                shared: Arc::clone(&shared),
            })
            .expect("task runner workers are gone");
        Ok(TaskHandle { key, shared })
    }

    /// Snapshot of tasks currently in flight.
    pub fn list_tasks(&self) -> Vec<TaskMeta> {
        let map = self.meta.lock().expect("task meta lock poisoned");
        map.values().cloned().collect()
    }

    /// Stops accepting new work; with `wait`, blocks until every in-flight
    /// task has finished.
    pub fn shutdown(&self, wait: bool) {
        info!("Task runner '{}' shutting down...", self.identifier);
        {
            let mut sender = self.sender.lock().expect("task runner lock poisoned");
            sender.take();
        }
        if wait {
            let mut workers = self.workers.lock().expect("task runner lock poisoned");
            for handle in workers.drain(..) {
                let _ = handle.join();
            }
        }
        info!("Task runner '{}' shut down.", self.identifier);
    }
}

fn worker_loop(
    worker_name: &str,
    receiver: &Mutex<Receiver<WorkItem>>,
    meta: &Mutex<HashMap<String, TaskMeta>>,
) {
    loop {
        let item = {
            let guard = receiver.lock().expect("task queue lock poisoned");
            guard.recv()
        };
        let Ok(item) = item else {
            // channel closed: runner is shutting down
            break;
        };

        {
            let mut map = meta.lock().expect("task meta lock poisoned");
            if let Some(entry) = map.get_mut(&item.key) {
                entry.state = TaskState::Running {
                    thread: worker_name.to_string(),
                };
            }
        }

        let outcome = match catch_unwind(AssertUnwindSafe(item.job)) {
            Ok(Ok(())) => None,
            Ok(Err(err)) => Some(format!("{err:#}")),
            Err(panic) => Some(panic_message(&*panic)),
        };

        let finished_at = Utc::now();
        {
            let mut map = meta.lock().expect("task meta lock poisoned");
            map.remove(&item.key);
        }
        debug!("Background task [{}] complete.", item.key);

        let mut state = item.shared.state.lock().expect("task handle lock poisoned");
        *state = HandleState::Finished {
            finished_at,
            error: outcome,
        };
        item.shared.done.notify_all();
    }
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        format!("task panicked: {message}")
    } else if let Some(message) = panic.downcast_ref::<String>() {
        format!("task panicked: {message}")
    } else {
        "task panicked".to_string()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;

    const WAIT: Duration = Duration::from_secs(5);

    #[test]
    fn scheduled_closure_runs_and_handle_reports_success() {
        let runner = TaskRunner::new("test-runner", 2);
        let counter = Arc::new(AtomicUsize::new(0));
        let seen = Arc::clone(&counter);
        let handle = runner
            .schedule(Some("increment"), move || {
                seen.fetch_add(1, Ordering::SeqCst);
                Ok(())
            })
            .unwrap();
        assert_eq!(handle.wait(), None);
        assert_eq!(counter.load(Ordering::SeqCst), 1);
        assert!(handle.is_finished());
        assert!(handle.finished_at().is_some());
        runner.shutdown(true);
    }

    #[test]
    fn task_failure_is_captured_on_the_handle() {
        let runner = TaskRunner::new("test-runner", 1);
        let handle = runner
            .schedule(None, || anyhow::bail!("definitions unreadable"))
            .unwrap();
        let error = handle.wait().expect("failure should be captured");
        assert!(error.contains("definitions unreadable"));
        runner.shutdown(true);
    }

    #[test]
    fn task_panic_is_captured_not_propagated() {
        let runner = TaskRunner::new("test-runner", 1);
        let handle = runner
            .schedule(None, || panic!("boom"))
            .unwrap();
        let error = handle.wait().expect("panic should be captured");
        assert!(error.contains("boom"));

        // the worker survives the panic and keeps serving the queue
        let followup = runner.schedule(None, || Ok(())).unwrap();
        assert_eq!(followup.wait(), None);
        runner.shutdown(true);
    }

    #[test]
    fn metadata_entry_is_removed_after_completion() {
        let runner = TaskRunner::new("test-runner", 1);
        let (release_tx, release_rx) = channel::<()>();
        let handle = runner
            .schedule(Some("blocked"), move || {
                release_rx.recv().ok();
                Ok(())
            })
            .unwrap();

        // in flight: visible in the snapshot
        let deadline = std::time::Instant::now() + WAIT;
        loop {
            let tasks = runner.list_tasks();
            if tasks.len() == 1 {
                assert_eq!(tasks[0].description.as_deref(), Some("blocked"));
                break;
            }
            assert!(std::time::Instant::now() < deadline, "task never listed");
            thread::sleep(Duration::from_millis(5));
        }

        release_tx.send(()).unwrap();
        assert!(handle.wait_timeout(WAIT));
        let deadline = std::time::Instant::now() + WAIT;
        while !runner.list_tasks().is_empty() {
            assert!(std::time::Instant::now() < deadline, "metadata never removed");
            thread::sleep(Duration::from_millis(5));
        }
        runner.shutdown(true);
    }

    #[test]
    fn shutdown_rejects_new_work() {
        let runner = TaskRunner::new("test-runner", 1);
        runner.shutdown(true);
        assert!(runner.schedule(None, || Ok(())).is_err());
    }

    #[test]
    fn shutdown_with_wait_drains_in_flight_tasks() {
        let runner = TaskRunner::new("test-runner", 2);
        let counter = Arc::new(AtomicUsize::new(0));
        let mut handles = Vec::new();
        for _ in 0..8 {
            let seen = Arc::clone(&counter);
            handles.push(
                runner
                    .schedule(None, move || {
                        thread::sleep(Duration::from_millis(10));
                        seen.fetch_add(1, Ordering::SeqCst);
                        Ok(())
                    })
                    .unwrap(),
            );
        }
        runner.shutdown(true);
        assert_eq!(counter.load(Ordering::SeqCst), 8);
        assert!(handles.iter().all(TaskHandle::is_finished));
    }
}
