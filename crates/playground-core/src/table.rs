use std::{
    collections::{HashMap, VecDeque},
    sync::{Arc, Mutex, MutexGuard},
    time::SystemTime,
};

use tokio::sync::watch;

use playground_model::{RunnerEvent, TaskHandle, TaskInfo, TaskStatus};

use crate::observers::Observers;

/// Per-service runtime state shared by every runner task.
///
/// A single mutex serializes reads and writes; it is never held across an
/// await. Every accepted transition bumps a change counter that
/// [`TaskTable::wait_for`] listens on, and is reported to observers in the
/// order it was applied. Observers run with no table lock held and may
/// update the table themselves; such nested transitions are delivered
/// after the one being reported.
pub struct TaskTable {
    tasks: Mutex<HashMap<String, TaskInfo>>,
    outbox: Mutex<Outbox>,
    changed: watch::Sender<u64>,
    observers: Arc<Observers>,
}

impl TaskTable {
    pub(crate) fn new<'a>(names: impl IntoIterator<Item = &'a str>, observers: Arc<Observers>) -> Self {
        let tasks = names
            .into_iter()
            .map(|n| (n.to_string(), TaskInfo::new(n)))
            .collect();
        let (changed, _) = watch::channel(0);
        Self {
            tasks: Mutex::new(tasks),
            outbox: Mutex::default(),
            changed,
            observers,
        }
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, TaskInfo>> {
        self.tasks.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Move `name` forward to `to`.
    ///
    /// Returns `false` (and changes nothing) when the transition would not
    /// advance the status, so repeated or late reports are harmless.
    pub fn update(&self, name: &str, to: TaskStatus) -> bool {
        self.transition(name, to, None)
    }

    /// Mark `name` failed with `error`, unless it already finished.
    pub fn fail(&self, name: &str, error: impl Into<String>) -> bool {
        self.transition(name, TaskStatus::Failed, Some(error.into()))
    }

    /// Mark `name` stopped, optionally recording why.
    pub fn stop(&self, name: &str, error: Option<String>) -> bool {
        self.transition(name, TaskStatus::Stopped, error)
    }

    fn transition(&self, name: &str, to: TaskStatus, error: Option<String>) -> bool {
        let mut tasks = self.lock();
        let Some(info) = tasks.get_mut(name) else {
            return false;
        };
        let from = info.status;
        if !from.can_advance_to(to) {
            return false;
        }
        info.status = to;
        info.updated_at = SystemTime::now();
        if let Some(err) = error {
            info.error = Some(err);
        }
        // queued under `tasks` so the outbox keeps transition order
        self.outbox().queue.push_back(RunnerEvent::StatusChanged {
            service: name.to_string(),
            from,
            to,
        });
        drop(tasks);

        self.changed.send_modify(|n| *n = n.wrapping_add(1));
        self.deliver();
        true
    }

    fn outbox(&self) -> MutexGuard<'_, Outbox> {
        self.outbox.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Drain queued events to observers; one caller drains at a time and
    /// the rest return at once, leaving their events to it.
    fn deliver(&self) {
        {
            let mut out = self.outbox();
            if out.draining {
                return;
            }
            out.draining = true;
        }
        loop {
            let next = {
                let mut out = self.outbox();
                let next = out.queue.pop_front();
                if next.is_none() {
                    out.draining = false;
                }
                next
            };
            match next {
                Some(event) => self.observers.emit(event),
                None => return,
            }
        }
    }

    /// Record the engine handle of a launched service.
    pub fn set_handle(&self, name: &str, handle: TaskHandle) {
        if let Some(info) = self.lock().get_mut(name) {
            info.handle = Some(handle);
            info.updated_at = SystemTime::now();
        }
    }

    pub fn get(&self, name: &str) -> Option<TaskInfo> {
        self.lock().get(name).cloned()
    }

    pub fn status(&self, name: &str) -> Option<TaskStatus> {
        self.lock().get(name).map(|t| t.status)
    }

    /// All tasks, sorted by name.
    pub fn snapshot(&self) -> Vec<TaskInfo> {
        let mut all: Vec<TaskInfo> = self.lock().values().cloned().collect();
        all.sort_by(|a, b| a.name.cmp(&b.name));
        all
    }

    /// Wait until `check` yields a value.
    ///
    /// `check` runs under the table lock, once up front and again after
    /// every change, so no update can slip between a check and the wait.
    pub async fn wait_for<T>(&self, mut check: impl FnMut(&HashMap<String, TaskInfo>) -> Option<T>) -> T {
        let mut rx = self.changed.subscribe();
        loop {
            let _ = rx.borrow_and_update();
            let found = {
                let tasks = self.lock();
                check(&*tasks)
            };
            if let Some(value) = found {
                return value;
            }
            // The sender lives in `self`, so this only returns on a change.
            let _ = rx.changed().await;
        }
    }
}

#[derive(Default)]
struct Outbox {
    queue: VecDeque<RunnerEvent>,
    draining: bool,
}
