use std::sync::{Arc, RwLock};

use playground_model::{Observe, RunnerEvent};
use tracing::trace;

/// Registered [`Observe`]rs; events fan out in registration order.
#[derive(Default)]
pub(crate) struct Observers {
    list: RwLock<Vec<Arc<dyn Observe>>>,
}

impl Observers {
    pub(crate) fn add(&self, observer: Arc<dyn Observe>) {
        trace!(target: "playground.core", observer = observer.name(), "observer registered");
        self.list
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .push(observer);
    }

    pub(crate) fn emit(&self, event: RunnerEvent) {
        let list = self.list.read().unwrap_or_else(|e| e.into_inner()).clone();
        for observer in list {
            observer.on_event(&event);
        }
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use std::sync::Mutex;

    use super::*;

    /// Records every event it sees.
    #[derive(Default)]
    pub(crate) struct Recorder {
        events: Mutex<Vec<RunnerEvent>>,
    }

    impl Recorder {
        pub(crate) fn events(&self) -> Vec<RunnerEvent> {
            self.events.lock().unwrap().clone()
        }

        pub(crate) fn position(&self, pred: impl Fn(&RunnerEvent) -> bool) -> Option<usize> {
            self.events().iter().position(pred)
        }
    }

    impl Observe for Recorder {
        fn on_event(&self, event: &RunnerEvent) {
            self.events.lock().unwrap().push(event.clone());
        }

        fn name(&self) -> &'static str {
            "recorder"
        }
    }
}
