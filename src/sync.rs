// sync.rs
use crate::error::TransportError;
use crate::live::{Publisher, Subscription};
use crate::remote::{FetchSuccess, RemoteTaskSource, RemoteTodo};
use crate::store::TaskStore;
use crate::todo::Task;
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use std::thread::{self, JoinHandle};
use tracing::{info, warn};

/// Only online todos owned by this user make it into the merged list.
pub const TARGET_USER_ID: i64 = 3;

pub fn filter_remote(items: Vec<RemoteTodo>) -> Vec<Task> {
    items
        .into_iter()
        .filter(|item| item.user_id == TARGET_USER_ID)
        .map(RemoteTodo::into_task)
        .collect()
}

/// Loading and error banner state, kept apart from the merged list.
#[derive(Clone, Debug, PartialEq, Eq, Default)]
pub enum RefreshState {
    #[default]
    Idle,
    Loading,
    Error(String),
}

impl RefreshState {
    pub fn is_loading(&self) -> bool {
        matches!(self, RefreshState::Loading)
    }

    pub fn error(&self) -> Option<&str> {
        match self {
            RefreshState::Error(msg) => Some(msg),
            _ => None,
        }
    }

    pub fn on_refresh_requested(&self) -> RefreshState {
        RefreshState::Loading
    }

    pub fn on_fetch_finished(&self, result: &Result<FetchSuccess, TransportError>) -> RefreshState {
        match result {
            Ok(_) => RefreshState::Idle,
            Err(e) => RefreshState::Error(e.to_string()),
        }
    }

    pub fn on_dismiss(&self) -> RefreshState {
        match self {
            RefreshState::Error(_) => RefreshState::Idle,
            other => other.clone(),
        }
    }
}

struct ViewState {
    local: Vec<Task>,
    remote: Vec<Task>,
    refresh: RefreshState,
}

impl ViewState {
    fn merged(&self) -> Vec<Task> {
        self.local.iter().chain(self.remote.iter()).cloned().collect()
    }
}

struct ViewInner {
    source: Box<dyn RemoteTaskSource>,
    state: Mutex<ViewState>,
    merged: Publisher<Vec<Task>>,
    status: Publisher<RefreshState>,
}

impl ViewInner {
    fn lock(&self) -> MutexGuard<'_, ViewState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn apply_local(&self, tasks: &[Task]) {
        let mut state = self.lock();
        state.local = tasks.to_vec();
        self.merged.publish(&state.merged());
    }

    fn begin_refresh(&self) {
        let mut state = self.lock();
        state.refresh = state.refresh.on_refresh_requested();
        self.status.publish(&state.refresh);
    }

    fn run_fetch(&self) {
        let result = self.source.fetch();
        self.finish(result);
    }

    fn finish(&self, result: Result<FetchSuccess, TransportError>) {
        let mut state = self.lock();
        state.refresh = state.refresh.on_fetch_finished(&result);
        state.remote = match result {
            Ok(ok) => {
                let remote = filter_remote(ok.items.unwrap_or_default());
                info!(status = ok.status, kept = remote.len(), "online todos refreshed");
                remote
            }
            Err(e) => {
                warn!(error = %e, "online todos unavailable");
                Vec::new()
            }
        };
        self.merged.publish(&state.merged());
        self.status.publish(&state.refresh);
    }
}

/// Local tasks followed by the last fetched online tasks, kept live.
pub struct SyncedTaskView {
    inner: Arc<ViewInner>,
    _local: Subscription,
}

impl SyncedTaskView {
    pub fn new(store: &TaskStore, source: Box<dyn RemoteTaskSource>) -> Self {
        let inner = Arc::new(ViewInner {
            source,
            state: Mutex::new(ViewState {
                local: Vec::new(),
                remote: Vec::new(),
                refresh: RefreshState::Idle,
            }),
            merged: Publisher::new(),
            status: Publisher::new(),
        });
        let weak: Weak<ViewInner> = Arc::downgrade(&inner);
        let local = store.subscribe(move |tasks| {
            if let Some(inner) = weak.upgrade() {
                inner.apply_local(tasks);
            }
        });
        Self {
            inner,
            _local: local,
        }
    }

    pub fn combined_feed<F>(&self, observer: F) -> Subscription
    where
        F: Fn(&Vec<Task>) + Send + Sync + 'static,
    {
        let state = self.inner.lock();
        self.inner.merged.register(&state.merged(), observer)
    }

    pub fn merged(&self) -> Vec<Task> {
        self.inner.lock().merged()
    }

    pub fn fetch_remote_once(&self) -> Result<FetchSuccess, TransportError> {
        self.inner.source.fetch()
    }

    /// Starts one fetch on a background thread. Overlapping refreshes are not
    /// coalesced; whichever response lands last is what the list shows.
    pub fn refresh(&self) -> JoinHandle<()> {
        self.inner.begin_refresh();
        let inner = self.inner.clone();
        thread::spawn(move || inner.run_fetch())
    }

    pub fn refresh_blocking(&self) {
        self.inner.begin_refresh();
        self.inner.run_fetch();
    }

    pub fn dismiss_error(&self) {
        let mut state = self.inner.lock();
        let next = state.refresh.on_dismiss();
        if next != state.refresh {
            state.refresh = next;
            self.inner.status.publish(&state.refresh);
        }
    }

    pub fn state(&self) -> RefreshState {
        self.inner.lock().refresh.clone()
    }

    pub fn subscribe_state<F>(&self, observer: F) -> Subscription
    where
        F: Fn(&RefreshState) + Send + Sync + 'static,
    {
        let state = self.inner.lock();
        self.inner.status.register(&state.refresh, observer)
    }
}
