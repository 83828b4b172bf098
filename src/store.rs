// store.rs
use crate::error::StoreError;
use crate::live::{Publisher, Subscription};
use crate::todo::Task;
use std::fs::{File, OpenOptions};
use std::io::{BufReader, BufWriter, ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};
use tracing::{debug, info, warn};

/// Where local tasks live between runs.
pub trait TaskPersistence: Send + Sync {
    fn load(&self) -> Result<Vec<Task>, StoreError>;
    fn save(&self, tasks: &[Task]) -> Result<(), StoreError>;
}

/// Whole-list JSON file, rewritten on every mutation.
pub struct JsonFilePersistence {
    path: PathBuf,
}

impl JsonFilePersistence {
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }
}

impl TaskPersistence for JsonFilePersistence {
    fn load(&self) -> Result<Vec<Task>, StoreError> {
        let file = match File::open(&self.path) {
            Ok(f) => f,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };
        let reader = BufReader::new(file);
        Ok(serde_json::from_reader(reader)?)
    }

    fn save(&self, tasks: &[Task]) -> Result<(), StoreError> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        // The data file is only ever replaced by a complete write.
        let tmp = self.path.with_extension("json.tmp");
        let written = write_json(&tmp, tasks);
        if written.is_err() {
            let _ = std::fs::remove_file(&tmp);
            return written;
        }
        std::fs::rename(&tmp, &self.path)?;
        Ok(())
    }
}

fn write_json(path: &Path, tasks: &[Task]) -> Result<(), StoreError> {
    let file = OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .open(path)?;
    let mut writer = BufWriter::new(file);
    serde_json::to_writer_pretty(&mut writer, tasks)?;
    writer.flush()?;
    writer.get_ref().sync_all()?;
    Ok(())
}

/// Keeps nothing. Used by tests and when no data file is wanted.
#[derive(Default)]
pub struct MemoryPersistence;

impl TaskPersistence for MemoryPersistence {
    fn load(&self) -> Result<Vec<Task>, StoreError> {
        Ok(Vec::new())
    }

    fn save(&self, _tasks: &[Task]) -> Result<(), StoreError> {
        Ok(())
    }
}

struct StoreState {
    tasks: Vec<Task>,
    last_id: i64,
}

/// The single owner and writer of local tasks.
pub struct TaskStore {
    state: Mutex<StoreState>,
    persistence: Box<dyn TaskPersistence>,
    publisher: Publisher<Vec<Task>>,
}

impl TaskStore {
    pub fn open(persistence: Box<dyn TaskPersistence>) -> Result<Self, StoreError> {
        let loaded = persistence.load()?;
        let mut tasks: Vec<Task> = loaded.into_iter().filter(|t| !t.is_remote).collect();
        let mut last_id = tasks.iter().filter_map(|t| t.id).max().unwrap_or(0);
        for task in tasks.iter_mut().filter(|t| t.id.is_none()) {
            last_id += 1;
            task.id = Some(last_id);
        }
        info!(count = tasks.len(), "loaded local tasks");
        Ok(Self {
            state: Mutex::new(StoreState { tasks, last_id }),
            persistence,
            publisher: Publisher::new(),
        })
    }

    pub fn in_memory() -> Self {
        Self {
            state: Mutex::new(StoreState {
                tasks: Vec::new(),
                last_id: 0,
            }),
            persistence: Box::new(MemoryPersistence),
            publisher: Publisher::new(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, StoreState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Upserts by id and returns the task as stored, so a fresh task comes
    /// back with its assigned id. Remote tasks are refused and returned as-is.
    pub fn insert(&self, mut task: Task) -> Task {
        if task.is_remote {
            warn!(id = ?task.id, "refusing to store an online task");
            return task;
        }

        let mut state = self.lock();
        match task.id {
            None => {
                state.last_id += 1;
                task.id = Some(state.last_id);
                state.tasks.push(task.clone());
            }
            Some(id) => {
                state.last_id = state.last_id.max(id);
                if let Some(existing) = state.tasks.iter_mut().find(|t| t.id == Some(id)) {
                    *existing = task.clone();
                } else {
                    state.tasks.push(task.clone());
                }
            }
        }
        debug!(id = ?task.id, "stored task");
        self.commit(&state);
        task
    }

    pub fn delete(&self, task: &Task) {
        let Some(id) = task.id else {
            return;
        };
        let mut state = self.lock();
        let before = state.tasks.len();
        state.tasks.retain(|t| t.id != Some(id));
        if state.tasks.len() != before {
            debug!(id, "deleted task");
            self.commit(&state);
        }
    }

    pub fn get_by_id(&self, id: i64) -> Option<Task> {
        self.lock().tasks.iter().find(|t| t.id == Some(id)).cloned()
    }

    pub fn snapshot(&self) -> Vec<Task> {
        self.lock().tasks.clone()
    }

    /// Delivers the current list immediately and again after every mutation.
    pub fn subscribe<F>(&self, observer: F) -> Subscription
    where
        F: Fn(&Vec<Task>) + Send + Sync + 'static,
    {
        let state = self.lock();
        self.publisher.register(&state.tasks, observer)
    }

    // Called with the state lock held so observers see mutations in order.
    fn commit(&self, state: &StoreState) {
        if let Err(e) = self.persistence.save(&state.tasks) {
            warn!(error = %e, "failed to persist tasks");
        }
        self.publisher.publish(&state.tasks);
    }
}
