use std::fmt;
use std::sync::{Arc, Mutex};

use anyhow::Result;
use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use serde::Serialize;
use thiserror::Error;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::core::cache::CacheStore;
use crate::core::index::{IndexError, ServerInfo, build_server_infos};
use crate::core::parser::{DefinitionParser, ParseError};
use crate::core::tasks::{DEFAULT_WORKER_COUNT, TaskHandle, TaskRunner};

pub type ServerInfoMap = IndexMap<String, ServerInfo>;

/// Store keys owned by the cache manager. Everything the manager knows,
/// including its own state, lives in the store.
mod keys {
    pub const STATE: &str = "cache.state";
    pub const ERROR: &str = "cache.error";
    pub const POPULATE_START: &str = "cache.populate.start";
    pub const POPULATE_END: &str = "cache.populate.end";
    pub const POPULATE_DURATION: &str = "cache.populate.duration";
    pub const TIMESTAMP: &str = "cache.timestamp";
    pub const SERVER_NAMES: &str = "servers.names";
    pub const SERVER_INFOS: &str = "servers.infos";
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum CacheState {
    #[serde(rename = "UNKNOWN")]
    Unknown,
    #[serde(rename = "PROGRESS")]
    InProgress,
    #[serde(rename = "FAULT")]
    Fault,
    #[serde(rename = "COMPLETE")]
    Complete,
}

impl fmt::Display for CacheState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            CacheState::Unknown => "UNKNOWN",
            CacheState::InProgress => "PROGRESS",
            CacheState::Fault => "FAULT",
            CacheState::Complete => "COMPLETE",
        };
        f.write_str(name)
    }
}

#[derive(Clone)]
pub enum CacheValue {
    State(CacheState),
    Error(String),
    Timestamp(DateTime<Utc>),
    Duration(f64),
    ServerNames(Vec<String>),
    ServerInfos(Arc<ServerInfoMap>),
}

#[derive(Debug, Error)]
enum RefreshError {
    #[error(transparent)]
    Parse(#[from] ParseError),
    #[error(transparent)]
    Index(#[from] IndexError),
}

/// What `schedule_refresh` did: kicked off a new background refresh, or
/// handed back the one already in flight.
#[derive(Clone)]
pub enum RefreshOutcome {
    Started(TaskHandle),
    AlreadyRunning(TaskHandle),
}

impl RefreshOutcome {
    pub fn handle(&self) -> &TaskHandle {
        match self {
            RefreshOutcome::Started(handle) | RefreshOutcome::AlreadyRunning(handle) => handle,
        }
    }

    pub fn started_new(&self) -> bool {
        matches!(self, RefreshOutcome::Started(_))
    }
}

/// Orchestrates refreshes of the definition snapshot: derives its state
/// from the store, schedules the refresh body on the worker pool, and
/// publishes each generation as one atomic batch.
#[derive(Clone)]
pub struct CacheManager {
    inner: Arc<ManagerInner>,
}

struct ManagerInner {
    identifier: String,
    store: CacheStore<CacheValue>,
    runner: TaskRunner,
    parser: Arc<dyn DefinitionParser>,
    // guards the check-and-schedule sequence, not the refresh itself
    schedule_lock: Mutex<Option<TaskHandle>>,
    // held by the refresh body for its entire duration
    refresh_lock: Mutex<()>,
}

impl CacheManager {
    pub fn new(parser: Arc<dyn DefinitionParser>) -> Self {
        let identifier = format!("cache-manager-{}", Uuid::new_v4());
        let runner = TaskRunner::new(format!("{identifier}-runner"), DEFAULT_WORKER_COUNT);
        Self::with_parts(identifier, CacheStore::default(), runner, parser)
    }

    pub fn with_parts(
        identifier: impl Into<String>,
        store: CacheStore<CacheValue>,
        runner: TaskRunner,
        parser: Arc<dyn DefinitionParser>,
    ) -> Self {
        let identifier = identifier.into();
        info!("Cache manager '{identifier}' initialized.");
        Self {
            inner: Arc::new(ManagerInner {
                identifier,
                store,
                runner,
                parser,
                schedule_lock: Mutex::new(None),
                refresh_lock: Mutex::new(()),
            }),
        }
    }

    pub fn task_runner(&self) -> &TaskRunner {
        &self.inner.runner
    }

    pub fn store_keys(&self) -> Vec<String> {
        self.inner.store.keys()
    }

    pub fn cache_state(&self) -> CacheState {
        self.inner.cache_state()
    }

    pub fn cache_error(&self) -> Option<String> {
        match self.inner.store.get(keys::ERROR) {
            Some(CacheValue::Error(message)) => Some(message),
            _ => None,
        }
    }

    pub fn is_cache_corrupt(&self) -> bool {
        self.cache_error().is_some()
    }

    pub fn is_cache_ready(&self) -> bool {
        !self.is_cache_corrupt() && self.cache_state() == CacheState::Complete
    }

    pub fn is_refreshing(&self) -> bool {
        self.inner.is_refreshing()
    }

    pub fn cache_timestamp(&self) -> Option<DateTime<Utc>> {
        if !self.is_cache_ready() {
            return None;
        }
        match self.inner.store.get(keys::TIMESTAMP) {
            Some(CacheValue::Timestamp(timestamp)) => Some(timestamp),
            _ => None,
        }
    }

    /// Seconds the last refresh took, present once the cache is ready.
    pub fn refresh_duration(&self) -> Option<f64> {
        if !self.is_cache_ready() {
            return None;
        }
        match self.inner.store.get(keys::POPULATE_DURATION) {
            Some(CacheValue::Duration(seconds)) => Some(seconds),
            _ => None,
        }
    }

    /// Names from the last published generation. Reads stay served from it
    /// even while a newer refresh is in flight.
    pub fn cached_server_names(&self) -> Vec<String> {
        match self.inner.store.get(keys::SERVER_NAMES) {
            Some(CacheValue::ServerNames(names)) => names,
            _ => Vec::new(),
        }
    }

    pub fn cached_server_infos(&self) -> Arc<ServerInfoMap> {
        match self.inner.store.get(keys::SERVER_INFOS) {
            Some(CacheValue::ServerInfos(infos)) => infos,
            _ => Arc::new(IndexMap::new()),
        }
    }

    /// Idempotent while a refresh is in flight: concurrent callers all get
    /// the same handle back and no second refresh starts.
    pub fn schedule_refresh(&self) -> Result<RefreshOutcome> {
        let mut current = self
            .inner
            .schedule_lock
            .lock()
            .expect("schedule lock poisoned");
        if self.inner.is_refreshing() {
            if let Some(handle) = current.as_ref() {
                warn!(
                    "[{}] Refresh already running. Returning existing task...",
                    self.inner.identifier
                );
                return Ok(RefreshOutcome::AlreadyRunning(handle.clone()));
            }
        }
        info!("[{}] Scheduling cache refresh task...", self.inner.identifier);
        let inner = Arc::clone(&self.inner);
        let handle = self.inner.runner.schedule(Some("definition cache refresh"), move || {
            inner.run_refresh();
            Ok(())
        })?;
        *current = Some(handle.clone());
        Ok(RefreshOutcome::Started(handle))
    }

    pub fn shutdown(&self, wait: bool) {
        self.inner.runner.shutdown(wait);
    }
}

impl ManagerInner {
    fn cache_state(&self) -> CacheState {
        match self.store.get(keys::STATE) {
            Some(CacheValue::State(state)) => state,
            _ => CacheState::Unknown,
        }
    }

    fn is_refreshing(&self) -> bool {
        self.cache_state() == CacheState::InProgress
    }

    /// The refresh body. Runs on a worker thread and holds `refresh_lock`
    /// across parse + index so only one refresh can ever make progress.
    fn run_refresh(&self) {
        let _guard = self.refresh_lock.lock().expect("refresh lock poisoned");
        if self.is_refreshing() {
            warn!(
                "[{}] Already refreshing. Subsequent calls will be ignored.",
                self.identifier
            );
            return;
        }
        self.store.set_batch(vec![
            (keys::ERROR.to_string(), None),
            (
                keys::STATE.to_string(),
                Some(CacheValue::State(CacheState::InProgress)),
            ),
        ]);
        info!("[{}] Cache refresh started.", self.identifier);

        let started_at = Utc::now();
        let outcome = self
            .parser
            .parse()
            .map_err(RefreshError::from)
            .and_then(|table| build_server_infos(&table).map_err(RefreshError::from));
        let finished_at = Utc::now();
        let duration = (finished_at - started_at).num_milliseconds() as f64 / 1000.0;

        let mut batch = vec![
            (
                keys::POPULATE_START.to_string(),
                Some(CacheValue::Timestamp(started_at)),
            ),
            (
                keys::POPULATE_END.to_string(),
                Some(CacheValue::Timestamp(finished_at)),
            ),
            (
                keys::TIMESTAMP.to_string(),
                Some(CacheValue::Timestamp(finished_at)),
            ),
            (
                keys::POPULATE_DURATION.to_string(),
                Some(CacheValue::Duration(duration)),
            ),
        ];
        match outcome {
            Ok(infos) => {
                let names: Vec<String> = infos.keys().cloned().collect();
                info!(
                    "[{}] Cache refresh complete. {} servers indexed in {duration:.3}s.",
                    self.identifier,
                    names.len()
                );
                batch.extend([
                    (
                        keys::SERVER_NAMES.to_string(),
                        Some(CacheValue::ServerNames(names)),
                    ),
                    (
                        keys::SERVER_INFOS.to_string(),
                        Some(CacheValue::ServerInfos(Arc::new(infos))),
                    ),
                    (
                        keys::STATE.to_string(),
                        Some(CacheValue::State(CacheState::Complete)),
                    ),
                    (keys::ERROR.to_string(), None),
                ]);
            }
            Err(err) => {
                error!("[{}] Cache refresh failed: {err}.", self.identifier);
                batch.extend([
                    (
                        keys::STATE.to_string(),
                        Some(CacheValue::State(CacheState::Fault)),
                    ),
                    (
                        keys::ERROR.to_string(),
                        Some(CacheValue::Error(err.to_string())),
                    ),
                ]);
            }
        }
        self.store.set_batch(batch);
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use std::collections::VecDeque;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::mpsc::Receiver;

    use super::*;
    use crate::core::model::{DefTable, DefTableItem, JobData, SmartFolder};

    /// One server `S1`, smart folder `F` (SYSTEM, application A1) with job
    /// `J` on node `N1`: the canonical fixture across the test suite.
    pub fn sample_table() -> DefTable {
        let mut folder = SmartFolder {
            data_center: "S1".to_string(),
            folder_name: "F".to_string(),
            order_method: Some("SYSTEM".to_string()),
            application: Some("A1".to_string()),
            ..SmartFolder::default()
        };
        folder.jobs.push(JobData {
            job_name: Some("J".to_string()),
            node_id: Some("N1".to_string()),
            ..JobData::default()
        });
        DefTable {
            items: vec![DefTableItem::Smart(folder)],
        }
    }

    /// Replays a scripted sequence of parse results; counts invocations.
    pub struct ScriptedParser {
        pub calls: AtomicUsize,
        script: Mutex<VecDeque<Result<DefTable, String>>>,
    }

    impl ScriptedParser {
        pub fn new(script: Vec<Result<DefTable, String>>) -> Self {
            Self {
                calls: AtomicUsize::new(0),
                script: Mutex::new(script.into()),
            }
        }
    }

    impl DefinitionParser for ScriptedParser {
        fn parse(&self) -> Result<DefTable, ParseError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let next = self
                .script
                .lock()
                .unwrap()
                .pop_front()
                .expect("scripted parser exhausted");
            next.map_err(|detail| ParseError::SourceUnavailable {
                path: "scripted".to_string(),
                detail,
            })
        }
    }

    /// Blocks inside `parse` until released; used to hold a refresh open.
    pub struct BlockingParser {
        pub calls: AtomicUsize,
        release: Mutex<Receiver<()>>,
        table: DefTable,
    }

    impl BlockingParser {
        pub fn new(release: Receiver<()>, table: DefTable) -> Self {
            Self {
                calls: AtomicUsize::new(0),
                release: Mutex::new(release),
                table,
            }
        }
    }

    impl DefinitionParser for BlockingParser {
        fn parse(&self) -> Result<DefTable, ParseError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.release.lock().unwrap().recv().ok();
            Ok(self.table.clone())
        }
    }
}
