// ABOUTME: Conversation coordinator owning one execution slot per conversation
// ABOUTME: Control operations only schedule work; a supervised background driver runs the engine

use crate::engine::{AgentEngine, EngineContext, EngineError, EngineFactory, EngineState};
use crate::events::{EventKind, EventSink};
use crate::hub::{EventCallback, EventHub, SubscriptionId};
use crate::model::{
    ConversationInfo, ConversationRecord, ConversationStatus, Message, StartConversationRequest,
};
use crate::settings::CoordinatorSettings;
use crate::store::{ConversationStore, FileConversationStore, StoreError};
use async_trait::async_trait;
use berth_core::{paginate, ErrorKind, Page};
use chrono::Utc;
use std::collections::HashMap;
use std::io::ErrorKind as IoErrorKind;
use std::path::Path;
use std::sync::{Arc, Mutex as StdMutex, MutexGuard, RwLock};
use thiserror::Error;
use tokio::sync::{mpsc, Mutex};
use tokio::task::{JoinError, JoinHandle};
use tokio_util::task::TaskTracker;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

#[derive(Error, Debug)]
pub enum ConversationError {
    #[error("Conversation not found: {0}")]
    NotFound(Uuid),

    #[error("Configuration error: {0}")]
    Configuration(EngineError),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Storage error: {0}")]
    Storage(#[from] StoreError),
}

impl ConversationError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ConversationError::NotFound(_) => ErrorKind::NotFound,
            ConversationError::Configuration(_) => ErrorKind::Configuration,
            ConversationError::Conflict(_) => ErrorKind::Conflict,
            ConversationError::Storage(_) => ErrorKind::TransientRuntime,
        }
    }
}

impl From<std::io::Error> for ConversationError {
    fn from(error: std::io::Error) -> Self {
        ConversationError::Storage(StoreError::Io(error))
    }
}

pub type Result<T> = std::result::Result<T, ConversationError>;

/// Lifecycle control over conversations.
///
/// Mutating operations return once work is scheduled; completion is observed
/// through `status` or the event stream.
#[async_trait]
pub trait ConversationCoordinator: Send + Sync {
    async fn create(&self, request: StartConversationRequest) -> Result<ConversationInfo>;

    async fn get(&self, id: Uuid) -> Option<ConversationInfo>;

    /// List conversations, newest first
    async fn search(&self, page_id: Option<&str>, limit: usize) -> Page<ConversationInfo>;

    async fn batch_get(&self, ids: &[Uuid]) -> Vec<Option<ConversationInfo>>;

    async fn set_title(&self, id: Uuid, title: Option<String>) -> Result<ConversationInfo>;

    /// Close any execution and remove the conversation with its workspace
    async fn delete(&self, id: Uuid) -> Result<bool>;

    /// Start a fresh engine, or resume a paused one
    async fn start(&self, id: Uuid) -> Result<()>;

    async fn pause(&self, id: Uuid) -> Result<()>;

    async fn send_message(&self, id: Uuid, message: Message) -> Result<()>;

    async fn close(&self, id: Uuid) -> Result<()>;

    async fn status(&self, id: Uuid) -> Result<ConversationStatus>;

    async fn subscribe(&self, id: Uuid, callback: EventCallback) -> Result<SubscriptionId>;

    async fn unsubscribe(&self, id: Uuid, subscription: SubscriptionId) -> Result<bool>;

    /// Close every conversation and wait for background work to drain
    async fn shutdown(&self);
}

/// Signals delivered to a conversation's background driver, in send order
#[derive(Debug)]
enum Signal {
    Resume,
    Pause,
    Message(Message),
    Close,
}

struct ActiveExecution {
    engine: Arc<dyn AgentEngine>,
    signals: mpsc::UnboundedSender<Signal>,
    generation: u64,
    closing: bool,
    driver: Option<JoinHandle<()>>,
}

impl ActiveExecution {
    fn request_close(&mut self) {
        if !self.closing {
            self.closing = true;
            // The driver may already be on its way out
            let _ = self.signals.send(Signal::Close);
        }
    }
}

#[derive(Default)]
struct ExecutionSlot {
    active: Option<ActiveExecution>,
    generation: u64,
    deleted: bool,
}

impl ExecutionSlot {
    fn status(&self) -> ConversationStatus {
        match &self.active {
            None => ConversationStatus::Stopped,
            Some(active) => derive_status(active.engine.state()),
        }
    }
}

fn derive_status(state: EngineState) -> ConversationStatus {
    if state.paused {
        ConversationStatus::Paused
    } else if state.finished {
        ConversationStatus::Finished
    } else {
        ConversationStatus::Running
    }
}

/// In-memory state for one conversation
struct Conversation {
    id: Uuid,
    record: Arc<StdMutex<ConversationRecord>>,
    /// Held from snapshot through save so metadata writes land in order
    writes: Arc<Mutex<()>>,
    hub: Arc<EventHub>,
    slot: Mutex<ExecutionSlot>,
    persistence: StdMutex<Option<JoinHandle<()>>>,
}

impl Conversation {
    fn record(&self) -> ConversationRecord {
        lock(&self.record).clone()
    }

    async fn info(&self) -> ConversationInfo {
        let status = self.slot.lock().await.status();
        ConversationInfo {
            record: self.record(),
            status,
        }
    }
}

fn lock<T>(mutex: &StdMutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|p| p.into_inner())
}

/// Coordinator running engines in-process on a supervised task pool
pub struct LocalConversationCoordinator {
    settings: CoordinatorSettings,
    store: Arc<dyn ConversationStore>,
    factory: Arc<dyn EngineFactory>,
    conversations: RwLock<HashMap<Uuid, Arc<Conversation>>>,
    tracker: TaskTracker,
}

impl LocalConversationCoordinator {
    pub fn new(
        settings: CoordinatorSettings,
        store: Arc<dyn ConversationStore>,
        factory: Arc<dyn EngineFactory>,
    ) -> Self {
        Self {
            settings,
            store,
            factory,
            conversations: RwLock::new(HashMap::new()),
            tracker: TaskTracker::new(),
        }
    }

    /// Coordinator persisting metadata as files under `settings.conversations_dir`
    pub fn with_file_store(settings: CoordinatorSettings, factory: Arc<dyn EngineFactory>) -> Self {
        let store = Arc::new(FileConversationStore::new(settings.conversations_dir.clone()));
        Self::new(settings, store, factory)
    }

    pub fn settings(&self) -> &CoordinatorSettings {
        &self.settings
    }

    fn cached(&self, id: Uuid) -> Option<Arc<Conversation>> {
        self.conversations
            .read()
            .unwrap_or_else(|p| p.into_inner())
            .get(&id)
            .cloned()
    }

    /// Resolve a conversation, loading it from the store on first use
    async fn conversation(&self, id: Uuid) -> Result<Arc<Conversation>> {
        if let Some(conversation) = self.cached(id) {
            return Ok(conversation);
        }
        let record = self
            .store
            .load(id)
            .await?
            .ok_or(ConversationError::NotFound(id))?;
        debug!("Loaded conversation {} from store", id);
        Ok(self.register(record))
    }

    fn register(&self, record: ConversationRecord) -> Arc<Conversation> {
        let mut conversations = self
            .conversations
            .write()
            .unwrap_or_else(|p| p.into_inner());
        if let Some(existing) = conversations.get(&record.id) {
            return Arc::clone(existing);
        }

        let id = record.id;
        let conversation = Arc::new(Conversation {
            id,
            record: Arc::new(StdMutex::new(record)),
            writes: Arc::new(Mutex::new(())),
            hub: Arc::new(EventHub::new()),
            slot: Mutex::new(ExecutionSlot::default()),
            persistence: StdMutex::new(None),
        });
        let worker = self.spawn_persistence(&conversation);
        *lock(&conversation.persistence) = Some(worker);

        conversations.insert(id, Arc::clone(&conversation));
        conversation
    }

    /// Bump `updated_at` and save whenever the conversation emits events.
    ///
    /// The hub callback only hands off to the worker, so publishing never
    /// waits on disk. The worker exits once the hub is cleared.
    fn spawn_persistence(&self, conversation: &Conversation) -> JoinHandle<()> {
        let (tx, mut rx) = mpsc::unbounded_channel::<()>();
        conversation.hub.subscribe(move |_event| {
            tx.send(())
                .map_err(|_| anyhow::anyhow!("persistence worker has stopped"))
        });

        let record = Arc::clone(&conversation.record);
        let writes = Arc::clone(&conversation.writes);
        let store = Arc::clone(&self.store);
        let id = conversation.id;
        self.tracker.spawn(async move {
            while rx.recv().await.is_some() {
                // Coalesce bursts into one write
                while rx.try_recv().is_ok() {}

                let _write = writes.lock().await;
                let snapshot = {
                    let mut record = lock(&record);
                    record.updated_at = Utc::now();
                    record.clone()
                };
                if let Err(e) = store.save(&snapshot).await {
                    warn!("Failed to persist conversation {}: {}", id, e);
                }
            }
            debug!("Persistence worker for conversation {} stopped", id);
        })
    }

    async fn info_for(&self, record: ConversationRecord) -> ConversationInfo {
        match self.cached(record.id) {
            Some(conversation) => conversation.info().await,
            None => ConversationInfo {
                record,
                status: ConversationStatus::Stopped,
            },
        }
    }

    /// Build a fresh engine and hand it to a new background driver.
    ///
    /// Runs with the slot locked so at most one driver exists per conversation.
    async fn launch(&self, conversation: &Arc<Conversation>, slot: &mut ExecutionSlot) -> Result<()> {
        let id = conversation.id;
        let working_dir = self.settings.working_dir_for(id);
        let persistence_dir = self.settings.persistence_dir_for(id);
        tokio::fs::create_dir_all(&working_dir).await?;
        tokio::fs::create_dir_all(&persistence_dir).await?;

        let events = EventSink::new(id, Arc::clone(&conversation.hub));
        let context = EngineContext {
            conversation_id: id,
            agent_config: lock(&conversation.record).agent_config.clone(),
            working_dir,
            persistence_dir,
            events: events.clone(),
        };
        let engine = self
            .factory
            .create(context)
            .map_err(ConversationError::Configuration)?;

        slot.generation += 1;
        let generation = slot.generation;
        let (tx, rx) = mpsc::unbounded_channel();

        let driver = Driver {
            conversation: Arc::clone(conversation),
            engine: Arc::clone(&engine),
            signals: rx,
            events,
            generation,
        };
        let handle = self.tracker.spawn(driver.drive());

        slot.active = Some(ActiveExecution {
            engine,
            signals: tx,
            generation,
            closing: false,
            driver: Some(handle),
        });
        info!("Started conversation {} (execution {})", id, generation);
        Ok(())
    }

    /// Ask the driver to close and take its handle so the caller can await it
    async fn detach_driver(conversation: &Conversation) -> Option<JoinHandle<()>> {
        let mut slot = conversation.slot.lock().await;
        slot.active.as_mut().and_then(|active| {
            active.request_close();
            active.driver.take()
        })
    }

    async fn remove_dir(path: &Path) {
        match tokio::fs::remove_dir_all(path).await {
            Ok(()) => debug!("Removed {}", path.display()),
            Err(e) if e.kind() == IoErrorKind::NotFound => {}
            Err(e) => warn!("Failed to remove {}: {}", path.display(), e),
        }
    }
}

fn ensure_live(slot: &ExecutionSlot, id: Uuid) -> Result<()> {
    if slot.deleted {
        Err(ConversationError::NotFound(id))
    } else {
        Ok(())
    }
}

#[async_trait]
impl ConversationCoordinator for LocalConversationCoordinator {
    async fn create(&self, request: StartConversationRequest) -> Result<ConversationInfo> {
        let record = ConversationRecord::new(request);
        self.store.save(&record).await?;
        info!("Created conversation {}", record.id);
        Ok(self.register(record).info().await)
    }

    async fn get(&self, id: Uuid) -> Option<ConversationInfo> {
        match self.conversation(id).await {
            Ok(conversation) => {
                if conversation.slot.lock().await.deleted {
                    return None;
                }
                Some(conversation.info().await)
            }
            Err(ConversationError::NotFound(_)) => None,
            Err(e) => {
                warn!("Failed to load conversation {}: {}", id, e);
                None
            }
        }
    }

    async fn search(&self, page_id: Option<&str>, limit: usize) -> Page<ConversationInfo> {
        let mut records = match self.store.list().await {
            Ok(records) => records,
            Err(e) => {
                warn!("Failed to list conversations: {}", e);
                return Page::empty();
            }
        };
        records.sort_by(|a, b| {
            b.created_at
                .cmp(&a.created_at)
                .then_with(|| a.id.cmp(&b.id))
        });

        let page = paginate(records, page_id, limit);
        let mut items = Vec::with_capacity(page.items.len());
        for record in page.items {
            items.push(self.info_for(record).await);
        }
        Page {
            items,
            next_page_id: page.next_page_id,
        }
    }

    async fn batch_get(&self, ids: &[Uuid]) -> Vec<Option<ConversationInfo>> {
        let mut infos = Vec::with_capacity(ids.len());
        for id in ids {
            infos.push(self.get(*id).await);
        }
        infos
    }

    async fn set_title(&self, id: Uuid, title: Option<String>) -> Result<ConversationInfo> {
        let conversation = self.conversation(id).await?;
        {
            let _write = conversation.writes.lock().await;
            let snapshot = {
                let mut record = lock(&conversation.record);
                record.title = title;
                record.updated_at = Utc::now();
                record.clone()
            };
            self.store.save(&snapshot).await?;
        }
        Ok(conversation.info().await)
    }

    async fn delete(&self, id: Uuid) -> Result<bool> {
        let conversation = match self.conversation(id).await {
            Ok(conversation) => conversation,
            Err(ConversationError::NotFound(_)) => return Ok(false),
            Err(e) => return Err(e),
        };
        let driver = {
            let mut slot = conversation.slot.lock().await;
            if slot.deleted {
                return Ok(false);
            }
            slot.deleted = true;
            slot.active.as_mut().and_then(|active| {
                active.request_close();
                active.driver.take()
            })
        };

        // Wait for the engine to finish closing before touching its files
        if let Some(driver) = driver {
            if let Err(e) = driver.await {
                warn!("Driver for conversation {} ended abnormally: {}", id, e);
            }
        }

        conversation.hub.clear();
        let worker = lock(&conversation.persistence).take();
        if let Some(worker) = worker {
            let _ = worker.await;
        }

        self.conversations
            .write()
            .unwrap_or_else(|p| p.into_inner())
            .remove(&id);
        self.store.delete(id).await?;
        Self::remove_dir(&self.settings.conversations_dir.join(id.simple().to_string())).await;
        Self::remove_dir(&self.settings.working_dir_for(id)).await;

        info!("Deleted conversation {}", id);
        Ok(true)
    }

    async fn start(&self, id: Uuid) -> Result<()> {
        let conversation = self.conversation(id).await?;
        let mut slot = conversation.slot.lock().await;
        ensure_live(&slot, id)?;

        if slot.active.is_none() {
            return self.launch(&conversation, &mut slot).await;
        }
        let Some(active) = slot.active.as_ref() else {
            return Ok(());
        };
        if active.closing {
            return Err(ConversationError::Conflict(format!(
                "conversation {} is closing",
                id
            )));
        }

        let state = active.engine.state();
        if state.finished {
            debug!("Conversation {} has finished, not restarting", id);
            return Ok(());
        }
        if !state.paused && !state.waiting_for_confirmation {
            debug!("Conversation {} is already running", id);
            return Ok(());
        }

        active.signals.send(Signal::Resume).map_err(|_| {
            ConversationError::Conflict(format!("conversation {} is shutting down", id))
        })?;
        debug!("Resuming conversation {}", id);
        Ok(())
    }

    async fn pause(&self, id: Uuid) -> Result<()> {
        let conversation = self.conversation(id).await?;
        let slot = conversation.slot.lock().await;
        ensure_live(&slot, id)?;

        match slot.active.as_ref() {
            Some(active) if !active.closing => {
                let _ = active.signals.send(Signal::Pause);
                debug!("Pause scheduled for conversation {}", id);
            }
            _ => debug!("Conversation {} has no running engine to pause", id),
        }
        Ok(())
    }

    async fn send_message(&self, id: Uuid, message: Message) -> Result<()> {
        let conversation = self.conversation(id).await?;
        let slot = conversation.slot.lock().await;
        ensure_live(&slot, id)?;

        let active = slot.active.as_ref().ok_or_else(|| {
            ConversationError::Conflict(format!("conversation {} has no active engine", id))
        })?;
        if active.closing {
            return Err(ConversationError::Conflict(format!(
                "conversation {} is closing",
                id
            )));
        }
        active.signals.send(Signal::Message(message)).map_err(|_| {
            ConversationError::Conflict(format!("conversation {} is shutting down", id))
        })
    }

    async fn close(&self, id: Uuid) -> Result<()> {
        let conversation = self.conversation(id).await?;
        let mut slot = conversation.slot.lock().await;
        ensure_live(&slot, id)?;

        if let Some(active) = slot.active.as_mut() {
            active.request_close();
            info!("Close scheduled for conversation {}", id);
        }
        Ok(())
    }

    async fn status(&self, id: Uuid) -> Result<ConversationStatus> {
        let conversation = self.conversation(id).await?;
        let slot = conversation.slot.lock().await;
        ensure_live(&slot, id)?;
        Ok(slot.status())
    }

    async fn subscribe(&self, id: Uuid, callback: EventCallback) -> Result<SubscriptionId> {
        let conversation = self.conversation(id).await?;
        Ok(conversation.hub.subscribe_callback(callback))
    }

    async fn unsubscribe(&self, id: Uuid, subscription: SubscriptionId) -> Result<bool> {
        let conversation = self.conversation(id).await?;
        Ok(conversation.hub.unsubscribe(subscription))
    }

    async fn shutdown(&self) {
        let conversations: Vec<Arc<Conversation>> = self
            .conversations
            .read()
            .unwrap_or_else(|p| p.into_inner())
            .values()
            .cloned()
            .collect();
        info!("Shutting down {} conversations", conversations.len());

        for conversation in &conversations {
            if let Some(driver) = Self::detach_driver(conversation).await {
                if let Err(e) = driver.await {
                    warn!(
                        "Driver for conversation {} ended abnormally: {}",
                        conversation.id, e
                    );
                }
            }
        }
        for conversation in &conversations {
            conversation.hub.clear();
        }

        self.tracker.close();
        self.tracker.wait().await;
    }
}

/// Background task owning one engine instance from launch until close
struct Driver {
    conversation: Arc<Conversation>,
    engine: Arc<dyn AgentEngine>,
    signals: mpsc::UnboundedReceiver<Signal>,
    events: EventSink,
    generation: u64,
}

type RunResult = std::result::Result<std::result::Result<(), EngineError>, JoinError>;

async fn wait_run(run: &mut Option<JoinHandle<std::result::Result<(), EngineError>>>) -> RunResult {
    match run {
        Some(handle) => handle.await,
        None => std::future::pending().await,
    }
}

impl Driver {
    async fn drive(mut self) {
        let id = self.conversation.id;
        let mut run = Some(self.spawn_run());
        let mut resume_pending = false;

        loop {
            tokio::select! {
                result = wait_run(&mut run) => {
                    run = None;
                    if !self.report_run(result).await {
                        break;
                    }
                    if resume_pending && !self.engine.state().finished {
                        resume_pending = false;
                        run = Some(self.spawn_run());
                    }
                }
                signal = self.signals.recv() => match signal {
                    Some(Signal::Resume) => {
                        if run.is_none() {
                            run = Some(self.spawn_run());
                        } else {
                            resume_pending = true;
                        }
                    }
                    Some(Signal::Pause) => {
                        resume_pending = false;
                        self.call("pause", |engine| engine.pause()).await;
                    }
                    Some(Signal::Message(message)) => {
                        self.call("send_message", move |engine| engine.send_message(message))
                            .await;
                    }
                    Some(Signal::Close) | None => break,
                }
            }
        }

        self.mark_closing().await;
        self.call("close", |engine| engine.close()).await;
        if let Some(handle) = run.take() {
            let result = handle.await;
            if !matches!(result, Ok(Ok(()))) {
                self.report_run(result).await;
            }
        }
        self.release().await;
        info!("Conversation {} stopped", id);
    }

    fn spawn_run(&self) -> JoinHandle<std::result::Result<(), EngineError>> {
        debug!("Running engine for conversation {}", self.conversation.id);
        let engine = Arc::clone(&self.engine);
        tokio::task::spawn_blocking(move || engine.run())
    }

    /// Publish the outcome of one run; returns false when the engine is unusable
    async fn report_run(&self, result: RunResult) -> bool {
        let id = self.conversation.id;
        match result {
            Ok(Ok(())) => {
                let status = derive_status(self.engine.state());
                debug!("Engine run for conversation {} returned ({})", id, status);
                self.emit(EventKind::StatusChanged { status }).await;
                true
            }
            Ok(Err(e)) => {
                error!("Engine run for conversation {} failed: {}", id, e);
                self.emit(EventKind::Error {
                    detail: e.to_string(),
                })
                .await;
                false
            }
            Err(e) => {
                error!("Engine run for conversation {} panicked: {}", id, e);
                self.emit(EventKind::Error {
                    detail: format!("engine run panicked: {}", e),
                })
                .await;
                false
            }
        }
    }

    /// Deliver on the blocking pool; subscriber callbacks are synchronous and may be slow
    async fn emit(&self, kind: EventKind) {
        let events = self.events.clone();
        if let Err(e) = tokio::task::spawn_blocking(move || events.emit(kind)).await {
            warn!(
                "Event delivery for conversation {} failed: {}",
                self.conversation.id, e
            );
        }
    }

    /// Invoke an engine method off the async runtime, reporting failures as events
    async fn call<F>(&self, operation: &'static str, f: F)
    where
        F: FnOnce(&dyn AgentEngine) -> std::result::Result<(), EngineError> + Send + 'static,
    {
        let engine = Arc::clone(&self.engine);
        let outcome = tokio::task::spawn_blocking(move || f(engine.as_ref())).await;
        let detail = match outcome {
            Ok(Ok(())) => return,
            Ok(Err(e)) => format!("{} failed: {}", operation, e),
            Err(e) => format!("{} panicked: {}", operation, e),
        };
        warn!("Conversation {}: {}", self.conversation.id, detail);
        self.emit(EventKind::Error { detail }).await;
    }

    async fn mark_closing(&self) {
        let mut slot = self.conversation.slot.lock().await;
        if let Some(active) = slot.active.as_mut() {
            if active.generation == self.generation {
                active.closing = true;
            }
        }
    }

    /// Clear the slot if it still holds this driver's execution
    async fn release(&self) {
        {
            let mut slot = self.conversation.slot.lock().await;
            if slot
                .active
                .as_ref()
                .is_some_and(|active| active.generation == self.generation)
            {
                slot.active = None;
            }
        }
        self.emit(EventKind::StatusChanged {
            status: ConversationStatus::Stopped,
        })
        .await;
    }
}
