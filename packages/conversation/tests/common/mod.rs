// ABOUTME: Shared fixtures for conversation coordinator integration tests
// ABOUTME: Scripted engine whose behaviour is driven by agent_config flags, plus polling helpers

#![allow(dead_code)]

use berth_conversation::{
    AgentEngine, ConversationCoordinator, ConversationEvent, ConversationStatus, CoordinatorSettings,
    EngineContext, EngineError, EngineFactory, EngineState, EventKind, EventSink,
    LocalConversationCoordinator, Message,
};
use serde_json::Value;
use std::future::Future;
use std::path::PathBuf;
use std::sync::{Arc, Condvar, Mutex};
use std::time::Duration;
use tempfile::TempDir;
use uuid::Uuid;

const WAIT_TIMEOUT: Duration = Duration::from_secs(5);
const POLL_INTERVAL: Duration = Duration::from_millis(10);

#[derive(Default)]
struct EngineFlags {
    paused: bool,
    finished: bool,
    waiting: bool,
    closed: bool,
    finish_requested: bool,
    runs: usize,
    pending: Vec<Message>,
    received: Vec<Message>,
}

/// Engine that blocks in `run` until paused, closed or told to finish.
///
/// Recognised agent_config flags:
/// - `fail_run`: every run returns an execution error
/// - `panic_run`: every run panics
/// - `confirm`: every run stops immediately waiting for confirmation
/// - `close_delay_ms`: close takes this long to complete
pub struct ScriptedEngine {
    flags: Mutex<EngineFlags>,
    wake: Condvar,
    events: EventSink,
    config: Value,
    pub working_dir: PathBuf,
}

impl ScriptedEngine {
    fn new(context: EngineContext) -> Self {
        Self {
            flags: Mutex::new(EngineFlags::default()),
            wake: Condvar::new(),
            events: context.events,
            config: context.agent_config,
            working_dir: context.working_dir,
        }
    }

    fn flag(&self, name: &str) -> bool {
        self.config.get(name).and_then(Value::as_bool).unwrap_or(false)
    }

    /// Let the current run complete as finished
    pub fn finish(&self) {
        self.flags.lock().unwrap().finish_requested = true;
        self.wake.notify_all();
    }

    pub fn runs(&self) -> usize {
        self.flags.lock().unwrap().runs
    }

    pub fn is_closed(&self) -> bool {
        self.flags.lock().unwrap().closed
    }

    pub fn received(&self) -> Vec<String> {
        self.flags
            .lock()
            .unwrap()
            .received
            .iter()
            .map(|m| m.content.clone())
            .collect()
    }
}

impl AgentEngine for ScriptedEngine {
    fn run(&self) -> Result<(), EngineError> {
        {
            let mut flags = self.flags.lock().unwrap();
            if flags.closed {
                return Err(EngineError::Closed);
            }
            flags.runs += 1;
            flags.paused = false;
            flags.waiting = false;
        }
        if self.flag("fail_run") {
            return Err(EngineError::Execution("scripted failure".to_string()));
        }
        if self.flag("panic_run") {
            panic!("scripted panic");
        }
        if self.flag("confirm") {
            self.flags.lock().unwrap().waiting = true;
            return Ok(());
        }

        let mut flags = self.flags.lock().unwrap();
        loop {
            if !flags.pending.is_empty() {
                let batch: Vec<Message> = flags.pending.drain(..).collect();
                flags.received.extend(batch.iter().cloned());
                drop(flags);
                for message in batch {
                    self.events.emit(EventKind::Message {
                        message: Message::assistant(format!("echo: {}", message.content)),
                    });
                }
                flags = self.flags.lock().unwrap();
                continue;
            }
            if flags.closed || flags.paused {
                return Ok(());
            }
            if flags.finish_requested {
                flags.finished = true;
                return Ok(());
            }
            flags = self.wake.wait(flags).unwrap();
        }
    }

    fn pause(&self) -> Result<(), EngineError> {
        self.flags.lock().unwrap().paused = true;
        self.wake.notify_all();
        Ok(())
    }

    fn close(&self) -> Result<(), EngineError> {
        if let Some(delay) = self.config.get("close_delay_ms").and_then(Value::as_u64) {
            std::thread::sleep(Duration::from_millis(delay));
        }
        self.flags.lock().unwrap().closed = true;
        self.wake.notify_all();
        Ok(())
    }

    fn send_message(&self, message: Message) -> Result<(), EngineError> {
        let mut flags = self.flags.lock().unwrap();
        if flags.closed {
            return Err(EngineError::Closed);
        }
        flags.pending.push(message);
        drop(flags);
        self.wake.notify_all();
        Ok(())
    }

    fn state(&self) -> EngineState {
        let flags = self.flags.lock().unwrap();
        EngineState {
            paused: flags.paused,
            finished: flags.finished,
            waiting_for_confirmation: flags.waiting,
        }
    }
}

/// Factory remembering every engine it builds; rejects configs with `"fail": true`
#[derive(Default)]
pub struct ScriptedFactory {
    engines: Mutex<Vec<Arc<ScriptedEngine>>>,
}

impl ScriptedFactory {
    pub fn created(&self) -> usize {
        self.engines.lock().unwrap().len()
    }

    pub fn engine(&self, index: usize) -> Arc<ScriptedEngine> {
        Arc::clone(&self.engines.lock().unwrap()[index])
    }

    pub fn last(&self) -> Arc<ScriptedEngine> {
        let engines = self.engines.lock().unwrap();
        Arc::clone(engines.last().expect("no engine created"))
    }
}

impl EngineFactory for ScriptedFactory {
    fn create(&self, context: EngineContext) -> Result<Arc<dyn AgentEngine>, EngineError> {
        if context.agent_config.get("fail").and_then(Value::as_bool) == Some(true) {
            return Err(EngineError::InvalidConfig("scripted rejection".to_string()));
        }
        let engine = Arc::new(ScriptedEngine::new(context));
        self.engines.lock().unwrap().push(Arc::clone(&engine));
        Ok(engine)
    }
}

pub struct TestContext {
    pub coordinator: LocalConversationCoordinator,
    pub factory: Arc<ScriptedFactory>,
    pub settings: CoordinatorSettings,
    pub temp_dir: TempDir,
}

pub fn setup_coordinator() -> TestContext {
    let temp_dir = TempDir::new().unwrap();
    let settings = CoordinatorSettings::rooted_at(temp_dir.path());
    let factory = Arc::new(ScriptedFactory::default());
    let coordinator = LocalConversationCoordinator::with_file_store(
        settings.clone(),
        Arc::clone(&factory) as Arc<dyn EngineFactory>,
    );
    TestContext {
        coordinator,
        factory,
        settings,
        temp_dir,
    }
}

/// Subscribe a collector that records every event for the conversation
pub async fn collect_events(
    coordinator: &LocalConversationCoordinator,
    id: Uuid,
) -> Arc<Mutex<Vec<ConversationEvent>>> {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    coordinator
        .subscribe(
            id,
            Arc::new(move |event: &ConversationEvent| -> anyhow::Result<()> {
                sink.lock().unwrap().push(event.clone());
                Ok(())
            }),
        )
        .await
        .unwrap();
    seen
}

/// Poll until the condition holds, failing the test after a timeout
pub async fn wait_until<F>(description: &str, mut condition: F)
where
    F: FnMut() -> bool,
{
    let deadline = tokio::time::Instant::now() + WAIT_TIMEOUT;
    while !condition() {
        assert!(
            tokio::time::Instant::now() < deadline,
            "timed out waiting for {}",
            description
        );
        tokio::time::sleep(POLL_INTERVAL).await;
    }
}

pub async fn wait_until_async<F, Fut>(description: &str, mut condition: F)
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    let deadline = tokio::time::Instant::now() + WAIT_TIMEOUT;
    while !condition().await {
        assert!(
            tokio::time::Instant::now() < deadline,
            "timed out waiting for {}",
            description
        );
        tokio::time::sleep(POLL_INTERVAL).await;
    }
}

pub async fn wait_for_status(
    coordinator: &LocalConversationCoordinator,
    id: Uuid,
    expected: ConversationStatus,
) {
    wait_until_async(&format!("status {}", expected), move || async move {
        coordinator.status(id).await.unwrap() == expected
    })
    .await;
}
