use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use thiserror::Error;
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::{broadcast, mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{sleep_until, Instant};
use tracing::{debug, error, info, warn};

use super::machine::{AutosaveEvent, AutosaveMachine, Effect, SaveSnapshot, SaveStatus};

pub const DEFAULT_AUTOSAVE_DELAY: Duration = Duration::from_millis(3000);

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SaveError {
    #[error("Save failed: {0}")]
    SaveFailed(String),
    #[error("Save timed out after {0:?}")]
    TimedOut(Duration),
}

/// The live editor of one open document.
#[async_trait]
pub trait DocumentEditor: Send + Sync {
    /// A stream of "the document changed" notifications.
    fn subscribe_changes(&self) -> broadcast::Receiver<()>;

    async fn serialize_current_document(&self) -> Result<String, SaveError>;
}

/// Where serialized documents end up.
#[async_trait]
pub trait DocumentPersister: Send + Sync {
    async fn persist(&self, document: String) -> Result<(), SaveError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AutosaveConfig {
    /// Quiet period after the last edit before a save starts.
    pub delay: Duration,
    /// Upper bound for serialize + persist. `None` waits forever.
    pub save_timeout: Option<Duration>,
}

impl Default for AutosaveConfig {
    fn default() -> Self {
        Self {
            delay: DEFAULT_AUTOSAVE_DELAY,
            save_timeout: None,
        }
    }
}

#[derive(Debug)]
enum Command {
    NotifyEdit,
    SaveNow,
    SetEnabled(bool),
    Shutdown,
}

/// Control surface of a running coordinator.
///
/// Dropping the handle stops the coordinator as well; an in-flight save still
/// runs to completion.
#[derive(Debug)]
pub struct AutosaveHandle {
    commands: mpsc::UnboundedSender<Command>,
    status: watch::Receiver<SaveSnapshot>,
    task: JoinHandle<()>,
}

impl AutosaveHandle {
    pub fn notify_edit(&self) {
        self.send(Command::NotifyEdit);
    }

    /// Cancels the debounce timer and saves right away.
    pub fn save_now(&self) {
        self.send(Command::SaveNow);
    }

    pub fn set_enabled(&self, enabled: bool) {
        self.send(Command::SetEnabled(enabled));
    }

    pub fn status(&self) -> SaveSnapshot {
        self.status.borrow().clone()
    }

    pub fn subscribe_status(&self) -> watch::Receiver<SaveSnapshot> {
        self.status.clone()
    }

    /// Stops the coordinator and releases its change subscription.
    pub async fn shutdown(self) {
        self.send(Command::Shutdown);
        if let Err(e) = self.task.await {
            error!(error = %e, "Autosave coordinator task failed.");
        }
    }

    fn send(&self, command: Command) {
        if self.commands.send(command).is_err() {
            warn!("Autosave coordinator is no longer running.");
        }
    }
}

/// Debounced, single-flight autosave for one document.
pub struct AutosaveCoordinator {
    editor: Arc<dyn DocumentEditor>,
    persister: Arc<dyn DocumentPersister>,
    config: AutosaveConfig,
    machine: AutosaveMachine,
    deadline: Option<Instant>,
    status_tx: watch::Sender<SaveSnapshot>,
    done_tx: mpsc::UnboundedSender<Result<(), SaveError>>,
}

impl AutosaveCoordinator {
    /// Subscribes to the editor's changes and starts the coordinator task.
    pub fn spawn(
        editor: Arc<dyn DocumentEditor>,
        persister: Arc<dyn DocumentPersister>,
        config: AutosaveConfig,
    ) -> AutosaveHandle {
        let machine = AutosaveMachine::new();
        let (status_tx, status_rx) = watch::channel(machine.snapshot());
        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let (done_tx, done_rx) = mpsc::unbounded_channel();
        let changes = editor.subscribe_changes();

        let coordinator = Self {
            editor,
            persister,
            config,
            machine,
            deadline: None,
            status_tx,
            done_tx,
        };
        let task = tokio::spawn(coordinator.run(command_rx, changes, done_rx));
        info!(delay_ms = config.delay.as_millis() as u64, "Autosave coordinator started.");

        AutosaveHandle {
            commands: command_tx,
            status: status_rx,
            task,
        }
    }

    async fn run(
        mut self,
        mut commands: mpsc::UnboundedReceiver<Command>,
        mut changes: broadcast::Receiver<()>,
        mut done_rx: mpsc::UnboundedReceiver<Result<(), SaveError>>,
    ) {
        let mut changes_open = true;
        loop {
            let deadline = self.deadline;
            tokio::select! {
                command = commands.recv() => match command {
                    Some(Command::NotifyEdit) => self.dispatch(AutosaveEvent::EditNotified),
                    Some(Command::SaveNow) => self.dispatch(AutosaveEvent::SaveNow),
                    Some(Command::SetEnabled(enabled)) => self.dispatch(AutosaveEvent::SetEnabled(enabled)),
                    Some(Command::Shutdown) | None => break,
                },
                change = changes.recv(), if changes_open => match change {
                    Ok(()) => self.dispatch(AutosaveEvent::EditNotified),
                    Err(RecvError::Lagged(skipped)) => {
                        debug!(skipped, "Change notifications coalesced.");
                        self.dispatch(AutosaveEvent::EditNotified);
                    }
                    Err(RecvError::Closed) => {
                        debug!("Editor change stream closed.");
                        changes_open = false;
                    }
                },
                _ = sleep_until(deadline.unwrap_or_else(Instant::now)), if deadline.is_some() => {
                    self.deadline = None;
                    self.dispatch(AutosaveEvent::TimerFired);
                }
                Some(outcome) = done_rx.recv() => {
                    let event = match outcome {
                        Ok(()) => AutosaveEvent::SaveSucceeded { at: Utc::now() },
                        Err(e) => AutosaveEvent::SaveFailed { reason: e.to_string() },
                    };
                    self.dispatch(event);
                }
            }
        }
        info!("Autosave coordinator stopped.");
    }

    fn dispatch(&mut self, event: AutosaveEvent) {
        for effect in self.machine.handle(event) {
            match effect {
                Effect::ArmTimer => self.deadline = Some(Instant::now() + self.config.delay),
                Effect::CancelTimer => self.deadline = None,
                Effect::StartSave => self.start_save(),
            }
        }

        let snapshot = self.machine.snapshot();
        if *self.status_tx.borrow() != snapshot {
            match &snapshot.last_error {
                Some(reason) if snapshot.status == SaveStatus::Error => {
                    warn!(reason = %reason, "Autosave failed.");
                }
                _ => debug!(status = ?snapshot.status, "Autosave status changed."),
            }
            self.status_tx.send_replace(snapshot);
        }
    }

    fn start_save(&self) {
        let editor = Arc::clone(&self.editor);
        let persister = Arc::clone(&self.persister);
        let save_timeout = self.config.save_timeout;
        let done_tx = self.done_tx.clone();

        tokio::spawn(async move {
            let save = async {
                let document = editor.serialize_current_document().await?;
                persister.persist(document).await
            };
            let outcome = match save_timeout {
                Some(limit) => tokio::time::timeout(limit, save)
                    .await
                    .unwrap_or(Err(SaveError::TimedOut(limit))),
                None => save.await,
            };
            // The coordinator may already be gone; the outcome is moot then.
            let _ = done_tx.send(outcome);
        });
    }
}
